/// contract lifecycle - failed payment, withdrawal window, cancellation and refund
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use presale_engine_rs::{
    AdminErrorReport, BuyerDetails, ContractApplication, ContractId, ContractView, DepositMethod,
    EngineConfig, GeneratedDocument, InMemoryCatalog, Money, PdfGenerator, PresaleError,
    PropertyListing, Rate, SafeTimeProvider, SettlementCoordinator, TermsRequest, TimeSource,
    UserId, Uuid,
};
use rust_decimal_macros::dec;

/// a renderer that is always down
struct OfflinePdf;

impl PdfGenerator for OfflinePdf {
    fn generate(&self, _contract: &ContractView) -> presale_engine_rs::Result<GeneratedDocument> {
        Err(PresaleError::ExternalServiceFailure {
            service: "pdf-renderer".to_string(),
            message: "connection refused".to_string(),
        })
    }
}

fn open_signed(
    engine: &SettlementCoordinator,
    buyer: UserId,
    time: &SafeTimeProvider,
) -> Result<ContractId, PresaleError> {
    let contract = engine.create_contract(
        &ContractApplication {
            buyer_id: buyer,
            property_id: 7,
            developer_id: None,
            buyer: BuyerDetails::new("Tomas Novak", "tomas@example.com").with_phone("+420 600 000 000"),
            terms: TermsRequest::full(25),
            quote: None,
        },
        time,
    )?;
    engine.request_signature(contract.id, time)?;
    engine.sign_contract(contract.id, "data:image/png;base64,AAAA", time)?;
    Ok(contract.id)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();
    println!("=== contract lifecycle ===\n");

    let catalog = InMemoryCatalog::new().with_property(PropertyListing {
        id: 7,
        title: "Garden Court 12".to_string(),
        location: "Prague".to_string(),
        area_sqm: dec!(64),
        price: Money::from_major(80_000),
        min_down_payment_percent: 20,
        installment_interest_rate: Rate::ZERO,
        developer_id: None,
    });
    let config = EngineConfig::standard().with_document_retries(2, 30);
    let engine = SettlementCoordinator::new(config, Arc::new(catalog), Arc::new(OfflinePdf))?;

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 9, 2, 10, 0, 0).unwrap(),
    ));
    let control = time.test_control().unwrap();

    let buyer = Uuid::new_v4();
    let wallet_id = engine.wallet_for_user(buyer, &time);
    let first = open_signed(&engine, buyer, &time)?;

    // nothing in the wallet yet
    if let Err(err) = engine.pay_down_payment(first, &time) {
        println!("buyer sees: {}", err.buyer_message());
        let report = AdminErrorReport::new(&err, format!("contract {}", first));
        println!("admin sees: {}", serde_json::to_string(&report)?);
    }

    let request = engine
        .ledger()
        .deposit(wallet_id, Money::from_major(40_000), DepositMethod::CryptoUsdt, &time)?;
    engine.ledger().mark_awaiting_payment(request.id, Some("0x9f2c".to_string()), &time)?;
    engine.ledger().mark_payment_received(request.id, None, "ops@presale", &time)?;
    engine.ledger().approve_deposit(request.id, "ops@presale", &time)?;

    let settlement = engine.pay_down_payment(first, &time)?;
    println!("\ndown payment settled: {}", settlement.amount);

    // the PDF service is down; the contract stays active regardless
    let run = engine.process_documents(&time);
    println!("document run: {:?}", run);
    control.advance(Duration::minutes(30));
    let run = engine.process_documents(&time);
    println!("document run: {:?}", run);
    println!("jobs needing attention: {}", engine.failed_documents().len());

    // cooling-off: fine on day 14, refused on day 15
    control.advance(Duration::days(14) - Duration::minutes(30));
    let refund = engine.withdraw_contract(first, "financing fell through", &time)?;
    println!("\nwithdrawn on day 14, refunded {}", refund.amount);

    let second = open_signed(&engine, buyer, &time)?;
    engine.pay_down_payment(second, &time)?;
    control.advance(Duration::days(15));
    match engine.withdraw_contract(second, "changed my mind", &time) {
        Err(err) => println!("withdrawal on day 15: {}", err),
        Ok(_) => println!("withdrawal on day 15 unexpectedly accepted"),
    }

    // admin cancellation does not refund until explicitly authorized
    engine.cancel_contract(second, "duplicate purchase", "legal@presale", &time)?;
    println!("\nbalance after cancel: {}", engine.ledger().wallet(wallet_id)?.balance);
    engine.refund_cancelled(second, "legal@presale", &time)?;
    println!("balance after refund: {}", engine.ledger().wallet(wallet_id)?.balance);

    let reconciliation = engine.ledger().reconcile(wallet_id)?;
    println!("ledger balanced: {}", reconciliation.is_balanced());

    Ok(())
}
