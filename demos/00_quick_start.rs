/// quick start - fund a wallet, sign a contract, pay the down payment
use std::sync::Arc;

use presale_engine_rs::{
    BuyerDetails, ContractApplication, ContractView, DepositMethod, EngineConfig,
    GeneratedDocument, InMemoryCatalog, Money, PdfGenerator, PropertyListing, Rate,
    SafeTimeProvider, SettlementCoordinator, TermsRequest, TimeSource, Uuid,
};
use rust_decimal_macros::dec;

struct LocalPdf;

impl PdfGenerator for LocalPdf {
    fn generate(&self, contract: &ContractView) -> presale_engine_rs::Result<GeneratedDocument> {
        Ok(GeneratedDocument {
            url: format!("file:///tmp/{}.pdf", contract.contract_number),
        })
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_target(false).init();

    let catalog = InMemoryCatalog::new().with_property(PropertyListing {
        id: 1,
        title: "Harbour View 3C".to_string(),
        location: "Lisbon".to_string(),
        area_sqm: dec!(90),
        price: Money::from_major(100_000),
        min_down_payment_percent: 20,
        installment_interest_rate: Rate::ZERO,
        developer_id: None,
    });
    let engine =
        SettlementCoordinator::new(EngineConfig::standard(), Arc::new(catalog), Arc::new(LocalPdf))?;
    let time = SafeTimeProvider::new(TimeSource::System);

    // buyer funds the wallet, an admin confirms the transfer
    let buyer = Uuid::new_v4();
    let wallet_id = engine.wallet_for_user(buyer, &time);
    let request = engine
        .ledger()
        .deposit(wallet_id, Money::from_major(35_000), DepositMethod::BankTransfer, &time)?;
    engine.ledger().approve_deposit(request.id, "ops@presale", &time)?;

    // draft -> pending_signature -> signed -> active
    let contract = engine.create_contract(
        &ContractApplication {
            buyer_id: buyer,
            property_id: 1,
            developer_id: None,
            buyer: BuyerDetails::new("Joana Reis", "joana@example.com").with_phone("+351 910 000 000"),
            terms: TermsRequest::installment(30, 24),
            quote: None,
        },
        &time,
    )?;
    engine.request_signature(contract.id, &time)?;
    engine.sign_contract(contract.id, "data:image/png;base64,iVBORw0KGgo=", &time)?;
    engine.pay_down_payment(contract.id, &time)?;
    engine.process_documents(&time);

    println!("{}", engine.contract_view(contract.id, &time)?.to_json()?);
    println!("{}", engine.wallet_view(wallet_id, 10)?.to_json()?);

    Ok(())
}
