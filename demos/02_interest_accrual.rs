/// interest accrual - qualifying deposits, daily runs, freezing and bonus spending
use chrono::{Duration, TimeZone, Utc};
use presale_engine_rs::{
    DepositMethod, EngineConfig, InterestAccrualEngine, Money, SafeTimeProvider, TimeSource,
    Uuid, WalletLedger,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // RUST_LOG=debug shows skipped wallets too
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();
    println!("=== interest accrual ===\n");

    let config = EngineConfig::standard();
    let ledger = WalletLedger::new(config.interest.clone());
    let engine = InterestAccrualEngine::new(&config.interest);

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
    ));
    let control = time.test_control().unwrap();

    // one qualifying saver, one below the threshold
    let saver = ledger.wallet_for_user(Uuid::new_v4(), &time);
    let small = ledger.wallet_for_user(Uuid::new_v4(), &time);
    for (wallet_id, amount) in [(saver, 10_000), (small, 9_999)] {
        let request = ledger.deposit(wallet_id, Money::from_major(amount), DepositMethod::BankTransfer, &time)?;
        ledger.approve_deposit(request.id, "ops@presale", &time)?;
    }

    for day in [1, 7, 30] {
        control.advance(Duration::days(day));
        let run = engine.run(&ledger, &time);
        println!(
            "{}: credited {} wallets, total {}",
            time.now().format("%Y-%m-%d"),
            run.credited.len(),
            run.total_interest()
        );
    }

    // a frozen wallet stops accruing at the freeze
    ledger.freeze_wallet(saver, "compliance@presale", &time)?;
    control.advance(Duration::days(10));
    let run = engine.run(&ledger, &time);
    println!("\nwhile frozen: credited {} wallets", run.credited.len());
    ledger.reactivate_wallet(saver, "compliance@presale", &time)?;

    let wallet = ledger.wallet(saver)?;
    println!("\nsaver cash {} bonus {}", wallet.balance, wallet.bonus_balance);
    for record in ledger.accrual_records(saver)? {
        println!(
            "  {} -> {}  {} days on {} = {}",
            record.period_start.format("%Y-%m-%d"),
            record.period_end.format("%Y-%m-%d"),
            record.days_in_period,
            record.principal_amount,
            record.interest_amount
        );
    }

    // bonus is spent before cash on a purchase
    let debit = ledger.debit_for_purchase(saver, Money::from_major(1_000), None, &time)?;
    println!("\npurchase of 1000.00 used bonus {} and cash {}", debit.bonus_used, debit.cash_used);
    println!("ledger balanced: {}", ledger.reconcile(saver)?.is_balanced());

    Ok(())
}
