pub mod catalog;
pub mod config;
pub mod contract;
pub mod decimal;
pub mod documents;
pub mod errors;
pub mod events;
pub mod interest;
pub mod settlement;
pub mod types;
pub mod views;
pub mod wallet;

// re-export key types
pub use catalog::{Developer, InMemoryCatalog, PropertyCatalog, PropertyListing, PropertySnapshot};
pub use config::{ContractConfig, DocumentConfig, EngineConfig, InterestConfig};
pub use contract::{
    BuyerDetails, ClientQuote, Contract, ContractApplication, ContractBook, ContractTerms,
    InstallmentSchedule, RefundRecord, ScheduledInstallment, SettlementRecord, SettlementSource,
    TermsRequest,
};
pub use decimal::{Money, Rate};
pub use documents::{DocumentJob, DocumentRunSummary, GeneratedDocument, PdfGenerator};
pub use errors::{AdminErrorReport, ErrorKind, PresaleError, Result};
pub use events::{Event, EventLog, EventStore};
pub use interest::{
    AccrualCalculator, AccrualRun, DayCountConvention, InterestAccrualEngine,
    InterestAccrualRecord,
};
pub use settlement::SettlementCoordinator;
pub use types::{
    BalanceBucket, ContractId, ContractStatus, DepositMethod, DepositRequestId, DepositStatus,
    DeveloperId, IdDocumentType, PaymentPlan, PropertyId, QualificationBasis, TransactionId,
    TransactionStatus, TransactionType, UserId, WalletId, WalletStatus,
};
pub use views::{ContractView, WalletView};
pub use wallet::{
    DepositRequest, PurchaseDebit, Reconciliation, Wallet, WalletLedger, WalletTransaction,
};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
