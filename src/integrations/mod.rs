pub mod ledger;

pub use ledger::{
    LedgerClient, LedgerGatewayClient, LedgerTransferExecutor, TransferExecutor,
    UnconfiguredLedger,
};
