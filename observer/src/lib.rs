pub mod blocks;
pub mod cadence;
pub mod chain;
pub mod index;
pub mod ledger;
pub mod mempool;
pub mod recent;

pub use blocks::{run_block_scanner, BlockScanner, BLOCK_SCAN_PERIOD};
pub use cadence::Cadence;
pub use ledger::LedgerClient;
pub use mempool::{run_mempool_scanner, MempoolScanner};
