pub mod ledger;
pub mod memory;
pub mod repository;
pub mod schema;
pub mod sqlite;

pub use ledger::{BatchedLedger, IntentLedger, LedgerError, LedgerStore, Table, TableSnapshot};
pub use memory::MemoryTables;
pub use repository::TableBackend;
pub use sqlite::SqliteTables;
