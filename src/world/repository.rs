use crate::world::ledger::{FlushReport, LedgerError, Table, WriteOp};

/// Raw storage behind the batched ledger. Implementations only need to fetch
/// whole tables and apply a batch of queued writes.
pub trait TableBackend {
    fn acquire(&mut self) -> Result<(), LedgerError>;
    fn fetch(&self, store: &str) -> Result<Option<Table>, LedgerError>;
    /// Apply `ops` in order. A failing op is reported and skipped; the rest still run.
    fn apply(&mut self, ops: &[WriteOp]) -> FlushReport;
    fn replace_table(&mut self, store: &str, table: Table) -> Result<(), LedgerError>;
}
