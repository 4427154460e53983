use std::collections::BTreeMap;

use crate::world::ledger::{FlushReport, LedgerError, Table, WriteOp};
use crate::world::repository::TableBackend;

/// In-process table storage. Used for fixtures, tests and dry tooling.
#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    tables: BTreeMap<String, Table>,
}

impl MemoryTables {
    pub fn insert(&mut self, store: &str, table: Table) {
        self.tables.insert(store.to_string(), table);
    }

    pub fn table(&self, store: &str) -> Option<&Table> {
        self.tables.get(store)
    }

    pub fn tables(&self) -> &BTreeMap<String, Table> {
        &self.tables
    }

    fn apply_op(&mut self, op: &WriteOp) -> Result<(), LedgerError> {
        match op {
            WriteOp::Cell {
                store,
                row,
                col,
                value,
            } => {
                let table = self
                    .tables
                    .get_mut(store)
                    .ok_or_else(|| LedgerError::MissingStore(store.clone()))?;
                let cells = table
                    .rows
                    .get_mut(*row)
                    .ok_or_else(|| LedgerError::RowOutOfRange {
                        store: store.clone(),
                        row: *row,
                    })?;
                if cells.len() <= *col {
                    cells.resize(*col + 1, String::new());
                }
                cells[*col] = value.clone();
                Ok(())
            }
            WriteOp::Append { store, row } => {
                let table = self
                    .tables
                    .get_mut(store)
                    .ok_or_else(|| LedgerError::MissingStore(store.clone()))?;
                table.rows.push(row.clone());
                Ok(())
            }
        }
    }
}

impl TableBackend for MemoryTables {
    fn acquire(&mut self) -> Result<(), LedgerError> {
        Ok(())
    }

    fn fetch(&self, store: &str) -> Result<Option<Table>, LedgerError> {
        Ok(self.tables.get(store).cloned())
    }

    fn apply(&mut self, ops: &[WriteOp]) -> FlushReport {
        let mut report = FlushReport::default();
        for op in ops {
            match self.apply_op(op) {
                Ok(()) => match op {
                    WriteOp::Cell { .. } => report.writes += 1,
                    WriteOp::Append { .. } => report.appends += 1,
                },
                Err(err) => report.errors.push(err.to_string()),
            }
        }
        report
    }

    fn replace_table(&mut self, store: &str, table: Table) -> Result<(), LedgerError> {
        self.insert(store, table);
        Ok(())
    }
}
