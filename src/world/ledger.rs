use std::collections::{BTreeMap, BTreeSet, HashMap};

use bevy_utils::tracing::{debug, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::world::repository::TableBackend;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger store unavailable: {0}")]
    Unavailable(String),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("row encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("store {store} has no row {row}")]
    RowOutOfRange { store: String, row: usize },
    #[error("store {0} does not exist")]
    MissingStore(String),
}

/// A named table as the backend holds it: a header row plus data rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<String>>,
}

/// Read result for one store. `exists == false` means the store was never created.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableSnapshot {
    pub exists: bool,
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl TableSnapshot {
    pub fn missing() -> Self {
        Self::default()
    }

    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|col| col.trim() == name)
    }

    /// Content hash of the header and every row, cell by cell.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        if !self.exists {
            hasher.update(b"missing");
        }
        for line in std::iter::once(&self.header).chain(self.rows.iter()) {
            for cell in line {
                hasher.update(cell.as_bytes());
                hasher.update(b"\x1f");
            }
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

impl From<Table> for TableSnapshot {
    fn from(table: Table) -> Self {
        Self {
            exists: true,
            header: table.header,
            rows: table.rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    Cell {
        store: String,
        row: usize,
        col: usize,
        value: String,
    },
    Append {
        store: String,
        row: Vec<String>,
    },
}

impl WriteOp {
    pub fn store(&self) -> &str {
        match self {
            WriteOp::Cell { store, .. } | WriteOp::Append { store, .. } => store,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlushReport {
    pub writes: usize,
    pub appends: usize,
    pub errors: Vec<String>,
}

/// The batched adapter every phase talks to. Reads are snapshots, writes are
/// queued and only reach storage on `flush`.
pub trait LedgerStore {
    /// Start-of-cycle handshake. Failing here is the one fatal setup error.
    fn acquire(&mut self) -> Result<(), LedgerError>;
    fn get_all_rows(&mut self, store: &str) -> Result<TableSnapshot, LedgerError>;
    fn queue_cell_write(&mut self, store: &str, row: usize, col: usize, value: String);
    fn queue_append_row(&mut self, store: &str, row: Vec<String>);
    /// Best-effort commit of everything queued. Never fails; problems land in `errors`.
    fn flush(&mut self) -> FlushReport;
}

/// Queue-then-flush ledger over any table backend, with a per-cycle read cache.
pub struct BatchedLedger<B: TableBackend> {
    backend: B,
    cache: HashMap<String, TableSnapshot>,
    queue: Vec<WriteOp>,
}

impl<B: TableBackend> BatchedLedger<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
            queue: Vec::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn into_backend(self) -> B {
        self.backend
    }

    pub fn pending(&self) -> &[WriteOp] {
        &self.queue
    }
}

impl<B: TableBackend> LedgerStore for BatchedLedger<B> {
    fn acquire(&mut self) -> Result<(), LedgerError> {
        self.cache.clear();
        self.backend.acquire()
    }

    fn get_all_rows(&mut self, store: &str) -> Result<TableSnapshot, LedgerError> {
        if let Some(snapshot) = self.cache.get(store) {
            return Ok(snapshot.clone());
        }
        let snapshot = match self.backend.fetch(store)? {
            Some(table) => TableSnapshot::from(table),
            None => TableSnapshot::missing(),
        };
        debug!(store, rows = snapshot.rows.len(), "fetched store snapshot");
        self.cache.insert(store.to_string(), snapshot.clone());
        Ok(snapshot)
    }

    fn queue_cell_write(&mut self, store: &str, row: usize, col: usize, value: String) {
        self.queue.push(WriteOp::Cell {
            store: store.to_string(),
            row,
            col,
            value,
        });
    }

    fn queue_append_row(&mut self, store: &str, row: Vec<String>) {
        self.queue.push(WriteOp::Append {
            store: store.to_string(),
            row,
        });
    }

    fn flush(&mut self) -> FlushReport {
        let ops = std::mem::take(&mut self.queue);
        self.cache.clear();
        if ops.is_empty() {
            return FlushReport::default();
        }
        let report = self.backend.apply(&ops);
        for err in report.errors.iter() {
            warn!(error = %err, "ledger flush error");
        }
        report
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentKind {
    Cell,
    Append,
}

impl IntentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            IntentKind::Cell => "cell",
            IntentKind::Append => "append",
        }
    }
}

/// A write as it was issued, whether or not it was ever applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteIntent {
    pub store: String,
    pub kind: IntentKind,
    pub target: String,
    pub value: String,
}

impl WriteIntent {
    pub fn canonical_line(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.store,
            self.kind.as_str(),
            self.target,
            self.value
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IntentSummary {
    pub total: usize,
    pub by_kind: BTreeMap<String, usize>,
    pub stores_touched: BTreeSet<String>,
}

impl IntentSummary {
    pub fn from_intents(intents: &[WriteIntent]) -> Self {
        let mut summary = IntentSummary {
            total: intents.len(),
            ..Default::default()
        };
        for intent in intents {
            *summary
                .by_kind
                .entry(intent.kind.as_str().to_string())
                .or_insert(0) += 1;
            summary.stores_touched.insert(intent.store.clone());
        }
        summary
    }
}

/// Wraps a ledger, recording every write as an intent and the digest of every
/// store it reads. When `forward` is off (dry-run and replay) writes never reach
/// the inner ledger and flush is a no-op.
pub struct IntentLedger<'a> {
    inner: &'a mut dyn LedgerStore,
    forward: bool,
    intents: Vec<WriteIntent>,
    reads: BTreeMap<String, String>,
}

impl<'a> IntentLedger<'a> {
    pub fn forwarding(inner: &'a mut dyn LedgerStore) -> Self {
        Self {
            inner,
            forward: true,
            intents: Vec::new(),
            reads: BTreeMap::new(),
        }
    }

    pub fn recording_only(inner: &'a mut dyn LedgerStore) -> Self {
        Self {
            inner,
            forward: false,
            intents: Vec::new(),
            reads: BTreeMap::new(),
        }
    }

    pub fn intents(&self) -> &[WriteIntent] {
        &self.intents
    }

    /// Store name to content digest, as first read this cycle.
    pub fn reads(&self) -> &BTreeMap<String, String> {
        &self.reads
    }
}

impl LedgerStore for IntentLedger<'_> {
    fn acquire(&mut self) -> Result<(), LedgerError> {
        self.inner.acquire()
    }

    fn get_all_rows(&mut self, store: &str) -> Result<TableSnapshot, LedgerError> {
        let snapshot = self.inner.get_all_rows(store)?;
        if !self.reads.contains_key(store) {
            self.reads.insert(store.to_string(), snapshot.digest());
        }
        Ok(snapshot)
    }

    fn queue_cell_write(&mut self, store: &str, row: usize, col: usize, value: String) {
        self.intents.push(WriteIntent {
            store: store.to_string(),
            kind: IntentKind::Cell,
            target: format!("r{}c{}", row, col),
            value: value.clone(),
        });
        if self.forward {
            self.inner.queue_cell_write(store, row, col, value);
        }
    }

    fn queue_append_row(&mut self, store: &str, row: Vec<String>) {
        self.intents.push(WriteIntent {
            store: store.to_string(),
            kind: IntentKind::Append,
            target: "end".to_string(),
            value: row.join("\u{1f}"),
        });
        if self.forward {
            self.inner.queue_append_row(store, row);
        }
    }

    fn flush(&mut self) -> FlushReport {
        if self.forward {
            self.inner.flush()
        } else {
            FlushReport::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::memory::MemoryTables;

    fn ledger_with_counts() -> BatchedLedger<MemoryTables> {
        let mut tables = MemoryTables::default();
        tables.insert(
            "Counts",
            Table {
                header: vec!["Name".into(), "Value".into()],
                rows: vec![vec!["a".into(), "1".into()]],
            },
        );
        BatchedLedger::new(tables)
    }

    #[test]
    fn reads_are_cached_until_flush() {
        let mut ledger = ledger_with_counts();
        ledger.acquire().unwrap();
        let first = ledger.get_all_rows("Counts").unwrap();
        ledger
            .backend_mut()
            .insert("Counts", Table::default());
        let second = ledger.get_all_rows("Counts").unwrap();
        assert_eq!(first, second);

        ledger.flush();
        let third = ledger.get_all_rows("Counts").unwrap();
        assert!(third.rows.is_empty());
    }

    #[test]
    fn writes_only_land_on_flush() {
        let mut ledger = ledger_with_counts();
        ledger.acquire().unwrap();
        ledger.queue_cell_write("Counts", 0, 1, "2".into());
        ledger.queue_append_row("Counts", vec!["b".into(), "5".into()]);

        let before = ledger.backend().table("Counts").unwrap().clone();
        assert_eq!(before.rows[0][1], "1");

        let report = ledger.flush();
        assert_eq!(report.writes, 1);
        assert_eq!(report.appends, 1);
        assert!(report.errors.is_empty());
        let after = ledger.backend().table("Counts").unwrap();
        assert_eq!(after.rows[0][1], "2");
        assert_eq!(after.rows.len(), 2);
    }

    #[test]
    fn missing_store_reads_as_not_existing() {
        let mut ledger = ledger_with_counts();
        let snapshot = ledger.get_all_rows("Nope").unwrap();
        assert!(!snapshot.exists);
        assert!(snapshot.rows.is_empty());
    }

    #[test]
    fn recording_only_ledger_never_touches_inner() {
        let mut ledger = ledger_with_counts();
        {
            let mut recorder = IntentLedger::recording_only(&mut ledger);
            recorder.queue_cell_write("Counts", 0, 1, "9".into());
            recorder.queue_append_row("Counts", vec!["c".into()]);
            assert_eq!(recorder.flush(), FlushReport::default());
            assert_eq!(recorder.intents().len(), 2);
            let summary = IntentSummary::from_intents(recorder.intents());
            assert_eq!(summary.by_kind.get("cell"), Some(&1));
            assert_eq!(summary.by_kind.get("append"), Some(&1));
            assert!(summary.stores_touched.contains("Counts"));
        }
        assert!(ledger.pending().is_empty());
        assert_eq!(ledger.backend().table("Counts").unwrap().rows[0][1], "1");
    }

    #[test]
    fn forwarding_ledger_records_and_applies() {
        let mut ledger = ledger_with_counts();
        {
            let mut recorder = IntentLedger::forwarding(&mut ledger);
            recorder.queue_cell_write("Counts", 0, 1, "3".into());
            let report = recorder.flush();
            assert_eq!(report.writes, 1);
            assert_eq!(recorder.intents()[0].target, "r0c1");
        }
        assert_eq!(ledger.backend().table("Counts").unwrap().rows[0][1], "3");
    }

    #[test]
    fn first_read_of_each_store_is_digested() {
        let mut ledger = ledger_with_counts();
        let mut recorder = IntentLedger::recording_only(&mut ledger);
        let snapshot = recorder.get_all_rows("Counts").unwrap();
        recorder.get_all_rows("Nope").unwrap();
        recorder.get_all_rows("Counts").unwrap();

        let reads = recorder.reads();
        assert_eq!(reads.len(), 2);
        assert_eq!(reads["Counts"], snapshot.digest());
        assert_ne!(reads["Nope"], TableSnapshot { exists: true, ..Default::default() }.digest());

        let mut changed = snapshot.clone();
        changed.rows[0][1] = "2".into();
        assert_ne!(changed.digest(), snapshot.digest());
        assert_eq!(snapshot.digest().len(), 64);
    }
}
