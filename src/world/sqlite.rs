use std::path::Path;

use rusqlite::{params, Connection, OptionalExtension, Transaction};

use crate::world::ledger::{FlushReport, LedgerError, Table, WriteOp};
use crate::world::repository::TableBackend;

const LEDGER_SCHEMA_VERSION: i64 = 1;

const LEDGER_DB_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS ledger_meta (
  id INTEGER PRIMARY KEY CHECK (id = 1),
  schema_version INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_tables (
  store TEXT PRIMARY KEY,
  header TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS ledger_rows (
  store TEXT NOT NULL,
  row_index INTEGER NOT NULL,
  cells TEXT NOT NULL,
  PRIMARY KEY (store, row_index)
);
"#;

/// SQLite-backed table storage. Each named store keeps its header and its rows
/// as JSON-encoded cell arrays.
pub struct SqliteTables {
    conn: Connection,
}

impl SqliteTables {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, LedgerError> {
        conn.execute_batch(LEDGER_DB_SCHEMA)?;
        let db = Self { conn };
        db.ensure_meta()?;
        Ok(db)
    }

    fn ensure_meta(&self) -> Result<(), LedgerError> {
        let version = self
            .conn
            .query_row(
                "SELECT schema_version FROM ledger_meta WHERE id = 1",
                [],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;

        match version {
            Some(found) if found == LEDGER_SCHEMA_VERSION => Ok(()),
            Some(found) => Err(LedgerError::Unavailable(format!(
                "ledger schema version mismatch (found {}, expected {})",
                found, LEDGER_SCHEMA_VERSION
            ))),
            None => {
                self.conn.execute(
                    "INSERT INTO ledger_meta (id, schema_version) VALUES (1, ?1)",
                    params![LEDGER_SCHEMA_VERSION],
                )?;
                Ok(())
            }
        }
    }
}

impl TableBackend for SqliteTables {
    fn acquire(&mut self) -> Result<(), LedgerError> {
        self.conn
            .query_row("SELECT COUNT(*) FROM ledger_tables", [], |row| {
                row.get::<_, i64>(0)
            })
            .map(|_| ())
            .map_err(|err| LedgerError::Unavailable(err.to_string()))
    }

    fn fetch(&self, store: &str) -> Result<Option<Table>, LedgerError> {
        let header_raw = self
            .conn
            .query_row(
                "SELECT header FROM ledger_tables WHERE store = ?1",
                params![store],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        let Some(header_raw) = header_raw else {
            return Ok(None);
        };
        let header: Vec<String> = serde_json::from_str(&header_raw)?;

        let mut stmt = self
            .conn
            .prepare("SELECT cells FROM ledger_rows WHERE store = ?1 ORDER BY row_index")?;
        let raw_rows = stmt.query_map(params![store], |row| row.get::<_, String>(0))?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            let cells: Vec<String> = serde_json::from_str(&raw?)?;
            rows.push(cells);
        }
        Ok(Some(Table { header, rows }))
    }

    fn apply(&mut self, ops: &[WriteOp]) -> FlushReport {
        let mut report = FlushReport::default();
        let tx = match self.conn.transaction() {
            Ok(tx) => tx,
            Err(err) => {
                report.errors.push(format!("could not open transaction: {}", err));
                return report;
            }
        };

        for op in ops {
            match apply_op(&tx, op) {
                Ok(()) => match op {
                    WriteOp::Cell { .. } => report.writes += 1,
                    WriteOp::Append { .. } => report.appends += 1,
                },
                Err(err) => report.errors.push(format!("{}: {}", op.store(), err)),
            }
        }

        if let Err(err) = tx.commit() {
            report.errors.push(format!("commit failed: {}", err));
            report.writes = 0;
            report.appends = 0;
        }
        report
    }

    fn replace_table(&mut self, store: &str, table: Table) -> Result<(), LedgerError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM ledger_rows WHERE store = ?1", params![store])?;
        tx.execute(
            "INSERT OR REPLACE INTO ledger_tables (store, header) VALUES (?1, ?2)",
            params![store, serde_json::to_string(&table.header)?],
        )?;
        for (idx, row) in table.rows.iter().enumerate() {
            tx.execute(
                "INSERT INTO ledger_rows (store, row_index, cells) VALUES (?1, ?2, ?3)",
                params![store, idx as i64, serde_json::to_string(row)?],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn apply_op(tx: &Transaction<'_>, op: &WriteOp) -> Result<(), LedgerError> {
    match op {
        WriteOp::Cell {
            store,
            row,
            col,
            value,
        } => {
            let raw = tx
                .query_row(
                    "SELECT cells FROM ledger_rows WHERE store = ?1 AND row_index = ?2",
                    params![store, *row as i64],
                    |r| r.get::<_, String>(0),
                )
                .optional()?;
            let Some(raw) = raw else {
                return Err(LedgerError::RowOutOfRange {
                    store: store.clone(),
                    row: *row,
                });
            };
            let mut cells: Vec<String> = serde_json::from_str(&raw)?;
            if cells.len() <= *col {
                cells.resize(*col + 1, String::new());
            }
            cells[*col] = value.clone();
            tx.execute(
                "UPDATE ledger_rows SET cells = ?3 WHERE store = ?1 AND row_index = ?2",
                params![store, *row as i64, serde_json::to_string(&cells)?],
            )?;
            Ok(())
        }
        WriteOp::Append { store, row } => {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM ledger_tables WHERE store = ?1",
                    params![store],
                    |r| r.get::<_, i64>(0),
                )
                .optional()?;
            if exists.is_none() {
                return Err(LedgerError::MissingStore(store.clone()));
            }
            let next: i64 = tx.query_row(
                "SELECT COALESCE(MAX(row_index) + 1, 0) FROM ledger_rows WHERE store = ?1",
                params![store],
                |r| r.get(0),
            )?;
            tx.execute(
                "INSERT INTO ledger_rows (store, row_index, cells) VALUES (?1, ?2, ?3)",
                params![store, next, serde_json::to_string(row)?],
            )?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> SqliteTables {
        let mut db = SqliteTables::open_in_memory().unwrap();
        db.replace_table(
            "Offices",
            Table {
                header: vec!["OfficeID".into(), "Holder".into()],
                rows: vec![
                    vec!["C1".into(), "Ana".into()],
                    vec!["C2".into(), "Ben".into()],
                ],
            },
        )
        .unwrap();
        db
    }

    #[test]
    fn tables_round_trip_through_sqlite() {
        let db = seeded();
        let table = db.fetch("Offices").unwrap().unwrap();
        assert_eq!(table.header, vec!["OfficeID", "Holder"]);
        assert_eq!(table.rows[1][1], "Ben");
        assert!(db.fetch("Missing").unwrap().is_none());
    }

    #[test]
    fn apply_reports_bad_ops_and_keeps_going() {
        let mut db = seeded();
        let report = db.apply(&[
            WriteOp::Cell {
                store: "Offices".into(),
                row: 7,
                col: 1,
                value: "x".into(),
            },
            WriteOp::Cell {
                store: "Offices".into(),
                row: 0,
                col: 1,
                value: "Cleo".into(),
            },
            WriteOp::Append {
                store: "Offices".into(),
                row: vec!["C3".into(), "Dev".into()],
            },
            WriteOp::Append {
                store: "Nowhere".into(),
                row: vec!["x".into()],
            },
        ]);
        assert_eq!(report.writes, 1);
        assert_eq!(report.appends, 1);
        assert_eq!(report.errors.len(), 2);

        let table = db.fetch("Offices").unwrap().unwrap();
        assert_eq!(table.rows[0][1], "Cleo");
        assert_eq!(table.rows[2], vec!["C3", "Dev"]);
    }

    #[test]
    fn reopening_a_file_keeps_the_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");
        {
            let mut db = SqliteTables::open(&path).unwrap();
            db.replace_table(
                "Seeds",
                Table {
                    header: vec!["Cycle".into()],
                    rows: vec![vec!["1".into()]],
                },
            )
            .unwrap();
        }
        let mut db = SqliteTables::open(&path).unwrap();
        db.acquire().unwrap();
        assert_eq!(db.fetch("Seeds").unwrap().unwrap().rows.len(), 1);
    }
}
