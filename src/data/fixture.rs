use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use bevy_utils::tracing::info;
use serde::{Deserialize, Serialize};

use crate::data::DataError;
use crate::world::ledger::{LedgerError, Table, TableSnapshot};
use crate::world::repository::TableBackend;
use crate::world::schema::ALL_SCHEMAS;

pub const FIXTURE_SCHEMA_VERSION: u32 = 1;

/// A whole ledger as JSON: store name to header and rows.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerFixture {
    pub schema_version: u32,
    pub stores: BTreeMap<String, Table>,
}

pub fn load_ledger_fixture(path: impl AsRef<Path>) -> Result<LedgerFixture, DataError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_ledger_fixture(&raw).map_err(|err| match err {
        DataError::Json { source, .. } => DataError::Json {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })
}

pub fn parse_ledger_fixture(raw: &str) -> Result<LedgerFixture, DataError> {
    let fixture: LedgerFixture = serde_json::from_str(raw).map_err(|source| DataError::Json {
        path: "<inline>".to_string(),
        source,
    })?;
    fixture.validate()?;
    Ok(fixture)
}

impl LedgerFixture {
    pub fn validate(&self) -> Result<(), DataError> {
        if self.schema_version != FIXTURE_SCHEMA_VERSION {
            return Err(DataError::Validation(format!(
                "unsupported fixture schema_version {}",
                self.schema_version
            )));
        }
        for (store, table) in &self.stores {
            if store.trim().is_empty() {
                return Err(DataError::Validation(
                    "store name cannot be empty".to_string(),
                ));
            }
            if let Some(idx) = table.rows.iter().position(|row| row.len() > table.header.len()) {
                return Err(DataError::Validation(format!(
                    "store {} row {} is wider than its header",
                    store, idx
                )));
            }
            if let Some(schema) = ALL_SCHEMAS.iter().find(|schema| schema.store == store.as_str()) {
                schema
                    .bind(&TableSnapshot::from(table.clone()))
                    .map_err(|err| DataError::Validation(err.to_string()))?;
            }
        }
        Ok(())
    }

    /// Replace every store the fixture names. Stores it does not name are untouched.
    pub fn install<B: TableBackend>(&self, backend: &mut B) -> Result<usize, LedgerError> {
        for (store, table) in &self.stores {
            let mut table = table.clone();
            let width = table.header.len();
            for row in table.rows.iter_mut() {
                row.resize(width, String::new());
            }
            backend.replace_table(store, table)?;
            info!(store = %store, "fixture store installed");
        }
        Ok(self.stores.len())
    }
}
