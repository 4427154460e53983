use std::collections::HashMap;

use thiserror::Error;

use crate::world::ledger::TableSnapshot;

pub const INITIATIVES: &str = "Civic_Initiatives";
pub const OFFICES: &str = "Civic_Office_Ledger";
pub const CITY_STATE: &str = "City_State";
pub const NEIGHBORHOODS: &str = "Neighborhood_Map";
pub const DEMOGRAPHICS: &str = "Neighborhood_Demographics";
pub const RIPPLES: &str = "Ripple_Tracker";
pub const ERROR_LEDGER: &str = "Engine_Errors";
pub const CYCLE_SEEDS: &str = "Cycle_Seeds";

#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("store {0} does not exist")]
    MissingStore(String),
    #[error("store {store} is missing required columns: {}", .columns.join(", "))]
    MissingColumns { store: String, columns: Vec<String> },
    #[error("store {store} row {row} column {column}: invalid value {value:?}")]
    InvalidValue {
        store: String,
        row: usize,
        column: String,
        value: String,
    },
}

/// Column contract for one ledger store.
#[derive(Debug, Clone, Copy)]
pub struct StoreSchema {
    pub store: &'static str,
    pub required: &'static [&'static str],
    pub optional: &'static [&'static str],
}

pub const INITIATIVE_SCHEMA: StoreSchema = StoreSchema {
    store: INITIATIVES,
    required: &[
        "InitiativeID",
        "Name",
        "Type",
        "Status",
        "VoteRequirement",
        "VoteCycle",
        "Projection",
        "LeadFaction",
        "OppositionFaction",
        "Outcome",
        "Consequences",
        "Notes",
        "LastUpdated",
    ],
    optional: &[
        "Budget",
        "SwingVoter",
        "SwingVoter2",
        "SwingVoter2Lean",
        "AffectedNeighborhoods",
    ],
};

pub const OFFICE_SCHEMA: StoreSchema = StoreSchema {
    store: OFFICES,
    required: &[
        "OfficeID",
        "Title",
        "Holder",
        "Status",
        "Faction",
        "VotingPower",
    ],
    optional: &["Type", "District", "HolderID"],
};

pub const CITY_SCHEMA: StoreSchema = StoreSchema {
    store: CITY_STATE,
    required: &["Metric", "Value"],
    optional: &[],
};

pub const NEIGHBORHOOD_SCHEMA: StoreSchema = StoreSchema {
    store: NEIGHBORHOODS,
    required: &["Neighborhood"],
    optional: &[
        "Sentiment",
        "Community",
        "Retail",
        "Traffic",
        "Nightlife",
        "Sickness",
        "Unemployment",
    ],
};

pub const DEMOGRAPHIC_SCHEMA: StoreSchema = StoreSchema {
    store: DEMOGRAPHICS,
    required: &["Neighborhood", "Population"],
    optional: &["Students", "Adults", "Seniors", "Unemployed", "Sick"],
};

pub const RIPPLE_SCHEMA: StoreSchema = StoreSchema {
    store: RIPPLES,
    required: &[
        "RippleID",
        "Initiative",
        "Category",
        "Direction",
        "Strength",
        "Effects",
        "Neighborhoods",
        "StartCycle",
        "Duration",
        "EndCycle",
        "Status",
    ],
    optional: &["LastDecay"],
};

pub const ERROR_SCHEMA: StoreSchema = StoreSchema {
    store: ERROR_LEDGER,
    required: &["Timestamp", "Cycle", "Phase", "Message", "StackExcerpt"],
    optional: &[],
};

pub const CYCLE_SEED_SCHEMA: StoreSchema = StoreSchema {
    store: CYCLE_SEEDS,
    required: &[
        "Cycle",
        "Seed",
        "Timestamp",
        "Fingerprint",
        "PhaseDigests",
        "IntentCount",
    ],
    optional: &["InputDigest"],
};

pub const ALL_SCHEMAS: [StoreSchema; 8] = [
    INITIATIVE_SCHEMA,
    OFFICE_SCHEMA,
    CITY_SCHEMA,
    NEIGHBORHOOD_SCHEMA,
    DEMOGRAPHIC_SCHEMA,
    RIPPLE_SCHEMA,
    ERROR_SCHEMA,
    CYCLE_SEED_SCHEMA,
];

impl StoreSchema {
    /// Full header used when the kernel creates the store itself.
    pub fn header(&self) -> Vec<String> {
        self.required
            .iter()
            .chain(self.optional.iter())
            .map(|col| col.to_string())
            .collect()
    }

    /// Resolve column positions, failing closed when a required column is absent.
    pub fn bind(&self, snapshot: &TableSnapshot) -> Result<ColumnMap, SchemaError> {
        if !snapshot.exists {
            return Err(SchemaError::MissingStore(self.store.to_string()));
        }
        let missing: Vec<String> = self
            .required
            .iter()
            .filter(|col| snapshot.column(col).is_none())
            .map(|col| col.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(SchemaError::MissingColumns {
                store: self.store.to_string(),
                columns: missing,
            });
        }

        let index = self
            .required
            .iter()
            .chain(self.optional.iter())
            .filter_map(|col| snapshot.column(col).map(|idx| (*col, idx)))
            .collect();
        Ok(ColumnMap {
            store: self.store,
            index,
        })
    }
}

/// Bound column positions for one snapshot.
#[derive(Debug, Clone)]
pub struct ColumnMap {
    store: &'static str,
    index: HashMap<&'static str, usize>,
}

impl ColumnMap {
    pub fn store(&self) -> &'static str {
        self.store
    }

    pub fn col(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<usize, SchemaError> {
        self.col(name).ok_or_else(|| SchemaError::MissingColumns {
            store: self.store.to_string(),
            columns: vec![name.to_string()],
        })
    }

    /// Trimmed cell text; blank when the column or the cell is absent.
    pub fn text<'r>(&self, row: &'r [String], name: &str) -> &'r str {
        self.col(name)
            .and_then(|idx| row.get(idx))
            .map(|cell| cell.trim())
            .unwrap_or("")
    }

    pub fn opt_f64(
        &self,
        row: &[String],
        row_idx: usize,
        name: &str,
    ) -> Result<Option<f64>, SchemaError> {
        let raw = self.text(row, name);
        if raw.is_empty() {
            return Ok(None);
        }
        raw.parse::<f64>()
            .map(Some)
            .map_err(|_| self.invalid(row_idx, name, raw))
    }

    pub fn opt_u32(
        &self,
        row: &[String],
        row_idx: usize,
        name: &str,
    ) -> Result<Option<u32>, SchemaError> {
        let raw = self.text(row, name);
        if raw.is_empty() {
            return Ok(None);
        }
        // Sheets hand back whole numbers as "12.0" now and then.
        let parsed = raw.parse::<u32>().ok().or_else(|| {
            raw.parse::<f64>()
                .ok()
                .filter(|value| {
                    value.fract() == 0.0 && *value >= 0.0 && *value <= u32::MAX as f64
                })
                .map(|value| value as u32)
        });
        parsed
            .map(Some)
            .ok_or_else(|| self.invalid(row_idx, name, raw))
    }

    pub fn invalid(&self, row: usize, column: &str, value: &str) -> SchemaError {
        SchemaError::InvalidValue {
            store: self.store.to_string(),
            row,
            column: column.to_string(),
            value: value.to_string(),
        }
    }
}

/// Comma-separated list cell, blanks dropped.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

/// Fixed-precision number formatting so repeated runs write identical cells.
pub fn format_scalar(value: f64) -> String {
    format!("{:.4}", value)
}
