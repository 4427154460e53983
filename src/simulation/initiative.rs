use serde::Serialize;

use crate::world::ledger::TableSnapshot;
use crate::world::schema::{split_list, ColumnMap, SchemaError, INITIATIVE_SCHEMA};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitiativeKind {
    CouncilVote,
    ExternalGrant,
    Visioning,
}

impl InitiativeKind {
    pub fn parse(raw: &str) -> Option<InitiativeKind> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "vote" | "council-vote" | "council" => Some(InitiativeKind::CouncilVote),
            "grant" | "external-grant" | "external" => Some(InitiativeKind::ExternalGrant),
            "visioning" | "input" | "visioning/input" | "community-input" => {
                Some(InitiativeKind::Visioning)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum InitiativeStatus {
    Proposed,
    Active,
    PendingVote,
    Passed,
    Failed,
    Delayed,
    Approved,
    Denied,
    VisioningComplete,
    Inactive,
}

impl InitiativeStatus {
    pub fn parse(raw: &str) -> Option<InitiativeStatus> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let status = match normalized.as_str() {
            "" | "proposed" => InitiativeStatus::Proposed,
            "active" => InitiativeStatus::Active,
            "pending-vote" | "pending" => InitiativeStatus::PendingVote,
            "passed" => InitiativeStatus::Passed,
            "failed" => InitiativeStatus::Failed,
            "delayed" => InitiativeStatus::Delayed,
            "approved" => InitiativeStatus::Approved,
            "denied" => InitiativeStatus::Denied,
            "visioning-complete" | "complete" => InitiativeStatus::VisioningComplete,
            "inactive" => InitiativeStatus::Inactive,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InitiativeStatus::Proposed => "proposed",
            InitiativeStatus::Active => "active",
            InitiativeStatus::PendingVote => "pending-vote",
            InitiativeStatus::Passed => "passed",
            InitiativeStatus::Failed => "failed",
            InitiativeStatus::Delayed => "delayed",
            InitiativeStatus::Approved => "approved",
            InitiativeStatus::Denied => "denied",
            InitiativeStatus::VisioningComplete => "visioning-complete",
            InitiativeStatus::Inactive => "inactive",
        }
    }

    /// Terminal records stay in the store for audit and are never re-resolved.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InitiativeStatus::Passed
                | InitiativeStatus::Failed
                | InitiativeStatus::Approved
                | InitiativeStatus::Denied
                | InitiativeStatus::VisioningComplete
                | InitiativeStatus::Inactive
        )
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Initiative {
    #[serde(skip)]
    pub row: usize,
    pub id: String,
    pub name: String,
    pub kind: InitiativeKind,
    pub status: InitiativeStatus,
    pub budget: Option<f64>,
    pub requirement: String,
    pub vote_cycle: Option<u32>,
    pub projection: String,
    pub lead_faction: String,
    pub opposition_faction: String,
    pub swing_voter: String,
    pub swing_voter2: String,
    pub swing_voter2_lean: String,
    pub affected_neighborhoods: Vec<String>,
    pub outcome: String,
    pub consequences: String,
    pub notes: String,
    pub last_updated: String,
}

/// Initiatives loaded from the store together with the column positions
/// needed to write them back. Rows that cannot be typed are skipped, not fatal.
/// Cells that are bad but not essential are dropped and listed in `warnings`.
#[derive(Debug, Clone)]
pub struct InitiativeBook {
    pub columns: ColumnMap,
    pub initiatives: Vec<Initiative>,
    pub skipped: Vec<SchemaError>,
    pub warnings: Vec<SchemaError>,
}

impl InitiativeBook {
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Result<Self, SchemaError> {
        let columns = INITIATIVE_SCHEMA.bind(snapshot)?;
        let mut initiatives = Vec::new();
        let mut skipped = Vec::new();
        let mut warnings = Vec::new();
        for (idx, row) in snapshot.rows.iter().enumerate() {
            if columns.text(row, "InitiativeID").is_empty() {
                continue;
            }
            match parse_initiative(&columns, row, idx, &mut warnings) {
                Ok(initiative) => initiatives.push(initiative),
                Err(err) => skipped.push(err),
            }
        }
        Ok(Self {
            columns,
            initiatives,
            skipped,
            warnings,
        })
    }

    pub fn find(&self, id: &str) -> Option<&Initiative> {
        let id = id.trim();
        self.initiatives
            .iter()
            .find(|initiative| initiative.id.eq_ignore_ascii_case(id))
    }
}

fn parse_initiative(
    map: &ColumnMap,
    row: &[String],
    idx: usize,
    warnings: &mut Vec<SchemaError>,
) -> Result<Initiative, SchemaError> {
    let raw_kind = map.text(row, "Type");
    let kind = InitiativeKind::parse(raw_kind).ok_or_else(|| map.invalid(idx, "Type", raw_kind))?;
    let raw_status = map.text(row, "Status");
    let status =
        InitiativeStatus::parse(raw_status).ok_or_else(|| map.invalid(idx, "Status", raw_status))?;
    let budget = map.opt_f64(row, idx, "Budget").unwrap_or_else(|err| {
        warnings.push(err);
        None
    });

    Ok(Initiative {
        row: idx,
        id: map.text(row, "InitiativeID").to_string(),
        name: map.text(row, "Name").to_string(),
        kind,
        status,
        budget,
        requirement: map.text(row, "VoteRequirement").to_string(),
        vote_cycle: map.opt_u32(row, idx, "VoteCycle")?,
        projection: map.text(row, "Projection").to_string(),
        lead_faction: map.text(row, "LeadFaction").to_string(),
        opposition_faction: map.text(row, "OppositionFaction").to_string(),
        swing_voter: map.text(row, "SwingVoter").to_string(),
        swing_voter2: map.text(row, "SwingVoter2").to_string(),
        swing_voter2_lean: map.text(row, "SwingVoter2Lean").to_string(),
        affected_neighborhoods: split_list(map.text(row, "AffectedNeighborhoods")),
        outcome: map.text(row, "Outcome").to_string(),
        consequences: map.text(row, "Consequences").to_string(),
        notes: map.text(row, "Notes").to_string(),
        last_updated: map.text(row, "LastUpdated").to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Vote {
    Yes,
    No,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbabilitySource {
    Projection,
    Lean,
    Sentiment,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwingDecision {
    pub name: String,
    pub vote: Vote,
    /// The clamped value the coin-flip used.
    pub probability: f64,
    pub source: ProbabilitySource,
}

/// Result of resolving one initiative in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteOutcome {
    pub initiative_id: String,
    pub initiative_name: String,
    pub kind: InitiativeKind,
    pub status: InitiativeStatus,
    pub outcome: String,
    pub consequences: String,
    pub yes: u32,
    pub no: u32,
    pub tally: String,
    pub threshold: u32,
    pub available: u32,
    pub swing: Vec<SwingDecision>,
    pub notes: Vec<String>,
    pub affected_neighborhoods: Vec<String>,
    pub manual: bool,
}

impl VoteOutcome {
    /// Votes and grants that reached a decision; these spawn ripples.
    pub fn is_decided(&self) -> bool {
        matches!(
            self.status,
            InitiativeStatus::Passed
                | InitiativeStatus::Failed
                | InitiativeStatus::Approved
                | InitiativeStatus::Denied
        )
    }

    pub fn is_positive(&self) -> bool {
        matches!(
            self.status,
            InitiativeStatus::Passed | InitiativeStatus::Approved
        )
    }

    pub fn margin(&self) -> u32 {
        self.yes.abs_diff(self.no)
    }
}
