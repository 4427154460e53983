use bevy_ecs::prelude::*;
use serde::Serialize;

use crate::world::ledger::TableSnapshot;
use crate::world::schema::{SchemaError, OFFICE_SCHEMA};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SeatStatus {
    Active,
    Hospitalized,
    SeriousCondition,
    Critical,
    Injured,
    Deceased,
    Resigned,
    Retired,
    Vacant,
}

impl SeatStatus {
    pub fn parse(raw: &str) -> Option<SeatStatus> {
        let normalized = raw.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        let status = match normalized.as_str() {
            "" | "active" => SeatStatus::Active,
            "hospitalized" => SeatStatus::Hospitalized,
            "serious-condition" | "serious" => SeatStatus::SeriousCondition,
            "critical" => SeatStatus::Critical,
            "injured" => SeatStatus::Injured,
            "deceased" => SeatStatus::Deceased,
            "resigned" => SeatStatus::Resigned,
            "retired" => SeatStatus::Retired,
            "vacant" => SeatStatus::Vacant,
            _ => return None,
        };
        Some(status)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SeatStatus::Active => "active",
            SeatStatus::Hospitalized => "hospitalized",
            SeatStatus::SeriousCondition => "serious-condition",
            SeatStatus::Critical => "critical",
            SeatStatus::Injured => "injured",
            SeatStatus::Deceased => "deceased",
            SeatStatus::Resigned => "resigned",
            SeatStatus::Retired => "retired",
            SeatStatus::Vacant => "vacant",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CouncilSeat {
    pub office_id: String,
    pub title: String,
    pub district: String,
    pub holder: String,
    pub holder_id: String,
    pub status: SeatStatus,
    pub faction: String,
    pub voting_power: bool,
}

impl CouncilSeat {
    pub fn is_vacant(&self) -> bool {
        self.status == SeatStatus::Vacant || self.holder.trim().is_empty()
    }

    /// A vote only counts while the seat is filled and its holder is active.
    pub fn can_vote(&self) -> bool {
        self.voting_power && self.status == SeatStatus::Active && !self.is_vacant()
    }

    pub fn is_held_by(&self, name: &str) -> bool {
        let name = name.trim();
        !name.is_empty() && self.holder.trim().eq_ignore_ascii_case(name)
    }

    pub fn in_faction(&self, code: &str) -> bool {
        let code = code.trim();
        !code.is_empty() && self.faction.trim().eq_ignore_ascii_case(code)
    }
}

/// Voting seats plus the non-voting executive, loaded once per cycle.
#[derive(Resource, Debug, Clone, Default, Serialize)]
pub struct Council {
    pub seats: Vec<CouncilSeat>,
    pub executive: Option<CouncilSeat>,
}

impl Council {
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Result<Self, SchemaError> {
        let map = OFFICE_SCHEMA.bind(snapshot)?;
        let mut council = Council::default();
        for (idx, row) in snapshot.rows.iter().enumerate() {
            let office_id = map.text(row, "OfficeID");
            if office_id.is_empty() {
                continue;
            }
            let raw_status = map.text(row, "Status");
            let status = SeatStatus::parse(raw_status)
                .ok_or_else(|| map.invalid(idx, "Status", raw_status))?;
            let seat = CouncilSeat {
                office_id: office_id.to_string(),
                title: map.text(row, "Title").to_string(),
                district: map.text(row, "District").to_string(),
                holder: map.text(row, "Holder").to_string(),
                holder_id: map.text(row, "HolderID").to_string(),
                status,
                faction: map.text(row, "Faction").to_string(),
                voting_power: parse_flag(map.text(row, "VotingPower")),
            };
            if seat.voting_power {
                council.seats.push(seat);
            } else if council.executive.is_none() && is_executive_title(&seat.title) {
                council.executive = Some(seat);
            }
        }
        Ok(council)
    }

    pub fn available(&self) -> impl Iterator<Item = &CouncilSeat> {
        self.seats.iter().filter(|seat| seat.can_vote())
    }

    pub fn available_count(&self) -> usize {
        self.available().count()
    }

    pub fn vacant_count(&self) -> usize {
        self.seats.iter().filter(|seat| seat.is_vacant()).count()
    }

    /// Filled seats whose holder cannot vote right now.
    pub fn absent(&self) -> impl Iterator<Item = &CouncilSeat> {
        self.seats
            .iter()
            .filter(|seat| !seat.is_vacant() && seat.status != SeatStatus::Active)
    }
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "x"
    )
}

fn is_executive_title(title: &str) -> bool {
    let title = title.to_ascii_lowercase();
    title.contains("mayor") || title.contains("executive")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn office_snapshot(rows: &[[&str; 6]]) -> TableSnapshot {
        TableSnapshot {
            exists: true,
            header: ["OfficeID", "Title", "Holder", "Status", "Faction", "VotingPower"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn availability_excludes_vacant_and_incapacitated() {
        let council = Council::from_snapshot(&office_snapshot(&[
            ["D1", "Council D1", "Ana Ruiz", "active", "OPP", "yes"],
            ["D2", "Council D2", "Ben Cole", "Hospitalized", "CRC", "yes"],
            ["D3", "Council D3", "", "active", "IND", "yes"],
            ["D4", "Council D4", "Dee Park", "vacant", "IND", "yes"],
            ["MAYOR", "Mayor", "Rosa Vale", "active", "", "no"],
        ]))
        .unwrap();
        assert_eq!(council.seats.len(), 4);
        assert_eq!(council.available_count(), 1);
        assert_eq!(council.vacant_count(), 2);
        let absent: Vec<&str> = council.absent().map(|s| s.holder.as_str()).collect();
        assert_eq!(absent, vec!["Ben Cole"]);
        assert_eq!(council.executive.as_ref().unwrap().holder, "Rosa Vale");
        assert!(council.seats.iter().any(|seat| seat.is_held_by("ana ruiz")));
    }

    #[test]
    fn unknown_status_is_a_schema_error() {
        let err = Council::from_snapshot(&office_snapshot(&[[
            "D1", "Council D1", "Ana", "on vacation", "OPP", "yes",
        ]]))
        .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidValue { .. }));
    }

    #[test]
    fn missing_faction_column_fails_closed() {
        let mut snap = office_snapshot(&[]);
        snap.header.retain(|col| col != "Faction");
        assert!(matches!(
            Council::from_snapshot(&snap),
            Err(SchemaError::MissingColumns { .. })
        ));
    }
}
