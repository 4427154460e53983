use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::rules::keywords::{infer_category, Category};
use crate::simulation::city::{neighborhood_key, Metric};
use crate::simulation::initiative::{InitiativeKind, VoteOutcome};
use crate::world::ledger::TableSnapshot;
use crate::world::schema::{split_list, ColumnMap, SchemaError, RIPPLE_SCHEMA};

pub const DECAY_FLOOR: f64 = 0.2;
/// Share of each coefficient applied per cycle, before decay.
pub const APPLY_RATE: f64 = 0.1;
/// Share of the sentiment coefficient applied once, on creation.
pub const CREATION_JOLT: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Positive => "positive",
            Direction::Negative => "negative",
        }
    }

    pub fn sign(self) -> f64 {
        match self {
            Direction::Positive => 1.0,
            Direction::Negative => -1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RippleStatus {
    Active,
    Expired,
}

impl RippleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RippleStatus::Active => "active",
            RippleStatus::Expired => "expired",
        }
    }
}

/// Linear fade over the ripple's lifetime: 1.0 at start, floored at 0.2.
pub fn decay_factor(start_cycle: u32, duration: u32, cycle: u32) -> f64 {
    let cycles_active = f64::from(cycle.saturating_sub(start_cycle));
    let duration = f64::from(duration.max(1));
    (1.0 - (cycles_active / duration) * 0.8).clamp(DECAY_FLOOR, 1.0)
}

/// Landslides ripple harder than squeakers. Grants carry a fixed strength.
pub fn strength_for(outcome: &VoteOutcome) -> f64 {
    if outcome.kind != InitiativeKind::CouncilVote {
        return 1.0;
    }
    match outcome.margin() {
        m if m >= 4 => 1.25,
        m if m <= 1 => 0.75,
        _ => 1.0,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Ripple {
    #[serde(skip)]
    pub row: Option<usize>,
    pub id: String,
    pub initiative: String,
    pub category: Category,
    pub direction: Direction,
    pub strength: f64,
    /// Signed, strength-scaled coefficients.
    pub effects: BTreeMap<Metric, f64>,
    /// Empty means city-wide.
    pub neighborhoods: Vec<String>,
    pub start_cycle: u32,
    pub duration: u32,
    pub end_cycle: u32,
    pub status: RippleStatus,
    pub last_decay: f64,
}

impl Ripple {
    pub fn from_outcome(outcome: &VoteOutcome, cycle: u32) -> Ripple {
        let rule = infer_category(&outcome.initiative_name);
        let direction = if outcome.is_positive() {
            Direction::Positive
        } else {
            Direction::Negative
        };
        let strength = strength_for(outcome);
        let effects = rule
            .effects
            .iter()
            .map(|(metric, coefficient)| (*metric, coefficient * strength * direction.sign()))
            .collect();
        Ripple {
            row: None,
            id: format!("RPL-{}-{}", cycle, outcome.initiative_id),
            initiative: outcome.initiative_name.clone(),
            category: rule.category,
            direction,
            strength,
            effects,
            neighborhoods: outcome.affected_neighborhoods.clone(),
            start_cycle: cycle,
            duration: rule.duration,
            end_cycle: cycle + rule.duration,
            status: RippleStatus::Active,
            last_decay: 1.0,
        }
    }

    pub fn decay_at(&self, cycle: u32) -> f64 {
        decay_factor(self.start_cycle, self.duration, cycle)
    }

    pub fn is_active_at(&self, cycle: u32) -> bool {
        self.status == RippleStatus::Active && cycle < self.end_cycle
    }

    pub fn is_city_wide(&self) -> bool {
        self.neighborhoods.is_empty()
    }

    pub fn touches(&self, neighborhood: &str) -> bool {
        let key = neighborhood_key(neighborhood);
        self.is_city_wide()
            || self
                .neighborhoods
                .iter()
                .any(|name| neighborhood_key(name) == key)
    }

    pub fn coefficient(&self, metric: Metric) -> f64 {
        self.effects.get(&metric).copied().unwrap_or(0.0)
    }

    /// Row layout matching the tracker header.
    pub fn to_row(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|col| match col.trim() {
                "RippleID" => self.id.clone(),
                "Initiative" => self.initiative.clone(),
                "Category" => self.category.as_str().to_string(),
                "Direction" => self.direction.as_str().to_string(),
                "Strength" => format!("{:.2}", self.strength),
                "Effects" => serde_json::to_string(&self.effects).unwrap_or_default(),
                "Neighborhoods" => self.neighborhoods.join(", "),
                "StartCycle" => self.start_cycle.to_string(),
                "Duration" => self.duration.to_string(),
                "EndCycle" => self.end_cycle.to_string(),
                "Status" => self.status.as_str().to_string(),
                "LastDecay" => format!("{:.4}", self.last_decay),
                _ => String::new(),
            })
            .collect()
    }
}

/// Decay-weighted sum of coefficients, per metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EffectBag(pub BTreeMap<Metric, f64>);

impl EffectBag {
    pub fn get(&self, metric: Metric) -> f64 {
        self.0.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Resource, Debug, Clone, Default)]
pub struct RippleRegistry {
    pub ripples: Vec<Ripple>,
    pub header: Vec<String>,
    pub columns: Option<ColumnMap>,
    pub skipped: Vec<SchemaError>,
}

impl RippleRegistry {
    /// A missing tracker store is an empty registry; a tracker with a broken header is an error.
    pub fn from_snapshot(snapshot: &TableSnapshot) -> Result<Self, SchemaError> {
        if !snapshot.exists {
            return Ok(RippleRegistry {
                header: RIPPLE_SCHEMA.header(),
                ..Default::default()
            });
        }
        let map = RIPPLE_SCHEMA.bind(snapshot)?;
        let mut registry = RippleRegistry {
            header: snapshot.header.clone(),
            ..Default::default()
        };
        for (idx, row) in snapshot.rows.iter().enumerate() {
            if map.text(row, "RippleID").is_empty() {
                continue;
            }
            match parse_ripple(&map, row, idx) {
                Ok(ripple) => registry.ripples.push(ripple),
                Err(err) => registry.skipped.push(err),
            }
        }
        registry.columns = Some(map);
        Ok(registry)
    }

    pub fn push(&mut self, ripple: Ripple) {
        self.ripples.push(ripple);
    }

    pub fn active(&self, cycle: u32) -> impl Iterator<Item = &Ripple> {
        self.ripples.iter().filter(move |ripple| ripple.is_active_at(cycle))
    }

    /// Combined effect of every active ripple touching `neighborhood`; `None`
    /// asks for the city-wide ripples only.
    pub fn effects_for(&self, neighborhood: Option<&str>, cycle: u32) -> EffectBag {
        let mut bag = EffectBag::default();
        for ripple in self.active(cycle) {
            let applies = match neighborhood {
                Some(name) => ripple.touches(name),
                None => ripple.is_city_wide(),
            };
            if !applies {
                continue;
            }
            let decay = ripple.decay_at(cycle);
            for (metric, coefficient) in ripple.effects.iter() {
                *bag.0.entry(*metric).or_insert(0.0) += coefficient * decay;
            }
        }
        bag
    }
}

fn parse_ripple(map: &ColumnMap, row: &[String], idx: usize) -> Result<Ripple, SchemaError> {
    let raw_category = map.text(row, "Category");
    let category =
        Category::parse(raw_category).ok_or_else(|| map.invalid(idx, "Category", raw_category))?;
    let raw_direction = map.text(row, "Direction");
    let direction = match raw_direction.to_ascii_lowercase().as_str() {
        "positive" => Direction::Positive,
        "negative" => Direction::Negative,
        _ => return Err(map.invalid(idx, "Direction", raw_direction)),
    };
    let raw_status = map.text(row, "Status");
    let status = match raw_status.to_ascii_lowercase().as_str() {
        "active" | "" => RippleStatus::Active,
        "expired" => RippleStatus::Expired,
        _ => return Err(map.invalid(idx, "Status", raw_status)),
    };
    let raw_effects = map.text(row, "Effects");
    let effects: BTreeMap<Metric, f64> = if raw_effects.is_empty() {
        BTreeMap::new()
    } else {
        serde_json::from_str(raw_effects).map_err(|_| map.invalid(idx, "Effects", raw_effects))?
    };
    let start_cycle = map
        .opt_u32(row, idx, "StartCycle")?
        .ok_or_else(|| map.invalid(idx, "StartCycle", ""))?;
    let duration = map
        .opt_u32(row, idx, "Duration")?
        .ok_or_else(|| map.invalid(idx, "Duration", ""))?;
    let end_cycle = map
        .opt_u32(row, idx, "EndCycle")?
        .unwrap_or(start_cycle + duration);

    Ok(Ripple {
        row: Some(idx),
        id: map.text(row, "RippleID").to_string(),
        initiative: map.text(row, "Initiative").to_string(),
        category,
        direction,
        strength: map.opt_f64(row, idx, "Strength")?.unwrap_or(1.0),
        effects,
        neighborhoods: split_list(map.text(row, "Neighborhoods")),
        start_cycle,
        duration,
        end_cycle,
        status,
        last_decay: map.opt_f64(row, idx, "LastDecay")?.unwrap_or(1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::initiative::InitiativeStatus;

    fn outcome(name: &str, status: InitiativeStatus, yes: u32, no: u32) -> VoteOutcome {
        VoteOutcome {
            initiative_id: "INIT-9".into(),
            initiative_name: name.into(),
            kind: InitiativeKind::CouncilVote,
            status,
            outcome: String::new(),
            consequences: String::new(),
            yes,
            no,
            tally: format!("{}-{}", yes, no),
            threshold: 5,
            available: yes + no,
            swing: Vec::new(),
            notes: Vec::new(),
            affected_neighborhoods: Vec::new(),
            manual: false,
        }
    }

    #[test]
    fn stadium_decay_schedule() {
        let ripple = Ripple::from_outcome(
            &outcome("Riverside Stadium Bond", InitiativeStatus::Passed, 6, 3),
            100,
        );
        assert_eq!(ripple.category, Category::Sports);
        assert_eq!(ripple.duration, 20);
        assert_eq!(ripple.end_cycle, 120);
        assert!((ripple.decay_at(110) - 0.6).abs() < 1e-9);
        assert!(ripple.is_active_at(119));
        assert!(!ripple.is_active_at(120));
    }

    #[test]
    fn decay_is_monotonic_and_bounded() {
        let mut previous = f64::INFINITY;
        for cycle in 50..90 {
            let decay = decay_factor(50, 12, cycle);
            assert!(decay <= previous);
            assert!((DECAY_FLOOR..=1.0).contains(&decay));
            previous = decay;
        }
        assert_eq!(decay_factor(50, 12, 80), DECAY_FLOOR);
        assert_eq!(decay_factor(50, 12, 40), 1.0);
    }

    #[test]
    fn failed_votes_flip_the_sign_and_narrow_margins_weaken() {
        let ripple = Ripple::from_outcome(
            &outcome("Harbor Transit Line", InitiativeStatus::Failed, 4, 5),
            10,
        );
        assert_eq!(ripple.direction, Direction::Negative);
        assert!((ripple.strength - 0.75).abs() < 1e-9);
        assert!((ripple.coefficient(Metric::Sentiment) + 0.15).abs() < 1e-9);
        assert!((ripple.coefficient(Metric::Traffic) - 0.225).abs() < 1e-9);
    }

    #[test]
    fn neighborhood_query_includes_city_wide() {
        let mut registry = RippleRegistry::default();
        let mut local = Ripple::from_outcome(
            &outcome("Temescal Clinic", InitiativeStatus::Passed, 6, 3),
            10,
        );
        local.neighborhoods = vec!["Temescal".into()];
        let city_wide = Ripple::from_outcome(
            &outcome("Charter Cleanup", InitiativeStatus::Passed, 6, 3),
            10,
        );
        registry.push(local);
        registry.push(city_wide);

        let bag = registry.effects_for(Some("temescal"), 10);
        assert!((bag.get(Metric::Sentiment) - (0.3 + 0.2)).abs() < 1e-9);

        let elsewhere = registry.effects_for(Some("Downtown"), 10);
        assert!((elsewhere.get(Metric::Sentiment) - 0.2).abs() < 1e-9);

        assert!(registry.effects_for(Some("temescal"), 40).is_empty());
    }

    #[test]
    fn tracker_rows_parse_back() {
        let ripple = Ripple::from_outcome(
            &outcome("Youth Library Hours", InitiativeStatus::Passed, 9, 0),
            3,
        );
        let header = RIPPLE_SCHEMA.header();
        let snapshot = TableSnapshot {
            exists: true,
            header: header.clone(),
            rows: vec![ripple.to_row(&header)],
        };
        let registry = RippleRegistry::from_snapshot(&snapshot).unwrap();
        let loaded = &registry.ripples[0];
        assert_eq!(loaded.category, Category::Education);
        assert_eq!(loaded.end_cycle, 21);
        assert!((loaded.strength - 1.25).abs() < 1e-9);
        assert_eq!(loaded.effects, ripple.effects);
        assert_eq!(loaded.row, Some(0));
    }
}
