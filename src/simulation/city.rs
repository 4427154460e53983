use std::collections::BTreeMap;

use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

use crate::world::ledger::TableSnapshot;
use crate::world::schema::{SchemaError, CITY_SCHEMA, DEMOGRAPHIC_SCHEMA, NEIGHBORHOOD_SCHEMA};

/// World-state scalars that ripples and sentiment act on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Sentiment,
    Community,
    Retail,
    Traffic,
    Nightlife,
    Sickness,
    Unemployment,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::Sentiment,
        Metric::Community,
        Metric::Retail,
        Metric::Traffic,
        Metric::Nightlife,
        Metric::Sickness,
        Metric::Unemployment,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Metric::Sentiment => "sentiment",
            Metric::Community => "community",
            Metric::Retail => "retail",
            Metric::Traffic => "traffic",
            Metric::Nightlife => "nightlife",
            Metric::Sickness => "sickness",
            Metric::Unemployment => "unemployment",
        }
    }

    /// Column name in the neighborhood store.
    pub fn column(self) -> &'static str {
        match self {
            Metric::Sentiment => "Sentiment",
            Metric::Community => "Community",
            Metric::Retail => "Retail",
            Metric::Traffic => "Traffic",
            Metric::Nightlife => "Nightlife",
            Metric::Sickness => "Sickness",
            Metric::Unemployment => "Unemployment",
        }
    }

    pub fn from_key(raw: &str) -> Option<Metric> {
        let raw = raw.trim().to_ascii_lowercase();
        Metric::ALL.into_iter().find(|metric| metric.key() == raw)
    }

    pub fn clamp(self, value: f64) -> f64 {
        match self {
            Metric::Sentiment => value.clamp(-1.0, 1.0),
            Metric::Sickness | Metric::Unemployment => value.clamp(0.0, 1.0),
            _ => value.max(0.0),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Scalars(BTreeMap<Metric, f64>);

impl Scalars {
    pub fn get(&self, metric: Metric) -> f64 {
        self.0.get(&metric).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        self.0.insert(metric, metric.clamp(value));
    }

    pub fn add(&mut self, metric: Metric, delta: f64) {
        let next = self.get(metric) + delta;
        self.set(metric, next);
    }
}

/// Head counts for one neighborhood.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Demographics {
    pub population: f64,
    pub students: f64,
    pub adults: f64,
    pub seniors: f64,
    pub unemployed: f64,
    pub sick: f64,
}

impl Demographics {
    pub fn absorb(&mut self, other: &Demographics) {
        self.population += other.population;
        self.students += other.students;
        self.adults += other.adults;
        self.seniors += other.seniors;
        self.unemployed += other.unemployed;
        self.sick += other.sick;
    }

    pub fn profile(&self) -> Option<DemographicProfile> {
        if self.population <= 0.0 {
            return None;
        }
        Some(DemographicProfile {
            senior_ratio: self.seniors / self.population,
            adult_ratio: self.adults / self.population,
            student_ratio: self.students / self.population,
            unemployment_rate: self.unemployed / self.population,
            sickness_rate: self.sick / self.population,
        })
    }
}

/// Ratios derived from aggregated head counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DemographicProfile {
    pub senior_ratio: f64,
    pub adult_ratio: f64,
    pub student_ratio: f64,
    pub unemployment_rate: f64,
    pub sickness_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NeighborhoodState {
    pub name: String,
    #[serde(skip)]
    pub row: usize,
    pub scalars: Scalars,
    #[serde(skip)]
    pub loaded: Scalars,
}

#[derive(Resource, Debug, Clone, Default, Serialize)]
pub struct CityState {
    pub scalars: Scalars,
    #[serde(skip)]
    pub loaded: Scalars,
    #[serde(skip)]
    pub metric_rows: BTreeMap<Metric, usize>,
    pub neighborhoods: BTreeMap<String, NeighborhoodState>,
    #[serde(skip)]
    pub neighborhood_columns: BTreeMap<Metric, usize>,
    pub demographics: BTreeMap<String, Demographics>,
}

pub fn neighborhood_key(name: &str) -> String {
    name.trim().to_lowercase()
}

impl CityState {
    pub fn sentiment(&self) -> f64 {
        self.scalars.get(Metric::Sentiment)
    }

    /// Apply a delta city-wide, or to one neighborhood when `scope` names it.
    /// Unknown neighborhoods are ignored and reported back as `false`.
    pub fn add(&mut self, metric: Metric, delta: f64, scope: Option<&str>) -> bool {
        match scope {
            None => {
                self.scalars.add(metric, delta);
                true
            }
            Some(name) => match self.neighborhoods.get_mut(&neighborhood_key(name)) {
                Some(hood) => {
                    hood.scalars.add(metric, delta);
                    true
                }
                None => false,
            },
        }
    }

    /// Aggregate head counts across the named neighborhoods, then derive ratios.
    /// None when nothing is known about any of them.
    pub fn aggregate_demographics(&self, names: &[String]) -> Option<DemographicProfile> {
        let mut total = Demographics::default();
        let mut found = false;
        for name in names {
            if let Some(counts) = self.demographics.get(&neighborhood_key(name)) {
                total.absorb(counts);
                found = true;
            }
        }
        if !found {
            return None;
        }
        total.profile()
    }

    pub fn from_snapshots(
        city: &TableSnapshot,
        neighborhoods: &TableSnapshot,
        demographics: &TableSnapshot,
    ) -> Result<Self, SchemaError> {
        let mut state = CityState::default();

        let map = CITY_SCHEMA.bind(city)?;
        for (idx, row) in city.rows.iter().enumerate() {
            let Some(metric) = Metric::from_key(map.text(row, "Metric")) else {
                continue;
            };
            let value = map.opt_f64(row, idx, "Value")?.unwrap_or(0.0);
            state.scalars.set(metric, value);
            state.metric_rows.insert(metric, idx);
        }
        state.loaded = state.scalars.clone();

        // Neighborhood scalars and demographics are optional stores.
        if neighborhoods.exists {
            let map = NEIGHBORHOOD_SCHEMA.bind(neighborhoods)?;
            for metric in Metric::ALL {
                if let Some(col) = map.col(metric.column()) {
                    state.neighborhood_columns.insert(metric, col);
                }
            }
            for (idx, row) in neighborhoods.rows.iter().enumerate() {
                let name = map.text(row, "Neighborhood");
                if name.is_empty() {
                    continue;
                }
                let mut scalars = Scalars::default();
                for metric in Metric::ALL {
                    if let Some(value) = map.opt_f64(row, idx, metric.column())? {
                        scalars.set(metric, value);
                    }
                }
                state.neighborhoods.insert(
                    neighborhood_key(name),
                    NeighborhoodState {
                        name: name.to_string(),
                        row: idx,
                        loaded: scalars.clone(),
                        scalars,
                    },
                );
            }
        }

        if demographics.exists {
            let map = DEMOGRAPHIC_SCHEMA.bind(demographics)?;
            for (idx, row) in demographics.rows.iter().enumerate() {
                let name = map.text(row, "Neighborhood");
                if name.is_empty() {
                    continue;
                }
                let counts = Demographics {
                    population: map.opt_f64(row, idx, "Population")?.unwrap_or(0.0),
                    students: map.opt_f64(row, idx, "Students")?.unwrap_or(0.0),
                    adults: map.opt_f64(row, idx, "Adults")?.unwrap_or(0.0),
                    seniors: map.opt_f64(row, idx, "Seniors")?.unwrap_or(0.0),
                    unemployed: map.opt_f64(row, idx, "Unemployed")?.unwrap_or(0.0),
                    sick: map.opt_f64(row, idx, "Sick")?.unwrap_or(0.0),
                };
                state
                    .demographics
                    .entry(neighborhood_key(name))
                    .or_default()
                    .absorb(&counts);
            }
        }

        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(header: &[&str], rows: &[&[&str]]) -> TableSnapshot {
        TableSnapshot {
            exists: true,
            header: header.iter().map(|s| s.to_string()).collect(),
            rows: rows
                .iter()
                .map(|row| row.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    fn city() -> CityState {
        CityState::from_snapshots(
            &snap(&["Metric", "Value"], &[&["sentiment", "0.2"], &["retail", "1.1"]]),
            &snap(
                &["Neighborhood", "Sentiment", "Traffic"],
                &[&["Temescal", "0.1", "0.5"], &["Downtown", "-0.3", "0.9"]],
            ),
            &snap(
                &["Neighborhood", "Population", "Seniors", "Sick", "Students"],
                &[&["Temescal", "100", "30", "10", "5"], &["Downtown", "300", "30", "6", "90"]],
            ),
        )
        .unwrap()
    }

    #[test]
    fn loads_city_and_neighborhoods() {
        let state = city();
        assert_eq!(state.sentiment(), 0.2);
        assert_eq!(state.scalars.get(Metric::Retail), 1.1);
        assert_eq!(state.metric_rows.get(&Metric::Retail), Some(&1));
        let downtown = &state.neighborhoods["downtown"];
        assert_eq!(downtown.scalars.get(Metric::Traffic), 0.9);
        assert!(!state.neighborhood_columns.contains_key(&Metric::Retail));
    }

    #[test]
    fn sentiment_is_clamped() {
        let mut state = city();
        state.add(Metric::Sentiment, 5.0, None);
        assert_eq!(state.sentiment(), 1.0);
        assert!(state.add(Metric::Sickness, -3.0, Some("Temescal")));
        assert_eq!(state.neighborhoods["temescal"].scalars.get(Metric::Sickness), 0.0);
        assert!(!state.add(Metric::Retail, 1.0, Some("Atlantis")));
    }

    #[test]
    fn demographics_aggregate_counts_not_ratios() {
        let state = city();
        let single = state
            .aggregate_demographics(&["Temescal".to_string()])
            .unwrap();
        assert!((single.senior_ratio - 0.30).abs() < 1e-9);
        assert!((single.sickness_rate - 0.10).abs() < 1e-9);

        let both = state
            .aggregate_demographics(&["temescal".to_string(), "Downtown".to_string()])
            .unwrap();
        assert!((both.senior_ratio - 60.0 / 400.0).abs() < 1e-9);
        assert!((both.student_ratio - 95.0 / 400.0).abs() < 1e-9);

        assert!(state.aggregate_demographics(&[]).is_none());
        assert!(state
            .aggregate_demographics(&["Atlantis".to_string()])
            .is_none());
    }
}
