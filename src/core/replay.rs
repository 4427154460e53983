use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::pipeline::{CycleError, PhaseResult};
use crate::world::ledger::{LedgerStore, WriteIntent};
use crate::world::schema::{CYCLE_SEEDS, CYCLE_SEED_SCHEMA, ERROR_LEDGER};

/// Stores the kernel appends to as bookkeeping. Their contents never feed a
/// phase decision, so they stay out of the input digest.
const BOOKKEEPING_STORES: [&str; 2] = [ERROR_LEDGER, CYCLE_SEEDS];

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Digest of the writes one phase issued, plus its failure message if any.
pub fn phase_digest(intents: &[WriteIntent], error: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    for intent in intents {
        hasher.update(intent.canonical_line().as_bytes());
        hasher.update(b"\n");
    }
    if let Some(message) = error {
        hasher.update(b"error:");
        hasher.update(message.as_bytes());
    }
    hex_encode(&hasher.finalize())
}

pub fn cycle_fingerprint(digests: &[PhaseDigest]) -> String {
    let mut hasher = Sha256::new();
    for entry in digests {
        hasher.update(entry.phase.as_bytes());
        hasher.update(b"=");
        hasher.update(entry.digest.as_bytes());
        hasher.update(b"\n");
    }
    hex_encode(&hasher.finalize())
}

/// Digest over the per-store read digests of one cycle, in store-name order.
pub fn input_digest(reads: &BTreeMap<String, String>) -> String {
    let mut hasher = Sha256::new();
    for (store, digest) in reads {
        if BOOKKEEPING_STORES.contains(&store.as_str()) {
            continue;
        }
        hasher.update(store.as_bytes());
        hasher.update(b"=");
        hasher.update(digest.as_bytes());
        hasher.update(b"\n");
    }
    hex_encode(&hasher.finalize())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseDigest {
    pub phase: String,
    pub digest: String,
}

impl From<&PhaseResult> for PhaseDigest {
    fn from(result: &PhaseResult) -> Self {
        Self {
            phase: result.phase.clone(),
            digest: result.digest.clone(),
        }
    }
}

/// One row of the seed store: enough to re-run a cycle and check the result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CycleRecord {
    pub cycle: u32,
    pub seed: u32,
    pub timestamp: DateTime<Utc>,
    pub fingerprint: String,
    pub phase_digests: Vec<PhaseDigest>,
    pub intent_count: usize,
    /// Blank on rows written before input digests were recorded.
    pub input_digest: String,
}

impl CycleRecord {
    pub fn from_results(
        cycle: u32,
        seed: u32,
        timestamp: DateTime<Utc>,
        input_digest: String,
        results: &[PhaseResult],
    ) -> Self {
        let phase_digests: Vec<PhaseDigest> = results.iter().map(PhaseDigest::from).collect();
        Self {
            cycle,
            seed,
            timestamp,
            input_digest,
            fingerprint: cycle_fingerprint(&phase_digests),
            intent_count: results.iter().map(|result| result.intents).sum(),
            phase_digests,
        }
    }

    pub fn to_row(&self, header: &[String]) -> Vec<String> {
        header
            .iter()
            .map(|col| match col.trim() {
                "Cycle" => self.cycle.to_string(),
                "Seed" => self.seed.to_string(),
                "Timestamp" => self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                "Fingerprint" => self.fingerprint.clone(),
                "PhaseDigests" => serde_json::to_string(&self.phase_digests).unwrap_or_default(),
                "IntentCount" => self.intent_count.to_string(),
                "InputDigest" => self.input_digest.clone(),
                _ => String::new(),
            })
            .collect()
    }
}

/// Latest recorded row for `cycle`. Later rows win so a re-run cycle replays as re-run.
pub fn find_cycle_record(
    ledger: &mut dyn LedgerStore,
    cycle: u32,
) -> Result<CycleRecord, CycleError> {
    let snapshot = ledger.get_all_rows(CYCLE_SEEDS)?;
    if !snapshot.exists {
        return Err(CycleError::NoSeedRecord(cycle));
    }
    let map = CYCLE_SEED_SCHEMA
        .bind(&snapshot)
        .map_err(|err| CycleError::CorruptSeedRecord {
            cycle,
            reason: err.to_string(),
        })?;

    let corrupt = |reason: String| CycleError::CorruptSeedRecord { cycle, reason };
    let (idx, row) = snapshot
        .rows
        .iter()
        .enumerate()
        .rev()
        .find(|(idx, row)| matches!(map.opt_u32(row, *idx, "Cycle"), Ok(Some(c)) if c == cycle))
        .ok_or(CycleError::NoSeedRecord(cycle))?;

    let seed = map
        .text(row, "Seed")
        .parse::<u32>()
        .map_err(|err| corrupt(format!("seed: {err}")))?;
    let timestamp = DateTime::parse_from_rfc3339(map.text(row, "Timestamp"))
        .map_err(|err| corrupt(format!("timestamp: {err}")))?
        .with_timezone(&Utc);
    let phase_digests: Vec<PhaseDigest> = serde_json::from_str(map.text(row, "PhaseDigests"))
        .map_err(|err| corrupt(format!("phase digests: {err}")))?;
    let intent_count = map
        .opt_u32(row, idx, "IntentCount")
        .map_err(|err| corrupt(err.to_string()))?
        .unwrap_or(0) as usize;

    Ok(CycleRecord {
        cycle,
        seed,
        timestamp,
        fingerprint: map.text(row, "Fingerprint").to_string(),
        phase_digests,
        intent_count,
        input_digest: map.text(row, "InputDigest").to_string(),
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplayVerdict {
    Matched,
    /// Outputs differ, but so did the stores the cycle read. Not evidence either way.
    InputsChanged,
    /// Outputs differ from identical (or unrecorded) inputs.
    Diverged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplayReport {
    pub cycle: u32,
    pub verdict: ReplayVerdict,
    pub matched: bool,
    pub recorded_fingerprint: String,
    pub replayed_fingerprint: String,
    pub recorded_inputs: String,
    pub replayed_inputs: String,
    pub diffs: Vec<String>,
}

impl ReplayReport {
    pub fn compare(recorded: &CycleRecord, replayed: &CycleRecord) -> Self {
        let inputs_changed =
            !recorded.input_digest.is_empty() && recorded.input_digest != replayed.input_digest;
        let mut diffs = Vec::new();
        if recorded.seed != replayed.seed {
            diffs.push(format!("seed: recorded {} replayed {}", recorded.seed, replayed.seed));
        }
        if recorded.intent_count != replayed.intent_count {
            diffs.push(format!(
                "intent count: recorded {} replayed {}",
                recorded.intent_count, replayed.intent_count
            ));
        }
        for original in &recorded.phase_digests {
            match replayed
                .phase_digests
                .iter()
                .find(|entry| entry.phase == original.phase)
            {
                Some(entry) if entry.digest != original.digest => diffs.push(format!(
                    "phase {}: recorded {} replayed {}",
                    original.phase,
                    short(&original.digest),
                    short(&entry.digest)
                )),
                Some(_) => {}
                None => diffs.push(format!("phase {}: missing from replay", original.phase)),
            }
        }
        for entry in &replayed.phase_digests {
            if !recorded
                .phase_digests
                .iter()
                .any(|original| original.phase == entry.phase)
            {
                diffs.push(format!("phase {}: not in recorded cycle", entry.phase));
            }
        }
        if diffs.is_empty() && recorded.fingerprint != replayed.fingerprint {
            diffs.push("fingerprint differs with identical phase digests".to_string());
        }

        let matched = diffs.is_empty();
        let verdict = match (matched, inputs_changed) {
            (true, _) => ReplayVerdict::Matched,
            (false, true) => {
                diffs.insert(
                    0,
                    format!(
                        "inputs changed since cycle {}: recorded {} replayed {}",
                        recorded.cycle,
                        short(&recorded.input_digest),
                        short(&replayed.input_digest)
                    ),
                );
                ReplayVerdict::InputsChanged
            }
            (false, false) => ReplayVerdict::Diverged,
        };

        Self {
            cycle: recorded.cycle,
            verdict,
            matched,
            recorded_fingerprint: recorded.fingerprint.clone(),
            replayed_fingerprint: replayed.fingerprint.clone(),
            recorded_inputs: recorded.input_digest.clone(),
            replayed_inputs: replayed.input_digest.clone(),
            diffs,
        }
    }

    /// Identical inputs, different outputs.
    pub fn is_nondeterministic(&self) -> bool {
        self.verdict == ReplayVerdict::Diverged
    }
}

fn short(digest: &str) -> &str {
    digest.get(..12).unwrap_or(digest)
}
