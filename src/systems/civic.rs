use bevy_ecs::prelude::*;
use bevy_utils::tracing::{debug, info, warn};
use serde::Serialize;
use serde_json::json;

use crate::core::context::CycleContext;
use crate::core::pipeline::PhaseError;
use crate::core::rng::CycleRng;
use crate::rules::demographics::alignment_modifier;
use crate::rules::probability::{
    clamp_swing, grant_probability, lean_probability, parse_requirement, projection_probability,
};
use crate::simulation::city::{CityState, DemographicProfile, Metric};
use crate::simulation::council::{Council, CouncilSeat};
use crate::simulation::initiative::{
    Initiative, InitiativeBook, InitiativeKind, InitiativeStatus, ProbabilitySource,
    SwingDecision, Vote, VoteOutcome,
};
use crate::simulation::ripple::{Ripple, RippleRegistry, CREATION_JOLT};
use crate::systems::take_resource;
use crate::world::ledger::LedgerStore;
use crate::world::schema::{format_scalar, ColumnMap, INITIATIVES, RIPPLES};

const PHASE: &str = "civic_initiatives";
const ACTIVATION_WINDOW: u32 = 3;
const UNNAMED_SWING_BASE: f64 = 0.5;
const MANUAL_TAG: &str = "[manual override]";

/// Everything one resolution needs besides the initiative itself.
pub struct VoteInputs<'a> {
    pub council: &'a Council,
    pub sentiment: f64,
    pub profile: Option<&'a DemographicProfile>,
}

/// The vote resolution algorithm. Draws once per swing voter, in seat order,
/// after the two named voters.
pub fn resolve_council_vote(
    initiative: &Initiative,
    inputs: &VoteInputs<'_>,
    rng: &mut CycleRng,
) -> VoteOutcome {
    let council = inputs.council;
    let requirement = parse_requirement(&initiative.requirement);
    let available = council.available_count() as u32;
    let mut outcome = blank_outcome(initiative);
    outcome.threshold = requirement.threshold;
    outcome.available = available;
    outcome.notes = attendance_notes(council);

    if available < requirement.threshold {
        outcome.status = InitiativeStatus::Delayed;
        outcome.outcome = "DELAYED".to_string();
        outcome.consequences = format!(
            "Vote delayed: {} of {} required votes available.",
            available, requirement.threshold
        );
        return outcome;
    }

    let primary = named_voter(council, &initiative.swing_voter);
    let secondary = named_voter(council, &initiative.swing_voter2)
        .filter(|seat| primary.map_or(true, |first| first.office_id != seat.office_id));
    let is_named = |seat: &CouncilSeat| {
        [primary, secondary]
            .iter()
            .flatten()
            .any(|named| named.office_id == seat.office_id)
    };

    let mut yes = 0u32;
    let mut no = 0u32;
    let mut unnamed = Vec::new();
    for seat in council.available() {
        if is_named(seat) {
            continue;
        }
        if seat.in_faction(&initiative.lead_faction) {
            yes += 1;
        } else if seat.in_faction(&initiative.opposition_faction) {
            no += 1;
        } else {
            unnamed.push(seat);
        }
    }

    let alignment = alignment_modifier(&initiative.name, inputs.profile);
    let sentiment = inputs.sentiment;
    let mut swing = Vec::new();
    if let Some(seat) = primary {
        let mut base = projection_probability(&initiative.projection) + sentiment * 0.1;
        if requirement.is_supermajority() {
            base -= 0.05;
        }
        swing.push(cast_swing(seat, base + alignment, ProbabilitySource::Projection, rng));
    }
    if let Some(seat) = secondary {
        let base = lean_probability(&initiative.swing_voter2_lean) + sentiment * 0.05;
        swing.push(cast_swing(seat, base + alignment, ProbabilitySource::Lean, rng));
    }
    for seat in unnamed {
        let base = UNNAMED_SWING_BASE + sentiment * 0.15;
        swing.push(cast_swing(seat, base + alignment, ProbabilitySource::Sentiment, rng));
    }

    for decision in &swing {
        match decision.vote {
            Vote::Yes => yes += 1,
            Vote::No => no += 1,
        }
    }

    let passed = yes >= requirement.threshold;
    outcome.yes = yes;
    outcome.no = no;
    outcome.tally = format!("{}-{}", yes, no);
    outcome.swing = swing;
    if passed {
        outcome.status = InitiativeStatus::Passed;
        outcome.outcome = format!("PASSED {}", outcome.tally);
        outcome.consequences = format!("{} passed {}.", initiative.name, outcome.tally);
        if let Some(executive) = &council.executive {
            outcome
                .notes
                .push(format!("{} ({}) may veto", executive.holder, executive.title));
        }
    } else {
        outcome.status = InitiativeStatus::Failed;
        outcome.outcome = format!("FAILED {}", outcome.tally);
        outcome.consequences = format!(
            "{} failed {} (needed {}).",
            initiative.name, outcome.tally, requirement.threshold
        );
    }
    outcome
}

/// Single roll against the grant projection.
pub fn resolve_grant(initiative: &Initiative, sentiment: f64, rng: &mut CycleRng) -> VoteOutcome {
    let probability = grant_probability(&initiative.projection, sentiment);
    let approved = rng.chance(probability);
    let mut outcome = blank_outcome(initiative);
    let amount = initiative
        .budget
        .map(|budget| format!(" (${:.0})", budget))
        .unwrap_or_default();
    if approved {
        outcome.status = InitiativeStatus::Approved;
        outcome.outcome = "APPROVED".to_string();
        outcome.consequences = format!("Grant{} approved for {}.", amount, initiative.name);
    } else {
        outcome.status = InitiativeStatus::Denied;
        outcome.outcome = "DENIED".to_string();
        outcome.consequences = format!("Grant{} denied for {}.", amount, initiative.name);
    }
    outcome
        .notes
        .push(format!("approval odds {:.2}", probability));
    outcome
}

pub fn resolve_visioning(initiative: &Initiative) -> VoteOutcome {
    let mut outcome = blank_outcome(initiative);
    outcome.status = InitiativeStatus::VisioningComplete;
    outcome.outcome = "COMPLETE".to_string();
    outcome.consequences =
        "Community input gathered; recommendations forwarded to council.".to_string();
    outcome
}

fn blank_outcome(initiative: &Initiative) -> VoteOutcome {
    VoteOutcome {
        initiative_id: initiative.id.clone(),
        initiative_name: initiative.name.clone(),
        kind: initiative.kind,
        status: initiative.status,
        outcome: String::new(),
        consequences: String::new(),
        yes: 0,
        no: 0,
        tally: String::new(),
        threshold: 0,
        available: 0,
        swing: Vec::new(),
        notes: Vec::new(),
        affected_neighborhoods: initiative.affected_neighborhoods.clone(),
        manual: false,
    }
}

fn named_voter<'c>(council: &'c Council, name: &str) -> Option<&'c CouncilSeat> {
    council.available().find(|seat| seat.is_held_by(name))
}

fn cast_swing(
    seat: &CouncilSeat,
    probability: f64,
    source: ProbabilitySource,
    rng: &mut CycleRng,
) -> SwingDecision {
    let probability = clamp_swing(probability);
    let vote = if rng.chance(probability) {
        Vote::Yes
    } else {
        Vote::No
    };
    SwingDecision {
        name: seat.holder.clone(),
        vote,
        probability,
        source,
    }
}

fn attendance_notes(council: &Council) -> Vec<String> {
    let mut notes: Vec<String> = council
        .absent()
        .map(|seat| format!("absent: {} ({})", seat.holder, seat.status.as_str()))
        .collect();
    let vacant = council.vacant_count();
    if vacant > 0 {
        notes.push(format!("vacant seats: {}", vacant));
    }
    notes
}

/// What the scheduler does with one initiative this cycle, before any roll.
#[derive(Debug, Clone, PartialEq)]
struct Plan {
    status: InitiativeStatus,
    vote_cycle: Option<u32>,
    due: bool,
}

fn plan(initiative: &Initiative, cycle: u32) -> Plan {
    let mut status = initiative.status;
    let mut vote_cycle = initiative.vote_cycle;

    // Delayed votes and scheduled votes whose cycle went by are both taken now.
    let overdue = vote_cycle.is_some_and(|scheduled| scheduled < cycle)
        && matches!(
            status,
            InitiativeStatus::Active | InitiativeStatus::PendingVote
        );
    if status == InitiativeStatus::Delayed || overdue {
        vote_cycle = Some(cycle);
        status = InitiativeStatus::PendingVote;
    }
    if let Some(scheduled) = vote_cycle.filter(|scheduled| *scheduled > cycle) {
        let cycles_out = scheduled - cycle;
        if status == InitiativeStatus::Proposed && cycles_out <= ACTIVATION_WINDOW {
            status = InitiativeStatus::Active;
        }
        if status == InitiativeStatus::Active && cycles_out == 1 {
            status = InitiativeStatus::PendingVote;
        }
    }

    Plan {
        status,
        vote_cycle,
        due: vote_cycle == Some(cycle),
    }
}

/// Cell writes for one initiative row.
struct RowWriter<'m> {
    columns: &'m ColumnMap,
    row: usize,
}

impl RowWriter<'_> {
    fn set(&self, ledger: &mut dyn LedgerStore, column: &str, value: String) {
        match self.columns.col(column) {
            Some(col) => ledger.queue_cell_write(INITIATIVES, self.row, col, value),
            None => debug!(column, row = self.row, "initiative column absent, write skipped"),
        }
    }
}

fn dispatch(
    initiative: &Initiative,
    council: &Council,
    city: &CityState,
    rng: &mut CycleRng,
) -> VoteOutcome {
    match initiative.kind {
        InitiativeKind::CouncilVote => {
            let profile = city.aggregate_demographics(&initiative.affected_neighborhoods);
            let inputs = VoteInputs {
                council,
                sentiment: city.sentiment(),
                profile: profile.as_ref(),
            };
            resolve_council_vote(initiative, &inputs, rng)
        }
        InitiativeKind::ExternalGrant => resolve_grant(initiative, city.sentiment(), rng),
        InitiativeKind::Visioning => resolve_visioning(initiative),
    }
}

/// Resolution side effects shared by the scheduled pass and the manual override:
/// row write-back, the ripple, and the creation jolt.
fn commit_outcome(
    ctx: &mut CycleContext<'_>,
    columns: &ColumnMap,
    initiative: &Initiative,
    outcome: &VoteOutcome,
    city: &mut CityState,
    ripples: &mut RippleRegistry,
) {
    let stamp = ctx.stamp();
    let writer = RowWriter {
        columns,
        row: initiative.row,
    };
    let ledger: &mut dyn LedgerStore = &mut ctx.ledger;
    writer.set(ledger, "Status", outcome.status.as_str().to_string());
    writer.set(ledger, "Outcome", outcome.outcome.clone());
    writer.set(ledger, "Consequences", outcome.consequences.clone());
    writer.set(
        ledger,
        "Notes",
        append_note(&initiative.notes, ctx.cycle, outcome),
    );
    writer.set(ledger, "LastUpdated", stamp);

    let status = outcome.status.as_str();
    info!(
        cycle = ctx.cycle,
        initiative = %outcome.initiative_id,
        status,
        tally = %outcome.tally,
        manual = outcome.manual,
        "initiative resolved"
    );
    ctx.summary.bump(&format!("initiatives_{}", status.replace('-', "_")), 1);

    if outcome.is_decided() {
        let ripple = Ripple::from_outcome(outcome, ctx.cycle);
        let jolt = ripple.coefficient(Metric::Sentiment) * CREATION_JOLT;
        city.add(Metric::Sentiment, jolt, None);
        debug!(
            ripple = %ripple.id,
            category = ripple.category.as_str(),
            jolt = %format_scalar(jolt),
            "ripple created"
        );
        ctx.ledger
            .queue_append_row(RIPPLES, ripple.to_row(&ripples.header));
        ripples.push(ripple);
        ctx.summary.bump("ripples_created", 1);
    }
    ctx.summary.vote_outcomes.push(outcome.clone());
}

fn append_note(existing: &str, cycle: u32, outcome: &VoteOutcome) -> String {
    let mut line = format!("Cycle {}:", cycle);
    if outcome.manual {
        line.push(' ');
        line.push_str(MANUAL_TAG);
    }
    line.push(' ');
    line.push_str(&outcome.outcome);
    for note in &outcome.notes {
        line.push_str("; ");
        line.push_str(note);
    }
    let existing = existing.trim();
    if existing.is_empty() {
        line
    } else {
        format!("{}\n{}", existing, line)
    }
}

struct CivicState {
    council: Council,
    city: CityState,
    ripples: RippleRegistry,
}

impl CivicState {
    fn take(world: &mut World) -> Result<Self, PhaseError> {
        let council = take_resource::<Council>(world, "Council")?;
        let city = match take_resource::<CityState>(world, "CityState") {
            Ok(city) => city,
            Err(err) => {
                world.insert_resource(council);
                return Err(err);
            }
        };
        let ripples = match take_resource::<RippleRegistry>(world, "RippleRegistry") {
            Ok(ripples) => ripples,
            Err(err) => {
                world.insert_resource(council);
                world.insert_resource(city);
                return Err(err);
            }
        };
        Ok(Self {
            council,
            city,
            ripples,
        })
    }

    fn restore(self, world: &mut World) {
        world.insert_resource(self.council);
        world.insert_resource(self.city);
        world.insert_resource(self.ripples);
    }
}

fn load_book(ctx: &mut CycleContext<'_>, phase: &str) -> Result<InitiativeBook, PhaseError> {
    let snapshot = ctx.ledger.get_all_rows(INITIATIVES)?;
    let book = InitiativeBook::from_snapshot(&snapshot).map_err(|err| {
        warn!(cycle = ctx.cycle, store = INITIATIVES, error = %err, "initiative pass skipped");
        err
    })?;
    for skipped in &book.skipped {
        warn!(cycle = ctx.cycle, error = %skipped, "initiative row skipped");
        ctx.summary.audit(phase, skipped.to_string());
    }
    for bad in &book.warnings {
        warn!(cycle = ctx.cycle, error = %bad, "initiative cell ignored");
        ctx.summary.audit(phase, bad.to_string());
    }
    Ok(book)
}

/// Phase: the civic initiative engine's scheduled pass.
pub fn civic_initiatives(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let book = load_book(ctx, PHASE)?;
    let mut state = CivicState::take(&mut ctx.world)?;
    let cycle = ctx.cycle;
    let stamp = ctx.stamp();

    let mut advanced = 0;
    let mut resolved = Vec::new();
    for initiative in &book.initiatives {
        if initiative.status.is_terminal() {
            continue;
        }
        let plan = plan(initiative, cycle);
        let writer = RowWriter {
            columns: &book.columns,
            row: initiative.row,
        };
        if plan.vote_cycle != initiative.vote_cycle {
            if let Some(vote_cycle) = plan.vote_cycle {
                writer.set(&mut ctx.ledger, "VoteCycle", vote_cycle.to_string());
            }
        }

        if !plan.due {
            if plan.status != initiative.status {
                writer.set(&mut ctx.ledger, "Status", plan.status.as_str().to_string());
                writer.set(&mut ctx.ledger, "LastUpdated", stamp.clone());
                debug!(
                    cycle,
                    initiative = %initiative.id,
                    from = initiative.status.as_str(),
                    to = plan.status.as_str(),
                    "initiative advanced"
                );
                advanced += 1;
            }
            continue;
        }

        let outcome = dispatch(initiative, &state.council, &state.city, &mut ctx.rng);
        commit_outcome(
            ctx,
            &book.columns,
            initiative,
            &outcome,
            &mut state.city,
            &mut state.ripples,
        );
        resolved.push(json!({
            "id": outcome.initiative_id,
            "status": outcome.status.as_str(),
            "tally": outcome.tally,
        }));
    }
    state.restore(&mut ctx.world);

    ctx.summary.bump("initiatives_advanced", advanced);
    ctx.summary.record_output(
        PHASE,
        json!({
            "considered": book.initiatives.len(),
            "advanced": advanced,
            "resolved": resolved,
            "skipped_rows": book.skipped.len(),
        }),
    );
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "kebab-case")]
pub enum ManualResolution {
    Resolved { outcome: VoteOutcome },
    AlreadyResolved { id: String, status: InitiativeStatus },
    NotFound { id: String },
}

/// Which initiative the manual-override phase should resolve, and what happened.
#[derive(Resource, Debug, Clone, Default)]
pub struct ManualRequest {
    pub target: String,
    pub result: Option<ManualResolution>,
}

/// Phase: resolve `ManualRequest::target` now, outside its schedule.
pub fn manual_resolution(ctx: &mut CycleContext<'_>) -> Result<(), PhaseError> {
    let phase = "manual_resolution";
    let target = ctx
        .world
        .get_resource::<ManualRequest>()
        .map(|request| request.target.clone())
        .ok_or(PhaseError::MissingResource("ManualRequest"))?;
    let book = load_book(ctx, phase)?;

    let result = match book.find(&target) {
        None => ManualResolution::NotFound { id: target },
        Some(initiative) if initiative.status.is_terminal() => {
            info!(
                initiative = %initiative.id,
                status = initiative.status.as_str(),
                "manual override refused"
            );
            ManualResolution::AlreadyResolved {
                id: initiative.id.clone(),
                status: initiative.status,
            }
        }
        Some(initiative) => {
            let mut state = CivicState::take(&mut ctx.world)?;
            let mut outcome = dispatch(initiative, &state.council, &state.city, &mut ctx.rng);
            outcome.manual = true;
            commit_outcome(
                ctx,
                &book.columns,
                initiative,
                &outcome,
                &mut state.city,
                &mut state.ripples,
            );
            state.restore(&mut ctx.world);
            ManualResolution::Resolved { outcome }
        }
    };

    if let Some(mut request) = ctx.world.get_resource_mut::<ManualRequest>() {
        request.result = Some(result);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::council::SeatStatus;

    fn seat(name: &str, faction: &str) -> CouncilSeat {
        CouncilSeat {
            office_id: format!("OFF-{}", name),
            title: "Council Member".into(),
            district: String::new(),
            holder: name.into(),
            holder_id: String::new(),
            status: SeatStatus::Active,
            faction: faction.into(),
            voting_power: true,
        }
    }

    fn council(factions: &[&str]) -> Council {
        Council {
            seats: factions
                .iter()
                .enumerate()
                .map(|(idx, faction)| seat(&format!("Member{}", idx), faction))
                .collect(),
            executive: None,
        }
    }

    fn initiative(name: &str, requirement: &str) -> Initiative {
        Initiative {
            row: 0,
            id: "INIT-1".into(),
            name: name.into(),
            kind: InitiativeKind::CouncilVote,
            status: InitiativeStatus::PendingVote,
            budget: None,
            requirement: requirement.into(),
            vote_cycle: Some(10),
            projection: String::new(),
            lead_faction: "OPP".into(),
            opposition_faction: "CRC".into(),
            swing_voter: String::new(),
            swing_voter2: String::new(),
            swing_voter2_lean: String::new(),
            affected_neighborhoods: Vec::new(),
            outcome: String::new(),
            consequences: String::new(),
            notes: String::new(),
            last_updated: String::new(),
        }
    }

    fn scenario_a_council() -> Council {
        council(&["OPP", "OPP", "OPP", "OPP", "CRC", "CRC", "CRC", "IND", "IND"])
    }

    #[test]
    fn two_independents_decide_a_simple_majority() {
        let council = scenario_a_council();
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.0,
            profile: None,
        };
        let bill = initiative("Charter Amendment", "5-4");
        for seed in 0..50 {
            let outcome = resolve_council_vote(&bill, &inputs, &mut CycleRng::from_seed(seed));
            let independents_yes = outcome
                .swing
                .iter()
                .filter(|decision| decision.vote == Vote::Yes)
                .count();
            assert_eq!(outcome.swing.len(), 2);
            assert!(outcome.swing.iter().all(|d| d.probability == 0.5));
            assert_eq!(outcome.yes, 4 + independents_yes as u32);
            assert_eq!(outcome.yes + outcome.no, 9);
            assert_eq!(
                outcome.status == InitiativeStatus::Passed,
                independents_yes >= 1
            );
        }
    }

    #[test]
    fn scenario_a_passes_about_three_times_in_four() {
        let council = scenario_a_council();
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.0,
            profile: None,
        };
        let bill = initiative("Charter Amendment", "5-4");
        let runs = 4000;
        let passes = (0..runs)
            .filter(|seed| {
                resolve_council_vote(&bill, &inputs, &mut CycleRng::for_cycle(*seed, 1)).status
                    == InitiativeStatus::Passed
            })
            .count();
        let rate = passes as f64 / runs as f64;
        assert!((0.71..0.79).contains(&rate), "pass rate {}", rate);
    }

    #[test]
    fn insufficient_quorum_delays_without_rolling() {
        let mut council = scenario_a_council();
        for seat in council.seats.iter_mut().take(4) {
            seat.status = SeatStatus::Hospitalized;
        }
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.0,
            profile: None,
        };
        let mut rng = CycleRng::from_seed(11);
        let outcome = resolve_council_vote(&initiative("Stadium Bond", "6-3"), &inputs, &mut rng);
        assert_eq!(outcome.status, InitiativeStatus::Delayed);
        assert_eq!(outcome.outcome, "DELAYED");
        assert_eq!(outcome.available, 5);
        assert!(outcome.swing.is_empty());
        assert_eq!(rng.draws(), 0);
        assert!(outcome.notes[0].starts_with("absent: Member0 (hospitalized)"));
    }

    #[test]
    fn named_voters_leave_their_bloc_and_use_their_tables() {
        let council = scenario_a_council();
        let mut bill = initiative("Charter Amendment", "Supermajority");
        bill.swing_voter = "member0".into();
        bill.projection = "Likely passes".into();
        bill.swing_voter2 = "Member4".into();
        bill.swing_voter2_lean = "lean-no".into();
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.5,
            profile: None,
        };
        let outcome = resolve_council_vote(&bill, &inputs, &mut CycleRng::from_seed(5));
        assert_eq!(outcome.swing.len(), 4);
        let primary = &outcome.swing[0];
        assert_eq!(primary.source, ProbabilitySource::Projection);
        assert!((primary.probability - (0.70 + 0.05 - 0.05)).abs() < 1e-9);
        let secondary = &outcome.swing[1];
        assert_eq!(secondary.source, ProbabilitySource::Lean);
        assert!((secondary.probability - (0.35 + 0.025)).abs() < 1e-9);
        assert!((outcome.swing[2].probability - 0.575).abs() < 1e-9);
        let bloc_votes = outcome.yes + outcome.no - 4;
        assert_eq!(bloc_votes, 5);
    }

    #[test]
    fn secondary_naming_the_primary_seat_is_ignored() {
        let council = scenario_a_council();
        let mut bill = initiative("Charter Amendment", "5-4");
        bill.swing_voter = "Member7".into();
        bill.projection = "likely passes".into();
        bill.swing_voter2 = "member7".into();
        bill.swing_voter2_lean = "lean-no".into();
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.0,
            profile: None,
        };
        let mut rng = CycleRng::from_seed(3);
        let outcome = resolve_council_vote(&bill, &inputs, &mut rng);

        let named: Vec<&SwingDecision> = outcome
            .swing
            .iter()
            .filter(|decision| decision.name == "Member7")
            .collect();
        assert_eq!(named.len(), 1);
        assert_eq!(named[0].source, ProbabilitySource::Projection);
        assert!(outcome
            .swing
            .iter()
            .all(|decision| decision.source != ProbabilitySource::Lean));
        assert_eq!(outcome.swing.len(), 2);
        assert_eq!(rng.draws(), 2);
        assert_eq!(outcome.yes + outcome.no, 9);
    }

    #[test]
    fn demographics_shift_every_swing_and_stay_clamped() {
        let council = scenario_a_council();
        let profile = DemographicProfile {
            senior_ratio: 0.30,
            sickness_rate: 0.10,
            ..Default::default()
        };
        let inputs = VoteInputs {
            council: &council,
            sentiment: 1.0,
            profile: Some(&profile),
        };
        let outcome = resolve_council_vote(
            &initiative("Community Health Clinic", "5-4"),
            &inputs,
            &mut CycleRng::from_seed(2),
        );
        for decision in &outcome.swing {
            assert!((decision.probability - 0.79).abs() < 1e-9);
        }

        let mut bill = initiative("Community Health Clinic", "5-4");
        bill.swing_voter = "Member7".into();
        bill.projection = "likely passes".into();
        let outcome = resolve_council_vote(&bill, &inputs, &mut CycleRng::from_seed(2));
        assert_eq!(outcome.swing[0].probability, 0.85);
    }

    #[test]
    fn passing_votes_note_the_veto_holder() {
        let mut council = council(&["OPP"; 9]);
        council.seats[8].holder = String::new();
        council.executive = Some(CouncilSeat {
            title: "Mayor".into(),
            voting_power: false,
            ..seat("Avery Santana", "")
        });
        let inputs = VoteInputs {
            council: &council,
            sentiment: 0.0,
            profile: None,
        };
        let outcome = resolve_council_vote(
            &initiative("Charter Amendment", "5-4"),
            &inputs,
            &mut CycleRng::from_seed(1),
        );
        assert_eq!(outcome.status, InitiativeStatus::Passed);
        assert_eq!(outcome.tally, "8-0");
        assert_eq!(
            outcome.notes,
            vec![
                "vacant seats: 1".to_string(),
                "Avery Santana (Mayor) may veto".to_string()
            ]
        );
    }

    #[test]
    fn grants_and_visioning() {
        let mut grant = initiative("Transit Grant", "");
        grant.kind = InitiativeKind::ExternalGrant;
        grant.projection = "likely approved, strong".into();
        grant.budget = Some(250000.0);
        let mut rng = CycleRng::from_seed(8);
        let outcome = resolve_grant(&grant, 0.0, &mut rng);
        assert_eq!(rng.draws(), 1);
        assert!(outcome.notes[0].contains("0.75"));
        assert!(outcome.consequences.contains("$250000"));
        assert!(outcome.is_decided());

        let vision = resolve_visioning(&initiative("Waterfront Vision", ""));
        assert_eq!(vision.status, InitiativeStatus::VisioningComplete);
        assert!(!vision.is_decided());
    }

    #[test]
    fn scheduler_advances_and_retries() {
        let mut bill = initiative("Charter Amendment", "5-4");
        bill.status = InitiativeStatus::Proposed;
        bill.vote_cycle = Some(13);
        assert_eq!(plan(&bill, 10).status, InitiativeStatus::Active);
        assert_eq!(plan(&bill, 9).status, InitiativeStatus::Proposed);
        assert_eq!(plan(&bill, 12).status, InitiativeStatus::PendingVote);
        assert!(plan(&bill, 13).due);
        assert!(!plan(&bill, 14).due);

        bill.status = InitiativeStatus::PendingVote;
        let late = plan(&bill, 15);
        assert_eq!(late.vote_cycle, Some(15));
        assert_eq!(late.status, InitiativeStatus::PendingVote);
        assert!(late.due);
        bill.status = InitiativeStatus::Active;
        assert!(plan(&bill, 15).due);

        bill.status = InitiativeStatus::Delayed;
        bill.vote_cycle = Some(5);
        let retry = plan(&bill, 6);
        assert_eq!(retry.vote_cycle, Some(6));
        assert_eq!(retry.status, InitiativeStatus::PendingVote);
        assert!(retry.due);
    }

    #[test]
    fn notes_append_with_cycle_prefix() {
        let mut outcome = resolve_visioning(&initiative("Waterfront Vision", ""));
        assert_eq!(append_note("", 4, &outcome), "Cycle 4: COMPLETE");
        outcome.manual = true;
        outcome.notes.push("vacant seats: 1".into());
        assert_eq!(
            append_note("Cycle 1: DELAYED", 5, &outcome),
            "Cycle 1: DELAYED\nCycle 5: [manual override] COMPLETE; vacant seats: 1"
        );
    }
}
