use crate::rules::keywords::{
    matches_family, ECONOMIC, EDUCATION, HEALTH, HOUSING, SAFETY, SENIOR, TRANSIT,
};
use crate::simulation::city::DemographicProfile;

pub const ALIGNMENT_CAP: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Measure {
    SeniorRatio,
    AdultRatio,
    StudentRatio,
    UnemploymentRate,
    SicknessRate,
}

impl Measure {
    pub fn read(self, profile: &DemographicProfile) -> f64 {
        match self {
            Measure::SeniorRatio => profile.senior_ratio,
            Measure::AdultRatio => profile.adult_ratio,
            Measure::StudentRatio => profile.student_ratio,
            Measure::UnemploymentRate => profile.unemployment_rate,
            Measure::SicknessRate => profile.sickness_rate,
        }
    }
}

/// When the initiative name hits `family` and `measure` is above `above`, add `adjustment`.
#[derive(Debug, Clone, Copy)]
pub struct AlignmentRule {
    pub family: &'static [&'static str],
    pub measure: Measure,
    pub above: f64,
    pub adjustment: f64,
}

/// Families overlap (a name can be both housing and jobs); every matching rule
/// contributes before the final clamp.
pub const ALIGNMENT_RULES: &[AlignmentRule] = &[
    rule(HEALTH, Measure::SeniorRatio, 0.25, 0.08),
    rule(HEALTH, Measure::SicknessRate, 0.08, 0.06),
    rule(HOUSING, Measure::UnemploymentRate, 0.12, 0.10),
    rule(HOUSING, Measure::SeniorRatio, 0.20, 0.05),
    rule(TRANSIT, Measure::AdultRatio, 0.55, 0.06),
    rule(TRANSIT, Measure::StudentRatio, 0.20, 0.05),
    rule(EDUCATION, Measure::StudentRatio, 0.25, 0.10),
    rule(ECONOMIC, Measure::UnemploymentRate, 0.10, 0.08),
    rule(SENIOR, Measure::SeniorRatio, 0.20, 0.12),
    rule(SAFETY, Measure::StudentRatio, 0.20, 0.05),
    rule(SAFETY, Measure::SeniorRatio, 0.25, -0.03),
];

const fn rule(
    family: &'static [&'static str],
    measure: Measure,
    above: f64,
    adjustment: f64,
) -> AlignmentRule {
    AlignmentRule {
        family,
        measure,
        above,
        adjustment,
    }
}

/// Swing-probability shift from how well the initiative fits the people it touches.
/// No profile (no affected neighborhoods, or none with data) means no shift.
pub fn alignment_modifier(initiative_name: &str, profile: Option<&DemographicProfile>) -> f64 {
    let Some(profile) = profile else {
        return 0.0;
    };
    let total: f64 = ALIGNMENT_RULES
        .iter()
        .filter(|rule| rule.measure.read(profile) > rule.above)
        .filter(|rule| matches_family(initiative_name, rule.family))
        .map(|rule| rule.adjustment)
        .sum();
    total.clamp(-ALIGNMENT_CAP, ALIGNMENT_CAP)
}
