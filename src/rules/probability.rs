/// Every swing-vote coin-flip uses a probability inside this band.
pub const SWING_FLOOR: f64 = 0.15;
pub const SWING_CEILING: f64 = 0.85;

pub const GRANT_BASE: f64 = 0.50;
pub const GRANT_FLOOR: f64 = 0.25;
pub const GRANT_CEILING: f64 = 0.75;

pub const SIMPLE_MAJORITY: u32 = 5;
pub const SUPERMAJORITY: u32 = 6;

/// A phrase family and the value (or adjustment) it maps to.
#[derive(Debug, Clone, Copy)]
pub struct PhraseRule {
    pub phrases: &'static [&'static str],
    pub value: f64,
}

/// Primary swing voter: first matching projection phrase wins.
pub const PROJECTION_RULES: &[PhraseRule] = &[
    PhraseRule {
        phrases: &["likely passes", "likely pass", "expected to pass"],
        value: 0.70,
    },
    PhraseRule {
        phrases: &["likely fails", "likely fail", "expected to fail"],
        value: 0.30,
    },
    PhraseRule {
        phrases: &["needs a swing", "needs swing", "needs one swing"],
        value: 0.45,
    },
    PhraseRule {
        phrases: &["toss up", "tossup", "uncertain", "coin flip"],
        value: 0.50,
    },
];

/// Secondary swing voter: first matching lean label wins.
pub const LEAN_RULES: &[PhraseRule] = &[
    PhraseRule {
        phrases: &["likely yes"],
        value: 0.75,
    },
    PhraseRule {
        phrases: &["lean yes", "leans yes"],
        value: 0.65,
    },
    PhraseRule {
        phrases: &["likely no"],
        value: 0.25,
    },
    PhraseRule {
        phrases: &["lean no", "leans no"],
        value: 0.35,
    },
    PhraseRule {
        phrases: &["toss up", "tossup", "undecided"],
        value: 0.50,
    },
];

/// Grant projection adjustments. Unlike the tables above these stack.
pub const GRANT_RULES: &[PhraseRule] = &[
    PhraseRule {
        phrases: &["likely approved"],
        value: 0.20,
    },
    PhraseRule {
        phrases: &["competitive"],
        value: -0.05,
    },
    PhraseRule {
        phrases: &["strong"],
        value: 0.15,
    },
];

pub fn clamp_swing(probability: f64) -> f64 {
    probability.clamp(SWING_FLOOR, SWING_CEILING)
}

pub fn normalize_phrase(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn first_match(text: &str, rules: &[PhraseRule]) -> Option<f64> {
    let text = normalize_phrase(text);
    rules
        .iter()
        .find(|rule| rule.phrases.iter().any(|phrase| text.contains(phrase)))
        .map(|rule| rule.value)
}

/// Base probability for the primary swing voter, before sentiment and demographics.
pub fn projection_probability(projection: &str) -> f64 {
    first_match(projection, PROJECTION_RULES).unwrap_or(0.50)
}

pub fn lean_probability(lean: &str) -> f64 {
    first_match(lean, LEAN_RULES).unwrap_or(0.50)
}

/// Single-roll grant approval probability.
pub fn grant_probability(projection: &str, sentiment: f64) -> f64 {
    let text = normalize_phrase(projection);
    let shift: f64 = GRANT_RULES
        .iter()
        .filter(|rule| rule.phrases.iter().any(|phrase| text.contains(phrase)))
        .map(|rule| rule.value)
        .sum();
    (GRANT_BASE + shift + sentiment * 0.05).clamp(GRANT_FLOOR, GRANT_CEILING)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub threshold: u32,
}

impl Requirement {
    pub fn is_supermajority(&self) -> bool {
        self.threshold >= SUPERMAJORITY
    }
}

/// "5-4", "6 of 9", "6/9" give the leading number; "supermajority" or "2/3"
/// give six; anything else is a simple majority.
pub fn parse_requirement(raw: &str) -> Requirement {
    let text = normalize_phrase(raw);
    if text.contains("super") || text.contains("2/3") || text.contains("two thirds") {
        return Requirement {
            threshold: SUPERMAJORITY,
        };
    }
    let leading: String = text
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    let threshold = leading
        .parse::<u32>()
        .ok()
        .filter(|n| *n > 0)
        .unwrap_or(SIMPLE_MAJORITY);
    Requirement { threshold }
}
