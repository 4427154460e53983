use serde::{Deserialize, Serialize};

use crate::simulation::city::Metric;

// Keyword families. A trailing '*' is a prefix match on a word, anything else
// must match a whole word.
pub const HEALTH: &[&str] = &["health*", "clinic*", "hospital*", "medical", "wellness", "mental"];
pub const HOUSING: &[&str] = &["housing", "affordab*", "rent*", "tenant*", "shelter*", "homeless*"];
pub const TRANSIT: &[&str] = &[
    "transit",
    "rail*",
    "bus",
    "buses",
    "transport*",
    "bike*",
    "station*",
    "traffic",
];
pub const EDUCATION: &[&str] = &[
    "school*",
    "education*",
    "youth",
    "student*",
    "librar*",
    "literacy",
];
pub const ECONOMIC: &[&str] = &[
    "job*",
    "economic*",
    "business*",
    "workforce",
    "employment",
    "commerce",
    "commercial",
];
pub const SENIOR: &[&str] = &["senior*", "elder*", "aging", "retiree*"];
pub const SAFETY: &[&str] = &["safety", "police", "policing", "crime", "violence", "patrol*"];
pub const ENVIRONMENT: &[&str] = &["park*", "green*", "climate", "environment*", "tree*", "clean*"];
pub const SPORTS: &[&str] = &["stadium*", "sports", "arena", "ballpark*"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Health,
    Transit,
    Economic,
    Housing,
    Safety,
    Environment,
    Sports,
    Education,
    General,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Category::Health => "health",
            Category::Transit => "transit",
            Category::Economic => "economic",
            Category::Housing => "housing",
            Category::Safety => "safety",
            Category::Environment => "environment",
            Category::Sports => "sports",
            Category::Education => "education",
            Category::General => "general",
        }
    }

    pub fn parse(raw: &str) -> Option<Category> {
        CATEGORY_RULES
            .iter()
            .map(|rule| rule.category)
            .find(|category| category.as_str().eq_ignore_ascii_case(raw.trim()))
    }
}

/// Ripple shape for one category: how long it lasts and which scalars it moves.
#[derive(Debug, Clone, Copy)]
pub struct CategoryRule {
    pub category: Category,
    pub keywords: &'static [&'static str],
    pub duration: u32,
    pub effects: &'static [(Metric, f64)],
}

/// Checked in order; the first family that matches the initiative name wins.
pub const CATEGORY_RULES: &[CategoryRule] = &[
    CategoryRule {
        category: Category::Sports,
        keywords: SPORTS,
        duration: 20,
        effects: &[
            (Metric::Sentiment, 0.4),
            (Metric::Retail, 0.3),
            (Metric::Nightlife, 0.3),
            (Metric::Traffic, 0.2),
        ],
    },
    CategoryRule {
        category: Category::Housing,
        keywords: HOUSING,
        duration: 16,
        effects: &[(Metric::Sentiment, 0.3), (Metric::Community, 0.3)],
    },
    CategoryRule {
        category: Category::Education,
        keywords: EDUCATION,
        duration: 18,
        effects: &[(Metric::Sentiment, 0.2), (Metric::Community, 0.3)],
    },
    CategoryRule {
        category: Category::Economic,
        keywords: ECONOMIC,
        duration: 14,
        effects: &[
            (Metric::Sentiment, 0.2),
            (Metric::Retail, 0.3),
            (Metric::Unemployment, -0.02),
        ],
    },
    CategoryRule {
        category: Category::Health,
        keywords: HEALTH,
        duration: 12,
        effects: &[
            (Metric::Sentiment, 0.3),
            (Metric::Community, 0.2),
            (Metric::Sickness, -0.02),
        ],
    },
    CategoryRule {
        category: Category::Environment,
        keywords: ENVIRONMENT,
        duration: 12,
        effects: &[(Metric::Sentiment, 0.2), (Metric::Community, 0.2)],
    },
    CategoryRule {
        category: Category::Transit,
        keywords: TRANSIT,
        duration: 10,
        effects: &[
            (Metric::Sentiment, 0.2),
            (Metric::Traffic, -0.3),
            (Metric::Retail, 0.1),
        ],
    },
    CategoryRule {
        category: Category::Safety,
        keywords: SAFETY,
        duration: 8,
        effects: &[
            (Metric::Sentiment, 0.2),
            (Metric::Community, 0.2),
            (Metric::Nightlife, 0.1),
        ],
    },
    CategoryRule {
        category: Category::General,
        keywords: &[],
        duration: 6,
        effects: &[(Metric::Sentiment, 0.1)],
    },
];

pub fn infer_category(name: &str) -> &'static CategoryRule {
    CATEGORY_RULES
        .iter()
        .find(|rule| matches_family(name, rule.keywords))
        .unwrap_or(&CATEGORY_RULES[CATEGORY_RULES.len() - 1])
}

pub fn matches_family(text: &str, keywords: &[&str]) -> bool {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    keywords.iter().any(|keyword| match keyword.strip_suffix('*') {
        Some(prefix) => words.iter().any(|word| word.starts_with(prefix)),
        None => words.iter().any(|word| word == keyword),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stadium_wins_over_other_families() {
        let rule = infer_category("Waterfront Stadium & Transit Plaza");
        assert_eq!(rule.category, Category::Sports);
        assert_eq!(rule.duration, 20);
    }

    #[test]
    fn whole_words_do_not_match_inside_other_words() {
        assert!(!matches_family("Small Business Grants", TRANSIT));
        assert!(matches_family("Small Business Grants", ECONOMIC));
        assert!(!matches_family("Parent Council", HOUSING));
        assert!(matches_family("Renters Protection Act", HOUSING));
    }

    #[test]
    fn unmatched_names_fall_back_to_general() {
        let rule = infer_category("Charter Amendment 4");
        assert_eq!(rule.category, Category::General);
        assert_eq!(rule.duration, 6);
    }

    #[test]
    fn durations_stay_in_range() {
        for rule in CATEGORY_RULES {
            assert!((6..=20).contains(&rule.duration), "{:?}", rule.category);
            assert!(rule
                .effects
                .iter()
                .any(|(metric, _)| *metric == Metric::Sentiment));
        }
    }

    #[test]
    fn categories_round_trip_by_name() {
        for rule in CATEGORY_RULES {
            assert_eq!(Category::parse(rule.category.as_str()), Some(rule.category));
        }
    }

    #[test]
    fn overlapping_names_take_the_earlier_family() {
        let jobs = infer_category("Transit Jobs Program");
        assert_eq!(jobs.category, Category::Economic);
        assert_eq!(jobs.duration, 14);

        let housing = infer_category("Senior Housing Health Center");
        assert_eq!(housing.category, Category::Housing);
        assert_eq!(housing.duration, 16);

        assert_eq!(
            infer_category("Park Safety Patrols").category,
            Category::Environment
        );
        assert_eq!(infer_category("School Bus Routes").category, Category::Education);
    }
}
