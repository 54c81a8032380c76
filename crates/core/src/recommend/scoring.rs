//! Deterministic scoring of questionnaire answers.

use std::collections::BTreeSet;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::questions::{
    LevelResponses, Priority, Responses, ServiceResponses, TierResponses, Weighted, MAX_WEIGHT,
};
use super::{LOW_BAND_CEILING, MIDDLE_BAND_CEILING, PAIN_POINT_KEYWORDS};
use crate::domain::catalog::{ServiceId, TierId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ScoreError {
    #[error("no questions were answered")]
    NoAnswers,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedTier {
    Starter,
    Pro,
    Ecommerce,
}

impl RecommendedTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starter => "starter",
            Self::Pro => "pro",
            Self::Ecommerce => "ecommerce",
        }
    }

    pub fn tier_id(self) -> TierId {
        TierId(self.as_str().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendedLevel {
    Base,
    Standard,
    Premium,
}

impl RecommendedLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Base => "base",
            Self::Standard => "standard",
            Self::Premium => "premium",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation<T> {
    pub pick: T,
    /// Share of the questionnaire that informed the pick, in `[0, 1]`.
    pub confidence: Decimal,
    pub rationale: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecommendationResult {
    Tier(Recommendation<RecommendedTier>),
    Level(Recommendation<RecommendedLevel>),
    Services(Recommendation<Vec<ServiceId>>),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Band {
    Low,
    Middle,
    High,
}

#[derive(Debug, Default)]
struct Tally {
    score: u32,
    total: u32,
    options: u32,
}

impl Tally {
    fn add(&mut self, option: &impl Weighted) {
        self.score += option.weight();
        self.total += MAX_WEIGHT;
        self.options += 1;
    }

    /// Counts each distinct option once, however often it was submitted.
    fn add_all<'a, W: Weighted + Ord + 'a>(&mut self, options: impl IntoIterator<Item = &'a W>) {
        let distinct: BTreeSet<&W> = options.into_iter().collect();
        for option in distinct {
            self.add(option);
        }
    }

    /// Mean chosen weight on the 1..=3 scale.
    fn average(&self) -> Option<Decimal> {
        (self.total > 0)
            .then(|| Decimal::from(MAX_WEIGHT * self.score) / Decimal::from(self.total))
    }
}

fn band(average: Decimal) -> Band {
    if average <= LOW_BAND_CEILING {
        Band::Low
    } else if average <= MIDDLE_BAND_CEILING {
        Band::Middle
    } else {
        Band::High
    }
}

fn ratio(numerator: usize, denominator: usize) -> Decimal {
    if denominator == 0 {
        return Decimal::ZERO;
    }
    (Decimal::from(numerator as u64) / Decimal::from(denominator as u64))
        .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn display_average(average: Decimal) -> Decimal {
    average.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero).normalize()
}

pub fn score(responses: &Responses) -> Result<RecommendationResult, ScoreError> {
    match responses {
        Responses::Tier(answers) => score_tier(answers).map(RecommendationResult::Tier),
        Responses::Level(answers) => score_level(answers).map(RecommendationResult::Level),
        Responses::Services(answers) => {
            score_services(answers).map(RecommendationResult::Services)
        }
    }
}

pub fn score_tier(answers: &TierResponses) -> Result<Recommendation<RecommendedTier>, ScoreError> {
    let mut tally = Tally::default();
    let mut answered = 0;

    if let Some(stage) = &answers.stage {
        tally.add(stage);
        answered += 1;
    }
    if let Some(site_size) = &answers.site_size {
        tally.add(site_size);
        answered += 1;
    }
    if let Some(online_sales) = &answers.online_sales {
        tally.add(online_sales);
        answered += 1;
    }
    if let Some(update_frequency) = &answers.update_frequency {
        tally.add(update_frequency);
        answered += 1;
    }
    if !answers.features.is_empty() {
        tally.add_all(&answers.features);
        answered += 1;
    }

    let average = tally.average().ok_or(ScoreError::NoAnswers)?;
    let pick = match band(average) {
        Band::Low => RecommendedTier::Starter,
        Band::Middle => RecommendedTier::Pro,
        Band::High => RecommendedTier::Ecommerce,
    };

    Ok(Recommendation {
        pick,
        confidence: ratio(answered, TierResponses::QUESTIONS),
        rationale: format!(
            "Average answer weight {} over {} choices fits the {} tier.",
            display_average(average),
            tally.options,
            pick.as_str()
        ),
    })
}

pub fn score_level(
    answers: &LevelResponses,
) -> Result<Recommendation<RecommendedLevel>, ScoreError> {
    let mut tally = Tally::default();
    let mut answered = 0;

    if let Some(budget) = &answers.budget {
        tally.add(budget);
        answered += 1;
    }
    if let Some(timeline) = &answers.timeline {
        tally.add(timeline);
        answered += 1;
    }
    if let Some(design_depth) = &answers.design_depth {
        tally.add(design_depth);
        answered += 1;
    }
    if let Some(support) = &answers.support {
        tally.add(support);
        answered += 1;
    }
    if !answers.integrations.is_empty() {
        tally.add_all(&answers.integrations);
        answered += 1;
    }

    let average = tally.average().ok_or(ScoreError::NoAnswers)?;
    let pick = match band(average) {
        Band::Low => RecommendedLevel::Base,
        Band::Middle => RecommendedLevel::Standard,
        Band::High => RecommendedLevel::Premium,
    };

    Ok(Recommendation {
        pick,
        confidence: ratio(answered, LevelResponses::QUESTIONS),
        rationale: format!(
            "Average answer weight {} over {} choices fits the {} level.",
            display_average(average),
            tally.options,
            pick.as_str()
        ),
    })
}

pub fn score_services(
    answers: &ServiceResponses,
) -> Result<Recommendation<Vec<ServiceId>>, ScoreError> {
    let pain_points = answers
        .pain_points
        .as_deref()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_lowercase);

    if pain_points.is_none() && answers.priorities.is_empty() {
        return Err(ScoreError::NoAnswers);
    }

    let mut candidates: Vec<&'static str> = Vec::new();
    let mut sources = 0;
    let mut matched = 0;

    if let Some(text) = &pain_points {
        sources += 1;
        let words: Vec<&str> =
            text.split(|ch: char| !ch.is_alphanumeric()).filter(|word| !word.is_empty()).collect();
        let before = candidates.len();
        for &(keyword, service) in PAIN_POINT_KEYWORDS {
            if words.iter().any(|word| mentions(word, keyword)) {
                push_unique(&mut candidates, service);
            }
        }
        if candidates.len() > before {
            matched += 1;
        }
    }

    if !answers.priorities.is_empty() {
        sources += 1;
        let before = candidates.len();
        for priority in &answers.priorities {
            for &service in priority_services(*priority) {
                push_unique(&mut candidates, service);
            }
        }
        if candidates.len() > before {
            matched += 1;
        }
    }

    let found = candidates.len();
    if let Some(allowance) = answers.budget.and_then(|budget| budget.service_allowance()) {
        candidates.truncate(allowance);
    }

    let rationale = if candidates.is_empty() {
        "No listed service matched the answers.".to_string()
    } else if candidates.len() < found {
        format!(
            "{} of {} matching services fit the stated budget.",
            candidates.len(),
            found
        )
    } else {
        format!("{} services match the stated needs and priorities.", candidates.len())
    };

    Ok(Recommendation {
        pick: candidates.into_iter().map(|id| ServiceId(id.to_string())).collect(),
        confidence: ratio(matched, sources),
        rationale,
    })
}

/// Suffixes under which a word still counts as the keyword ("maps", "ranking").
const KEYWORD_SUFFIXES: [&str; 7] = ["s", "es", "ed", "er", "ers", "ing", "ly"];

fn mentions(word: &str, keyword: &str) -> bool {
    word.strip_prefix(keyword)
        .is_some_and(|rest| rest.is_empty() || KEYWORD_SUFFIXES.contains(&rest))
}

fn push_unique(candidates: &mut Vec<&'static str>, service: &'static str) {
    if !candidates.contains(&service) {
        candidates.push(service);
    }
}

fn priority_services(priority: Priority) -> &'static [&'static str] {
    match priority {
        Priority::Visibility => &["seo-setup", "google-business-profile"],
        Priority::Conversion => &["copywriting", "analytics-setup"],
        Priority::Branding => &["brand-identity", "logo-design"],
        Priority::Maintenance => &["care-plan", "managed-hosting"],
        Priority::Performance => &["performance-optimization"],
        Priority::Content => &["copywriting", "photography"],
        Priority::Marketing => &["email-marketing", "social-media-kit"],
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;

    use super::{score, score_level, score_services, score_tier, RecommendedLevel, RecommendedTier};
    use super::{RecommendationResult, ScoreError};
    use crate::domain::catalog::ServiceId;
    use crate::recommend::questions::{
        Budget, BusinessStage, DesignDepth, Feature, Integration, LevelResponses, OnlineSales,
        Priority, Responses, ServiceResponses, SiteSize, SupportNeed, Timeline, TierResponses,
        UpdateFrequency,
    };

    fn ids(values: &[&str]) -> Vec<ServiceId> {
        values.iter().map(|id| ServiceId(id.to_string())).collect()
    }

    #[test]
    fn exact_low_boundary_resolves_to_starter() {
        // 13 points over 10 choices: 3 * 13 / 30 = 1.3
        let answers = TierResponses {
            stage: Some(BusinessStage::JustStarting),
            site_size: Some(SiteSize::OnePage),
            online_sales: Some(OnlineSales::NotPlanned),
            update_frequency: Some(UpdateFrequency::Rarely),
            features: vec![
                Feature::ContactForm,
                Feature::Gallery,
                Feature::Testimonials,
                Feature::Blog,
                Feature::Booking,
                Feature::Newsletter,
            ],
        };

        let recommendation = score_tier(&answers).expect("scored");
        assert_eq!(recommendation.pick, RecommendedTier::Starter);
        assert_eq!(recommendation.confidence, Decimal::ONE);
        assert!(recommendation.rationale.contains("1.3"));
    }

    #[test]
    fn exact_middle_boundary_resolves_to_pro() {
        // 23 points over 10 choices: 3 * 23 / 30 = 2.3
        let mut answers = TierResponses {
            stage: Some(BusinessStage::Established),
            site_size: Some(SiteSize::Large),
            online_sales: Some(OnlineSales::Core),
            update_frequency: Some(UpdateFrequency::Monthly),
            features: vec![
                Feature::Memberships,
                Feature::ProductCatalog,
                Feature::Blog,
                Feature::Booking,
                Feature::ContactForm,
                Feature::Gallery,
            ],
        };
        assert_eq!(score_tier(&answers).expect("scored").pick, RecommendedTier::Pro);

        answers.features[5] = Feature::Payments;
        assert_eq!(score_tier(&answers).expect("scored").pick, RecommendedTier::Ecommerce);
    }

    #[test]
    fn partial_answers_lower_confidence() {
        let answers = TierResponses {
            stage: Some(BusinessStage::Growing),
            online_sales: Some(OnlineSales::Secondary),
            ..TierResponses::default()
        };

        let recommendation = score_tier(&answers).expect("scored");
        assert_eq!(recommendation.pick, RecommendedTier::Pro);
        assert_eq!(recommendation.confidence, Decimal::new(40, 2));
    }

    #[test]
    fn level_scoring_uses_the_same_bands() {
        let premium = LevelResponses {
            budget: Some(Budget::Premium),
            timeline: Some(Timeline::Urgent),
            design_depth: Some(DesignDepth::Bespoke),
            support: Some(SupportNeed::Ongoing),
            integrations: vec![Integration::Payments, Integration::Crm],
        };
        assert_eq!(score_level(&premium).expect("scored").pick, RecommendedLevel::Premium);

        let base = LevelResponses {
            budget: Some(Budget::Minimal),
            timeline: Some(Timeline::Flexible),
            design_depth: Some(DesignDepth::Template),
            ..LevelResponses::default()
        };
        assert_eq!(score_level(&base).expect("scored").pick, RecommendedLevel::Base);
    }

    #[test]
    fn empty_questionnaires_are_errors() {
        assert_eq!(score_tier(&TierResponses::default()), Err(ScoreError::NoAnswers));
        assert_eq!(score_level(&LevelResponses::default()), Err(ScoreError::NoAnswers));
        let blank = ServiceResponses {
            pain_points: Some("   ".to_string()),
            budget: Some(Budget::Premium),
            ..ServiceResponses::default()
        };
        assert_eq!(score_services(&blank), Err(ScoreError::NoAnswers));
    }

    #[test]
    fn services_dedupe_and_truncate_by_budget() {
        let answers = ServiceResponses {
            pain_points: Some("Our site is SLOW and nobody finds us on Google".to_string()),
            priorities: vec![Priority::Visibility, Priority::Content, Priority::Conversion],
            budget: Some(Budget::Moderate),
        };

        let recommendation = score_services(&answers).expect("scored");
        assert_eq!(
            recommendation.pick,
            ids(&[
                "google-business-profile",
                "performance-optimization",
                "seo-setup",
                "copywriting",
            ])
        );
        assert_eq!(recommendation.confidence, Decimal::ONE);

        let minimal = ServiceResponses { budget: Some(Budget::Minimal), ..answers.clone() };
        assert_eq!(score_services(&minimal).expect("scored").pick.len(), 2);

        let unlimited = ServiceResponses { budget: None, ..answers };
        assert_eq!(score_services(&unlimited).expect("scored").pick.len(), 6);
    }

    #[test]
    fn unmatched_pain_points_halve_confidence() {
        let answers = ServiceResponses {
            pain_points: Some("nothing in particular".to_string()),
            priorities: vec![Priority::Branding],
            budget: None,
        };

        let recommendation = score_services(&answers).expect("scored");
        assert_eq!(recommendation.pick, ids(&["brand-identity", "logo-design"]));
        assert_eq!(recommendation.confidence, Decimal::new(50, 2));
    }

    #[test]
    fn identical_input_scores_identically() {
        let responses = Responses::Services(ServiceResponses {
            pain_points: Some("we need better photos and a newsletter".to_string()),
            priorities: vec![Priority::Marketing, Priority::Maintenance],
            budget: Some(Budget::Significant),
        });

        let first = score(&responses).expect("scored");
        let second = score(&responses).expect("scored");
        assert_eq!(first, second);
        assert!(matches!(first, RecommendationResult::Services(_)));
    }

    #[test]
    fn keywords_match_whole_words_only() {
        let embedded = ServiceResponses {
            pain_points: Some("Frankly the sitemap and copyright page are fine".to_string()),
            priorities: vec![Priority::Branding],
            budget: None,
        };
        let recommendation = score_services(&embedded).expect("scored");
        assert_eq!(recommendation.pick, ids(&["brand-identity", "logo-design"]));
        assert_eq!(recommendation.confidence, Decimal::new(50, 2));

        let inflected = ServiceResponses {
            pain_points: Some("ranking dropped; maps are wrong, pages load slowly".to_string()),
            priorities: Vec::new(),
            budget: None,
        };
        assert_eq!(
            score_services(&inflected).expect("scored").pick,
            ids(&["seo-setup", "google-business-profile", "performance-optimization"])
        );
    }

    #[test]
    fn repeated_options_count_once() {
        let repeated = TierResponses {
            features: vec![Feature::Payments, Feature::Payments, Feature::ContactForm],
            ..TierResponses::default()
        };
        let distinct = TierResponses {
            features: vec![Feature::ContactForm, Feature::Payments],
            ..TierResponses::default()
        };
        assert_eq!(score_tier(&repeated), score_tier(&distinct));
        assert!(score_tier(&repeated).expect("scored").rationale.contains("over 2 choices"));

        let integrations = LevelResponses {
            integrations: vec![Integration::Erp, Integration::Erp, Integration::Newsletter],
            ..LevelResponses::default()
        };
        assert_eq!(score_level(&integrations).expect("scored").pick, RecommendedLevel::Standard);
    }
}
