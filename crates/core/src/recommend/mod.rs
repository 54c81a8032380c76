//! Questionnaire-driven recommendations for guided selection.
//!
//! Scoring is pure: no clock, randomness or catalog access, so identical
//! answers always produce identical results.

pub mod questions;
pub mod scoring;

use rust_decimal::Decimal;

pub use questions::{
    Budget, BusinessStage, DesignDepth, Feature, Integration, LevelResponses, OnlineSales,
    Priority, Responses, ServiceResponses, SiteSize, SupportNeed, Timeline, TierResponses,
    UpdateFrequency, Weighted, MAX_WEIGHT,
};
pub use scoring::{
    score, score_level, score_services, score_tier, Recommendation, RecommendationResult,
    RecommendedLevel, RecommendedTier, ScoreError,
};

/// Averages at or below this pick the lowest tier or level.
pub const LOW_BAND_CEILING: Decimal = Decimal::from_parts(13, 0, 0, false, 1);

/// Averages at or below this (and above the low ceiling) pick the middle one.
pub const MIDDLE_BAND_CEILING: Decimal = Decimal::from_parts(23, 0, 0, false, 1);

/// Keyword to service lookup for free-text pain points, matched
/// case-insensitively against whole words in table order.
pub const PAIN_POINT_KEYWORDS: &[(&str, &str)] = &[
    ("seo", "seo-setup"),
    ("search", "seo-setup"),
    ("rank", "seo-setup"),
    ("google", "google-business-profile"),
    ("map", "google-business-profile"),
    ("local", "google-business-profile"),
    ("slow", "performance-optimization"),
    ("speed", "performance-optimization"),
    ("brand", "brand-identity"),
    ("logo", "logo-design"),
    ("copy", "copywriting"),
    ("wording", "copywriting"),
    ("photo", "photography"),
    ("image", "photography"),
    ("email", "email-marketing"),
    ("newsletter", "email-marketing"),
    ("social", "social-media-kit"),
    ("instagram", "social-media-kit"),
    ("analytics", "analytics-setup"),
    ("tracking", "analytics-setup"),
    ("hosting", "managed-hosting"),
    ("downtime", "managed-hosting"),
    ("outdated", "care-plan"),
    ("maintenance", "care-plan"),
    ("security", "care-plan"),
    ("payment", "payment-gateway"),
    ("checkout", "payment-gateway"),
    ("inventory", "product-import"),
];
