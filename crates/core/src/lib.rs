pub mod analytics;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod errors;
pub mod gateway;
pub mod recommend;
pub mod selection;
pub mod wizard;

pub use analytics::{
    AnalyticsEvent, AnalyticsEventKind, AnalyticsSink, InMemoryAnalyticsSink, NoopAnalyticsSink,
    TracingAnalyticsSink,
};
pub use catalog::{CachedCatalog, CatalogError, CatalogIndex, CatalogLoader, StaticCatalog};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::catalog::{Level, LevelId, Service, ServiceId, Tier, TierId};
pub use domain::configuration::Configuration;
pub use domain::quote::{
    ActiveQuote, ContactPreferences, Draft, DraftId, MeetingRequest, QuoteId, QuoteRequest,
    QuoteStatus, Selection, UserId,
};
pub use domain::step::Step;
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use gateway::{
    ActiveQuoteCheck, DeleteOutcome, GatewayError, InMemoryPersistenceGateway, PersistenceGateway,
    SaveDraftRequest, SubmitQuoteRequest,
};
pub use recommend::{score, Recommendation, RecommendationResult, Responses, ScoreError};
pub use selection::{CategoryGroup, SelectionTotals, ServiceSelection};
pub use wizard::{
    BackChoice, RecoveryApplied, RefusalReason, Transition, WizardController, WizardError,
    WizardPorts, WizardSettings,
};
