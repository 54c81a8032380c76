use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use thiserror::Error;

use pricewise_core::catalog::CatalogError;
use pricewise_core::domain::quote::QuoteStatus;
use pricewise_core::gateway::GatewayError;

pub mod catalog;
pub mod quote_request;

pub use catalog::SqlCatalogLoader;
pub use quote_request::SqlPersistenceGateway;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("an open quote ({}) blocks a new draft", status.as_str())]
    Blocked { status: QuoteStatus },
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<RepositoryError> for GatewayError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Blocked { status } => Self::Blocked { status },
            RepositoryError::NotFound(message) => Self::Rejected(message),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<RepositoryError> for CatalogError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::Decode(message) => Self::Malformed(message),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

pub(crate) fn column<T>(row: &SqliteRow, name: &str) -> Result<T, RepositoryError>
where
    T: for<'r> sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(name).map_err(|error| RepositoryError::Decode(format!("{name}: {error}")))
}

pub(crate) fn parse_decimal(field: &str, value: &str) -> Result<Decimal, RepositoryError> {
    Decimal::from_str(value)
        .map_err(|error| RepositoryError::Decode(format!("{field} `{value}`: {error}")))
}

pub(crate) fn parse_timestamp(field: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{field} `{value}`: {error}")))
}

pub(crate) fn decode_json<T: serde::de::DeserializeOwned>(
    field: &str,
    value: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(value).map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}

pub(crate) fn encode_json<T: serde::Serialize>(
    field: &str,
    value: &T,
) -> Result<String, RepositoryError> {
    serde_json::to_string(value).map_err(|error| RepositoryError::Decode(format!("{field}: {error}")))
}
