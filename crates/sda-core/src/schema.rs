//! Message schemas
//!
//! Each message kind travelling over the broker has a named schema. Validation
//! deserializes the body into the matching model and runs its field rules; a
//! message is never trusted before that succeeds.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{Display, Formatter, Result as FmtResult};
use thiserror::Error;
use validator::Validate;

/// Named message schemas used by the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schema {
    /// Copy-work inbound
    IngestionAccession,
    /// Verify-work inbound
    IngestionVerification,
    /// Verify-work outbound
    IngestionAccessionRequest,
    /// Copy-work outbound
    IngestionCompletion,
}

impl Schema {
    pub fn name(&self) -> &'static str {
        match self {
            Schema::IngestionAccession => "ingestion-accession",
            Schema::IngestionVerification => "ingestion-verification",
            Schema::IngestionAccessionRequest => "ingestion-accession-request",
            Schema::IngestionCompletion => "ingestion-completion",
        }
    }
}

impl Display for Schema {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("{schema}: malformed message: {source}")]
    Malformed {
        schema: Schema,
        #[source]
        source: serde_json::Error,
    },

    #[error("{schema}: invalid message: {errors}")]
    Invalid {
        schema: Schema,
        errors: validator::ValidationErrors,
    },
}

impl SchemaError {
    pub fn schema(&self) -> Schema {
        match self {
            SchemaError::Malformed { schema, .. } | SchemaError::Invalid { schema, .. } => *schema,
        }
    }
}

/// Deserialize `body` and validate it against `schema`.
pub fn validate_message<T>(schema: Schema, body: &[u8]) -> Result<T, SchemaError>
where
    T: DeserializeOwned + Validate,
{
    let message: T =
        serde_json::from_slice(body).map_err(|source| SchemaError::Malformed { schema, source })?;
    message
        .validate()
        .map_err(|errors| SchemaError::Invalid { schema, errors })?;
    Ok(message)
}

/// Validate an outbound message against `schema` and serialize it.
pub fn validate_outbound<T>(schema: Schema, message: &T) -> Result<Vec<u8>, SchemaError>
where
    T: Serialize + Validate,
{
    message
        .validate()
        .map_err(|errors| SchemaError::Invalid { schema, errors })?;
    serde_json::to_vec(message).map_err(|source| SchemaError::Malformed { schema, source })
}
