//! Error types for iterflow pipelines.
//!
//! Four kinds of failure reach a caller: usage errors raised while wiring a
//! pipeline, mode errors raised on the first pull of a mis-driven cursor,
//! element failures produced upstream, and failures raised by recovery
//! handlers (which are element failures from the next layer's point of view).

use crate::core::Mode;
use std::collections::HashMap;
use std::fmt::{Debug, Display};
use std::sync::Arc;
use thiserror::Error;

/// The main error type for iterflow operations.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    /// An invalid argument was supplied while building a pipeline.
    #[error("Invalid {parameter} {value:?}: {reason}")]
    Usage {
        /// The offending parameter.
        parameter: String,
        /// The supplied value, rendered as text.
        value: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// An asynchronous-only operator was pulled through a synchronous pipeline.
    #[error("Operator \"{operator}\" requires an asynchronous pipeline")]
    AsyncRequired {
        /// The operator name.
        operator: String,
    },

    /// A pipeline was driven with the protocol that does not match its source.
    #[error("Pipeline is {actual} and cannot be pulled {attempted}ly")]
    ModeMismatch {
        /// The mode of the pipeline's cursor.
        actual: Mode,
        /// The protocol the caller tried to drive.
        attempted: Mode,
    },

    /// An element failed while being produced.
    #[error("{0:#}")]
    Failed(Arc<anyhow::Error>),
}

impl FlowError {
    /// Creates an element failure from a message.
    pub fn msg(message: impl Display + Debug + Send + Sync + 'static) -> Self {
        Self::Failed(Arc::new(anyhow::Error::msg(message)))
    }

    /// Creates an element failure from any standard error.
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Failed(Arc::new(anyhow::Error::new(error)))
    }

    /// Creates a usage error.
    pub fn usage(
        parameter: impl Into<String>,
        value: impl Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::Usage {
            parameter: parameter.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by wiring rather than by an element.
    #[must_use]
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::Usage { .. } | Self::AsyncRequired { .. } | Self::ModeMismatch { .. }
        )
    }

    /// Returns the wrapped caller error, if this is an element failure.
    #[must_use]
    pub fn as_failure(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Failed(inner) => Some(inner),
            _ => None,
        }
    }

    /// Returns a short machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Usage { .. } => "usage",
            Self::AsyncRequired { .. } => "async_required",
            Self::ModeMismatch { .. } => "mode_mismatch",
            Self::Failed(_) => "failed",
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("kind".to_string(), serde_json::Value::from(self.kind()));
        map.insert("message".to_string(), serde_json::Value::String(self.to_string()));
        match self {
            Self::Usage { parameter, value, .. } => {
                map.insert("parameter".to_string(), serde_json::Value::String(parameter.clone()));
                map.insert("value".to_string(), serde_json::Value::String(value.clone()));
            }
            Self::AsyncRequired { operator } => {
                map.insert("operator".to_string(), serde_json::Value::String(operator.clone()));
            }
            Self::ModeMismatch { .. } | Self::Failed(_) => {}
        }
        map
    }
}

impl From<anyhow::Error> for FlowError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(Arc::new(error))
    }
}

/// Result alias used across the crate.
pub type FlowResult<T> = Result<T, FlowError>;
