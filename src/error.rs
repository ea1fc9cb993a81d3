use thiserror::Error;
use tracing::warn;

use crate::model::Id;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("what-if value is not numeric: {value:?}")]
    WhatIfNotNumeric { value: String },

    #[error("assignment {0} is not loaded")]
    UnknownAssignment(Id),

    #[error("session not found: {0}")]
    UnknownSession(String),

    #[error("grading period {0} is not known for this course")]
    UnknownGradingPeriod(Id),

    #[error("invalid grading period selection: {0}")]
    InvalidSelection(String),

    #[error("grading periods are still loading")]
    SelectionNotReady,

    #[error("invalid config: {0}")]
    Config(String),
}

impl EngineError {
    pub fn what_if_not_numeric(value: impl Into<String>) -> Self {
        let value = value.into();
        warn!(target: "gradesd::validation", %value, "rejected non-numeric what-if value");
        EngineError::WhatIfNotNumeric { value }
    }

    /// Stable code used in IPC error replies.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::WhatIfNotNumeric { .. }
            | EngineError::InvalidSelection(_)
            | EngineError::Config(_) => "bad_params",
            EngineError::UnknownAssignment(_)
            | EngineError::UnknownSession(_)
            | EngineError::UnknownGradingPeriod(_) => "not_found",
            EngineError::SelectionNotReady => "not_ready",
        }
    }
}
