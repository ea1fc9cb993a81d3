use serde::{Deserialize, Serialize};

use crate::calc::{GradePolicy, DEFAULT_ROUNDING_PLACES, PENDING_REVIEW};
use crate::error::{EngineError, EngineResult};

pub const SETTINGS_KEY: &str = "engine.config";
pub const DEFAULT_ALL_PERIODS_TITLE: &str = "All Grading Periods";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub all_periods_title: String,
    pub rounding_places: u32,
    pub pending_review_state: String,
    pub worker_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            all_periods_title: DEFAULT_ALL_PERIODS_TITLE.to_string(),
            rounding_places: DEFAULT_ROUNDING_PLACES,
            pending_review_state: PENDING_REVIEW.to_string(),
            worker_threads: 2,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    /// Defaults overridden by `GRADESD_*` variables; unparsable values are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(v) = lookup("GRADESD_ALL_PERIODS_TITLE").filter(|v| !v.trim().is_empty()) {
            cfg.all_periods_title = v;
        }
        if let Some(v) = lookup("GRADESD_ROUNDING_PLACES").and_then(|v| v.trim().parse().ok()) {
            cfg.rounding_places = v;
        }
        if let Some(v) = lookup("GRADESD_PENDING_REVIEW_STATE").filter(|v| !v.trim().is_empty()) {
            cfg.pending_review_state = v;
        }
        if let Some(v) = lookup("GRADESD_WORKER_THREADS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0)
        {
            cfg.worker_threads = v;
        }
        cfg
    }

    /// Merge a partial JSON object (workspace settings or `config.update` params).
    pub fn apply_patch(&mut self, patch: &serde_json::Value) -> EngineResult<()> {
        let Some(obj) = patch.as_object() else {
            return Err(EngineError::Config("config patch must be an object".into()));
        };
        let mut next = self.clone();
        for (key, value) in obj {
            match key.as_str() {
                "allPeriodsTitle" => {
                    let Some(s) = value.as_str().filter(|s| !s.trim().is_empty()) else {
                        return Err(EngineError::Config(
                            "allPeriodsTitle must be a non-empty string".into(),
                        ));
                    };
                    next.all_periods_title = s.to_string();
                }
                "roundingPlaces" => {
                    let Some(n) = value.as_u64().filter(|n| *n <= 10) else {
                        return Err(EngineError::Config(
                            "roundingPlaces must be an integer between 0 and 10".into(),
                        ));
                    };
                    next.rounding_places = n as u32;
                }
                "pendingReviewState" => {
                    let Some(s) = value.as_str().filter(|s| !s.trim().is_empty()) else {
                        return Err(EngineError::Config(
                            "pendingReviewState must be a non-empty string".into(),
                        ));
                    };
                    next.pending_review_state = s.to_string();
                }
                "workerThreads" => {
                    let Some(n) = value.as_u64().filter(|n| *n > 0) else {
                        return Err(EngineError::Config(
                            "workerThreads must be a positive integer".into(),
                        ));
                    };
                    next.worker_threads = n as usize;
                }
                other => {
                    return Err(EngineError::Config(format!("unknown config key: {other}")));
                }
            }
        }
        *self = next;
        Ok(())
    }

    pub fn policy(&self, weighted: bool, graded_only: bool) -> GradePolicy {
        GradePolicy {
            weighted,
            graded_only,
            rounding_places: self.rounding_places,
            pending_review_state: self.pending_review_state.clone(),
        }
    }
}
