use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::error::{EngineError, EngineResult};
use crate::model::{Assignment, AssignmentGroup, Id, Submission};

/// Assignments of one grading view keyed by id, plus the user's what-if overrides.
///
/// Server submissions and overrides are kept apart so clearing an override
/// falls back to whatever the server last reported.
#[derive(Debug, Clone, Default)]
pub struct AssignmentCache {
    assignments: HashMap<Id, Assignment>,
    overrides: HashMap<Id, Submission>,
}

impl AssignmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything and load the assignments of `groups`.
    pub fn rebuild(&mut self, groups: &[AssignmentGroup]) {
        self.assignments.clear();
        self.overrides.clear();
        for g in groups {
            for a in &g.assignments {
                self.assignments.insert(a.id, a.clone());
            }
        }
        debug!(
            target: "gradesd::cache",
            assignments = self.assignments.len(),
            "assignment cache rebuilt"
        );
    }

    pub fn clear(&mut self) {
        self.assignments.clear();
        self.overrides.clear();
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn has_what_ifs(&self) -> bool {
        !self.overrides.is_empty()
    }

    pub fn what_if_count(&self) -> usize {
        self.overrides.len()
    }

    pub fn clear_what_ifs(&mut self) {
        self.overrides.clear();
    }

    /// Set or clear a hypothetical grade. A blank value reverts to the server submission.
    pub fn apply_what_if(&mut self, assignment_id: Id, value: Option<&str>) -> EngineResult<()> {
        if !self.assignments.contains_key(&assignment_id) {
            return Err(EngineError::UnknownAssignment(assignment_id));
        }
        let text = value.map(str::trim).unwrap_or("");
        if text.is_empty() {
            self.overrides.remove(&assignment_id);
            return Ok(());
        }
        let score: f64 = match text.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => return Err(EngineError::what_if_not_numeric(text)),
        };
        self.overrides
            .insert(assignment_id, Submission::what_if(assignment_id, score, text));
        Ok(())
    }

    /// Submission the calculator should see for `assignment_id`.
    pub fn effective_submission(&self, assignment_id: Id) -> Option<&Submission> {
        self.overrides.get(&assignment_id).or_else(|| {
            self.assignments
                .get(&assignment_id)
                .and_then(|a| a.submission.as_ref())
        })
    }

    /// Entered what-if text per assignment, for redisplay in the shell.
    pub fn what_if_values(&self) -> BTreeMap<Id, String> {
        self.overrides
            .iter()
            .filter_map(|(id, s)| s.grade.clone().map(|g| (*id, g)))
            .collect()
    }

    /// Owned copy of `groups` with every assignment resolved against the cache.
    /// Background work gets this snapshot, never the live map.
    pub fn resolve(&self, groups: &[AssignmentGroup]) -> Vec<AssignmentGroup> {
        groups
            .iter()
            .map(|g| {
                let mut g = g.clone();
                for a in g.assignments.iter_mut() {
                    if let Some(cached) = self.assignments.get(&a.id) {
                        *a = cached.clone();
                    }
                    a.submission = self.effective_submission(a.id).cloned();
                }
                g
            })
            .collect()
    }
}
