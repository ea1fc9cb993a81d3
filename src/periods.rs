use serde::Serialize;
use tracing::info;

use crate::error::{EngineError, EngineResult};
use crate::model::{Enrollment, GradingPeriod, Id};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "gradingPeriodId", rename_all = "camelCase")]
pub enum PeriodSelection {
    NoPeriodsLoaded,
    SpecificPeriodSelected(Id),
    AllPeriodsSelected,
}

/// What the next full reload is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadScope {
    Period(Id),
    Unscoped,
}

impl ReloadScope {
    pub fn grading_period_id(self) -> Option<Id> {
        match self {
            ReloadScope::Period(id) => Some(id),
            ReloadScope::Unscoped => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PeriodSelector {
    state: PeriodSelection,
    periods: Vec<GradingPeriod>,
    all_periods_title: String,
}

impl PeriodSelector {
    pub fn new(all_periods_title: impl Into<String>) -> Self {
        Self {
            state: PeriodSelection::NoPeriodsLoaded,
            periods: Vec::new(),
            all_periods_title: all_periods_title.into(),
        }
    }

    pub fn state(&self) -> PeriodSelection {
        self.state
    }

    pub fn periods(&self) -> &[GradingPeriod] {
        &self.periods
    }

    pub fn set_periods(&mut self, periods: Vec<GradingPeriod>) {
        self.periods = periods;
    }

    /// Picker rows: the all-periods sentinel followed by the server's periods.
    pub fn picker_titles(&self) -> Vec<String> {
        std::iter::once(self.all_periods_title.clone())
            .chain(self.periods.iter().map(|p| p.title_or_default().to_string()))
            .collect()
    }

    pub fn scope(&self) -> ReloadScope {
        match self.state {
            PeriodSelection::SpecificPeriodSelected(id) => ReloadScope::Period(id),
            _ => ReloadScope::Unscoped,
        }
    }

    /// Initial transition once the course (and its student enrollment) is known.
    pub fn on_course_loaded(&mut self, enrollment: Option<&Enrollment>) -> ReloadScope {
        let current = enrollment
            .filter(|e| e.multiple_grading_periods_enabled)
            .and_then(|e| e.current_grading_period_id);
        self.state = match current {
            Some(id) => PeriodSelection::SpecificPeriodSelected(id),
            None => PeriodSelection::AllPeriodsSelected,
        };
        info!(target: "gradesd::periods", state = ?self.state, "initial grading period");
        self.scope()
    }

    /// Explicit picker selection. The sentinel title wins over any id.
    pub fn select(&mut self, id: Option<Id>, title: &str) -> EngineResult<ReloadScope> {
        if title.trim() == self.all_periods_title {
            self.state = PeriodSelection::AllPeriodsSelected;
            info!(target: "gradesd::periods", "all grading periods selected");
            return Ok(self.scope());
        }

        let resolved = match id {
            Some(id) => {
                if !self.periods.is_empty() && !self.periods.iter().any(|p| p.id == id) {
                    return Err(EngineError::UnknownGradingPeriod(id));
                }
                id
            }
            None => self
                .periods
                .iter()
                .find(|p| p.title_or_default() == title.trim())
                .map(|p| p.id)
                .ok_or_else(|| {
                    EngineError::InvalidSelection(format!("no grading period titled {title:?}"))
                })?,
        };
        self.state = PeriodSelection::SpecificPeriodSelected(resolved);
        info!(target: "gradesd::periods", grading_period_id = resolved, "grading period selected");
        Ok(self.scope())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: &str = "All Grading Periods";

    fn periods() -> Vec<GradingPeriod> {
        vec![
            GradingPeriod {
                id: 1,
                title: Some("Fall".into()),
                start_date: None,
                end_date: None,
            },
            GradingPeriod {
                id: 2,
                title: None,
                start_date: None,
                end_date: None,
            },
        ]
    }

    #[test]
    fn course_with_current_period_selects_it() {
        let mut s = PeriodSelector::new(ALL);
        assert_eq!(s.state(), PeriodSelection::NoPeriodsLoaded);
        let e = Enrollment {
            multiple_grading_periods_enabled: true,
            current_grading_period_id: Some(2),
            ..Default::default()
        };
        assert_eq!(s.on_course_loaded(Some(&e)), ReloadScope::Period(2));
        assert_eq!(s.state(), PeriodSelection::SpecificPeriodSelected(2));
    }

    #[test]
    fn course_without_mgp_goes_to_all_periods() {
        let mut s = PeriodSelector::new(ALL);
        let e = Enrollment {
            multiple_grading_periods_enabled: false,
            current_grading_period_id: Some(2),
            ..Default::default()
        };
        assert_eq!(s.on_course_loaded(Some(&e)), ReloadScope::Unscoped);
        assert_eq!(s.state(), PeriodSelection::AllPeriodsSelected);
        assert_eq!(s.on_course_loaded(None), ReloadScope::Unscoped);
    }

    #[test]
    fn sentinel_title_selects_all_periods() {
        let mut s = PeriodSelector::new(ALL);
        s.set_periods(periods());
        s.select(Some(1), "Fall").expect("select");
        assert_eq!(s.state(), PeriodSelection::SpecificPeriodSelected(1));
        let scope = s.select(Some(1), ALL).expect("select all");
        assert_eq!(scope, ReloadScope::Unscoped);
        assert_eq!(s.state(), PeriodSelection::AllPeriodsSelected);
    }

    #[test]
    fn select_by_title_and_reject_unknown() {
        let mut s = PeriodSelector::new(ALL);
        s.set_periods(periods());
        assert_eq!(s.select(None, "Fall").expect("by title"), ReloadScope::Period(1));
        assert!(s.select(Some(9), "Spring").is_err());
        assert!(s.select(None, "Spring").is_err());
        assert_eq!(s.state(), PeriodSelection::SpecificPeriodSelected(1));
    }

    #[test]
    fn picker_lists_sentinel_first_and_defaults_missing_titles() {
        let mut s = PeriodSelector::new(ALL);
        s.set_periods(periods());
        assert_eq!(s.picker_titles(), vec![ALL.to_string(), "Fall".into(), "".into()]);
    }
}
