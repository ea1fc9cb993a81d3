use serde::Serialize;

use crate::model::CourseGrade;

/// Display-side collaborator of a grading session. Called on the IPC thread only.
pub trait Presenter {
    fn notify_grade_changed(&mut self, grade: &CourseGrade);
    fn set_term_spinner_enabled(&mut self, enabled: bool);
    fn set_what_if_grading_enabled(&mut self, enabled: bool);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum PresentationEvent {
    GradeChanged { grade: CourseGrade },
    TermSpinnerEnabled { enabled: bool },
    WhatIfGradingEnabled { enabled: bool },
}

/// Buffers events until the shell polls for them.
#[derive(Debug, Default)]
pub struct EventBuffer {
    events: Vec<PresentationEvent>,
}

impl EventBuffer {
    pub fn drain(&mut self) -> Vec<PresentationEvent> {
        std::mem::take(&mut self.events)
    }
}

impl Presenter for EventBuffer {
    fn notify_grade_changed(&mut self, grade: &CourseGrade) {
        self.events.push(PresentationEvent::GradeChanged {
            grade: grade.clone(),
        });
    }

    fn set_term_spinner_enabled(&mut self, enabled: bool) {
        self.events
            .push(PresentationEvent::TermSpinnerEnabled { enabled });
    }

    fn set_what_if_grading_enabled(&mut self, enabled: bool) {
        self.events
            .push(PresentationEvent::WhatIfGradingEnabled { enabled });
    }
}
