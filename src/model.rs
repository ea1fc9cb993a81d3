use serde::{Deserialize, Serialize};

/// Canvas object ids are numeric on the wire.
pub type Id = i64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub assignment_id: Option<Id>,
    #[serde(default)]
    pub score: Option<f64>,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub workflow_state: Option<String>,
}

impl Submission {
    /// Client-only submission carrying a hypothetical score. Never sent to the server.
    pub fn what_if(assignment_id: Id, score: f64, grade: &str) -> Self {
        Self {
            assignment_id: Some(assignment_id),
            score: Some(score),
            grade: Some(grade.to_string()),
            workflow_state: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub points_possible: f64,
    /// Null entries are kept: an assignment with a null submission type never counts.
    #[serde(default)]
    pub submission_types: Vec<Option<String>>,
    #[serde(default)]
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssignmentGroup {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub position: i64,
    #[serde(default)]
    pub group_weight: f64,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingPeriod {
    pub id: Id,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

impl GradingPeriod {
    pub fn title_or_default(&self) -> &str {
        self.title.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Enrollment {
    #[serde(default, rename = "type")]
    pub enrollment_type: Option<String>,
    #[serde(default)]
    pub multiple_grading_periods_enabled: bool,
    #[serde(default)]
    pub current_grading_period_id: Option<Id>,
    #[serde(default)]
    pub computed_current_score: Option<f64>,
    #[serde(default)]
    pub computed_final_score: Option<f64>,
    #[serde(default)]
    pub computed_current_grade: Option<String>,
    #[serde(default)]
    pub computed_final_grade: Option<String>,
    #[serde(default)]
    pub current_period_computed_current_score: Option<f64>,
    #[serde(default)]
    pub current_period_computed_final_score: Option<f64>,
}

impl Enrollment {
    pub fn is_student(&self) -> bool {
        matches!(
            self.enrollment_type.as_deref(),
            Some("student") | Some("StudentEnrollment")
        )
    }
}

/// First student enrollment, falling back to whatever the server listed first.
pub fn student_enrollment(enrollments: &[Enrollment]) -> Option<&Enrollment> {
    enrollments
        .iter()
        .find(|e| e.is_student())
        .or_else(|| enrollments.first())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub id: Id,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub apply_assignment_group_weights: bool,
    #[serde(default)]
    pub enrollments: Vec<Enrollment>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseGrade {
    pub current_score: Option<f64>,
    pub final_score: Option<f64>,
    pub current_grade: Option<String>,
    pub final_grade: Option<String>,
    pub no_current_grade: bool,
    pub no_final_grade: bool,
    /// Locally recomputed percentage (what-if aware).
    pub computed_score: Option<f64>,
}

impl CourseGrade {
    pub fn from_enrollment(enrollment: &Enrollment, period_scoped: bool) -> Self {
        let (current_score, final_score) = if period_scoped {
            (
                enrollment
                    .current_period_computed_current_score
                    .or(enrollment.computed_current_score),
                enrollment
                    .current_period_computed_final_score
                    .or(enrollment.computed_final_score),
            )
        } else {
            (enrollment.computed_current_score, enrollment.computed_final_score)
        };
        Self {
            current_score,
            final_score,
            current_grade: enrollment.computed_current_grade.clone(),
            final_grade: enrollment.computed_final_grade.clone(),
            no_current_grade: current_score.is_none(),
            no_final_grade: final_score.is_none(),
            computed_score: None,
        }
    }

    /// Replace the server-reported part, keeping the local recomputation.
    pub fn merge_server(&mut self, server: CourseGrade) {
        let computed = self.computed_score;
        *self = server;
        self.computed_score = computed;
    }

    /// What the shell should show for the given toggle state.
    pub fn displayed_score(&self, graded_only: bool, what_if_active: bool) -> Option<f64> {
        if what_if_active {
            return self.computed_score;
        }
        let server = if graded_only {
            self.current_score
        } else {
            self.final_score
        };
        server.or(self.computed_score)
    }
}

/// One page of a transport response. `next_url` is opaque and passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: T,
    pub next_url: Option<String>,
}

impl<T> Page<T> {
    pub fn single(items: T) -> Self {
        Self {
            items,
            next_url: None,
        }
    }
}
