use async_trait::async_trait;
use rusqlite::Connection;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, warn};

use crate::db;
use crate::model::{AssignmentGroup, Course, Enrollment, GradingPeriod, Id, Page};

/// Transport failure. `status` mirrors the HTTP status; 0 means the network was unreachable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("fetch failed ({status}): {message}")]
pub struct FetchError {
    pub status: u16,
    pub message: String,
}

impl FetchError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn network_unavailable() -> Self {
        Self::new(0, "network unavailable")
    }

    pub fn is_network(&self) -> bool {
        self.status == 0
    }
}

pub type FetchResult<T> = Result<Page<T>, FetchError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Course,
    GradingPeriods,
    AssignmentGroups,
    Enrollments,
}

impl Endpoint {
    pub fn as_str(self) -> &'static str {
        match self {
            Endpoint::Course => "course",
            Endpoint::GradingPeriods => "gradingPeriods",
            Endpoint::AssignmentGroups => "assignmentGroups",
            Endpoint::Enrollments => "enrollments",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "course" => Some(Endpoint::Course),
            "gradingPeriods" => Some(Endpoint::GradingPeriods),
            "assignmentGroups" => Some(Endpoint::AssignmentGroups),
            "enrollments" => Some(Endpoint::Enrollments),
            _ => None,
        }
    }
}

/// The REST calls the grading view depends on.
#[async_trait]
pub trait CourseSource: Send + Sync {
    async fn fetch_course_with_grade(&self, course_id: Id) -> FetchResult<Course>;

    async fn fetch_assignment_groups(
        &self,
        course_id: Id,
        grading_period_id: Option<Id>,
        scoped_to_student: bool,
        force_refresh: bool,
    ) -> FetchResult<Vec<AssignmentGroup>>;

    async fn fetch_enrollments_for_grading_period(
        &self,
        course_id: Id,
        grading_period_id: Id,
    ) -> FetchResult<Vec<Enrollment>>;

    async fn fetch_grading_periods(&self, course_id: Id) -> FetchResult<Vec<GradingPeriod>>;
}

/// Serves the shell's mirrored server payloads out of the workspace database.
#[derive(Debug, Clone)]
pub struct SqliteSource {
    db_path: PathBuf,
}

impl SqliteSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }

    async fn read<T, F>(
        &self,
        endpoint: Endpoint,
        course_id: Id,
        grading_period_id: Option<Id>,
        load: F,
    ) -> FetchResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> anyhow::Result<Option<Page<T>>> + Send + 'static,
    {
        let path = self.db_path.clone();
        let joined = tokio::task::spawn_blocking(move || -> FetchResult<T> {
            let conn = db::open_existing(&path)
                .map_err(|e| FetchError::new(500, format!("open mirror: {e}")))?;
            if !db::is_online(&conn).map_err(|e| FetchError::new(500, e.to_string()))? {
                return Err(FetchError::network_unavailable());
            }
            if let Some((status, message)) =
                db::recorded_failure(&conn, endpoint.as_str(), course_id, grading_period_id)
                    .map_err(|e| FetchError::new(500, e.to_string()))?
            {
                return Err(FetchError::new(status, message));
            }
            load(&conn)
                .map_err(|e| FetchError::new(500, e.to_string()))?
                .ok_or_else(|| FetchError::new(404, format!("{} not synced", endpoint.as_str())))
        })
        .await;

        let result = joined.unwrap_or_else(|e| Err(FetchError::new(500, e.to_string())));
        if let Err(e) = &result {
            warn!(
                target: "gradesd::source",
                endpoint = endpoint.as_str(),
                course_id,
                grading_period_id = ?grading_period_id,
                status = e.status,
                message = %e.message,
                "fetch failed"
            );
        }
        result
    }
}

#[async_trait]
impl CourseSource for SqliteSource {
    async fn fetch_course_with_grade(&self, course_id: Id) -> FetchResult<Course> {
        self.read(Endpoint::Course, course_id, None, move |conn| {
            Ok(db::load_course(conn, course_id)?.map(Page::single))
        })
        .await
    }

    async fn fetch_assignment_groups(
        &self,
        course_id: Id,
        grading_period_id: Option<Id>,
        scoped_to_student: bool,
        force_refresh: bool,
    ) -> FetchResult<Vec<AssignmentGroup>> {
        debug!(
            target: "gradesd::source",
            course_id,
            grading_period_id = ?grading_period_id,
            scoped_to_student,
            force_refresh,
            "fetch assignment groups"
        );
        self.read(
            Endpoint::AssignmentGroups,
            course_id,
            grading_period_id,
            move |conn| {
                Ok(db::load_assignment_groups(conn, course_id, grading_period_id)?
                    .map(|(items, next_url)| Page { items, next_url }))
            },
        )
        .await
    }

    async fn fetch_enrollments_for_grading_period(
        &self,
        course_id: Id,
        grading_period_id: Id,
    ) -> FetchResult<Vec<Enrollment>> {
        self.read(
            Endpoint::Enrollments,
            course_id,
            Some(grading_period_id),
            move |conn| {
                Ok(db::load_enrollments(conn, course_id, grading_period_id)?.map(Page::single))
            },
        )
        .await
    }

    async fn fetch_grading_periods(&self, course_id: Id) -> FetchResult<Vec<GradingPeriod>> {
        self.read(Endpoint::GradingPeriods, course_id, None, move |conn| {
            Ok(db::load_grading_periods(conn, course_id)?
                .map(|(items, next_url)| Page { items, next_url }))
        })
        .await
    }
}
