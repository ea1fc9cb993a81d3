use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

use crate::cache::AssignmentCache;
use crate::calc::{self, GroupTotal};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::model::{student_enrollment, AssignmentGroup, Course, CourseGrade, GradingPeriod, Id};
use crate::periods::{PeriodSelection, PeriodSelector, ReloadScope};
use crate::presenter::Presenter;
use crate::source::CourseSource;
use crate::worker::{FetchOutcome, GradeWorker, RequestGroup, WorkerMessage};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub course_id: Id,
    pub course_name: Option<String>,
    pub selection: PeriodSelection,
    pub grading_periods: Vec<GradingPeriod>,
    pub picker_titles: Vec<String>,
    pub graded_only: bool,
    pub weighted: bool,
    pub no_network: bool,
    pub grade: CourseGrade,
    pub displayed_score: Option<f64>,
    pub what_if_count: usize,
    pub what_ifs: BTreeMap<Id, String>,
    pub assignment_count: usize,
    pub assignment_groups_next_url: Option<String>,
    pub grading_periods_next_url: Option<String>,
    pub settled: bool,
}

/// One course grading view: owns the assignment cache, the period selector and
/// the course grade snapshot. All methods run on the IPC thread.
pub struct GradesController<P: Presenter> {
    course_id: Id,
    config: EngineConfig,
    source: Arc<dyn CourseSource>,
    runtime: Handle,
    tx: UnboundedSender<WorkerMessage>,
    rx: UnboundedReceiver<WorkerMessage>,
    presenter: P,
    requests: RequestGroup,
    compute: GradeWorker,
    cache: AssignmentCache,
    groups: Vec<AssignmentGroup>,
    periods: PeriodSelector,
    course: Option<Course>,
    grade: CourseGrade,
    graded_only: bool,
    no_network: bool,
    periods_fetched: bool,
    force_refresh: bool,
    groups_next_url: Option<String>,
    periods_next_url: Option<String>,
}

impl<P: Presenter> GradesController<P> {
    pub fn new(
        course_id: Id,
        config: EngineConfig,
        source: Arc<dyn CourseSource>,
        runtime: Handle,
        presenter: P,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let periods = PeriodSelector::new(config.all_periods_title.clone());
        Self {
            course_id,
            config,
            source,
            runtime,
            tx,
            rx,
            presenter,
            requests: RequestGroup::new(),
            compute: GradeWorker::new(),
            cache: AssignmentCache::new(),
            groups: Vec::new(),
            periods,
            course: None,
            grade: CourseGrade::default(),
            graded_only: true,
            no_network: false,
            periods_fetched: false,
            force_refresh: false,
            groups_next_url: None,
            periods_next_url: None,
        }
    }

    pub fn presenter_mut(&mut self) -> &mut P {
        &mut self.presenter
    }

    fn weighted(&self) -> bool {
        self.course
            .as_ref()
            .map(|c| c.apply_assignment_group_weights)
            .unwrap_or(false)
    }

    /// Initial load: course (with enrollments) and grading periods in parallel.
    pub fn open(&mut self, force_refresh: bool) {
        info!(target: "gradesd::grades", course_id = self.course_id, force_refresh, "opening grades");
        self.force_refresh = force_refresh;
        self.periods_fetched = false;
        self.requests.restart();
        self.presenter.set_term_spinner_enabled(false);
        self.presenter.set_what_if_grading_enabled(false);
        self.spawn_course();
        self.spawn_grading_periods();
    }

    /// Picker selection; always a full reload with graded-only reset to true.
    /// Refused until the initial course and period results are applied.
    pub fn select_period(&mut self, grading_period_id: Option<Id>, title: &str) -> EngineResult<()> {
        if self.periods.state() == PeriodSelection::NoPeriodsLoaded || !self.periods_fetched {
            return Err(EngineError::SelectionNotReady);
        }
        let scope = self.periods.select(grading_period_id, title)?;
        self.graded_only = true;
        self.reload(scope);
        Ok(())
    }

    pub fn set_graded_only(&mut self, graded_only: bool) {
        self.graded_only = graded_only;
        self.schedule_recompute();
    }

    pub fn apply_what_if(&mut self, assignment_id: Id, value: Option<&str>) -> EngineResult<()> {
        self.cache.apply_what_if(assignment_id, value)?;
        debug!(target: "gradesd::grades", assignment_id, value = ?value, "what-if applied");
        self.schedule_recompute();
        Ok(())
    }

    pub fn clear_what_ifs(&mut self) {
        self.cache.clear_what_ifs();
        self.schedule_recompute();
    }

    pub fn breakdown(&self) -> Vec<GroupTotal> {
        let policy = self.config.policy(self.weighted(), self.graded_only);
        calc::group_breakdown(&self.cache.resolve(&self.groups), &policy)
    }

    pub fn is_settled(&self) -> bool {
        self.requests.outstanding() == 0 && self.compute.is_idle()
    }

    /// Cancel all in-flight work. Results that still arrive are dropped.
    pub fn close(&mut self) {
        self.requests.restart();
        self.compute.invalidate();
        self.rx.close();
        info!(target: "gradesd::grades", course_id = self.course_id, "grades closed");
    }

    /// Apply delivered worker messages. With `wait`, block until nothing is
    /// outstanding or `timeout` passes. Returns the number of messages applied.
    pub fn poll(&mut self, wait: bool, timeout: Duration) -> usize {
        let mut applied = 0;
        while let Ok(msg) = self.rx.try_recv() {
            applied += self.apply_message(msg) as usize;
        }
        if !wait {
            return applied;
        }

        let deadline = Instant::now() + timeout;
        while !self.is_settled() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(target: "gradesd::grades", course_id = self.course_id, "poll timed out with work outstanding");
                break;
            }
            let rx = &mut self.rx;
            let next = self
                .runtime
                .block_on(async { tokio::time::timeout(remaining, rx.recv()).await });
            match next {
                Ok(Some(msg)) => applied += self.apply_message(msg) as usize,
                Ok(None) | Err(_) => break,
            }
        }
        applied
    }

    pub fn state(&self) -> SessionState {
        let what_if_active = self.cache.has_what_ifs();
        SessionState {
            course_id: self.course_id,
            course_name: self.course.as_ref().map(|c| c.name.clone()),
            selection: self.periods.state(),
            grading_periods: self.periods.periods().to_vec(),
            picker_titles: self.periods.picker_titles(),
            graded_only: self.graded_only,
            weighted: self.weighted(),
            no_network: self.no_network,
            grade: self.grade.clone(),
            displayed_score: self.grade.displayed_score(self.graded_only, what_if_active),
            what_if_count: self.cache.what_if_count(),
            what_ifs: self.cache.what_if_values(),
            assignment_count: self.cache.len(),
            assignment_groups_next_url: self.groups_next_url.clone(),
            grading_periods_next_url: self.periods_next_url.clone(),
            settled: self.is_settled(),
        }
    }

    fn reload(&mut self, scope: ReloadScope) {
        let epoch = self.requests.restart();
        info!(target: "gradesd::grades", course_id = self.course_id, scope = ?scope, epoch, "reloading assignment groups");
        self.compute.invalidate();
        self.cache.clear();
        self.groups.clear();
        self.groups_next_url = None;
        // The previous view's server grade must not stand in for the new one.
        self.grade = CourseGrade::default();
        self.presenter.set_term_spinner_enabled(false);
        self.presenter.set_what_if_grading_enabled(false);
        match scope {
            ReloadScope::Period(id) => {
                self.spawn_assignment_groups(Some(id));
                self.spawn_enrollments(id);
            }
            ReloadScope::Unscoped => {
                self.spawn_assignment_groups(None);
                self.spawn_course();
            }
        }
    }

    fn schedule_recompute(&mut self) {
        if self.groups.is_empty() {
            return;
        }
        let snapshot = self.cache.resolve(&self.groups);
        let policy = self.config.policy(self.weighted(), self.graded_only);
        self.compute
            .schedule(&self.runtime, &self.tx, snapshot, policy);
    }

    fn spawn_course(&mut self) {
        let source = Arc::clone(&self.source);
        let course_id = self.course_id;
        self.requests.spawn(&self.runtime, &self.tx, async move {
            FetchOutcome::Course(source.fetch_course_with_grade(course_id).await)
        });
    }

    fn spawn_grading_periods(&mut self) {
        let source = Arc::clone(&self.source);
        let course_id = self.course_id;
        self.requests.spawn(&self.runtime, &self.tx, async move {
            FetchOutcome::GradingPeriods(source.fetch_grading_periods(course_id).await)
        });
    }

    fn spawn_assignment_groups(&mut self, grading_period_id: Option<Id>) {
        let source = Arc::clone(&self.source);
        let course_id = self.course_id;
        let force_refresh = self.force_refresh;
        self.requests.spawn(&self.runtime, &self.tx, async move {
            let result = source
                .fetch_assignment_groups(course_id, grading_period_id, true, force_refresh)
                .await;
            FetchOutcome::AssignmentGroups {
                grading_period_id,
                result,
            }
        });
    }

    fn spawn_enrollments(&mut self, grading_period_id: Id) {
        let source = Arc::clone(&self.source);
        let course_id = self.course_id;
        self.requests.spawn(&self.runtime, &self.tx, async move {
            let result = source
                .fetch_enrollments_for_grading_period(course_id, grading_period_id)
                .await;
            FetchOutcome::Enrollments {
                grading_period_id,
                result,
            }
        });
    }

    fn apply_message(&mut self, msg: WorkerMessage) -> bool {
        match msg {
            WorkerMessage::Fetched { epoch, outcome } => {
                if !self.requests.settle(epoch) {
                    return false;
                }
                self.apply_fetch(outcome);
                true
            }
            WorkerMessage::Computed { generation, score } => {
                if !self.compute.accept(generation) {
                    return false;
                }
                self.grade.computed_score = Some(score);
                self.presenter.notify_grade_changed(&self.grade);
                true
            }
        }
    }

    fn apply_fetch(&mut self, outcome: FetchOutcome) {
        match outcome {
            FetchOutcome::Course(result) => {
                let initial = self.periods.state() == PeriodSelection::NoPeriodsLoaded;
                let fetched = match result {
                    Ok(page) => {
                        self.course = Some(page.items);
                        true
                    }
                    Err(e) => {
                        warn!(target: "gradesd::grades", status = e.status, "course fetch failed");
                        self.no_network = true;
                        false
                    }
                };
                if initial {
                    let enrollment = self
                        .course
                        .as_ref()
                        .and_then(|c| student_enrollment(&c.enrollments));
                    let scope = self.periods.on_course_loaded(enrollment);
                    self.spawn_assignment_groups(scope.grading_period_id());
                    if let ReloadScope::Period(id) = scope {
                        self.spawn_enrollments(id);
                    }
                }
                if fetched {
                    let scoped = matches!(self.periods.scope(), ReloadScope::Period(_));
                    if let Some(e) = self
                        .course
                        .as_ref()
                        .and_then(|c| student_enrollment(&c.enrollments))
                    {
                        let server = CourseGrade::from_enrollment(e, scoped);
                        self.grade.merge_server(server);
                    }
                }
                self.presenter.notify_grade_changed(&self.grade);
            }
            FetchOutcome::GradingPeriods(result) => {
                self.periods_fetched = true;
                match result {
                    Ok(page) => {
                        self.periods.set_periods(page.items);
                        self.periods_next_url = page.next_url;
                    }
                    Err(e) => {
                        warn!(target: "gradesd::grades", status = e.status, "grading periods fetch failed");
                    }
                }
                self.presenter.set_term_spinner_enabled(true);
            }
            FetchOutcome::AssignmentGroups {
                grading_period_id,
                result,
            } => {
                match result {
                    Ok(page) => {
                        let mut groups = page.items;
                        groups.sort_by_key(|g| g.position);
                        self.cache.rebuild(&groups);
                        self.groups = groups;
                        self.groups_next_url = page.next_url;
                        info!(
                            target: "gradesd::grades",
                            grading_period_id = ?grading_period_id,
                            groups = self.groups.len(),
                            assignments = self.cache.len(),
                            "assignment groups loaded"
                        );
                        self.presenter.set_what_if_grading_enabled(true);
                        self.schedule_recompute();
                    }
                    Err(e) => {
                        warn!(
                            target: "gradesd::grades",
                            grading_period_id = ?grading_period_id,
                            status = e.status,
                            network = e.is_network(),
                            "assignment groups fetch failed"
                        );
                        self.no_network = true;
                        self.presenter.notify_grade_changed(&self.grade);
                    }
                }
                if self.periods.state() != PeriodSelection::NoPeriodsLoaded {
                    self.presenter.set_term_spinner_enabled(true);
                }
            }
            FetchOutcome::Enrollments {
                grading_period_id,
                result,
            } => match result {
                Ok(page) => {
                    if let Some(e) = student_enrollment(&page.items) {
                        self.grade
                            .merge_server(CourseGrade::from_enrollment(e, true));
                    }
                    self.presenter.notify_grade_changed(&self.grade);
                }
                Err(e) => {
                    warn!(target: "gradesd::grades", grading_period_id, status = e.status, "enrollment fetch failed");
                    self.no_network = true;
                    self.presenter.notify_grade_changed(&self.grade);
                }
            },
        }
    }
}
