use std::future::Future;

use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::AbortHandle;
use tracing::{debug, trace};

use crate::calc::{self, GradePolicy};
use crate::model::{AssignmentGroup, Course, Enrollment, GradingPeriod, Id};
use crate::source::FetchResult;

#[derive(Debug)]
pub enum FetchOutcome {
    Course(FetchResult<Course>),
    GradingPeriods(FetchResult<Vec<GradingPeriod>>),
    AssignmentGroups {
        grading_period_id: Option<Id>,
        result: FetchResult<Vec<AssignmentGroup>>,
    },
    Enrollments {
        grading_period_id: Id,
        result: FetchResult<Vec<Enrollment>>,
    },
}

#[derive(Debug)]
pub enum WorkerMessage {
    Fetched { epoch: u64, outcome: FetchOutcome },
    Computed { generation: u64, score: f64 },
}

/// In-flight fetches of one load epoch. Each task sends exactly one message
/// unless the whole group is cancelled first.
#[derive(Debug, Default)]
pub struct RequestGroup {
    epoch: u64,
    handles: Vec<AbortHandle>,
    outstanding: usize,
}

impl RequestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Abort everything in flight and start a new epoch; late results of the old one are ignored.
    pub fn restart(&mut self) -> u64 {
        self.cancel_all();
        self.epoch += 1;
        self.epoch
    }

    pub fn cancel_all(&mut self) {
        if !self.handles.is_empty() {
            debug!(target: "gradesd::worker", epoch = self.epoch, tasks = self.handles.len(), "cancelling request group");
        }
        for h in self.handles.drain(..) {
            h.abort();
        }
        self.outstanding = 0;
    }

    pub fn spawn<F>(&mut self, runtime: &Handle, tx: &UnboundedSender<WorkerMessage>, fut: F)
    where
        F: Future<Output = FetchOutcome> + Send + 'static,
    {
        let epoch = self.epoch;
        let tx = tx.clone();
        let handle = runtime.spawn(async move {
            let outcome = fut.await;
            // Receiver gone means the session closed; nothing to deliver to.
            let _ = tx.send(WorkerMessage::Fetched { epoch, outcome });
        });
        self.handles.push(handle.abort_handle());
        self.outstanding += 1;
    }

    /// Account for a delivered message. Returns false for a stale epoch.
    pub fn settle(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch {
            trace!(target: "gradesd::worker", stale = epoch, current = self.epoch, "dropping stale fetch result");
            return false;
        }
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.outstanding == 0 {
            self.handles.clear();
        }
        true
    }
}

/// Background grade recomputation with last-writer-wins generations.
#[derive(Debug, Default)]
pub struct GradeWorker {
    latest: u64,
    applied: u64,
}

impl GradeWorker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.applied >= self.latest
    }

    /// Compute over an owned snapshot on the blocking pool.
    pub fn schedule(
        &mut self,
        runtime: &Handle,
        tx: &UnboundedSender<WorkerMessage>,
        snapshot: Vec<AssignmentGroup>,
        policy: GradePolicy,
    ) -> u64 {
        self.latest += 1;
        let generation = self.latest;
        let tx = tx.clone();
        runtime.spawn_blocking(move || {
            let score = calc::compute_grade_with(&snapshot, &policy);
            let _ = tx.send(WorkerMessage::Computed { generation, score });
        });
        debug!(target: "gradesd::worker", generation, "grade recompute scheduled");
        generation
    }

    /// True when `generation` is still the newest request and should be shown.
    pub fn accept(&mut self, generation: u64) -> bool {
        if generation != self.latest {
            trace!(target: "gradesd::worker", generation, latest = self.latest, "dropping superseded grade");
            return false;
        }
        self.applied = generation;
        true
    }

    /// Forget pending work, e.g. when the data it was computed from is gone.
    pub fn invalidate(&mut self) {
        self.latest += 1;
        self.applied = self.latest;
    }
}
