// SPDX-License-Identifier: PMPL-1.0-or-later
// SPDX-FileCopyrightText: 2025 Jonathan D.A. Jewell
//! Status poller
//!
//! Reads a job on a fixed interval until it settles. Read failures are
//! swallowed and retried on the next tick. With `max_attempts` set, a job
//! that is still unsettled after that many reads is reported as
//! [`PollState::Stale`].
//!
//! A spawned poll is owned by its [`PollHandle`]; dropping the handle stops
//! the timer whatever the job's state.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::config::PollerConfig;
use crate::error::Result;
use crate::store::models::{JobRecord, JobStatus};
use crate::store::Store;

/// Client-side view of a job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollState {
    /// No record seen yet
    Loading,
    Pending,
    Completed { output_url: Option<String> },
    Failed { error: Option<String> },
    /// Gave up waiting
    Stale,
}

impl PollState {
    pub fn from_record(record: &JobRecord) -> Self {
        match record.status {
            JobStatus::Pending => Self::Pending,
            JobStatus::Completed => Self::Completed {
                output_url: record.output_url.clone(),
            },
            JobStatus::Failed => Self::Failed {
                error: record.error.clone(),
            },
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Loading | Self::Pending)
    }
}

impl std::fmt::Display for PollState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Loading => f.write_str("loading"),
            Self::Pending => f.write_str("PENDING"),
            Self::Completed { output_url: Some(url) } => write!(f, "COMPLETED {}", url),
            Self::Completed { output_url: None } => f.write_str("COMPLETED"),
            Self::Failed { error: Some(e) } => write!(f, "FAILED ({})", e),
            Self::Failed { error: None } => f.write_str("FAILED"),
            Self::Stale => f.write_str("STALE"),
        }
    }
}

/// Read side of the job store
#[async_trait]
pub trait JobReader: Send + Sync {
    async fn read_job(&self, id: &str) -> Result<Option<JobRecord>>;
}

/// Reads jobs straight from a store
pub struct StoreReader(pub Arc<dyn Store>);

#[async_trait]
impl JobReader for StoreReader {
    async fn read_job(&self, id: &str) -> Result<Option<JobRecord>> {
        self.0.get_job(id).await
    }
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

pub struct StatusPoller {
    reader: Arc<dyn JobReader>,
    interval: Duration,
    max_attempts: Option<u32>,
}

impl StatusPoller {
    /// A zero `interval` is raised to 1 ms; `tokio::time::interval` rejects a zero period
    pub fn new(reader: Arc<dyn JobReader>, interval: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            reader,
            interval: interval.max(MIN_INTERVAL),
            max_attempts,
        }
    }

    pub fn from_config(reader: Arc<dyn JobReader>, config: &PollerConfig) -> Self {
        Self::new(reader, config.interval(), config.max_attempts)
    }

    /// Poll until the job settles, publishing every state change on `tx`
    pub async fn run(&self, job_id: &str, tx: &watch::Sender<PollState>) -> PollState {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut attempts: u32 = 0;

        loop {
            ticker.tick().await;
            attempts += 1;

            match self.reader.read_job(job_id).await {
                Ok(Some(record)) => {
                    let state = PollState::from_record(&record);
                    publish(tx, state.clone());
                    if state.is_terminal() {
                        return state;
                    }
                }
                Ok(None) => {}
                Err(e) => debug!("Status read for {} failed, retrying: {}", job_id, e),
            }

            if self.max_attempts.is_some_and(|max| attempts >= max) {
                debug!("Job {} still unsettled after {} reads", job_id, attempts);
                publish(tx, PollState::Stale);
                return PollState::Stale;
            }
        }
    }

    /// Poll to completion without observing intermediate states
    pub async fn wait(&self, job_id: &str) -> PollState {
        let (tx, _rx) = watch::channel(PollState::Loading);
        self.run(job_id, &tx).await
    }

    /// Poll in the background
    pub fn spawn(self: Arc<Self>, job_id: impl Into<String>) -> PollHandle {
        let job_id = job_id.into();
        let (tx, rx) = watch::channel(PollState::Loading);
        let task = tokio::spawn(async move { self.run(&job_id, &tx).await });
        PollHandle {
            rx,
            task: Some(task),
        }
    }
}

fn publish(tx: &watch::Sender<PollState>, state: PollState) {
    tx.send_if_modified(|current| {
        if *current == state {
            false
        } else {
            *current = state;
            true
        }
    });
}

/// Owner of a background poll
pub struct PollHandle {
    rx: watch::Receiver<PollState>,
    task: Option<JoinHandle<PollState>>,
}

impl PollHandle {
    /// Latest observed state
    pub fn state(&self) -> PollState {
        self.rx.borrow().clone()
    }

    /// Wait for the next state change; `None` once polling has ended
    pub async fn changed(&mut self) -> Option<PollState> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }

    /// Wait for polling to end and return the final state
    pub async fn finish(mut self) -> PollState {
        match self.task.take() {
            Some(task) => match task.await {
                Ok(state) => state,
                Err(_) => self.state(),
            },
            None => self.state(),
        }
    }

    /// Stop polling now
    pub fn cancel(mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::models::JobSettings;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a scripted sequence of reads, repeating the last entry
    struct ScriptedReader {
        script: Vec<Option<JobStatus>>,
        fail_first: bool,
        reads: AtomicUsize,
    }

    impl ScriptedReader {
        fn new(script: Vec<Option<JobStatus>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                fail_first: false,
                reads: AtomicUsize::new(0),
            })
        }

        fn reads(&self) -> usize {
            self.reads.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl JobReader for ScriptedReader {
        async fn read_job(&self, id: &str) -> Result<Option<JobRecord>> {
            let n = self.reads.fetch_add(1, Ordering::SeqCst);
            if self.fail_first && n == 0 {
                return Err(Error::Internal("network blip".to_string()));
            }
            let status = self.script[n.min(self.script.len() - 1)];
            Ok(status.map(|status| {
                let mut record = JobRecord::pending(
                    id.to_string(),
                    "user_1".to_string(),
                    "https://x/img.png".to_string(),
                    JobSettings {
                        hairstyle_type: "Afro".to_string(),
                        workflow: None,
                        style_image_url: None,
                    },
                );
                record.status = status;
                if status == JobStatus::Completed {
                    record.output_url = Some("https://cdn/out.png".to_string());
                }
                record
            }))
        }
    }

    fn poller(reader: Arc<ScriptedReader>, max_attempts: Option<u32>) -> Arc<StatusPoller> {
        Arc::new(StatusPoller::new(reader, Duration::from_secs(2), max_attempts))
    }

    #[tokio::test(start_paused = true)]
    async fn test_completed_job_read_once() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Completed)]);
        let handle = poller(reader.clone(), None).spawn("abc123");

        let state = handle.finish().await;
        assert_eq!(
            state,
            PollState::Completed {
                output_url: Some("https://cdn/out.png".to_string())
            }
        );

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(reader.reads(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_observing_completion() {
        let reader = ScriptedReader::new(vec![
            None,
            Some(JobStatus::Pending),
            Some(JobStatus::Pending),
            Some(JobStatus::Completed),
        ]);
        let state = poller(reader.clone(), None).wait("abc123").await;
        assert!(matches!(state, PollState::Completed { .. }));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reader.reads(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_is_terminal() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Pending), Some(JobStatus::Failed)]);
        let state = poller(reader.clone(), None).wait("abc123").await;
        assert_eq!(state, PollState::Failed { error: None });
        assert_eq!(reader.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_as_stale() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Pending)]);
        let state = poller(reader.clone(), Some(5)).wait("abc123").await;
        assert_eq!(state, PollState::Stale);
        assert_eq!(reader.reads(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_is_clamped() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Pending), Some(JobStatus::Completed)]);
        let poller = StatusPoller::new(reader.clone(), Duration::ZERO, Some(10));
        assert_eq!(poller.interval, MIN_INTERVAL);

        let state = poller.wait("abc123").await;
        assert!(matches!(state, PollState::Completed { .. }));
        assert_eq!(reader.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_errors_are_retried() {
        let reader = Arc::new(ScriptedReader {
            script: vec![Some(JobStatus::Completed)],
            fail_first: true,
            reads: AtomicUsize::new(0),
        });
        let state = poller(reader.clone(), None).wait("abc123").await;
        assert!(matches!(state, PollState::Completed { .. }));
        assert_eq!(reader.reads(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_reads() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Pending)]);
        let handle = poller(reader.clone(), None).spawn("abc123");

        tokio::time::sleep(Duration::from_secs(5)).await;
        let before = reader.reads();
        assert!(before >= 1);
        handle.cancel();

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(reader.reads(), before);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handle_reports_transitions() {
        let reader = ScriptedReader::new(vec![Some(JobStatus::Pending), Some(JobStatus::Completed)]);
        let mut handle = poller(reader, None).spawn("abc123");

        assert_eq!(handle.changed().await, Some(PollState::Pending));
        assert!(matches!(handle.changed().await, Some(PollState::Completed { .. })));
        assert_eq!(handle.changed().await, None);
    }
}
