use super::backoff::poll_delay;
use super::model::{TaskId, TaskRecord, TaskStatus};
use crate::client::HttpClient;
use crate::config::{PollDeadline, TaskPollConfig};
use crate::error::HttpError;
use crate::spec::parse_target_url;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};
use url::Url;

/// Why polling stopped before the task finished.
enum Interrupted {
    Deadline,
    Cancelled,
}

/// Waits for server-side tasks to reach a terminal state.
///
/// Fetches `GET {base_url}/tasks/{id}` until the reported status is
/// `Succeeded`, `Failed` or `Canceled`, and returns that record. Failed and
/// canceled tasks are results, not errors. The wait is bounded by the
/// configured [`PollDeadline`]; on expiry the call fails with
/// [`HttpError::PollTimeout`] carrying the last observed status.
///
/// A poller is cheap to clone; waits for different tasks run independently.
///
/// ```ignore
/// let resp = client.post(&format!("{base}/indexes/movies/documents"), |r| {
///     r.json(&docs);
/// }).await?;
/// let handle = TaskHandle::from_response(&resp)?;
///
/// let poller = TaskPoller::new(client.clone(), base)?;
/// let record = poller.wait_for_task(handle.id()).await?;
/// assert!(record.is_success());
/// ```
#[derive(Debug, Clone)]
pub struct TaskPoller {
    client: HttpClient,
    base_url: Url,
    config: TaskPollConfig,
}

impl TaskPoller {
    /// Poller for the service rooted at `base_url`, with default timing.
    ///
    /// # Errors
    /// Returns `InvalidUri`/`InvalidScheme` if `base_url` is not an absolute http(s) URL.
    pub fn new(client: HttpClient, base_url: &str) -> Result<Self, HttpError> {
        let mut base_url = parse_target_url(base_url)?;
        base_url.set_query(None);
        base_url.set_fragment(None);
        Ok(Self {
            client,
            base_url,
            config: TaskPollConfig::default(),
        })
    }

    #[must_use]
    pub fn with_config(mut self, config: TaskPollConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn config(&self) -> &TaskPollConfig {
        &self.config
    }

    /// `{base_url}/tasks/{id}` with the id percent-encoded as one path segment.
    fn task_url(&self, task: &TaskId) -> String {
        let mut url = self.base_url.clone();
        // http(s) URLs with a host always have a path
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("tasks").push(task.as_str());
        }
        url.into()
    }

    /// Fetch the current state of a task once.
    ///
    /// # Errors
    /// Transport errors, `HttpStatus` for non-2xx, `Json` for malformed
    /// bodies and `UnknownTaskStatus` for unrecognised status tokens.
    pub async fn fetch_task(&self, task: &TaskId) -> Result<TaskRecord, HttpError> {
        let response = self
            .client
            .get(&self.task_url(task), |_| {})
            .await?
            .error_for_status()?;
        TaskRecord::from_slice(response.body())
    }

    /// Poll with the poller's configuration until the task is terminal.
    ///
    /// # Errors
    /// `PollTimeout` when the deadline elapses first; any error from
    /// [`fetch_task`](Self::fetch_task) aborts the wait.
    pub async fn wait_for_task(&self, task: &TaskId) -> Result<TaskRecord, HttpError> {
        self.wait(task, &self.config, None).await
    }

    /// Like [`wait_for_task`](Self::wait_for_task) with a per-call configuration.
    ///
    /// # Errors
    /// See [`wait_for_task`](Self::wait_for_task).
    pub async fn wait_for_task_with(
        &self,
        task: &TaskId,
        config: &TaskPollConfig,
    ) -> Result<TaskRecord, HttpError> {
        self.wait(task, config, None).await
    }

    /// Like [`wait_for_task`](Self::wait_for_task), stopping early when `cancel` fires.
    ///
    /// # Errors
    /// `PollCancelled` when the token is cancelled first, otherwise see
    /// [`wait_for_task`](Self::wait_for_task).
    pub async fn wait_for_task_with_cancel(
        &self,
        task: &TaskId,
        cancel: &CancellationToken,
    ) -> Result<TaskRecord, HttpError> {
        self.wait(task, &self.config, Some(cancel)).await
    }

    async fn wait(
        &self,
        task: &TaskId,
        config: &TaskPollConfig,
        cancel: Option<&CancellationToken>,
    ) -> Result<TaskRecord, HttpError> {
        let started = Instant::now();
        let mut last_status = TaskStatus::Enqueued;

        let outcome = {
            let polling = self.poll_until_terminal(task, config, &mut last_status);
            let cancellable = async move {
                match cancel {
                    Some(token) => tokio::select! {
                        biased;
                        () = token.cancelled() => Err(Interrupted::Cancelled),
                        result = polling => Ok(result),
                    },
                    None => Ok(polling.await),
                }
            };
            // A deadline past the end of the clock is the same as no deadline
            let deadline = match config.timeout {
                PollDeadline::After(timeout) => started.checked_add(timeout),
                PollDeadline::Never => None,
            };
            match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, cancellable)
                    .await
                    .unwrap_or(Err(Interrupted::Deadline)),
                None => cancellable.await,
            }
        };

        match outcome {
            Ok(result) => result,
            Err(Interrupted::Deadline) => {
                let waited = started.elapsed();
                warn!(task = %task, status = %last_status, ?waited, "Task poll timed out");
                Err(HttpError::PollTimeout {
                    task: task.clone(),
                    last_status,
                    waited,
                })
            }
            Err(Interrupted::Cancelled) => {
                debug!(task = %task, status = %last_status, "Task poll cancelled");
                Err(HttpError::PollCancelled {
                    task: task.clone(),
                    last_status,
                })
            }
        }
    }

    async fn poll_until_terminal(
        &self,
        task: &TaskId,
        config: &TaskPollConfig,
        last_status: &mut TaskStatus,
    ) -> Result<TaskRecord, HttpError> {
        let mut attempt: u32 = 0;
        loop {
            let record = self.fetch_task(task).await?;

            if record.status.rank() < last_status.rank() {
                warn!(
                    task = %task,
                    previous = %last_status,
                    reported = %record.status,
                    "Ignoring backwards task status transition"
                );
            } else {
                *last_status = record.status;
                if record.status.is_terminal() {
                    debug!(task = %task, status = %record.status, fetches = attempt + 1, "Task finished");
                    return Ok(record);
                }
            }

            let delay = poll_delay(config, attempt);
            trace!(task = %task, status = %last_status, attempt, ?delay, "Task not finished yet");
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }
    }
}
