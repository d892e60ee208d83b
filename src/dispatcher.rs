//! Single-worker filter dispatcher.
//!
//! A dispatcher owns one worker thread. [`FilterDispatcher::submit`] hands
//! the worker a copy of the image and a filter name; the worker runs the
//! filter and publishes exactly one [`FilterEvent`] per accepted job.
//!
//! At most one job is in flight. A submission made while a job is running
//! is rejected with [`FilterError::Busy`]; nothing is queued. The in-flight
//! slot is released before the job's event is published, so a caller that
//! waits for the event can submit again immediately.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::cancel::CancelToken;
use crate::config::DispatcherConfig;
use crate::error::{FilterError, Result};
use crate::image::ImageBuffer;
use crate::registry::FilterRegistry;

/// Identifier handed out by `submit`, increasing per dispatcher.
pub type JobId = u64;

/// Outcome of one submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterEvent {
    Completed {
        job: JobId,
        filter: String,
        image: ImageBuffer,
    },
    Failed {
        job: JobId,
        filter: String,
        error: FilterError,
    },
}

impl FilterEvent {
    pub fn job(&self) -> JobId {
        match self {
            FilterEvent::Completed { job, .. } | FilterEvent::Failed { job, .. } => *job,
        }
    }

    pub fn filter(&self) -> &str {
        match self {
            FilterEvent::Completed { filter, .. } | FilterEvent::Failed { filter, .. } => filter,
        }
    }

    pub fn into_result(self) -> Result<ImageBuffer> {
        match self {
            FilterEvent::Completed { image, .. } => Ok(image),
            FilterEvent::Failed { error, .. } => Err(error),
        }
    }
}

struct Job {
    id: JobId,
    filter: String,
    image: ImageBuffer,
    cancel: CancelToken,
}

struct InFlight {
    id: JobId,
    cancel: CancelToken,
}

type Slot = Arc<Mutex<Option<InFlight>>>;

fn lock(slot: &Slot) -> MutexGuard<'_, Option<InFlight>> {
    // The slot holds plain data; a panic while locked cannot leave it torn.
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct FilterDispatcher {
    registry: Arc<FilterRegistry>,
    jobs: Option<SyncSender<Job>>,
    events: Receiver<FilterEvent>,
    in_flight: Slot,
    next_id: AtomicU64,
    worker: Option<JoinHandle<()>>,
}

impl FilterDispatcher {
    pub fn new(registry: Arc<FilterRegistry>) -> Result<Self> {
        Self::with_config(registry, &DispatcherConfig::default())
    }

    pub fn with_config(registry: Arc<FilterRegistry>, config: &DispatcherConfig) -> Result<Self> {
        let (job_tx, job_rx) = mpsc::sync_channel::<Job>(1);
        let (event_tx, event_rx) = mpsc::channel::<FilterEvent>();
        let in_flight: Slot = Arc::new(Mutex::new(None));

        let worker = {
            let registry = Arc::clone(&registry);
            let in_flight = Arc::clone(&in_flight);
            thread::Builder::new()
                .name(config.worker_name.clone())
                .spawn(move || run_worker(registry, job_rx, event_tx, in_flight))
                .map_err(|e| FilterError::ProcessingFailed(format!("failed to start worker: {e}")))?
        };
        info!("filter dispatcher started ({})", config.worker_name);

        Ok(Self {
            registry,
            jobs: Some(job_tx),
            events: event_rx,
            in_flight,
            next_id: AtomicU64::new(1),
            worker: Some(worker),
        })
    }

    pub fn registry(&self) -> &Arc<FilterRegistry> {
        &self.registry
    }

    /// Start running `filter_name` on a copy of `image`.
    ///
    /// Fails synchronously with `UnknownFilter` for unregistered names and
    /// with `Busy` while another job is in flight; neither produces an event.
    pub fn submit(&self, filter_name: &str, image: &ImageBuffer) -> Result<JobId> {
        self.registry.lookup(filter_name)?;
        let jobs = self.jobs.as_ref().ok_or(FilterError::ShutDown)?;

        let mut slot = lock(&self.in_flight);
        if let Some(current) = slot.as_ref() {
            warn!(
                "rejecting {filter_name}: job {} is still running",
                current.id
            );
            return Err(FilterError::Busy);
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancelToken::new();
        let job = Job {
            id,
            filter: filter_name.to_string(),
            image: image.clone(),
            cancel: cancel.clone(),
        };

        match jobs.try_send(job) {
            Ok(()) => {
                *slot = Some(InFlight { id, cancel });
                debug!("submitted job {id} ({filter_name})");
                Ok(id)
            }
            Err(TrySendError::Full(_)) => Err(FilterError::Busy),
            Err(TrySendError::Disconnected(_)) => Err(FilterError::ShutDown),
        }
    }

    /// `true` while a submitted job has not yet published its event.
    pub fn is_busy(&self) -> bool {
        lock(&self.in_flight).is_some()
    }

    /// Ask the running job to stop at its next checkpoint.
    ///
    /// Returns `false` if nothing is in flight. A cancelled job still
    /// publishes a `Failed` event carrying `Cancelled`.
    pub fn cancel_current(&self) -> bool {
        match lock(&self.in_flight).as_ref() {
            Some(current) => {
                debug!("cancelling job {}", current.id);
                current.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Block until the next event. Fails with `ShutDown` once the worker is gone.
    pub fn recv_event(&self) -> Result<FilterEvent> {
        self.events.recv().map_err(|_| FilterError::ShutDown)
    }

    pub fn recv_event_timeout(&self, timeout: Duration) -> Result<Option<FilterEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(FilterError::ShutDown),
        }
    }

    pub fn try_recv_event(&self) -> Option<FilterEvent> {
        self.events.try_recv().ok()
    }

    /// Cancel any running job, stop the worker and wait for it to exit.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.cancel_current();
        // Closing the job channel ends the worker loop after the current job.
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("filter worker exited with a panic");
            }
            info!("filter dispatcher stopped");
        }
    }
}

impl Drop for FilterDispatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "filter panicked".to_string()
    }
}

fn run_worker(
    registry: Arc<FilterRegistry>,
    jobs: Receiver<Job>,
    events: Sender<FilterEvent>,
    in_flight: Slot,
) {
    while let Ok(job) = jobs.recv() {
        let started = Instant::now();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            registry.apply(&job.filter, &job.image, &job.cancel)
        }))
        .unwrap_or_else(|payload| Err(FilterError::ProcessingFailed(panic_message(payload))));

        {
            let mut slot = lock(&in_flight);
            if slot.as_ref().is_some_and(|current| current.id == job.id) {
                *slot = None;
            }
        }

        let event = match outcome {
            Ok(image) => {
                debug!(
                    "job {} ({}) finished in {:?}",
                    job.id,
                    job.filter,
                    started.elapsed()
                );
                FilterEvent::Completed {
                    job: job.id,
                    filter: job.filter,
                    image,
                }
            }
            Err(error) => {
                warn!("job {} ({}) failed: {error}", job.id, job.filter);
                FilterEvent::Failed {
                    job: job.id,
                    filter: job.filter,
                    error,
                }
            }
        };

        if events.send(event).is_err() {
            break;
        }
    }
}
