use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use eventline_events::{EventProcessor, LogStore, StopSignal};

use super::consumer::{Consumer, ConsumerConfig, ConsumerError, ConsumerState, ConsumerStats};
use crate::config::PipelineConfig;

/// How long `stop` waits for each worker by default.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

const JOIN_POLL: Duration = Duration::from_millis(10);

/// Handle to a running consumer thread.
#[derive(Debug)]
struct WorkerHandle<S> {
    consumer: Arc<Consumer<S>>,
    join: Option<thread::JoinHandle<Result<(), ConsumerError>>>,
}

/// Outcome of [`ConsumerManager::stop`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Workers that exited cleanly.
    pub stopped: Vec<String>,
    /// Workers still running when their join timeout elapsed (detached).
    pub timed_out: Vec<String>,
    /// Workers that ended with a startup error or a panic.
    pub failed: Vec<String>,
}

/// Supervises a fixed pool of consumer workers sharing one consumer group.
///
/// - Each worker runs on its own thread with identity `<prefix>-<n>`
/// - The store arbitrates claim ownership; there is no in-process locking
///   between workers
/// - Shutdown is cooperative and best-effort
pub struct ConsumerManager<S> {
    store: S,
    processor: Arc<dyn EventProcessor>,
    pipeline: PipelineConfig,
    workers: usize,
    name_prefix: String,
    join_timeout: Duration,
    backoff: Option<(Duration, Duration)>,
    signal: StopSignal,
    running: Vec<WorkerHandle<S>>,
}

impl<S: LogStore + Clone + 'static> ConsumerManager<S> {
    pub fn new(
        store: S,
        processor: Arc<dyn EventProcessor>,
        pipeline: PipelineConfig,
        workers: usize,
    ) -> Self {
        Self {
            store,
            processor,
            pipeline,
            workers,
            name_prefix: "consumer".to_string(),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            backoff: None,
            signal: StopSignal::new(),
            running: Vec::new(),
        }
    }

    pub fn with_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.name_prefix = prefix.into();
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Override the consumers' transient/error backoffs.
    pub fn with_backoff(mut self, transient: Duration, error: Duration) -> Self {
        self.backoff = Some((transient, error));
        self
    }

    /// Identity of worker `n` (1-based).
    pub fn worker_name(&self, n: usize) -> String {
        format!("{}-{}", self.name_prefix, n)
    }

    /// Launch every worker and return without waiting. No-op when running.
    pub fn start(&mut self) -> std::io::Result<()> {
        if !self.running.is_empty() {
            return Ok(());
        }

        for n in 1..=self.workers {
            let name = self.worker_name(n);
            let mut config = ConsumerConfig::from_pipeline(&self.pipeline, name.clone());
            if let Some((transient, error)) = self.backoff {
                config = config.with_backoff(transient, error);
            }

            let consumer = Arc::new(Consumer::new(
                self.store.clone(),
                self.processor.clone(),
                config,
                self.signal.clone(),
            ));

            let worker = consumer.clone();
            let join = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker.run())?;

            self.running.push(WorkerHandle {
                consumer,
                join: Some(join),
            });
        }

        info!(
            workers = self.workers,
            group = %self.pipeline.consumer_group,
            stream = %self.pipeline.stream_name,
            "consumer workers started"
        );
        Ok(())
    }

    /// Signal every worker to stop and wait up to the join timeout for each.
    ///
    /// Returns regardless of whether every worker confirmed termination.
    pub fn stop(&mut self) -> ShutdownReport {
        self.signal.stop();

        let mut report = ShutdownReport::default();
        for mut handle in self.running.drain(..) {
            let name = handle.consumer.name().to_string();
            let Some(join) = handle.join.take() else {
                continue;
            };

            let deadline = Instant::now() + self.join_timeout;
            while !join.is_finished() && Instant::now() < deadline {
                thread::sleep(JOIN_POLL);
            }

            if !join.is_finished() {
                warn!(consumer = %name, "worker did not stop within timeout, detaching");
                report.timed_out.push(name);
                continue;
            }

            match join.join() {
                Ok(Ok(())) => report.stopped.push(name),
                Ok(Err(e)) => {
                    error!(consumer = %name, error = %e, "worker exited with error");
                    report.failed.push(name);
                }
                Err(_) => {
                    error!(consumer = %name, "worker panicked");
                    report.failed.push(name);
                }
            }
        }

        info!(
            stopped = report.stopped.len(),
            timed_out = report.timed_out.len(),
            failed = report.failed.len(),
            "consumer workers shut down"
        );
        report
    }
}

impl<S> ConsumerManager<S> {
    /// The signal shared by every worker this manager starts.
    pub fn stop_signal(&self) -> StopSignal {
        self.signal.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn worker_states(&self) -> Vec<(String, ConsumerState)> {
        self.running
            .iter()
            .map(|h| (h.consumer.name().to_string(), h.consumer.state()))
            .collect()
    }

    /// Statistics summed across all running workers.
    pub fn stats(&self) -> ConsumerStats {
        let mut total = ConsumerStats::default();
        for h in &self.running {
            total.merge(&h.consumer.stats());
        }
        total
    }
}
