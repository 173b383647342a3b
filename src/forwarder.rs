use crate::error::{EmitError, SinkInitError};
use crate::record::LogRecord;
use crate::sink::Transport;
use std::collections::VecDeque;
use std::error::Error;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Duration, MissedTickBehavior};

/// Buffering, batching and retry settings for a [`Forwarder`].
///
/// **Fields**
/// - `channel_buffer`: maximum number of queued records before new ones
///   are dropped.
/// - `batch_size`: records delivered per batch.
/// - `flush_interval`: maximum time a partial batch waits before it is
///   delivered anyway.
/// - `max_attempts`: delivery attempts per batch before the remainder of
///   the batch is dropped.
/// - `initial_backoff` / `max_backoff`: exponential backoff between
///   attempts.
#[derive(Clone, Debug)]
pub struct QueueConfig {
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
            max_attempts: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(10),
        }
    }
}

/// Counters maintained by a [`Forwarder`].
#[derive(Debug, Default)]
pub struct ForwarderStats {
    /// Accepted into the channel.
    pub enqueued: AtomicU64,
    /// Dropped because the channel was full.
    pub dropped: AtomicU64,
    /// Accepted by the transport.
    pub delivered: AtomicU64,
    /// Given up on after `max_attempts` failed deliveries.
    pub failed: AtomicU64,
}

enum Command {
    Record(LogRecord),
    Flush(oneshot::Sender<()>),
}

/// Hands records to a [`Transport`] from a background Tokio task.
///
/// Enqueueing never blocks: when the bounded channel is full the record
/// is dropped and counted. Delivery failures are retried with
/// exponential backoff and never surface to the caller.
pub struct Forwarder {
    sender: mpsc::Sender<Command>,
    stats: Arc<ForwarderStats>,
    _worker: JoinHandle<()>,
}

impl Forwarder {
    /// Spawn the background task on the current Tokio runtime.
    ///
    /// Minimal thresholds are enforced for `channel_buffer`, `batch_size`,
    /// `flush_interval` and `max_attempts` to avoid degenerate configs.
    pub fn spawn(transport: Arc<dyn Transport>, config: QueueConfig) -> Result<Self, SinkInitError> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SinkInitError::NoRuntime)?;

        let config = QueueConfig {
            channel_buffer: config.channel_buffer.max(16),
            batch_size: config.batch_size.max(1),
            flush_interval: config.flush_interval.max(Duration::from_millis(10)),
            max_attempts: config.max_attempts.max(1),
            ..config
        };

        let (tx, rx) = mpsc::channel::<Command>(config.channel_buffer);
        let stats = Arc::new(ForwarderStats::default());
        let worker = runtime.spawn(run(transport, rx, config, Arc::clone(&stats)));

        Ok(Self {
            sender: tx,
            stats,
            _worker: worker,
        })
    }

    pub fn enqueue(&self, record: LogRecord) -> Result<(), EmitError> {
        match self.sender.try_send(Command::Record(record)) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.stats.dropped.fetch_add(1, Ordering::Relaxed);
                Err(EmitError::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(EmitError::WorkerStopped),
        }
    }

    /// Wait until everything enqueued so far has been delivered or given
    /// up on.
    pub async fn flush(&self) -> Result<(), EmitError> {
        let (ack, done) = oneshot::channel();
        self.sender
            .send(Command::Flush(ack))
            .await
            .map_err(|_| EmitError::WorkerStopped)?;
        done.await.map_err(|_| EmitError::WorkerStopped)
    }

    pub fn stats(&self) -> &ForwarderStats {
        &self.stats
    }
}

async fn run(
    transport: Arc<dyn Transport>,
    mut rx: mpsc::Receiver<Command>,
    config: QueueConfig,
    stats: Arc<ForwarderStats>,
) {
    let mut batch = VecDeque::with_capacity(config.batch_size);
    let mut ticker = interval(config.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = rx.recv() => match command {
                Some(Command::Record(record)) => {
                    batch.push_back(record);
                    if batch.len() >= config.batch_size {
                        send_batch(&*transport, &mut batch, &config, &stats).await;
                    }
                }
                Some(Command::Flush(ack)) => {
                    send_batch(&*transport, &mut batch, &config, &stats).await;
                    let _ = ack.send(());
                }
                None => {
                    send_batch(&*transport, &mut batch, &config, &stats).await;
                    return;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    send_batch(&*transport, &mut batch, &config, &stats).await;
                }
            }
        }
    }
}

async fn send_batch(
    transport: &dyn Transport,
    batch: &mut VecDeque<LogRecord>,
    config: &QueueConfig,
    stats: &ForwarderStats,
) {
    let mut backoff = config.initial_backoff;
    for attempt in 1..=config.max_attempts {
        match deliver(transport, batch, stats).await {
            Ok(()) => return,
            Err(e) if attempt == config.max_attempts => {
                eprintln!(
                    "log delivery failed after {} attempts, dropping {} records: {}",
                    attempt,
                    batch.len(),
                    e
                );
                stats.failed.fetch_add(batch.len() as u64, Ordering::Relaxed);
                batch.clear();
                return;
            }
            Err(e) => {
                eprintln!("log delivery failed ({}), retrying in {:?}", e, backoff);
                sleep(backoff).await;
                backoff = std::cmp::min(backoff * 2, config.max_backoff);
            }
        }
    }
}

/// Send records front to back, removing each one once accepted so a
/// retry resumes where the last attempt stopped.
async fn deliver(
    transport: &dyn Transport,
    batch: &mut VecDeque<LogRecord>,
    stats: &ForwarderStats,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    while let Some(record) = batch.front() {
        transport.send(record).await?;
        batch.pop_front();
        stats.delivered.fetch_add(1, Ordering::Relaxed);
    }
    Ok(())
}
