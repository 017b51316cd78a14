//! # Worker Lifecycle
//!
//! A worker is a long-running task with a private inbox for control messages.
//! Implementors only write [`Worker::run`]; [`start`] creates the inbox,
//! spawns the task and hands back a [`WorkerHandle`] for sending control
//! messages and joining.
//!
//! Cancellation is cooperative: a worker checks its inbox between cycles with
//! [`Inbox::receive`] and returns from `run` when it sees [`Control::Die`].

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinHandle};

/// Control messages a worker understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    /// Refresh now instead of waiting for the next scheduled cycle
    Poll,
    /// Leave the run loop
    Die,
}

/// A unit of background work.
#[async_trait]
pub trait Worker: Send + 'static {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// The worker's main loop. Must return once it receives [`Control::Die`].
    async fn run(&mut self, inbox: &mut Inbox);
}

/// Receiving end of a worker's control channel.
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::UnboundedReceiver<Control>,
}

impl Inbox {
    /// Wait up to `timeout` for a control message.
    ///
    /// Returns `None` when nothing arrived in time. A closed inbox (every
    /// handle dropped) reads as [`Control::Die`], so orphaned workers stop.
    pub async fn receive(&mut self, timeout: Duration) -> Option<Control> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(control)) => Some(control),
            Ok(None) => Some(Control::Die),
            Err(_) => None,
        }
    }

    /// Wait for the next control message with no time limit.
    pub async fn recv(&mut self) -> Control {
        self.rx.recv().await.unwrap_or(Control::Die)
    }
}

/// Handle to a started worker.
#[derive(Debug)]
pub struct WorkerHandle {
    name: &'static str,
    tx: mpsc::UnboundedSender<Control>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Send a control message. Callable from any thread.
    ///
    /// Returns `false` if the worker has already exited.
    pub fn send(&self, control: Control) -> bool {
        self.tx.send(control).is_ok()
    }

    /// Wait for the worker task to finish.
    pub async fn join(self) -> Result<(), JoinError> {
        self.join.await
    }
}

/// Spawn `worker` on the current tokio runtime.
pub fn start<W: Worker>(mut worker: W) -> WorkerHandle {
    let (tx, rx) = mpsc::unbounded_channel();
    let name = worker.name();
    let join = tokio::spawn(async move {
        let mut inbox = Inbox { rx };
        log::info!("[{}] Run", name);
        worker.run(&mut inbox).await;
        log::info!("[{}] Stopped", name);
    });
    WorkerHandle { name, tx, join }
}

/// Fixed-delay retry policy for re-establishing a connection.
///
/// `max_attempts: None` retries forever.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry forever, waiting `delay` between attempts.
    pub fn fixed(delay: Duration) -> Self {
        RetryPolicy {
            delay,
            max_attempts: None,
        }
    }

    /// Delay before retrying after `failures` consecutive failures, or `None`
    /// once the policy is exhausted.
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if failures >= max => None,
            _ => Some(self.delay),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::fixed(Duration::from_secs(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts loop iterations until told to die.
    struct Ticker {
        ticks: Arc<AtomicUsize>,
        polls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Worker for Ticker {
        fn name(&self) -> &'static str {
            "ticker"
        }

        async fn run(&mut self, inbox: &mut Inbox) {
            loop {
                match inbox.receive(Duration::from_secs(30)).await {
                    Some(Control::Die) => break,
                    Some(Control::Poll) => {
                        self.polls.fetch_add(1, Ordering::SeqCst);
                    }
                    None => {
                        self.ticks.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        }
    }

    fn ticker() -> (Ticker, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let polls = Arc::new(AtomicUsize::new(0));
        (
            Ticker {
                ticks: ticks.clone(),
                polls: polls.clone(),
            },
            ticks,
            polls,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn receive_times_out_without_messages() {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inbox = Inbox { rx };
        assert_eq!(inbox.receive(Duration::from_secs(5)).await, None);
        tx.send(Control::Poll).unwrap();
        assert_eq!(
            inbox.receive(Duration::from_secs(5)).await,
            Some(Control::Poll)
        );
    }

    #[tokio::test]
    async fn closed_inbox_reads_as_die() {
        let (tx, rx) = mpsc::unbounded_channel::<Control>();
        let mut inbox = Inbox { rx };
        drop(tx);
        assert_eq!(
            inbox.receive(Duration::from_secs(5)).await,
            Some(Control::Die)
        );
        assert_eq!(inbox.recv().await, Control::Die);
    }

    #[tokio::test(start_paused = true)]
    async fn die_stops_worker_within_one_interval() {
        let (worker, ticks, polls) = ticker();
        let handle = start(worker);
        assert_eq!(handle.name(), "ticker");

        tokio::time::sleep(Duration::from_secs(65)).await;
        assert!(handle.send(Control::Poll));
        assert!(handle.send(Control::Die));

        tokio::time::timeout(Duration::from_secs(30), handle.join())
            .await
            .expect("worker should stop promptly")
            .expect("worker should not panic");
        assert_eq!(ticks.load(Ordering::SeqCst), 2);
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unbounded_policy_always_retries() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.next_delay(0), Some(Duration::from_secs(10)));
        assert_eq!(policy.next_delay(10_000), Some(Duration::from_secs(10)));
    }

    #[test]
    fn bounded_policy_gives_up() {
        let policy = RetryPolicy {
            delay: Duration::from_secs(1),
            max_attempts: Some(3),
        };
        assert_eq!(policy.next_delay(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.next_delay(3), None);
    }
}
