//! Tokio Reconnect Timer
//!
//! [`ReconnectTimer`] backed by `tokio::time::sleep`. Each scheduled token
//! gets its own task that sleeps and then reports the token on a queue;
//! cancelling aborts the task.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::application::ports::ReconnectTimer;
use crate::domain::connection::TimerToken;

/// Reconnect timer that reports firings on an mpsc queue.
#[derive(Debug)]
pub struct TokioReconnectTimer {
    fired: mpsc::Sender<TimerToken>,
    pending: HashMap<TimerToken, JoinHandle<()>>,
}

impl TokioReconnectTimer {
    /// Create a timer that reports fired tokens into `fired`.
    #[must_use]
    pub fn new(fired: mpsc::Sender<TimerToken>) -> Self {
        Self {
            fired,
            pending: HashMap::new(),
        }
    }

    /// Number of timers that have not fired or been cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending
            .values()
            .filter(|handle| !handle.is_finished())
            .count()
    }
}

impl ReconnectTimer for TokioReconnectTimer {
    fn schedule(&mut self, token: TimerToken, delay: Duration) {
        self.pending.retain(|_, handle| !handle.is_finished());

        let fired = self.fired.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if fired.send(token).await.is_err() {
                tracing::trace!(token = %token, "Timer receiver dropped");
            }
        });

        if let Some(previous) = self.pending.insert(token, handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self, token: TimerToken) {
        if let Some(handle) = self.pending.remove(&token) {
            handle.abort();
        }
    }
}

impl Drop for TokioReconnectTimer {
    fn drop(&mut self) {
        for handle in self.pending.values() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_after_delay() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = TokioReconnectTimer::new(tx);

        timer.schedule(TimerToken::new(1), Duration::from_millis(3000));

        tokio::time::sleep(Duration::from_millis(2999)).await;
        assert!(rx.try_recv().is_err());

        assert_eq!(rx.recv().await, Some(TimerToken::new(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::channel(4);
        let mut timer = TokioReconnectTimer::new(tx);

        timer.schedule(TimerToken::new(1), Duration::from_millis(3000));
        timer.schedule(TimerToken::new(2), Duration::from_millis(3000));
        timer.cancel(TimerToken::new(1));

        assert_eq!(rx.recv().await, Some(TimerToken::new(2)));
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(timer.pending(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_unknown_token_is_ignored() {
        let (tx, _rx) = mpsc::channel(4);
        let mut timer = TokioReconnectTimer::new(tx);

        timer.cancel(TimerToken::new(42));
        assert_eq!(timer.pending(), 0);
    }
}
