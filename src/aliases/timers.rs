//! Expiry timers
//!
//! At most one timer per alias ID. Every check-then-act on the table happens under its single
//! lock, remote calls never do.

use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Message sent when a timer fires
#[derive(Debug)]
pub struct Expired {
    /// Alias ID
    pub id: String,

    /// Identifies the timer that fired
    token: u64,
}

/// A running timer
#[derive(Debug)]
struct Timer {
    token: u64,
    handle: JoinHandle<()>,
}

/// Owner of all running expiry timers
#[derive(Debug)]
pub struct ExpiryTimers {
    /// Time until a timer fires
    ttl: Duration,

    /// Running timers by alias ID
    timers: Mutex<HashMap<String, Timer>>,

    /// Tokens are never reused, a stale [`Expired`] can not claim a newer timer
    next_token: AtomicU64,

    /// Where fired timers report to
    expired_tx: mpsc::UnboundedSender<Expired>,
}

impl ExpiryTimers {
    /// Create the timers and the receiving end of their expirations
    pub fn new(ttl: Duration) -> (Self, mpsc::UnboundedReceiver<Expired>) {
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let timers = Self {
            ttl,
            timers: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            expired_tx,
        };

        (timers, expired_rx)
    }

    fn spawn(&self, id: &str) -> Timer {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        let ttl = self.ttl;
        let expired_tx = self.expired_tx.clone();
        let id = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;

            if expired_tx.send(Expired { id, token }).is_err() {
                tracing::debug!("Expiry fired after the alias manager stopped");
            }
        });

        Timer { token, handle }
    }

    /// Start a full-length timer for `id`, replacing a running one
    pub async fn restart(&self, id: &str) {
        let mut timers = self.timers.lock().await;

        let timer = self.spawn(id);

        if let Some(previous) = timers.insert(id.to_string(), timer) {
            previous.handle.abort();
        }
    }

    /// Start a full-length timer for `id` unless one is running
    ///
    /// Returns whether a timer was started
    pub async fn arm_if_idle(&self, id: &str) -> bool {
        let mut timers = self.timers.lock().await;

        if timers.contains_key(id) {
            return false;
        }

        let timer = self.spawn(id);
        timers.insert(id.to_string(), timer);

        true
    }

    /// Stop and forget the timer of `id`
    ///
    /// Returns whether a timer was running
    pub async fn cancel(&self, id: &str) -> bool {
        if let Some(timer) = self.timers.lock().await.remove(id) {
            timer.handle.abort();
            true
        } else {
            false
        }
    }

    /// Take ownership of a fired timer
    ///
    /// Only succeeds when the timer that fired is still the registered one, a timer that was
    /// cancelled or replaced since has nothing left to expire
    pub async fn claim(&self, expired: &Expired) -> bool {
        let mut timers = self.timers.lock().await;

        match timers.get(&expired.id) {
            Some(timer) if timer.token == expired.token => {
                timers.remove(&expired.id);
                true
            }
            _ => false,
        }
    }

    /// Is a timer running for `id`
    #[cfg(test)]
    pub async fn is_armed(&self, id: &str) -> bool {
        self.timers.lock().await.contains_key(id)
    }

    /// Number of running timers
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.timers.lock().await.len()
    }
}

impl Drop for ExpiryTimers {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().values() {
            timer.handle.abort();
        }
    }
}
