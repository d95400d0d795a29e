//! Continuously refreshed alerts, independent of the selected city.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::MissedTickBehavior,
};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{DashboardError, ProviderError},
    model::Alert,
    provider::{AlertFeed, call_with_timeout},
};

/// The alert set currently on display.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AlertSnapshot {
    pub alerts: Vec<Alert>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl AlertSnapshot {
    /// Fold one poll result in. A success replaces the set outright; a failure
    /// keeps whatever was shown before. Returns whether the displayed set changed.
    pub fn apply(&mut self, result: Result<Vec<Alert>, ProviderError>, now: DateTime<Utc>) -> bool {
        match result {
            Ok(alerts) => {
                debug!("Live alerts refreshed: {} active", alerts.len());
                let changed = self.alerts != alerts || self.refreshed_at.is_none();
                self.alerts = alerts;
                self.refreshed_at = Some(now);
                self.consecutive_failures = 0;
                changed
            }
            Err(cause) => {
                self.consecutive_failures += 1;
                let err = DashboardError::AlertFeed(cause);
                warn!(
                    "{err} ({} in a row), keeping {} previous alerts: {}",
                    self.consecutive_failures,
                    self.alerts.len(),
                    err.provider_error().map(ToString::to_string).unwrap_or_default()
                );
                false
            }
        }
    }
}

/// Background poller publishing [`AlertSnapshot`]s.
///
/// Dropping the feed stops the poller.
#[derive(Debug)]
pub struct LiveAlertFeed {
    updates: watch::Receiver<AlertSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LiveAlertFeed {
    /// Start polling `source` every `interval`; the first poll happens immediately.
    pub fn spawn(source: Arc<dyn AlertFeed>, interval: Duration, timeout: Duration) -> Self {
        let (tx, rx) = watch::channel(AlertSnapshot::default());
        let cancel = CancellationToken::new();
        let task = tokio::spawn(poll_loop(source, interval, timeout, tx, cancel.clone()));

        Self { updates: rx, cancel, task: Some(task) }
    }

    /// A feed that never polls, for when no alert source is configured.
    pub fn disabled() -> Self {
        let (_tx, rx) = watch::channel(AlertSnapshot::default());
        Self { updates: rx, cancel: CancellationToken::new(), task: None }
    }

    pub fn current(&self) -> AlertSnapshot {
        self.updates.borrow().clone()
    }

    /// A receiver that wakes on every refresh.
    pub fn subscribe(&self) -> watch::Receiver<AlertSnapshot> {
        self.updates.clone()
    }

    /// Stop polling and wait for the task to finish.
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LiveAlertFeed {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn poll_loop(
    source: Arc<dyn AlertFeed>,
    interval: Duration,
    timeout: Duration,
    tx: watch::Sender<AlertSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => break,
            res = call_with_timeout("Alert feed", timeout, source.poll()) => res,
        };

        let now = Utc::now();
        tx.send_if_modified(|snapshot| snapshot.apply(result, now));
    }

    debug!("Live alert feed stopped");
}
