//! Per-watch polling loop: `Idle -> Polling -> (Idle | Cancelled | Fatal)`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use chrono::Utc;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use slurmrest_core::{SlurmError, SlurmResult};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::diff::{self, Snapshot};
use crate::{ListSource, WatchEvent, WatchOptions, Watchable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatchPhase {
    Idle,
    Polling,
    Cancelled,
    Fatal,
}

impl WatchPhase {
    pub fn is_terminal(&self) -> bool { matches!(self, WatchPhase::Cancelled | WatchPhase::Fatal) }
}

/// Drops events the caller is not interested in. Error events always pass.
pub type EventFilter<R> = Arc<dyn Fn(&WatchEvent<R>) -> bool + Send + Sync>;

/// Stops the polling task. Dropping it does not; the loop also ends when the
/// event receiver goes away.
pub struct CancelHandle {
    token: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl CancelHandle {
    pub fn cancel(&self) { self.token.cancel(); }

    pub fn token(&self) -> CancellationToken { self.token.clone() }

    /// Wait for the loop to finish after `cancel` or a fatal error.
    pub async fn stopped(mut self) {
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

pub struct WatchHandle<R: Watchable> {
    pub rx: mpsc::Receiver<WatchEvent<R>>,
    pub cancel: CancelHandle,
    phase: watch::Receiver<WatchPhase>,
    last_good: Arc<ArcSwap<Vec<R>>>,
}

impl<R: Watchable> WatchHandle<R> {
    pub async fn recv(&mut self) -> Option<WatchEvent<R>> { self.rx.recv().await }

    pub fn phase(&self) -> WatchPhase { *self.phase.borrow() }

    pub fn subscribe_phase(&self) -> watch::Receiver<WatchPhase> { self.phase.clone() }

    /// Resources from the most recent successful poll.
    pub fn last_good(&self) -> Arc<Vec<R>> { self.last_good.load_full() }
}

/// Start a watch on the current runtime. The first poll happens immediately.
pub fn spawn_watch<R: Watchable>(
    source: Arc<dyn ListSource<R>>,
    opts: WatchOptions,
    filter: Option<EventFilter<R>>,
    cancel: CancellationToken,
) -> WatchHandle<R> {
    let (tx, rx) = mpsc::channel(opts.buffer.max(1));
    let (phase_tx, phase_rx) = watch::channel(WatchPhase::Idle);
    let last_good = Arc::new(ArcSwap::from_pointee(Vec::new()));
    let state = Poller { source, opts, filter, cancel: cancel.clone(), tx, phase: phase_tx, last_good: Arc::clone(&last_good) };
    let task = tokio::spawn(state.run());
    WatchHandle { rx, cancel: CancelHandle { token: cancel, task: Some(task) }, phase: phase_rx, last_good }
}

struct Poller<R: Watchable> {
    source: Arc<dyn ListSource<R>>,
    opts: WatchOptions,
    filter: Option<EventFilter<R>>,
    cancel: CancellationToken,
    tx: mpsc::Sender<WatchEvent<R>>,
    phase: watch::Sender<WatchPhase>,
    last_good: Arc<ArcSwap<Vec<R>>>,
}

enum Step {
    Continue,
    Stop(WatchPhase),
}

impl<R: Watchable> Poller<R> {
    async fn run(self) {
        let kind = R::KIND;
        info!(kind = %kind, interval_ms = self.opts.interval.as_millis() as u64, "watch: started");
        let mut snapshot: Option<Snapshot<R>> = None;
        let mut ticker = tokio::time::interval(self.opts.interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let end = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break WatchPhase::Cancelled,
                _ = self.tx.closed() => break WatchPhase::Cancelled,
                _ = ticker.tick() => {}
            }
            let _ = self.phase.send(WatchPhase::Polling);
            match self.poll(&mut snapshot).await {
                Step::Continue => {
                    let _ = self.phase.send(WatchPhase::Idle);
                }
                Step::Stop(phase) => break phase,
            }
        };
        let _ = self.phase.send(end);
        info!(kind = %kind, phase = ?end, "watch: stopped");
    }

    async fn list(&self) -> SlurmResult<Vec<R>> {
        match self.opts.poll_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.source.list()).await {
                Ok(res) => res,
                Err(_) => Err(SlurmError::Timeout { after_ms: limit.as_millis() as u64 }),
            },
            None => self.source.list().await,
        }
    }

    async fn poll(&self, snapshot: &mut Option<Snapshot<R>>) -> Step {
        let t0 = Instant::now();
        counter!("watch_polls_total", 1u64);
        let res = tokio::select! {
            biased;
            // in-flight poll is dropped; the stored snapshot is untouched
            _ = self.cancel.cancelled() => return Step::Stop(WatchPhase::Cancelled),
            res = self.list() => res,
        };
        histogram!("watch_poll_ms", t0.elapsed().as_secs_f64() * 1000.0);
        let at = Utc::now();
        match res {
            Ok(items) => {
                let events = match snapshot.as_ref() {
                    None if self.opts.emit_baseline => diff::baseline(&items, &self.opts, at),
                    None => Vec::new(),
                    Some(prev) => diff::diff(prev, &items, &self.opts, at),
                };
                *snapshot = Some(diff::snapshot_of(&items));
                debug!(kind = %R::KIND, items = items.len(), events = events.len(), "watch: poll ok");
                self.last_good.store(Arc::new(items));
                self.emit(events).await
            }
            Err(err) => {
                counter!("watch_poll_errors_total", 1u64);
                warn!(kind = %R::KIND, error = %err, "watch: poll failed");
                let fatal = err.is_permanent();
                match self.emit(vec![WatchEvent::error(err, at)]).await {
                    Step::Continue if fatal => Step::Stop(WatchPhase::Fatal),
                    step => step,
                }
            }
        }
    }

    /// Deliver in order. On cancel, whatever still fits in the buffer is
    /// flushed without waiting, starting with the event that was blocked.
    async fn emit(&self, events: Vec<WatchEvent<R>>) -> Step {
        let mut pending = events.into_iter().filter(|e| self.passes(e));
        while let Some(ev) = pending.next() {
            tokio::select! {
                biased;
                permit = self.tx.reserve() => match permit {
                    Ok(permit) => permit.send(ev),
                    Err(_) => return Step::Stop(WatchPhase::Cancelled),
                },
                _ = self.cancel.cancelled() => {
                    for rest in std::iter::once(ev).chain(pending.by_ref()) {
                        if self.tx.try_send(rest).is_err() {
                            break;
                        }
                    }
                    return Step::Stop(WatchPhase::Cancelled);
                }
            }
        }
        Step::Continue
    }

    fn passes(&self, ev: &WatchEvent<R>) -> bool {
        match &self.filter {
            Some(f) if ev.kind != crate::EventKind::Error => f(ev),
            _ => true,
        }
    }
}
