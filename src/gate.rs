//! Pause gate: hold change sets while a consumer is paused.
//!
//! [`PauseGate`] is the state machine; [`buffer_if`] runs it over a change
//! stream and a `watch` pause signal.
//!
//! # Transitions
//!
//! | State | Event | Effect |
//! |-------|-------|--------|
//! | Active | pause `true` | → Paused, arm deadline (`now + timeout`, none if out of range) |
//! | Paused | pause `false` | → Active, flush buffer, disarm deadline |
//! | Paused | deadline reached | → Active, flush buffer |
//! | Active | change set | forward |
//! | Paused | change set | buffer |
//!
//! A repeated pause value is ignored. After a timeout the gate stays Active
//! even though the signal still reads `true`; only a fresh `true` pauses it
//! again.
//!
//! A flush concatenates every buffered set, in arrival order, into one set and
//! emits nothing if that set is empty.
//!
//! # Event precedence
//!
//! When several events are ready at once the gate handles them in this order:
//! deadline, then pause signal, then change sets. A change set still queued
//! when a `true` arrives is therefore buffered, even if it was produced while
//! the gate was Active. Likewise a set queued behind a `false` is forwarded
//! after the flush.

use crate::change::ChangeSet;
use crate::config::validate_pause_timeout;
use crate::engine::{ChangeSender, ChangeSetStream};
use crate::error::{Error, Result};
use crate::time::{TimeSource, TokioTimeSource};
use futures::future::BoxFuture;
use futures::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Active,
    Paused,
}

/// Buffering state machine.
#[derive(Debug)]
pub struct PauseGate<K, V> {
    state: GateState,
    buffer: Vec<ChangeSet<K, V>>,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
}

impl<K, V> PauseGate<K, V> {
    /// New gate, paused if `paused` is set.
    pub fn new(paused: bool, timeout: Option<Duration>, now: Instant) -> Self {
        let mut gate = PauseGate {
            state: GateState::Active,
            buffer: Vec::new(),
            timeout,
            deadline: None,
        };
        if paused {
            gate.pause(now);
        }
        gate
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    /// Instant at which a paused gate releases on its own.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Number of change records currently held.
    pub fn buffered(&self) -> usize {
        self.buffer.iter().map(|set| set.len()).sum()
    }

    /// Apply a pause signal value.
    pub fn on_pause(&mut self, paused: bool, now: Instant) -> Option<ChangeSet<K, V>> {
        match (self.state, paused) {
            (GateState::Active, true) => {
                self.pause(now);
                None
            }
            (GateState::Paused, false) => {
                debug!("Gate resumed, releasing {} changes", self.buffered());
                self.resume()
            }
            _ => None,
        }
    }

    /// Forward `changes` if active, otherwise hold them.
    pub fn on_changes(&mut self, changes: ChangeSet<K, V>) -> Option<ChangeSet<K, V>> {
        match self.state {
            GateState::Active if changes.is_empty() => None,
            GateState::Active => Some(changes),
            GateState::Paused => {
                self.buffer.push(changes);
                None
            }
        }
    }

    /// Release the gate if its deadline has been reached.
    pub fn on_deadline(&mut self, now: Instant) -> Option<ChangeSet<K, V>> {
        match self.deadline {
            Some(deadline) if self.state == GateState::Paused && now >= deadline => {
                debug!("Gate timed out, releasing {} changes", self.buffered());
                self.resume()
            }
            _ => None,
        }
    }

    /// Combine and drain everything held. `None` if nothing was held.
    pub fn flush(&mut self) -> Option<ChangeSet<K, V>> {
        let mut combined = ChangeSet::with_capacity(self.buffered());
        for set in self.buffer.drain(..) {
            combined.append(set);
        }
        (!combined.is_empty()).then_some(combined)
    }

    fn pause(&mut self, now: Instant) {
        self.state = GateState::Paused;
        self.deadline = self.timeout.and_then(|timeout| now.checked_add(timeout));
        debug!("Gate paused (deadline: {:?})", self.timeout);
    }

    fn resume(&mut self) -> Option<ChangeSet<K, V>> {
        self.state = GateState::Active;
        self.deadline = None;
        self.flush()
    }
}

/// Gate `changes` on the `pause` signal.
///
/// The gate starts paused if the signal currently reads `true`. With a
/// `timeout`, no pause holds changes for longer than that.
///
/// When either input completes, held changes are flushed and the stream
/// ends. An upstream error is forwarded and ends the stream; held changes are
/// dropped. Cancelling the returned stream drops held changes as well.
///
/// # Errors
///
/// Returns `Error::ConfigError` for a zero timeout or when there is no tokio
/// runtime to drive the gate.
pub fn buffer_if<K, V, S>(
    changes: S,
    mut pause: watch::Receiver<bool>,
    timeout: Option<Duration>,
    time_source: Arc<dyn TimeSource>,
) -> Result<ChangeSetStream<K, V>>
where
    K: Send + 'static,
    V: Send + 'static,
    S: Stream<Item = Result<ChangeSet<K, V>>> + Send + 'static,
{
    validate_pause_timeout(timeout)?;
    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| Error::ConfigError(format!("no tokio runtime: {}", e)))?;

    let paused = *pause.borrow_and_update();
    let gate = PauseGate::new(paused, timeout, time_source.now());
    let (sender, receiver) = mpsc::unbounded_channel();

    let task = runtime.spawn(run_gate(gate, changes, pause, time_source, sender));
    Ok(ChangeSetStream::new(receiver, task.abort_handle(), None))
}

impl<K, V> ChangeSetStream<K, V>
where
    K: Send + 'static,
    V: Send + 'static,
{
    /// Gate this stream on `pause`, using tokio's clock for the timeout.
    ///
    /// Without an explicit `timeout`, the engine config's `pause_timeout`
    /// applies.
    ///
    /// # Errors
    ///
    /// Same as [`buffer_if`].
    pub fn buffer_if(
        self,
        pause: watch::Receiver<bool>,
        timeout: Option<Duration>,
    ) -> Result<ChangeSetStream<K, V>> {
        let timeout = timeout.or(self.pause_timeout());
        buffer_if(self, pause, timeout, Arc::new(TokioTimeSource::new()))
    }
}

async fn run_gate<K, V, S>(
    mut gate: PauseGate<K, V>,
    changes: S,
    mut pause: watch::Receiver<bool>,
    time_source: Arc<dyn TimeSource>,
    sender: ChangeSender<K, V>,
) where
    S: Stream<Item = Result<ChangeSet<K, V>>> + Send + 'static,
{
    let mut changes = Box::pin(changes);

    loop {
        let timer: BoxFuture<'static, ()> = match gate.deadline() {
            Some(deadline) => time_source.sleep_until(deadline),
            None => Box::pin(futures::future::pending()),
        };

        let released = tokio::select! {
            biased;

            _ = timer => gate.on_deadline(time_source.now()),

            changed = pause.changed() => match changed {
                Ok(()) => {
                    let paused = *pause.borrow_and_update();
                    gate.on_pause(paused, time_source.now())
                }
                Err(_) => break,
            },

            next = changes.next() => match next {
                Some(Ok(set)) => gate.on_changes(set),
                Some(Err(e)) => {
                    warn!("Gated stream failed: {}", e);
                    let _ = sender.send(Err(e));
                    return;
                }
                None => break,
            },
        };

        if let Some(set) = released {
            if sender.send(Ok(set)).is_err() {
                return;
            }
        }
    }

    if let Some(set) = gate.flush() {
        let _ = sender.send(Ok(set));
    }
}
