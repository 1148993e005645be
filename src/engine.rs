//! Change engine - main entry point.
//!
//! [`ChangeSetBuilder`] turns a stream of raw batches into a
//! [`ChangeSetStream`] of change sets against a keyed cache, applying the
//! configured size limit and expiry.
//!
//! # Consistency
//!
//! Mutations arrive from two kinds of trigger: upstream batches (applied on the
//! engine's driver task) and expiry timers (applied on timer tasks spawned by
//! the [`TimeSource`]). Both run their whole read-modify-capture-emit sequence
//! inside one mutex owned by the engine instance, so every emitted change set
//! describes exactly one transition and sets arrive in mutation order.
//!
//! # Lifecycle
//!
//! The cache lives as long as the subscription. It is torn down (timers
//! cancelled, entries dropped, nothing emitted) when the source completes or
//! fails, when a timer cannot be scheduled, or when the subscriber drops or
//! cancels the stream.

use crate::change::ChangeSet;
use crate::config::{ChangeSetConfig, ExpiryPolicy};
use crate::entity::Keyed;
use crate::error::{Error, Result};
use crate::expiry::{ExpiryCache, ExpirySelector, KeySelector};
use crate::observability::{ChangeMetrics, LogMetrics};
use crate::strategy::SourceStrategy;
use crate::time::{TimeSource, TimerHandle, TokioTimeSource};
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::hash::Hash;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

pub(crate) type ChangeSender<K, V> = mpsc::UnboundedSender<Result<ChangeSet<K, V>>>;

/// Builder for a change engine.
///
/// # Example
///
/// ```no_run
/// use change_kit::{source, ChangeSetBuilder};
/// use futures::StreamExt;
/// use std::time::Duration;
///
/// #[derive(Clone)]
/// struct Quote {
///     symbol: String,
///     price: f64,
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let (sender, batches) = source::channel::<Quote>();
///
///     let mut changes = ChangeSetBuilder::new()
///         .key_selector(|q: &Quote| q.symbol.clone())
///         .expire_after(|_| Some(Duration::from_secs(30)))
///         .limit_size_to(1_000)
///         .observe(batches)?;
///
///     sender.send_one(Quote { symbol: "ACME".into(), price: 1.0 })?;
///
///     if let Some(set) = changes.next().await {
///         println!("{} adds", set?.adds());
///     }
///     Ok(())
/// }
/// ```
pub struct ChangeSetBuilder<K, V> {
    key_selector: Option<KeySelector<V, K>>,
    expire_after: Option<ExpirySelector<V>>,
    config: ChangeSetConfig,
    time_source: Arc<dyn TimeSource>,
    metrics: Box<dyn ChangeMetrics>,
}

impl<K, V> ChangeSetBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    pub fn new() -> Self {
        ChangeSetBuilder {
            key_selector: None,
            expire_after: None,
            config: ChangeSetConfig::default(),
            time_source: Arc::new(TokioTimeSource::new()),
            metrics: Box::new(LogMetrics),
        }
    }

    /// Set the function mapping a value to its key. Required.
    pub fn key_selector<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> K + Send + Sync + 'static,
    {
        self.key_selector = Some(Arc::new(f));
        self
    }

    /// Set a per-value time-to-live. Returning `None` means never expire.
    ///
    /// Takes precedence over the config's [`ExpiryPolicy`].
    pub fn expire_after<F>(mut self, f: F) -> Self
    where
        F: Fn(&V) -> Option<Duration> + Send + Sync + 'static,
    {
        self.expire_after = Some(Arc::new(f));
        self
    }

    /// Maximum number of entries, evicting oldest-inserted first. `0` = unbounded.
    pub fn limit_size_to(mut self, limit: usize) -> Self {
        self.config.limit_size_to = limit;
        self
    }

    pub fn strategy(mut self, strategy: SourceStrategy) -> Self {
        self.config.strategy = strategy;
        self
    }

    pub fn time_source<T: TimeSource>(mut self, time_source: T) -> Self {
        self.time_source = Arc::new(time_source);
        self
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Box<dyn ChangeMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replace limit, expiry policy and strategy with those of `config`.
    pub fn with_config(mut self, config: ChangeSetConfig) -> Self {
        self.config = config;
        self
    }

    /// Start the engine over a stream of batches.
    ///
    /// Each `Ok(batch)` is applied according to the configured
    /// [`SourceStrategy`]. An `Err` is forwarded to the subscriber and ends
    /// the stream.
    ///
    /// # Errors
    ///
    /// Returns `Error::ConfigError` when no key selector was set, the config
    /// is invalid, or there is no tokio runtime to drive the engine.
    pub fn observe<S>(self, source: S) -> Result<ChangeSetStream<K, V>>
    where
        S: Stream<Item = Result<Vec<V>>> + Send + 'static,
    {
        let key_selector = self
            .key_selector
            .ok_or_else(|| Error::ConfigError("key selector is required".to_string()))?;
        self.config.validate()?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::ConfigError(format!("no tokio runtime: {}", e)))?;
        let pause_timeout = self.config.pause_timeout;

        let expire_after = self.expire_after.or_else(|| match self.config.expiry {
            ExpiryPolicy::Never => None,
            ExpiryPolicy::Fixed(ttl) => {
                let f: ExpirySelector<V> = Arc::new(move |_: &V| Some(ttl));
                Some(f)
            }
        });

        let cache = ExpiryCache::new(key_selector)
            .with_expiry(expire_after)
            .with_limit(self.config.limit_size_to)
            .with_strategy(self.config.strategy);

        let (sender, receiver) = mpsc::unbounded_channel();
        let core = Arc::new(Mutex::new(EngineCore {
            cache,
            timers: HashMap::new(),
            sink: Some(sender),
            time_source: self.time_source,
            metrics: self.metrics,
            terminated: false,
        }));

        info!(
            "Change stream started (strategy: {}, limit: {})",
            self.config.strategy, self.config.limit_size_to
        );

        let driver = runtime.spawn(drive(core.clone(), source));

        let weak = Arc::downgrade(&core);
        let on_cancel: CancelHook = Box::new(move || {
            if let Some(core) = weak.upgrade() {
                lock(&core).teardown();
            }
        });

        Ok(ChangeSetStream::new(receiver, driver.abort_handle(), Some(on_cancel))
            .with_pause_timeout(pause_timeout))
    }

    /// Start the engine over a stream of individual values.
    ///
    /// Values are always merged; the configured strategy is ignored.
    ///
    /// # Errors
    ///
    /// Same as [`ChangeSetBuilder::observe`].
    pub fn observe_values<S>(mut self, source: S) -> Result<ChangeSetStream<K, V>>
    where
        S: Stream<Item = Result<V>> + Send + 'static,
    {
        self.config.strategy = SourceStrategy::Merge;
        self.observe(source.map(|item| item.map(|value| vec![value])))
    }
}

impl<V> ChangeSetBuilder<V::Key, V>
where
    V: Keyed + Clone + Send + 'static,
{
    /// Builder whose key selector is [`Keyed::key`].
    pub fn keyed() -> Self {
        Self::new().key_selector(|value: &V| value.key())
    }
}

impl<K, V> Default for ChangeSetBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

/// State guarded by the engine's mutex.
struct EngineCore<K, V> {
    cache: ExpiryCache<K, V>,
    timers: HashMap<Instant, TimerHandle>,
    // Dropped on teardown so the subscriber's stream ends.
    sink: Option<ChangeSender<K, V>>,
    time_source: Arc<dyn TimeSource>,
    metrics: Box<dyn ChangeMetrics>,
    terminated: bool,
}

type SharedCore<K, V> = Arc<Mutex<EngineCore<K, V>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V> EngineCore<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn on_batch(&mut self, batch: Vec<V>, this: &Weak<Mutex<Self>>) {
        if self.terminated {
            return;
        }

        let size = batch.len();
        let applied = self.cache.apply_batch(batch, self.time_source.now());
        debug!(
            "» Applied batch of {} -> {} changes, {} cached",
            size,
            applied.changes.len(),
            self.cache.len()
        );

        if applied.evicted > 0 {
            self.metrics.record_eviction(applied.evicted);
        }

        if let Err(e) = self.reconcile_timers(&applied.touched, this) {
            self.fail(e);
            return;
        }

        self.emit(applied.changes);
    }

    fn on_deadline(&mut self, deadline: Instant) {
        if self.terminated {
            return;
        }

        self.timers.remove(&deadline);
        let changes = self.cache.expire(deadline);
        if !changes.is_empty() {
            self.metrics.record_expiry(changes.removes());
        }
        self.emit(changes);
    }

    /// One timer per deadline that still has keys; none for the rest.
    fn reconcile_timers(&mut self, touched: &[Instant], this: &Weak<Mutex<Self>>) -> Result<()> {
        for &deadline in touched {
            let wanted = self.cache.has_deadline(&deadline);
            let armed = self.timers.contains_key(&deadline);

            if wanted && !armed {
                let core = this.clone();
                let handle = self.time_source.schedule(
                    deadline,
                    Box::new(move || {
                        if let Some(core) = core.upgrade() {
                            lock(&core).on_deadline(deadline);
                        }
                    }),
                )?;
                self.timers.insert(deadline, handle);
            } else if !wanted && armed {
                if let Some(handle) = self.timers.remove(&deadline) {
                    handle.cancel();
                }
            }
        }
        Ok(())
    }

    fn emit(&mut self, changes: ChangeSet<K, V>) {
        if changes.is_empty() {
            return;
        }

        self.metrics.record_changes(&changes.summary());
        let delivered = self
            .sink
            .as_ref()
            .is_some_and(|sink| sink.send(Ok(changes)).is_ok());
        if !delivered {
            debug!("Subscriber gone, tearing down change stream");
            self.teardown();
        }
    }

    fn fail(&mut self, error: Error) {
        warn!("Change stream failed: {}", error);
        self.metrics.record_error(&error.to_string());
        if let Some(sink) = &self.sink {
            let _ = sink.send(Err(error));
        }
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;
        for (_, timer) in self.timers.drain() {
            timer.cancel();
        }
        self.cache.clear();
        self.sink = None;
    }
}

async fn drive<K, V, S>(core: SharedCore<K, V>, source: S)
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone + Send + 'static,
    S: Stream<Item = Result<Vec<V>>> + Send + 'static,
{
    let this = Arc::downgrade(&core);
    let mut source = Box::pin(source);

    while let Some(next) = source.next().await {
        let terminated = {
            let mut core = lock(&core);
            match next {
                Ok(batch) => core.on_batch(batch, &this),
                Err(e) => core.fail(e),
            }
            core.terminated
        };
        if terminated {
            return;
        }
    }

    info!("Change stream source completed");
    lock(&core).teardown();
}

type CancelHook = Box<dyn FnOnce() + Send>;

/// Stream of change sets produced by an engine or a pause gate.
///
/// An `Err` item is always the last item. Dropping the stream cancels it:
/// driver task and timers are stopped, and nothing further is delivered.
pub struct ChangeSetStream<K, V> {
    receiver: mpsc::UnboundedReceiver<Result<ChangeSet<K, V>>>,
    driver: AbortHandle,
    on_cancel: Option<CancelHook>,
    cancelled: bool,
    /// Default timeout for [`buffer_if`](ChangeSetStream::buffer_if).
    pause_timeout: Option<Duration>,
}

impl<K, V> ChangeSetStream<K, V> {
    pub(crate) fn new(
        receiver: mpsc::UnboundedReceiver<Result<ChangeSet<K, V>>>,
        driver: AbortHandle,
        on_cancel: Option<CancelHook>,
    ) -> Self {
        ChangeSetStream {
            receiver,
            driver,
            on_cancel,
            cancelled: false,
            pause_timeout: None,
        }
    }

    pub(crate) fn with_pause_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.pause_timeout = timeout;
        self
    }

    pub(crate) fn pause_timeout(&self) -> Option<Duration> {
        self.pause_timeout
    }

    /// Stop the stream. Buffered, undelivered change sets are discarded.
    pub fn cancel(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.driver.abort();
        if let Some(hook) = self.on_cancel.take() {
            hook();
        }
        self.receiver.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl<K, V> Stream for ChangeSetStream<K, V> {
    type Item = Result<ChangeSet<K, V>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.cancelled {
            return Poll::Ready(None);
        }
        this.receiver.poll_recv(cx)
    }
}

impl<K, V> Drop for ChangeSetStream<K, V> {
    fn drop(&mut self) {
        self.cancel();
    }
}
