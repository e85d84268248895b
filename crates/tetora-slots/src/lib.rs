//! C2 — slot-pressure guard: admission control in front of the shared
//! bounded concurrency resource.
//!
//! This is deliberately *not* a `tokio::sync::Semaphore` wrapper: spec §9
//! warns against reusing a generic weighted semaphore here because its
//! fairness semantics would hide the two invariants this guard exists to
//! enforce (interactive chat is never blocked by cron; non-interactive work
//! cannot starve forever). Instead `active`/`waiting` are plain atomics and
//! admission is a small explicit state machine per source class.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tetora_core::types::{Source, SourceClass, TaskId};
use tetora_events::EventBroker;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Pseudo task-id used to publish `slot_pressure` events, which are a
/// system-wide signal rather than belonging to any one task.
pub fn slots_topic() -> TaskId {
    TaskId::from("system:slots")
}

#[derive(Debug, Clone)]
pub struct SlotGuardConfig {
    pub capacity: usize,
    pub reserved_slots: usize,
    pub warn_threshold: usize,
    pub non_interactive_timeout: Duration,
    pub poll_interval: Duration,
    pub monitor_interval: Duration,
    pub alert_cooldown: Duration,
}

impl From<&tetora_core::config::SlotConfig> for SlotGuardConfig {
    fn from(c: &tetora_core::config::SlotConfig) -> Self {
        Self {
            capacity: c.capacity,
            reserved_slots: c.reserved_slots,
            warn_threshold: c.warn_threshold,
            non_interactive_timeout: Duration::from_millis(c.non_interactive_timeout_ms),
            poll_interval: Duration::from_millis(c.poll_interval_ms),
            monitor_interval: Duration::from_secs(c.monitor_interval_secs),
            alert_cooldown: Duration::from_secs(c.alert_cooldown_secs),
        }
    }
}

impl Default for SlotGuardConfig {
    fn default() -> Self {
        Self::from(&tetora_core::config::SlotConfig::default())
    }
}

#[derive(Debug, Error)]
pub enum SlotError {
    #[error("acquisition cancelled")]
    Cancelled,
}

/// Something to call when free capacity drops to or below `warn_threshold`.
/// Implementations should be cheap/non-blocking (e.g. enqueue a message);
/// the guard serializes calls with its own 60s-default cooldown so a
/// chatty implementation can't be invoked more than once per window.
pub trait PressureNotifier: Send + Sync {
    fn notify(&self, available: i64, used: i64, capacity: usize, waiting: u64);
}

/// RAII permit. Dropping it releases the slot. Carries an optional pressure
/// warning string the caller should surface to interactive users.
pub struct SlotPermit {
    guard: SlotGuard,
    pub pressure_warning: Option<String>,
}

impl Drop for SlotPermit {
    fn drop(&mut self) {
        self.guard.release();
    }
}

#[derive(Clone)]
pub struct SlotGuard {
    inner: Arc<Inner>,
}

struct Inner {
    config: SlotGuardConfig,
    active: AtomicI64,
    waiting: AtomicU64,
    last_alert_at: AtomicI64,
    events: EventBroker,
    notifier: Option<Arc<dyn PressureNotifier>>,
}

impl SlotGuard {
    pub fn new(config: SlotGuardConfig, events: EventBroker) -> Self {
        Self::with_notifier(config, events, None)
    }

    pub fn with_notifier(
        config: SlotGuardConfig,
        events: EventBroker,
        notifier: Option<Arc<dyn PressureNotifier>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                active: AtomicI64::new(0),
                waiting: AtomicU64::new(0),
                last_alert_at: AtomicI64::new(i64::MIN),
                events,
                notifier,
            }),
        }
    }

    fn available(&self) -> i64 {
        self.inner.config.capacity as i64 - self.inner.active.load(Ordering::Relaxed)
    }

    /// Acquire a slot for `source`. Interactive sources always succeed
    /// immediately (spec §4.2). Non-interactive sources acquire only while
    /// `available > reserved_slots`, otherwise poll until a slot frees, the
    /// starvation timeout elapses (force-acquire), or `cancel` fires.
    pub async fn acquire(
        &self,
        source: &Source,
        cancel: &CancellationToken,
    ) -> Result<SlotPermit, SlotError> {
        match source.classify() {
            SourceClass::Interactive => Ok(self.acquire_interactive()),
            SourceClass::NonInteractive => self.acquire_non_interactive(cancel).await,
        }
    }

    fn acquire_interactive(&self) -> SlotPermit {
        self.inner.active.fetch_add(1, Ordering::Relaxed);
        let available = self.available();
        let pressure_warning = if available <= self.inner.config.warn_threshold as i64 {
            Some(format!(
                "System is under load ({available} slots free) — your request was prioritized, but responses may be slower than usual."
            ))
        } else {
            None
        };
        SlotPermit {
            guard: self.clone(),
            pressure_warning,
        }
    }

    async fn acquire_non_interactive(
        &self,
        cancel: &CancellationToken,
    ) -> Result<SlotPermit, SlotError> {
        let reserved = self.inner.config.reserved_slots as i64;

        if self.available() > reserved {
            self.inner.active.fetch_add(1, Ordering::Relaxed);
            return Ok(SlotPermit {
                guard: self.clone(),
                pressure_warning: None,
            });
        }

        self.inner.waiting.fetch_add(1, Ordering::Relaxed);
        let started = std::time::Instant::now();
        let result = loop {
            if cancel.is_cancelled() {
                break Err(SlotError::Cancelled);
            }

            if self.available() > reserved {
                self.inner.active.fetch_add(1, Ordering::Relaxed);
                break Ok(SlotPermit {
                    guard: self.clone(),
                    pressure_warning: None,
                });
            }

            if started.elapsed() >= self.inner.config.non_interactive_timeout {
                // Starvation guard: force-acquire regardless of reserved slots.
                warn!("non-interactive acquire forced after timeout — starvation guard fired");
                self.inner.active.fetch_add(1, Ordering::Relaxed);
                break Ok(SlotPermit {
                    guard: self.clone(),
                    pressure_warning: None,
                });
            }

            tokio::select! {
                _ = tokio::time::sleep(self.inner.config.poll_interval) => {}
                _ = cancel.cancelled() => {
                    break Err(SlotError::Cancelled);
                }
            }
        };

        self.inner.waiting.fetch_sub(1, Ordering::Relaxed);
        result
    }

    fn release(&self) {
        self.inner.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn active(&self) -> i64 {
        self.inner.active.load(Ordering::Relaxed)
    }

    pub fn waiting(&self) -> u64 {
        self.inner.waiting.load(Ordering::Relaxed)
    }

    /// Background monitor: wakes every `monitor_interval`, publishes a
    /// `slot_pressure` event, and (cooldown-gated) calls the notifier.
    /// Runs until `shutdown` is cancelled.
    pub async fn run_monitor(&self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.inner.config.monitor_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => self.monitor_tick(),
                _ = shutdown.cancelled() => {
                    info!("slot pressure monitor shutting down");
                    break;
                }
            }
        }
    }

    fn monitor_tick(&self) {
        let available = self.available();
        let used = self.inner.active.load(Ordering::Relaxed);
        let waiting = self.inner.waiting.load(Ordering::Relaxed);
        let capacity = self.inner.config.capacity;

        self.inner.events.publish(tetora_core::types::SseEvent::new(
            tetora_core::types::SseEventType::SlotPressure,
            slots_topic(),
            serde_json::json!({
                "available": available,
                "used": used,
                "capacity": capacity,
                "waiting": waiting,
            }),
        ));

        if available <= self.inner.config.warn_threshold as i64 {
            let now_ms = now_millis();
            let last = self.inner.last_alert_at.load(Ordering::Relaxed);
            let cooldown_ms = self.inner.config.alert_cooldown.as_millis() as i64;
            if last == i64::MIN || now_ms - last >= cooldown_ms {
                self.inner.last_alert_at.store(now_ms, Ordering::Relaxed);
                if let Some(notifier) = &self.inner.notifier {
                    notifier.notify(available, used, capacity, waiting);
                }
            }
        }
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
