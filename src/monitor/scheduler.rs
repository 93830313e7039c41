//! Watchlist scheduler
//!
//! Every watched device runs in its own task on a fixed interval. A tick
//! samples the device, advances its health state, records the sample and
//! publishes an alert on a state change. Ticks of one device are serialized
//! by a per-device lock held for the whole tick; ticks across devices run in
//! parallel up to a global permit count.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::health::{HealthThresholds, evaluate_health};
use crate::alerts::{AlertDispatcher, AlertEvent};
use crate::config::MonitorSettings;
use crate::error::{EngineError, EngineResult};
use crate::metrics::MetricsStore;
use crate::models::{Device, Direction, HealthState, PerformanceSample, WatchEntry};
use crate::sampler::PerformanceSampler;

/// What one completed tick did
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickOutcome {
    pub address: IpAddr,
    pub previous: HealthState,
    pub current: HealthState,
    pub consecutive_failures: u32,
    pub sample: PerformanceSample,
}

impl TickOutcome {
    pub fn transitioned(&self) -> bool {
        self.previous != self.current
    }
}

/// Per-device scheduling state
struct WatchSlot {
    /// Held for the whole tick; removal takes it to wait out an in-flight tick
    tick_lock: tokio::sync::Mutex<()>,
    entry: Mutex<WatchEntry>,
    removed: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl WatchSlot {
    fn new(entry: WatchEntry) -> Self {
        Self {
            tick_lock: tokio::sync::Mutex::new(()),
            entry: Mutex::new(entry),
            removed: AtomicBool::new(false),
            task: Mutex::new(None),
        }
    }

    fn snapshot(&self) -> WatchEntry {
        match self.entry.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Stops future ticks; an in-flight tick discards its result
    fn retire(&self) {
        self.removed.store(true, Ordering::SeqCst);
        let handle = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }
    }

    fn is_removed(&self) -> bool {
        self.removed.load(Ordering::SeqCst)
    }
}

struct SchedulerInner {
    sampler: Arc<PerformanceSampler>,
    metrics: Arc<MetricsStore>,
    alerts: Arc<AlertDispatcher>,
    settings: MonitorSettings,
    thresholds: HealthThresholds,
    tick_permits: Semaphore,
    slots: RwLock<HashMap<IpAddr, Arc<WatchSlot>>>,
}

impl SchedulerInner {
    fn slot(&self, address: IpAddr) -> Option<Arc<WatchSlot>> {
        let slots = match self.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.get(&address).cloned()
    }

    async fn run_tick(&self, slot: &WatchSlot) -> Option<TickOutcome> {
        let _tick = slot.tick_lock.lock().await;
        if slot.is_removed() {
            return None;
        }
        let _permit = self.tick_permits.acquire().await.ok()?;

        let device = slot.snapshot().device;
        let sample = if self.settings.measure_bandwidth {
            let sampler_settings = self.sampler.settings();
            self.sampler
                .sample_with_bandwidth(
                    &device,
                    sampler_settings.sample_count,
                    sampler_settings.sample_interval,
                    Direction::Download,
                )
                .await
        } else {
            self.sampler.sample_default(&device).await
        };

        if slot.is_removed() {
            crate::log_debug!("Discarding tick result for removed {}", device.address);
            return None;
        }

        let (previous, update, device) = {
            let mut entry = match slot.entry.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            let previous = entry.state;
            let update = evaluate_health(
                previous,
                entry.consecutive_failures,
                &sample,
                &self.thresholds,
            );
            entry.state = update.state;
            entry.consecutive_failures = update.consecutive_failures;
            entry.ticks += 1;
            entry.last_sample_at = Some(sample.timestamp);
            if update.changed_from(previous) {
                entry.last_transition = Utc::now();
            }
            if sample.any_success() {
                entry.device.last_seen = sample.timestamp;
            }
            (previous, update, entry.device.clone())
        };

        self.metrics.append(device.address, sample.clone());

        if update.changed_from(previous) {
            let event = AlertEvent::transition(&device, previous, update.state, sample.clone());
            self.alerts.publish(&event);
        } else if update.consecutive_failures > 0 {
            crate::log_debug!(
                "{} failed tick ({}/{})",
                device.address,
                update.consecutive_failures,
                self.thresholds.failure_threshold
            );
        }

        Some(TickOutcome {
            address: device.address,
            previous,
            current: update.state,
            consecutive_failures: update.consecutive_failures,
            sample,
        })
    }
}

fn spawn_watch_task(
    inner: Weak<SchedulerInner>,
    slot: Arc<WatchSlot>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            if slot.is_removed() {
                break;
            }
            let Some(inner) = inner.upgrade() else {
                break;
            };
            inner.run_tick(&slot).await;
        }
    })
}

/// Owns the watchlist and its per-device tasks
pub struct MonitorScheduler {
    inner: Arc<SchedulerInner>,
}

impl MonitorScheduler {
    pub fn new(
        sampler: Arc<PerformanceSampler>,
        metrics: Arc<MetricsStore>,
        alerts: Arc<AlertDispatcher>,
        settings: MonitorSettings,
    ) -> Self {
        let thresholds = HealthThresholds::from(&settings);
        let permits = settings.max_concurrent_ticks.max(1);
        Self {
            inner: Arc::new(SchedulerInner {
                sampler,
                metrics,
                alerts,
                settings,
                thresholds,
                tick_permits: Semaphore::new(permits),
                slots: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn thresholds(&self) -> HealthThresholds {
        self.inner.thresholds
    }

    /// Interval a watch would actually run at
    ///
    /// Clamped to the configured bounds and never shorter than one worst-case
    /// sampling window plus a probe timeout, and the bandwidth step when
    /// ticks measure it.
    pub fn effective_interval(&self, requested: Option<Duration>) -> Duration {
        let settings = &self.inner.settings;
        let clamped = requested
            .unwrap_or(settings.default_interval)
            .clamp(settings.min_interval, settings.max_interval.max(settings.min_interval));
        let sampler = &self.inner.sampler;
        let mut floor = sampler.worst_case_duration() + sampler.probe_timeout();
        if settings.measure_bandwidth {
            floor += sampler.bandwidth_cost();
        }
        if clamped < floor {
            crate::log_debug!("Raising watch interval {:?} to {:?}", clamped, floor);
            floor
        } else {
            clamped
        }
    }

    /// Starts watching `device`; an existing watch for the address is replaced
    ///
    /// The first tick fires one interval after the call.
    pub async fn add_to_watchlist(&self, device: Device, interval: Option<Duration>) -> WatchEntry {
        let address = device.address;
        if self.inner.slot(address).is_some() {
            // Replacing must not leak alerts from the old watch
            let _ = self.remove_from_watchlist(address).await;
        }

        let interval = self.effective_interval(interval);
        let entry = WatchEntry::new(device, interval);
        let slot = Arc::new(WatchSlot::new(entry.clone()));

        let handle = spawn_watch_task(Arc::downgrade(&self.inner), Arc::clone(&slot), interval);
        match slot.task.lock() {
            Ok(mut guard) => *guard = Some(handle),
            Err(poisoned) => *poisoned.into_inner() = Some(handle),
        }

        let displaced = {
            let mut slots = match self.inner.slots.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots.insert(address, slot)
        };
        if let Some(old) = displaced {
            old.retire();
        }

        crate::log_info!("Watching {} ({}) every {:?}", entry.device.name, address, interval);
        entry
    }

    /// Stops watching `address`
    ///
    /// Waits for an in-flight tick, so once this returns no alert for the
    /// device will be published.
    pub async fn remove_from_watchlist(&self, address: IpAddr) -> EngineResult<WatchEntry> {
        let slot = {
            let mut slots = match self.inner.slots.write() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            slots.remove(&address)
        }
        .ok_or(EngineError::NotWatched(address))?;

        slot.retire();
        let _drained = slot.tick_lock.lock().await;

        let entry = slot.snapshot();
        crate::log_info!("Stopped watching {} ({})", entry.device.name, address);
        Ok(entry)
    }

    /// Runs one tick now, serialized with the scheduled ones
    pub async fn tick(&self, address: IpAddr) -> EngineResult<TickOutcome> {
        let slot = self
            .inner
            .slot(address)
            .ok_or(EngineError::NotWatched(address))?;
        self.inner
            .run_tick(&slot)
            .await
            .ok_or(EngineError::NotWatched(address))
    }

    /// Current watch entries, sorted by address
    pub fn watchlist(&self) -> Vec<WatchEntry> {
        let slots = match self.inner.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut entries: Vec<WatchEntry> = slots.values().map(|s| s.snapshot()).collect();
        entries.sort_by_key(|e| e.address());
        entries
    }

    pub fn entry(&self, address: IpAddr) -> Option<WatchEntry> {
        self.inner.slot(address).map(|s| s.snapshot())
    }

    pub fn is_watched(&self, address: IpAddr) -> bool {
        self.inner.slot(address).is_some()
    }

    /// Removes every watch
    pub async fn clear(&self) {
        let addresses: Vec<IpAddr> = self.watchlist().iter().map(|e| e.address()).collect();
        for address in addresses {
            let _ = self.remove_from_watchlist(address).await;
        }
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        let slots = match self.inner.slots.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for slot in slots.values() {
            slot.retire();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicU32;

    use crate::config::{ProbeSettings, SamplerSettings};
    use crate::error::ProbeError;
    use crate::models::BandwidthEstimate;
    use crate::scanner::Prober;

    /// Answers every ping while `up` is set
    struct SwitchProber {
        up: AtomicBool,
        pings: AtomicU32,
    }

    #[async_trait]
    impl Prober for SwitchProber {
        async fn ping_once(&self, _: IpAddr, _: Duration) -> Result<Duration, ProbeError> {
            self.pings.fetch_add(1, Ordering::SeqCst);
            if self.up.load(Ordering::SeqCst) {
                Ok(Duration::from_millis(5))
            } else {
                Err(ProbeError::Timeout)
            }
        }

        async fn check_port(&self, _: IpAddr, _: u16, _: Duration) -> Result<Duration, ProbeError> {
            Err(ProbeError::Timeout)
        }

        async fn sample_bandwidth(
            &self,
            _: IpAddr,
            _: Duration,
            _: Direction,
        ) -> Result<BandwidthEstimate, ProbeError> {
            Err(ProbeError::Unsupported)
        }
    }

    fn scheduler(up: bool) -> (MonitorScheduler, Arc<SwitchProber>, Arc<MetricsStore>) {
        scheduler_with(up, MonitorSettings::default())
    }

    fn scheduler_with(
        up: bool,
        settings: MonitorSettings,
    ) -> (MonitorScheduler, Arc<SwitchProber>, Arc<MetricsStore>) {
        let prober = Arc::new(SwitchProber {
            up: AtomicBool::new(up),
            pings: AtomicU32::new(0),
        });
        let sampler = Arc::new(PerformanceSampler::new(
            prober.clone(),
            ProbeSettings::default(),
            SamplerSettings {
                sample_count: 2,
                sample_interval: Duration::ZERO,
                ..SamplerSettings::default()
            },
        ));
        let metrics = Arc::new(MetricsStore::new(16));
        let scheduler = MonitorScheduler::new(
            sampler,
            Arc::clone(&metrics),
            Arc::new(AlertDispatcher::new(8)),
            settings,
        );
        (scheduler, prober, metrics)
    }

    fn device() -> Device {
        Device::new("192.0.2.50".parse().unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn interval_is_clamped_to_bounds() {
        let (scheduler, _, _) = scheduler(true);
        assert_eq!(
            scheduler.effective_interval(Some(Duration::from_secs(1))),
            Duration::from_secs(5)
        );
        assert_eq!(
            scheduler.effective_interval(Some(Duration::from_secs(90_000))),
            Duration::from_secs(3600)
        );
        assert_eq!(scheduler.effective_interval(None), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn bandwidth_ticks_raise_the_interval_floor() {
        // Two pings at 1.5s worst case each, plus one more probe timeout
        let (plain, _, _) = scheduler(true);
        assert_eq!(
            plain.effective_interval(Some(Duration::from_secs(5))),
            Duration::from_secs(5)
        );

        // Adds connect and echo timeouts (2 x 300ms) and the 2s transfer
        let (measuring, _, _) = scheduler_with(
            true,
            MonitorSettings {
                measure_bandwidth: true,
                ..MonitorSettings::default()
            },
        );
        assert_eq!(
            measuring.effective_interval(Some(Duration::from_secs(5))),
            Duration::from_millis(7100)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn tick_records_sample_and_transitions() {
        let (scheduler, _, metrics) = scheduler(true);
        let address = device().address;
        let entry = scheduler.add_to_watchlist(device(), None).await;
        assert_eq!(entry.state, HealthState::Unknown);

        let outcome = scheduler.tick(address).await.unwrap();

        assert!(outcome.transitioned());
        assert_eq!(outcome.current, HealthState::Online);
        assert_eq!(metrics.len(address), 1);
        assert_eq!(scheduler.entry(address).unwrap().ticks, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn scheduled_ticks_fire_on_interval() {
        let (scheduler, prober, metrics) = scheduler(true);
        let address = device().address;
        scheduler
            .add_to_watchlist(device(), Some(Duration::from_secs(10)))
            .await;

        tokio::time::sleep(Duration::from_secs(25)).await;

        assert_eq!(metrics.len(address), 2);
        assert_eq!(prober.pings.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_address_is_not_watched() {
        let (scheduler, _, _) = scheduler(false);
        let address = device().address;
        scheduler.add_to_watchlist(device(), None).await;

        scheduler.remove_from_watchlist(address).await.unwrap();

        assert!(!scheduler.is_watched(address));
        assert!(matches!(
            scheduler.tick(address).await,
            Err(EngineError::NotWatched(_))
        ));
        assert!(matches!(
            scheduler.remove_from_watchlist(address).await,
            Err(EngineError::NotWatched(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_ticks_keep_the_entry() {
        let (scheduler, _, _) = scheduler(false);
        let address = device().address;
        scheduler.add_to_watchlist(device(), None).await;

        for _ in 0..5 {
            scheduler.tick(address).await.unwrap();
        }

        let entry = scheduler.entry(address).unwrap();
        assert_eq!(entry.state, HealthState::Offline);
        assert_eq!(entry.consecutive_failures, 5);
    }
}
