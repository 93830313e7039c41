//! Engine facade
//!
//! `MonitorEngine` wires discovery, sampling, scheduling, metrics and alerts
//! together and is the surface presentation or report layers call into.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::alerts::{AlertDispatcher, AlertEvent, AlertHandler, SubscriptionId};
use crate::config::EngineConfig;
use crate::discovery::DiscoveryScanner;
use crate::error::{EngineError, EngineResult};
use crate::metrics::{MetricsStore, TimeWindow, history_json};
use crate::models::{Device, Direction, InterfaceInfo, PerformanceSample, WatchEntry};
use crate::monitor::{EventCallback, InventoryWatcher, MonitorScheduler, MonitoringStatus, TickOutcome};
use crate::network::{AddressRange, LocalNetwork, SystemNetwork};
use crate::sampler::PerformanceSampler;
use crate::scanner::{NetworkProber, Prober};

pub struct MonitorEngine {
    config: EngineConfig,
    scanner: Arc<DiscoveryScanner>,
    sampler: Arc<PerformanceSampler>,
    metrics: Arc<MetricsStore>,
    alerts: Arc<AlertDispatcher>,
    scheduler: MonitorScheduler,
    inventory_watch: InventoryWatcher,
}

impl MonitorEngine {
    /// Engine probing the real network from this host
    pub fn new(config: EngineConfig) -> Self {
        let prober: Arc<dyn Prober> = Arc::new(NetworkProber::new(config.probe.clone()));
        Self::with_components(config, prober, Arc::new(SystemNetwork))
    }

    /// `new` with configuration from `LANPULSE_*` environment variables
    pub fn from_env() -> Self {
        Self::new(EngineConfig::from_env())
    }

    /// Engine over caller-supplied probe and host-network implementations
    pub fn with_components(
        config: EngineConfig,
        prober: Arc<dyn Prober>,
        network: Arc<dyn LocalNetwork>,
    ) -> Self {
        let scanner = Arc::new(DiscoveryScanner::new(
            Arc::clone(&prober),
            network,
            config.probe.clone(),
            config.discovery.clone(),
        ));
        let sampler = Arc::new(PerformanceSampler::new(
            prober,
            config.probe.clone(),
            config.sampler.clone(),
        ));
        let metrics = Arc::new(MetricsStore::new(config.history_capacity));
        let alerts = Arc::new(AlertDispatcher::new(config.alert_stream_capacity));
        let scheduler = MonitorScheduler::new(
            Arc::clone(&sampler),
            Arc::clone(&metrics),
            Arc::clone(&alerts),
            config.monitor.clone(),
        );
        let inventory_watch = InventoryWatcher::new(Arc::clone(&scanner));

        Self {
            config,
            scanner,
            sampler,
            metrics,
            alerts,
            scheduler,
            inventory_watch,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Usable local interfaces, the one scans default to first
    pub async fn interfaces(&self) -> Vec<InterfaceInfo> {
        self.scanner.interfaces().await
    }

    // ---- Inventory ----

    /// Devices from every scan so far, sorted by address
    pub fn inventory(&self) -> Vec<Device> {
        self.scanner.inventory()
    }

    /// Scans `range`, or the local subnet when `None`, and waits for the result
    pub async fn scan(&self, range: Option<AddressRange>) -> EngineResult<Vec<Device>> {
        run_scan(&self.scanner, range).await
    }

    /// Starts a scan in the background and returns immediately
    ///
    /// `on_complete` receives the scan result, including `InvalidTarget` and
    /// `DiscoveryFailed` errors.
    pub fn trigger_scan<F>(&self, range: Option<AddressRange>, on_complete: F) -> JoinHandle<()>
    where
        F: FnOnce(EngineResult<Vec<Device>>) + Send + 'static,
    {
        let scanner = Arc::clone(&self.scanner);
        tokio::spawn(async move {
            let result = run_scan(&scanner, range).await;
            if let Err(e) = &result {
                crate::log_warn!("Background scan failed: {}", e);
            }
            on_complete(result);
        })
    }

    // ---- Watchlist ----

    pub fn watchlist(&self) -> Vec<WatchEntry> {
        self.scheduler.watchlist()
    }

    /// Watches `address` using its inventory record when one exists
    ///
    /// `interval` defaults to the configured monitor interval and is clamped
    /// to the allowed range.
    pub async fn add_watch(&self, address: IpAddr, interval: Option<Duration>) -> EngineResult<WatchEntry> {
        if address.is_unspecified() || address.is_multicast() {
            return Err(EngineError::invalid_target(
                address.to_string(),
                "not a unicast host address",
            ));
        }
        let device = self
            .scanner
            .device(address)
            .unwrap_or_else(|| Device::new(address));
        Ok(self.scheduler.add_to_watchlist(device, interval).await)
    }

    pub async fn remove_watch(&self, address: IpAddr) -> EngineResult<WatchEntry> {
        self.scheduler.remove_from_watchlist(address).await
    }

    /// Runs a tick for a watched device immediately
    pub async fn tick(&self, address: IpAddr) -> EngineResult<TickOutcome> {
        self.scheduler.tick(address).await
    }

    /// Samples any address once without recording it
    pub async fn sample(&self, address: IpAddr, bandwidth: Option<Direction>) -> PerformanceSample {
        let device = self
            .scanner
            .device(address)
            .unwrap_or_else(|| Device::new(address));
        let settings = self.sampler.settings();
        match bandwidth {
            Some(direction) => {
                self.sampler
                    .sample_with_bandwidth(
                        &device,
                        settings.sample_count,
                        settings.sample_interval,
                        direction,
                    )
                    .await
            }
            None => self.sampler.sample_default(&device).await,
        }
    }

    // ---- History ----

    pub fn history(&self, address: IpAddr, window: TimeWindow) -> Vec<PerformanceSample> {
        self.metrics.history(address, window)
    }

    pub fn latest_sample(&self, address: IpAddr) -> Option<PerformanceSample> {
        self.metrics.latest(address)
    }

    /// `history` as a JSON document
    pub fn history_json(&self, address: IpAddr, window: TimeWindow) -> serde_json::Result<String> {
        history_json(&self.metrics, address, window)
    }

    // ---- Alerts ----

    pub fn subscribe_alerts(&self, handler: AlertHandler) -> SubscriptionId {
        self.alerts.subscribe(handler)
    }

    pub fn unsubscribe_alerts(&self, id: SubscriptionId) -> bool {
        self.alerts.unsubscribe(id)
    }

    pub fn alert_stream(&self) -> broadcast::Receiver<AlertEvent> {
        self.alerts.subscribe_stream()
    }

    // ---- Inventory watch ----

    /// Rescans `range` (local subnet when `None`) every `interval_secs`
    pub async fn start_inventory_watch(
        &self,
        range: Option<AddressRange>,
        interval_secs: Option<u64>,
        callback: EventCallback,
    ) {
        self.inventory_watch.start(range, interval_secs, callback).await;
    }

    pub fn stop_inventory_watch(&self) {
        self.inventory_watch.stop();
    }

    pub async fn inventory_watch_status(&self) -> MonitoringStatus {
        self.inventory_watch.status().await
    }

    /// Stops the inventory watch and every device watch
    pub async fn shutdown(&self) {
        self.inventory_watch.stop();
        self.scheduler.clear().await;
        crate::log_info!("Engine shut down");
    }
}

async fn run_scan(scanner: &DiscoveryScanner, range: Option<AddressRange>) -> EngineResult<Vec<Device>> {
    let range = match range {
        Some(range) => range,
        None => scanner.default_range().await?,
    };
    scanner.scan(&range, scanner.settings().concurrency).await
}

impl Default for MonitorEngine {
    fn default() -> Self {
        Self::from_env()
    }
}
