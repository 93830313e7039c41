//! Metrics store - bounded per-device sample history
//!
//! Each device owns a ring buffer behind its own lock, so appends for
//! different devices never contend. The outer map lock is only held long
//! enough to find or create a buffer.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PerformanceSample;

/// Time range for history queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl TimeWindow {
    /// Everything currently retained
    pub fn all() -> Self {
        Self::default()
    }

    /// Samples from the last `span`
    pub fn last(span: Duration) -> Self {
        let span = chrono::Duration::from_std(span).unwrap_or(chrono::Duration::MAX);
        Self {
            since: Utc::now().checked_sub_signed(span),
            until: None,
        }
    }

    pub fn between(since: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        Self {
            since: Some(since),
            until: Some(until),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.since.is_none_or(|s| at >= s) && self.until.is_none_or(|u| at <= u)
    }
}

type Ring = Arc<Mutex<VecDeque<PerformanceSample>>>;

/// Per-device ring buffers of `PerformanceSample`
pub struct MetricsStore {
    capacity: usize,
    series: RwLock<HashMap<IpAddr, Ring>>,
}

impl MetricsStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            series: RwLock::new(HashMap::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn ring(&self, address: IpAddr) -> Option<Ring> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        series.get(&address).cloned()
    }

    fn ring_or_insert(&self, address: IpAddr) -> Ring {
        if let Some(ring) = self.ring(address) {
            return ring;
        }
        let mut series = match self.series.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(
            series
                .entry(address)
                .or_insert_with(|| Arc::new(Mutex::new(VecDeque::with_capacity(self.capacity)))),
        )
    }

    /// Appends a sample, evicting the oldest once the buffer is full
    pub fn append(&self, address: IpAddr, sample: PerformanceSample) {
        let ring = self.ring_or_insert(address);
        let mut buffer = match ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        while buffer.len() >= self.capacity {
            buffer.pop_front();
        }
        buffer.push_back(sample);
    }

    /// Retained samples inside `window`, oldest first
    pub fn history(&self, address: IpAddr, window: TimeWindow) -> Vec<PerformanceSample> {
        let Some(ring) = self.ring(address) else {
            return Vec::new();
        };
        let buffer = match ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer
            .iter()
            .filter(|s| window.contains(s.timestamp))
            .cloned()
            .collect()
    }

    pub fn latest(&self, address: IpAddr) -> Option<PerformanceSample> {
        let ring = self.ring(address)?;
        let buffer = match ring.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        buffer.back().cloned()
    }

    /// Number of retained samples for one device
    pub fn len(&self, address: IpAddr) -> usize {
        self.ring(address)
            .map(|ring| match ring.lock() {
                Ok(guard) => guard.len(),
                Err(poisoned) => poisoned.into_inner().len(),
            })
            .unwrap_or(0)
    }

    pub fn is_empty(&self, address: IpAddr) -> bool {
        self.len(address) == 0
    }

    /// Devices with any history
    pub fn devices(&self) -> Vec<IpAddr> {
        let series = match self.series.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut devices: Vec<IpAddr> = series.keys().copied().collect();
        devices.sort();
        devices
    }
}

/// JSON snapshot of one device's history
#[derive(Debug, Serialize)]
struct HistoryExport<'a> {
    address: IpAddr,
    window: TimeWindow,
    exported_at: DateTime<Utc>,
    samples: &'a [PerformanceSample],
}

/// Serializes `history(address, window)` for report and chart consumers
pub fn history_json(
    store: &MetricsStore,
    address: IpAddr,
    window: TimeWindow,
) -> serde_json::Result<String> {
    let samples = store.history(address, window);
    serde_json::to_string_pretty(&HistoryExport {
        address,
        window,
        exported_at: Utc::now(),
        samples: &samples,
    })
}
