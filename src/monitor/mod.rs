//! Monitor module - watchlist scheduling, health evaluation and inventory rescans

pub mod events;
pub mod health;
pub mod scheduler;
pub mod watcher;

pub use events::{InventoryEvent, MonitoringStatus};
pub use health::{HealthThresholds, HealthUpdate, evaluate_health};
pub use scheduler::{MonitorScheduler, TickOutcome};
pub use watcher::{EventCallback, InventoryWatcher, detect_inventory_changes};
