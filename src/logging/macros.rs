//! Logging macros for lanpulse
//!
//! Aliases over `tracing` that tag every event with the `lanpulse` target,
//! so `RUST_LOG=lanpulse=debug` selects engine output alone. Engine code logs
//! through these rather than calling `tracing` directly.

/// Informational engine event
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        tracing::info!(target: "lanpulse", $($arg)*)
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        tracing::debug!(target: "lanpulse", $($arg)*)
    };
}

/// Per-probe detail, too noisy for debug
#[macro_export]
macro_rules! log_trace {
    ($($arg:tt)*) => {
        tracing::trace!(target: "lanpulse", $($arg)*)
    };
}

/// Recoverable problem, the operation continues
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        tracing::warn!(target: "lanpulse", $($arg)*)
    };
}

/// Failure a caller or subscriber should know about
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!(target: "lanpulse", $($arg)*)
    };
}
