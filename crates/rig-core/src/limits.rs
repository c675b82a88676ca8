//! Centralized timing and sizing constants.

use std::time::Duration;

/// How long `stop_acquisition()` waits for the worker to exit.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Poll interval while waiting for the worker thread to finish.
pub const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default capacity of channel subscriptions created from configuration.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 64;
