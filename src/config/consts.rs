// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

/// Redeliveries attempted when nothing is configured (none)
pub const DEFAULT_MAXIMUM_REDELIVERIES: i32 = 0;
/// Delay before the first redelivery
pub const DEFAULT_INITIAL_REDELIVERY_DELAY_MS: u64 = 1_000;
/// Multiplier applied per redelivery; 1.0 keeps the delay constant
pub const DEFAULT_BACKOFF_MULTIPLIER: f64 = 1.0;
/// Upper bound on any single redelivery delay
pub const DEFAULT_MAXIMUM_REDELIVERY_DELAY_MS: u64 = 60_000;
/// Fraction of the delay randomly added or removed when jitter is on
pub const DEFAULT_COLLISION_AVOIDANCE_FACTOR: f64 = 0.15;

/// Jobs the continuation pool queues before rejecting
pub const DEFAULT_CONTINUATION_QUEUE_CAPACITY: usize = 1_000;
/// Idle handles kept per destination before extras are destroyed
pub const DEFAULT_MAX_IDLE_PER_DESTINATION: usize = 8;
/// How long shutdown waits for in-flight tasks before stopping the pools
pub const DEFAULT_SHUTDOWN_TIMEOUT_MS: u64 = 30_000;
/// Aggregation strategy used by a fan-out when none is named
pub const DEFAULT_AGGREGATION: &str = "use_latest";

/// Worker count for pools and parallel fan-out when none is configured.
pub fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
