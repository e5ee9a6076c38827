// Runtime constants (no magic values)
use std::time::Duration;

/// Sleep duration after a worker cycle that processed nothing (10s)
pub const IDLE_SLEEP_DURATION: Duration = Duration::from_secs(10);

/// Sleep duration after a non-fatal worker error before retry (1s)
pub const ERROR_RECOVERY_SLEEP_DURATION: Duration = Duration::from_secs(1);

/// Broker ceiling for one ReceiveMessage call
pub const MAX_BATCH_SIZE: usize = 10;

/// Floor for a message's execution budget (100ms)
/// A budget at the floor means the visibility window was already spent.
pub const MIN_DEADLINE: Duration = Duration::from_millis(100);

/// Smallest delay accepted by `later()` (seconds)
pub const MIN_DELAY_SECONDS: i64 = 1;

/// Largest delay accepted by `later()` (seconds)
pub const MAX_DELAY_SECONDS: i64 = 960;

/// Parallel executor count bounds
pub const MIN_PARALLEL_AMOUNT: usize = 1;
pub const MAX_PARALLEL_AMOUNT: usize = 11;

/// Default parallel executor count
pub const DEFAULT_PARALLEL_AMOUNT: usize = 4;

/// Receive wait time: 0 makes fetches non-blocking
pub const RECEIVE_WAIT_SECONDS: u32 = 0;
