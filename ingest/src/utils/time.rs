use rand::Rng;
use std::time::Duration;

/// Sleep for `base_ms` plus a random jitter in `[0, jitter_ms]`, so retrying
/// workers do not thunder against the warehouse in lockstep.
pub async fn sleep_with_jitter(base_ms: u64, jitter_ms: u64) {
    let jitter = if jitter_ms > 0 {
        rand::rng().random_range(0..=jitter_ms)
    } else {
        0
    };
    tokio::time::sleep(Duration::from_millis(base_ms + jitter)).await;
}
