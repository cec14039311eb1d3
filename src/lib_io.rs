#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]

use tokio::time::{sleep, Duration};

/// Suspends the calling task for `duration_ms` of wall-clock time without
/// occupying its worker thread.
pub async fn wait(duration_ms: u64) {
    if duration_ms == 0 {
        return;
    }
    sleep(Duration::from_millis(duration_ms)).await;
}
