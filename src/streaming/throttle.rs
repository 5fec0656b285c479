use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Byte-rate token bucket shared by every transfer leaving this node.
///
/// Callers reserve bytes up front; when the bucket goes into debt the caller
/// sleeps until the debt would have been repaid at the configured rate, so the
/// aggregate rate across concurrent transfers stays at the limit. The bucket
/// holds at most one second of budget.
pub struct StreamThrottle {
    bytes_per_sec: Option<u64>,
    state: Mutex<BucketState>,
    total_bytes: AtomicU64,
}

struct BucketState {
    available: f64,
    last_refill: Instant,
}

impl StreamThrottle {
    /// `None` disables throttling
    pub fn new(bytes_per_sec: Option<u64>) -> Self {
        let initial = bytes_per_sec.unwrap_or(0) as f64;
        Self {
            bytes_per_sec: bytes_per_sec.filter(|rate| *rate > 0),
            state: Mutex::new(BucketState {
                available: initial,
                last_refill: Instant::now(),
            }),
            total_bytes: AtomicU64::new(0),
        }
    }

    pub fn unlimited() -> Self {
        Self::new(None)
    }

    pub fn bytes_per_sec(&self) -> Option<u64> {
        self.bytes_per_sec
    }

    /// Total bytes that have passed through the throttle
    pub fn total_bytes(&self) -> u64 {
        self.total_bytes.load(Ordering::Relaxed)
    }

    /// Wait until `bytes` may be sent
    pub async fn acquire(&self, bytes: u64) {
        self.total_bytes.fetch_add(bytes, Ordering::Relaxed);

        let Some(rate) = self.bytes_per_sec else {
            return;
        };

        if let Some(wait) = self.reserve(bytes, rate) {
            trace!(bytes, wait_ms = wait.as_millis() as u64, "Throttling outbound stream");
            tokio::time::sleep(wait).await;
        }
    }

    fn reserve(&self, bytes: u64, rate: u64) -> Option<Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let capacity = rate as f64;

        state.available = (state.available + elapsed * capacity).min(capacity);
        state.last_refill = now;
        state.available -= bytes as f64;

        if state.available >= 0.0 {
            None
        } else {
            Some(Duration::from_secs_f64(-state.available / capacity))
        }
    }
}

impl std::fmt::Debug for StreamThrottle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamThrottle")
            .field("bytes_per_sec", &self.bytes_per_sec)
            .field("total_bytes", &self.total_bytes())
            .finish()
    }
}
