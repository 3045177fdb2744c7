//! Client-side throttling for exchange calls.
//!
//! Basic tier: 20 reads/sec, 10 writes/sec. Order placement draws from the
//! write bucket, everything else from the read bucket.

use std::num::NonZeroU32;
use std::sync::Arc;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter as GovLimiter};

type DirectLimiter = GovLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub const DEFAULT_READS_PER_SEC: u32 = 20;
pub const DEFAULT_WRITES_PER_SEC: u32 = 10;

/// Separate read and write buckets, shared across clones.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    reads: Arc<DirectLimiter>,
    writes: Arc<DirectLimiter>,
}

fn per_second(limit: u32) -> Quota {
    // A zero limit would never admit a request; clamp to one.
    Quota::per_second(NonZeroU32::new(limit).unwrap_or(NonZeroU32::MIN))
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_READS_PER_SEC, DEFAULT_WRITES_PER_SEC)
    }

    pub fn with_limits(reads_per_sec: u32, writes_per_sec: u32) -> Self {
        Self {
            reads: Arc::new(GovLimiter::direct(per_second(reads_per_sec))),
            writes: Arc::new(GovLimiter::direct(per_second(writes_per_sec))),
        }
    }

    pub async fn wait_read(&self) {
        self.reads.until_ready().await;
    }

    pub async fn wait_write(&self) {
        self.writes.until_ready().await;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
