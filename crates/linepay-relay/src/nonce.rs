//! Freshness tokens for signed upstream calls.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out millisecond-timestamp nonces that never repeat within the process.
///
/// Two calls landing in the same millisecond (or a clock stepping backwards)
/// get `last + 1` instead of a duplicate, so each signature is bound to a
/// distinct token.
#[derive(Debug, Default)]
pub struct NonceSource {
    last: AtomicU64,
}

impl NonceSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next nonce as the decimal string sent in `X-LINE-Authorization-Nonce`.
    pub fn next(&self) -> String {
        self.next_after(now_millis()).to_string()
    }

    fn next_after(&self, now: u64) -> u64 {
        let mut prev = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = now.max(prev + 1);
            match self
                .last
                .compare_exchange_weak(prev, candidate, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return candidate,
                Err(actual) => prev = actual,
            }
        }
    }
}

fn now_millis() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp_millis()).unwrap_or(0)
}
