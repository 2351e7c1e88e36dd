//! Environment abstraction for deterministic testing.
//!
//! Decouples protocol logic from system resources (time, randomness).
//! Production code plugs in real clocks and OS entropy; tests plug in
//! virtual time and seeded randomness so every run is reproducible.

use std::time::Duration;

/// Abstract environment providing time, randomness, and the one async
/// primitive driver code needs.
///
/// Implementations MUST guarantee:
///
/// - `now()` never goes backwards within one execution context
/// - `random_bytes()` uses cryptographically secure entropy in production
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; test environments
    /// may use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Current wall-clock time as Unix seconds, for persisted timestamps
    /// only, never for timeouts or ordering.
    fn unix_now_secs(&self) -> u64;

    /// Sleep for the given duration.
    ///
    /// The only async method in the trait, used by driver code only;
    /// protocol logic never suspends.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill the buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`, for session ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    /// Random IV for an active frame.
    fn random_iv(&self) -> [u8; renju_proto::IV_LEN] {
        let mut iv = [0u8; renju_proto::IV_LEN];
        self.random_bytes(&mut iv);
        iv
    }
}
