use std::future::Future;
use std::time::Duration;

/// Abstracts time and randomness so the engine can be driven by a real
/// clock in production or a virtual one under test.
///
/// # Invariants
///
/// - `now()` is monotonically non-decreasing across calls on the same
///   environment.
/// - In production, `random_bytes` must be cryptographically secure (it
///   seeds id allocation, which an attacker could otherwise predict).
/// - Given the same sequence of calls and the same seed, a test
///   implementation must be deterministic.
pub trait Environment: Clone + Send + Sync + 'static {
    /// An opaque point in time, comparable within this environment.
    type Instant: Copy + Ord + Send + Sync + 'static;

    /// Returns the current instant.
    fn now(&self) -> Self::Instant;

    /// Suspends until `duration` has elapsed according to this environment's
    /// clock.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fills `buffer` with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Convenience wrapper returning a random `u16`, used for id allocation.
    fn random_u16(&self) -> u16 {
        let mut buf = [0u8; 2];
        self.random_bytes(&mut buf);
        u16::from_be_bytes(buf)
    }
}

/// Production [`Environment`] backed by the system clock and `tokio::time`.
///
/// Randomness comes from `rand`'s thread-local RNG, which is reseeded from
/// the OS and suitable for id allocation.
#[derive(Clone, Copy, Default)]
pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        use rand::RngCore;
        rand::thread_rng().fill_bytes(buffer);
    }
}
