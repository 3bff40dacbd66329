use std::time::Instant;

/// A source of monotonically increasing milliseconds.
///
/// The in-memory store measures key expiry against this clock. Tests plug in a
/// manual clock to move time forward without sleeping.
///
/// # Example
/// ```
/// use tally_core::TimeSource;
///
/// struct FixedTime;
/// impl TimeSource for FixedTime {
///     fn current_millis(&self) -> u64 {
///         1234
///     }
/// }
///
/// assert_eq!(FixedTime.current_millis(), 1234);
/// ```
pub trait TimeSource: Send + Sync {
    /// Returns the number of milliseconds elapsed since the clock's origin.
    fn current_millis(&self) -> u64;
}

/// Wall-independent clock anchored at construction time.
#[derive(Clone, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn current_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

impl<T: TimeSource + ?Sized> TimeSource for std::sync::Arc<T> {
    fn current_millis(&self) -> u64 {
        (**self).current_millis()
    }
}
