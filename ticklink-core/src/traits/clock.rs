//! Time source

/// Monotonic millisecond clock
pub trait Clock {
    /// Milliseconds since start; wraps after ~49 days
    fn now_ms(&self) -> u32;
}

impl<T: Clock + ?Sized> Clock for &T {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }
}
