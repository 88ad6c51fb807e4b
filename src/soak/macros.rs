//! Helper macros for the soak loop state machine modules.

/// Generate a [`Debug`](std::fmt::Debug) implementation for a state or
/// event struct that carries the run counters alongside a token driver,
/// which has no `Debug` of its own.
#[macro_export]
macro_rules! debug_fmt_with_stats {
    ($type:ty, $label:literal) => {
        impl std::fmt::Debug for $type {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct($label).field("stats", &self.stats).finish()
            }
        }
    };
}
