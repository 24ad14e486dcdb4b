//! Recognized configuration options.

/// Tuning parameters for a [`crate::manager::Manager`].
///
/// # Examples
///
/// ```
/// use debra_reclaim::config::Config;
///
/// let cfg = Config::default();
/// assert_eq!(cfg.max_threads, 64);
/// assert_eq!(cfg.limbo_bag_capacity, 64);
/// assert_eq!(cfg.epochs_before_neutralize, 2);
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// Upper bound on concurrent registered threads. Affects the slot table size; fits a
    /// single machine word when `<= 64`, otherwise the active mask spans multiple words.
    pub max_threads: usize,
    /// Objects per limbo bag. A trade-off between allocation rate and reclamation
    /// granularity.
    pub limbo_bag_capacity: usize,
    /// Staleness tolerance, in epochs, before the neutralizer signals a pinned thread.
    pub epochs_before_neutralize: u64,
    /// Which directed per-thread signal to install for neutralization.
    pub neutralization_signal: i32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_threads: 64,
            limbo_bag_capacity: 64,
            epochs_before_neutralize: 2,
            neutralization_signal: default_neutralization_signal(),
        }
    }
}

#[cfg(unix)]
fn default_neutralization_signal() -> i32 {
    libc::SIGUSR1
}

#[cfg(not(unix))]
fn default_neutralization_signal() -> i32 {
    0
}

impl Config {
    /// Start from the defaults and override `max_threads`. Most callers only ever need to
    /// change this one field.
    pub fn with_max_threads(max_threads: usize) -> Self {
        Config {
            max_threads,
            ..Config::default()
        }
    }
}

#[cfg(test)]
mod test {
    use super::Config;

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.max_threads, 64);
        assert_eq!(cfg.limbo_bag_capacity, 64);
        assert_eq!(cfg.epochs_before_neutralize, 2);
    }

    #[test]
    fn test_with_max_threads() {
        let cfg = Config::with_max_threads(4);
        assert_eq!(cfg.max_threads, 4);
        assert_eq!(cfg.limbo_bag_capacity, 64);
    }
}
