//! Per-server health statistics and adaptive timeouts.
//!
//! Every server in a session carries a [`ServerStats`]: its streak of
//! consecutive failures, when it last failed and last succeeded, and a
//! histogram of observed round-trip times. The fallback period of the
//! next attempt against a server derives from the high percentile of
//! that histogram, so a consistently fast server is given up on
//! quickly while a slow one gets the time it demonstrably needs.

#![warn(missing_docs)]

use std::time::Duration;
use tokio::time::Instant;

//------------ Module Configuration ------------------------------------------

/// Consecutive failures after which a DoH server stops counting as
/// available in automatic mode.
pub const AUTOMATIC_MODE_FAILURE_LIMIT: u32 = 10;

/// Failure streak beyond which server selection only picks a server if
/// nothing better is left.
pub const SELECTION_FAILURE_LIMIT: u32 = AUTOMATIC_MODE_FAILURE_LIMIT;

/// The floor for any fallback period, in case the path to the server
/// is a local proxy answering near-instantly.
pub const MIN_FALLBACK_PERIOD: Duration = Duration::from_millis(10);

/// The ceiling for any fallback period.
pub const MAX_FALLBACK_PERIOD: Duration = Duration::from_secs(5);

/// The floor for a whole transaction's deadline.
pub const MIN_TRANSACTION_TIMEOUT: Duration = Duration::from_secs(12);

/// The multiplier from a fallback period to a transaction deadline.
pub const TRANSACTION_TIMEOUT_MULTIPLIER: f64 = 7.5;

/// The percentile of the RTT histogram a fallback period is based on.
const RTT_PERCENTILE: f64 = 99.0;

//------------ RttHistogram --------------------------------------------------

/// A histogram of round-trip time samples.
///
/// Samples land in geometrically growing buckets from one millisecond
/// up; the percentile query returns the lower bound of the bucket in
/// which the requested rank falls. Memory use is constant no matter
/// how many samples a long-lived session accumulates.
#[derive(Clone, Debug)]
pub struct RttHistogram {
    /// The per-bucket sample counts.
    buckets: [u32; Self::BUCKET_COUNT],

    /// The total number of samples.
    total: u64,
}

impl RttHistogram {
    /// The number of buckets.
    const BUCKET_COUNT: usize = 64;

    /// The growth factor between bucket bounds.
    const GROWTH: f64 = 1.2;

    /// Creates an empty histogram.
    pub fn new() -> Self {
        RttHistogram {
            buckets: [0; Self::BUCKET_COUNT],
            total: 0,
        }
    }

    /// Adds one sample.
    pub fn add(&mut self, sample: Duration) {
        self.buckets[Self::bucket_for(sample)] += 1;
        self.total += 1;
    }

    /// Returns the value at the given percentile.
    ///
    /// An empty histogram reports zero.
    pub fn percentile(&self, percentile: f64) -> Duration {
        if self.total == 0 {
            return Duration::ZERO;
        }
        let rank =
            (self.total as f64 * percentile / 100.0).ceil() as u64;
        let rank = rank.clamp(1, self.total);
        let mut seen = 0u64;
        for (index, &count) in self.buckets.iter().enumerate() {
            seen += u64::from(count);
            if seen >= rank {
                return Self::lower_bound(index);
            }
        }
        Self::lower_bound(Self::BUCKET_COUNT - 1)
    }

    /// Returns the bucket a sample falls into.
    fn bucket_for(sample: Duration) -> usize {
        let ms = sample.as_secs_f64() * 1000.0;
        if ms <= 1.0 {
            return 0;
        }
        let index = (ms.ln() / Self::GROWTH.ln()).floor() as usize + 1;
        index.min(Self::BUCKET_COUNT - 1)
    }

    /// Returns the lower bound of a bucket.
    fn lower_bound(index: usize) -> Duration {
        if index == 0 {
            return Duration::ZERO;
        }
        let ms = Self::GROWTH.powi(index as i32 - 1);
        Duration::from_secs_f64(ms / 1000.0)
    }
}

impl Default for RttHistogram {
    fn default() -> Self {
        Self::new()
    }
}

//------------ ServerStats ---------------------------------------------------

/// The health record of one server within one session.
#[derive(Clone, Debug)]
pub struct ServerStats {
    /// The current streak of consecutive failures.
    pub consecutive_failures: u32,

    /// When the server last failed.
    pub last_failure: Option<Instant>,

    /// When the server last succeeded.
    pub last_success: Option<Instant>,

    /// Whether the server succeeded at least once in this session.
    pub current_connection_success: bool,

    /// Observed round-trip times.
    pub rtt_histogram: RttHistogram,
}

impl ServerStats {
    /// Creates stats seeded for the configured initial timeout.
    ///
    /// The histogram starts with two synthetic samples at the initial
    /// fallback period so early percentile queries land there instead
    /// of at zero.
    pub fn new(initial_fallback_period: Duration) -> Self {
        let mut rtt_histogram = RttHistogram::new();
        rtt_histogram.add(initial_fallback_period);
        rtt_histogram.add(initial_fallback_period);
        ServerStats {
            consecutive_failures: 0,
            last_failure: None,
            last_success: None,
            current_connection_success: false,
            rtt_histogram,
        }
    }

    /// Records a transport or protocol failure.
    ///
    /// Never called for a negative answer; those are successes.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.last_failure = Some(Instant::now());
    }

    /// Records a successful exchange.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_success = Some(Instant::now());
        self.current_connection_success = true;
    }

    /// Records an observed round-trip time.
    pub fn record_rtt(&mut self, elapsed: Duration) {
        // A Duration cannot go negative; callers measuring with a
        // saturating subtraction already clamp at zero.
        self.rtt_histogram.add(elapsed);
    }

    /// Returns the base fallback period before retry doubling.
    pub fn base_fallback_period(
        &self,
        initial_fallback_period: Duration,
    ) -> Duration {
        let mut period = self.rtt_histogram.percentile(RTT_PERCENTILE);
        if period > MAX_FALLBACK_PERIOD {
            period = initial_fallback_period;
        }
        period.max(MIN_FALLBACK_PERIOD)
    }

    /// Returns the fallback period for the next attempt.
    ///
    /// `backoffs` counts the attempts already made at this server in
    /// this transaction's round-robin; each doubles the period, capped
    /// at the maximum.
    pub fn next_fallback_period(
        &self,
        initial_fallback_period: Duration,
        backoffs: u32,
    ) -> Duration {
        let period = self.base_fallback_period(initial_fallback_period);
        let factor = 1u32 << backoffs.min(16);
        (period * factor).min(MAX_FALLBACK_PERIOD)
    }

    /// Returns whether the server counts as available for automatic
    /// mode: not in a deep failure streak and proven at least once.
    pub fn is_available(&self) -> bool {
        self.consecutive_failures < AUTOMATIC_MODE_FAILURE_LIMIT
            && self.current_connection_success
    }
}

//------------ transaction_timeout -------------------------------------------

/// Computes the overall deadline for a transaction.
///
/// The deadline scales with the fastest server's fallback period but
/// never drops below the fixed minimum, so a transaction outlives
/// several rounds of attempts.
pub fn transaction_timeout(
    base_fallback_periods: impl Iterator<Item = Duration>,
) -> Duration {
    let fastest = base_fallback_periods.min();
    let Some(fastest) = fastest else {
        return MIN_TRANSACTION_TIMEOUT;
    };
    let scaled = fastest.mul_f64(TRANSACTION_TIMEOUT_MULTIPLIER);
    scaled.max(MIN_TRANSACTION_TIMEOUT)
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    const INITIAL: Duration = Duration::from_secs(1);

    #[test]
    fn histogram_percentiles() {
        let mut hist = RttHistogram::new();
        assert_eq!(hist.percentile(99.0), Duration::ZERO);

        for _ in 0..99 {
            hist.add(Duration::from_millis(10));
        }
        hist.add(Duration::from_millis(5000));

        let p50 = hist.percentile(50.0);
        assert!(p50 < Duration::from_millis(20), "{:?}", p50);
        let p99 = hist.percentile(99.0);
        assert!(p99 < Duration::from_millis(20), "{:?}", p99);
        let p100 = hist.percentile(100.0);
        assert!(p100 >= Duration::from_millis(3000), "{:?}", p100);
    }

    #[test]
    fn seeded_stats_fall_back_near_initial_period() {
        let stats = ServerStats::new(INITIAL);
        let base = stats.base_fallback_period(INITIAL);
        assert!(base >= Duration::from_millis(800), "{:?}", base);
        assert!(base <= Duration::from_millis(1300), "{:?}", base);
    }

    #[test]
    fn fast_server_shrinks_its_fallback_period() {
        let mut stats = ServerStats::new(Duration::from_millis(20));
        for _ in 0..200 {
            stats.record_rtt(Duration::from_millis(2));
        }
        let base = stats.base_fallback_period(INITIAL);
        assert!(base < Duration::from_millis(25), "{:?}", base);
        assert!(base >= MIN_FALLBACK_PERIOD);
    }

    #[test]
    fn slow_histogram_falls_back_to_initial() {
        let mut stats = ServerStats::new(INITIAL);
        for _ in 0..100 {
            stats.record_rtt(Duration::from_secs(30));
        }
        // The percentile exceeds the cap, so the configured initial
        // period wins.
        let base = stats.base_fallback_period(Duration::from_millis(700));
        assert!(base <= Duration::from_millis(700));
    }

    #[test]
    fn fallback_period_is_monotonic_and_capped() {
        let stats = ServerStats::new(INITIAL);
        let mut last = Duration::ZERO;
        for backoffs in 0..10 {
            let period = stats.next_fallback_period(INITIAL, backoffs);
            assert!(period >= last);
            assert!(period <= MAX_FALLBACK_PERIOD);
            last = period;
        }
        assert_eq!(last, MAX_FALLBACK_PERIOD);
    }

    #[test]
    fn failure_and_success_bookkeeping() {
        let mut stats = ServerStats::new(INITIAL);
        assert!(!stats.is_available());

        stats.record_success();
        assert!(stats.is_available());
        assert_eq!(stats.consecutive_failures, 0);

        for _ in 0..AUTOMATIC_MODE_FAILURE_LIMIT {
            stats.record_failure();
        }
        assert!(!stats.is_available());
        assert!(stats.last_failure.is_some());

        stats.record_success();
        assert!(stats.is_available());
    }

    #[test]
    fn transaction_timeout_floors_and_scales() {
        assert_eq!(
            transaction_timeout([Duration::from_millis(100)].into_iter()),
            MIN_TRANSACTION_TIMEOUT
        );
        let long = transaction_timeout(
            [Duration::from_secs(4), Duration::from_secs(2)].into_iter(),
        );
        assert_eq!(long, Duration::from_secs(15));
        assert_eq!(
            transaction_timeout(std::iter::empty::<Duration>()),
            MIN_TRANSACTION_TIMEOUT
        );
    }
}
