//! The resolver session.
//!
//! A [`Session`] is an immutable snapshot of the effective
//! configuration plus the mutable health statistics of every server in
//! it. The client owns the current session behind an `Arc` and swaps
//! in a fresh one whenever the configuration changes, which resets all
//! statistics wholesale; transactions keep the session they were
//! created against alive, so a swap never affects work in flight.
//! Whether a statistics update went to a superseded session is decided
//! purely by `Arc` identity, never by comparing contents.

#![warn(missing_docs)]

use super::conf::DnsConfig;
use super::stats::{transaction_timeout, ServerStats};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;

//------------ Session -------------------------------------------------------

/// One configuration generation and its server health state.
#[derive(Debug)]
pub struct Session {
    /// The effective configuration this session serves.
    config: DnsConfig,

    /// Health statistics for each classic server.
    classic_stats: Vec<Mutex<ServerStats>>,

    /// Health statistics for each DoH server.
    doh_stats: Vec<Mutex<ServerStats>>,

    /// The rotation counter for the first classic server.
    ///
    /// Grows without bound and is used modulo the server count; the
    /// wrap at the end of the range causes one odd rotation step and
    /// is accepted for the simpler code.
    first_server: AtomicUsize,
}

impl Session {
    /// Creates a session for an effective configuration.
    pub fn new(config: DnsConfig) -> Self {
        let fallback = config.fallback_period;
        let doh_fallback =
            config.doh_fallback_period.unwrap_or(fallback);
        let classic_stats = config
            .nameservers
            .iter()
            .map(|_| Mutex::new(ServerStats::new(fallback)))
            .collect();
        let doh_stats = config
            .doh_servers
            .iter()
            .map(|_| Mutex::new(ServerStats::new(doh_fallback)))
            .collect();
        Session {
            config,
            classic_stats,
            doh_stats,
            first_server: AtomicUsize::new(0),
        }
    }

    /// Returns the configuration of the session.
    pub fn config(&self) -> &DnsConfig {
        &self.config
    }

    /// Returns a fresh random query id.
    pub fn next_query_id(&self) -> u16 {
        rand::thread_rng().gen()
    }

    /// Returns the first classic server index for a new transaction.
    ///
    /// With rotation enabled every transaction starts one server
    /// further along the list.
    pub(crate) fn next_first_server_index(&self) -> usize {
        if self.config.nameservers.is_empty() {
            return 0;
        }
        if self.config.rotate {
            self.first_server.fetch_add(1, Ordering::Relaxed)
                % self.config.nameservers.len()
        } else {
            0
        }
    }

    /// Runs a closure against one server's statistics.
    pub(crate) fn with_stats<R>(
        &self,
        server_index: usize,
        is_doh: bool,
        op: impl FnOnce(&mut ServerStats) -> R,
    ) -> R {
        let list = if is_doh {
            &self.doh_stats
        } else {
            &self.classic_stats
        };
        op(&mut list[server_index].lock())
    }

    /// Records a transport or protocol failure of a server.
    pub fn record_failure(&self, server_index: usize, is_doh: bool) {
        self.with_stats(server_index, is_doh, |stats| {
            stats.record_failure()
        });
    }

    /// Records a successful exchange with a server.
    ///
    /// Negative answers count here too: a server authoritatively
    /// reporting that a name does not exist did its job.
    pub fn record_success(&self, server_index: usize, is_doh: bool) {
        self.with_stats(server_index, is_doh, |stats| {
            stats.record_success()
        });
    }

    /// Records an observed round-trip time against a server.
    pub fn record_rtt(
        &self,
        server_index: usize,
        is_doh: bool,
        elapsed: Duration,
    ) {
        self.with_stats(server_index, is_doh, |stats| {
            stats.record_rtt(elapsed)
        });
    }

    /// Returns the fallback period for a classic attempt.
    ///
    /// `attempt_count` is the number of attempts the transaction made
    /// so far; a full round over all servers doubles the period.
    pub fn next_classic_fallback_period(
        &self,
        server_index: usize,
        attempt_count: usize,
    ) -> Duration {
        let backoffs =
            (attempt_count / self.config.nameservers.len().max(1)) as u32;
        self.with_stats(server_index, false, |stats| {
            stats.next_fallback_period(
                self.config.fallback_period,
                backoffs,
            )
        })
    }

    /// Returns the initial fallback period for one connection type.
    fn initial_fallback_period(&self, is_doh: bool) -> Duration {
        if is_doh {
            self.config
                .doh_fallback_period
                .unwrap_or(self.config.fallback_period)
        } else {
            self.config.fallback_period
        }
    }

    /// Returns the fallback period for a DoH attempt.
    pub fn next_doh_fallback_period(
        &self,
        server_index: usize,
    ) -> Duration {
        let initial = self.initial_fallback_period(true);
        self.with_stats(server_index, true, |stats| {
            stats.next_fallback_period(initial, 0)
        })
    }

    /// Returns the overall deadline for a classic transaction.
    pub fn classic_transaction_timeout(&self) -> Duration {
        transaction_timeout(self.classic_stats.iter().map(|stats| {
            stats.lock().base_fallback_period(self.config.fallback_period)
        }))
    }

    /// Returns the overall deadline for a secure transaction.
    pub fn secure_transaction_timeout(&self) -> Duration {
        let initial = self.initial_fallback_period(true);
        transaction_timeout(
            self.doh_stats
                .iter()
                .map(|stats| stats.lock().base_fallback_period(initial)),
        )
    }

    /// Returns whether a DoH server counts as available.
    pub fn doh_server_available(&self, server_index: usize) -> bool {
        self.with_stats(server_index, true, |stats| stats.is_available())
    }

    /// Returns how many DoH servers currently count as available.
    pub fn num_available_doh_servers(&self) -> usize {
        (0..self.doh_stats.len())
            .filter(|&index| self.doh_server_available(index))
            .count()
    }

    /// Returns when a server last failed.
    pub fn last_failure(
        &self,
        server_index: usize,
        is_doh: bool,
    ) -> Option<Instant> {
        self.with_stats(server_index, is_doh, |stats| stats.last_failure)
    }

    /// Returns a server's current failure streak.
    pub fn consecutive_failures(
        &self,
        server_index: usize,
        is_doh: bool,
    ) -> u32 {
        self.with_stats(server_index, is_doh, |stats| {
            stats.consecutive_failures
        })
    }
}

//============ Testing =======================================================
