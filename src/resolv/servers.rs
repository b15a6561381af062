//! Choosing the server for the next attempt.
//!
//! Every transaction carries its own [`ServerIter`]: a cursor over the
//! session's server list that remembers how often each server was
//! already handed out for this transaction. Classic DNS and DoH share
//! the algorithm; DoH in automatic mode additionally skips servers that
//! have not proven themselves available.

#![warn(missing_docs)]

use super::conf::SecureDnsMode;
use super::session::Session;
use super::stats::SELECTION_FAILURE_LIMIT;
use std::sync::Arc;

//------------ ServerIter ----------------------------------------------------

/// The per-transaction server selection state.
#[derive(Debug)]
pub struct ServerIter {
    /// The session whose servers are iterated.
    session: Arc<Session>,

    /// Whether DoH servers are iterated instead of classic ones.
    is_doh: bool,

    /// Whether unavailable servers are skipped.
    require_available: bool,

    /// How often each server was returned for this transaction.
    times_returned: Vec<usize>,

    /// How often one server may be returned.
    max_times: usize,

    /// Where the next forward scan starts.
    cursor: usize,
}

impl ServerIter {
    /// Creates the iterator for a classic transaction.
    ///
    /// The scan starts at the session's rotating first index.
    pub fn classic(session: Arc<Session>) -> Self {
        let cursor = session.next_first_server_index();
        let len = session.config().nameservers.len();
        let max_times = session.config().attempts;
        ServerIter {
            session,
            is_doh: false,
            require_available: false,
            times_returned: vec![0; len],
            max_times,
            cursor,
        }
    }

    /// Creates the iterator for a secure transaction.
    ///
    /// Automatic mode gates on availability; strict secure mode tries
    /// every configured server.
    pub fn doh(session: Arc<Session>, mode: SecureDnsMode) -> Self {
        let len = session.config().doh_servers.len();
        let max_times = session.config().doh_attempts;
        ServerIter {
            session,
            is_doh: true,
            require_available: mode == SecureDnsMode::Automatic,
            times_returned: vec![0; len],
            max_times,
            cursor: 0,
        }
    }

    /// Returns whether a server remains eligible for one more attempt.
    ///
    /// This is the sole precondition of
    /// [`next_attempt_index`][Self::next_attempt_index].
    pub fn attempt_available(&self) -> bool {
        (0..self.times_returned.len()).any(|index| self.eligible(index))
    }

    /// Returns the next server to attempt.
    ///
    /// Scans forward from the cursor in stable wrap-around order. The
    /// first eligible server under the failure limit wins; if every
    /// eligible server sits at or above the limit, the one whose last
    /// failure lies furthest back is chosen instead.
    pub fn next_attempt_index(&mut self) -> Option<usize> {
        let len = self.times_returned.len();
        let mut fallback: Option<usize> = None;

        let mut chosen = None;
        for offset in 0..len {
            let index = (self.cursor + offset) % len;
            if !self.eligible(index) {
                continue;
            }
            if self.session.consecutive_failures(index, self.is_doh)
                < SELECTION_FAILURE_LIMIT
            {
                chosen = Some(index);
                break;
            }
            // Everything here is deep in a failure streak; remember
            // the one that failed longest ago.
            let failed_at =
                self.session.last_failure(index, self.is_doh);
            let replace = match fallback {
                None => true,
                Some(current) => {
                    self.session.last_failure(current, self.is_doh)
                        > failed_at
                }
            };
            if replace {
                fallback = Some(index);
            }
        }

        let index = chosen.or(fallback)?;
        self.times_returned[index] += 1;
        self.cursor = (index + 1) % len;
        Some(index)
    }

    /// Returns whether a server may still be handed out.
    fn eligible(&self, index: usize) -> bool {
        if self.times_returned[index] >= self.max_times {
            return false;
        }
        if self.require_available
            && !self.session.doh_server_available(index)
        {
            return false;
        }
        true
    }
}

//============ Testing =======================================================
