//! The per-query transaction engine.
//!
//! A [`Transaction`] resolves one `(hostname, qtype)` pair against the
//! servers of its session. It builds the suffix search list, then
//! works through the candidate names; for each name it drives one or
//! more transport attempts, choosing servers through
//! [`ServerIter`], pacing them with fallback-period timers fed by the
//! session's health statistics, upgrading from UDP to TCP on
//! truncation, and recording every outcome back into the session.
//!
//! The engine owns all timers. An attempt whose fallback period ran
//! out keeps running in the background while the next attempt starts;
//! at most the two most recently started attempts stay outstanding.
//! Dropping the transaction synchronously cancels every in-flight
//! attempt and no completion is delivered afterwards.

#![warn(missing_docs)]

use super::conf::{DnsConfig, SecureDnsMode};
use super::servers::ServerIter;
use super::session::Session;
use super::stats::MIN_FALLBACK_PERIOD;
use crate::base::iana::Rtype;
use crate::base::name::{count_labels, encode_name, join_suffix};
use crate::base::query::{PaddingStrategy, DOH_PADDING_BLOCK};
use crate::base::{OptRecord, Query, Response};
use crate::client::protocol::{
    DgramConnector, HttpsTransport, StreamConnector,
};
use crate::client::{https, tcp, udp, AttemptOutcome, Error};
use smallvec::SmallVec;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

//------------ Connectors ----------------------------------------------------

/// The injected transport capabilities of a transaction.
#[derive(Clone, Debug)]
pub struct Connectors<D, S, H> {
    /// Creates UDP sockets.
    pub dgram: D,

    /// Creates TCP streams.
    pub stream: S,

    /// Performs HTTPS exchanges.
    pub https: H,
}

//------------ Transaction ---------------------------------------------------

/// One in-flight resolution of a hostname and record type.
pub struct Transaction<D, S, H> {
    /// The session supplying configuration and health state.
    session: Arc<Session>,

    /// The transports to reach servers through.
    connectors: Connectors<D, S, H>,

    /// The hostname being resolved.
    hostname: String,

    /// The record type being resolved.
    qtype: Rtype,

    /// Extra EDNS options for the queries.
    opt: Option<OptRecord>,

    /// Resolve over DoH instead of classic DNS.
    secure: bool,

    /// The secure DNS policy governing DoH server selection.
    mode: SecureDnsMode,

    /// Give up when the last fallback period expires instead of
    /// waiting out the overall transaction deadline.
    fast_timeout: bool,
}

impl<D, S, H> Transaction<D, S, H>
where
    D: DgramConnector + Clone + Send + Sync + 'static,
    D::Socket: 'static,
    S: StreamConnector + Clone + Send + Sync + 'static,
    S::Stream: 'static,
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    /// Creates a transaction against a session.
    pub(super) fn new(
        session: Arc<Session>,
        connectors: Connectors<D, S, H>,
        hostname: String,
        qtype: Rtype,
        opt: Option<OptRecord>,
        secure: bool,
        fast_timeout: bool,
    ) -> Self {
        let mode = session.config().secure_dns_mode;
        Transaction {
            session,
            connectors,
            hostname,
            qtype,
            opt,
            secure,
            mode,
            fast_timeout,
        }
    }

    /// Runs the transaction to its terminal result.
    ///
    /// Exactly one `(result, response)` pair comes back: `Ok` with the
    /// validated answer, or an error with the last response when one
    /// exists (a negative answer always carries its response). The
    /// future is cancel-safe in the destructive sense — dropping it
    /// cancels all network effort without any callback.
    pub async fn run(self) -> (Result<(), Error>, Option<Response>) {
        let started = Instant::now();
        debug!(
            hostname = %self.hostname,
            qtype = %self.qtype,
            secure = self.secure,
            "transaction start"
        );

        let qnames =
            match prepare_search(&self.hostname, self.session.config()) {
                Ok(qnames) => qnames,
                Err(err) => return (Err(err), None),
            };

        let mut negative: Option<Response> = None;
        for (position, qname) in qnames.iter().enumerate() {
            let mut query = NameQuery {
                session: &self.session,
                connectors: &self.connectors,
                qname,
                qtype: self.qtype,
                opt: self.opt.as_ref(),
                secure: self.secure,
                fast_timeout: self.fast_timeout,
                transaction_started: started,
                iter: self.server_iter(),
                set: JoinSet::new(),
                meta: Vec::new(),
                first_query: None,
                had_tcp_retry: false,
                timer: TimerState::Idle,
            };
            match query.run().await {
                NameOutcome::Terminal(result, response) => {
                    debug!(
                        hostname = %self.hostname,
                        ok = result.is_ok(),
                        "transaction end"
                    );
                    return (result, response);
                }
                NameOutcome::NegativeAnswer(response) => {
                    trace!(
                        candidate = position,
                        "name not found, advancing search list"
                    );
                    negative = response;
                }
            }
        }

        debug!(hostname = %self.hostname, "transaction end: NXDOMAIN");
        (Err(Error::NameNotFound), negative)
    }

    /// Creates the server iterator for one candidate name.
    fn server_iter(&self) -> ServerIter {
        if self.secure {
            ServerIter::doh(self.session.clone(), self.mode)
        } else {
            ServerIter::classic(self.session.clone())
        }
    }
}

//------------ NameQuery -----------------------------------------------------

/// How a single candidate name concluded.
enum NameOutcome {
    /// The transaction is over with this result.
    Terminal(Result<(), Error>, Option<Response>),

    /// The name does not exist; the search list continues.
    NegativeAnswer(Option<Response>),
}

/// The timer slot of a query. There is only ever one timer.
enum TimerState {
    /// No timer armed; only before the first attempt started.
    Idle,

    /// The per-attempt fallback period of the latest attempt.
    Fallback {
        /// When the period ends.
        deadline: Instant,
    },

    /// The overall transaction deadline.
    Deadline {
        /// When the transaction ends.
        deadline: Instant,
    },
}

/// Metadata of one started attempt.
struct AttemptMeta {
    /// The index of the server attempted.
    server_index: usize,

    /// Whether a completed exchange feeds the RTT histogram. TCP
    /// upgrades do not; their timing says little about the server.
    records_rtt: bool,

    /// When the attempt started.
    started: Instant,

    /// Cancels the attempt task.
    abort: AbortHandle,

    /// Whether the attempt is still outstanding.
    pending: bool,
}

/// The attempt-driving state for one candidate name.
struct NameQuery<'a, D, S, H> {
    /// The session supplying configuration and health state.
    session: &'a Arc<Session>,

    /// The transports to reach servers through.
    connectors: &'a Connectors<D, S, H>,

    /// The encoded candidate name.
    qname: &'a [u8],

    /// The record type being resolved.
    qtype: Rtype,

    /// Extra EDNS options for the queries.
    opt: Option<&'a OptRecord>,

    /// Resolve over DoH instead of classic DNS.
    secure: bool,

    /// Give up at the last fallback period's end.
    fast_timeout: bool,

    /// When the whole transaction started.
    transaction_started: Instant,

    /// Selects the server of each attempt.
    iter: ServerIter,

    /// The running attempt tasks. Dropping the set aborts them.
    set: JoinSet<(usize, AttemptOutcome)>,

    /// One entry per started attempt, in start order.
    meta: Vec<AttemptMeta>,

    /// The first query of this name; later attempts clone it under a
    /// fresh id.
    first_query: Option<Query>,

    /// A truncated UDP answer may upgrade to TCP exactly once.
    had_tcp_retry: bool,

    /// The single timer slot.
    timer: TimerState,
}

impl<'a, D, S, H> NameQuery<'a, D, S, H>
where
    D: DgramConnector + Clone + Send + Sync + 'static,
    D::Socket: 'static,
    S: StreamConnector + Clone + Send + Sync + 'static,
    S::Stream: 'static,
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    /// Drives attempts for this name until something is terminal.
    async fn run(&mut self) -> NameOutcome {
        if !self.iter.attempt_available() {
            // Policy exhaustion, not a transient condition: there is
            // no server this query may even try.
            return NameOutcome::Terminal(
                Err(Error::NoEligibleServer),
                None,
            );
        }
        if let Some(outcome) = self.start_attempt() {
            return outcome;
        }

        loop {
            let deadline = match self.timer {
                TimerState::Fallback { deadline }
                | TimerState::Deadline { deadline } => deadline,
                // Unreachable once an attempt started; park the timer
                // branch far away rather than panicking.
                TimerState::Idle => {
                    Instant::now() + Duration::from_secs(3600)
                }
            };

            let have_attempts = !self.set.is_empty();
            tokio::select! {
                joined = self.set.join_next(), if have_attempts => {
                    let (number, outcome) = match joined {
                        Some(Ok(done)) => done,
                        // Cancelled attempts just disappear.
                        _ => continue,
                    };
                    if let Some(outcome) =
                        self.on_attempt_complete(number, outcome)
                    {
                        return outcome;
                    }
                }
                _ = sleep_until(deadline) => {
                    if let Some(outcome) = self.on_timer_fired() {
                        return outcome;
                    }
                }
            }
        }
    }

    /// Handles the completion of an attempt.
    ///
    /// Returns `Some` when the name (and with it the transaction) is
    /// finished.
    fn on_attempt_complete(
        &mut self,
        number: usize,
        outcome: AttemptOutcome,
    ) -> Option<NameOutcome> {
        self.meta[number].pending = false;
        let server_index = self.meta[number].server_index;
        let AttemptOutcome { result, response } = outcome;

        // Round-trip times are informative regardless of recency,
        // but only when an actual response arrived.
        if self.meta[number].records_rtt && response.is_some() {
            self.session.record_rtt(
                server_index,
                self.secure,
                self.meta[number].started.elapsed(),
            );
        }

        match result {
            Ok(()) => {
                self.session.record_success(server_index, self.secure);
                Some(NameOutcome::Terminal(Ok(()), response))
            }
            Err(Error::NameNotFound) => {
                // An authoritative negative answer is a healthy
                // server, never a failure.
                self.session.record_success(server_index, self.secure);
                Some(NameOutcome::NegativeAnswer(response))
            }
            Err(Error::ServerRequiresTcp)
                if !self.secure && !self.had_tcp_retry =>
            {
                self.retry_as_tcp(number)
            }
            Err(err) => self.on_attempt_failure(number, err, response),
        }
    }

    /// Handles a failed attempt.
    fn on_attempt_failure(
        &mut self,
        number: usize,
        err: Error,
        response: Option<Response>,
    ) -> Option<NameOutcome> {
        let most_recent = number + 1 == self.meta.len();
        if most_recent {
            // A failure of a superseded attempt was already recorded
            // when its fallback period ran out; only the latest
            // attempt's failure is news.
            self.timer = TimerState::Idle;
            self.session
                .record_failure(self.meta[number].server_index, self.secure);
            trace!(
                attempt = number,
                error = %err,
                "attempt failed"
            );

            if self.more_attempts_allowed() {
                return self.start_attempt();
            }
            if self.fast_timeout {
                return Some(NameOutcome::Terminal(Err(err), response));
            }
            if let Some(outcome) = self.start_deadline_timer() {
                return Some(outcome);
            }
        }

        if self.any_pending() {
            None
        } else {
            Some(NameOutcome::Terminal(Err(err), response))
        }
    }

    /// Handles the expiry of the armed timer.
    fn on_timer_fired(&mut self) -> Option<NameOutcome> {
        match self.timer {
            TimerState::Fallback { .. } => {
                // The latest attempt used up its fallback period. It
                // stays in flight, but it counts as failed for server
                // health and the engine moves on.
                self.timer = TimerState::Idle;
                let last = self.meta.len() - 1;
                self.session.record_failure(
                    self.meta[last].server_index,
                    self.secure,
                );
                trace!(attempt = last, "fallback period expired");

                if self.more_attempts_allowed() {
                    // Overlap window: the expired attempt may finish
                    // late, anything older is cancelled now.
                    self.abort_pending_except(Some(last));
                    return self.start_attempt();
                }
                if !self.fast_timeout && self.any_pending() {
                    if let Some(outcome) = self.start_deadline_timer() {
                        return Some(outcome);
                    }
                    return None;
                }
                Some(NameOutcome::Terminal(Err(Error::Timeout), None))
            }
            TimerState::Deadline { .. } => {
                Some(NameOutcome::Terminal(Err(Error::Timeout), None))
            }
            TimerState::Idle => None,
        }
    }

    /// Replaces the truncated UDP attempt with one TCP attempt.
    ///
    /// All other in-flight attempts are cancelled; the query is resent
    /// with a fresh id to the same server; the new fallback period is
    /// double what remained of the expired one.
    fn retry_as_tcp(&mut self, number: usize) -> Option<NameOutcome> {
        self.had_tcp_retry = true;
        let server_index = self.meta[number].server_index;
        let remaining = match self.timer {
            TimerState::Fallback { deadline } => deadline
                .saturating_duration_since(Instant::now())
                .max(MIN_FALLBACK_PERIOD),
            _ => MIN_FALLBACK_PERIOD,
        };
        self.abort_pending_except(None);

        let id = self.session.next_query_id();
        let query = self
            .first_query
            .as_ref()
            .expect("a UDP attempt ran before the upgrade")
            .clone_with_new_id(id);
        trace!(server = server_index, "upgrading to TCP");

        let number = self.meta.len();
        let started = Instant::now();
        let stream = self.connectors.stream.clone();
        let addr = self.session.config().nameservers[server_index];
        let abort = self.set.spawn(async move {
            (number, tcp::exchange(&stream, addr, &query).await)
        });
        self.meta.push(AttemptMeta {
            server_index,
            records_rtt: false,
            started,
            abort,
            pending: true,
        });
        self.timer = TimerState::Fallback {
            deadline: started + remaining * 2,
        };
        None
    }

    /// Starts the next attempt against the next eligible server.
    ///
    /// Returns `Some` only when selection has nothing to offer, which
    /// is terminal.
    fn start_attempt(&mut self) -> Option<NameOutcome> {
        let Some(server_index) = self.iter.next_attempt_index() else {
            return Some(NameOutcome::Terminal(
                Err(Error::NoEligibleServer),
                None,
            ));
        };

        let id = self.session.next_query_id();
        let query = match &self.first_query {
            None => {
                let padding = if self.secure {
                    PaddingStrategy::BlockLength(DOH_PADDING_BLOCK)
                } else {
                    PaddingStrategy::None
                };
                let query = Query::from_wire_name(
                    id, self.qname, self.qtype, self.opt, padding,
                );
                self.first_query = Some(query.clone());
                query
            }
            Some(first) => first.clone_with_new_id(id),
        };

        let number = self.meta.len();
        let started = Instant::now();
        let abort = if self.secure {
            let https = self.connectors.https.clone();
            let server =
                self.session.config().doh_servers[server_index].clone();
            self.set.spawn(async move {
                let outcome = https::exchange(
                    &https,
                    &server.template,
                    server.use_post,
                    &query,
                )
                .await;
                (number, outcome)
            })
        } else {
            let dgram = self.connectors.dgram.clone();
            let addr = self.session.config().nameservers[server_index];
            self.set.spawn(async move {
                (number, udp::exchange(&dgram, addr, &query).await)
            })
        };

        let period = if self.secure {
            self.session.next_doh_fallback_period(server_index)
        } else {
            self.session
                .next_classic_fallback_period(server_index, number)
        };
        trace!(
            attempt = number,
            server = server_index,
            fallback_ms = period.as_millis() as u64,
            "attempt start"
        );
        self.meta.push(AttemptMeta {
            server_index,
            records_rtt: true,
            started,
            abort,
            pending: true,
        });
        self.timer = TimerState::Fallback {
            deadline: started + period,
        };
        None
    }

    /// Arms the overall transaction deadline.
    ///
    /// Returns `Some(Timeout)` when the deadline already passed.
    fn start_deadline_timer(&mut self) -> Option<NameOutcome> {
        let total = if self.secure {
            self.session.secure_transaction_timeout()
        } else {
            self.session.classic_transaction_timeout()
        };
        let deadline = self.transaction_started + total;
        if deadline <= Instant::now() {
            return Some(NameOutcome::Terminal(
                Err(Error::Timeout),
                None,
            ));
        }
        self.timer = TimerState::Deadline { deadline };
        None
    }

    /// Returns whether another attempt may start for this name.
    fn more_attempts_allowed(&self) -> bool {
        !self.had_tcp_retry && self.iter.attempt_available()
    }

    /// Returns whether any attempt is still outstanding.
    fn any_pending(&self) -> bool {
        self.meta.iter().any(|meta| meta.pending)
    }

    /// Cancels every outstanding attempt except the given one.
    fn abort_pending_except(&mut self, keep: Option<usize>) {
        for (number, meta) in self.meta.iter_mut().enumerate() {
            if meta.pending && Some(number) != keep {
                meta.abort.abort();
                meta.pending = false;
            }
        }
    }
}

//------------ prepare_search ------------------------------------------------

/// The list of encoded candidate names for one transaction.
pub(super) type SearchList = SmallVec<[Vec<u8>; 5]>;

/// Builds the suffix search list for a hostname.
///
/// A name ending in a dot is fully qualified and searched literally,
/// as is a multi-label name when the configuration keeps suffixes off
/// such names. Otherwise the literal name goes first once it carries
/// at least `ndots` dots, the suffix expansions follow, and the
/// literal name closes the list if it was not already on it.
///
/// One quirk is deliberately preserved from long-standing resolver
/// behavior: a suffix expansion is dropped when its *encoded length*
/// equals the literal name's encoded length and the literal name is
/// already queued — the comparison is by length, not by content.
pub(super) fn prepare_search(
    hostname: &str,
    config: &DnsConfig,
) -> Result<SearchList, Error> {
    let labeled =
        encode_name(hostname).map_err(|_| Error::InvalidName)?;

    let mut qnames = SearchList::new();
    if hostname.ends_with('.') {
        qnames.push(labeled);
        return Ok(qnames);
    }

    let ndots = count_labels(&labeled).saturating_sub(1);
    if ndots > 0 && !config.append_to_multi_label_name {
        qnames.push(labeled);
        return Ok(qnames);
    }

    let mut had_qname = false;
    if ndots >= config.ndots {
        qnames.push(labeled.clone());
        had_qname = true;
    }

    for suffix in &config.search {
        let joined = join_suffix(hostname, suffix);
        // Expansions that do not encode (too long) are skipped.
        let Ok(qname) = encode_name(&joined) else {
            continue;
        };
        if qname.len() == labeled.len() {
            if had_qname {
                continue;
            }
            had_qname = true;
        }
        qnames.push(qname);
    }

    if ndots > 0 && !had_qname {
        qnames.push(labeled);
    }

    if qnames.is_empty() {
        Err(Error::SearchListEmpty)
    } else {
        Ok(qnames)
    }
}

//============ Testing =======================================================
