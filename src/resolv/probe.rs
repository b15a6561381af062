//! Probing DNS over HTTPS servers for availability.
//!
//! A DoH server only counts as available in automatic mode once a
//! query against it succeeded. The probe runner supplies that first
//! success: it keeps sending a well-known query to every unavailable
//! server on an exponential backoff until the server answers with a
//! usable address record. Probing stops scheduling once a server
//! proved itself, but a probe already in flight is left to finish —
//! its result is still informative.
//!
//! The runner holds its session weakly. Replacing or dropping the
//! session ends every probe loop at its next step; dropping the runner
//! cancels the loops outright.

#![warn(missing_docs)]

use super::session::Session;
use crate::base::extract::extract_address_chain;
use crate::base::iana::Rtype;
use crate::base::name::encode_name;
use crate::base::query::{PaddingStrategy, DOH_PADDING_BLOCK};
use crate::base::Query;
use crate::client::protocol::HttpsTransport;
use crate::client::{https, AttemptOutcome};
use futures_util::stream::{FuturesUnordered, StreamExt};
use rand::Rng;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

//------------ Module Configuration ------------------------------------------

/// The name probed on every DoH server.
const PROBE_HOSTNAME: &str = "www.gstatic.com";

/// The record type probed.
const PROBE_QTYPE: Rtype = Rtype::A;

/// The delay before the first retry.
const INITIAL_DELAY: Duration = Duration::from_secs(1);

/// The growth factor between consecutive delays.
const BACKOFF_FACTOR: f64 = 1.5;

/// The fraction of each delay subject to downward jitter.
const JITTER: f64 = 0.2;

/// The ceiling on the delay between probes.
const MAX_DELAY: Duration = Duration::from_secs(60 * 60);

//------------ ProbeBackoff --------------------------------------------------

/// The retry schedule of one server's probe sequence.
///
/// Delays grow exponentially toward the cap and never expire; each
/// drawn delay is fuzzed down by up to twenty percent so a fleet of
/// clients does not probe in lockstep.
#[derive(Clone, Debug, Default)]
pub(crate) struct ProbeBackoff {
    /// How many probes were scheduled so far.
    failures: u32,
}

impl ProbeBackoff {
    /// Returns the delay until the next probe, advancing the schedule.
    pub(crate) fn next_delay(&mut self) -> Duration {
        let exponent = self.failures;
        self.failures = self.failures.saturating_add(1);
        let unjittered = INITIAL_DELAY
            .mul_f64(BACKOFF_FACTOR.powi(exponent.min(64) as i32))
            .min(MAX_DELAY);
        let fuzz = 1.0 - rand::thread_rng().gen_range(0.0..JITTER);
        unjittered.mul_f64(fuzz)
    }
}

//------------ DohProbeRunner ------------------------------------------------

/// The background prober for every DoH server of one session.
///
/// Dropping the runner cancels all probing.
pub struct DohProbeRunner<H> {
    /// The session being probed, held weakly.
    session: Weak<Session>,

    /// The HTTPS capability probes are sent through.
    https: H,

    /// The per-server probe loops.
    tasks: JoinSet<()>,

    /// Which servers already have a loop running.
    running: Vec<bool>,
}

impl<H> DohProbeRunner<H>
where
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    /// Creates a runner for a session.
    pub(super) fn new(session: &Arc<Session>, https: H) -> Self {
        let servers = session.config().doh_servers.len();
        DohProbeRunner {
            session: Arc::downgrade(session),
            https,
            tasks: JoinSet::new(),
            running: vec![false; servers],
        }
    }

    /// Starts a probe loop for every server that has none running.
    pub fn start(&mut self) {
        let Some(session) = self.session.upgrade() else {
            return;
        };
        for index in 0..session.config().doh_servers.len() {
            if self.running[index] {
                continue;
            }
            self.running[index] = true;
            let weak = self.session.clone();
            let https = self.https.clone();
            self.tasks.spawn(probe_loop(weak, https, index));
        }
    }
}

/// The probe loop of one server.
///
/// The next probe is scheduled before the current one completes —
/// probes against a dead server can take a long time to fail, and a
/// success cancels the sequence at the next scheduling point anyway.
async fn probe_loop<H>(session: Weak<Session>, https: H, server_index: usize)
where
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    let mut backoff = ProbeBackoff::default();
    let mut in_flight = FuturesUnordered::new();

    loop {
        {
            // The strong reference lives only as long as this block;
            // probes hold the session weakly so a replaced session is
            // not kept alive by its own probing.
            let Some(session) = session.upgrade() else {
                return;
            };
            if session.doh_server_available(server_index) {
                debug!(server = server_index, "DoH server available");
                break;
            }
            let server =
                session.config().doh_servers[server_index].clone();
            let query = Query::from_wire_name(
                session.next_query_id(),
                &probe_qname(),
                PROBE_QTYPE,
                None,
                PaddingStrategy::BlockLength(DOH_PADDING_BLOCK),
            );
            in_flight.push(send_probe(
                Arc::downgrade(&session),
                https.clone(),
                server,
                query,
                server_index,
            ));
        }

        // Wait out the backoff delay while the in-flight probes run.
        let deadline = Instant::now() + backoff.next_delay();
        loop {
            let probing = !in_flight.is_empty();
            tokio::select! {
                _ = sleep_until(deadline) => break,
                next = in_flight.next(), if probing => {
                    let _ = next;
                }
            }
        }
    }

    // Stop scheduling, but let what is in flight finish.
    while in_flight.next().await.is_some() {}
}

/// Returns the encoded probe name.
fn probe_qname() -> Vec<u8> {
    encode_name(PROBE_HOSTNAME).expect("the probe name encodes")
}

/// Sends one probe and records its result against the session.
async fn send_probe<H>(
    session: Weak<Session>,
    https: H,
    server: super::conf::DohServerConf,
    query: Query,
    server_index: usize,
) where
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    let started = Instant::now();

    let AttemptOutcome { result, response } = https::exchange(
        &https,
        &server.template,
        server.use_post,
        &query,
    )
    .await;

    // The session may have been replaced while the probe ran; its
    // statistics died with it and there is nothing to record.
    let Some(session) = session.upgrade() else {
        return;
    };

    // A probe only proves the server once the answer resolves the
    // probe name to at least one address.
    let proved = result.is_ok()
        && response.as_ref().is_some_and(|response| {
            extract_address_chain(response, PROBE_HOSTNAME, PROBE_QTYPE)
                .is_ok_and(|list| !list.addresses.is_empty())
        });

    if proved {
        session.record_success(server_index, true);
        session.record_rtt(server_index, true, started.elapsed());
        trace!(server = server_index, "probe succeeded");
    } else {
        session.record_failure(server_index, true);
        trace!(server = server_index, "probe failed");
    }
}

//============ Testing =======================================================
