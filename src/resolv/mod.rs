//! The stub resolver policy layer.
//!
//! [`DnsClient`] is the process-facing entry point. It merges the
//! system configuration with overrides into the effective
//! configuration, decides whether secure and insecure transactions are
//! currently usable, and acts as the factory for
//! [`Transaction`][transaction::Transaction]s, which all share one
//! [`Session`][session::Session] and through it one set of server
//! health statistics.

#![warn(missing_docs)]

pub mod conf;
pub mod probe;
pub mod providers;
pub mod servers;
pub mod session;
pub mod stats;
pub mod transaction;

pub use self::conf::{
    ConfigOverrides, DnsConfig, DohServerConf, SecureDnsMode,
};
pub use self::probe::DohProbeRunner;
pub use self::session::Session;
pub use self::transaction::{Connectors, Transaction};

use self::transaction::prepare_search;
use crate::base::iana::Rtype;
use crate::base::OptRecord;
use crate::client::protocol::{
    DgramConnector, HttpsTransport, StreamConnector,
};
use crate::client::Error;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::debug;

//------------ DnsClient -----------------------------------------------------

/// The resolver client.
///
/// The client owns the current [`Session`]; transactions created from
/// it keep that session alive for as long as they run, so replacing
/// the configuration mid-flight never affects them. Any configuration
/// change that alters the effective configuration replaces the session
/// and with it every failure counter and timing statistic.
pub struct DnsClient<D, S, H> {
    /// The transports handed to every transaction.
    connectors: Connectors<D, S, H>,

    /// The configuration delivered by the OS-specific reader.
    system_config: Option<DnsConfig>,

    /// The overrides layered on top of the system configuration.
    overrides: ConfigOverrides,

    /// Whether policy allows insecure (classic) transactions.
    insecure_enabled: bool,

    /// The session for the current effective configuration.
    session: Option<Arc<Session>>,

    /// Extra EDNS options added to every query.
    opt: Option<OptRecord>,
}

impl<D, S, H> DnsClient<D, S, H>
where
    D: DgramConnector + Clone + Send + Sync + 'static,
    D::Socket: 'static,
    S: StreamConnector + Clone + Send + Sync + 'static,
    S::Stream: 'static,
    H: HttpsTransport + Clone + Send + Sync + 'static,
    H::Body: 'static,
{
    /// Creates a client over the given transports.
    ///
    /// The client starts without a configuration; deliver one with
    /// [`set_system_config`][Self::set_system_config] or complete
    /// overrides via [`set_config_overrides`][Self::set_config_overrides].
    pub fn new(connectors: Connectors<D, S, H>) -> Self {
        DnsClient {
            connectors,
            system_config: None,
            overrides: ConfigOverrides::new(),
            insecure_enabled: true,
            session: None,
            opt: None,
        }
    }

    /// Allows or forbids insecure transactions by policy.
    pub fn set_insecure_enabled(&mut self, enabled: bool) {
        self.insecure_enabled = enabled;
    }

    /// Adds an EDNS option to every future query.
    pub fn add_edns_option(&mut self, code: u16, data: Vec<u8>) {
        self.opt
            .get_or_insert_with(OptRecord::new)
            .push_option(code, data);
    }

    /// Delivers a new system configuration.
    ///
    /// Returns whether the effective configuration changed; a change
    /// replaces the session and resets all server statistics.
    pub fn set_system_config(
        &mut self,
        config: Option<DnsConfig>,
    ) -> bool {
        self.system_config = config;
        self.update_session()
    }

    /// Replaces the configuration overrides.
    ///
    /// Returns whether the effective configuration changed.
    pub fn set_config_overrides(
        &mut self,
        overrides: ConfigOverrides,
    ) -> bool {
        self.overrides = overrides;
        self.update_session()
    }

    /// Returns the current effective configuration.
    pub fn effective_config(&self) -> Option<&DnsConfig> {
        self.session.as_deref().map(Session::config)
    }

    /// Returns the current session.
    pub fn session(&self) -> Option<&Arc<Session>> {
        self.session.as_ref()
    }

    /// Returns whether secure transactions can be created.
    pub fn can_use_secure_transactions(&self) -> bool {
        self.effective_config()
            .is_some_and(|config| !config.doh_servers.is_empty())
    }

    /// Returns whether insecure transactions can be created.
    ///
    /// Classic DNS is only used when policy allows it, classic servers
    /// exist, the system configuration held nothing this resolver does
    /// not understand, and DNS over TLS is not active at the OS level
    /// (the OS resolver would otherwise downgrade the user's traffic).
    pub fn can_use_insecure_transactions(&self) -> bool {
        let Some(config) = self.effective_config() else {
            return false;
        };
        self.insecure_enabled
            && !config.nameservers.is_empty()
            && !config.unhandled_options
            && !config.dns_over_tls_active
    }

    /// Returns whether a secure transaction should rather not start.
    ///
    /// True when secure transactions are unusable, or no DoH server
    /// has currently proven itself available.
    pub fn should_fallback_from_secure(&self) -> bool {
        if !self.can_use_secure_transactions() {
            return true;
        }
        self.session
            .as_ref()
            .is_some_and(|session| {
                session.num_available_doh_servers() == 0
            })
    }

    /// Creates a transaction.
    ///
    /// `secure` selects DoH; `fast_timeout` makes the transaction give
    /// up when its last fallback period expires instead of waiting for
    /// the overall deadline.
    pub fn transaction(
        &self,
        hostname: impl Into<String>,
        qtype: Rtype,
        secure: bool,
        fast_timeout: bool,
    ) -> Result<Transaction<D, S, H>, Error> {
        let hostname = hostname.into();
        let Some(session) = &self.session else {
            return Err(Error::NoEligibleServer);
        };
        if hostname.parse::<IpAddr>().is_ok() {
            // Address literals have no business on the wire.
            return Err(Error::InvalidName);
        }
        // Surface unencodable names at creation already.
        prepare_search(&hostname, session.config())?;

        Ok(Transaction::new(
            session.clone(),
            self.connectors.clone(),
            hostname,
            qtype,
            self.opt.clone(),
            secure,
            fast_timeout,
        ))
    }

    /// Creates the probe runner for the current session's DoH servers.
    pub fn probe_runner(&self) -> Option<DohProbeRunner<H>> {
        let session = self.session.as_ref()?;
        if session.config().doh_servers.is_empty() {
            return None;
        }
        Some(DohProbeRunner::new(
            session,
            self.connectors.https.clone(),
        ))
    }

    /// Rebuilds the effective configuration and session.
    fn update_session(&mut self) -> bool {
        let effective = build_effective_config(
            self.system_config.as_ref(),
            &self.overrides,
        );
        let changed = effective.as_ref() != self.effective_config();
        if changed {
            debug!(
                valid = effective.is_some(),
                "effective configuration changed, resetting session"
            );
            self.session = effective.map(|config| {
                Arc::new(Session::new(config))
            });
        }
        changed
    }
}

//------------ build_effective_config ----------------------------------------

/// Computes the effective configuration.
///
/// Complete overrides stand alone; otherwise the overrides are layered
/// over the system configuration. A configuration without any server
/// is discarded. When automatic secure mode has no DoH servers and the
/// system configuration is fully understood, equivalents for
/// well-known public resolvers are filled in.
fn build_effective_config(
    system: Option<&DnsConfig>,
    overrides: &ConfigOverrides,
) -> Option<DnsConfig> {
    let mut config = match overrides.to_config() {
        Some(config) => config,
        None => overrides.apply_to(system?),
    };
    if !config.is_valid() {
        return None;
    }

    if config.doh_servers.is_empty()
        && config.secure_dns_mode == SecureDnsMode::Automatic
        && !config.unhandled_options
    {
        config.doh_servers = match &config.dns_over_tls_hostname {
            Some(hostname) => {
                providers::upgrade_from_dot_hostname(hostname)
            }
            None => providers::upgrade_from_nameservers(
                &config.nameservers,
            ),
        };
    }

    Some(config)
}

//============ Testing =======================================================
