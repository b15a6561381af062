//! Resolver configuration.
//!
//! A [`DnsConfig`] is what an OS-specific reader or the embedding
//! application hands to the [`DnsClient`][super::DnsClient]: the
//! servers to talk to and the query-shaping knobs. The client combines
//! it with [`ConfigOverrides`] into the effective configuration a
//! [`Session`][super::session::Session] snapshots.

#![warn(missing_docs)]

use std::net::SocketAddr;
use std::time::Duration;

//------------ Module Configuration ------------------------------------------

/// The default number of dots before the literal name is tried first.
pub const DEFAULT_NDOTS: usize = 1;

/// The default number of times each classic server may be attempted.
pub const DEFAULT_ATTEMPTS: usize = 2;

/// The default number of times each DoH server may be attempted.
pub const DEFAULT_DOH_ATTEMPTS: usize = 3;

/// The default initial fallback period.
pub const DEFAULT_FALLBACK_PERIOD: Duration = Duration::from_secs(1);

//------------ SecureDnsMode -------------------------------------------------

/// The policy for DNS over HTTPS.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum SecureDnsMode {
    /// Never use DoH.
    #[default]
    Off,

    /// Prefer DoH, but only against servers that proved themselves
    /// available, and fall back to classic DNS otherwise.
    Automatic,

    /// Use DoH exclusively, availability notwithstanding.
    Secure,
}

//------------ DohServerConf -------------------------------------------------

/// One DNS over HTTPS server.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DohServerConf {
    /// The RFC 8484 URI template of the server.
    pub template: String,

    /// Send queries as POST bodies rather than GET parameters.
    pub use_post: bool,
}

impl DohServerConf {
    /// Creates a GET-style server entry for a template.
    pub fn new(template: impl Into<String>) -> Self {
        DohServerConf {
            template: template.into(),
            use_post: false,
        }
    }
}

//------------ DnsConfig -----------------------------------------------------

/// The resolver configuration.
///
/// The type is plain data with public fields; [`Default`] produces a
/// configuration with no servers, which is not usable until servers are
/// filled in — check with [`is_valid`][Self::is_valid].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DnsConfig {
    /// The classic DNS servers, in preference order.
    pub nameservers: Vec<SocketAddr>,

    /// The DNS over HTTPS servers, in preference order.
    pub doh_servers: Vec<DohServerConf>,

    /// The suffixes appended during search list construction.
    pub search: Vec<String>,

    /// How many dots a name needs for the literal lookup to go first.
    pub ndots: usize,

    /// How many times each classic server may be tried per query.
    pub attempts: usize,

    /// How many times each DoH server may be tried per query.
    pub doh_attempts: usize,

    /// Rotate the first classic server across transactions.
    pub rotate: bool,

    /// Whether suffixes are appended to names with several labels.
    pub append_to_multi_label_name: bool,

    /// The DNS over HTTPS policy.
    pub secure_dns_mode: SecureDnsMode,

    /// The initial per-attempt fallback period.
    pub fallback_period: Duration,

    /// A separate initial fallback period for DoH attempts; DoH falls
    /// back to `fallback_period` when unset.
    pub doh_fallback_period: Option<Duration>,

    /// The system configuration contained options this resolver does
    /// not handle; insecure transactions are then left to the system.
    pub unhandled_options: bool,

    /// DNS over TLS is active at the OS level.
    pub dns_over_tls_active: bool,

    /// The DNS over TLS hostname configured at the OS level.
    pub dns_over_tls_hostname: Option<String>,
}

impl DnsConfig {
    /// Creates a configuration for a set of classic servers.
    pub fn new(nameservers: Vec<SocketAddr>) -> Self {
        DnsConfig {
            nameservers,
            ..Default::default()
        }
    }

    /// Returns whether the configuration can serve queries at all.
    pub fn is_valid(&self) -> bool {
        !self.nameservers.is_empty() || !self.doh_servers.is_empty()
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        DnsConfig {
            nameservers: Vec::new(),
            doh_servers: Vec::new(),
            search: Vec::new(),
            ndots: DEFAULT_NDOTS,
            attempts: DEFAULT_ATTEMPTS,
            doh_attempts: DEFAULT_DOH_ATTEMPTS,
            rotate: false,
            append_to_multi_label_name: true,
            secure_dns_mode: SecureDnsMode::Off,
            fallback_period: DEFAULT_FALLBACK_PERIOD,
            doh_fallback_period: None,
            unhandled_options: false,
            dns_over_tls_active: false,
            dns_over_tls_hostname: None,
        }
    }
}

//------------ ConfigOverrides -----------------------------------------------

/// Selective overrides layered over a system configuration.
///
/// Every field that is `Some` replaces the corresponding system value.
/// Overrides that specify everything stand on their own and do not need
/// a system configuration at all.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ConfigOverrides {
    /// Replacement classic servers.
    pub nameservers: Option<Vec<SocketAddr>>,

    /// Replacement DoH servers.
    pub doh_servers: Option<Vec<DohServerConf>>,

    /// Replacement search suffixes.
    pub search: Option<Vec<String>>,

    /// Replacement ndots value.
    pub ndots: Option<usize>,

    /// Replacement attempts value.
    pub attempts: Option<usize>,

    /// Replacement DoH attempts value.
    pub doh_attempts: Option<usize>,

    /// Replacement rotation flag.
    pub rotate: Option<bool>,

    /// Replacement multi-label suffixing flag.
    pub append_to_multi_label_name: Option<bool>,

    /// Replacement secure DNS mode.
    pub secure_dns_mode: Option<SecureDnsMode>,

    /// Replacement fallback period.
    pub fallback_period: Option<Duration>,
}

impl ConfigOverrides {
    /// Creates overrides that change nothing.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns whether the overrides specify every field.
    pub fn is_complete(&self) -> bool {
        self.nameservers.is_some()
            && self.doh_servers.is_some()
            && self.search.is_some()
            && self.ndots.is_some()
            && self.attempts.is_some()
            && self.doh_attempts.is_some()
            && self.rotate.is_some()
            && self.append_to_multi_label_name.is_some()
            && self.secure_dns_mode.is_some()
            && self.fallback_period.is_some()
    }

    /// Applies the overrides on top of a base configuration.
    pub fn apply_to(&self, base: &DnsConfig) -> DnsConfig {
        let mut config = base.clone();
        self.overlay(&mut config);
        config
    }

    /// Builds a configuration from complete overrides alone.
    ///
    /// Returns `None` unless [`is_complete`][Self::is_complete].
    pub fn to_config(&self) -> Option<DnsConfig> {
        if !self.is_complete() {
            return None;
        }
        let mut config = DnsConfig::default();
        self.overlay(&mut config);
        Some(config)
    }

    /// Writes every specified field into the target.
    fn overlay(&self, config: &mut DnsConfig) {
        if let Some(value) = &self.nameservers {
            config.nameservers = value.clone();
        }
        if let Some(value) = &self.doh_servers {
            config.doh_servers = value.clone();
        }
        if let Some(value) = &self.search {
            config.search = value.clone();
        }
        if let Some(value) = self.ndots {
            config.ndots = value;
        }
        if let Some(value) = self.attempts {
            config.attempts = value;
        }
        if let Some(value) = self.doh_attempts {
            config.doh_attempts = value;
        }
        if let Some(value) = self.rotate {
            config.rotate = value;
        }
        if let Some(value) = self.append_to_multi_label_name {
            config.append_to_multi_label_name = value;
        }
        if let Some(value) = self.secure_dns_mode {
            config.secure_dns_mode = value;
        }
        if let Some(value) = self.fallback_period {
            config.fallback_period = value;
        }
    }
}

//============ Testing =======================================================
