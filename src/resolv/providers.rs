//! Well-known DNS over HTTPS providers.
//!
//! When a user's classic resolver (or DNS over TLS hostname) belongs to
//! a public operator that also runs an equivalent DoH endpoint, the
//! client can upgrade to it automatically. This table carries the
//! mappings the upgrade heuristic consults.

#![warn(missing_docs)]

use super::conf::DohServerConf;
use std::net::{IpAddr, SocketAddr};

//------------ DohProvider ---------------------------------------------------

/// One provider's classic endpoints and their DoH equivalent.
struct DohProvider {
    /// The public resolver addresses operated by the provider.
    addresses: &'static [&'static str],

    /// The DNS over TLS hostnames operated by the provider.
    dot_hostnames: &'static [&'static str],

    /// The URI template of the equivalent DoH endpoint.
    template: &'static str,
}

/// The provider table.
const PROVIDERS: &[DohProvider] = &[
    DohProvider {
        addresses: &["8.8.8.8", "8.8.4.4"],
        dot_hostnames: &["dns.google"],
        template: "https://dns.google/dns-query{?dns}",
    },
    DohProvider {
        addresses: &["1.1.1.1", "1.0.0.1"],
        dot_hostnames: &[
            "1dot1dot1dot1.cloudflare-dns.com",
            "cloudflare-dns.com",
            "one.one.one.one",
        ],
        template: "https://chrome.cloudflare-dns.com/dns-query{?dns}",
    },
    DohProvider {
        addresses: &["9.9.9.9", "149.112.112.112"],
        dot_hostnames: &["dns.quad9.net"],
        template: "https://dns.quad9.net/dns-query{?dns}",
    },
    DohProvider {
        addresses: &["208.67.222.222", "208.67.220.220"],
        dot_hostnames: &["dns.opendns.com"],
        template: "https://doh.opendns.com/dns-query{?dns}",
    },
];

//------------ Lookup --------------------------------------------------------

/// Returns the DoH servers equivalent to a DNS over TLS hostname.
pub fn upgrade_from_dot_hostname(hostname: &str) -> Vec<DohServerConf> {
    PROVIDERS
        .iter()
        .filter(|provider| {
            provider
                .dot_hostnames
                .iter()
                .any(|known| known.eq_ignore_ascii_case(hostname))
        })
        .map(|provider| DohServerConf::new(provider.template))
        .collect()
}

/// Returns the DoH servers equivalent to a set of classic servers.
///
/// Each provider appears at most once, in the order its first address
/// appears in the nameserver list.
pub fn upgrade_from_nameservers(
    nameservers: &[SocketAddr],
) -> Vec<DohServerConf> {
    let mut servers = Vec::new();
    for nameserver in nameservers {
        let Some(provider) = provider_for(nameserver.ip()) else {
            continue;
        };
        let server = DohServerConf::new(provider.template);
        if !servers.contains(&server) {
            servers.push(server);
        }
    }
    servers
}

/// Looks up the provider operating an address.
fn provider_for(addr: IpAddr) -> Option<&'static DohProvider> {
    PROVIDERS.iter().find(|provider| {
        provider
            .addresses
            .iter()
            .any(|known| known.parse::<IpAddr>() == Ok(addr))
    })
}

//============ Testing =======================================================
