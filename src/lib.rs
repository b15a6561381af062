//! An asynchronous stub DNS resolver core.
//!
//! This crate turns a hostname and record type into network
//! transactions against configured name servers — classic DNS over UDP
//! and TCP as well as DNS over HTTPS — and validates that what comes
//! back actually answers what was asked. It handles retransmission
//! with adaptive per-server timeouts, fallback between servers, the
//! suffix search list, and the protocol upgrade forced by truncated
//! UDP answers.
//!
//! It deliberately does *not* cache answers, resolve recursively, or
//! serve authoritatively; a result cache and request scheduler are
//! expected to sit on top, and OS-specific configuration readers to
//! feed [`resolv::DnsConfig`] values in from below.
//!
//! The crate is organized in three layers:
//!
//! * [`base`] — the wire-format codec: queries, responses, names with
//!   compression, EDNS0, and address-chain extraction. No I/O.
//! * [`client`] — one-shot transport attempts over UDP, TCP, and
//!   HTTPS, with their socket and HTTP primitives injected through
//!   [`client::protocol`].
//! * [`resolv`] — the policy layer: effective configuration,
//!   sessions with per-server health statistics, server selection,
//!   the transaction engine, and DoH availability probing.
//!
//! # Example
//!
//! ```no_run
//! use resolvent::base::iana::Rtype;
//! use resolvent::base::extract_address_chain;
//! use resolvent::client::protocol::{TcpConnect, UdpConnect};
//! use resolvent::resolv::{Connectors, DnsClient, DnsConfig};
//!
//! # #[derive(Clone)] struct MyHttp;
//! # impl resolvent::client::protocol::HttpsTransport for MyHttp {
//! #     type Body = bytes::Bytes;
//! #     fn send(&self, _: resolvent::client::protocol::HttpsRequest)
//! #         -> resolvent::client::protocol::IoFuture<
//! #             resolvent::client::protocol::HttpsReply<bytes::Bytes>> {
//! #         unimplemented!()
//! #     }
//! # }
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut client = DnsClient::new(Connectors {
//!     dgram: UdpConnect,
//!     stream: TcpConnect,
//!     https: MyHttp,
//! });
//! client.set_system_config(Some(DnsConfig::new(vec![
//!     "192.0.2.1:53".parse()?,
//! ])));
//!
//! let transaction =
//!     client.transaction("www.example.com", Rtype::A, false, false)?;
//! let (result, response) = transaction.run().await;
//! result?;
//! let answer = response.expect("success always carries a response");
//! let addresses =
//!     extract_address_chain(&answer, "www.example.com", Rtype::A)?;
//! println!("{:?}", addresses.addresses);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::type_complexity)]

pub mod base;
pub mod client;
pub mod resolv;
