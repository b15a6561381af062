//! The DNS wire-format codec.
//!
//! This module builds query messages and takes response messages apart.
//! It performs no I/O: the transports in [`crate::client`] move the
//! octets, the types here give them meaning.
//!
//! The flow through a resolution is: a [`Query`] is encoded once and
//! stays immutable; a transport fills a buffer and passes it to
//! [`Response::validate`] together with the query; record data is then
//! read through [`RecordParser`] cursors, and
//! [`extract_address_chain`] turns a validated answer section into an
//! [`AddressList`].

pub mod error;
pub mod extract;
pub mod header;
pub mod iana;
pub mod name;
pub mod opt;
pub mod query;
pub mod response;

#[cfg(test)]
pub(crate) mod test_util;

pub use self::error::WireError;
pub use self::extract::{extract_address_chain, AddressList};
pub use self::header::Header;
pub use self::iana::{Class, Rcode, Rtype};
pub use self::opt::OptRecord;
pub use self::query::{PaddingStrategy, Query};
pub use self::response::{RecordParser, ResourceRecord, Response};
