//! DNS query messages.

#![warn(missing_docs)]

use super::error::WireError;
use super::header::{compose_query_header, HEADER_LEN};
use super::iana::{Class, Rtype};
use super::name::encode_name;
use super::opt::OptRecord;
use bytes::Bytes;

//------------ PaddingStrategy -----------------------------------------------

/// How a query message is padded.
///
/// Padding rounds the encoded message up to a multiple of a block size
/// using the EDNS padding option, so that an observer of encrypted
/// transports cannot infer the query from the message length. Queries
/// sent over plain UDP or TCP are not padded.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum PaddingStrategy {
    /// Do not pad the message.
    #[default]
    None,

    /// Pad the message to a multiple of the given block size.
    BlockLength(usize),
}

/// The block size DNS over HTTPS queries are padded to.
pub const DOH_PADDING_BLOCK: usize = 128;

//------------ Query ---------------------------------------------------------

/// An immutable, fully encoded DNS query.
///
/// A query is encoded once at construction and never changes afterwards;
/// [`clone_with_new_id`][Self::clone_with_new_id] produces an otherwise
/// identical message under a fresh transaction id. The wire bytes are
/// shared cheaply between the transaction engine and its attempts.
#[derive(Clone, Debug)]
pub struct Query {
    /// The encoded message.
    bytes: Bytes,

    /// The length of the encoded question name.
    qname_len: usize,

    /// The record type asked for.
    qtype: Rtype,
}

impl Query {
    /// Creates a query for a dotted host name.
    pub fn new(
        id: u16,
        hostname: &str,
        qtype: Rtype,
        opt: Option<&OptRecord>,
        padding: PaddingStrategy,
    ) -> Result<Self, WireError> {
        let qname = encode_name(hostname)?;
        Ok(Self::from_wire_name(id, &qname, qtype, opt, padding))
    }

    /// Creates a query for an already encoded name.
    ///
    /// The name must have been produced by
    /// [`encode_name`][super::name::encode_name]; the search list keeps
    /// candidate names in encoded form so this is the constructor the
    /// transaction engine uses.
    pub fn from_wire_name(
        id: u16,
        qname: &[u8],
        qtype: Rtype,
        opt: Option<&OptRecord>,
        padding: PaddingStrategy,
    ) -> Self {
        let question_len = qname.len() + 4;
        let opt_len = match (opt, padding) {
            (None, PaddingStrategy::None) => 0,
            (Some(opt), _) => opt.encoded_len(),
            (None, PaddingStrategy::BlockLength(_)) => {
                OptRecord::new().encoded_len()
            }
        };
        let mut target =
            Vec::with_capacity(HEADER_LEN + question_len + opt_len + 32);

        compose_query_header(&mut target, id);
        target.extend_from_slice(qname);
        target.extend_from_slice(&qtype.to_int().to_be_bytes());
        target.extend_from_slice(&Class::IN.to_int().to_be_bytes());

        let opt = match (opt, padding) {
            (None, PaddingStrategy::None) => None,
            (Some(opt), _) => Some(opt.clone()),
            (None, PaddingStrategy::BlockLength(_)) => {
                Some(OptRecord::new())
            }
        };
        if let Some(opt) = opt {
            // ARCOUNT = 1
            target[11] = 1;
            let pad_octets = match padding {
                PaddingStrategy::None => None,
                PaddingStrategy::BlockLength(block) => {
                    // Size with the padding option header but no pad
                    // octets yet; the pad fills up to the block size.
                    let unpadded = target.len() + opt.encoded_len() + 4;
                    Some((block - unpadded % block) % block)
                }
            };
            opt.compose(&mut target, pad_octets);
        }

        Query {
            bytes: target.into(),
            qname_len: qname.len(),
            qtype,
        }
    }

    /// Creates a copy of the query under a new transaction id.
    pub fn clone_with_new_id(&self, id: u16) -> Self {
        let mut bytes = self.bytes.to_vec();
        bytes[..2].copy_from_slice(&id.to_be_bytes());
        Query {
            bytes: bytes.into(),
            qname_len: self.qname_len,
            qtype: self.qtype,
        }
    }

    /// Returns the transaction id.
    pub fn id(&self) -> u16 {
        u16::from_be_bytes([self.bytes[0], self.bytes[1]])
    }

    /// Returns the encoded question name.
    pub fn qname(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..HEADER_LEN + self.qname_len]
    }

    /// Returns the record type asked for.
    pub fn qtype(&self) -> Rtype {
        self.qtype
    }

    /// Returns the raw bytes of the question section.
    ///
    /// Response validation compares these bytes byte-for-byte against
    /// the question echoed by the server.
    pub fn question_bytes(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..HEADER_LEN + self.qname_len + 4]
    }

    /// Returns the full encoded message.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the length of the encoded message.
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Returns whether the message is empty. It never is.
    pub fn is_empty(&self) -> bool {
        false
    }
}

//============ Testing =======================================================
