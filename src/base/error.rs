//! Errors for the wire-format codec.

#![warn(missing_docs)]

use std::error;
use std::fmt;

//------------ WireError -----------------------------------------------------

/// An error produced while encoding or decoding DNS wire format.
///
/// These errors are structural: they describe a buffer that cannot be a
/// well-formed DNS message, a name that cannot be represented in label
/// form, or an answer section that does not actually answer the question
/// it claims to. They never describe transport conditions.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum WireError {
    /// A hostname cannot be encoded into DNS label form.
    InvalidName,

    /// A decoded name exceeded the maximum name length.
    NameTooLong,

    /// A compression pointer chain did not terminate.
    CompressionLoop,

    /// A label started with a length octet of an unknown type.
    UnknownLabelType,

    /// The buffer ended before the structure it claims to hold.
    ShortMessage,

    /// The message does not carry the response flag.
    NotAResponse,

    /// The response header id differs from the query id.
    IdMismatch,

    /// The raw question section differs from the query's question.
    QuestionMismatch,

    /// A record was requested beyond the declared record count.
    RecordLimitExceeded,

    /// A record's owner name breaks the CNAME chain.
    NameMismatch,

    /// An address record's data length does not fit its address family.
    SizeMismatch,

    /// A CNAME appears where the chain already reached an address.
    CnameAfterAddress,

    /// Two CNAME records share the same owner name.
    MultipleCnames,

    /// The answer section is structurally broken in some other way.
    FormError,
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::InvalidName => {
                write!(f, "hostname not representable in DNS label form")
            }
            WireError::NameTooLong => write!(f, "domain name too long"),
            WireError::CompressionLoop => {
                write!(f, "compression pointer loop")
            }
            WireError::UnknownLabelType => write!(f, "unknown label type"),
            WireError::ShortMessage => {
                write!(f, "buffer too short for message structure")
            }
            WireError::NotAResponse => {
                write!(f, "message is not a response")
            }
            WireError::IdMismatch => {
                write!(f, "response id does not match query")
            }
            WireError::QuestionMismatch => {
                write!(f, "response question does not match query")
            }
            WireError::RecordLimitExceeded => {
                write!(f, "read past the declared record count")
            }
            WireError::NameMismatch => {
                write!(f, "record owner does not continue the chain")
            }
            WireError::SizeMismatch => {
                write!(f, "address record data has the wrong length")
            }
            WireError::CnameAfterAddress => {
                write!(f, "CNAME record follows an address record")
            }
            WireError::MultipleCnames => {
                write!(f, "multiple CNAME records for one owner")
            }
            WireError::FormError => write!(f, "malformed answer section"),
        }
    }
}

impl error::Error for WireError {}
