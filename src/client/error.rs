//! The error type for transports and transactions.

#![warn(missing_docs)]

use crate::base::iana::Rcode;
use crate::base::WireError;
use std::error;
use std::fmt;
use std::sync::Arc;

//------------ Error ---------------------------------------------------------

/// An error terminating an attempt or a whole transaction.
///
/// Most variants are local to a single attempt and drive the engine's
/// next decision; they only surface to the caller when no further
/// attempt is possible. [`NameNotFound`][Error::NameNotFound] is the
/// one "error" that is really a successful negative answer: servers
/// answering it are healthy and the transaction ends with it once the
/// search list is exhausted.
#[derive(Clone, Debug)]
pub enum Error {
    /// The hostname cannot be encoded into DNS label form.
    InvalidName,

    /// No search-list candidate survived encoding.
    SearchListEmpty,

    /// The response failed wire validation or a size check.
    MalformedResponse,

    /// A record's owner name breaks the CNAME chain.
    NameMismatch,

    /// An address record's data length does not fit its family.
    SizeMismatch,

    /// A CNAME appears where the chain already reached an address.
    CnameAfterAddress,

    /// Two CNAME records share one owner name.
    MultipleCnames,

    /// A compression pointer chain did not terminate.
    CompressionLoop,

    /// A decoded name exceeded the maximum name length.
    NameTooLong,

    /// The server answered truncated over UDP; retry over TCP.
    ServerRequiresTcp,

    /// The transport connection could not be established.
    ConnectionRefused(Arc<std::io::Error>),

    /// The connection closed before a complete response arrived.
    ConnectionClosed,

    /// Sending the query datagram failed.
    UdpSend(Arc<std::io::Error>),

    /// Only part of the query datagram was sent.
    UdpShortSend,

    /// Receiving the response datagram failed.
    UdpReceive(Arc<std::io::Error>),

    /// Writing to the stream failed.
    StreamWrite(Arc<std::io::Error>),

    /// Reading from the stream failed.
    StreamRead(Arc<std::io::Error>),

    /// The HTTPS exchange failed below the DNS layer.
    HttpsRequest(Arc<std::io::Error>),

    /// A redirect left HTTPS and was refused.
    InsecureRedirect,

    /// The server reported a failure rcode.
    ServerFailed(Rcode),

    /// The name authoritatively does not exist.
    NameNotFound,

    /// No response arrived in time.
    Timeout,

    /// Server selection has no server left to offer.
    NoEligibleServer,
}

impl Error {
    /// Converts a codec error into its transaction-level form.
    ///
    /// The structural violations the engine distinguishes keep their
    /// identity; everything else collapses into
    /// [`MalformedResponse`][Error::MalformedResponse].
    pub fn from_wire(error: WireError) -> Self {
        match error {
            WireError::InvalidName => Error::InvalidName,
            WireError::NameMismatch => Error::NameMismatch,
            WireError::SizeMismatch => Error::SizeMismatch,
            WireError::CnameAfterAddress => Error::CnameAfterAddress,
            WireError::MultipleCnames => Error::MultipleCnames,
            WireError::CompressionLoop => Error::CompressionLoop,
            WireError::NameTooLong => Error::NameTooLong,
            _ => Error::MalformedResponse,
        }
    }
}

impl From<WireError> for Error {
    fn from(error: WireError) -> Self {
        Error::from_wire(error)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidName => {
                write!(f, "hostname not representable in DNS label form")
            }
            Error::SearchListEmpty => {
                write!(f, "no usable search list candidate")
            }
            Error::MalformedResponse => write!(f, "malformed response"),
            Error::NameMismatch => {
                write!(f, "record owner does not continue the chain")
            }
            Error::SizeMismatch => {
                write!(f, "address record data has the wrong length")
            }
            Error::CnameAfterAddress => {
                write!(f, "CNAME record follows an address record")
            }
            Error::MultipleCnames => {
                write!(f, "multiple CNAME records for one owner")
            }
            Error::CompressionLoop => {
                write!(f, "compression pointer loop")
            }
            Error::NameTooLong => write!(f, "domain name too long"),
            Error::ServerRequiresTcp => {
                write!(f, "server requires TCP")
            }
            Error::ConnectionRefused(_) => {
                write!(f, "connection refused")
            }
            Error::ConnectionClosed => write!(f, "connection closed"),
            Error::UdpSend(_) => {
                write!(f, "error sending to UDP socket")
            }
            Error::UdpShortSend => {
                write!(f, "partial send to UDP socket")
            }
            Error::UdpReceive(_) => {
                write!(f, "error receiving from UDP socket")
            }
            Error::StreamWrite(_) => {
                write!(f, "error writing to stream")
            }
            Error::StreamRead(_) => {
                write!(f, "error reading from stream")
            }
            Error::HttpsRequest(_) => {
                write!(f, "HTTPS request failed")
            }
            Error::InsecureRedirect => {
                write!(f, "redirect away from HTTPS")
            }
            Error::ServerFailed(rcode) => {
                write!(f, "server failed with {}", rcode)
            }
            Error::NameNotFound => write!(f, "name not found"),
            Error::Timeout => write!(f, "timed out"),
            Error::NoEligibleServer => {
                write!(f, "no eligible server")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::ConnectionRefused(err)
            | Error::UdpSend(err)
            | Error::UdpReceive(err)
            | Error::StreamWrite(err)
            | Error::StreamRead(err)
            | Error::HttpsRequest(err) => Some(err),
            _ => None,
        }
    }
}
