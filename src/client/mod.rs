//! One-shot DNS transports.
//!
//! Each submodule performs exactly one network round trip for one
//! [`Query`][crate::base::Query] against one server: a datagram
//! exchange over UDP, a length-framed exchange over TCP, or an RFC 8484
//! exchange over HTTPS. The sockets and HTTP requests behind them are
//! injected through the traits in [`protocol`].
//!
//! An attempt is an ordinary future: it starts when first polled, never
//! blocks its caller, completes with exactly one [`AttemptOutcome`],
//! and is cancelled by dropping it. Timeouts are not enforced here —
//! the transaction engine owns all timers.

#![warn(missing_docs)]

pub mod error;
pub mod https;
pub mod protocol;
pub mod tcp;
pub mod udp;

pub use self::error::Error;

use crate::base::iana::Rcode;
use crate::base::Response;

//------------ AttemptOutcome ------------------------------------------------

/// The terminal state of one attempt.
///
/// The result code and the response travel together: a negative answer
/// or a failure rcode is an error with a perfectly valid response
/// attached. A response is only ever present after full wire
/// validation.
#[derive(Clone, Debug)]
pub struct AttemptOutcome {
    /// How the attempt ended.
    pub result: Result<(), Error>,

    /// The validated response, when one arrived.
    pub response: Option<Response>,
}

impl AttemptOutcome {
    /// Creates an outcome for a failure without a response.
    pub fn fail(error: Error) -> Self {
        AttemptOutcome {
            result: Err(error),
            response: None,
        }
    }

    /// Creates the outcome for a validated response.
    ///
    /// The rcode decides: NOERROR is success, NXDOMAIN is the negative
    /// answer, anything else is a server failure. The response rides
    /// along in every case.
    pub fn classify(response: Response) -> Self {
        let result = match response.rcode() {
            Rcode::NOERROR => Ok(()),
            Rcode::NXDOMAIN => Err(Error::NameNotFound),
            rcode => Err(Error::ServerFailed(rcode)),
        };
        AttemptOutcome {
            result,
            response: Some(response),
        }
    }
}
