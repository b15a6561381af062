//! The UDP transport attempt.

#![warn(missing_docs)]

use super::error::Error;
use super::protocol::{DgramConnector, DgramSocket};
use super::AttemptOutcome;
use crate::base::response::MAX_UDP_SIZE;
use crate::base::{Query, Response};
use std::net::SocketAddr;

//------------ exchange ------------------------------------------------------

/// Performs one UDP exchange against one server.
///
/// One datagram out, one datagram in. A datagram that does not validate
/// against the query fails the attempt rather than being skipped; the
/// engine decides whether to retry elsewhere. A truncated response
/// turns into [`Error::ServerRequiresTcp`] so the engine can upgrade
/// the transport.
pub async fn exchange<C: DgramConnector>(
    connector: &C,
    addr: SocketAddr,
    query: &Query,
) -> AttemptOutcome {
    let sock = match connector.connect(addr).await {
        Ok(sock) => sock,
        Err(err) => {
            return AttemptOutcome::fail(Error::ConnectionRefused(
                err.into(),
            ))
        }
    };

    let dgram = query.as_slice();
    let sent = match sock.send(dgram).await {
        Ok(sent) => sent,
        Err(err) => {
            return AttemptOutcome::fail(Error::UdpSend(err.into()))
        }
    };
    if sent != dgram.len() {
        return AttemptOutcome::fail(Error::UdpShortSend);
    }

    let buf = match sock.recv(vec![0; MAX_UDP_SIZE]).await {
        Ok(buf) => buf,
        Err(err) => {
            return AttemptOutcome::fail(Error::UdpReceive(err.into()))
        }
    };

    let response = match Response::validate(buf.into(), Some(query)) {
        Ok(response) => response,
        Err(err) => {
            tracing::trace!("UDP response failed validation: {}", err);
            return AttemptOutcome::fail(err.into());
        }
    };
    if response.is_truncated() {
        return AttemptOutcome {
            result: Err(Error::ServerRequiresTcp),
            response: Some(response),
        };
    }
    AttemptOutcome::classify(response)
}

//============ Testing =======================================================
