//! The TCP transport attempt.

#![warn(missing_docs)]

use super::error::Error;
use super::protocol::StreamConnector;
use super::AttemptOutcome;
use crate::base::{Query, Response};
use std::io;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

//------------ exchange ------------------------------------------------------

/// Performs one TCP exchange against one server.
///
/// DNS over TCP frames each message with a two-octet big-endian length.
/// The advertised response length must at least cover a message the
/// size of the query; anything smaller is rejected before reading the
/// body. A connection that closes inside a frame is
/// [`Error::ConnectionClosed`].
pub async fn exchange<C: StreamConnector>(
    connector: &C,
    addr: SocketAddr,
    query: &Query,
) -> AttemptOutcome {
    let mut stream = match connector.connect(addr).await {
        Ok(stream) => stream,
        Err(err) => {
            return AttemptOutcome::fail(Error::ConnectionRefused(
                err.into(),
            ))
        }
    };

    // Length prefix, then the message itself.
    let len = query.len() as u16;
    if let Err(err) = stream.write_all(&len.to_be_bytes()).await {
        return AttemptOutcome::fail(Error::StreamWrite(err.into()));
    }
    if let Err(err) = stream.write_all(query.as_slice()).await {
        return AttemptOutcome::fail(Error::StreamWrite(err.into()));
    }

    let response_len = match stream.read_u16().await {
        Ok(len) => len as usize,
        Err(err) => return AttemptOutcome::fail(read_error(err)),
    };
    if response_len < query.len() {
        // A response echoes the question; it cannot be shorter than
        // the query.
        return AttemptOutcome::fail(Error::MalformedResponse);
    }

    let mut buf = vec![0; response_len];
    if let Err(err) = stream.read_exact(&mut buf).await {
        return AttemptOutcome::fail(read_error(err));
    }

    let response = match Response::validate(buf.into(), Some(query)) {
        Ok(response) => response,
        Err(err) => {
            tracing::trace!("TCP response failed validation: {}", err);
            return AttemptOutcome::fail(err.into());
        }
    };
    if response.is_truncated() {
        // Truncation over TCP makes no sense.
        return AttemptOutcome::fail(Error::MalformedResponse);
    }
    AttemptOutcome::classify(response)
}

/// Maps a framed-read error, turning EOF into a closed connection.
fn read_error(err: io::Error) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::ConnectionClosed
    } else {
        Error::StreamRead(err.into())
    }
}

//============ Testing =======================================================
