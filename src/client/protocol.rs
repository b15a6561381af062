//! Injected network capabilities.
//!
//! The transports in this module's siblings never create sockets or
//! HTTP requests themselves. They go through the traits defined here,
//! which a process wires up once: real implementations over tokio for
//! UDP and TCP are provided below, the HTTPS exchange has no default
//! and must come from the embedding application's HTTP client. Tests
//! substitute in-memory implementations.

#![warn(missing_docs)]

use bytes::Bytes;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, UdpSocket};

/// How many times a new random port is tried on 'address in use'.
const RETRY_RANDOM_PORT: usize = 10;

/// A boxed future resolving to an I/O result.
pub type IoFuture<T> =
    Pin<Box<dyn Future<Output = Result<T, io::Error>> + Send>>;

//------------ DgramConnector ------------------------------------------------

/// Creates connected datagram sockets towards a server.
pub trait DgramConnector {
    /// The type of a connected socket.
    type Socket: DgramSocket;

    /// Connects a fresh socket to the given server.
    ///
    /// Every attempt leases its own socket; the socket belongs to that
    /// attempt until it completes or is dropped.
    fn connect(&self, addr: SocketAddr) -> IoFuture<Self::Socket>;
}

//------------ DgramSocket ---------------------------------------------------

/// A connected datagram socket.
pub trait DgramSocket: Send {
    /// Sends a datagram, returning the number of octets sent.
    fn send(&self, buf: &[u8]) -> IoFuture<usize>;

    /// Receives one datagram into the buffer, truncating it to the
    /// received length.
    fn recv(&self, buf: Vec<u8>) -> IoFuture<Vec<u8>>;
}

//------------ StreamConnector -----------------------------------------------

/// Creates byte streams towards a server.
pub trait StreamConnector {
    /// The type of an established stream.
    type Stream: AsyncRead + AsyncWrite + Send + Unpin;

    /// Connects a fresh stream to the given server.
    fn connect(&self, addr: SocketAddr) -> IoFuture<Self::Stream>;
}

//------------ HttpsTransport ------------------------------------------------

/// Performs HTTPS exchanges for DNS over HTTPS.
///
/// Implementations must not follow redirects themselves: a redirect is
/// reported as [`HttpsReply::Redirect`] so that the attempt can apply
/// the HTTPS-only policy and re-issue the request. The response body is
/// streamed through [`HttpsBody`] so the attempt can bound its size
/// while reading.
pub trait HttpsTransport {
    /// The type streaming a response body.
    type Body: HttpsBody;

    /// Issues one HTTP request.
    fn send(&self, request: HttpsRequest) -> IoFuture<HttpsReply<Self::Body>>;
}

/// One HTTP request as built by a DNS over HTTPS attempt.
#[derive(Clone, Debug)]
pub struct HttpsRequest {
    /// The request URL.
    pub url: String,

    /// Use POST with the query as body; GET otherwise.
    pub use_post: bool,

    /// The request body. Empty for GET.
    pub body: Bytes,
}

/// What came back from one HTTP request.
#[derive(Debug)]
pub enum HttpsReply<Body> {
    /// The server redirected elsewhere.
    Redirect {
        /// The target URL of the redirect.
        location: String,
    },

    /// The server responded.
    Response {
        /// The HTTP status code.
        status: u16,

        /// The value of the Content-Type header, if present.
        content_type: Option<String>,

        /// The value of the Content-Length header, if present.
        content_length: Option<u64>,

        /// The response body.
        body: Body,
    },
}

//------------ HttpsBody -----------------------------------------------------

/// A streamed HTTP response body.
pub trait HttpsBody: Send {
    /// Returns the next chunk of the body, or `None` at its end.
    fn chunk(
        &mut self,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Option<Bytes>, io::Error>>
                + Send
                + '_,
        >,
    >;
}

impl HttpsBody for Bytes {
    fn chunk(
        &mut self,
    ) -> Pin<
        Box<
            dyn Future<Output = Result<Option<Bytes>, io::Error>>
                + Send
                + '_,
        >,
    > {
        Box::pin(async move {
            if self.is_empty() {
                Ok(None)
            } else {
                Ok(Some(std::mem::take(self)))
            }
        })
    }
}

//------------ UdpConnect ----------------------------------------------------

/// The default datagram connector over tokio UDP sockets.
#[derive(Clone, Copy, Debug, Default)]
pub struct UdpConnect;

impl DgramConnector for UdpConnect {
    type Socket = UdpDgram;

    fn connect(&self, addr: SocketAddr) -> IoFuture<Self::Socket> {
        Box::pin(UdpDgram::new(addr))
    }
}

/// A single connected UDP socket.
#[derive(Debug)]
pub struct UdpDgram {
    /// The underlying socket.
    sock: Arc<UdpSocket>,
}

impl UdpDgram {
    /// Binds to a fresh random local port and connects to the server.
    async fn new(addr: SocketAddr) -> Result<Self, io::Error> {
        let sock = Self::udp_bind(addr.is_ipv4()).await?;
        sock.connect(addr).await?;
        Ok(Self {
            sock: Arc::new(sock),
        })
    }

    /// Binds to a random local UDP port.
    async fn udp_bind(v4: bool) -> Result<UdpSocket, io::Error> {
        let mut i = 0;
        loop {
            let local: SocketAddr = if v4 {
                ([0u8; 4], 0).into()
            } else {
                ([0u16; 8], 0).into()
            };
            match UdpSocket::bind(&local).await {
                Ok(sock) => return Ok(sock),
                Err(err) => {
                    if i == RETRY_RANDOM_PORT {
                        return Err(err);
                    } else {
                        i += 1
                    }
                }
            }
        }
    }
}

impl DgramSocket for UdpDgram {
    fn send(&self, buf: &[u8]) -> IoFuture<usize> {
        let sock = self.sock.clone();
        let buf = buf.to_vec();
        Box::pin(async move { sock.send(&buf).await })
    }

    fn recv(&self, mut buf: Vec<u8>) -> IoFuture<Vec<u8>> {
        let sock = self.sock.clone();
        Box::pin(async move {
            let len = sock.recv(&mut buf).await?;
            buf.truncate(len);
            Ok(buf)
        })
    }
}

//------------ TcpConnect ----------------------------------------------------

/// The default stream connector over tokio TCP.
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnect;

impl StreamConnector for TcpConnect {
    type Stream = TcpStream;

    fn connect(&self, addr: SocketAddr) -> IoFuture<Self::Stream> {
        Box::pin(TcpStream::connect(addr))
    }
}
