//! Mock servers for driving transactions without a network.
//!
//! The mocks implement the capability traits from
//! `resolvent::client::protocol`. Each mock server owns a script of
//! rules; every incoming query is parsed, matched against the rules,
//! and answered from the rule's action. Requests are also recorded so
//! tests can assert on what actually went over the "wire".

#![allow(dead_code)]

use bytes::Bytes;
use resolvent::base::header::HEADER_LEN;
use resolvent::base::iana::{Class, Rcode, Rtype};
use resolvent::base::name::{decode_name, encode_name};
use resolvent::client::protocol::{
    DgramConnector, DgramSocket, HttpsBody, HttpsReply, HttpsRequest,
    HttpsTransport, IoFuture, StreamConnector,
};
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

//------------ Parsed queries ------------------------------------------------

/// The bits of a received query the mocks care about.
#[derive(Clone, Debug)]
pub struct SeenQuery {
    /// The query id.
    pub id: u16,
    /// The question name in dotted form.
    pub qname: String,
    /// The question type.
    pub qtype: Rtype,
    /// The raw query bytes.
    pub bytes: Bytes,
}

/// Parses the question out of a wire-format query.
pub fn parse_query(bytes: &[u8]) -> SeenQuery {
    let id = u16::from_be_bytes([bytes[0], bytes[1]]);
    let (qname, consumed) =
        decode_name(bytes, HEADER_LEN).expect("parseable query name");
    let at = HEADER_LEN + consumed;
    let qtype =
        Rtype::from_int(u16::from_be_bytes([bytes[at], bytes[at + 1]]));
    SeenQuery {
        id,
        qname,
        qtype,
        bytes: Bytes::copy_from_slice(bytes),
    }
}

//------------ Answer construction -------------------------------------------

/// Builds a response to a received query.
pub struct Answer {
    buf: Vec<u8>,
    answers: u16,
}

impl Answer {
    /// Starts a NOERROR answer echoing the query's id and question.
    pub fn to_query(query: &SeenQuery) -> Self {
        let question_end = {
            let (_, consumed) =
                decode_name(&query.bytes, HEADER_LEN).unwrap();
            HEADER_LEN + consumed + 4
        };
        let mut buf = Vec::with_capacity(512);
        buf.extend_from_slice(&query.id.to_be_bytes());
        buf.extend_from_slice(&0x8180u16.to_be_bytes());
        buf.extend_from_slice(&1u16.to_be_bytes());
        buf.extend_from_slice(&[0; 6]);
        buf.extend_from_slice(&query.bytes[HEADER_LEN..question_end]);
        Answer { buf, answers: 0 }
    }

    /// Sets the rcode.
    pub fn rcode(mut self, rcode: Rcode) -> Self {
        self.buf[3] = (self.buf[3] & 0xF0) | rcode.to_int();
        self
    }

    /// Sets the truncation bit.
    pub fn truncated(mut self) -> Self {
        self.buf[2] |= 0x02;
        self
    }

    /// Appends an A record.
    pub fn a_record(self, name: &str, addr: [u8; 4], ttl: u32) -> Self {
        self.record(name, Rtype::A, ttl, &addr)
    }

    /// Appends a CNAME record.
    pub fn cname_record(self, name: &str, target: &str, ttl: u32) -> Self {
        let rdata = encode_name(target).unwrap();
        self.record(name, Rtype::CNAME, ttl, &rdata)
    }

    /// Appends an arbitrary answer record.
    pub fn record(
        mut self,
        name: &str,
        rtype: Rtype,
        ttl: u32,
        rdata: &[u8],
    ) -> Self {
        self.buf.extend_from_slice(&encode_name(name).unwrap());
        self.buf.extend_from_slice(&rtype.to_int().to_be_bytes());
        self.buf
            .extend_from_slice(&Class::IN.to_int().to_be_bytes());
        self.buf.extend_from_slice(&ttl.to_be_bytes());
        self.buf
            .extend_from_slice(&(rdata.len() as u16).to_be_bytes());
        self.buf.extend_from_slice(rdata);
        self.answers += 1;
        self
    }

    /// Finishes the message.
    pub fn build(mut self) -> Bytes {
        self.buf[6..8].copy_from_slice(&self.answers.to_be_bytes());
        self.buf.into()
    }
}

//------------ ServerAction --------------------------------------------------

/// What a mock server does with a matching query.
#[derive(Clone)]
pub enum ServerAction {
    /// Answer with the addresses, one A record each.
    Answer(Vec<[u8; 4]>),

    /// Answer with a CNAME chain ending in one address.
    Chain(Vec<(String, String, u32)>, String, [u8; 4], u32),

    /// Answer with the given rcode and no records.
    Rcode(Rcode),

    /// Answer with the truncation bit set and no records.
    Truncated,

    /// Reply with unparseable garbage.
    Garbage,

    /// Never answer.
    Drop,

    /// Fail the transport with the given error kind.
    Fail(io::ErrorKind),
}

/// One scripted behavior of a mock server.
#[derive(Clone)]
pub struct ServerScript {
    /// Actions consumed one query at a time; the last one repeats.
    pub actions: Vec<ServerAction>,

    /// An artificial delay before each reply.
    pub delay: Duration,
}

impl ServerScript {
    /// A server that always answers `addr` for any A question.
    pub fn answering(addr: [u8; 4]) -> Self {
        ServerScript {
            actions: vec![ServerAction::Answer(vec![addr])],
            delay: Duration::ZERO,
        }
    }

    /// A server that never answers.
    pub fn dropping() -> Self {
        ServerScript {
            actions: vec![ServerAction::Drop],
            delay: Duration::ZERO,
        }
    }

    /// A server playing the given actions in order, repeating the
    /// last.
    pub fn playing(actions: Vec<ServerAction>) -> Self {
        ServerScript {
            actions,
            delay: Duration::ZERO,
        }
    }

    /// Adds a delay before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

//------------ MockServer ----------------------------------------------------

/// The shared state of one scripted server.
pub struct MockServer {
    script: ServerScript,
    /// How many queries this server has seen.
    seen: Mutex<Vec<SeenQuery>>,
    /// The consumption cursor into the script.
    cursor: Mutex<usize>,
}

impl MockServer {
    /// Creates a server from its script.
    pub fn new(script: ServerScript) -> Arc<Self> {
        Arc::new(MockServer {
            script,
            seen: Mutex::new(Vec::new()),
            cursor: Mutex::new(0),
        })
    }

    /// Returns the queries the server received so far.
    pub fn seen(&self) -> Vec<SeenQuery> {
        self.seen.lock().unwrap().clone()
    }

    /// Handles one query, returning the reply bytes if any.
    pub async fn handle(&self, query: SeenQuery) -> Option<Bytes> {
        let action = {
            let mut cursor = self.cursor.lock().unwrap();
            let index = (*cursor).min(self.script.actions.len() - 1);
            *cursor += 1;
            self.script.actions[index].clone()
        };
        self.seen.lock().unwrap().push(query.clone());

        if !self.script.delay.is_zero() {
            tokio::time::sleep(self.script.delay).await;
        }

        match action {
            ServerAction::Answer(addrs) => {
                let mut answer = Answer::to_query(&query);
                for addr in addrs {
                    answer = answer.a_record(&query.qname, addr, 120);
                }
                Some(answer.build())
            }
            ServerAction::Chain(cnames, owner, addr, ttl) => {
                let mut answer = Answer::to_query(&query);
                for (name, target, cname_ttl) in &cnames {
                    answer =
                        answer.cname_record(name, target, *cname_ttl);
                }
                Some(answer.a_record(&owner, addr, ttl).build())
            }
            ServerAction::Rcode(rcode) => {
                Some(Answer::to_query(&query).rcode(rcode).build())
            }
            ServerAction::Truncated => {
                Some(Answer::to_query(&query).truncated().build())
            }
            ServerAction::Garbage => {
                Some(Bytes::from_static(b"\x00\x01rubbish"))
            }
            ServerAction::Drop => None,
            ServerAction::Fail(_) => None,
        }
    }

    /// Returns the error the next exchange should fail with, if the
    /// current action is a failure.
    fn current_failure(&self) -> Option<io::ErrorKind> {
        let cursor = self.cursor.lock().unwrap();
        let index = (*cursor).min(self.script.actions.len() - 1);
        match self.script.actions[index] {
            ServerAction::Fail(kind) => Some(kind),
            _ => None,
        }
    }

    /// Consumes the current action as a transport failure.
    fn take_failure(&self) -> Option<io::ErrorKind> {
        let kind = self.current_failure()?;
        *self.cursor.lock().unwrap() += 1;
        Some(kind)
    }
}

//------------ MockNet -------------------------------------------------------

/// A little universe of scripted servers addressable by socket
/// address or DoH template.
#[derive(Clone, Default)]
pub struct MockNet {
    /// Classic servers by socket address.
    udp: Arc<Mutex<Vec<(SocketAddr, Arc<MockServer>)>>>,

    /// TCP behaviors by socket address; defaults to the UDP script's
    /// server when absent.
    tcp: Arc<Mutex<Vec<(SocketAddr, Arc<MockServer>)>>>,

    /// DoH servers by URL prefix.
    doh: Arc<Mutex<Vec<(String, Arc<MockServer>)>>>,
}

impl MockNet {
    /// Creates an empty universe.
    pub fn new() -> Self {
        Default::default()
    }

    /// Adds a classic server reachable over UDP and TCP.
    pub fn add_server(
        &self,
        addr: SocketAddr,
        script: ServerScript,
    ) -> Arc<MockServer> {
        let server = MockServer::new(script);
        self.udp.lock().unwrap().push((addr, server.clone()));
        server
    }

    /// Overrides the TCP behavior of an address.
    pub fn add_tcp_server(
        &self,
        addr: SocketAddr,
        script: ServerScript,
    ) -> Arc<MockServer> {
        let server = MockServer::new(script);
        self.tcp.lock().unwrap().push((addr, server.clone()));
        server
    }

    /// Adds a DoH server matched by URL prefix.
    pub fn add_doh_server(
        &self,
        url_prefix: &str,
        script: ServerScript,
    ) -> Arc<MockServer> {
        let server = MockServer::new(script);
        self.doh
            .lock()
            .unwrap()
            .push((url_prefix.to_string(), server.clone()));
        server
    }

    fn udp_server(&self, addr: SocketAddr) -> Option<Arc<MockServer>> {
        self.udp
            .lock()
            .unwrap()
            .iter()
            .find(|(at, _)| *at == addr)
            .map(|(_, server)| server.clone())
    }

    fn tcp_server(&self, addr: SocketAddr) -> Option<Arc<MockServer>> {
        let tcp = self.tcp.lock().unwrap();
        if let Some((_, server)) =
            tcp.iter().find(|(at, _)| *at == addr)
        {
            return Some(server.clone());
        }
        drop(tcp);
        self.udp_server(addr)
    }

    fn doh_server(&self, url: &str) -> Option<Arc<MockServer>> {
        self.doh
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| url.starts_with(prefix.as_str()))
            .map(|(_, server)| server.clone())
    }

    /// Returns connectors backed by this universe.
    pub fn connectors(
        &self,
    ) -> resolvent::resolv::Connectors<MockNet, MockNet, MockNet> {
        resolvent::resolv::Connectors {
            dgram: self.clone(),
            stream: self.clone(),
            https: self.clone(),
        }
    }
}

//--- DgramConnector for UDP

/// A leased mock UDP socket: the pending reply, if any.
pub struct MockDgram {
    server: Arc<MockServer>,
    reply: Arc<Mutex<Option<Option<Bytes>>>>,
}

impl DgramConnector for MockNet {
    type Socket = MockDgram;

    fn connect(&self, addr: SocketAddr) -> IoFuture<MockDgram> {
        let server = self.udp_server(addr);
        Box::pin(async move {
            let server = server.ok_or_else(|| {
                io::Error::from(io::ErrorKind::ConnectionRefused)
            })?;
            if let Some(kind) = server.take_failure() {
                return Err(io::Error::from(kind));
            }
            Ok(MockDgram {
                server,
                reply: Arc::new(Mutex::new(None)),
            })
        })
    }
}

impl DgramSocket for MockDgram {
    fn send(&self, buf: &[u8]) -> IoFuture<usize> {
        let server = self.server.clone();
        let reply = self.reply.clone();
        let query = parse_query(buf);
        let len = buf.len();
        Box::pin(async move {
            // The reply is produced inline and parked until recv.
            let produced = server.handle(query).await;
            *reply.lock().unwrap() = Some(produced);
            Ok(len)
        })
    }

    fn recv(&self, _buf: Vec<u8>) -> IoFuture<Vec<u8>> {
        let reply = self.reply.lock().unwrap().take();
        Box::pin(async move {
            match reply.flatten() {
                Some(bytes) => Ok(bytes.to_vec()),
                // Never answer: park forever, the engine's timers
                // decide when to give up.
                None => {
                    futures_util::future::pending::<()>().await;
                    unreachable!()
                }
            }
        })
    }
}

//--- StreamConnector for TCP

impl StreamConnector for MockNet {
    type Stream = DuplexStream;

    fn connect(&self, addr: SocketAddr) -> IoFuture<DuplexStream> {
        let server = self.tcp_server(addr);
        Box::pin(async move {
            let server = server.ok_or_else(|| {
                io::Error::from(io::ErrorKind::ConnectionRefused)
            })?;
            if let Some(kind) = server.take_failure() {
                return Err(io::Error::from(kind));
            }
            let (client, mut stream) = duplex(1 << 16);
            tokio::spawn(async move {
                let len = match stream.read_u16().await {
                    Ok(len) => len as usize,
                    Err(_) => return,
                };
                let mut query = vec![0; len];
                if stream.read_exact(&mut query).await.is_err() {
                    return;
                }
                let query = parse_query(&query);
                if let Some(reply) = server.handle(query).await {
                    let frame = (reply.len() as u16).to_be_bytes();
                    let _ = stream.write_all(&frame).await;
                    let _ = stream.write_all(&reply).await;
                } else {
                    // Hold the connection open without answering.
                    futures_util::future::pending::<()>().await;
                }
            });
            Ok(client)
        })
    }
}

//--- HttpsTransport for DoH

/// The body type of mock DoH responses.
pub struct MockBody(Option<Bytes>);

impl HttpsBody for MockBody {
    fn chunk(
        &mut self,
    ) -> std::pin::Pin<
        Box<
            dyn std::future::Future<
                    Output = Result<Option<Bytes>, io::Error>,
                > + Send
                + '_,
        >,
    > {
        Box::pin(async move { Ok(self.0.take()) })
    }
}

impl HttpsTransport for MockNet {
    type Body = MockBody;

    fn send(
        &self,
        request: HttpsRequest,
    ) -> IoFuture<HttpsReply<MockBody>> {
        let server = self.doh_server(&request.url);
        Box::pin(async move {
            let server = server.ok_or_else(|| {
                io::Error::from(io::ErrorKind::ConnectionRefused)
            })?;
            if let Some(kind) = server.take_failure() {
                return Err(io::Error::from(kind));
            }
            let query = if request.use_post {
                parse_query(&request.body)
            } else {
                let encoded = request
                    .url
                    .split("dns=")
                    .nth(1)
                    .unwrap_or("")
                    .split('&')
                    .next()
                    .unwrap_or("");
                use base64::engine::general_purpose::URL_SAFE_NO_PAD;
                use base64::Engine;
                let bytes = URL_SAFE_NO_PAD
                    .decode(encoded)
                    .expect("base64url query");
                parse_query(&bytes)
            };
            match server.handle(query).await {
                Some(reply) => Ok(HttpsReply::Response {
                    status: 200,
                    content_type: Some(
                        "application/dns-message".into(),
                    ),
                    content_length: Some(reply.len() as u64),
                    body: MockBody(Some(reply)),
                }),
                None => {
                    futures_util::future::pending::<()>().await;
                    unreachable!()
                }
            }
        })
    }
}
