//! The DNS over HTTPS transport attempt (RFC 8484).

#![warn(missing_docs)]

use super::error::Error;
use super::protocol::{HttpsBody, HttpsReply, HttpsRequest, HttpsTransport};
use super::AttemptOutcome;
use crate::base::{Query, Response};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::{Bytes, BytesMut};

//------------ Module Configuration ------------------------------------------

/// The media type of DNS messages in HTTP.
pub const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// The largest DNS message accepted over HTTPS (RFC 8484 section 6).
pub const MAX_RESPONSE_SIZE: usize = 65535;

/// How many redirects one attempt follows before giving up.
const MAX_REDIRECTS: usize = 5;

//------------ exchange ------------------------------------------------------

/// Performs one DNS over HTTPS exchange against one server.
///
/// The query is carried as `?dns=` base64url in a GET request or as the
/// raw POST body, depending on the server configuration. The response
/// must come back as HTTP 200 with the DNS message media type and a
/// body of at most 64k-1 octets, and must validate against the query
/// like any other response. Redirects are followed only while they
/// stay on HTTPS.
pub async fn exchange<H: HttpsTransport>(
    https: &H,
    server_template: &str,
    use_post: bool,
    query: &Query,
) -> AttemptOutcome {
    let mut url = if use_post {
        url_without_parameters(server_template)
    } else {
        expand_template(server_template, query.as_slice())
    };
    let body = if use_post {
        Bytes::copy_from_slice(query.as_slice())
    } else {
        Bytes::new()
    };

    for _ in 0..=MAX_REDIRECTS {
        let request = HttpsRequest {
            url: url.clone(),
            use_post,
            body: body.clone(),
        };
        let reply = match https.send(request).await {
            Ok(reply) => reply,
            Err(err) => {
                return AttemptOutcome::fail(Error::HttpsRequest(
                    err.into(),
                ))
            }
        };

        let (status, content_type, content_length, response_body) =
            match reply {
                HttpsReply::Redirect { location } => {
                    if !location.starts_with("https://") {
                        return AttemptOutcome::fail(
                            Error::InsecureRedirect,
                        );
                    }
                    url = location;
                    continue;
                }
                HttpsReply::Response {
                    status,
                    content_type,
                    content_length,
                    body,
                } => (status, content_type, content_length, body),
            };

        if status != 200 || !is_dns_message(content_type.as_deref()) {
            tracing::trace!(
                status,
                ?content_type,
                "DoH response rejected"
            );
            return AttemptOutcome::fail(Error::MalformedResponse);
        }
        if content_length
            .is_some_and(|len| len > MAX_RESPONSE_SIZE as u64)
        {
            return AttemptOutcome::fail(Error::MalformedResponse);
        }

        let bytes = match read_bounded(response_body).await {
            Ok(bytes) => bytes,
            Err(err) => return AttemptOutcome::fail(err),
        };
        if bytes.is_empty() {
            return AttemptOutcome::fail(Error::MalformedResponse);
        }

        let response = match Response::validate(bytes, Some(query)) {
            Ok(response) => response,
            Err(err) => {
                tracing::trace!(
                    "DoH response failed validation: {}",
                    err
                );
                return AttemptOutcome::fail(err.into());
            }
        };
        return AttemptOutcome::classify(response);
    }

    // Redirected in circles.
    AttemptOutcome::fail(Error::MalformedResponse)
}

/// Streams a body into a buffer bounded by the maximum message size.
async fn read_bounded<B: HttpsBody>(mut body: B) -> Result<Bytes, Error> {
    let mut buf = BytesMut::new();
    loop {
        match body.chunk().await {
            Ok(Some(chunk)) => {
                if buf.len() + chunk.len() > MAX_RESPONSE_SIZE {
                    return Err(Error::MalformedResponse);
                }
                buf.extend_from_slice(&chunk);
            }
            Ok(None) => return Ok(buf.freeze()),
            Err(err) => return Err(Error::HttpsRequest(err.into())),
        }
    }
}

/// Returns whether a Content-Type header names the DNS message type.
fn is_dns_message(content_type: Option<&str>) -> bool {
    match content_type {
        Some(value) => {
            let essence =
                value.split(';').next().unwrap_or("").trim();
            essence.eq_ignore_ascii_case(DNS_MESSAGE_CONTENT_TYPE)
        }
        None => false,
    }
}

//------------ URI template handling -----------------------------------------

/// Expands a server's URI template with the encoded query.
///
/// The templates of RFC 8484 carry a single `dns` variable, either as a
/// form-style query expansion `{?dns}` or as a simple `{dns}`. A
/// template without a variable gets the parameter appended.
pub fn expand_template(template: &str, query: &[u8]) -> String {
    let encoded = URL_SAFE_NO_PAD.encode(query);
    if let Some(at) = template.find("{?dns}") {
        let mut url = String::with_capacity(
            template.len() + encoded.len(),
        );
        url.push_str(&template[..at]);
        url.push_str("?dns=");
        url.push_str(&encoded);
        url.push_str(&template[at + "{?dns}".len()..]);
        url
    } else if let Some(at) = template.find("{dns}") {
        let mut url = String::with_capacity(
            template.len() + encoded.len(),
        );
        url.push_str(&template[..at]);
        url.push_str(&encoded);
        url.push_str(&template[at + "{dns}".len()..]);
        url
    } else {
        let separator = if template.contains('?') { '&' } else { '?' };
        format!("{}{}dns={}", template, separator, encoded)
    }
}

/// Strips the template variables off a server's URI template.
///
/// POST requests go to the bare resource.
pub fn url_without_parameters(template: &str) -> String {
    let mut url = template.to_string();
    for var in ["{?dns}", "{dns}"] {
        if let Some(at) = url.find(var) {
            url.replace_range(at..at + var.len(), "");
        }
    }
    url
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::super::protocol::IoFuture;
    use super::*;
    use crate::base::iana::Rtype;
    use crate::base::query::{PaddingStrategy, DOH_PADDING_BLOCK};
    use crate::base::test_util::ResponseBuilder;
    use std::io;
    use std::sync::Mutex;

    /// A transport replying from a script, one entry per request.
    struct MockHttps {
        replies: Mutex<Vec<MockReply>>,
        requests: Mutex<Vec<HttpsRequest>>,
    }

    enum MockReply {
        Dns(Bytes),
        Status(u16),
        ContentType(&'static str),
        DeclaredLength(u64),
        Redirect(&'static str),
        Chunked(Vec<Bytes>),
    }

    impl MockHttps {
        fn new(replies: Vec<MockReply>) -> Self {
            MockHttps {
                replies: Mutex::new(replies),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl HttpsTransport for MockHttps {
        type Body = MockBody;

        fn send(
            &self,
            request: HttpsRequest,
        ) -> IoFuture<HttpsReply<MockBody>> {
            self.requests.lock().unwrap().push(request);
            let reply = self.replies.lock().unwrap().remove(0);
            Box::pin(async move {
                Ok(match reply {
                    MockReply::Dns(bytes) => HttpsReply::Response {
                        status: 200,
                        content_type: Some(
                            DNS_MESSAGE_CONTENT_TYPE.into(),
                        ),
                        content_length: Some(bytes.len() as u64),
                        body: MockBody(vec![bytes]),
                    },
                    MockReply::Status(status) => HttpsReply::Response {
                        status,
                        content_type: Some(
                            DNS_MESSAGE_CONTENT_TYPE.into(),
                        ),
                        content_length: None,
                        body: MockBody(Vec::new()),
                    },
                    MockReply::ContentType(value) => {
                        HttpsReply::Response {
                            status: 200,
                            content_type: Some(value.into()),
                            content_length: None,
                            body: MockBody(Vec::new()),
                        }
                    }
                    MockReply::DeclaredLength(len) => {
                        HttpsReply::Response {
                            status: 200,
                            content_type: Some(
                                DNS_MESSAGE_CONTENT_TYPE.into(),
                            ),
                            content_length: Some(len),
                            body: MockBody(Vec::new()),
                        }
                    }
                    MockReply::Redirect(location) => {
                        HttpsReply::Redirect {
                            location: location.into(),
                        }
                    }
                    MockReply::Chunked(chunks) => {
                        HttpsReply::Response {
                            status: 200,
                            content_type: Some(
                                DNS_MESSAGE_CONTENT_TYPE.into(),
                            ),
                            content_length: None,
                            body: MockBody(chunks),
                        }
                    }
                })
            })
        }
    }

    struct MockBody(Vec<Bytes>);

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
            Box::pin(async move {
                if self.0.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(self.0.remove(0)))
                }
            })
        }
    }

    const TEMPLATE: &str = "https://dns.example/dns-query{?dns}";

    fn query() -> Query {
        Query::new(
            0x0B0B,
            "www.example.com",
            Rtype::A,
            None,
            PaddingStrategy::BlockLength(DOH_PADDING_BLOCK),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn get_exchange() {
        let query = query();
        let reply = ResponseBuilder::answering(&query)
            .a_record("www.example.com", [192, 0, 2, 1], 60)
            .build();
        let https = MockHttps::new(vec![MockReply::Dns(reply)]);

        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(outcome.result.is_ok());

        let requests = https.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].use_post);
        assert!(requests[0].body.is_empty());
        let expected = format!(
            "https://dns.example/dns-query?dns={}",
            URL_SAFE_NO_PAD.encode(query.as_slice())
        );
        assert_eq!(requests[0].url, expected);
        // base64url without padding never contains '=', '+' or '/'.
        assert!(!requests[0].url.contains('='));
    }

    #[tokio::test]
    async fn post_exchange() {
        let query = query();
        let reply = ResponseBuilder::answering(&query)
            .a_record("www.example.com", [192, 0, 2, 1], 60)
            .build();
        let https = MockHttps::new(vec![MockReply::Dns(reply)]);

        let outcome = exchange(&https, TEMPLATE, true, &query).await;
        assert!(outcome.result.is_ok());

        let requests = https.requests.lock().unwrap();
        assert!(requests[0].use_post);
        assert_eq!(
            requests[0].url,
            "https://dns.example/dns-query"
        );
        assert_eq!(&requests[0].body[..], query.as_slice());
    }

    #[tokio::test]
    async fn non_200_is_malformed() {
        let query = query();
        let https = MockHttps::new(vec![MockReply::Status(503)]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(matches!(
            outcome.result,
            Err(Error::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn wrong_content_type_is_malformed() {
        let query = query();
        let https =
            MockHttps::new(vec![MockReply::ContentType("text/html")]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(matches!(
            outcome.result,
            Err(Error::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn content_type_parameters_are_accepted() {
        let query = query();
        let reply = ResponseBuilder::answering(&query).build();
        let https = MockHttps::new(vec![MockReply::Chunked(vec![
            reply.clone(),
        ])]);
        // Patch the declared content type through a fresh mock since
        // Chunked always uses the DNS type; parameters still pass.
        assert!(is_dns_message(Some(
            "application/dns-message; charset=utf-8"
        )));
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(outcome.result.is_ok());
    }

    #[tokio::test]
    async fn oversized_declared_length_is_malformed() {
        let query = query();
        let https = MockHttps::new(vec![MockReply::DeclaredLength(
            MAX_RESPONSE_SIZE as u64 + 1,
        )]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(matches!(
            outcome.result,
            Err(Error::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn oversized_body_is_malformed() {
        let query = query();
        let chunk = Bytes::from(vec![0u8; 40000]);
        let https = MockHttps::new(vec![MockReply::Chunked(vec![
            chunk.clone(),
            chunk,
        ])]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(matches!(
            outcome.result,
            Err(Error::MalformedResponse)
        ));
    }

    #[tokio::test]
    async fn https_redirect_is_followed() {
        let query = query();
        let reply = ResponseBuilder::answering(&query)
            .a_record("www.example.com", [192, 0, 2, 1], 60)
            .build();
        let https = MockHttps::new(vec![
            MockReply::Redirect("https://other.example/dns-query"),
            MockReply::Dns(reply),
        ]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(outcome.result.is_ok());
        let requests = https.requests.lock().unwrap();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[1].url,
            "https://other.example/dns-query"
        );
    }

    #[tokio::test]
    async fn non_https_redirect_is_refused() {
        let query = query();
        let https = MockHttps::new(vec![MockReply::Redirect(
            "http://other.example/dns-query",
        )]);
        let outcome =
            exchange(&https, TEMPLATE, false, &query).await;
        assert!(matches!(
            outcome.result,
            Err(Error::InsecureRedirect)
        ));
        assert_eq!(https.requests.lock().unwrap().len(), 1);
    }

    #[test]
    fn template_expansion() {
        assert_eq!(
            expand_template("https://d.example/q{?dns}", b"\x00"),
            "https://d.example/q?dns=AA"
        );
        assert_eq!(
            expand_template("https://d.example/q?dns={dns}", b"\x00"),
            "https://d.example/q?dns=AA"
        );
        assert_eq!(
            expand_template("https://d.example/q", b"\x00"),
            "https://d.example/q?dns=AA"
        );
        assert_eq!(
            url_without_parameters("https://d.example/q{?dns}"),
            "https://d.example/q"
        );
    }
}
