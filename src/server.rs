//! HTTP control server.
//!
//! Two fixed routes:
//!
//! | Method | Path           | Effect                                   |
//! |--------|----------------|------------------------------------------|
//! | GET    | `/`            | liveness, `200 Server is running!`       |
//! | POST   | `/send-signal` | `{"device": n}` → mapped code on the link |
//!
//! The server does no concurrency of its own and handles one client at a
//! time. Each [`ControlServer::poll`] does a bounded amount of work: it
//! accepts a client if none is in flight, reads at most once (and only when
//! the read would not wait), and answers and closes once the request is
//! complete. A partial request is kept for the next poll. A client that has
//! not delivered a complete request within [`HTTP_REQUEST_POLLS`] polls is
//! answered with `408`.

use core::fmt::Write as _;

use embedded_io_async::Write;
use heapless::String;

use crate::config::{HTTP_MAX_HEADERS, HTTP_MAX_REQUEST, HTTP_REQUEST_POLLS};
use crate::error::{LinkError, PollError, RequestError, ServerError};
use crate::link::{LinkChannel, LinkTransport};
use crate::signal::{DeviceMapping, SignalCommand};
use crate::socket::{Connection, Listener, SocketFactory};

/// Response status codes the server emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Status {
    Ok,
    BadRequest,
    NotFound,
    MethodNotAllowed,
    RequestTimeout,
    PayloadTooLarge,
    BadGateway,
    ServiceUnavailable,
}

impl Status {
    pub fn code(self) -> u16 {
        match self {
            Status::Ok => 200,
            Status::BadRequest => 400,
            Status::NotFound => 404,
            Status::MethodNotAllowed => 405,
            Status::RequestTimeout => 408,
            Status::PayloadTooLarge => 413,
            Status::BadGateway => 502,
            Status::ServiceUnavailable => 503,
        }
    }

    pub fn reason(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::BadRequest => "Bad Request",
            Status::NotFound => "Not Found",
            Status::MethodNotAllowed => "Method Not Allowed",
            Status::RequestTimeout => "Request Timeout",
            Status::PayloadTooLarge => "Payload Too Large",
            Status::BadGateway => "Bad Gateway",
            Status::ServiceUnavailable => "Service Unavailable",
        }
    }

    pub fn is_success(self) -> bool {
        self == Status::Ok
    }
}

/// A plain-text response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    pub body: &'static str,
}

impl Response {
    pub const fn new(status: Status, body: &'static str) -> Self {
        Self { status, body }
    }
}

impl From<RequestError> for Response {
    fn from(e: RequestError) -> Self {
        match e {
            RequestError::BadBody => Response::new(Status::BadRequest, "Invalid JSON body"),
            RequestError::MissingDevice => Response::new(Status::BadRequest, "Missing device ID"),
            RequestError::UnknownDevice(_) | RequestError::DeviceOutOfRange(_) => {
                Response::new(Status::NotFound, "Unknown device ID")
            }
        }
    }
}

impl From<LinkError> for Response {
    fn from(e: LinkError) -> Self {
        match e {
            LinkError::NotConnected | LinkError::AdvertiseFailed => {
                Response::new(Status::ServiceUnavailable, "Link not connected")
            }
            LinkError::WriteFailed => Response::new(Status::BadGateway, "Link write failed"),
        }
    }
}

/// A fully received request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Request<'a> {
    pub method: &'a str,
    /// Path without any query string.
    pub path: &'a str,
    pub body: &'a [u8],
}

/// Outcome of parsing the bytes received so far.
#[derive(Debug, PartialEq, Eq)]
pub enum Parse<'a> {
    Complete(Request<'a>),
    /// Need more bytes.
    Partial,
    /// The request can never fit in `capacity` bytes.
    TooLarge,
    Invalid,
}

/// Parse `buf` as an HTTP/1.x request whose head and body must fit in
/// `capacity` bytes.
pub fn parse_request(buf: &[u8], capacity: usize) -> Parse<'_> {
    let mut headers = [httparse::EMPTY_HEADER; HTTP_MAX_HEADERS];
    let mut req = httparse::Request::new(&mut headers);

    let head_len = match req.parse(buf) {
        Ok(httparse::Status::Complete(n)) => n,
        Ok(httparse::Status::Partial) => {
            return if buf.len() >= capacity {
                Parse::TooLarge
            } else {
                Parse::Partial
            };
        }
        Err(_) => return Parse::Invalid,
    };

    let mut content_length = 0usize;
    for header in req.headers.iter() {
        if header.name.eq_ignore_ascii_case("content-length") {
            let parsed = core::str::from_utf8(header.value)
                .ok()
                .and_then(|v| v.trim().parse::<usize>().ok());
            match parsed {
                Some(n) => content_length = n,
                None => return Parse::Invalid,
            }
        }
    }

    let body_end = match head_len.checked_add(content_length) {
        Some(end) if end <= capacity => end,
        _ => return Parse::TooLarge,
    };
    if buf.len() < body_end {
        return Parse::Partial;
    }

    let (Some(method), Some(target)) = (req.method, req.path) else {
        return Parse::Invalid;
    };
    let path = target.split('?').next().unwrap_or(target);

    Parse::Complete(Request {
        method,
        path,
        body: &buf[head_len..body_end],
    })
}

/// Dispatch a request to one of the two routes.
pub async fn route<T: LinkTransport>(
    req: &Request<'_>,
    mapping: &DeviceMapping,
    link: &mut LinkChannel<T>,
) -> Response {
    match (req.method, req.path) {
        ("GET", "/") => Response::new(Status::Ok, "Server is running!"),
        ("POST", "/send-signal") => send_signal(req.body, mapping, link).await,
        (_, "/") | (_, "/send-signal") => {
            Response::new(Status::MethodNotAllowed, "Method not allowed")
        }
        _ => Response::new(Status::NotFound, "Not found"),
    }
}

async fn send_signal<T: LinkTransport>(
    body: &[u8],
    mapping: &DeviceMapping,
    link: &mut LinkChannel<T>,
) -> Response {
    let command = match SignalCommand::from_json(body) {
        Ok(command) => command,
        Err(e) => return e.into(),
    };
    let code = match mapping.resolve(command) {
        Ok(code) => code,
        Err(e) => {
            warn!("http: {}", e);
            return e.into();
        }
    };

    match link.write(&[code]).await {
        Ok(()) => {
            info!("signal: device {} -> '{}'", command.device_id, code as char);
            Response::new(Status::Ok, "Signal sent successfully")
        }
        Err(e) => {
            warn!("signal: device {} not sent: {}", command.device_id, e);
            e.into()
        }
    }
}

/// Summary of one served request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Exchange {
    pub status: Status,
}

/// A client whose request is still arriving.
struct InFlight<C> {
    conn: C,
    buf: [u8; HTTP_MAX_REQUEST],
    filled: usize,
    polls: u16,
}

enum Progress {
    Waiting,
    Respond(Response),
}

impl<C: Connection> InFlight<C> {
    fn new(conn: C) -> Self {
        Self {
            conn,
            buf: [0; HTTP_MAX_REQUEST],
            filled: 0,
            polls: 0,
        }
    }

    /// One read at most, then route if the request is complete.
    async fn advance<T: LinkTransport>(
        &mut self,
        mapping: &DeviceMapping,
        link: &mut LinkChannel<T>,
    ) -> Result<Progress, PollError> {
        self.polls = self.polls.saturating_add(1);

        if self.conn.readable().await.map_err(|_| PollError::Read)? {
            let n = self
                .conn
                .read(&mut self.buf[self.filled..])
                .await
                .map_err(|_| PollError::Read)?;
            if n == 0 {
                return Err(PollError::Disconnected);
            }
            self.filled += n;

            match parse_request(&self.buf[..self.filled], HTTP_MAX_REQUEST) {
                Parse::Complete(req) => {
                    let response = route(&req, mapping, link).await;
                    info!(
                        "http: {} {} -> {}",
                        req.method,
                        req.path,
                        response.status.code()
                    );
                    return Ok(Progress::Respond(response));
                }
                Parse::Partial => {}
                Parse::TooLarge => {
                    return Ok(Progress::Respond(Response::new(
                        Status::PayloadTooLarge,
                        "Request too large",
                    )))
                }
                Parse::Invalid => {
                    return Ok(Progress::Respond(Response::new(
                        Status::BadRequest,
                        "Bad request",
                    )))
                }
            }
        }

        if self.polls >= HTTP_REQUEST_POLLS {
            warn!("http: request incomplete after {} polls", self.polls);
            return Ok(Progress::Respond(Response::new(
                Status::RequestTimeout,
                "Request timeout",
            )));
        }
        Ok(Progress::Waiting)
    }
}

pub struct ControlServer<L: Listener> {
    listener: L,
    mapping: DeviceMapping,
    port: u16,
    in_flight: Option<InFlight<L::Connection>>,
}

impl<L: Listener> ControlServer<L> {
    /// Listen on `port` using sockets from `factory`.
    pub async fn bind<F>(factory: &mut F, port: u16, mapping: DeviceMapping) -> Result<Self, ServerError>
    where
        F: SocketFactory<Listener = L>,
    {
        let listener = factory
            .listen(port)
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        info!("http: listening on port {}", port);
        Ok(Self {
            listener,
            mapping,
            port,
            in_flight: None,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Whether a client's request is still arriving.
    pub fn in_flight(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Advance the current client by one step, accepting one if idle.
    ///
    /// `Ok(None)` means nobody was waiting or the request is not complete
    /// yet; `Ok(Some(_))` means a response was sent and the client closed.
    pub async fn poll<T: LinkTransport>(
        &mut self,
        link: &mut LinkChannel<T>,
    ) -> Result<Option<Exchange>, PollError> {
        let mut client = match self.in_flight.take() {
            Some(client) => client,
            None => match self.listener.accept().await.map_err(PollError::Accept)? {
                Some(conn) => InFlight::new(conn),
                None => return Ok(None),
            },
        };

        let result = match client.advance(&self.mapping, link).await {
            Ok(Progress::Waiting) => {
                self.in_flight = Some(client);
                return Ok(None);
            }
            Ok(Progress::Respond(response)) => write_response(&mut client.conn, &response)
                .await
                .map(|()| {
                    Some(Exchange {
                        status: response.status,
                    })
                }),
            Err(e) => Err(e),
        };

        if let Err(e) = client.conn.close().await {
            debug!("http: close failed: {}", e);
        }
        result
    }
}

async fn write_response<C: Write>(conn: &mut C, response: &Response) -> Result<(), PollError> {
    let mut head: String<128> = String::new();
    write!(
        head,
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status.code(),
        response.status.reason(),
        response.body.len()
    )
    .map_err(|_| PollError::Write)?;

    conn.write_all(head.as_bytes())
        .await
        .map_err(|_| PollError::Write)?;
    conn.write_all(response.body.as_bytes())
        .await
        .map_err(|_| PollError::Write)?;
    conn.flush().await.map_err(|_| PollError::Write)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::ConnectionPhase;
    use crate::mock::{connected_link, MockConn, MockLink, MockListener, MockSockets};
    use embassy_futures::block_on;

    fn post_signal(body: &str) -> std::string::String {
        format!(
            "POST /send-signal HTTP/1.1\r\nHost: bridge\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        )
    }

    fn route_raw(raw: &str, link: &mut LinkChannel<MockLink>) -> Response {
        match parse_request(raw.as_bytes(), HTTP_MAX_REQUEST) {
            Parse::Complete(req) => block_on(route(&req, &DeviceMapping::DEFAULT, link)),
            other => panic!("unexpected parse outcome {:?}", other),
        }
    }

    // ════════════════════════════════════════════════════════════════════════
    // Parsing
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn parse_get_without_body() {
        let raw = b"GET / HTTP/1.1\r\nHost: x\r\n\r\n";
        assert_eq!(
            parse_request(raw, HTTP_MAX_REQUEST),
            Parse::Complete(Request {
                method: "GET",
                path: "/",
                body: b"",
            })
        );
    }

    #[test]
    fn parse_waits_for_full_body() {
        let raw = b"POST /send-signal HTTP/1.1\r\nContent-Length: 13\r\n\r\n{\"device\"";
        assert_eq!(parse_request(raw, HTTP_MAX_REQUEST), Parse::Partial);
        assert_eq!(parse_request(b"GET / HT", HTTP_MAX_REQUEST), Parse::Partial);
    }

    #[test]
    fn parse_strips_query_string() {
        let raw = b"GET /?verbose=1 HTTP/1.1\r\n\r\n";
        match parse_request(raw, HTTP_MAX_REQUEST) {
            Parse::Complete(req) => assert_eq!(req.path, "/"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_rejects_oversized_body() {
        let raw = b"POST /send-signal HTTP/1.1\r\nContent-Length: 5000\r\n\r\n";
        assert_eq!(parse_request(raw, HTTP_MAX_REQUEST), Parse::TooLarge);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(parse_request(b"\x00\x01\r\n\r\n", HTTP_MAX_REQUEST), Parse::Invalid);
        let bad_len = b"POST /send-signal HTTP/1.1\r\nContent-Length: ten\r\n\r\n";
        assert_eq!(parse_request(bad_len, HTTP_MAX_REQUEST), Parse::Invalid);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Routing
    // ════════════════════════════════════════════════════════════════════════

    #[test]
    fn root_reports_running() {
        let mut link = LinkChannel::new(MockLink::default());
        let resp = route_raw("GET / HTTP/1.1\r\n\r\n", &mut link);
        assert_eq!(resp, Response::new(Status::Ok, "Server is running!"));
        assert!(link.transport().written.is_empty());
    }

    #[test]
    fn every_mapped_device_writes_its_code_once() {
        for (device, code) in [(1, b'A'), (2, b'B'), (3, b'C'), (4, b'D')] {
            let mut link = connected_link();
            let body = format!("{{\"device\": {}}}", device);
            let resp = route_raw(&post_signal(&body), &mut link);
            assert_eq!(resp, Response::new(Status::Ok, "Signal sent successfully"));
            assert_eq!(link.transport().written.as_slice(), &[code]);
            assert_eq!(link.transport().send_calls, 1);
        }
    }

    #[test]
    fn unmapped_device_is_4xx_without_write() {
        for device in [0, 5, 99, -3] {
            let mut link = connected_link();
            let body = format!("{{\"device\": {}}}", device);
            let resp = route_raw(&post_signal(&body), &mut link);
            assert_eq!(resp, Response::new(Status::NotFound, "Unknown device ID"));
            assert_eq!(link.transport().send_calls, 0);
        }
    }

    #[test]
    fn non_integer_device_is_missing_id() {
        let mut link = connected_link();
        let resp = route_raw(&post_signal(r#"{"device":"x"}"#), &mut link);
        assert_eq!(resp, Response::new(Status::BadRequest, "Missing device ID"));
    }

    #[test]
    fn device_past_i64_is_unknown_not_missing() {
        let mut link = connected_link();
        let resp = route_raw(&post_signal(r#"{"device": 18446744073709551615}"#), &mut link);
        assert_eq!(resp, Response::new(Status::NotFound, "Unknown device ID"));
        assert_eq!(link.transport().send_calls, 0);
    }

    #[test]
    fn malformed_json_is_invalid_body() {
        let mut link = connected_link();
        let resp = route_raw(&post_signal("{device: 1"), &mut link);
        assert_eq!(resp, Response::new(Status::BadRequest, "Invalid JSON body"));
        assert_eq!(link.transport().send_calls, 0);
    }

    #[test]
    fn signal_while_not_connected_is_unavailable() {
        let mut link = LinkChannel::new(MockLink::default());
        block_on(link.start_advertising()).unwrap();
        assert_eq!(link.phase(), ConnectionPhase::Advertising);

        let resp = route_raw(&post_signal(r#"{"device": 1}"#), &mut link);
        assert_eq!(resp.status, Status::ServiceUnavailable);
        assert!(!resp.status.is_success());
        assert_eq!(link.transport().send_calls, 0);
    }

    #[test]
    fn rejected_write_is_bad_gateway() {
        let mut link = connected_link();
        link.transport_mut().fail_send = true;
        let resp = route_raw(&post_signal(r#"{"device": 2}"#), &mut link);
        assert_eq!(resp, Response::new(Status::BadGateway, "Link write failed"));
    }

    #[test]
    fn unknown_path_and_wrong_method() {
        let mut link = connected_link();
        assert_eq!(
            route_raw("GET /favicon.ico HTTP/1.1\r\n\r\n", &mut link).status,
            Status::NotFound
        );
        assert_eq!(
            route_raw("GET /send-signal HTTP/1.1\r\n\r\n", &mut link).status,
            Status::MethodNotAllowed
        );
        assert_eq!(link.transport().send_calls, 0);
    }

    // ════════════════════════════════════════════════════════════════════════
    // Poll loop
    // ════════════════════════════════════════════════════════════════════════

    fn bound_server(listener: MockListener) -> ControlServer<MockListener> {
        let mut sockets = MockSockets::with_listener(listener);
        block_on(ControlServer::bind(&mut sockets, 80, DeviceMapping::DEFAULT)).unwrap()
    }

    #[test]
    fn poll_without_client_returns_none() {
        let mut server = bound_server(MockListener::default());
        let mut link = connected_link();
        assert_eq!(block_on(server.poll(&mut link)), Ok(None));
    }

    #[test]
    fn poll_serves_one_request_and_closes() {
        let mut listener = MockListener::default();
        listener.push(MockConn::chunked(&[
            "POST /send-signal HTTP/1.1\r\nContent-Length: 13\r\n\r\n",
            "{\"device\": 1}",
        ]));
        listener.push(MockConn::chunked(&["GET / HTTP/1.1\r\n\r\n"]));
        let mut server = bound_server(listener);
        let mut link = connected_link();

        // Head arrives on the first poll, body on the second.
        assert_eq!(block_on(server.poll(&mut link)), Ok(None));
        assert!(server.in_flight());
        assert!(link.transport().written.is_empty());

        let first = block_on(server.poll(&mut link)).unwrap();
        assert_eq!(first, Some(Exchange { status: Status::Ok }));
        assert!(!server.in_flight());
        assert_eq!(link.transport().written.as_slice(), b"A");

        let sent = server.listener.closed.borrow();
        assert_eq!(sent.len(), 1);
        let text = core::str::from_utf8(&sent[0]).unwrap();
        assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(text.contains("Content-Length: 24\r\n"));
        assert!(text.ends_with("\r\n\r\nSignal sent successfully"));
        drop(sent);

        // The second client is still queued.
        assert_eq!(server.listener.pending.len(), 1);
    }

    #[test]
    fn poll_reports_client_hangup() {
        let mut listener = MockListener::default();
        listener.push(MockConn::chunked(&["POST /send-signal HTTP/1.1\r\n"]));
        let mut server = bound_server(listener);
        let mut link = connected_link();

        assert_eq!(block_on(server.poll(&mut link)), Ok(None));
        assert_eq!(block_on(server.poll(&mut link)), Err(PollError::Disconnected));
        assert_eq!(server.listener.closed.borrow().len(), 1);
        assert!(!server.in_flight());
    }

    #[test]
    fn slow_client_costs_one_read_per_poll() {
        let request = post_signal(r#"{"device": 4}"#);
        let mut listener = MockListener::default();
        listener.push(MockConn::trickle(&request));
        let reads = listener.pending[0].reads();
        let mut server = bound_server(listener);
        let mut link = connected_link();

        let mut polls = 0;
        let exchange = loop {
            polls += 1;
            let before = reads.get();
            let outcome = block_on(server.poll(&mut link)).unwrap();
            assert_eq!(reads.get() - before, 1);
            if let Some(exchange) = outcome {
                break exchange;
            }
            assert!(link.transport().written.is_empty());
        };

        assert_eq!(exchange.status, Status::Ok);
        assert_eq!(polls, request.len());
        assert_eq!(link.transport().written.as_slice(), b"D");
    }

    #[test]
    fn stalled_client_times_out_with_408() {
        let mut listener = MockListener::default();
        listener.push(MockConn::stalled_after("POST /send-signal HTTP/1.1\r\n"));
        listener.push(MockConn::chunked(&["GET / HTTP/1.1\r\n\r\n"]));
        let mut server = bound_server(listener);
        let mut link = connected_link();

        for _ in 1..HTTP_REQUEST_POLLS {
            assert_eq!(block_on(server.poll(&mut link)), Ok(None));
        }
        // Nobody else is accepted while a request is in flight.
        assert_eq!(server.listener.pending.len(), 1);

        let last = block_on(server.poll(&mut link)).unwrap();
        assert_eq!(last, Some(Exchange { status: Status::RequestTimeout }));
        let sent = server.listener.closed.borrow().clone();
        assert!(core::str::from_utf8(&sent[0])
            .unwrap()
            .starts_with("HTTP/1.1 408 Request Timeout\r\n"));
        assert!(link.transport().written.is_empty());

        let next = block_on(server.poll(&mut link)).unwrap();
        assert_eq!(next, Some(Exchange { status: Status::Ok }));
    }

    #[test]
    fn poll_surfaces_accept_failure() {
        let mut listener = MockListener::default();
        listener.fail_accept = true;
        let mut server = bound_server(listener);
        let mut link = connected_link();

        assert!(matches!(
            block_on(server.poll(&mut link)),
            Err(PollError::Accept(_))
        ));
    }

    #[test]
    fn bind_failure_names_port() {
        let mut sockets = MockSockets::refusing();
        let result = block_on(ControlServer::bind(&mut sockets, 8080, DeviceMapping::DEFAULT));
        assert!(matches!(
            result,
            Err(ServerError::Bind { port: 8080, .. })
        ));
    }
}
