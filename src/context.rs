use std::any::Any;
use std::error::Error;
use std::mem;
use std::sync::Arc;

use hyper::header::{self, HeaderName, HeaderValue};
use hyper::StatusCode;
use serde::Serialize;

use crate::config::RouterConfig;
use crate::error::{ChainError, ErrorKind, ErrorList};
use crate::handler::{self, Handler, HandlersChain};
use crate::http::{ConnectionInfo, Request};
use crate::params::Params;
use crate::writer::ResponseWriter;

/// Cursor value marking an aborted chain. Larger than any real chain.
const ABORT_INDEX: usize = usize::MAX / 2;

const PLAIN_TEXT: &str = "text/plain; charset=utf-8";
const JSON: &str = "application/json; charset=utf-8";

/// Per-request state handed to every handler of a chain.
///
/// Handlers run in order. A handler may call [`next`](Self::next) to run the
/// rest of the chain before continuing with its own code, and may
/// [`abort`](Self::abort) to stop handlers that have not started yet.
///
/// Contexts are pooled by the dispatcher and reset before each request.
pub struct Context {
    config: Arc<RouterConfig>,
    request: Request,
    writer: ResponseWriter,
    handlers: HandlersChain,
    cursor: usize,
    params: Params,
    keys: Vec<(String, Box<dyn Any + Send + Sync>)>,
    errors: ErrorList,
}

impl Context {
    pub(crate) fn new(config: Arc<RouterConfig>) -> Self {
        Self {
            config,
            request: Request::default(),
            writer: ResponseWriter::default(),
            handlers: empty_chain(),
            cursor: 0,
            params: Params::new(),
            keys: Vec::new(),
            errors: ErrorList::default(),
        }
    }

    /// Clears everything left over from the previous request.
    pub(crate) fn reset(&mut self) {
        self.request = Request::default();
        self.writer.reset();
        self.handlers = empty_chain();
        self.cursor = 0;
        self.params.clear();
        self.keys.clear();
        self.errors.clear();
    }

    pub(crate) fn bind(&mut self, request: Request, handlers: HandlersChain) {
        self.request = request;
        self.handlers = handlers;
        self.cursor = 0;
    }

    /// Clears the response and routing state for another pass over the
    /// current request, which is handed back along with the chain position
    /// to restore afterwards. Stored keys survive.
    pub(crate) fn rewind(&mut self) -> (Request, usize) {
        let cursor = self.cursor;
        self.writer.reset();
        self.handlers = empty_chain();
        self.cursor = 0;
        self.params.clear();
        self.errors.clear();
        (mem::take(&mut self.request), cursor)
    }

    pub(crate) fn restore_cursor(&mut self, cursor: usize) {
        self.cursor = cursor;
    }

    pub(crate) fn params_mut(&mut self) -> &mut Params {
        &mut self.params
    }

    /*
     * Flow control
     */

    /// Runs the handlers after the current one.
    ///
    /// Only meaningful inside middleware: code after the call runs once the
    /// rest of the chain has returned.
    pub fn next(&mut self) {
        let handlers = Arc::clone(&self.handlers);
        while self.cursor < handlers.len() {
            let current = self.cursor;
            self.cursor += 1;
            handlers[current].call(self);
        }
    }

    /// Prevents pending handlers from running.
    ///
    /// Handlers already suspended in [`next`](Self::next) still finish.
    pub fn abort(&mut self) {
        self.cursor = ABORT_INDEX;
    }

    pub fn abort_with_status(&mut self, code: u16) {
        self.status(code);
        self.writer.write_header_now();
        self.abort();
    }

    /// Aborts with `code` and records `err` as a private error.
    pub fn abort_with_error(
        &mut self,
        code: u16,
        err: impl Into<Box<dyn Error + Send + Sync>>,
    ) -> &mut ChainError {
        self.abort_with_status(code);
        self.error(err)
    }

    pub fn is_aborted(&self) -> bool {
        self.cursor >= ABORT_INDEX
    }

    /// Name of the route's own handler, the last one of the chain.
    pub fn handler_name(&self) -> &'static str {
        handler::last_name(&self.handlers)
    }

    pub fn handlers(&self) -> &[Handler] {
        &self.handlers
    }

    /*
     * Errors
     */

    /// Records an error for later middleware. Private by default.
    pub fn error(&mut self, err: impl Into<Box<dyn Error + Send + Sync>>) -> &mut ChainError {
        self.errors.push(ChainError::new(err))
    }

    pub fn errors(&self) -> &ErrorList {
        &self.errors
    }

    /*
     * Metadata
     */

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set<T>(&mut self, key: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        let key = key.into();
        let value: Box<dyn Any + Send + Sync> = Box::new(value);
        match self.keys.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.keys.push((key, value)),
        }
    }

    /// The value stored under `key`, if present and of type `T`.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.keys
            .iter()
            .find(|(k, _)| k == key)
            .and_then(|(_, v)| v.downcast_ref::<T>())
    }

    /// Stored keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(|(k, _)| k.as_str())
    }

    /*
     * Input
     */

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The value of the first path parameter named `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key)
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// The first query-string value for `key`, percent-decoded.
    pub fn query(&self, key: &str) -> Option<String> {
        self.request
            .uri()
            .query()?
            .split('&')
            .filter_map(|pair| {
                let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
                (decode_query(k) == key).then(|| decode_query(v))
            })
            .next()
    }

    /// Best effort client address.
    ///
    /// When forwarded headers are trusted, the first `X-Forwarded-For` entry
    /// wins, then `X-Real-Ip`; otherwise the connection's peer address.
    pub fn client_ip(&self) -> Option<String> {
        if self.config.forwarded_by_client_ip {
            let headers = self.request.headers();
            let forwarded = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.split(',').next())
                .map(str::trim);
            let real = headers
                .get("x-real-ip")
                .and_then(|v| v.to_str().ok())
                .map(str::trim);

            if let Some(ip) = forwarded.into_iter().chain(real).find(|ip| !ip.is_empty()) {
                return Some(ip.to_owned());
            }
        }

        self.request
            .extensions()
            .get::<ConnectionInfo>()
            .and_then(|info| info.peer_addr)
            .map(|addr| addr.ip().to_string())
    }

    /*
     * Output
     */

    pub fn writer(&self) -> &ResponseWriter {
        &self.writer
    }

    pub fn writer_mut(&mut self) -> &mut ResponseWriter {
        &mut self.writer
    }

    /// Sets the response status. Unknown codes are logged and ignored.
    pub fn status(&mut self, code: u16) {
        match StatusCode::from_u16(code) {
            Ok(status) => self.writer.write_header(status),
            Err(_) => log::warn!("invalid status code {}", code),
        }
    }

    /// Sets a response header, or removes it when `value` is empty.
    pub fn header(&mut self, key: &str, value: &str) {
        let name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(_) => {
                log::warn!("invalid header name {:?}", key);
                return;
            }
        };
        if value.is_empty() {
            self.writer.headers_mut().remove(name);
            return;
        }
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.writer.headers_mut().insert(name, value);
            }
            Err(_) => log::warn!("invalid value for header {}", name),
        }
    }

    /// Writes `body` with the given status and content type.
    pub fn data(&mut self, code: u16, content_type: &str, body: &[u8]) {
        self.status(code);
        if !self.writer.headers().contains_key(header::CONTENT_TYPE) {
            self.header(header::CONTENT_TYPE.as_str(), content_type);
        }
        self.writer.write(body);
    }

    /// Writes a plain text body.
    pub fn string(&mut self, code: u16, body: impl AsRef<str>) {
        self.data(code, PLAIN_TEXT, body.as_ref().as_bytes());
    }

    /// Serializes `value` as the JSON body.
    ///
    /// A serialization failure is recorded as a render error and answered with 500.
    pub fn json<T: Serialize + ?Sized>(&mut self, code: u16, value: &T) {
        match serde_json::to_vec(value) {
            Ok(body) => self.data(code, JSON, &body),
            Err(e) => {
                self.error(e).set_kind(ErrorKind::RENDER);
                self.status(500);
            }
        }
    }

    /// Redirects to `location`. Codes outside 300..=308 (and 201) are
    /// recorded as errors instead.
    pub fn redirect(&mut self, code: u16, location: &str) {
        if !(300..=308).contains(&code) && code != 201 {
            self.error(format!("cannot redirect with status code {}", code));
            return;
        }
        self.header(header::LOCATION.as_str(), location);
        self.status(code);
        self.writer.write_header_now();
    }
}

fn empty_chain() -> HandlersChain {
    Arc::from(Vec::<Handler>::new())
}

fn decode_query(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|s| s.into_owned())
        .unwrap_or(spaced)
}
