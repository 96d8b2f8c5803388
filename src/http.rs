use core::fmt;
use std::io;
use std::net::SocketAddr;

pub use hyper::body::Bytes;

/// An HTTP request as seen by handlers: hyper's request over a buffered [`Body`].
pub type Request = hyper::Request<Body>;

/// An HTTP response produced by the dispatcher.
///
/// ```
/// # use thicket::{Response, Body};
/// let response = Response::new(Body::new("Hello world!"));
/// ```
pub type Response = hyper::Response<Body>;

/// A builder for constructing requests in tests and adapters.
///
/// ```
/// # use thicket::{Body, RequestBuilder};
/// let request = RequestBuilder::new()
///     .method("POST")
///     .uri("/users?page=2")
///     .body(Body::new("name=gordon"))
///     .unwrap();
/// assert_eq!(request.uri().path(), "/users");
/// ```
pub type RequestBuilder = hyper::http::request::Builder;

/// Peer information for the connection a request arrived on.
///
/// The server stores it in the request extensions before dispatching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub peer_addr: Option<SocketAddr>,
}

/// A fully buffered request or response body.
///
/// Bodies are collected before dispatch so that handler chains run
/// synchronously on a worker thread without touching the I/O reactor.
///
/// ```rust
/// # use thicket::Body;
/// # use std::io::Read;
/// let body = Body::new("Hello world!");
/// let mut text = String::new();
/// body.reader().read_to_string(&mut text).unwrap();
/// assert_eq!(text, "Hello world!");
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Body(Bytes);

impl Body {
    /// Create a body from a string or bytes.
    pub fn new(data: impl Into<Bytes>) -> Body {
        Body(data.into())
    }

    /// Create an empty body.
    pub fn empty() -> Body {
        Body(Bytes::new())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_bytes(self) -> Bytes {
        self.0
    }

    /// Creates a reader over the buffered contents.
    pub fn reader(&self) -> impl io::Read + '_ {
        self.as_bytes()
    }
}

impl<T> From<T> for Body
where
    Bytes: From<T>,
{
    fn from(data: T) -> Body {
        Body::new(data)
    }
}

impl From<Body> for hyper::Body {
    fn from(body: Body) -> hyper::Body {
        hyper::Body::from(body.0)
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Body").field(&self.0).finish()
    }
}
