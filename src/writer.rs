use std::mem;

use hyper::header::HeaderMap;
use hyper::StatusCode;

use crate::http::{Body, Response};

/// Buffers the response a handler chain produces.
///
/// The status line counts as sent once the first body byte is written or
/// [`write_header_now`](Self::write_header_now) is called; later status
/// changes are ignored with a warning.
#[derive(Debug)]
pub struct ResponseWriter {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
    /// Bytes written, or None while the header is still pending.
    size: Option<usize>,
}

impl Default for ResponseWriter {
    fn default() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Vec::new(),
            size: None,
        }
    }
}

impl ResponseWriter {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn write_header(&mut self, status: StatusCode) {
        if status == self.status {
            return;
        }
        if self.written() {
            log::warn!(
                "headers were already written, ignoring status change from {} to {}",
                self.status,
                status
            );
            return;
        }
        self.status = status;
    }

    /// Marks the header as sent.
    pub fn write_header_now(&mut self) {
        if self.size.is_none() {
            self.size = Some(0);
        }
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        self.write_header_now();
        self.body.extend_from_slice(data);
        self.size = Some(self.size.unwrap_or(0) + data.len());
        data.len()
    }

    pub fn write_str(&mut self, s: &str) -> usize {
        self.write(s.as_bytes())
    }

    pub fn written(&self) -> bool {
        self.size.is_some()
    }

    /// Number of body bytes written so far, None if the header is pending.
    pub fn size(&self) -> Option<usize> {
        self.size
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub(crate) fn reset(&mut self) {
        self.status = StatusCode::OK;
        self.headers.clear();
        self.body.clear();
        self.size = None;
    }

    /// Finalizes the buffered response, leaving the writer empty.
    pub(crate) fn take_response(&mut self) -> Response {
        self.write_header_now();
        let mut response = Response::new(Body::from(mem::take(&mut self.body)));
        *response.status_mut() = self.status;
        *response.headers_mut() = mem::take(&mut self.headers);
        response
    }
}
