//! Response writers: a status-capturing decorator and an in-memory recorder.

use axum::body::Body;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::{Bytes, BytesMut};

use super::ResponseWriter;

/// Forwards to an inner writer and remembers the first status written.
pub struct ResponseCapture<'a> {
    inner: &'a mut dyn ResponseWriter,
    status: Option<StatusCode>,
}

impl<'a> ResponseCapture<'a> {
    pub fn new(inner: &'a mut dyn ResponseWriter) -> Self {
        Self {
            inner,
            status: None,
        }
    }

    /// First status written, or `200` if nothing was written.
    pub fn written_status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }
}

impl ResponseWriter for ResponseCapture<'_> {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_some() {
            return;
        }
        self.status = Some(status);
        self.inner.write_header(status);
    }

    fn write(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.write_header(StatusCode::OK);
        }
        self.inner.write(chunk);
    }
}

/// Buffers a whole response in memory.
#[derive(Debug, Default)]
pub struct ResponseRecorder {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

impl ResponseRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn into_body(self) -> Bytes {
        self.body.freeze()
    }
}

impl ResponseWriter for ResponseRecorder {
    fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    fn write_header(&mut self, status: StatusCode) {
        if self.status.is_none() {
            self.status = Some(status);
        }
    }

    fn write(&mut self, chunk: &[u8]) {
        if self.status.is_none() {
            self.status = Some(StatusCode::OK);
        }
        self.body.extend_from_slice(chunk);
    }
}

impl IntoResponse for ResponseRecorder {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut resp = Response::new(Body::from(self.body.freeze()));
        *resp.status_mut() = status;
        *resp.headers_mut() = self.headers;
        resp
    }
}
