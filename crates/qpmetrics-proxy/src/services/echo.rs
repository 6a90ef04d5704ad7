//! Echo upstream: answers `200` with the request body and content type.
//!
//! Stands in for the user container when the sidecar runs on its own.

use async_trait::async_trait;
use axum::http::{header, Request, StatusCode};
use bytes::Bytes;

use crate::handler::{Handler, ResponseWriter};

#[derive(Debug, Default)]
pub struct EchoHandler;

impl EchoHandler {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Handler for EchoHandler {
    async fn serve(&self, w: &mut dyn ResponseWriter, req: &Request<Bytes>) {
        if let Some(ct) = req.headers().get(header::CONTENT_TYPE) {
            w.headers_mut().insert(header::CONTENT_TYPE, ct.clone());
        }
        w.write_header(StatusCode::OK);
        w.write(req.body());
    }
}
