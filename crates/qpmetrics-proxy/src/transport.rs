//! Bridge between axum requests and the `Handler` chain.

use axum::body::{to_bytes, Body};
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;
use crate::handler::{Handler, ResponseRecorder};

/// Buffer the body, run the chain against a recorder, and return what it wrote.
pub async fn serve_instrumented(State(app): State<AppState>, req: Request<Body>) -> Response {
    let (parts, body) = req.into_parts();
    let body = match to_bytes(body, app.cfg().proxy.max_body_bytes).await {
        Ok(b) => b,
        Err(e) => {
            tracing::debug!(error = %e, "request body rejected");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    };
    let req = Request::from_parts(parts, body);

    let mut rec = ResponseRecorder::new();
    app.handler().serve(&mut rec, &req).await;
    rec.into_response()
}
