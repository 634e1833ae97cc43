//! Prometheus scrape endpoint.

use std::{convert::Infallible, net::SocketAddr};

use anyhow::Context;
use committee_common::metrics;
use http_body_util::Full;
use hyper::{
    body::{Bytes, Incoming},
    header::{HeaderValue, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::*;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4";

fn respond(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
}

async fn endpoint(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.uri().path() != "/metrics" {
        return Ok(respond(StatusCode::NOT_FOUND, "Not found. See /metrics"));
    }

    let response = match metrics::render_text() {
        Ok(text) => {
            let mut response = respond(StatusCode::OK, text);
            response
                .headers_mut()
                .insert(CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT));
            response
        }
        Err(err) => {
            error!(?err, "failed to render metrics");
            respond(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    };
    Ok(response)
}

/// Serves `/metrics` on `addr` until cancelled.
pub(crate) async fn serve(addr: SocketAddr, cancel: CancellationToken) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding metrics endpoint to {addr}"))?;
    info!(%addr, "metrics endpoint started");

    loop {
        let (stream, peer) = tokio::select! {
            _ = cancel.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(?err, "failed to accept metrics connection");
                    continue;
                }
            },
        };

        tokio::spawn(async move {
            let conn = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service_fn(endpoint));
            if let Err(err) = conn.await {
                debug!(%peer, ?err, "metrics connection closed with error");
            }
        });
    }

    info!("metrics endpoint stopped");
    Ok(())
}
