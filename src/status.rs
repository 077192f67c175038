//! Status HTTP endpoint
//!
//! `GET /` answers with a static readiness string.

use std::net::SocketAddr;

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Body returned by `GET /`
pub const STATUS_BODY: &str = "danmaku bridge is running";

/// Bind the status endpoint and serve it in the background
pub async fn spawn_status_server(bind: SocketAddr) -> std::io::Result<SocketAddr> {
    let listener = TcpListener::bind(bind).await?;
    let local = listener.local_addr()?;
    info!("Status endpoint listening on http://{}", local);

    tokio::spawn(async move {
        if let Err(err) = run_status_server(listener).await {
            warn!(error = %err, "status server stopped");
        }
    });
    Ok(local)
}

async fn run_status_server(listener: TcpListener) -> std::io::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(err) = http1::Builder::new()
                .serve_connection(io, service_fn(handle_status))
                .await
            {
                warn!(error = %err, "status connection error");
            }
        });
    }
}

async fn handle_status(req: Request<Incoming>) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let (status, body) = route(req.method(), req.uri().path());
    let mut response = Response::new(Full::new(body));
    *response.status_mut() = status;
    Ok(response)
}

fn route(method: &Method, path: &str) -> (StatusCode, Bytes) {
    if method != Method::GET {
        return (StatusCode::METHOD_NOT_ALLOWED, Bytes::new());
    }
    match path {
        "/" => (StatusCode::OK, Bytes::from_static(STATUS_BODY.as_bytes())),
        _ => (StatusCode::NOT_FOUND, Bytes::new()),
    }
}
