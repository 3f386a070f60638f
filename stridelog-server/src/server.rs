//! HTTP server implementation

use std::net::SocketAddr;

use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::handlers::{handle_request, AppState};

pub struct AuthServer {
    state: AppState,
}

impl AuthServer {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn serve(
        self,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let listener = TcpListener::bind(addr).await?;
        info!("stridelog server listening on {}", addr);

        loop {
            let (stream, remote_addr) = listener.accept().await?;
            debug!("New connection from {}", remote_addr);

            let state = self.state.clone();
            tokio::spawn(async move {
                if let Err(err) = Self::handle_connection(stream, state).await {
                    error!("Connection error from {}: {}", remote_addr, err);
                }
            });
        }
    }

    async fn handle_connection(
        stream: TcpStream,
        state: AppState,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let io = TokioIo::new(stream);

        let service = service_fn(move |req| {
            let state = state.clone();
            async move { handle_request(req, state).await }
        });

        auto::Builder::new(TokioExecutor::new())
            .serve_connection(io, service)
            .await?;

        Ok(())
    }
}
