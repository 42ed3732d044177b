// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use hyper::service::service_fn;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::analytics_sender::{AnalyticsSender, HttpAnalyticsSender};
use crate::batch_buffer::BatchBuffer;
use crate::config::Config;
use crate::dispatcher::{BatchDispatcher, FlushTicker, IntervalTicker};
use crate::enrichment_client::{Enricher, HttpEnrichmentClient};
use crate::intake::IntakeHandler;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Owns the batch buffer and wires it into the intake handler (producers) and the batch
/// dispatcher (single consumer).
pub struct Pipeline {
    pub config: Arc<Config>,
    pub enricher: Arc<dyn Enricher + Send + Sync>,
    pub sender: Arc<dyn AnalyticsSender + Send + Sync>,
    buffer: Arc<BatchBuffer>,
}

impl Pipeline {
    pub fn new(
        config: Arc<Config>,
        enricher: Arc<dyn Enricher + Send + Sync>,
        sender: Arc<dyn AnalyticsSender + Send + Sync>,
    ) -> Self {
        let buffer = Arc::new(BatchBuffer::new(config.buffer_capacity));
        Pipeline {
            config,
            enricher,
            sender,
            buffer,
        }
    }

    /// Builds a pipeline that talks to the enrichment and analytics endpoints from `config`.
    pub fn from_config(config: Arc<Config>) -> Self {
        let enricher = Arc::new(HttpEnrichmentClient::new(&config));
        let sender = Arc::new(HttpAnalyticsSender::new(&config));
        Pipeline::new(config, enricher, sender)
    }

    pub fn buffer(&self) -> Arc<BatchBuffer> {
        Arc::clone(&self.buffer)
    }

    pub fn intake_handler(&self) -> IntakeHandler {
        IntakeHandler::new(
            Arc::clone(&self.enricher),
            Arc::clone(&self.buffer),
            self.config.max_request_content_length,
        )
    }

    pub fn dispatcher(&self) -> BatchDispatcher {
        BatchDispatcher::new(
            Arc::clone(&self.buffer),
            Arc::clone(&self.sender),
            self.config.max_batch_size,
            self.config.failed_batch_policy,
        )
    }

    /// Binds the intake port on all interfaces and serves until `cancel` fires.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), BoxError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.intake_port));
        let listener = TcpListener::bind(&addr).await?;
        info!("Event pipeline listening on {addr}");
        let ticker = IntervalTicker::new(self.config.flush_interval());
        self.serve(listener, ticker, cancel).await
    }

    /// Runs the dispatcher and the intake HTTP server on `listener` until `cancel` fires, the
    /// listener fails, or the dispatcher task dies. The dispatcher is always stopped and joined
    /// before returning.
    pub async fn serve<T>(
        &self,
        listener: TcpListener,
        ticker: T,
        cancel: CancellationToken,
    ) -> Result<(), BoxError>
    where
        T: FlushTicker + Send + 'static,
    {
        let now = Instant::now();

        let dispatcher = self.dispatcher();
        let dispatcher_cancel = cancel.child_token();
        let mut dispatcher_handle =
            tokio::spawn(dispatcher.run(ticker, dispatcher_cancel.clone()));
        let mut dispatcher_joined = false;

        let intake_handler = self.intake_handler();
        let service = service_fn(move |req| {
            // called for each http request
            let intake_handler = intake_handler.clone();
            async move { intake_handler.handle_request(req).await }
        });

        debug!(
            "Time taken to start the event pipeline: {} ms",
            now.elapsed().as_millis()
        );

        let server = hyper::server::conn::http1::Builder::new();
        let mut joinset = tokio::task::JoinSet::new();

        let result: Result<(), BoxError> = loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Event pipeline shutting down");
                    break Ok(());
                },
                con_res = listener.accept() => match con_res {
                    Err(e)
                        if matches!(
                            e.kind(),
                            io::ErrorKind::ConnectionAborted
                                | io::ErrorKind::ConnectionReset
                                | io::ErrorKind::ConnectionRefused
                        ) =>
                    {
                        continue;
                    }
                    Err(e) => {
                        error!("Server error: {e}");
                        break Err(e.into());
                    }
                    Ok((conn, _)) => conn,
                },
                finished = async {
                    match joinset.join_next().await {
                        Some(finished) => finished,
                        None => std::future::pending().await,
                    }
                } => match finished {
                    Err(e) if e.is_panic() => {
                        // Don't kill server on panic - log and continue
                        error!("Connection handler panicked: {:?}", e);
                        continue;
                    },
                    Ok(()) | Err(_) => continue,
                },
                result = &mut dispatcher_handle => {
                    dispatcher_joined = true;
                    // The dispatcher also stops when its child token is cancelled.
                    if cancel.is_cancelled() {
                        if let Err(e) = result {
                            error!("Batch dispatcher task died during shutdown: {:?}", e);
                        }
                        debug!("Event pipeline shutting down");
                        break Ok(());
                    }
                    error!("Batch dispatcher task died: {:?}", result);
                    break Err("Batch dispatcher task terminated unexpectedly".into());
                },
            };
            let conn = hyper_util::rt::TokioIo::new(conn);
            let server = server.clone();
            let service = service.clone();
            joinset.spawn(async move {
                if let Err(e) = server.serve_connection(conn, service).await {
                    error!("Connection error: {e}");
                }
            });
        };

        // Reject submissions still waiting for a buffer slot before tearing down connections.
        self.buffer.close();
        joinset.shutdown().await;
        // Not cancelled by the parent when the accept loop failed on its own.
        dispatcher_cancel.cancel();
        if !dispatcher_joined {
            if let Err(e) = dispatcher_handle.await {
                error!("Batch dispatcher task died during shutdown: {:?}", e);
            }
        }
        result
    }
}
