// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Scriptable mock HTTP server standing in for the enrichment and analytics services

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::{body::Incoming, Request, Response};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpListener;

#[derive(Clone, Debug)]
pub struct ReceivedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub received_at: Instant,
}

impl ReceivedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).expect("request body is not JSON")
    }
}

/// Decides the status and body of the response to a captured request.
pub type Responder = Arc<dyn Fn(&ReceivedRequest) -> (u16, String) + Send + Sync>;

#[derive(Clone)]
pub struct MockServer {
    pub addr: SocketAddr,
    pub received_requests: Arc<Mutex<Vec<ReceivedRequest>>>,
}

impl MockServer {
    /// Start a mock HTTP server on a random port
    pub async fn start(responder: Responder) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind mock server");
        let addr = listener.local_addr().expect("Failed to get local addr");

        let received_requests = Arc::new(Mutex::new(Vec::new()));
        let requests_clone = received_requests.clone();

        tokio::spawn(async move {
            loop {
                let (stream, _) = match listener.accept().await {
                    Ok(conn) => conn,
                    Err(_) => break,
                };

                let io = TokioIo::new(stream);
                let requests = requests_clone.clone();
                let responder = responder.clone();

                tokio::spawn(async move {
                    let service = hyper::service::service_fn(move |req: Request<Incoming>| {
                        let requests = requests.clone();
                        let responder = responder.clone();
                        async move {
                            let received_at = Instant::now();
                            let method = req.method().to_string();
                            let path = req.uri().path().to_string();
                            let headers: Vec<(String, String)> = req
                                .headers()
                                .iter()
                                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                                .collect();

                            let body = req
                                .into_body()
                                .collect()
                                .await
                                .map(|collected| collected.to_bytes().to_vec())
                                .unwrap_or_default();

                            let request = ReceivedRequest {
                                method,
                                path,
                                headers,
                                body,
                                received_at,
                            };
                            let (status, body) = responder(&request);
                            requests.lock().unwrap().push(request);

                            Ok::<_, hyper::http::Error>(
                                Response::builder()
                                    .status(status)
                                    .header("Content-Type", "application/json")
                                    .body(Full::new(Bytes::from(body)))
                                    .unwrap(),
                            )
                        }
                    });

                    let _ = hyper::server::conn::http1::Builder::new()
                        .serve_connection(io, service)
                        .await;
                });
            }
        });

        MockServer {
            addr,
            received_requests,
        }
    }

    /// Get the base URL of the mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Get all received requests
    pub fn get_requests(&self) -> Vec<ReceivedRequest> {
        self.received_requests.lock().unwrap().clone()
    }
}

/// Enrichment service answering every record with a fixed attribution, except the record ids in
/// `failing_ids` which always get a 500.
pub async fn start_enrichment_service(failing_ids: &'static [&'static str]) -> MockServer {
    MockServer::start(Arc::new(move |request: &ReceivedRequest| {
        let payload = request.json();
        let id = payload["id"].as_str().unwrap_or_default();
        if failing_ids.contains(&id) {
            return (500, r#"{"error":"lookup failed"}"#.to_string());
        }
        let body = serde_json::json!({
            "asn": format!("AS{}", 64500 + id.len()),
            "category": "phishing",
            "correlationId": 1000,
        });
        (200, body.to_string())
    }))
    .await
}

/// Analytics sink acknowledging every batch, except the calls whose 0-based index is listed in
/// `failing_calls`.
pub async fn start_analytics_service(failing_calls: &'static [usize]) -> MockServer {
    let calls = Arc::new(Mutex::new(0_usize));
    MockServer::start(Arc::new(move |request: &ReceivedRequest| {
        let mut calls = calls.lock().unwrap();
        let call = *calls;
        *calls += 1;
        if failing_calls.contains(&call) {
            return (503, "sink unavailable".to_string());
        }
        let items = request.json().as_array().map_or(0, |batch| batch.len());
        (
            200,
            serde_json::json!({"status": "ok", "itemsIngested": items}).to_string(),
        )
    }))
    .await
}
