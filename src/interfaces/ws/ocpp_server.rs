//! OCPP 1.6-J WebSocket server
//!
//! Accepts charge-point connections at `ws://<host>:<port>/ocpp/{charge_point_id}`
//! (or `/{charge_point_id}`).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::negotiator::{Negotiation, SubprotocolNegotiator};
use crate::application::Dispatcher;
use crate::session::ConnectionManager;
use crate::support::shutdown::ShutdownSignal;

const SUBPROTOCOL_HEADER: &str = "Sec-WebSocket-Protocol";

/// How long a closing connection waits for its writer to flush.
const WRITER_DRAIN: Duration = Duration::from_secs(1);

pub struct OcppServer {
    negotiator: SubprotocolNegotiator,
    connections: Arc<ConnectionManager>,
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownSignal,
}

impl OcppServer {
    pub fn new(
        negotiator: SubprotocolNegotiator,
        connections: Arc<ConnectionManager>,
        dispatcher: Arc<Dispatcher>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            negotiator,
            connections,
            dispatcher,
            shutdown,
        }
    }

    /// Accept connections on `listener` until shutdown.
    pub async fn run(self, listener: TcpListener) {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "OCPP 1.6 Central System listening");
            info!("Charge points should connect to: ws://{}/ocpp/{{charge_point_id}}", addr);
        }
        if self.negotiator.accepts_all() {
            warn!("No subprotocols configured, accepting every client");
        }

        let server = Arc::new(self);
        loop {
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, addr)) => {
                        let server = server.clone();
                        tokio::spawn(async move {
                            if let Err(e) = server.handle_connection(stream, addr).await {
                                warn!(%addr, error = %e, "Connection failed");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "Failed to accept connection"),
                },
                _ = server.shutdown.wait() => {
                    info!(
                        connected = server.connections.connection_count(),
                        "WebSocket server received shutdown signal"
                    );
                    server.connections.close_all();
                    return;
                }
            }
        }
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        addr: SocketAddr,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        debug!(%addr, "New TCP connection");

        let mut charge_point_id: Option<String> = None;
        let ws_stream = tokio_tungstenite::accept_hdr_async(
            stream,
            |req: &Request, mut response: Response| -> Result<Response, ErrorResponse> {
                let path = req.uri().path();
                let Some(id) = extract_charge_point_id(path) else {
                    warn!(%addr, path, "Handshake without charge point id refused");
                    let mut refusal = ErrorResponse::new(Some("missing charge point id".into()));
                    *refusal.status_mut() = StatusCode::BAD_REQUEST;
                    return Err(refusal);
                };

                let requested = req
                    .headers()
                    .get(SUBPROTOCOL_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("");
                match self.negotiator.negotiate(requested) {
                    Negotiation::Selected(protocol) => {
                        if let Ok(value) = HeaderValue::from_str(&protocol) {
                            response.headers_mut().insert(SUBPROTOCOL_HEADER, value);
                        }
                        debug!(
                            charge_point_id = id.as_str(),
                            protocol = protocol.as_str(),
                            "Subprotocol selected"
                        );
                    }
                    Negotiation::NoneOffered => {
                        warn!(charge_point_id = id.as_str(), "Client offered no subprotocol");
                    }
                    Negotiation::Unsupported => {
                        warn!(
                            charge_point_id = id.as_str(),
                            requested,
                            "Client offered no supported subprotocol, accepting without one"
                        );
                    }
                }

                charge_point_id = Some(id);
                Ok(response)
            },
        )
        .await?;

        let Some(charge_point_id) = charge_point_id else {
            return Ok(());
        };
        info!(charge_point_id = charge_point_id.as_str(), %addr, "Charge point connected");

        let (mut ws_sender, mut ws_receiver) = ws_stream.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let connection = self.connections.register(&charge_point_id, Some(addr), tx);

        let writer_id = charge_point_id.clone();
        let mut writer = tokio::spawn(async move {
            while let Some(frame) = rx.recv().await {
                debug!(charge_point_id = writer_id.as_str(), frame = frame.as_str(), "->");
                if let Err(e) = ws_sender.send(Message::Text(frame)).await {
                    warn!(charge_point_id = writer_id.as_str(), error = %e, "Send failed");
                    break;
                }
            }
            let _ = ws_sender.close().await;
        });

        loop {
            let message = tokio::select! {
                message = ws_receiver.next() => message,
                _ = self.shutdown.wait() => {
                    info!(charge_point_id = charge_point_id.as_str(), "Closing for shutdown");
                    break;
                }
            };

            match message {
                Some(Ok(Message::Text(text))) => {
                    debug!(charge_point_id = charge_point_id.as_str(), frame = text.as_str(), "<-");
                    self.dispatcher.dispatch(&connection, &text).await;
                }
                Some(Ok(Message::Binary(data))) => {
                    warn!(
                        charge_point_id = charge_point_id.as_str(),
                        bytes = data.len(),
                        "Binary frame ignored"
                    );
                }
                Some(Ok(Message::Close(frame))) => {
                    info!(charge_point_id = charge_point_id.as_str(), ?frame, "Close frame received");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(charge_point_id = charge_point_id.as_str(), error = %e, "WebSocket error");
                    break;
                }
                None => break,
            }
        }

        self.connections.unregister(&connection);
        drop(connection);
        if tokio::time::timeout(WRITER_DRAIN, &mut writer).await.is_err() {
            writer.abort();
        }

        info!(charge_point_id = charge_point_id.as_str(), "Charge point disconnected");
        Ok(())
    }
}

/// Charge point id from `/ocpp/{id}` or `/{id}`.
fn extract_charge_point_id(path: &str) -> Option<String> {
    let path = path.trim_start_matches('/');

    if let Some(id) = path.strip_prefix("ocpp/") {
        let id = id.trim_matches('/');
        if !id.is_empty() && !id.contains('/') {
            return Some(id.to_string());
        }
        return None;
    }

    let id = path.trim_end_matches('/');
    if !id.is_empty() && !id.contains('/') {
        return Some(id.to_string());
    }

    None
}
