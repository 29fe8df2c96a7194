//! Internet channel: the HTTP(S) listeners through which a station is
//! reachable from the wider network.
//!
//! HTTP always binds on `http_port`; HTTPS binds on `https_port` only when
//! SSL is enabled *and* an issued, unexpired certificate was handed in, and
//! it serves TLS from that certificate's material. A port conflict is fatal
//! for this channel only and carries the offending port number.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use axum::{routing::get, Json, Router};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::cert::IssuedCertificate;
use crate::error::ChannelError;
use crate::reachability;

/// What the internet channel needs to bind.
#[derive(Debug, Clone)]
pub struct InternetParams {
    pub http_port: u16,
    pub https_port: u16,
    pub enable_ssl: bool,
    pub ssl_domain: Option<String>,
}

/// Station identity surfaced by the status API.
#[derive(Debug, Clone, Serialize)]
pub struct StationInfo {
    pub name: String,
    pub callsign: String,
    pub network_name: String,
}

/// Live counters surfaced through `/api/status`. The owner refreshes them
/// as its stats are recomputed; the handlers only read.
#[derive(Debug, Default)]
pub struct LiveStats {
    connected_devices: AtomicU32,
    uptime_secs: AtomicU64,
}

impl LiveStats {
    pub fn record(&self, connected_devices: u32, uptime_secs: u64) {
        self.connected_devices
            .store(connected_devices, Ordering::Relaxed);
        self.uptime_secs.store(uptime_secs, Ordering::Relaxed);
    }

    pub fn connected_devices(&self) -> u32 {
        self.connected_devices.load(Ordering::Relaxed)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_secs.load(Ordering::Relaxed)
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

#[derive(Serialize)]
struct StatusResponse {
    name: String,
    callsign: String,
    network_name: String,
    version: &'static str,
    connected_devices: u32,
    uptime_secs: u64,
}

fn build_router(info: StationInfo, stats: Arc<LiveStats>) -> Router {
    let cors = CorsLayer::new().allow_origin(Any).allow_methods(Any);

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/status",
            get(move || {
                let info = info.clone();
                let stats = stats.clone();
                async move {
                    Json(StatusResponse {
                        name: info.name,
                        callsign: info.callsign,
                        network_name: info.network_name,
                        version: env!("CARGO_PKG_VERSION"),
                        connected_devices: stats.connected_devices(),
                        uptime_secs: stats.uptime_secs(),
                    })
                }
            }),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// A bound internet channel. Dropping it (or calling `shutdown`) releases
/// both listeners.
#[derive(Debug)]
pub struct InternetChannel {
    http_port: u16,
    https_port: Option<u16>,
    urls: Vec<String>,
    shutdown_tx: watch::Sender<bool>,
    https_handle: Option<Handle>,
}

impl InternetChannel {
    /// Bind HTTP, and HTTPS when SSL is enabled with a valid certificate.
    pub async fn bind(
        params: &InternetParams,
        info: StationInfo,
        certificate: Option<IssuedCertificate>,
        stats: Arc<LiveStats>,
    ) -> Result<Self, ChannelError> {
        if params.enable_ssl && certificate.is_none() {
            return Err(ChannelError::HttpsWithoutCertificate);
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let http_listener = bind_port(params.http_port).await?;
        let http_port = local_port(&http_listener, params.http_port);
        serve_on(
            http_listener,
            build_router(info.clone(), stats.clone()),
            shutdown_rx,
        );
        info!(port = http_port, "Internet channel bound (http)");

        let mut https_port = None;
        let mut https_handle = None;
        if let Some(cert) = certificate.filter(|_| params.enable_ssl) {
            // Load the TLS material first so a bad certificate rolls back
            // before the port is touched.
            let tls = match RustlsConfig::from_pem(
                cert.certificate_pem.into_bytes(),
                cert.private_key_pem.into_bytes(),
            )
            .await
            {
                Ok(tls) => tls,
                Err(e) => {
                    let _ = shutdown_tx.send(true);
                    return Err(ChannelError::Tls(e.to_string()));
                }
            };

            let listener = match bind_port(params.https_port).await {
                Ok(listener) => listener,
                Err(e) => {
                    // Roll the http listener back so the channel is never
                    // half-bound.
                    let _ = shutdown_tx.send(true);
                    return Err(e);
                }
            };
            let bound = local_port(&listener, params.https_port);
            let handle = match serve_tls_on(listener, tls, build_router(info, stats)) {
                Ok(handle) => handle,
                Err(e) => {
                    let _ = shutdown_tx.send(true);
                    return Err(e);
                }
            };
            https_handle = Some(handle);
            https_port = Some(bound);
            info!(port = bound, domain = ?params.ssl_domain, "Internet channel bound (https)");
        }

        let ssl = match (&params.ssl_domain, https_port) {
            (Some(domain), Some(port)) => Some((domain.as_str(), port)),
            _ => None,
        };
        let urls = reachability::reachable_urls(http_port, ssl);

        Ok(Self {
            http_port,
            https_port,
            urls,
            shutdown_tx,
            https_handle,
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    pub fn https_port(&self) -> Option<u16> {
        self.https_port
    }

    /// Stop serving and release both listeners.
    pub fn shutdown(&self) {
        if self.shutdown_tx.send(true).is_err() {
            debug!("Internet channel already shut down");
        }
        if let Some(handle) = &self.https_handle {
            handle.shutdown();
        }
    }
}

impl Drop for InternetChannel {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = &self.https_handle {
            handle.shutdown();
        }
    }
}

async fn bind_port(port: u16) -> Result<TcpListener, ChannelError> {
    TcpListener::bind(("0.0.0.0", port)).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::AddrInUse {
            ChannelError::PortInUse { port }
        } else {
            ChannelError::Bind {
                port,
                message: e.to_string(),
            }
        }
    })
}

fn local_port(listener: &TcpListener, requested: u16) -> u16 {
    listener
        .local_addr()
        .map(|addr| addr.port())
        .unwrap_or(requested)
}

fn serve_on(listener: TcpListener, router: Router, mut shutdown_rx: watch::Receiver<bool>) {
    tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.changed().await;
            })
            .await;
        if let Err(e) = result {
            warn!(error = %e, "Internet listener exited with error");
        }
    });
}

fn serve_tls_on(
    listener: TcpListener,
    tls: RustlsConfig,
    router: Router,
) -> Result<Handle, ChannelError> {
    let port = local_port(&listener, 0);
    let std_listener = listener.into_std().map_err(|e| ChannelError::Bind {
        port,
        message: e.to_string(),
    })?;
    let handle = Handle::new();
    let server_handle = handle.clone();
    tokio::spawn(async move {
        let result = axum_server::from_tcp_rustls(std_listener, tls)
            .handle(server_handle)
            .serve(router.into_make_service())
            .await;
        if let Err(e) = result {
            warn!(error = %e, "HTTPS listener exited with error");
        }
    });
    Ok(handle)
}
