//! The station node service: the only entry point the application layer
//! has into the core.
//!
//! Holds explicit references to the storage engine, channel manager, and
//! certificate manager (constructed once, passed in), orchestrates the
//! lifecycle controller, and republishes every state change on the event
//! bus.

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{info, warn};

use station_net::{
    CertificateManager, CertificateState, ChannelManager, ChannelParams, InternetParams,
    IssuedCertificate, StationInfo,
};
use station_shared::identity::IdentityExport;
use station_shared::{
    ChannelType, CollectionType, ConfigError, NetworkPolicy, NetworkSettings, NodeId, NodeRole,
    RemoteStationReference, StationIdentity, StationNodeConfig, StationStats,
};
use station_store::StorageEngine;

use crate::error::NodeError;
use crate::events::{EventBus, EventReason, StationEvent};
use crate::lifecycle::{LifecycleController, LifecycleState, LifecycleTransition};
use crate::node::StationNode;
use crate::remote::RemoteStationRegistry;
use crate::settings::SettingsStore;
use crate::Result;

/// Parameters for founding a new network.
#[derive(Debug, Clone)]
pub struct CreateRootStation {
    pub name: String,
    pub description: String,
    /// Callsign of the human operator; derived from the generated
    /// operator key when not supplied.
    pub operator_callsign: Option<String>,
    pub network_name: String,
    pub config: StationNodeConfig,
    pub policy: NetworkPolicy,
    pub apps: Vec<CollectionType>,
}

/// Everything persisted for the local station.
#[derive(Serialize, Deserialize)]
struct StationManifest {
    node: StationNode,
    identity: IdentityExport,
}

struct NodeState {
    node: StationNode,
    identity: StationIdentity,
}

pub struct StationService {
    engine: Arc<StorageEngine>,
    channels: Arc<ChannelManager>,
    certs: Arc<CertificateManager>,
    controller: Arc<LifecycleController>,
    bus: Arc<EventBus>,
    settings_store: SettingsStore,
    settings: Mutex<NetworkSettings>,
    remotes: RemoteStationRegistry,
    node: RwLock<Option<NodeState>>,
    manifest_path: PathBuf,
}

impl StationService {
    /// Wire the service together from its injected collaborators and
    /// restore any persisted station state from `data_dir`.
    pub async fn new(
        engine: Arc<StorageEngine>,
        channels: Arc<ChannelManager>,
        certs: Arc<CertificateManager>,
        bus: Arc<EventBus>,
        data_dir: PathBuf,
    ) -> Result<Arc<Self>> {
        let (controller, transitions) = LifecycleController::new(channels.clone());

        let settings_store = SettingsStore::new(data_dir.join("network_settings.json"));
        let settings = settings_store.load().await?;
        certs
            .configure(
                settings.ssl_domain.clone(),
                settings.ssl_email.clone(),
                settings.ssl_auto_renew,
            )
            .await;

        let remotes = RemoteStationRegistry::new(data_dir.join("remote_stations.json"));
        remotes.load().await?;

        let service = Arc::new(Self {
            engine,
            channels,
            certs,
            controller: Arc::new(controller),
            bus,
            settings_store,
            settings: Mutex::new(settings),
            remotes,
            node: RwLock::new(None),
            manifest_path: data_dir.join("station.json"),
        });
        service.restore_manifest().await?;
        Self::spawn_transition_forwarder(&service, transitions);
        Ok(service)
    }

    /// Forward lifecycle transitions to subscribers as full snapshots, in
    /// transition order. Holds only a weak reference so the forwarder winds
    /// down with the service instead of keeping it alive.
    fn spawn_transition_forwarder(
        service: &Arc<Self>,
        mut transitions: mpsc::UnboundedReceiver<LifecycleTransition>,
    ) {
        let service = Arc::downgrade(service);
        tokio::spawn(async move {
            while let Some(transition) = transitions.recv().await {
                let Some(service) = service.upgrade() else {
                    break;
                };
                let snapshot = {
                    let mut node = service.node.write().await;
                    match node.as_mut() {
                        Some(state) => {
                            state.node.error_message = transition.error.clone();
                            state.node.clone()
                        }
                        None => continue,
                    }
                };
                service
                    .bus
                    .publish(StationEvent {
                        reason: EventReason::Lifecycle(transition.state),
                        node: snapshot,
                    })
                    .await;
            }
        });
    }

    // -- facade operations --------------------------------------------------

    /// Found a new network with this device as its root station. The
    /// station is persisted but not started.
    pub async fn create_root_station(&self, params: CreateRootStation) -> Result<StationNode> {
        let mut node_slot = self.node.write().await;
        if node_slot.is_some() {
            return Err(NodeError::StationExists);
        }
        if params.name.trim().is_empty() {
            return Err(ConfigError::EmptyName.into());
        }

        let mut config = params.config;
        if !params.apps.is_empty() {
            config.supported_apps = params.apps;
        }
        config.validate(NodeRole::Root)?;
        params.policy.validate()?;

        let identity = StationIdentity::generate();
        let operator_callsign = params
            .operator_callsign
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| identity.operator_callsign());

        let node = StationNode {
            id: NodeId::new(),
            name: params.name.trim().to_string(),
            description: params.description,
            role: NodeRole::Root,
            station_callsign: identity.station_callsign(),
            operator_callsign,
            station_public_key: identity.station_public_key_hex(),
            operator_public_key: identity.operator_public_key_hex(),
            network_name: params.network_name,
            config: config.clone(),
            policy: params.policy,
            stats: StationStats::default(),
            error_message: None,
            is_running: false,
        };

        self.engine.update_config(config.storage).await;
        let state = NodeState {
            node: node.clone(),
            identity,
        };
        self.save_manifest(&state).await?;
        *node_slot = Some(state);
        drop(node_slot);

        info!(callsign = %node.station_callsign, network = %node.network_name, "Root station created");
        self.bus
            .publish(StationEvent {
                reason: EventReason::Created,
                node: node.clone(),
            })
            .await;
        Ok(node)
    }

    /// Register a station running elsewhere. No local binding happens.
    pub async fn connect_remote_station(
        &self,
        url: &str,
        callsign: &str,
    ) -> Result<RemoteStationReference> {
        self.remotes.add(url, callsign).await
    }

    /// Bring the local station up on its enabled channels.
    pub async fn start(&self) -> Result<()> {
        let (name, callsign, network_name, role, config) = {
            let node = self.node.read().await;
            let state = node.as_ref().ok_or(NodeError::NoStation)?;
            (
                state.node.name.clone(),
                state.node.station_callsign.clone(),
                state.node.network_name.clone(),
                state.node.role,
                state.node.config.clone(),
            )
        };
        if role == NodeRole::Remote {
            return Err(NodeError::RemoteStation);
        }
        config.validate(role)?;

        let settings = self.settings.lock().await.clone();
        let plan = self.build_plan(&config, &settings, &name, &callsign, &network_name);

        match self.controller.start(plan).await {
            Ok(bound) => {
                info!(channels = ?bound, "Station started");
                self.set_intent(true).await?;
                Ok(())
            }
            Err(e) => {
                // The failed transition (with the error attached) has
                // already gone out on the event stream; the node stays
                // Stopped with the message recorded.
                self.set_error(Some(e.to_string())).await;
                Err(e)
            }
        }
    }

    /// Take the station down and record the intent.
    pub async fn stop(&self) -> Result<()> {
        {
            let node = self.node.read().await;
            if node.is_none() {
                return Err(NodeError::NoStation);
            }
        }
        self.controller.stop().await?;
        self.set_intent(false).await?;
        Ok(())
    }

    /// Atomically replace the station config. Validation runs before
    /// anything is persisted; a failing config changes nothing.
    pub async fn update_config(&self, new_config: StationNodeConfig) -> Result<StationNode> {
        let mut node_slot = self.node.write().await;
        let state = node_slot.as_mut().ok_or(NodeError::NoStation)?;
        new_config.validate(state.node.role)?;

        self.engine.update_config(new_config.storage.clone()).await;
        state.node.config = new_config;
        let snapshot = state.node.clone();
        self.save_manifest(state).await?;
        drop(node_slot);

        self.bus
            .publish(StationEvent {
                reason: EventReason::ConfigUpdated,
                node: snapshot.clone(),
            })
            .await;
        Ok(snapshot)
    }

    /// Persist network-level settings (ports, SSL, connection limits)
    /// independently of the general config. Works while the station is
    /// stopped; takes effect on the next start.
    pub async fn update_network_settings(&self, new_settings: NetworkSettings) -> Result<()> {
        new_settings.validate()?;
        self.settings_store.save(&new_settings).await?;
        self.certs
            .configure(
                new_settings.ssl_domain.clone(),
                new_settings.ssl_email.clone(),
                new_settings.ssl_auto_renew,
            )
            .await;
        *self.settings.lock().await = new_settings;

        if let Some(snapshot) = self.snapshot().await {
            self.bus
                .publish(StationEvent {
                    reason: EventReason::NetworkSettingsUpdated,
                    node: snapshot,
                })
                .await;
        }
        Ok(())
    }

    /// Request (or renew) the TLS certificate for the internet channel.
    pub async fn request_certificate(&self, staging: bool) -> Result<IssuedCertificate> {
        match self.certs.request_certificate(staging).await {
            Ok(cert) => {
                self.set_error(None).await;
                if let Some(snapshot) = self.snapshot().await {
                    self.bus
                        .publish(StationEvent {
                            reason: EventReason::CertificateChanged,
                            node: snapshot,
                        })
                        .await;
                }
                Ok(cert)
            }
            Err(e) => {
                self.set_error(Some(e.to_string())).await;
                if let Some(snapshot) = self.snapshot().await {
                    self.bus
                        .publish(StationEvent {
                            reason: EventReason::Error,
                            node: snapshot,
                        })
                        .await;
                }
                Err(e.into())
            }
        }
    }

    pub async fn certificate_status(&self) -> CertificateState {
        self.certs.status().await
    }

    /// Delete the local station. For a root station this dissolves the
    /// network: remote participants are not notified and continue as
    /// orphaned nodes until they detect the loss themselves.
    pub async fn delete_station(&self) -> Result<()> {
        {
            let node = self.node.read().await;
            if node.is_none() {
                return Err(NodeError::NoStation);
            }
        }

        match self.controller.stop().await {
            Ok(()) | Err(NodeError::NotRunning) => {}
            Err(e) => return Err(e),
        }
        self.engine.wipe().await;

        match tokio::fs::remove_file(&self.manifest_path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut node_slot = self.node.write().await;
        let Some(state) = node_slot.take() else {
            return Err(NodeError::NoStation);
        };
        drop(node_slot);

        let mut snapshot = state.node;
        snapshot.is_running = false;
        if snapshot.role == NodeRole::Root {
            warn!(
                network = %snapshot.network_name,
                "Root station deleted: the network is dissolved, remote participants are not notified"
            );
        }
        self.bus
            .publish(StationEvent {
                reason: EventReason::Deleted,
                node: snapshot,
            })
            .await;
        Ok(())
    }

    /// Drop the local reference to a remotely managed station.
    pub async fn remove_remote_station(&self, id: NodeId) -> Result<()> {
        self.remotes.remove(id).await
    }

    pub async fn list_remote_stations(&self) -> Vec<RemoteStationReference> {
        self.remotes.list().await
    }

    /// Subscribe to the state-change stream.
    pub async fn subscribe(&self) -> mpsc::Receiver<StationEvent> {
        self.bus.subscribe().await
    }

    /// Reconciled snapshot: stats are refreshed and `is_running` is
    /// derived from the actually bound channels, not the stored flag.
    pub async fn status(&self) -> Result<StationNode> {
        let intended = {
            let node = self.node.read().await;
            node.as_ref().ok_or(NodeError::NoStation)?.node.is_running
        };
        let reconciled = self.controller.reconciled_state(intended).await;

        let storage_used_mb = self.engine.used_mb().await;
        let uptime_secs = self.controller.uptime_secs().await;
        let connected_devices = self.channels.hotspot_clients();
        // Mirror the fresh numbers into the status API's counters.
        self.channels
            .live_stats()
            .record(connected_devices, uptime_secs);

        let mut node = self.node.write().await;
        let state = node.as_mut().ok_or(NodeError::NoStation)?;
        state.node.stats.storage_used_mb = storage_used_mb;
        state.node.stats.uptime_secs = uptime_secs;
        state.node.stats.connected_devices = connected_devices;

        let mut snapshot = state.node.clone();
        snapshot.is_running = reconciled == LifecycleState::Running;
        Ok(snapshot)
    }

    /// Whether the persisted station intends to be running. This is the
    /// stored flag, not the reconciled state: after a restart it reports
    /// what the station was doing when the process last exited, which is
    /// what the daemon keys its resume decision on.
    pub async fn intended_running(&self) -> Result<bool> {
        let node = self.node.read().await;
        Ok(node.as_ref().ok_or(NodeError::NoStation)?.node.is_running)
    }

    /// The controller's current lifecycle state.
    pub async fn lifecycle_state(&self) -> LifecycleState {
        self.controller.state().await
    }

    /// Reachability URLs of the bound internet channel, empty when it is
    /// down.
    pub async fn internet_urls(&self) -> Vec<String> {
        self.channels.internet_urls().await
    }

    /// Publish a fresh stats snapshot to subscribers.
    pub async fn publish_stats(&self) -> Result<()> {
        let snapshot = self.status().await?;
        self.bus
            .publish(StationEvent {
                reason: EventReason::StatsUpdated,
                node: snapshot,
            })
            .await;
        Ok(())
    }

    // -- internals ----------------------------------------------------------

    fn build_plan(
        &self,
        config: &StationNodeConfig,
        settings: &NetworkSettings,
        name: &str,
        callsign: &str,
        network_name: &str,
    ) -> Vec<ChannelParams> {
        config
            .enabled_channels()
            .into_iter()
            .map(|channel_type| match channel_type {
                ChannelType::Internet => ChannelParams::Internet {
                    params: InternetParams {
                        http_port: settings.http_port,
                        https_port: settings.https_port,
                        enable_ssl: settings.enable_ssl,
                        ssl_domain: settings.ssl_domain.clone(),
                    },
                    info: StationInfo {
                        name: name.to_string(),
                        callsign: callsign.to_string(),
                        network_name: network_name.to_string(),
                    },
                },
                ChannelType::LocalNetwork => ChannelParams::Hotspot {
                    station_name: name.to_string(),
                },
                ChannelType::ShortRangeRadio => ChannelParams::ShortRangeRadio,
                ChannelType::LowPowerRadio => ChannelParams::LowPowerRadio,
            })
            .collect()
    }

    async fn set_intent(&self, running: bool) -> Result<()> {
        let mut node = self.node.write().await;
        if let Some(state) = node.as_mut() {
            state.node.is_running = running;
            if running {
                state.node.error_message = None;
            }
            self.save_manifest(state).await?;
        }
        Ok(())
    }

    async fn set_error(&self, message: Option<String>) {
        let mut node = self.node.write().await;
        if let Some(state) = node.as_mut() {
            state.node.error_message = message;
        }
    }

    async fn snapshot(&self) -> Option<StationNode> {
        self.node.read().await.as_ref().map(|s| s.node.clone())
    }

    async fn save_manifest(&self, state: &NodeState) -> Result<()> {
        if let Some(parent) = self.manifest_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let manifest = StationManifest {
            node: state.node.clone(),
            identity: state.identity.to_export(),
        };
        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| NodeError::Persist(e.to_string()))?;
        let tmp = self.manifest_path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.manifest_path).await?;
        Ok(())
    }

    async fn restore_manifest(&self) -> Result<()> {
        let bytes = match tokio::fs::read(&self.manifest_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let manifest: StationManifest = serde_json::from_slice(&bytes)
            .map_err(|e| NodeError::Persist(format!("station manifest corrupt: {e}")))?;

        self.engine
            .update_config(manifest.node.config.storage.clone())
            .await;
        info!(
            callsign = %manifest.node.station_callsign,
            intended_running = manifest.node.is_running,
            "Restored persisted station"
        );
        *self.node.write().await = Some(NodeState {
            identity: StationIdentity::from_export(&manifest.identity),
            node: manifest.node,
        });
        Ok(())
    }
}
