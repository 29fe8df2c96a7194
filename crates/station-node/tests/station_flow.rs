//! End-to-end flow through the service facade: found a station, bring it
//! up on real (ephemeral) ports, observe the event stream, take it down,
//! delete it.

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

use station_net::{CertificateManager, ChannelManager, SelfSignedAuthority, SoftApBackend};
use station_node::{
    CreateRootStation, EventBus, EventReason, LifecycleState, NodeError, StationEvent,
    StationService,
};
use station_shared::{
    ChannelConfig, ChannelType, NetworkPolicy, NetworkSettings, StationNodeConfig,
};
use station_store::StorageEngine;

async fn service_in(dir: &TempDir) -> Arc<StationService> {
    let engine = Arc::new(StorageEngine::new(Default::default()));
    let certs = Arc::new(CertificateManager::new(Arc::new(SelfSignedAuthority)));
    let channels = Arc::new(ChannelManager::new(
        certs.clone(),
        Arc::new(SoftApBackend::default()),
    ));
    StationService::new(
        engine,
        channels,
        certs,
        Arc::new(EventBus::new()),
        dir.path().to_path_buf(),
    )
    .await
    .unwrap()
}

fn internet_and_hotspot_config() -> StationNodeConfig {
    StationNodeConfig {
        channels: vec![
            ChannelConfig {
                channel_type: ChannelType::Internet,
                enabled: true,
            },
            ChannelConfig {
                channel_type: ChannelType::LocalNetwork,
                enabled: true,
            },
        ],
        ..StationNodeConfig::default()
    }
}

fn params() -> CreateRootStation {
    CreateRootStation {
        name: "Harbor Station".into(),
        description: "integration".into(),
        operator_callsign: None,
        network_name: "harbornet".into(),
        config: internet_and_hotspot_config(),
        policy: NetworkPolicy::default(),
        apps: vec![],
    }
}

async fn next_event(rx: &mut tokio::sync::mpsc::Receiver<StationEvent>) -> StationEvent {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("event stream timed out")
        .expect("event stream closed")
}

#[tokio::test]
async fn test_full_station_lifecycle() {
    let dir = TempDir::new().unwrap();
    let service = service_in(&dir).await;
    let mut events = service.subscribe().await;

    // Found the station; it must not start on its own.
    let node = service.create_root_station(params()).await.unwrap();
    assert!(!node.is_running);
    assert_eq!(next_event(&mut events).await.reason, EventReason::Created);

    // Ephemeral ports so the test never collides with a real deployment.
    let settings = NetworkSettings {
        http_port: 0,
        https_port: 0,
        ..NetworkSettings::default()
    };
    service.update_network_settings(settings).await.unwrap();
    assert_eq!(
        next_event(&mut events).await.reason,
        EventReason::NetworkSettingsUpdated
    );

    service.start().await.unwrap();

    // Intermediate transitions are observable, in order.
    let starting = next_event(&mut events).await;
    assert_eq!(
        starting.reason,
        EventReason::Lifecycle(LifecycleState::Starting)
    );
    let running = next_event(&mut events).await;
    assert_eq!(
        running.reason,
        EventReason::Lifecycle(LifecycleState::Running)
    );

    // The internet channel is actually reachable over HTTP.
    let urls = service.internet_urls().await;
    let loopback = urls
        .iter()
        .find(|u| u.starts_with("http://127.0.0.1:"))
        .expect("loopback url");
    let health = format!("{loopback}/health");
    let response = reqwest::get(&health).await.unwrap();
    assert!(response.status().is_success());

    // Second start is rejected and changes nothing.
    assert!(matches!(
        service.start().await.unwrap_err(),
        NodeError::AlreadyRunning
    ));
    assert!(service.status().await.unwrap().is_running);

    service.stop().await.unwrap();
    assert_eq!(
        next_event(&mut events).await.reason,
        EventReason::Lifecycle(LifecycleState::Stopping)
    );
    assert_eq!(
        next_event(&mut events).await.reason,
        EventReason::Lifecycle(LifecycleState::Stopped)
    );
    assert!(!service.status().await.unwrap().is_running);
    assert!(service.internet_urls().await.is_empty());

    // Settings remain editable while the station is stopped.
    let settings = NetworkSettings {
        http_port: 0,
        https_port: 0,
        max_connected_devices: 64,
        ..NetworkSettings::default()
    };
    service.update_network_settings(settings).await.unwrap();
    assert_eq!(
        next_event(&mut events).await.reason,
        EventReason::NetworkSettingsUpdated
    );

    service.delete_station().await.unwrap();
    let mut saw_deleted = false;
    while let Ok(Some(event)) = timeout(Duration::from_secs(5), events.recv()).await {
        if event.reason == EventReason::Deleted {
            assert!(!event.node.is_running);
            saw_deleted = true;
            break;
        }
    }
    assert!(saw_deleted);
    assert!(matches!(
        service.status().await.unwrap_err(),
        NodeError::NoStation
    ));
}

#[tokio::test]
async fn test_restart_reconciles_persisted_intent() {
    let dir = TempDir::new().unwrap();

    {
        let service = service_in(&dir).await;
        service.create_root_station(params()).await.unwrap();
        let settings = NetworkSettings {
            http_port: 0,
            https_port: 0,
            ..NetworkSettings::default()
        };
        service.update_network_settings(settings).await.unwrap();
        service.start().await.unwrap();
        assert!(service.status().await.unwrap().is_running);
        // Dropped without a clean stop: the persisted intent says running.
    }

    let service = service_in(&dir).await;
    // The stored intent survives for the daemon's resume decision.
    assert!(service.intended_running().await.unwrap());
    let node = service.status().await.unwrap();
    // Nothing is bound in the new process; the reported state is the
    // reconciled truth, not the stale flag.
    assert!(!node.is_running);

    // And the station can be brought up again.
    service.start().await.unwrap();
    assert!(service.status().await.unwrap().is_running);
    service.stop().await.unwrap();
}
