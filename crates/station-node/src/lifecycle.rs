//! Station lifecycle control.
//!
//! The controller owns the `Stopped -> Starting -> Running -> Stopping`
//! state machine and is the single authority on whether the station is
//! actually reachable: reported state is derived from the channel
//! manager's bound sockets at query time, never trusted from a persisted
//! flag. `start` and `stop` are mutually exclusive under a
//! single-operation-in-flight lock; a `stop` issued while `start` is in
//! flight wins, and the controller lands in `Stopped`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use station_net::{ChannelManager, ChannelParams};
use station_shared::ChannelType;

use crate::error::NodeError;
use crate::Result;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// One observed transition, forwarded to the event stream by the service.
#[derive(Debug, Clone)]
pub struct LifecycleTransition {
    pub state: LifecycleState,
    pub error: Option<String>,
}

pub struct LifecycleController {
    channels: Arc<ChannelManager>,
    state: Mutex<LifecycleState>,
    op_lock: Mutex<()>,
    cancel_requested: AtomicBool,
    started_at: Mutex<Option<Instant>>,
    transitions: mpsc::UnboundedSender<LifecycleTransition>,
}

impl LifecycleController {
    /// Returns the controller and the transition stream it reports on.
    pub fn new(
        channels: Arc<ChannelManager>,
    ) -> (Self, mpsc::UnboundedReceiver<LifecycleTransition>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                channels,
                state: Mutex::new(LifecycleState::Stopped),
                op_lock: Mutex::new(()),
                cancel_requested: AtomicBool::new(false),
                started_at: Mutex::new(None),
                transitions: tx,
            },
            rx,
        )
    }

    /// Bring the station up: bind every channel in `plan`, in order.
    ///
    /// Rejected with `AlreadyRunning` while starting or running. On any
    /// bind failure the already-bound channels are rolled back and the
    /// controller returns to `Stopped` with the error attached; no
    /// half-started state survives. Returns the bound channel set.
    pub async fn start(&self, plan: Vec<ChannelParams>) -> Result<Vec<ChannelType>> {
        if matches!(
            *self.state.lock().await,
            LifecycleState::Starting | LifecycleState::Running
        ) {
            return Err(NodeError::AlreadyRunning);
        }

        let _op = self.op_lock.lock().await;
        {
            let mut state = self.state.lock().await;
            if matches!(*state, LifecycleState::Starting | LifecycleState::Running) {
                return Err(NodeError::AlreadyRunning);
            }
            *state = LifecycleState::Starting;
        }
        self.cancel_requested.store(false, Ordering::SeqCst);
        self.emit(LifecycleState::Starting, None);

        let mut bound: Vec<ChannelType> = Vec::new();
        for params in plan {
            if self.cancel_requested.load(Ordering::SeqCst) {
                return self.abort_start(bound, None).await;
            }
            let channel_type = params.channel_type();
            match self.channels.enable(params).await {
                Ok(_) => bound.push(channel_type),
                Err(e) => {
                    warn!(channel = %channel_type, error = %e, "Channel bind failed, rolling back");
                    let message = e.to_string();
                    self.rollback(&bound).await;
                    self.set_state(LifecycleState::Stopped).await;
                    self.emit(LifecycleState::Stopped, Some(message));
                    return Err(e.into());
                }
            }
        }
        if self.cancel_requested.load(Ordering::SeqCst) {
            return self.abort_start(bound, None).await;
        }

        *self.started_at.lock().await = Some(Instant::now());
        self.set_state(LifecycleState::Running).await;
        self.emit(LifecycleState::Running, None);
        info!(channels = ?bound, "Station running");
        Ok(bound)
    }

    /// Take the station down. Honored even against an in-flight `start`:
    /// the cancel flag is raised first, then the operation lock is taken.
    pub async fn stop(&self) -> Result<()> {
        let was_active = {
            let state = self.state.lock().await;
            if *state == LifecycleState::Starting {
                self.cancel_requested.store(true, Ordering::SeqCst);
            }
            matches!(*state, LifecycleState::Starting | LifecycleState::Running)
        };

        let _op = self.op_lock.lock().await;
        let current = *self.state.lock().await;
        match current {
            LifecycleState::Running => {
                self.set_state(LifecycleState::Stopping).await;
                self.emit(LifecycleState::Stopping, None);

                self.channels.disable_all().await;
                *self.started_at.lock().await = None;

                self.set_state(LifecycleState::Stopped).await;
                self.emit(LifecycleState::Stopped, None);
                info!("Station stopped");
                Ok(())
            }
            LifecycleState::Stopped if was_active => {
                // The in-flight start observed the cancel and already
                // unwound to Stopped.
                Ok(())
            }
            LifecycleState::Stopped => Err(NodeError::NotRunning),
            // The operation lock is held, so no start/stop is mid-flight;
            // unwind whatever is bound.
            LifecycleState::Starting | LifecycleState::Stopping => {
                self.channels.disable_all().await;
                *self.started_at.lock().await = None;
                self.set_state(LifecycleState::Stopped).await;
                self.emit(LifecycleState::Stopped, None);
                Ok(())
            }
        }
    }

    async fn abort_start(
        &self,
        bound: Vec<ChannelType>,
        error: Option<String>,
    ) -> Result<Vec<ChannelType>> {
        info!("Start cancelled by stop request, unwinding");
        self.rollback(&bound).await;
        *self.started_at.lock().await = None;
        self.set_state(LifecycleState::Stopped).await;
        self.emit(LifecycleState::Stopped, error);
        Err(NodeError::StartCancelled)
    }

    async fn rollback(&self, bound: &[ChannelType]) {
        for channel_type in bound {
            if let Err(e) = self.channels.disable(*channel_type).await {
                warn!(channel = %channel_type, error = %e, "Rollback disable failed");
            }
        }
    }

    async fn set_state(&self, state: LifecycleState) {
        *self.state.lock().await = state;
    }

    fn emit(&self, state: LifecycleState, error: Option<String>) {
        let _ = self.transitions.send(LifecycleTransition { state, error });
    }

    /// The controller's own view of the state machine.
    pub async fn state(&self) -> LifecycleState {
        *self.state.lock().await
    }

    /// The reported state, derived from the actually bound channels.
    ///
    /// `intended_running` is the persisted intent flag; any divergence
    /// between intent, controller state, and bound sockets is logged as a
    /// reconciliation warning and the bound-socket truth wins.
    pub async fn reconciled_state(&self, intended_running: bool) -> LifecycleState {
        let state = *self.state.lock().await;
        if matches!(state, LifecycleState::Starting | LifecycleState::Stopping) {
            return state;
        }

        let actually_bound = !self.channels.bound_channels().await.is_empty();
        let believed_running = state == LifecycleState::Running;
        if actually_bound != believed_running {
            warn!(
                believed = ?state,
                actually_bound,
                "Reconciliation: controller state diverges from bound sockets"
            );
        }
        if intended_running != actually_bound {
            warn!(
                intended = intended_running,
                actual = actually_bound,
                "Reconciliation: persisted intent diverges from actual state"
            );
        }

        if actually_bound {
            LifecycleState::Running
        } else {
            LifecycleState::Stopped
        }
    }

    pub async fn uptime_secs(&self) -> u64 {
        self.started_at
            .lock()
            .await
            .map(|t| t.elapsed().as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use station_net::{
        CertificateManager, HotspotBackend, SelfSignedAuthority, SoftApBackend,
    };
    use tokio::net::TcpListener;

    fn controller_with(
        backend: Arc<dyn HotspotBackend>,
    ) -> (
        Arc<LifecycleController>,
        Arc<ChannelManager>,
        mpsc::UnboundedReceiver<LifecycleTransition>,
    ) {
        let certs = Arc::new(CertificateManager::new(Arc::new(SelfSignedAuthority)));
        let channels = Arc::new(ChannelManager::new(certs, backend));
        let (controller, rx) = LifecycleController::new(channels.clone());
        (Arc::new(controller), channels, rx)
    }

    fn radio_plan() -> Vec<ChannelParams> {
        vec![
            ChannelParams::Hotspot {
                station_name: "Alpha".into(),
            },
            ChannelParams::ShortRangeRadio,
        ]
    }

    #[tokio::test]
    async fn test_start_then_double_start() {
        let (controller, channels, _rx) = controller_with(Arc::new(SoftApBackend::default()));

        let bound = controller.start(radio_plan()).await.unwrap();
        assert_eq!(
            bound,
            vec![ChannelType::LocalNetwork, ChannelType::ShortRangeRadio]
        );

        let err = controller.start(radio_plan()).await.unwrap_err();
        assert!(matches!(err, NodeError::AlreadyRunning));
        // Idempotence of effect: the bound set is unchanged.
        assert_eq!(
            channels.bound_channels().await,
            vec![ChannelType::LocalNetwork, ChannelType::ShortRangeRadio]
        );
    }

    #[tokio::test]
    async fn test_bind_failure_rolls_back_everything() {
        let (controller, channels, mut rx) = controller_with(Arc::new(SoftApBackend::default()));

        let holder = TcpListener::bind(("0.0.0.0", 0)).await.unwrap();
        let taken = holder.local_addr().unwrap().port();

        let plan = vec![
            ChannelParams::Hotspot {
                station_name: "Alpha".into(),
            },
            ChannelParams::Internet {
                params: station_net::InternetParams {
                    http_port: taken,
                    https_port: 0,
                    enable_ssl: false,
                    ssl_domain: None,
                },
                info: station_net::StationInfo {
                    name: "Alpha".into(),
                    callsign: "X3ABCDEF".into(),
                    network_name: "testnet".into(),
                },
            },
        ];

        let err = controller.start(plan).await.unwrap_err();
        assert!(err.to_string().contains(&taken.to_string()));

        assert_eq!(controller.state().await, LifecycleState::Stopped);
        assert!(channels.bound_channels().await.is_empty());

        // Transitions: Starting, then Stopped carrying the bind error.
        assert_eq!(rx.recv().await.unwrap().state, LifecycleState::Starting);
        let stopped = rx.recv().await.unwrap();
        assert_eq!(stopped.state, LifecycleState::Stopped);
        assert!(stopped.error.unwrap().contains(&taken.to_string()));
    }

    #[tokio::test]
    async fn test_stop_when_stopped_is_not_running() {
        let (controller, _channels, _rx) = controller_with(Arc::new(SoftApBackend::default()));
        let err = controller.stop().await.unwrap_err();
        assert!(matches!(err, NodeError::NotRunning));
    }

    #[tokio::test]
    async fn test_full_cycle_transitions_in_order() {
        let (controller, _channels, mut rx) = controller_with(Arc::new(SoftApBackend::default()));

        controller.start(radio_plan()).await.unwrap();
        controller.stop().await.unwrap();

        let states: Vec<LifecycleState> = [
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
            rx.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|t| t.state)
        .collect();
        assert_eq!(
            states,
            vec![
                LifecycleState::Starting,
                LifecycleState::Running,
                LifecycleState::Stopping,
                LifecycleState::Stopped,
            ]
        );
    }

    /// Backend whose group setup blocks long enough for a stop to land.
    struct SlowBackend {
        inner: SoftApBackend,
    }

    impl HotspotBackend for SlowBackend {
        fn start_group(&self, ssid: &str, passphrase: &str) -> std::io::Result<()> {
            std::thread::sleep(Duration::from_millis(100));
            self.inner.start_group(ssid, passphrase)
        }
        fn stop_group(&self) -> std::io::Result<()> {
            self.inner.stop_group()
        }
        fn active_ssid(&self) -> Option<String> {
            self.inner.active_ssid()
        }
        fn client_count(&self) -> u32 {
            self.inner.client_count()
        }
    }

    #[tokio::test]
    async fn test_stop_during_start_wins() {
        let (controller, channels, _rx) = controller_with(Arc::new(SlowBackend {
            inner: SoftApBackend::default(),
        }));

        let starter = {
            let controller = controller.clone();
            tokio::spawn(async move { controller.start(radio_plan()).await })
        };

        // Let the start reach the slow hotspot bind, then stop.
        tokio::time::sleep(Duration::from_millis(30)).await;
        controller.stop().await.unwrap();

        let result = starter.await.unwrap();
        assert!(matches!(result, Err(NodeError::StartCancelled)));
        assert_eq!(controller.state().await, LifecycleState::Stopped);
        assert!(channels.bound_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconciled_state_reports_actual() {
        let (controller, channels, _rx) = controller_with(Arc::new(SoftApBackend::default()));
        controller.start(radio_plan()).await.unwrap();

        // Sockets released behind the controller's back.
        channels.disable_all().await;

        // Persisted intent says running; the bound-socket truth wins.
        assert_eq!(
            controller.reconciled_state(true).await,
            LifecycleState::Stopped
        );
    }
}
