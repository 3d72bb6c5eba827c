//! Discovery controller
//!
//! The [`DiscoveryController`] owns the lifecycle of discovery sessions. Starting a session
//! subscribes to the mode's notification classes, arms the discovery timer and asks the
//! platform to start discovery; a spawned worker then routes notifications until the timer
//! fires or [`DiscoveryController::stop`] is called. Teardown always runs exactly once, on the
//! worker.
//!
//! The controller is cheap to clone and every clone drives the same session. `start` and
//! `stop` are serialized, so a concurrent pair never tears the same session down twice.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock as StdRwLock};

use futures::stream::SelectAll;
use serde::Serialize;
use tokio::sync::{oneshot, watch, Mutex as AsyncMutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::adapter::BluetoothAdapter;
use crate::config::DiscoveryConfig;
use crate::errors::{BluescanError, Result};
use crate::mode::OperationMode;
use crate::platform::Platform;
use crate::properties::PropertyMap;
use crate::registry::{DeviceRecord, DeviceRegistry};
use crate::session::{
    DeviceCallback, SessionHandlers, SessionSummary, SessionWorker, SharedCallback,
};

// ----------------------------------------------------------------------------
// Session State
// ----------------------------------------------------------------------------

/// Lifecycle state of the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No session is active
    Idle,
    /// A start is in progress
    Starting,
    /// A session is active and its worker is routing notifications
    Running,
}

struct ActiveSession {
    id: u64,
    mode: OperationMode,
    registry: Arc<RwLock<DeviceRegistry>>,
    shutdown: Option<oneshot::Sender<()>>,
    worker: JoinHandle<SessionSummary>,
}

/// State shared by every clone of a controller and by its session workers
struct ControllerShared {
    lifecycle: AsyncMutex<()>,
    active: Mutex<Option<ActiveSession>>,
    state: watch::Sender<SessionState>,
    callback: SharedCallback,
    last_summary: Mutex<Option<SessionSummary>>,
    next_session_id: AtomicU64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ControllerShared {
    /// Called by a worker once its teardown has finished
    fn complete(&self, session_id: u64, summary: &SessionSummary) {
        let mut active = lock(&self.active);
        if active.as_ref().map(|session| session.id) == Some(session_id) {
            *active = None;
        }
        *lock(&self.last_summary) = Some(summary.clone());
        self.state.send_replace(SessionState::Idle);
    }
}

// ----------------------------------------------------------------------------
// Discovery Controller
// ----------------------------------------------------------------------------

/// Starts, supervises and stops discovery sessions on one adapter
pub struct DiscoveryController<P: Platform> {
    platform: Arc<P>,
    config: DiscoveryConfig,
    shared: Arc<ControllerShared>,
}

impl<P: Platform> Clone for DiscoveryController<P> {
    fn clone(&self) -> Self {
        Self {
            platform: Arc::clone(&self.platform),
            config: self.config.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<P: Platform> DiscoveryController<P> {
    /// Create an idle controller
    pub fn new(platform: Arc<P>, config: DiscoveryConfig) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        Self {
            platform,
            config,
            shared: Arc::new(ControllerShared {
                lifecycle: AsyncMutex::new(()),
                active: Mutex::new(None),
                state,
                callback: Arc::new(StdRwLock::new(None)),
                last_summary: Mutex::new(None),
                next_session_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Facade over the adapter this controller discovers on
    pub fn adapter(&self) -> BluetoothAdapter<P> {
        BluetoothAdapter::new(Arc::clone(&self.platform))
    }

    /// Register the callback invoked once per newly found device, replacing any previous one
    ///
    /// The callback runs on the session worker; it should return quickly.
    pub fn set_on_new_device_found<F>(&self, callback: F)
    where
        F: Fn(&PropertyMap) + Send + Sync + 'static,
    {
        let callback: DeviceCallback = Arc::new(callback);
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_on_new_device_found(&self) {
        *self
            .shared
            .callback
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Start a session in the mode named `mode`
    pub async fn start(&self, mode: &str) -> Result<()> {
        let mode = mode.parse::<OperationMode>().map_err(|e| {
            error!("Undefined mode : {}", mode);
            e
        })?;
        self.start_mode(mode).await
    }

    /// Start a session in `mode`, first stopping any session that is still active
    pub async fn start_mode(&self, mode: OperationMode) -> Result<()> {
        let _lifecycle = self.shared.lifecycle.lock().await;

        if let Some(previous) = self.take_active() {
            debug!("Replacing active {} session", previous.mode);
            self.finish(previous).await;
        }

        self.shared.state.send_replace(SessionState::Starting);
        info!("Starting operation mode : {}", mode);

        let worker = match self.prepare(mode).await {
            Ok(worker) => worker,
            Err(e) => {
                error!("Failed to start {} session: {}", mode, e);
                self.shared.state.send_replace(SessionState::Idle);
                return Err(e);
            }
        };

        // The slot stays locked until the worker is installed so a session that ends
        // immediately still finds itself there on completion.
        let mut active = lock(&self.shared.active);
        let id = self.shared.next_session_id.fetch_add(1, Ordering::Relaxed);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let registry = Arc::clone(&worker.handlers.registry);
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            let summary = worker.run(shutdown_rx).await;
            shared.complete(id, &summary);
            summary
        });

        *active = Some(ActiveSession {
            id,
            mode,
            registry,
            shutdown: Some(shutdown_tx),
            worker: handle,
        });
        self.shared.state.send_replace(SessionState::Running);
        Ok(())
    }

    /// Subscribe, arm the timer and start discovery; dropping the returned worker unsubscribes
    async fn prepare(&self, mode: OperationMode) -> Result<SessionWorker<P>> {
        let timeout = self.config.discovery_timeout();
        let started_at = Instant::now();
        let deadline = started_at.checked_add(timeout).ok_or_else(|| {
            BluescanError::config_error(format!(
                "Discovery timeout of {}s is out of range",
                timeout.as_secs()
            ))
        })?;

        let adapter_path = self.platform.connect().await?;
        debug!("Using adapter {}", adapter_path);

        let mut notifications = SelectAll::new();
        for class in mode.notification_classes() {
            notifications.push(self.platform.subscribe(*class).await?);
            debug!("Subscribed to {}", class);
        }

        self.platform.start_discovery().await?;
        info!("Discovery started for {}s", timeout.as_secs());

        Ok(SessionWorker {
            mode,
            handlers: SessionHandlers {
                platform: Arc::clone(&self.platform),
                registry: Arc::new(RwLock::new(DeviceRegistry::new())),
                callback: Arc::clone(&self.shared.callback),
            },
            notifications,
            started_at,
            deadline,
        })
    }

    /// Stop the active session and wait for its teardown
    ///
    /// Returns `None` and logs an error when no session is active.
    pub async fn stop(&self) -> Option<SessionSummary> {
        let _lifecycle = self.shared.lifecycle.lock().await;

        match self.take_active() {
            Some(session) => self.finish(session).await,
            None => {
                error!("Discovery session is not running");
                None
            }
        }
    }

    fn take_active(&self) -> Option<ActiveSession> {
        lock(&self.shared.active).take()
    }

    async fn finish(&self, mut session: ActiveSession) -> Option<SessionSummary> {
        if let Some(shutdown) = session.shutdown.take() {
            // The worker may already be tearing down after a timeout
            let _ = shutdown.send(());
        }

        match session.worker.await {
            Ok(summary) => Some(summary),
            Err(e) => {
                error!("Discovery session {} failed: {}", session.id, e);
                self.shared.state.send_replace(SessionState::Idle);
                None
            }
        }
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.state() == SessionState::Running
    }

    /// Receiver observing every state transition
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    /// Wait until no session is active and return the latest summary
    pub async fn wait_idle(&self) -> Option<SessionSummary> {
        let mut state = self.shared.state.subscribe();
        // The sender lives in `shared`, so the channel cannot close while `self` exists
        let _ = state.wait_for(|state| *state == SessionState::Idle).await;
        self.last_summary()
    }

    /// Mode of the active session
    pub fn mode(&self) -> Option<OperationMode> {
        lock(&self.shared.active).as_ref().map(|session| session.mode)
    }

    /// Summary of the most recently finished session
    pub fn last_summary(&self) -> Option<SessionSummary> {
        lock(&self.shared.last_summary).clone()
    }

    /// Device counter of the active session; zero when idle
    pub async fn device_count(&self) -> usize {
        match self.active_registry() {
            Some(registry) => registry.read().await.device_count(),
            None => 0,
        }
    }

    /// Records of the active session sorted by path; empty when idle
    pub async fn devices(&self) -> Vec<DeviceRecord> {
        match self.active_registry() {
            Some(registry) => registry.read().await.snapshot(),
            None => Vec::new(),
        }
    }

    fn active_registry(&self) -> Option<Arc<RwLock<DeviceRegistry>>> {
        lock(&self.shared.active)
            .as_ref()
            .map(|session| Arc::clone(&session.registry))
    }
}
