//! Online/offline tracking for the link to the desktop.
//!
//! Two independent sources feed the monitor: edge-triggered connectivity
//! reports from the host environment, and a periodic active probe against the
//! server's health endpoint. Listeners hear about each transition once, in
//! the order the transitions were applied.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use padlink_core::link::{NetworkStatus, NETWORK_PROBE_INTERVAL};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Handle returned by [`NetworkStatusMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Arc<dyn Fn(NetworkStatus) + Send + Sync>;

/// Active reachability check used by the periodic probe.
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true when the server answered the health check.
    async fn probe(&self) -> bool;
}

struct MonitorState {
    is_online: bool,
    next_listener_id: u64,
    listeners: Vec<(ListenerId, Listener)>,
}

pub struct NetworkStatusMonitor {
    state: Mutex<MonitorState>,
    /// Held from a status change until its last listener returns.
    notify: Mutex<()>,
    probe_task: Mutex<Option<JoinHandle<()>>>,
    probe_interval: Duration,
}

impl Default for NetworkStatusMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl NetworkStatusMonitor {
    /// Monitor that starts out assuming the link is up.
    pub fn new() -> Self {
        Self::with_initial_status(true)
    }

    pub fn with_initial_status(is_online: bool) -> Self {
        Self {
            state: Mutex::new(MonitorState {
                is_online,
                next_listener_id: 0,
                listeners: Vec::new(),
            }),
            notify: Mutex::new(()),
            probe_task: Mutex::new(None),
            probe_interval: NETWORK_PROBE_INTERVAL,
        }
    }

    /// Override the probe period (tests and hosts with their own cadence).
    pub fn with_probe_interval(mut self, interval: Duration) -> Self {
        self.probe_interval = interval;
        self
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, MonitorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_notify(&self) -> std::sync::MutexGuard<'_, ()> {
        self.notify
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_online(&self) -> bool {
        self.lock_state().is_online
    }

    pub fn status(&self) -> NetworkStatus {
        NetworkStatus {
            is_online: self.is_online(),
        }
    }

    /// Register a listener. It is called immediately with the current status,
    /// then once per transition in registration order.
    ///
    /// Listeners run on the thread that applied the transition and must not
    /// call back into `subscribe` or `report_connectivity`.
    pub fn subscribe<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(NetworkStatus) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(listener);
        let _notify = self.lock_notify();
        let (id, status) = {
            let mut state = self.lock_state();
            let id = ListenerId(state.next_listener_id);
            state.next_listener_id += 1;
            state.listeners.push((id, Arc::clone(&listener)));
            (id, NetworkStatus {
                is_online: state.is_online,
            })
        };
        invoke_listener(id, &listener, status);
        id
    }

    /// Remove a listener. Returns false when the id was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut state = self.lock_state();
        let before = state.listeners.len();
        state.listeners.retain(|(listener_id, _)| *listener_id != id);
        state.listeners.len() != before
    }

    pub fn listener_count(&self) -> usize {
        self.lock_state().listeners.len()
    }

    /// Edge-triggered connectivity signal from the host environment.
    pub fn report_connectivity(&self, is_online: bool) {
        self.update(is_online, "environment");
    }

    /// Apply a status observation. Returns true when it was a transition.
    fn update(&self, is_online: bool, source: &str) -> bool {
        let _notify = self.lock_notify();
        let listeners = {
            let mut state = self.lock_state();
            if state.is_online == is_online {
                return false;
            }
            state.is_online = is_online;
            state.listeners.clone()
        };

        info!(
            "[Network] Link is now {} (source={})",
            if is_online { "online" } else { "offline" },
            source
        );
        let status = NetworkStatus { is_online };
        for (id, listener) in &listeners {
            invoke_listener(*id, listener, status);
        }
        true
    }

    /// Start the periodic probe, replacing a probe that is already running.
    ///
    /// The task holds both the monitor and the probe weakly: it ends once
    /// either is dropped, so a probe that owns this monitor (the transport
    /// does) forms no cycle. Keep the probe alive for as long as it should run.
    pub fn start_probe<P>(self: &Arc<Self>, probe: &Arc<P>)
    where
        P: HealthProbe + 'static,
    {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let probe: Weak<P> = Arc::downgrade(probe);
        let period = self.probe_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(check) = probe.upgrade() else {
                    debug!("[Network] Health check dropped, stopping checks");
                    break;
                };
                let reachable = check.probe().await;
                drop(check);
                let Some(monitor) = monitor.upgrade() else {
                    break;
                };
                debug!("[Network] Probe result reachable={}", reachable);
                monitor.update(reachable, "probe");
            }
        });

        let previous = self
            .probe_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .replace(handle);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub fn stop_probe(&self) {
        let handle = self
            .probe_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            handle.abort();
            debug!("[Network] Probe stopped");
        }
    }

    pub fn is_probing(&self) -> bool {
        self.probe_task
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl std::fmt::Debug for NetworkStatusMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock_state();
        f.debug_struct("NetworkStatusMonitor")
            .field("is_online", &state.is_online)
            .field("listeners", &state.listeners.len())
            .field("probe_interval", &self.probe_interval)
            .finish()
    }
}

impl Drop for NetworkStatusMonitor {
    fn drop(&mut self) {
        self.stop_probe();
    }
}

fn invoke_listener(id: ListenerId, listener: &Listener, status: NetworkStatus) {
    if catch_unwind(AssertUnwindSafe(|| listener(status))).is_err() {
        warn!("[Network] Listener {:?} panicked; continuing with the rest", id);
    }
}
