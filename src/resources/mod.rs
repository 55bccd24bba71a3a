//! Resource manager - ports, API budgets and host load
//!
//! Bookkeeping here is advisory. Nothing stops an agent from binding a port
//! or calling a service without asking first; the guarantees only hold when
//! every call site checks in. `check_rate_limit` followed by `record_call`
//! is not atomic either, so two callers may both see the last free slot.

mod ports;
mod rate;
mod system;

pub use ports::{BindProbe, ListeningProbe, PortProbe};
pub use rate::{RATE_WINDOW, RateStatus, default_rate_limits};
pub use system::{HostProbe, OverloadThresholds, SystemProbe, SystemSample};

use parking_lot::Mutex;
use rate::RateWindow;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Interval between budget checks in `wait_for_availability`
pub const RATE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Number of ports tried from the preferred one
pub const DEFAULT_PORT_PROBE_SPAN: u16 = 100;

/// Aggregated view for dashboards
#[derive(Debug, Clone, Serialize)]
pub struct ResourceSummary {
    pub ports: BTreeMap<u16, String>,
    pub rate_limits: BTreeMap<String, RateStatus>,
    pub system: SystemSample,
    pub overloaded: bool,
}

#[derive(Default)]
struct ResourceState {
    /// Claimed ports and their owners
    ports: BTreeMap<u16, String>,
    /// Calls per minute by service
    limits: BTreeMap<String, u32>,
    /// Recent call timestamps by service
    windows: HashMap<String, RateWindow>,
}

/// Tracks ports, per-service call budgets and host load
pub struct ResourceManager {
    state: Mutex<ResourceState>,
    probe_span: u16,
    overload: OverloadThresholds,
    port_probe: Box<dyn PortProbe>,
    system_probe: Box<dyn SystemProbe>,
}

impl ResourceManager {
    pub fn new(
        rate_limits: BTreeMap<String, u32>,
        probe_span: u16,
        overload: OverloadThresholds,
    ) -> Self {
        Self {
            state: Mutex::new(ResourceState {
                limits: rate_limits,
                ..Default::default()
            }),
            probe_span: probe_span.max(1),
            overload,
            port_probe: Box::new(ListeningProbe),
            system_probe: Box::new(HostProbe::default()),
        }
    }

    /// Replace the host port check
    pub fn with_port_probe(mut self, probe: impl PortProbe + 'static) -> Self {
        self.port_probe = Box::new(probe);
        self
    }

    /// Replace the host resource sampler
    pub fn with_system_probe(mut self, probe: impl SystemProbe + 'static) -> Self {
        self.system_probe = Box::new(probe);
        self
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    /// Claim `preferred` or the first free port after it
    ///
    /// Returns `None` when the whole probe window is taken.
    pub fn allocate_port(&self, agent: &str, preferred: u16) -> Option<u16> {
        let mut state = self.state.lock();

        let last = preferred.saturating_add(self.probe_span - 1);
        for port in preferred..=last {
            if !state.ports.contains_key(&port) && self.port_probe.is_free(port) {
                state.ports.insert(port, agent.to_string());
                if port == preferred {
                    info!(port, agent, "Allocated port");
                } else {
                    info!(port, preferred, agent, "Allocated alternative port");
                }
                return Some(port);
            }
        }

        warn!(preferred, agent, span = self.probe_span, "No free port in probe window");
        None
    }

    /// Release a port owned by `agent`
    pub fn release_port(&self, port: u16, agent: &str) -> bool {
        let mut state = self.state.lock();
        match state.ports.get(&port) {
            Some(owner) if owner == agent => {
                state.ports.remove(&port);
                debug!(port, agent, "Released port");
                true
            }
            _ => false,
        }
    }

    pub fn port_owner(&self, port: u16) -> Option<String> {
        self.state.lock().ports.get(&port).cloned()
    }

    pub fn allocated_ports(&self) -> BTreeMap<u16, String> {
        self.state.lock().ports.clone()
    }

    // ------------------------------------------------------------------
    // Rate limits
    // ------------------------------------------------------------------

    /// Register or override a service's calls-per-minute budget
    pub fn set_rate_limit(&self, service: &str, calls_per_minute: u32) {
        self.state
            .lock()
            .limits
            .insert(service.to_string(), calls_per_minute);
    }

    pub fn rate_limits(&self) -> BTreeMap<String, u32> {
        self.state.lock().limits.clone()
    }

    /// Whether another call to `service` fits in the current window
    pub fn check_rate_limit(&self, service: &str) -> bool {
        let mut state = self.state.lock();
        let Some(&limit) = state.limits.get(service) else {
            return true;
        };

        let now = Instant::now();
        let window = state.windows.entry(service.to_string()).or_default();
        window.prune(now);
        window.count_recent(now) < limit as usize
    }

    /// Record a call to `service`; does not enforce the limit
    pub fn record_call(&self, service: &str, agent: &str) {
        let mut state = self.state.lock();
        state
            .windows
            .entry(service.to_string())
            .or_default()
            .record(Instant::now());
        debug!(service, agent, "Recorded service call");
    }

    /// Calls left in the current window; `None` for unlimited services
    pub fn remaining_calls(&self, service: &str) -> Option<u32> {
        let state = self.state.lock();
        let limit = *state.limits.get(service)?;
        let recent = state
            .windows
            .get(service)
            .map(|w| w.count_recent(Instant::now()))
            .unwrap_or(0);
        Some(limit.saturating_sub(u32::try_from(recent).unwrap_or(u32::MAX)))
    }

    /// Poll until `service` has budget or `timeout` passes
    pub async fn wait_for_availability(&self, service: &str, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.check_rate_limit(service) {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                debug!(service, ?timeout, "Gave up waiting for rate budget");
                return false;
            }
            tokio::time::sleep(RATE_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    // ------------------------------------------------------------------
    // Host load
    // ------------------------------------------------------------------

    pub fn system_resources(&self) -> SystemSample {
        self.system_probe.sample()
    }

    pub fn is_overloaded(&self) -> bool {
        self.overload.is_exceeded(&self.system_resources())
    }

    pub fn resource_summary(&self) -> ResourceSummary {
        let system = self.system_resources();
        let overloaded = self.overload.is_exceeded(&system);

        let rate_limits = self
            .rate_limits()
            .into_iter()
            .map(|(service, limit)| {
                let remaining = self.remaining_calls(&service).unwrap_or(limit);
                (service, RateStatus::new(limit, remaining))
            })
            .collect();

        ResourceSummary {
            ports: self.allocated_ports(),
            rate_limits,
            system,
            overloaded,
        }
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new(
            default_rate_limits(),
            DEFAULT_PORT_PROBE_SPAN,
            OverloadThresholds::default(),
        )
    }
}
