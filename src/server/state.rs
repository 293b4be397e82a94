//! Application state management

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::training::{AlgorithmRegistry, TrainEngine};

use super::ServerConfig;

/// Session counters reported by the health endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionCounters {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub active: u64,
}

/// Application state shared across handlers
#[derive(Debug)]
pub struct AppState {
    pub config: ServerConfig,
    pub session: SessionConfig,
    pub started_at: DateTime<Utc>,
    registry: AlgorithmRegistry,
    counters: Mutex<SessionCounters>,
}

impl AppState {
    pub fn new(config: ServerConfig, session: SessionConfig) -> Self {
        let registry = AlgorithmRegistry::for_config(&session);
        Self::with_registry(config, session, registry)
    }

    /// State serving a specific registry instead of the profile's catalog
    pub fn with_registry(config: ServerConfig, session: SessionConfig, registry: AlgorithmRegistry) -> Self {
        Self {
            config,
            session,
            started_at: Utc::now(),
            registry,
            counters: Mutex::new(SessionCounters::default()),
        }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Fresh engine for one request
    pub fn engine(&self) -> TrainEngine {
        TrainEngine::with_registry(self.session.clone(), self.registry.clone())
    }

    pub fn counters(&self) -> SessionCounters {
        *self.counters.lock()
    }

    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }

    /// Count a session as started and active until the guard drops.
    pub fn begin_session(self: &Arc<Self>) -> ActiveSession {
        let mut counters = self.counters.lock();
        counters.started += 1;
        counters.active += 1;
        ActiveSession {
            state: Arc::clone(self),
            finished: false,
        }
    }
}

/// Marks a session active; records the outcome when finished or dropped
#[derive(Debug)]
pub struct ActiveSession {
    state: Arc<AppState>,
    finished: bool,
}

impl ActiveSession {
    pub fn finish(mut self, success: bool) {
        self.finished = true;
        let mut counters = self.state.counters.lock();
        if success {
            counters.completed += 1;
        } else {
            counters.failed += 1;
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        let mut counters = self.state.counters.lock();
        counters.active = counters.active.saturating_sub(1);
        // Abandoned sessions (disconnect or panic) count as failed.
        if !self.finished {
            counters.failed += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_guard_counts() {
        let state = Arc::new(AppState::new(ServerConfig::default(), SessionConfig::default()));

        let first = state.begin_session();
        let second = state.begin_session();
        assert_eq!(state.counters().active, 2);

        first.finish(true);
        drop(second);

        let counters = state.counters();
        assert_eq!(counters.started, 2);
        assert_eq!(counters.completed, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.active, 0);
    }
}
