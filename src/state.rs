//! Application state: session store, quest gateway and the catalog.
//!
//! This module owns:
//!   - the in-memory session map (nothing is persisted)
//!   - the gateway (Gemini client + prompts from TOML or defaults)
//!   - the topic/location/objective catalog

use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::config::load_quest_config_from_env;
use crate::error::{FlowError, ModelError};
use crate::gateway::QuestGateway;
use crate::gemini::{GeminiClient, GenerativeModel};
use crate::session::{Session, SessionHandle};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<Uuid, SessionHandle>>>,
    pub gateway: QuestGateway,
    pub catalog: Arc<Catalog>,
}

impl AppState {
    /// Build state from env: load config, build the catalog, init the Gemini client.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Result<Self, ModelError> {
        let gemini = GeminiClient::from_env()?;
        info!(target: "quest_trainer", base_url = %gemini.base_url, model = %gemini.model, "Gemini client ready.");
        Ok(Self::with_model(Arc::new(gemini)))
    }

    /// Same as `new` but with an arbitrary model behind the gateway.
    pub fn with_model(model: Arc<dyn GenerativeModel>) -> Self {
        let cfg = load_quest_config_from_env();
        let prompts = cfg.as_ref().map(|c| c.prompts.clone()).unwrap_or_default();
        let catalog = match &cfg {
            Some(c) => Catalog::with_additions(&c.catalog),
            None => Catalog::builtin(),
        };
        info!(
            target: "quest_trainer",
            topics = catalog.topics.len(),
            locations = catalog.locations.len(),
            "Catalog loaded"
        );

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            gateway: QuestGateway::new(model, prompts),
            catalog: Arc::new(catalog),
        }
    }

    /// Create a session on the authoring screen.
    #[instrument(level = "debug", skip(self))]
    pub async fn create_session(&self) -> SessionHandle {
        let session = Session::new(&self.catalog);
        let id = session.id;
        let handle = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id, handle.clone());
        info!(target: "quest", session_id = %id, "Session created");
        handle
    }

    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn session(&self, id: Uuid) -> Result<SessionHandle, FlowError> {
        let handle = self.sessions.read().await.get(&id).cloned().ok_or(FlowError::UnknownSession)?;
        handle.lock().await.touch();
        Ok(handle)
    }

    /// Drop a session. Its ticker stops once the last handle is gone.
    #[instrument(level = "debug", skip(self), fields(%id))]
    pub async fn remove_session(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id);
        if let Some(handle) = &removed {
            handle.lock().await.reset();
        }
        removed.is_some()
    }

    /// Drop every session untouched for `ttl`. Returns how many went away.
    #[instrument(level = "debug", skip(self))]
    pub async fn sweep_idle(&self, ttl: Duration) -> usize {
        let handles: Vec<(Uuid, SessionHandle)> =
            self.sessions.read().await.iter().map(|(id, h)| (*id, h.clone())).collect();
        let mut idle = Vec::new();
        for (id, handle) in handles {
            if handle.lock().await.is_idle(ttl) {
                idle.push(id);
            }
        }
        let mut removed = 0;
        for id in idle {
            if self.remove_session(id).await {
                removed += 1;
            }
        }
        if removed > 0 {
            info!(target: "quest", removed, "Idle sessions swept");
        }
        removed
    }

    /// Background sweep once a minute (or once per `ttl` when shorter).
    pub fn spawn_idle_sweeper(self: Arc<Self>, ttl: Duration) -> tokio::task::JoinHandle<()> {
        let period = ttl.min(Duration::from_secs(60)).max(Duration::from_secs(1));
        debug!(target: "quest_trainer", ttl_secs = ttl.as_secs(), "Idle session sweeper started");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                self.sweep_idle(ttl).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedModel;

    #[tokio::test(start_paused = true)]
    async fn idle_sessions_are_swept() {
        let state = AppState::with_model(ScriptedModel::new([]));
        let ttl = Duration::from_secs(600);
        let stale = state.create_session().await.lock().await.id;
        let fresh = state.create_session().await.lock().await.id;

        tokio::time::advance(Duration::from_secs(400)).await;
        state.session(fresh).await.expect("fresh");
        tokio::time::advance(Duration::from_secs(300)).await;

        assert_eq!(state.sweep_idle(ttl).await, 1);
        assert_eq!(state.session(stale).await.err(), Some(FlowError::UnknownSession));
        assert!(state.session(fresh).await.is_ok());
    }
}
