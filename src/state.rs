//! Application state: the session store, loaded configuration and the optional
//! model client.
//!
//! Every login gets its own `WizardSession`. Sessions live in memory only and
//! are dropped on logout or restart.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::agent::ExamAgent;
use crate::config::{load_agent_config_from_env, AgentConfig};
use crate::error::{AgentError, WizardError};
use crate::openai::OpenAI;
use crate::wizard::WizardSession;

pub type SharedSession = Arc<Mutex<WizardSession>>;

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<RwLock<HashMap<String, SharedSession>>>,
    pub agent: Option<Arc<dyn ExamAgent>>,
    pub config: Arc<AgentConfig>,
}

impl AppState {
    /// Build state from env: load config, init the OpenAI client if a key is set.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let config = load_agent_config_from_env().unwrap_or_default();

        let agent: Option<Arc<dyn ExamAgent>> =
            match OpenAI::from_env(config.prompts.clone(), config.wizard.clone()) {
                Some(oa) => {
                    info!(target: "examgen_backend", agent = %oa.describe(), "OpenAI enabled.");
                    Some(Arc::new(oa))
                }
                None => {
                    warn!(target: "examgen_backend", "OpenAI disabled (no OPENAI_API_KEY). Generation steps will fail until configured.");
                    None
                }
            };

        Self::with_agent(config, agent)
    }

    pub fn with_agent(config: AgentConfig, agent: Option<Arc<dyn ExamAgent>>) -> Self {
        info!(
            target: "examgen_backend",
            accounts = config.accounts.len(),
            require_corpus = config.wizard.require_requirements_corpus,
            "Wizard configuration ready"
        );
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            agent,
            config: Arc::new(config),
        }
    }

    /// Check credentials against the configured accounts and open a session.
    #[instrument(level = "info", skip(self, password), fields(%username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<SharedSession, WizardError> {
        let account = self
            .config
            .accounts
            .iter()
            .find(|a| a.username == username && a.password == password)
            .ok_or(WizardError::BadCredentials)?;

        let id = Uuid::new_v4().to_string();
        let session = WizardSession::new(
            id.clone(),
            account.username.clone(),
            account.role,
            self.config.exam_defaults.clone(),
            Arc::new(self.config.wizard.clone()),
        );
        let shared = Arc::new(Mutex::new(session));
        self.sessions.write().await.insert(id.clone(), shared.clone());
        info!(target: "wizard", session = %id, role = ?account.role, "Session opened");
        Ok(shared)
    }

    pub async fn session(&self, id: &str) -> Result<SharedSession, WizardError> {
        self.sessions
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| WizardError::NotFound(format!("phiên làm việc {id}")))
    }

    /// Returns false when the session did not exist.
    pub async fn logout(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id).is_some();
        if removed {
            info!(target: "wizard", session = %id, "Session closed");
        }
        removed
    }

    pub fn agent(&self) -> Result<Arc<dyn ExamAgent>, WizardError> {
        self.agent.clone().ok_or(WizardError::Agent(AgentError::Disabled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Role;

    #[tokio::test]
    async fn login_opens_and_logout_drops_sessions() {
        let state = AppState::with_agent(AgentConfig::default(), None);
        assert!(matches!(state.login("admin", "sai").await, Err(WizardError::BadCredentials)));

        let shared = state.login("admin", "admin123").await.expect("default account");
        let id = {
            let s = shared.lock().await;
            assert_eq!(s.role, Role::Admin);
            s.id.clone()
        };
        assert!(state.session(&id).await.is_ok());
        assert!(state.logout(&id).await);
        assert!(state.session(&id).await.is_err());
        assert!(!state.logout(&id).await);
    }

    #[test]
    fn missing_agent_is_reported() {
        let state = AppState::with_agent(AgentConfig::default(), None);
        assert!(matches!(state.agent(), Err(WizardError::Agent(AgentError::Disabled))));
    }
}
