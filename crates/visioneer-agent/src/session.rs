//! Session store.
//!
//! Each session lives behind its own async mutex. A turn holds that lock
//! from classification to the final context write, so two turns in the
//! same session run one after the other while other sessions proceed
//! independently. When a `ConversationRepository` is attached, turns and
//! context are written through to it and reloaded on first access, and a
//! handle no turn holds any more is dropped from memory.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tokio::sync::Mutex as AsyncMutex;
use tracing::debug;

use visioneer_core::types::Turn;
use visioneer_storage::ConversationRepository;

use crate::error::AgentError;
use crate::types::{Intent, Session, SessionContext};

/// Shared handle to one session; lock it for the duration of a turn.
pub type SessionHandle = Arc<AsyncMutex<Session>>;

pub struct SessionStore {
    sessions: Mutex<HashMap<String, SessionHandle>>,
    /// Serializes cache misses, so a reload never races a clear or an
    /// eviction of the same session.
    loading: AsyncMutex<()>,
    persistence: Option<Arc<ConversationRepository>>,
}

impl SessionStore {
    /// Store that keeps sessions in memory only.
    pub fn in_memory() -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            loading: AsyncMutex::new(()),
            persistence: None,
        }
    }

    /// Store that writes through to `repository`.
    pub fn with_persistence(repository: Arc<ConversationRepository>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            loading: AsyncMutex::new(()),
            persistence: Some(repository),
        }
    }

    fn map(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, SessionHandle>>, AgentError> {
        self.sessions
            .lock()
            .map_err(|e| AgentError::Storage(format!("session map poisoned: {}", e)))
    }

    fn cached(&self, session_id: &str) -> Result<Option<SessionHandle>, AgentError> {
        Ok(self.map()?.get(session_id).cloned())
    }

    async fn blocking<T, F>(&self, op: F) -> Result<Option<T>, AgentError>
    where
        T: Send + 'static,
        F: FnOnce(&ConversationRepository) -> Result<T, AgentError> + Send + 'static,
    {
        let Some(repository) = self.persistence.clone() else {
            return Ok(None);
        };
        tokio::task::spawn_blocking(move || op(&repository))
            .await
            .map_err(|e| AgentError::Storage(format!("session task failed: {}", e)))?
            .map(Some)
    }

    /// Return the session for `session_id`, creating it on first use.
    pub async fn get_or_create(&self, session_id: &str) -> Result<SessionHandle, AgentError> {
        if let Some(handle) = self.cached(session_id)? {
            return Ok(handle);
        }

        let _loading = self.loading.lock().await;
        if let Some(handle) = self.cached(session_id)? {
            return Ok(handle);
        }

        let id = session_id.to_string();
        let loaded = self
            .blocking(move |repo| {
                let record = repo.get_or_create(&id)?;
                let turns = repo.load_messages(&id)?;
                Ok((record, turns))
            })
            .await?;

        let mut session = Session::new(session_id);
        if let Some((record, turns)) = loaded {
            session.context = serde_json::from_value::<SessionContext>(record.context)
                .unwrap_or_default();
            session.turns = turns;
            session.created_at = record.created_at;
            session.updated_at = record.updated_at;
            debug!(session_id, turns = session.turns.len(), "Session loaded");
        }

        let handle = Arc::new(AsyncMutex::new(session));
        self.map()?
            .insert(session_id.to_string(), Arc::clone(&handle));
        Ok(handle)
    }

    /// Give back a handle obtained from `get_or_create`.
    ///
    /// With persistence attached, the cached entry is dropped once no other
    /// caller holds it; the next access reloads it from the repository.
    /// In-memory stores keep every session.
    pub fn release(&self, session_id: &str, handle: SessionHandle) {
        drop(handle);
        if self.persistence.is_none() {
            return;
        }
        let Ok(mut sessions) = self.map() else {
            return;
        };
        if sessions
            .get(session_id)
            .is_some_and(|entry| Arc::strong_count(entry) == 1)
        {
            sessions.remove(session_id);
            debug!(session_id, "Idle session evicted");
        }
    }

    /// Number of sessions currently held in memory.
    pub fn cached_len(&self) -> usize {
        self.map().map(|sessions| sessions.len()).unwrap_or(0)
    }

    /// Append a turn to a session, outside any in-flight turn.
    pub async fn append_turn(&self, session_id: &str, turn: Turn) -> Result<(), AgentError> {
        let handle = self.get_or_create(session_id).await?;
        let result = {
            let mut session = handle.lock().await;
            self.record_turn(&mut session, turn, None, serde_json::Value::Null)
                .await
        };
        self.release(session_id, handle);
        result
    }

    /// Append a turn to a session the caller already holds locked.
    pub(crate) async fn record_turn(
        &self,
        session: &mut Session,
        turn: Turn,
        intent: Option<Intent>,
        metadata: serde_json::Value,
    ) -> Result<(), AgentError> {
        session.turns.push(turn.clone());
        session.updated_at = Utc::now();

        let id = session.id.clone();
        let metadata = if metadata.is_null() {
            serde_json::json!({})
        } else {
            metadata
        };
        self.blocking(move |repo| {
            Ok(repo.append_message(&id, &turn, intent.map(|i| i.as_str()), &metadata)?)
        })
        .await?;
        Ok(())
    }

    /// Persist the session's context.
    pub(crate) async fn save_context(&self, session: &Session) -> Result<(), AgentError> {
        let id = session.id.clone();
        let context = serde_json::to_value(&session.context)
            .map_err(|e| AgentError::Storage(format!("context not serializable: {}", e)))?;
        self.blocking(move |repo| Ok(repo.save_context(&id, &context)?))
            .await?;
        Ok(())
    }

    /// Record which account is talking in this session.
    pub async fn attach_user(&self, session_id: &str, user_id: i64) -> Result<(), AgentError> {
        let id = session_id.to_string();
        self.blocking(move |repo| Ok(repo.attach_user(&id, user_id)?))
            .await?;
        Ok(())
    }

    /// Reset turns and context, keeping the identifier valid.
    ///
    /// Returns whether the session was known. Clearing twice is a no-op.
    pub async fn clear(&self, session_id: &str) -> Result<bool, AgentError> {
        let loading = self.loading.lock().await;
        let Some(handle) = self.cached(session_id)? else {
            // Nothing cached: keep reloads out until storage is cleared.
            let stored = self.clear_stored(session_id).await?;
            drop(loading);
            return Ok(stored);
        };
        drop(loading);

        // The turn lock covers the storage clear, so no turn can write
        // between the in-memory reset and the repository reset.
        let result = {
            let mut session = handle.lock().await;
            session.reset();
            self.clear_stored(session_id).await
        };
        self.release(session_id, handle);
        result.map(|_| true)
    }

    async fn clear_stored(&self, session_id: &str) -> Result<bool, AgentError> {
        let id = session_id.to_string();
        Ok(self
            .blocking(move |repo| Ok(repo.clear(&id)?))
            .await?
            .unwrap_or(false))
    }

    /// Ordered turns of a session, `None` if the session was never seen.
    pub async fn history(&self, session_id: &str) -> Result<Option<Vec<Turn>>, AgentError> {
        if let Some(handle) = self.cached(session_id)? {
            return Ok(Some(handle.lock().await.turns.clone()));
        }

        let id = session_id.to_string();
        let stored = self
            .blocking(move |repo| match repo.find(&id)? {
                Some(_) => Ok(Some(repo.load_messages(&id)?)),
                None => Ok(None),
            })
            .await?;
        Ok(stored.flatten())
    }

    /// Whether the session is known to this store.
    pub async fn exists(&self, session_id: &str) -> Result<bool, AgentError> {
        if self.cached(session_id)?.is_some() {
            return Ok(true);
        }
        let id = session_id.to_string();
        let found = self
            .blocking(move |repo| Ok(repo.find(&id)?.is_some()))
            .await?;
        Ok(found.unwrap_or(false))
    }
}
