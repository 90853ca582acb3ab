//! Classification Session
//!
//! One pass of one physical object through a runtime:
//! Idle → Marshalling → Executing → Draining → Idle, or Failed.
//! The runtime lock is held from Marshalling through Draining, so a runtime
//! instance only ever runs one classification at a time.

use super::bridge::CallbackBridge;
use super::factory::VirtualObjectFactory;
use super::resolver::ChainResolver;
use crate::error::{RuntimeFault, SessionError};
use crate::marshal::Marshaller;
use crate::runtime::ClassificationRuntime;
use crate::store::CatalogStore;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info_span, warn, Instrument};
use uuid::Uuid;
use wkmp_common::{CatalogObject, ObjectId};

/// Classification session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    /// Ready for the next object
    Idle,
    /// Building the rule surface
    Marshalling,
    /// Runtime entry point running, bridge armed
    Executing,
    /// Bridge torn down, recording the result
    Draining,
    /// Runtime fault or shutdown; runtime stays usable
    Failed,
}

/// State transition event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateTransition {
    pub session_id: Uuid,
    pub old_state: SessionState,
    pub new_state: SessionState,
    pub transitioned_at: DateTime<Utc>,
}

/// Per-invocation session record
#[derive(Debug, Clone)]
pub struct ClassificationSession {
    pub session_id: Uuid,
    pub object_id: ObjectId,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ClassificationSession {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            object_id,
            state: SessionState::Idle,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    pub fn transition_to(&mut self, new_state: SessionState) -> StateTransition {
        let transition = StateTransition {
            session_id: self.session_id,
            old_state: self.state,
            new_state,
            transitioned_at: Utc::now(),
        };
        self.state = new_state;

        // Back to Idle or Failed ends the invocation
        if matches!(new_state, SessionState::Idle | SessionState::Failed) {
            self.ended_at = Some(Utc::now());
        }

        debug!(
            session_id = %transition.session_id,
            from = ?transition.old_state,
            to = ?transition.new_state,
            "Session state change"
        );

        transition
    }
}

/// Outcome of one `process_object` call
#[derive(Debug)]
pub struct SessionReport {
    pub session_id: Uuid,
    /// `Idle` on success, `Failed` otherwise
    pub state: SessionState,
    /// Virtual objects stored before the session ended
    pub placements: usize,
    pub error: Option<SessionError>,
}

impl SessionReport {
    pub fn is_failed(&self) -> bool {
        self.state == SessionState::Failed
    }
}

/// Drives physical objects through one classification runtime
pub struct Classifier {
    runtime: Mutex<Box<dyn ClassificationRuntime>>,
    runtime_name: String,
    store: Arc<dyn CatalogStore>,
    marshaller: Marshaller,
    shutdown: CancellationToken,
}

impl Classifier {
    pub fn new(runtime: Box<dyn ClassificationRuntime>, store: Arc<dyn CatalogStore>) -> Self {
        let runtime_name = runtime.name().to_string();
        Self {
            runtime: Mutex::new(runtime),
            runtime_name,
            store,
            marshaller: Marshaller::default(),
            shutdown: CancellationToken::new(),
        }
    }

    /// Use a marshaller with a different text converter
    pub fn with_marshaller(mut self, marshaller: Marshaller) -> Self {
        self.marshaller = marshaller;
        self
    }

    /// Share an existing shutdown token (e.g. the host's)
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn runtime_name(&self) -> &str {
        &self.runtime_name
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Refuse new sessions and make in-flight placements fail fast
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Classify one physical object
    ///
    /// Never fails: faults end the session in `Failed` and are reported.
    pub async fn process_object(
        &self,
        object: &Arc<CatalogObject>,
        import_path: &str,
    ) -> SessionReport {
        let session = ClassificationSession::new(object.id);
        let span = info_span!(
            "classify",
            session_id = %session.session_id,
            object_id = object.id,
            location = %object.location.display(),
            runtime = %self.runtime_name,
        );
        self.run_session(session, object, import_path)
            .instrument(span)
            .await
    }

    /// Host-facing projection: placements made, zero when the session failed
    pub async fn placement_count(&self, object: &Arc<CatalogObject>, import_path: &str) -> usize {
        let report = self.process_object(object, import_path).await;
        if report.is_failed() {
            0
        } else {
            report.placements
        }
    }

    async fn run_session(
        &self,
        mut session: ClassificationSession,
        object: &Arc<CatalogObject>,
        import_path: &str,
    ) -> SessionReport {
        if self.shutdown.is_cancelled() {
            warn!("Shutdown in progress, not starting classification");
            session.transition_to(SessionState::Failed);
            return SessionReport {
                session_id: session.session_id,
                state: session.state,
                placements: 0,
                error: Some(SessionError::Shutdown),
            };
        }

        // Held until Draining completes
        let mut runtime = self.runtime.lock().await;

        session.transition_to(SessionState::Marshalling);
        let surface = self.marshaller.to_surface(object);

        let bridge = CallbackBridge::new(
            session.session_id,
            object,
            ChainResolver::new(self.store.clone()),
            VirtualObjectFactory::new(self.marshaller.clone()),
            self.store.clone(),
            self.shutdown.clone(),
        );

        session.transition_to(SessionState::Executing);
        let outcome = {
            let _armed = bridge.guard();
            AssertUnwindSafe(runtime.invoke(surface, import_path, &bridge))
                .catch_unwind()
                .await
        };

        session.transition_to(SessionState::Draining);
        let placements = bridge.placements();
        let result = match outcome {
            Ok(result) => result,
            Err(panic) => Err(RuntimeFault::Panicked(panic_message(panic))),
        };
        drop(runtime);

        match result {
            Ok(()) => {
                session.transition_to(SessionState::Idle);
                debug!(placements, "Classification complete");
                SessionReport {
                    session_id: session.session_id,
                    state: session.state,
                    placements,
                    error: None,
                }
            }
            Err(fault) => {
                error!(
                    placements,
                    error = %fault,
                    "Classification aborted by runtime fault"
                );
                session.transition_to(SessionState::Failed);
                SessionReport {
                    session_id: session.session_id,
                    state: session.state,
                    placements,
                    error: Some(SessionError::Runtime(fault)),
                }
            }
        }
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transition_records_end_time() {
        let mut session = ClassificationSession::new(7);
        assert_eq!(session.state, SessionState::Idle);

        let t = session.transition_to(SessionState::Marshalling);
        assert_eq!(t.old_state, SessionState::Idle);
        assert_eq!(t.new_state, SessionState::Marshalling);
        assert!(session.ended_at.is_none());

        session.transition_to(SessionState::Executing);
        session.transition_to(SessionState::Failed);
        assert!(session.ended_at.is_some());
    }

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_string(&SessionState::Draining).unwrap();
        assert_eq!(json, "\"DRAINING\"");
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload), "bang");
    }
}
