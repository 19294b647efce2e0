//! Version Lifecycle Coordinator
//!
//! Drives the two-phase publish transaction of a module or provider version:
//!
//! ```text
//!   None ──begin──▶ Open(session) ──end(discard|publish)──▶ Terminated
//!                       ▲    │
//!                       └────┘ backend failure: TerminationUncertain
//! ```
//!
//! No retries and no timeout-driven rollback; the caller decides what to do
//! with an uncertain termination.

use crate::context::CallContext;
use crate::error::{RegistryError, Result};
use crate::messages::{
    BeginVersionRequest, BeginVersionResponse, Response, TerminateVersionRequest, VersionAction,
    VersionedName,
};
use async_trait::async_trait;
use std::fmt;
use tonic::Status;
use tracing::{info, warn};

/// Backend version manager
#[async_trait]
pub trait VersionBackend: Send + Sync {
    /// Allocate a session for a new version
    async fn begin_version(&self, request: BeginVersionRequest) -> Result<BeginVersionResponse>;

    /// Drop a version and its session
    async fn abort_version(&self, request: TerminateVersionRequest) -> Result<Response>;

    /// Make a version visible and close its session
    async fn publish_version(&self, request: TerminateVersionRequest) -> Result<Response>;
}

#[async_trait]
impl<B: VersionBackend + ?Sized> VersionBackend for std::sync::Arc<B> {
    async fn begin_version(&self, request: BeginVersionRequest) -> Result<BeginVersionResponse> {
        (**self).begin_version(request).await
    }

    async fn abort_version(&self, request: TerminateVersionRequest) -> Result<Response> {
        (**self).abort_version(request).await
    }

    async fn publish_version(&self, request: TerminateVersionRequest) -> Result<Response> {
        (**self).publish_version(request).await
    }
}

/// State of one version transaction
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    None,
    Open {
        session: String,
    },
    Terminated {
        session: String,
        action: VersionAction,
    },
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleState::None => f.write_str("not started"),
            LifecycleState::Open { .. } => f.write_str("open"),
            LifecycleState::Terminated { .. } => f.write_str("terminated"),
        }
    }
}

/// Coordinator for one version of one module or provider
pub struct VersionLifecycle<'a, B: ?Sized> {
    backend: &'a B,
    subject: VersionedName,
    state: LifecycleState,
}

impl<'a, B: VersionBackend + ?Sized> VersionLifecycle<'a, B> {
    pub fn new(backend: &'a B, subject: VersionedName) -> Self {
        Self {
            backend,
            subject,
            state: LifecycleState::None,
        }
    }

    /// Rebuild an open transaction from a session key carried by the caller
    pub fn resume(backend: &'a B, subject: VersionedName, session: impl Into<String>) -> Self {
        Self {
            backend,
            subject,
            state: LifecycleState::Open {
                session: session.into(),
            },
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn session(&self) -> Option<&str> {
        match &self.state {
            LifecycleState::None => None,
            LifecycleState::Open { session } | LifecycleState::Terminated { session, .. } => {
                Some(session)
            }
        }
    }

    /// Start the transaction, returning the backend's reply with the session key.
    ///
    /// Backend errors are returned unchanged and leave the state untouched.
    pub async fn begin(&mut self, ctx: &CallContext) -> Result<BeginVersionResponse> {
        if self.state != LifecycleState::None {
            return Err(self.invalid_state("begin"));
        }

        let request = BeginVersionRequest {
            module: self.subject.clone(),
        };
        let response = ctx.run(self.backend.begin_version(request)).await??;

        info!(subject = %self.subject, session = %response.session_key, "version begun");
        self.state = LifecycleState::Open {
            session: response.session_key.clone(),
        };
        Ok(response)
    }

    /// Terminate the transaction with the raw wire `action`.
    ///
    /// The action is checked before anything else, so an unknown value never
    /// reaches the backend.
    pub async fn end(&mut self, ctx: &CallContext, action: i32) -> Result<Response> {
        let action = VersionAction::try_from(action)?;

        let session = match &self.state {
            LifecycleState::Open { session } => session.clone(),
            _ => return Err(self.invalid_state("end")),
        };

        let request = TerminateVersionRequest {
            session_key: session.clone(),
            module: self.subject.clone(),
        };
        let result = match action {
            VersionAction::Discard => ctx.run(self.backend.abort_version(request)).await,
            VersionAction::Publish => ctx.run(self.backend.publish_version(request)).await,
        };

        match result.and_then(|reply| reply) {
            Ok(response) => {
                info!(subject = %self.subject, session = %session, %action, "version terminated");
                self.state = LifecycleState::Terminated { session, action };
                Ok(response)
            }
            // Nothing reached the backend, the session is certainly still open
            Err(err @ RegistryError::BackendUnavailable { .. }) => Err(err),
            Err(err) => {
                warn!(subject = %self.subject, session = %session, %action, error = %err, "version termination uncertain");
                Err(RegistryError::TerminationUncertain {
                    session,
                    action,
                    source: Status::from(err),
                })
            }
        }
    }

    fn invalid_state(&self, operation: &'static str) -> RegistryError {
        RegistryError::InvalidState {
            operation,
            state: self.state.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tonic::Code;

    #[derive(Default)]
    struct MockBackend {
        begun: Mutex<Vec<VersionedName>>,
        aborted: Mutex<Vec<String>>,
        published: Mutex<Vec<String>>,
        fail_terminate: Mutex<Option<RegistryError>>,
        fail_begin: bool,
    }

    #[async_trait]
    impl VersionBackend for MockBackend {
        async fn begin_version(&self, request: BeginVersionRequest) -> Result<BeginVersionResponse> {
            if self.fail_begin {
                return Err(Status::already_exists("version exists").into());
            }
            self.begun.lock().unwrap().push(request.module);
            Ok(BeginVersionResponse {
                session_key: "abc-123".to_string(),
            })
        }

        async fn abort_version(&self, request: TerminateVersionRequest) -> Result<Response> {
            if let Some(err) = self.fail_terminate.lock().unwrap().take() {
                return Err(err);
            }
            self.aborted.lock().unwrap().push(request.session_key);
            Ok(Response::new("Version discarded."))
        }

        async fn publish_version(&self, request: TerminateVersionRequest) -> Result<Response> {
            if let Some(err) = self.fail_terminate.lock().unwrap().take() {
                return Err(err);
            }
            self.published.lock().unwrap().push(request.session_key);
            Ok(Response::new("Version published."))
        }
    }

    fn subject() -> VersionedName {
        VersionedName::new("cie/vpc/aws", "1.0.0")
    }

    #[tokio::test]
    async fn test_begin_then_publish() {
        let backend = MockBackend::default();
        let ctx = CallContext::new();
        let mut lifecycle = VersionLifecycle::new(&backend, subject());

        let begun = lifecycle.begin(&ctx).await.unwrap();
        assert_eq!(begun.session_key, "abc-123");
        assert_eq!(lifecycle.session(), Some("abc-123"));

        lifecycle.end(&ctx, VersionAction::Publish.as_i32()).await.unwrap();

        assert_eq!(*backend.published.lock().unwrap(), vec!["abc-123".to_string()]);
        assert!(backend.aborted.lock().unwrap().is_empty());
        assert_eq!(
            *lifecycle.state(),
            LifecycleState::Terminated {
                session: "abc-123".to_string(),
                action: VersionAction::Publish,
            }
        );
    }

    #[tokio::test]
    async fn test_discard_calls_abort() {
        let backend = MockBackend::default();
        let mut lifecycle = VersionLifecycle::resume(&backend, subject(), "s-1");

        lifecycle
            .end(&CallContext::new(), VersionAction::Discard.as_i32())
            .await
            .unwrap();

        assert_eq!(*backend.aborted.lock().unwrap(), vec!["s-1".to_string()]);
        assert!(backend.published.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_action_never_reaches_backend() {
        let backend = MockBackend::default();
        let mut lifecycle = VersionLifecycle::resume(&backend, subject(), "s-1");

        for action in [-1, 2, 42] {
            let err = lifecycle.end(&CallContext::new(), action).await.unwrap_err();
            assert!(matches!(err, RegistryError::UnknownAction(a) if a == action));
        }

        assert!(backend.aborted.lock().unwrap().is_empty());
        assert!(backend.published.lock().unwrap().is_empty());
        assert!(matches!(lifecycle.state(), LifecycleState::Open { .. }));
    }

    #[tokio::test]
    async fn test_backend_failure_leaves_session_open() {
        let backend = MockBackend::default();
        *backend.fail_terminate.lock().unwrap() =
            Some(Status::unavailable("connection reset").into());
        let ctx = CallContext::new();
        let mut lifecycle = VersionLifecycle::resume(&backend, subject(), "s-1");

        let err = lifecycle
            .end(&ctx, VersionAction::Publish.as_i32())
            .await
            .unwrap_err();

        match &err {
            RegistryError::TerminationUncertain {
                session,
                action,
                source,
            } => {
                assert_eq!(session, "s-1");
                assert_eq!(*action, VersionAction::Publish);
                assert_eq!(source.code(), Code::Unavailable);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(matches!(lifecycle.state(), LifecycleState::Open { .. }));

        // The caller may retry
        lifecycle.end(&ctx, VersionAction::Publish.as_i32()).await.unwrap();
        assert_eq!(backend.published.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_not_uncertain() {
        let backend = MockBackend::default();
        *backend.fail_terminate.lock().unwrap() = Some(RegistryError::BackendUnavailable {
            service: "Version manager",
        });
        let mut lifecycle = VersionLifecycle::resume(&backend, subject(), "s-1");

        let err = lifecycle
            .end(&CallContext::new(), VersionAction::Discard.as_i32())
            .await
            .unwrap_err();

        assert!(matches!(err, RegistryError::BackendUnavailable { .. }));
        assert!(matches!(lifecycle.state(), LifecycleState::Open { .. }));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let backend = MockBackend::default();
        let ctx = CallContext::new();
        let mut lifecycle = VersionLifecycle::new(&backend, subject());

        let err = lifecycle.end(&ctx, 1).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { operation: "end", .. }));

        lifecycle.begin(&ctx).await.unwrap();
        let err = lifecycle.begin(&ctx).await.unwrap_err();
        assert!(matches!(err, RegistryError::InvalidState { operation: "begin", .. }));

        lifecycle.end(&ctx, 0).await.unwrap();
        let err = lifecycle.end(&ctx, 0).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot end a version that is terminated");
        assert_eq!(backend.aborted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_begin_failure_is_verbatim() {
        let backend = MockBackend {
            fail_begin: true,
            ..Default::default()
        };
        let mut lifecycle = VersionLifecycle::new(&backend, subject());

        let err = lifecycle.begin(&CallContext::new()).await.unwrap_err();

        assert_eq!(err.code(), Code::AlreadyExists);
        assert_eq!(*lifecycle.state(), LifecycleState::None);
    }
}
