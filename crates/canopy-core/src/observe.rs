//! Observer hooks for call start, progress and outcome

use crate::error::RegistryError;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

/// Identity of an observed call
#[derive(Clone, Debug)]
pub struct CallInfo {
    pub operation: &'static str,
    pub request_id: Uuid,
    pub resource: Option<String>,
}

impl CallInfo {
    pub fn new(operation: &'static str, request_id: Uuid) -> Self {
        Self {
            operation,
            request_id,
            resource: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Which leg ended a bridged stream
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamOutcome {
    ClientEof,
    ClientError,
    BackendEof,
    BackendError,
}

/// Running totals of a streaming call
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Progress {
    pub messages: u64,
    pub bytes: u64,
}

/// Extension points invoked by the bridge, the storage service and unary delegates
pub trait CallObserver: Send + Sync {
    fn on_start(&self, _call: &CallInfo) {}

    fn on_progress(&self, _call: &CallInfo, _progress: Progress) {}

    /// `outcome` is `None` for unary calls and for calls cancelled mid-flight
    fn on_finish(
        &self,
        _call: &CallInfo,
        _outcome: Option<StreamOutcome>,
        _error: Option<&RegistryError>,
    ) {
    }
}

/// Observer that ignores everything
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl CallObserver for NoopObserver {}

/// Observer emitting `tracing` events
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingObserver;

impl CallObserver for TracingObserver {
    fn on_start(&self, call: &CallInfo) {
        debug!(
            operation = call.operation,
            request_id = %call.request_id,
            resource = call.resource.as_deref().unwrap_or("-"),
            "call started"
        );
    }

    fn on_progress(&self, call: &CallInfo, progress: Progress) {
        trace!(
            operation = call.operation,
            request_id = %call.request_id,
            messages = progress.messages,
            bytes = progress.bytes,
            "call progress"
        );
    }

    fn on_finish(
        &self,
        call: &CallInfo,
        outcome: Option<StreamOutcome>,
        error: Option<&RegistryError>,
    ) {
        match error {
            None => info!(
                operation = call.operation,
                request_id = %call.request_id,
                outcome = ?outcome,
                "call finished"
            ),
            Some(err) => warn!(
                operation = call.operation,
                request_id = %call.request_id,
                outcome = ?outcome,
                error = %err,
                code = ?err.code(),
                "call failed"
            ),
        }
    }
}

/// Shared observer handle
pub type SharedObserver = Arc<dyn CallObserver>;

/// The default observer
pub fn tracing_observer() -> SharedObserver {
    Arc::new(TracingObserver)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::Mutex;

    /// Observer recording every callback
    #[derive(Default)]
    pub struct RecordingObserver {
        pub started: Mutex<Vec<&'static str>>,
        pub progress: Mutex<Vec<Progress>>,
        pub finished: Mutex<Vec<(Option<StreamOutcome>, Option<String>)>>,
    }

    impl CallObserver for RecordingObserver {
        fn on_start(&self, call: &CallInfo) {
            self.started.lock().unwrap().push(call.operation);
        }

        fn on_progress(&self, _call: &CallInfo, progress: Progress) {
            self.progress.lock().unwrap().push(progress);
        }

        fn on_finish(
            &self,
            _call: &CallInfo,
            outcome: Option<StreamOutcome>,
            error: Option<&RegistryError>,
        ) {
            self.finished
                .lock()
                .unwrap()
                .push((outcome, error.map(|e| e.to_string())));
        }
    }

    impl RecordingObserver {
        pub fn last_outcome(&self) -> Option<StreamOutcome> {
            self.finished.lock().unwrap().last().and_then(|(o, _)| *o)
        }
    }
}
