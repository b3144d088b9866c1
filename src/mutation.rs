//! Mutation-then-navigate flow.
//!
//! DESIGN
//! ======
//! A [`MutationFlow`] owns one form's submit lifecycle:
//!
//! ```text
//! Idle -> Pending -> Succeeded -> navigate (internal route or external URL)
//!                 -> Failed    -> Pending (resubmit)
//! ```
//!
//! The flow validates the payload, calls its [`CommandSink`], marks the
//! configured cache prefixes stale and hands the next target to the
//! [`LocationStore`]. Status lives behind a shared mutex so a second submit
//! issued while the first is still awaiting the backend is rejected without
//! touching the sink.
//!
//! ERROR HANDLING
//! ==============
//! Every failure is returned as a [`MutationError`] and mirrored in
//! [`MutationStatus::Failed`] so a form can render the message inline.
//! Nothing navigates on failure.

#[cfg(test)]
#[path = "mutation_test.rs"]
mod mutation_test;

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::api::ApiError;
use crate::cache::{QueryCache, QueryKey};
use crate::config::DEFAULT_REDIRECT_DELAY_MS;
use crate::forms::{Validate, ValidationErrors};
use crate::location::{Location, LocationStore, NavigationTarget};
use crate::source::CommandSink;

// =============================================================================
// OUTCOMES
// =============================================================================

/// A created or updated resource returned by a command endpoint.
pub trait MutationOutcome {
    /// Identifier used to build a detail route.
    fn resource_id(&self) -> Option<String>;

    /// External URL the user must be sent to instead of an internal route.
    fn redirect_url(&self) -> Option<&str> {
        None
    }
}

impl MutationOutcome for serde_json::Value {
    fn resource_id(&self) -> Option<String> {
        match self.get("id")? {
            serde_json::Value::String(id) => Some(id.clone()),
            serde_json::Value::Number(id) => Some(id.to_string()),
            _ => None,
        }
    }

    fn redirect_url(&self) -> Option<&str> {
        self.get("payment_url")
            .and_then(serde_json::Value::as_str)
            .filter(|url| !url.trim().is_empty())
    }
}

/// Internal route taken after a successful submit without a redirect URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessRoute {
    /// A fixed route, usually the owning list.
    To(String),
    /// `{base}/{id}` using the result's identifier; `base` when it has none.
    Detail { base: String },
    /// `{path}?{param}={id}`; `path` alone when the result has no id.
    WithQuery { path: String, param: String },
    /// Stay on the current screen.
    Stay,
}

impl SuccessRoute {
    #[must_use]
    pub fn to(path: impl Into<String>) -> Self {
        Self::To(path.into())
    }

    #[must_use]
    pub fn detail(base: impl Into<String>) -> Self {
        Self::Detail { base: base.into() }
    }

    #[must_use]
    pub fn with_query(path: impl Into<String>, param: impl Into<String>) -> Self {
        Self::WithQuery { path: path.into(), param: param.into() }
    }

    /// Target for `outcome`, preferring its redirect URL.
    #[must_use]
    pub fn target_for<R: MutationOutcome + ?Sized>(&self, outcome: &R) -> Option<NavigationTarget> {
        if let Some(url) = outcome.redirect_url() {
            return Some(NavigationTarget::External(url.to_owned()));
        }
        match self {
            Self::To(path) => Some(NavigationTarget::internal(path)),
            Self::Detail { base } => {
                let base = base.trim_end_matches('/');
                Some(match outcome.resource_id() {
                    Some(id) => NavigationTarget::internal(&format!("{base}/{id}")),
                    None => NavigationTarget::internal(base),
                })
            }
            Self::WithQuery { path, param } => {
                let location = Location::new(path.as_str());
                Some(NavigationTarget::Internal(match outcome.resource_id() {
                    Some(id) => location.with_query(param.as_str(), id),
                    None => location,
                }))
            }
            Self::Stay => None,
        }
    }
}

// =============================================================================
// STATUS + ERRORS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MutationStatus {
    #[default]
    Idle,
    Pending,
    Succeeded,
    Failed {
        message: String,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("a submission is already in progress")]
    AlreadyPending,
    #[error("already submitted; reset the form to submit again")]
    AlreadyCompleted,
    #[error("invalid input: {0}")]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Api(#[from] ApiError),
}

// =============================================================================
// FLOW
// =============================================================================

struct FlowState<P, R> {
    status: MutationStatus,
    last_payload: Option<P>,
    last_result: Option<Arc<R>>,
}

/// One form's submit lifecycle. Clones share state.
pub struct MutationFlow<P, R, S> {
    name: String,
    sink: Arc<S>,
    invalidates: Arc<[QueryKey]>,
    route: SuccessRoute,
    redirect_delay: Duration,
    location: Option<Arc<dyn LocationStore>>,
    cache: Option<QueryCache>,
    state: Arc<Mutex<FlowState<P, R>>>,
}

impl<P, R, S> Clone for MutationFlow<P, R, S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            sink: Arc::clone(&self.sink),
            invalidates: Arc::clone(&self.invalidates),
            route: self.route.clone(),
            redirect_delay: self.redirect_delay,
            location: self.location.clone(),
            cache: self.cache.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

pub struct MutationFlowBuilder<P, R, S> {
    name: String,
    sink: S,
    invalidates: Vec<QueryKey>,
    route: SuccessRoute,
    redirect_delay: Duration,
    location: Option<Arc<dyn LocationStore>>,
    cache: Option<QueryCache>,
    _types: PhantomData<fn(P) -> R>,
}

impl<P, R, S> MutationFlowBuilder<P, R, S> {
    /// Mark every cached key under `prefix` stale after success. Repeatable.
    #[must_use]
    pub fn invalidates(mut self, prefix: impl Into<QueryKey>) -> Self {
        self.invalidates.push(prefix.into());
        self
    }

    #[must_use]
    pub fn on_success(mut self, route: SuccessRoute) -> Self {
        self.route = route;
        self
    }

    /// Pause before following an external redirect.
    #[must_use]
    pub fn redirect_delay(mut self, delay: Duration) -> Self {
        self.redirect_delay = delay;
        self
    }

    #[must_use]
    pub fn location(mut self, store: Arc<dyn LocationStore>) -> Self {
        self.location = Some(store);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: QueryCache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn build(self) -> MutationFlow<P, R, S> {
        MutationFlow {
            name: self.name,
            sink: Arc::new(self.sink),
            invalidates: self.invalidates.into(),
            route: self.route,
            redirect_delay: self.redirect_delay,
            location: self.location,
            cache: self.cache,
            state: Arc::new(Mutex::new(FlowState {
                status: MutationStatus::Idle,
                last_payload: None,
                last_result: None,
            })),
        }
    }
}

impl<P, R, S> MutationFlow<P, R, S>
where
    P: Validate + Clone + Send + Sync,
    R: MutationOutcome + Send + Sync,
    S: CommandSink<P, R>,
{
    /// Start building a flow named `name` (used in logs) over `sink`.
    #[must_use]
    pub fn builder(name: impl Into<String>, sink: S) -> MutationFlowBuilder<P, R, S> {
        MutationFlowBuilder {
            name: name.into(),
            sink,
            invalidates: Vec::new(),
            route: SuccessRoute::Stay,
            redirect_delay: Duration::from_millis(DEFAULT_REDIRECT_DELAY_MS),
            location: None,
            cache: None,
            _types: PhantomData,
        }
    }

    /// Validate and submit `payload`. On success returns where the user was
    /// sent, or `None` for [`SuccessRoute::Stay`].
    ///
    /// # Errors
    ///
    /// [`MutationError::AlreadyPending`] while a submit is in flight,
    /// [`MutationError::AlreadyCompleted`] after a success until
    /// [`reset`](Self::reset), [`MutationError::Invalid`] when validation
    /// fails and [`MutationError::Api`] when the backend rejects the command.
    pub async fn submit(&self, payload: P) -> Result<Option<NavigationTarget>, MutationError> {
        {
            let mut state = self.lock();
            match state.status {
                MutationStatus::Pending => return Err(MutationError::AlreadyPending),
                MutationStatus::Succeeded => return Err(MutationError::AlreadyCompleted),
                MutationStatus::Idle | MutationStatus::Failed { .. } => {}
            }
            if let Err(errors) = payload.validate() {
                // The field errors replace any earlier backend message.
                state.status = MutationStatus::Idle;
                state.last_payload = Some(payload);
                return Err(MutationError::Invalid(errors));
            }
            state.status = MutationStatus::Pending;
            state.last_payload = Some(payload.clone());
        }

        let mut guard = PendingGuard { state: &self.state, armed: true };
        let result = self.sink.submit(&payload).await;
        guard.armed = false;

        match result {
            Ok(outcome) => Ok(self.succeed(outcome).await),
            Err(err) => {
                tracing::warn!(mutation = %self.name, error = %err, "mutation failed");
                self.lock().status = MutationStatus::Failed { message: err.to_string() };
                Err(MutationError::Api(err))
            }
        }
    }

    async fn succeed(&self, outcome: R) -> Option<NavigationTarget> {
        let outcome = Arc::new(outcome);
        {
            let mut state = self.lock();
            state.status = MutationStatus::Succeeded;
            state.last_result = Some(Arc::clone(&outcome));
        }

        if let Some(cache) = &self.cache {
            for prefix in self.invalidates.iter() {
                cache.invalidate(prefix);
            }
        }

        let target = self.route.target_for(outcome.as_ref())?;
        if matches!(target, NavigationTarget::External(_)) && !self.redirect_delay.is_zero() {
            tokio::time::sleep(self.redirect_delay).await;
        }
        tracing::info!(mutation = %self.name, to = %target.href(), "navigating after mutation");
        if let Some(location) = &self.location {
            location.navigate(target.clone());
        }
        Some(target)
    }
}

impl<P, R, S> MutationFlow<P, R, S> {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Prefixes marked stale after a success.
    #[must_use]
    pub fn invalidated_keys(&self) -> &[QueryKey] {
        &self.invalidates
    }

    #[must_use]
    pub fn success_route(&self) -> &SuccessRoute {
        &self.route
    }

    #[must_use]
    pub fn status(&self) -> MutationStatus {
        self.lock().status.clone()
    }

    /// Submit controls stay disabled while this holds.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.lock().status == MutationStatus::Pending
    }

    #[must_use]
    pub fn error_message(&self) -> Option<String> {
        match &self.lock().status {
            MutationStatus::Failed { message } => Some(message.clone()),
            _ => None,
        }
    }

    /// Values last submitted, kept so a failed form can redisplay them.
    #[must_use]
    pub fn last_payload(&self) -> Option<P>
    where
        P: Clone,
    {
        self.lock().last_payload.clone()
    }

    #[must_use]
    pub fn last_result(&self) -> Option<Arc<R>> {
        self.lock().last_result.clone()
    }

    /// Back to `Idle` with no retained payload or result. Ignored while a
    /// submit is in flight.
    pub fn reset(&self) {
        let mut state = self.lock();
        if state.status == MutationStatus::Pending {
            return;
        }
        state.status = MutationStatus::Idle;
        state.last_payload = None;
        state.last_result = None;
    }

    fn lock(&self) -> MutexGuard<'_, FlowState<P, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears `Pending` if a submit future is dropped before the sink answers.
struct PendingGuard<'a, P, R> {
    state: &'a Mutex<FlowState<P, R>>,
    armed: bool,
}

impl<P, R> Drop for PendingGuard<'_, P, R> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.status = MutationStatus::Idle;
        }
    }
}
