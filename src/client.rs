use std::{collections::HashMap, sync::Arc, time::Duration};

use crate::{
    context::Context,
    evaluation::FetchOutcome,
    listener::ListenerId,
    model::{Evaluation, User},
    retry::{Backoff, RetryExecutor, RetryPolicy},
    scheduler::{Scheduler, SchedulerConfig},
    variation::{convert, VariationKind, VariationValue},
    ClientConfig, Result,
};

/// Upper bound for the delay between initial fetch attempts.
const MAX_INITIALIZATION_BACKOFF: Duration = Duration::from_secs(10);

/// A feature flag client for a single user.
///
/// In order to create a client instance, first create [`ClientConfig`].
///
/// Flag values are served from a local cache that background tasks keep in sync with the
/// service, so lookups never wait on the network and never fail: a missing flag, or one whose
/// value doesn't parse as the requested type, yields the caller's default.
///
/// # Examples
/// ```no_run
/// # use flagsync::{Client, ClientConfig, User};
/// # async fn run() -> flagsync::Result<()> {
/// let client = Client::new(ClientConfig::new(
///     "api-key",
///     "https://api.example.com",
///     "web",
///     User::new("user-id"),
/// ))?;
/// client.initialize().await?;
///
/// if client.bool_variation("new-checkout", false).await {
///     client.track("checkout-opened", 1.0).await;
/// }
/// # Ok(())
/// # }
/// ```
pub struct Client {
    context: Arc<Context>,
    scheduler: Scheduler,
    initialization: RetryPolicy,
}

impl Client {
    /// Create a new `Client` using the specified configuration.
    ///
    /// Background tasks are not started until [`Client::initialize`].
    pub fn new(config: ClientConfig) -> Result<Client> {
        let config = config.validate()?;
        let context = Arc::new(Context::new(&config));
        let scheduler = Scheduler::new(context.clone(), SchedulerConfig::new(&config));
        Ok(Client {
            context,
            scheduler,
            initialization: RetryPolicy {
                max_retries: config.initialization_max_retries,
                backoff: Backoff::Exponential {
                    base: config.initialization_backoff,
                    max: MAX_INITIALIZATION_BACKOFF,
                },
            },
        })
    }

    /// Start background polling and flushing, then fetch evaluations once.
    ///
    /// Transient failures of the first fetch are retried. If it still fails, the error is
    /// returned, but background polling keeps running and lookups serve cached values or
    /// defaults.
    pub async fn initialize(&self) -> Result<()> {
        self.scheduler.start()?;
        RetryExecutor::new(self.initialization)
            .execute(
                || self.context.fetch_evaluations(None),
                |err| err.is_transient() && self.scheduler.is_running(),
            )
            .await?;
        log::debug!(target: "flagsync", "client initialized");
        Ok(())
    }

    pub async fn string_variation(&self, feature_id: &str, default: &str) -> String {
        match self.variation(feature_id, VariationKind::String).await {
            Some(VariationValue::String(value)) => value,
            _ => default.to_owned(),
        }
    }

    pub async fn number_variation(&self, feature_id: &str, default: f64) -> f64 {
        self.variation(feature_id, VariationKind::Number)
            .await
            .and_then(|value| value.as_number())
            .unwrap_or(default)
    }

    pub async fn bool_variation(&self, feature_id: &str, default: bool) -> bool {
        self.variation(feature_id, VariationKind::Boolean)
            .await
            .and_then(|value| value.as_boolean())
            .unwrap_or(default)
    }

    pub async fn json_variation(
        &self,
        feature_id: &str,
        default: serde_json::Value,
    ) -> serde_json::Value {
        match self.variation(feature_id, VariationKind::Json).await {
            Some(VariationValue::Json(value)) => value,
            _ => default,
        }
    }

    /// The cached evaluation of `feature_id`, without recording an evaluation event.
    pub fn evaluation_details(&self, feature_id: &str) -> Option<Evaluation> {
        match self.context.evaluations.get(feature_id) {
            Ok(evaluation) => evaluation,
            Err(err) => {
                log::warn!(target: "flagsync", feature_id; "failed to read evaluation cache: {err}");
                None
            }
        }
    }

    /// Record a goal conversion.
    pub async fn track(&self, goal_id: &str, value: f64) {
        let user = self.context.user();
        if let Err(err) = self
            .context
            .events
            .track_goal_event(&user, goal_id, value)
            .await
        {
            log::warn!(target: "flagsync", goal_id; "failed to track goal: {err}");
        }
    }

    pub fn current_user(&self) -> User {
        self.context.user()
    }

    /// Replace the user's attributes. The next fetch asks the service to re-evaluate every flag.
    pub fn update_user_attributes(&self, attributes: HashMap<String, String>) -> Result<()> {
        self.context.update_user_attributes(attributes)
    }

    /// Fetch evaluations now. `timeout` overrides the configured request timeout.
    pub async fn fetch_evaluations(&self, timeout: Option<Duration>) -> Result<FetchOutcome> {
        self.context.fetch_evaluations(timeout).await
    }

    /// Send queued events even if they do not fill a batch. Returns whether a batch was sent.
    pub async fn flush(&self) -> Result<bool> {
        self.context.events.send_events(true).await
    }

    /// Call `listener` after every fetch that changed the cached evaluations.
    pub fn add_evaluation_update_listener(
        &self,
        listener: impl Fn() + Send + Sync + 'static,
    ) -> ListenerId {
        self.context
            .evaluations
            .add_update_listener(Arc::new(listener))
    }

    /// Returns `true` if the listener was registered.
    pub fn remove_evaluation_update_listener(&self, id: &ListenerId) -> bool {
        self.context.evaluations.remove_update_listener(id)
    }

    pub fn clear_evaluation_update_listeners(&self) {
        self.context.evaluations.clear_update_listeners();
    }

    /// Stop background tasks and drop all listeners. With `clear_storage`, the cached evaluations
    /// and queued events of this user are deleted as well.
    pub async fn destroy(&self, clear_storage: bool) -> Result<()> {
        self.scheduler.stop();
        self.context.evaluations.clear_update_listeners();
        self.context.events.clear_event_added_listeners();
        if clear_storage {
            self.context.evaluations.storage().clear()?;
            self.context.events.clear().await?;
        }
        log::debug!(target: "flagsync", clear_storage; "client destroyed");
        Ok(())
    }

    async fn variation(&self, feature_id: &str, kind: VariationKind) -> Option<VariationValue> {
        let user = self.context.user();
        let evaluation = self.evaluation_details(feature_id);
        let value = evaluation
            .as_ref()
            .and_then(|evaluation| convert(&evaluation.variation_value, kind));

        let tracked = match (&evaluation, &value) {
            (Some(evaluation), Some(_)) => {
                log::trace!(target: "flagsync", feature_id, variation_id = evaluation.variation_id.as_str(); "evaluated a flag");
                self.context
                    .events
                    .track_evaluation_event(&user, evaluation)
                    .await
            }
            (Some(evaluation), None) => {
                log::warn!(target: "flagsync", feature_id; "variation {:?} is not a valid {kind:?}, serving the default", evaluation.variation_value);
                self.context
                    .events
                    .track_default_evaluation_event(&user, feature_id)
                    .await
            }
            (None, _) => {
                log::debug!(target: "flagsync", feature_id; "no cached evaluation, serving the default");
                self.context
                    .events
                    .track_default_evaluation_event(&user, feature_id)
                    .await
            }
        };
        if let Err(err) = tracked {
            log::warn!(target: "flagsync", feature_id; "failed to track evaluation: {err}");
        }

        value
    }
}
