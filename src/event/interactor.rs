use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use crate::{
    api_client::ApiClient,
    clock::Clock,
    config::ClientConfig,
    id::IdGenerator,
    listener::{ListenerId, ListenerRegistry},
    model::{
        ApiId, ErrorMetrics, Evaluation, EvaluationEvent, Event, EventData, GoalEvent,
        LatencyMetrics, MetricsEvent, MetricsEventData, Reason, SizeMetrics, SourceId, User,
    },
    mutex::{FastMutex, FastMutexOptions},
    storage::JsonStorage,
    Error, Result,
};

use super::storage::{DefaultEventStorage, EventStorage, LockedEventStorage};

/// Builds events, queues them and delivers them in batches.
pub(crate) struct EventInteractor {
    api: Arc<ApiClient>,
    storage: Box<dyn EventStorage>,
    feature_tag: String,
    source_id: SourceId,
    sdk_version: String,
    metadata: HashMap<String, String>,
    max_batch_size: usize,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    /// At most one delivery in flight.
    send_lock: tokio::sync::Mutex<()>,
    /// Makes the duplicate check and the append of metrics one step.
    metrics_lock: tokio::sync::Mutex<()>,
    event_added_listeners: ListenerRegistry<dyn Fn() + Send + Sync>,
}

impl EventInteractor {
    pub(crate) fn new(config: &ClientConfig, api: Arc<ApiClient>) -> EventInteractor {
        let queue = DefaultEventStorage::new(
            config.user.id.clone(),
            Box::new(JsonStorage::new(
                config.store.clone(),
                config.storage_key("events"),
            )),
        );

        let storage: Box<dyn EventStorage> = if config.cross_context_mutex {
            match FastMutex::new(
                config.store.clone(),
                config.storage_key("events_lock"),
                config.id_generator.new_id(),
                config.clock.clone(),
                FastMutexOptions::default(),
            ) {
                Ok(mutex) => Box::new(LockedEventStorage::new(queue, mutex)),
                Err(err) => {
                    log::warn!(target: "flagsync", "cross-context lock is unavailable, event queue is only guarded within this process: {err}");
                    Box::new(queue)
                }
            }
        } else {
            Box::new(queue)
        };

        let metadata = HashMap::from([
            ("app_version".to_owned(), config.app_version.clone()),
            ("os".to_owned(), std::env::consts::OS.to_owned()),
        ]);

        EventInteractor {
            api,
            storage,
            feature_tag: config.feature_tag.clone(),
            source_id: config.source_id,
            sdk_version: config.sdk_version.clone(),
            metadata,
            max_batch_size: config.events_max_batch_size,
            clock: config.clock.clone(),
            id_generator: config.id_generator.clone(),
            send_lock: tokio::sync::Mutex::new(()),
            metrics_lock: tokio::sync::Mutex::new(()),
            event_added_listeners: ListenerRegistry::new(),
        }
    }

    pub(crate) async fn track_evaluation_event(
        &self,
        user: &User,
        evaluation: &Evaluation,
    ) -> Result<()> {
        let event = EventData::Evaluation(EvaluationEvent {
            timestamp: self.clock.now_seconds(),
            feature_id: evaluation.feature_id.clone(),
            feature_version: evaluation.feature_version,
            user_id: user.id.clone(),
            variation_id: evaluation.variation_id.clone(),
            user: user.clone(),
            reason: evaluation.reason.clone(),
            tag: self.feature_tag.clone(),
            source_id: self.source_id,
            sdk_version: self.sdk_version.clone(),
            metadata: self.metadata.clone(),
        });
        self.add(event).await
    }

    /// Record that `feature_id` was served the caller's default value.
    pub(crate) async fn track_default_evaluation_event(
        &self,
        user: &User,
        feature_id: &str,
    ) -> Result<()> {
        let event = EventData::Evaluation(EvaluationEvent {
            timestamp: self.clock.now_seconds(),
            feature_id: feature_id.to_owned(),
            feature_version: 0,
            user_id: user.id.clone(),
            variation_id: String::new(),
            user: user.clone(),
            reason: Reason::client(),
            tag: self.feature_tag.clone(),
            source_id: self.source_id,
            sdk_version: self.sdk_version.clone(),
            metadata: self.metadata.clone(),
        });
        self.add(event).await
    }

    pub(crate) async fn track_goal_event(&self, user: &User, goal_id: &str, value: f64) -> Result<()> {
        let event = EventData::Goal(GoalEvent {
            timestamp: self.clock.now_seconds(),
            goal_id: goal_id.to_owned(),
            user_id: user.id.clone(),
            value,
            user: user.clone(),
            tag: self.feature_tag.clone(),
            source_id: self.source_id,
            sdk_version: self.sdk_version.clone(),
            metadata: self.metadata.clone(),
        });
        self.add(event).await
    }

    /// Record latency and response size of a successful call.
    pub(crate) async fn track_success(
        &self,
        api_id: ApiId,
        latency: Duration,
        size_bytes: u64,
    ) -> Result<()> {
        self.add_metrics(vec![
            MetricsEventData::Latency(LatencyMetrics {
                api_id,
                labels: self.labels(),
                latency_second: latency.as_secs_f64(),
            }),
            MetricsEventData::Size(SizeMetrics {
                api_id,
                labels: self.labels(),
                size_byte: size_bytes,
            }),
        ])
        .await
    }

    /// Record a failed call. Authentication failures are only logged.
    pub(crate) async fn track_failure(&self, api_id: ApiId, error: &Error) -> Result<()> {
        if error.is_auth_error() {
            log::error!(target: "flagsync", "{api_id:?} request was rejected, check the api key: {error}");
            return Ok(());
        }
        let data = self.error_metrics(api_id, error);
        self.add_metrics(vec![data]).await
    }

    /// Deliver the oldest queued events.
    ///
    /// Unless `force` is set, nothing is sent while the queue holds less than a full batch.
    /// Returns whether a batch was sent.
    pub(crate) async fn send_events(&self, force: bool) -> Result<bool> {
        let _guard = self.send_lock.lock().await;

        let events = self.storage.get_all().await?;
        if events.is_empty() || (!force && events.len() < self.max_batch_size) {
            return Ok(false);
        }

        let batch: Vec<Event> = events.into_iter().take(self.max_batch_size).collect();
        let response = self.api.register_events(&batch).await?.body;

        let mut retained = HashSet::new();
        for (id, error) in &response.errors {
            if error.retriable {
                retained.insert(id.as_str());
            } else {
                log::warn!(target: "flagsync", event_id = id.as_str(); "event was rejected: {}", error.message);
            }
        }
        let delivered: Vec<String> = batch
            .iter()
            .filter(|event| !retained.contains(event.id.as_str()))
            .map(|event| event.id.clone())
            .collect();

        log::debug!(target: "flagsync", sent = batch.len(), retained = retained.len(); "sent events");
        self.storage.delete_by_ids(&delivered).await?;
        Ok(true)
    }

    #[cfg(test)]
    pub(crate) async fn queued_events(&self) -> Result<Vec<Event>> {
        self.storage.get_all().await
    }

    pub(crate) async fn clear(&self) -> Result<()> {
        self.storage.clear().await
    }

    pub(crate) fn add_event_added_listener(
        &self,
        listener: Arc<dyn Fn() + Send + Sync>,
    ) -> ListenerId {
        let id = ListenerId::new(self.id_generator.new_id());
        self.event_added_listeners.add(id, listener)
    }

    pub(crate) fn remove_event_added_listener(&self, id: &ListenerId) -> bool {
        self.event_added_listeners.remove(id)
    }

    pub(crate) fn clear_event_added_listeners(&self) {
        self.event_added_listeners.clear();
    }

    async fn add(&self, data: EventData) -> Result<()> {
        let event = Event::new(self.id_generator.new_id(), data);
        self.storage.add(event).await?;
        self.event_added_listeners.notify();
        Ok(())
    }

    /// Queue the metrics whose `(api, kind)` is not queued yet.
    async fn add_metrics(&self, metrics: Vec<MetricsEventData>) -> Result<()> {
        let _guard = self.metrics_lock.lock().await;

        let mut keys: HashSet<_> = self
            .storage
            .get_all()
            .await?
            .iter()
            .filter_map(Event::as_metrics)
            .map(MetricsEvent::unique_key)
            .collect();

        let fresh: Vec<Event> = metrics
            .into_iter()
            .filter(|data| keys.insert((data.api_id(), data.kind())))
            .map(|data| {
                let metrics = MetricsEvent {
                    timestamp: self.clock.now_seconds(),
                    event: data,
                    source_id: self.source_id,
                    sdk_version: self.sdk_version.clone(),
                    metadata: self.metadata.clone(),
                };
                Event::new(self.id_generator.new_id(), EventData::Metrics(metrics))
            })
            .collect();

        if fresh.is_empty() {
            return Ok(());
        }
        self.storage.add_all(fresh).await?;
        self.event_added_listeners.notify();
        Ok(())
    }

    fn labels(&self) -> HashMap<String, String> {
        HashMap::from([("tag".to_owned(), self.feature_tag.clone())])
    }

    fn error_metrics(&self, api_id: ApiId, error: &Error) -> MetricsEventData {
        let mut labels = self.labels();
        let kind: fn(ErrorMetrics) -> MetricsEventData = match error {
            Error::Timeout { timeout_millis, .. } => {
                let seconds = *timeout_millis as f64 / 1000.0;
                labels.insert("timeout".to_owned(), seconds.to_string());
                MetricsEventData::TimeoutError
            }
            Error::Network { .. } => MetricsEventData::NetworkError,
            Error::BadRequest { .. } => MetricsEventData::BadRequestError,
            Error::NotFound { .. } => MetricsEventData::NotFoundError,
            Error::ClientClosedRequest { .. } => MetricsEventData::ClientClosedRequestError,
            Error::InternalServerError { .. } => MetricsEventData::InternalServerError,
            Error::ServiceUnavailable { .. } => MetricsEventData::ServiceUnavailableError,
            Error::PayloadTooLarge { .. } => MetricsEventData::PayloadTooLargeError,
            Error::RedirectRequest { status_code, .. } => {
                labels.insert("response_code".to_owned(), status_code.to_string());
                MetricsEventData::RedirectionRequestError
            }
            Error::Unknown {
                status_code,
                message,
            } => {
                if let Some(status_code) = status_code {
                    labels.insert("response_code".to_owned(), status_code.to_string());
                }
                labels.insert("error_message".to_owned(), message.clone());
                MetricsEventData::UnknownError
            }
            Error::Unauthorized { .. }
            | Error::Forbidden { .. }
            | Error::InvalidMethod { .. }
            | Error::IllegalArgument(_)
            | Error::IllegalState(_)
            | Error::Storage(_)
            | Error::Serialization(_) => MetricsEventData::InternalSdkError,
        };
        kind(ErrorMetrics { api_id, labels })
    }
}
