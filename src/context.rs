use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
    time::Duration,
};

use crate::{
    api_client::ApiClient,
    config::ClientConfig,
    evaluation::{EvaluationInteractor, EvaluationStorage, FetchOutcome},
    event::EventInteractor,
    model::{ApiId, User},
    storage::JsonStorage,
    Result,
};

/// State shared by the client facade and the background tasks.
pub(crate) struct Context {
    user: RwLock<User>,
    pub(crate) evaluations: EvaluationInteractor,
    pub(crate) events: EventInteractor,
}

impl Context {
    pub(crate) fn new(config: &ClientConfig) -> Context {
        let api = Arc::new(ApiClient::new(
            config.transport.clone(),
            config.api_client_config(),
        ));

        let evaluation_storage = EvaluationStorage::new(
            config.user.id.clone(),
            Box::new(JsonStorage::new(
                config.store.clone(),
                config.storage_key("evaluations"),
            )),
        );
        let evaluations = EvaluationInteractor::new(
            api.clone(),
            evaluation_storage,
            config.feature_tag.clone(),
            config.clock.clone(),
            config.id_generator.clone(),
        );
        let events = EventInteractor::new(config, api);

        Context {
            user: RwLock::new(config.user.clone()),
            evaluations,
            events,
        }
    }

    pub(crate) fn user(&self) -> User {
        self.user
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replace the user's attributes and ask the next fetch to re-evaluate everything.
    pub(crate) fn update_user_attributes(&self, attributes: HashMap<String, String>) -> Result<()> {
        self.user
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .data = attributes;
        self.evaluations.storage().set_user_attributes_updated()
    }

    /// Fetch evaluations and record the outcome as metrics.
    pub(crate) async fn fetch_evaluations(&self, timeout: Option<Duration>) -> Result<FetchOutcome> {
        let user = self.user();
        let result = self.evaluations.fetch(&user, timeout).await;

        let tracked = match &result {
            Ok(outcome) => {
                self.events
                    .track_success(ApiId::GetEvaluations, outcome.latency, outcome.size_bytes)
                    .await
            }
            Err(err) => {
                log::warn!(target: "flagsync", "failed to fetch evaluations: {err}");
                self.events.track_failure(ApiId::GetEvaluations, err).await
            }
        };
        if let Err(err) = tracked {
            log::warn!(target: "flagsync", "failed to record fetch metrics: {err}");
        }

        result
    }
}
