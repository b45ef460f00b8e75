use std::{sync::Arc, time::Duration};

use crate::{
    api_client::ApiClient,
    clock::Clock,
    id::IdGenerator,
    listener::{ListenerId, ListenerRegistry},
    model::{Evaluation, User, UserEvaluationCondition},
    Error, Result,
};

use super::storage::EvaluationStorage;

/// Result of a successful [`Client::fetch_evaluations`](crate::Client::fetch_evaluations).
#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    /// Whether the cache contents changed (and listeners were notified).
    pub changed: bool,
    pub latency: Duration,
    pub size_bytes: u64,
}

/// Keeps the evaluation cache in sync with the remote service.
///
/// Overlapping `fetch` calls are not serialized against each other; each cache write is atomic,
/// but the last reconciliation to finish wins.
pub(crate) struct EvaluationInteractor {
    api: Arc<ApiClient>,
    storage: EvaluationStorage,
    feature_tag: String,
    clock: Arc<dyn Clock>,
    id_generator: Arc<dyn IdGenerator>,
    update_listeners: ListenerRegistry<dyn Fn() + Send + Sync>,
}

impl EvaluationInteractor {
    pub(crate) fn new(
        api: Arc<ApiClient>,
        storage: EvaluationStorage,
        feature_tag: impl Into<String>,
        clock: Arc<dyn Clock>,
        id_generator: Arc<dyn IdGenerator>,
    ) -> EvaluationInteractor {
        EvaluationInteractor {
            api,
            storage,
            feature_tag: feature_tag.into(),
            clock,
            id_generator,
            update_listeners: ListenerRegistry::new(),
        }
    }

    pub(crate) fn storage(&self) -> &EvaluationStorage {
        &self.storage
    }

    pub(crate) fn get(&self, feature_id: &str) -> Result<Option<Evaluation>> {
        self.storage.get(feature_id)
    }

    pub(crate) async fn fetch(&self, user: &User, timeout: Option<Duration>) -> Result<FetchOutcome> {
        if user.id != self.storage.user_id() {
            return Err(Error::IllegalArgument(format!(
                "user {} does not own this evaluation cache",
                user.id
            )));
        }

        let snapshot = self.storage.snapshot()?;
        let current_evaluations_id = snapshot.current_evaluations_id.unwrap_or_default();
        let condition = UserEvaluationCondition {
            evaluated_at: snapshot.evaluated_at,
            user_attributes_updated: snapshot.user_attributes_updated,
        };

        let response = self
            .api
            .get_evaluations(
                &self.feature_tag,
                user,
                &current_evaluations_id,
                condition,
                timeout,
            )
            .await?;
        let latency = response.latency;
        let size_bytes = response.size_bytes;
        let response = response.body;

        let changed = if response.user_evaluations_id == current_evaluations_id {
            log::debug!(target: "flagsync", evaluations_id = current_evaluations_id.as_str(); "evaluations are up to date");
            false
        } else {
            let evaluations = response.evaluations;
            let evaluated_at = if evaluations.created_at.is_empty() {
                self.clock.now_seconds().to_string()
            } else {
                evaluations.created_at
            };

            if evaluations.force_update {
                log::debug!(target: "flagsync", count = evaluations.evaluations.len(); "replacing all evaluations");
                self.storage.delete_all_and_insert(
                    response.user_evaluations_id,
                    evaluations.evaluations,
                    evaluated_at,
                )?;
                true
            } else {
                log::debug!(target: "flagsync",
                    upserted = evaluations.evaluations.len(),
                    archived = evaluations.archived_feature_ids.len();
                    "merging evaluations");
                self.storage.update(
                    response.user_evaluations_id,
                    evaluations.evaluations,
                    &evaluations.archived_feature_ids,
                    evaluated_at,
                )?
            }
        };

        self.storage.clear_user_attributes_updated()?;

        if changed {
            self.update_listeners.notify();
        }

        Ok(FetchOutcome {
            changed,
            latency,
            size_bytes,
        })
    }

    pub(crate) fn add_update_listener(&self, listener: Arc<dyn Fn() + Send + Sync>) -> ListenerId {
        let id = ListenerId::new(self.id_generator.new_id());
        self.update_listeners.add(id, listener)
    }

    pub(crate) fn remove_update_listener(&self, id: &ListenerId) -> bool {
        self.update_listeners.remove(id)
    }

    pub(crate) fn clear_update_listeners(&self) {
        self.update_listeners.clear();
    }
}
