use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard},
};

use serde::{Deserialize, Serialize};

use crate::{model::Evaluation, storage::Storage, Result};

/// Persisted evaluation cache for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationSnapshot {
    pub user_id: String,
    /// Version token of the cached evaluation set. `None` before the first successful fetch.
    pub current_evaluations_id: Option<String>,
    /// Unix seconds, as a string, of the last reconciliation. `"0"` before the first fetch.
    pub evaluated_at: String,
    pub user_attributes_updated: bool,
    /// Keyed by feature id.
    pub evaluations: HashMap<String, Evaluation>,
}

impl EvaluationSnapshot {
    fn empty(user_id: &str) -> EvaluationSnapshot {
        EvaluationSnapshot {
            user_id: user_id.to_owned(),
            current_evaluations_id: None,
            evaluated_at: "0".to_owned(),
            user_attributes_updated: false,
            evaluations: HashMap::new(),
        }
    }
}

/// The evaluation cache of the active user.
///
/// Every mutation is a read-modify-write of the persisted snapshot under a process-local lock.
/// A snapshot written for a different user is ignored and replaced on the next write.
pub(crate) struct EvaluationStorage {
    user_id: String,
    storage: Box<dyn Storage<EvaluationSnapshot>>,
    write_lock: Mutex<()>,
}

impl EvaluationStorage {
    pub(crate) fn new(
        user_id: impl Into<String>,
        storage: Box<dyn Storage<EvaluationSnapshot>>,
    ) -> EvaluationStorage {
        EvaluationStorage {
            user_id: user_id.into(),
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub(crate) fn user_id(&self) -> &str {
        &self.user_id
    }

    pub(crate) fn snapshot(&self) -> Result<EvaluationSnapshot> {
        Ok(match self.storage.get()? {
            Some(snapshot) if snapshot.user_id == self.user_id => snapshot,
            _ => EvaluationSnapshot::empty(&self.user_id),
        })
    }

    pub(crate) fn get(&self, feature_id: &str) -> Result<Option<Evaluation>> {
        Ok(self.snapshot()?.evaluations.remove(feature_id))
    }

    #[cfg(test)]
    pub(crate) fn current_evaluations_id(&self) -> Result<Option<String>> {
        Ok(self.snapshot()?.current_evaluations_id)
    }

    pub(crate) fn set_user_attributes_updated(&self) -> Result<()> {
        self.modify(|snapshot| snapshot.user_attributes_updated = true)
    }

    pub(crate) fn clear_user_attributes_updated(&self) -> Result<()> {
        self.modify(|snapshot| snapshot.user_attributes_updated = false)
    }

    /// Replace the whole cache.
    pub(crate) fn delete_all_and_insert(
        &self,
        evaluations_id: String,
        evaluations: Vec<Evaluation>,
        evaluated_at: String,
    ) -> Result<()> {
        self.modify(|snapshot| {
            snapshot.evaluations = evaluations
                .into_iter()
                .map(|evaluation| (evaluation.feature_id.clone(), evaluation))
                .collect();
            snapshot.current_evaluations_id = Some(evaluations_id);
            snapshot.evaluated_at = evaluated_at;
        })
    }

    /// Merge `upserts` by feature id and drop `archived_feature_ids`. Returns `true` if any
    /// evaluation was upserted or archived.
    pub(crate) fn update(
        &self,
        evaluations_id: String,
        upserts: Vec<Evaluation>,
        archived_feature_ids: &[String],
        evaluated_at: String,
    ) -> Result<bool> {
        let changed = !upserts.is_empty() || !archived_feature_ids.is_empty();
        self.modify(|snapshot| {
            for evaluation in upserts {
                snapshot
                    .evaluations
                    .insert(evaluation.feature_id.clone(), evaluation);
            }
            for feature_id in archived_feature_ids {
                snapshot.evaluations.remove(feature_id);
            }
            snapshot.current_evaluations_id = Some(evaluations_id);
            snapshot.evaluated_at = evaluated_at;
        })?;
        Ok(changed)
    }

    pub(crate) fn clear(&self) -> Result<()> {
        let _lock = self.lock();
        self.storage.clear()
    }

    fn modify(&self, f: impl FnOnce(&mut EvaluationSnapshot)) -> Result<()> {
        let _lock = self.lock();
        let mut snapshot = self.snapshot()?;
        f(&mut snapshot);
        self.storage.set(&snapshot)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The guarded data lives in storage, so a poisoned lock carries no broken state.
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use super::{EvaluationSnapshot, EvaluationStorage};
    use crate::{
        model::{Evaluation, Reason, ReasonType},
        storage::{InMemoryStore, JsonStorage, KeyValueStore, Storage},
    };

    pub(crate) fn evaluation(feature_id: &str, variation: &str) -> Evaluation {
        Evaluation {
            id: format!("{feature_id}:1:user"),
            feature_id: feature_id.to_owned(),
            feature_version: 1,
            user_id: "user".to_owned(),
            variation_id: format!("{feature_id}-{variation}"),
            variation_name: variation.to_owned(),
            variation_value: variation.to_owned(),
            reason: Reason {
                reason_type: ReasonType::Default,
                rule_id: String::new(),
            },
        }
    }

    fn storage(store: Arc<dyn KeyValueStore>, user_id: &str) -> EvaluationStorage {
        EvaluationStorage::new(user_id, Box::new(JsonStorage::new(store, "evaluations")))
    }

    #[test]
    fn starts_empty() {
        let storage = storage(Arc::new(InMemoryStore::new()), "user");

        let snapshot = storage.snapshot().unwrap();

        assert_eq!(snapshot.current_evaluations_id, None);
        assert_eq!(snapshot.evaluated_at, "0");
        assert!(snapshot.evaluations.is_empty());
    }

    #[test]
    fn replaces_everything() {
        let storage = storage(Arc::new(InMemoryStore::new()), "user");
        storage
            .delete_all_and_insert(
                "t1".to_owned(),
                vec![evaluation("a", "on"), evaluation("b", "on")],
                "1".to_owned(),
            )
            .unwrap();

        storage
            .delete_all_and_insert("t2".to_owned(), vec![evaluation("c", "on")], "2".to_owned())
            .unwrap();

        let snapshot = storage.snapshot().unwrap();
        assert_eq!(snapshot.evaluations.len(), 1);
        assert!(snapshot.evaluations.contains_key("c"));
        assert_eq!(snapshot.current_evaluations_id.as_deref(), Some("t2"));
        assert_eq!(snapshot.evaluated_at, "2");
    }

    #[test]
    fn merges_and_archives() {
        let storage = storage(Arc::new(InMemoryStore::new()), "user");
        storage
            .delete_all_and_insert(
                "t1".to_owned(),
                vec![evaluation("a", "on"), evaluation("b", "on")],
                "1".to_owned(),
            )
            .unwrap();

        let changed = storage
            .update(
                "t2".to_owned(),
                vec![evaluation("a", "off")],
                &["b".to_owned()],
                "2".to_owned(),
            )
            .unwrap();

        assert!(changed);
        let snapshot = storage.snapshot().unwrap();
        assert_eq!(snapshot.evaluations.len(), 1);
        assert_eq!(snapshot.evaluations["a"].variation_value, "off");

        let changed = storage
            .update("t3".to_owned(), vec![], &[], "3".to_owned())
            .unwrap();
        assert!(!changed);
        assert_eq!(storage.current_evaluations_id().unwrap().as_deref(), Some("t3"));
    }

    #[test]
    fn ignores_snapshot_of_another_user() {
        let store: Arc<dyn KeyValueStore> = Arc::new(InMemoryStore::new());
        JsonStorage::<EvaluationSnapshot>::new(store.clone(), "evaluations")
            .set(&EvaluationSnapshot {
                user_id: "someone-else".to_owned(),
                current_evaluations_id: Some("t1".to_owned()),
                evaluated_at: "1".to_owned(),
                user_attributes_updated: true,
                evaluations: [("a".to_owned(), evaluation("a", "on"))].into(),
            })
            .unwrap();

        let storage = storage(store, "user");

        assert_eq!(storage.get("a").unwrap(), None);
        assert_eq!(storage.current_evaluations_id().unwrap(), None);
        assert!(!storage.snapshot().unwrap().user_attributes_updated);
    }

    #[test]
    fn tracks_user_attribute_updates() {
        let storage = storage(Arc::new(InMemoryStore::new()), "user");

        storage.set_user_attributes_updated().unwrap();
        assert!(storage.snapshot().unwrap().user_attributes_updated);

        storage.clear_user_attributes_updated().unwrap();
        assert!(!storage.snapshot().unwrap().user_attributes_updated);
    }
}
