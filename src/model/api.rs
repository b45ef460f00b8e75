use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Evaluation, Event, SourceId, User};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEvaluationsRequest {
    pub tag: String,
    pub user: User,
    pub user_evaluations_id: String,
    pub user_evaluation_condition: UserEvaluationCondition,
    pub source_id: SourceId,
    pub sdk_version: String,
}

/// Reconciliation hints sent with every evaluation fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvaluationCondition {
    pub evaluated_at: String,
    pub user_attributes_updated: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetEvaluationsResponse {
    pub evaluations: UserEvaluations,
    pub user_evaluations_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEvaluations {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub evaluations: Vec<Evaluation>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub archived_feature_ids: Vec<String>,
    #[serde(default)]
    pub force_update: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEventsRequest {
    pub events: Vec<Event>,
    pub source_id: SourceId,
    pub sdk_version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEventsResponse {
    /// Per-event failures keyed by event id. Events missing from this map were accepted.
    #[serde(default)]
    pub errors: HashMap<String, RegisterEventsError>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterEventsError {
    pub retriable: bool,
    #[serde(default)]
    pub message: String,
}

/// Body of non-2xx responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}
