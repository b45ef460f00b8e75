use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::{Reason, Timestamp, User};

/// Remote operation a metrics event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApiId {
    GetEvaluations,
    RegisterEvents,
}

/// Identifies the kind of SDK that produced a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceId {
    Rust,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Evaluation,
    Goal,
    Metrics,
}

/// One queued telemetry record. Immutable once enqueued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event: EventData,
    #[serde(rename = "type")]
    pub event_type: EventType,
}

impl Event {
    pub fn new(id: String, event: EventData) -> Event {
        let event_type = event.event_type();
        Event {
            id,
            event,
            event_type,
        }
    }

    pub fn as_metrics(&self) -> Option<&MetricsEvent> {
        match &self.event {
            EventData::Metrics(metrics) => Some(metrics),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum EventData {
    #[serde(rename = "EvaluationEvent")]
    Evaluation(EvaluationEvent),
    #[serde(rename = "GoalEvent")]
    Goal(GoalEvent),
    #[serde(rename = "MetricsEvent")]
    Metrics(MetricsEvent),
}

impl EventData {
    pub fn event_type(&self) -> EventType {
        match self {
            EventData::Evaluation(_) => EventType::Evaluation,
            EventData::Goal(_) => EventType::Goal,
            EventData::Metrics(_) => EventType::Metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationEvent {
    pub timestamp: Timestamp,
    pub feature_id: String,
    pub feature_version: i32,
    pub user_id: String,
    pub variation_id: String,
    pub user: User,
    pub reason: Reason,
    pub tag: String,
    pub source_id: SourceId,
    pub sdk_version: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoalEvent {
    pub timestamp: Timestamp,
    pub goal_id: String,
    pub user_id: String,
    pub value: f64,
    pub user: User,
    pub tag: String,
    pub source_id: SourceId,
    pub sdk_version: String,
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsEvent {
    pub timestamp: Timestamp,
    pub event: MetricsEventData,
    pub source_id: SourceId,
    pub sdk_version: String,
    pub metadata: HashMap<String, String>,
}

impl MetricsEvent {
    /// Key used to deduplicate queued metrics.
    pub fn unique_key(&self) -> (ApiId, MetricsKind) {
        (self.event.api_id(), self.event.kind())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LatencyMetrics {
    pub api_id: ApiId,
    pub labels: HashMap<String, String>,
    pub latency_second: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeMetrics {
    pub api_id: ApiId,
    pub labels: HashMap<String, String>,
    pub size_byte: u64,
}

/// Payload shared by every error metrics event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMetrics {
    pub api_id: ApiId,
    pub labels: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "@type")]
pub enum MetricsEventData {
    #[serde(rename = "LatencyMetricsEvent")]
    Latency(LatencyMetrics),
    #[serde(rename = "SizeMetricsEvent")]
    Size(SizeMetrics),
    #[serde(rename = "TimeoutErrorMetricsEvent")]
    TimeoutError(ErrorMetrics),
    #[serde(rename = "NetworkErrorMetricsEvent")]
    NetworkError(ErrorMetrics),
    #[serde(rename = "BadRequestErrorMetricsEvent")]
    BadRequestError(ErrorMetrics),
    #[serde(rename = "NotFoundErrorMetricsEvent")]
    NotFoundError(ErrorMetrics),
    #[serde(rename = "ClientClosedRequestErrorMetricsEvent")]
    ClientClosedRequestError(ErrorMetrics),
    #[serde(rename = "InternalServerErrorMetricsEvent")]
    InternalServerError(ErrorMetrics),
    #[serde(rename = "ServiceUnavailableErrorMetricsEvent")]
    ServiceUnavailableError(ErrorMetrics),
    #[serde(rename = "PayloadTooLargeErrorMetricsEvent")]
    PayloadTooLargeError(ErrorMetrics),
    #[serde(rename = "RedirectionRequestErrorMetricsEvent")]
    RedirectionRequestError(ErrorMetrics),
    #[serde(rename = "InternalSdkErrorMetricsEvent")]
    InternalSdkError(ErrorMetrics),
    #[serde(rename = "UnknownErrorMetricsEvent")]
    UnknownError(ErrorMetrics),
}

/// Payload-free discriminant of [`MetricsEventData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricsKind {
    Latency,
    Size,
    TimeoutError,
    NetworkError,
    BadRequestError,
    NotFoundError,
    ClientClosedRequestError,
    InternalServerError,
    ServiceUnavailableError,
    PayloadTooLargeError,
    RedirectionRequestError,
    InternalSdkError,
    UnknownError,
}

impl MetricsEventData {
    pub fn api_id(&self) -> ApiId {
        match self {
            MetricsEventData::Latency(m) => m.api_id,
            MetricsEventData::Size(m) => m.api_id,
            MetricsEventData::TimeoutError(m)
            | MetricsEventData::NetworkError(m)
            | MetricsEventData::BadRequestError(m)
            | MetricsEventData::NotFoundError(m)
            | MetricsEventData::ClientClosedRequestError(m)
            | MetricsEventData::InternalServerError(m)
            | MetricsEventData::ServiceUnavailableError(m)
            | MetricsEventData::PayloadTooLargeError(m)
            | MetricsEventData::RedirectionRequestError(m)
            | MetricsEventData::InternalSdkError(m)
            | MetricsEventData::UnknownError(m) => m.api_id,
        }
    }

    pub fn kind(&self) -> MetricsKind {
        match self {
            MetricsEventData::Latency(_) => MetricsKind::Latency,
            MetricsEventData::Size(_) => MetricsKind::Size,
            MetricsEventData::TimeoutError(_) => MetricsKind::TimeoutError,
            MetricsEventData::NetworkError(_) => MetricsKind::NetworkError,
            MetricsEventData::BadRequestError(_) => MetricsKind::BadRequestError,
            MetricsEventData::NotFoundError(_) => MetricsKind::NotFoundError,
            MetricsEventData::ClientClosedRequestError(_) => MetricsKind::ClientClosedRequestError,
            MetricsEventData::InternalServerError(_) => MetricsKind::InternalServerError,
            MetricsEventData::ServiceUnavailableError(_) => MetricsKind::ServiceUnavailableError,
            MetricsEventData::PayloadTooLargeError(_) => MetricsKind::PayloadTooLargeError,
            MetricsEventData::RedirectionRequestError(_) => MetricsKind::RedirectionRequestError,
            MetricsEventData::InternalSdkError(_) => MetricsKind::InternalSdkError,
            MetricsEventData::UnknownError(_) => MetricsKind::UnknownError,
        }
    }
}
