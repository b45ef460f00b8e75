//! An HTTP client for the evaluation and event ingestion endpoints.
use std::{sync::Arc, time::Duration};

use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;

use crate::{
    model::{
        ErrorResponse, Event, GetEvaluationsRequest, GetEvaluationsResponse, RegisterEventsRequest,
        RegisterEventsResponse, SourceId, User, UserEvaluationCondition,
    },
    transport::{Transport, TransportRequest},
    Error, Result,
};

const GET_EVALUATIONS_ENDPOINT: &str = "/get_evaluations";
const REGISTER_EVENTS_ENDPOINT: &str = "/register_events";

pub(crate) struct ApiClientConfig {
    pub endpoint: String,
    pub api_key: String,
    pub source_id: SourceId,
    pub sdk_version: String,
    /// Deadline applied when the caller doesn't supply one.
    pub default_timeout: Duration,
}

/// A successful exchange together with what it cost.
#[derive(Debug)]
pub(crate) struct ApiResponse<T> {
    pub body: T,
    pub latency: Duration,
    pub size_bytes: u64,
}

pub(crate) struct ApiClient {
    transport: Arc<dyn Transport>,
    config: ApiClientConfig,
}

impl ApiClient {
    pub(crate) fn new(transport: Arc<dyn Transport>, config: ApiClientConfig) -> ApiClient {
        ApiClient { transport, config }
    }

    pub(crate) async fn get_evaluations(
        &self,
        tag: &str,
        user: &User,
        user_evaluations_id: &str,
        condition: UserEvaluationCondition,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<GetEvaluationsResponse>> {
        let request = GetEvaluationsRequest {
            tag: tag.to_owned(),
            user: user.clone(),
            user_evaluations_id: user_evaluations_id.to_owned(),
            user_evaluation_condition: condition,
            source_id: self.config.source_id,
            sdk_version: self.config.sdk_version.clone(),
        };

        log::debug!(target: "flagsync", user_id = user.id.as_str(); "fetching evaluations");
        self.post(GET_EVALUATIONS_ENDPOINT, &request, timeout).await
    }

    pub(crate) async fn register_events(
        &self,
        events: &[Event],
    ) -> Result<ApiResponse<RegisterEventsResponse>> {
        let request = RegisterEventsRequest {
            events: events.to_vec(),
            source_id: self.config.source_id,
            sdk_version: self.config.sdk_version.clone(),
        };

        log::debug!(target: "flagsync", count = events.len(); "registering events");
        self.post(REGISTER_EVENTS_ENDPOINT, &request, None).await
    }

    async fn post<Req: Serialize, Resp: DeserializeOwned>(
        &self,
        path: &str,
        body: &Req,
        timeout: Option<Duration>,
    ) -> Result<ApiResponse<Resp>> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let request = TransportRequest {
            url: format!("{}{}", self.config.endpoint.trim_end_matches('/'), path),
            headers: vec![
                ("Authorization".to_owned(), self.config.api_key.clone()),
                ("Content-Type".to_owned(), "application/json".to_owned()),
            ],
            body: serde_json::to_string(body)?,
        };

        let started = Instant::now();
        // Dropping the transport future on deadline aborts the request.
        let response = tokio::time::timeout(timeout, self.transport.post(request))
            .await
            .map_err(|_| Error::Timeout {
                message: format!("request to {path} timed out"),
                timeout_millis: timeout.as_millis() as u64,
            })??;
        let latency = started.elapsed();

        if !(200..300).contains(&response.status) {
            let message = serde_json::from_str::<ErrorResponse>(&response.body)
                .map(|it| it.error.message)
                .unwrap_or_else(|_| response.body.clone());
            log::warn!(target: "flagsync", status = response.status; "received non-2xx response from {path}: {message}");
            return Err(Error::from_status(response.status, message));
        }

        let size_bytes = response.body.len() as u64;
        let body = serde_json::from_str(&response.body)?;

        Ok(ApiResponse {
            body,
            latency,
            size_bytes,
        })
    }
}
