//! The HTTP transport API requests are sent through.
use async_trait::async_trait;

use crate::Result;

/// A JSON POST request.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

/// Sends HTTP requests.
///
/// Implementations report only transport-level failures as errors (mapped to
/// [`Error::Network`](crate::Error::Network)); non-2xx responses are returned as responses.
/// Deadlines are enforced by the caller by dropping the returned future.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse>;
}

/// [`Transport`] backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> ReqwestTransport {
        ReqwestTransport::default()
    }

    pub fn with_client(client: reqwest::Client) -> ReqwestTransport {
        ReqwestTransport { client }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
        let mut builder = self.client.post(&request.url).body(request.body);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        let response = builder.send().await?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        let body = response.text().await?;

        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use std::{collections::VecDeque, sync::Mutex};

    use async_trait::async_trait;

    use super::{Transport, TransportRequest, TransportResponse};
    use crate::{Error, Result};

    /// Scripted transport. Replies are consumed in order; when the script runs out, the fallback
    /// reply is used.
    pub(crate) struct FakeTransport {
        replies: Mutex<VecDeque<Result<TransportResponse>>>,
        fallback: Mutex<Option<Result<TransportResponse>>>,
        requests: Mutex<Vec<TransportRequest>>,
    }

    impl FakeTransport {
        pub(crate) fn new() -> FakeTransport {
            FakeTransport {
                replies: Mutex::new(VecDeque::new()),
                fallback: Mutex::new(None),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn push_json(&self, status: u16, body: serde_json::Value) -> &Self {
            self.replies.lock().unwrap().push_back(Ok(json_response(status, body)));
            self
        }

        pub(crate) fn push_error(&self, error: Error) -> &Self {
            self.replies.lock().unwrap().push_back(Err(error));
            self
        }

        pub(crate) fn always(&self, reply: Result<TransportResponse>) -> &Self {
            *self.fallback.lock().unwrap() = Some(reply);
            self
        }

        pub(crate) fn requests(&self) -> Vec<TransportRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub(crate) fn request_bodies(&self) -> Vec<serde_json::Value> {
            self.requests()
                .iter()
                .map(|request| serde_json::from_str(&request.body).unwrap())
                .collect()
        }
    }

    pub(crate) fn json_response(status: u16, body: serde_json::Value) -> TransportResponse {
        TransportResponse {
            status,
            headers: vec![("content-type".to_owned(), "application/json".to_owned())],
            body: body.to_string(),
        }
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn post(&self, request: TransportRequest) -> Result<TransportResponse> {
            self.requests.lock().unwrap().push(request);
            if let Some(reply) = self.replies.lock().unwrap().pop_front() {
                return reply;
            }
            match &*self.fallback.lock().unwrap() {
                Some(reply) => reply.clone(),
                None => Err(Error::Network {
                    message: "no scripted reply".to_owned(),
                }),
            }
        }
    }
}
