use std::{sync::Arc, time::Duration};

use url::Url;

use crate::{
    api_client::ApiClientConfig,
    clock::{Clock, SystemClock},
    id::{IdGenerator, UuidGenerator},
    model::SourceId,
    storage::{InMemoryStore, KeyValueStore},
    transport::{ReqwestTransport, Transport},
    Client, Error, Result, User,
};

/// Configuration for [`Client`].
///
/// # Examples
/// ```
/// # use std::time::Duration;
/// # use flagsync::{ClientConfig, User};
/// let config = ClientConfig::new("api-key", "https://api.example.com", "web", User::new("user-id"))
///     .polling_interval(Duration::from_secs(5 * 60))
///     .events_max_batch_size(100);
/// ```
#[derive(Clone)]
pub struct ClientConfig {
    pub(crate) api_key: String,
    pub(crate) endpoint: String,
    pub(crate) feature_tag: String,
    pub(crate) user: User,
    pub(crate) app_version: String,
    pub(crate) sdk_version: String,
    pub(crate) source_id: SourceId,
    pub(crate) polling_interval: Duration,
    pub(crate) polling_retry_interval: Duration,
    pub(crate) polling_max_retries: u32,
    pub(crate) events_flush_interval: Duration,
    pub(crate) events_max_batch_size: usize,
    pub(crate) request_timeout: Duration,
    pub(crate) initialization_max_retries: u32,
    pub(crate) initialization_backoff: Duration,
    pub(crate) storage_key_prefix: String,
    pub(crate) cross_context_mutex: bool,
    pub(crate) store: Arc<dyn KeyValueStore>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) id_generator: Arc<dyn IdGenerator>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl ClientConfig {
    /// Default value for [`ClientConfig::polling_interval`].
    pub const DEFAULT_POLLING_INTERVAL: Duration = Duration::from_secs(10 * 60);
    /// Polling intervals below this are raised to it.
    pub const MIN_POLLING_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`ClientConfig::polling_retry_interval`].
    pub const DEFAULT_POLLING_RETRY_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`ClientConfig::polling_max_retries`].
    pub const DEFAULT_POLLING_MAX_RETRIES: u32 = 5;
    /// Default value for [`ClientConfig::events_flush_interval`].
    pub const DEFAULT_EVENTS_FLUSH_INTERVAL: Duration = Duration::from_secs(30);
    /// Flush intervals below this are raised to it.
    pub const MIN_EVENTS_FLUSH_INTERVAL: Duration = Duration::from_secs(10);
    /// Default value for [`ClientConfig::events_max_batch_size`].
    pub const DEFAULT_EVENTS_MAX_BATCH_SIZE: usize = 50;
    /// Default value for [`ClientConfig::request_timeout`].
    pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    /// Default value for [`ClientConfig::storage_key_prefix`].
    pub const DEFAULT_STORAGE_KEY_PREFIX: &'static str = "flagsync";

    /// Create a configuration with defaults for everything but the required settings.
    ///
    /// `feature_tag` restricts fetched evaluations to features carrying that tag.
    pub fn new(
        api_key: impl Into<String>,
        endpoint: impl Into<String>,
        feature_tag: impl Into<String>,
        user: User,
    ) -> ClientConfig {
        ClientConfig {
            api_key: api_key.into(),
            endpoint: endpoint.into(),
            feature_tag: feature_tag.into(),
            user,
            app_version: String::new(),
            sdk_version: env!("CARGO_PKG_VERSION").to_owned(),
            source_id: SourceId::Rust,
            polling_interval: ClientConfig::DEFAULT_POLLING_INTERVAL,
            polling_retry_interval: ClientConfig::DEFAULT_POLLING_RETRY_INTERVAL,
            polling_max_retries: ClientConfig::DEFAULT_POLLING_MAX_RETRIES,
            events_flush_interval: ClientConfig::DEFAULT_EVENTS_FLUSH_INTERVAL,
            events_max_batch_size: ClientConfig::DEFAULT_EVENTS_MAX_BATCH_SIZE,
            request_timeout: ClientConfig::DEFAULT_REQUEST_TIMEOUT,
            initialization_max_retries: 2,
            initialization_backoff: Duration::from_secs(1),
            storage_key_prefix: ClientConfig::DEFAULT_STORAGE_KEY_PREFIX.to_owned(),
            cross_context_mutex: true,
            store: Arc::new(InMemoryStore::new()),
            transport: Arc::new(ReqwestTransport::new()),
            id_generator: Arc::new(UuidGenerator),
            clock: Arc::new(SystemClock),
        }
    }

    /// Version of the host application, attached to event metadata.
    pub fn app_version(mut self, app_version: impl Into<String>) -> Self {
        self.app_version = app_version.into();
        self
    }

    /// Override the reported SDK version. Wrappers around this crate should report their own.
    pub fn sdk_version(mut self, sdk_version: impl Into<String>) -> Self {
        self.sdk_version = sdk_version.into();
        self
    }

    /// Interval between evaluation fetches.
    pub fn polling_interval(mut self, interval: Duration) -> Self {
        self.polling_interval = interval;
        self
    }

    /// Interval between retries after a failed evaluation fetch.
    pub fn polling_retry_interval(mut self, interval: Duration) -> Self {
        self.polling_retry_interval = interval;
        self
    }

    /// Consecutive retries before falling back to [`ClientConfig::polling_interval`].
    pub fn polling_max_retries(mut self, max_retries: u32) -> Self {
        self.polling_max_retries = max_retries;
        self
    }

    /// Interval between forced event flushes.
    pub fn events_flush_interval(mut self, interval: Duration) -> Self {
        self.events_flush_interval = interval;
        self
    }

    /// Maximum number of events sent in one request. A queue holding this many events is
    /// flushed before the flush interval elapses.
    pub fn events_max_batch_size(mut self, size: usize) -> Self {
        self.events_max_batch_size = size;
        self
    }

    /// Deadline for a single HTTP request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Retries of the first fetch performed by [`Client::initialize`].
    pub fn initialization_retries(mut self, max_retries: u32, backoff: Duration) -> Self {
        self.initialization_max_retries = max_retries;
        self.initialization_backoff = backoff;
        self
    }

    /// Prefix for every key written to the store. Clients sharing a store and a prefix share
    /// their cache and event queue.
    pub fn storage_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.storage_key_prefix = prefix.into();
        self
    }

    /// Guard the event queue with a storage-backed mutex so that several processes may share a
    /// store. Enabled by default.
    pub fn cross_context_mutex(mut self, enabled: bool) -> Self {
        self.cross_context_mutex = enabled;
        self
    }

    /// Persistent storage backend. Defaults to [`InMemoryStore`].
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = store;
        self
    }

    /// HTTP transport. Defaults to [`ReqwestTransport`].
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Id generator. Defaults to [`UuidGenerator`].
    pub fn id_generator(mut self, id_generator: Arc<dyn IdGenerator>) -> Self {
        self.id_generator = id_generator;
        self
    }

    /// Wall clock. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Create a new [`Client`] using this configuration.
    pub fn to_client(self) -> Result<Client> {
        Client::new(self)
    }

    /// Check required settings and raise intervals below their minimum.
    pub(crate) fn validate(mut self) -> Result<ClientConfig> {
        if self.api_key.is_empty() {
            return Err(Error::IllegalArgument("api_key is required".to_owned()));
        }
        if self.feature_tag.is_empty() {
            return Err(Error::IllegalArgument("feature_tag is required".to_owned()));
        }
        if self.user.id.is_empty() {
            return Err(Error::IllegalArgument("user id is required".to_owned()));
        }
        Url::parse(&self.endpoint)
            .map_err(|err| Error::IllegalArgument(format!("invalid endpoint: {err}")))?;
        if self.events_max_batch_size == 0 {
            return Err(Error::IllegalArgument(
                "events_max_batch_size must be positive".to_owned(),
            ));
        }

        if self.polling_interval < ClientConfig::MIN_POLLING_INTERVAL {
            log::warn!(target: "flagsync", "polling_interval is below the minimum, using {:?}", ClientConfig::MIN_POLLING_INTERVAL);
            self.polling_interval = ClientConfig::MIN_POLLING_INTERVAL;
        }
        if self.events_flush_interval < ClientConfig::MIN_EVENTS_FLUSH_INTERVAL {
            log::warn!(target: "flagsync", "events_flush_interval is below the minimum, using {:?}", ClientConfig::MIN_EVENTS_FLUSH_INTERVAL);
            self.events_flush_interval = ClientConfig::MIN_EVENTS_FLUSH_INTERVAL;
        }

        Ok(self)
    }

    pub(crate) fn storage_key(&self, suffix: &str) -> String {
        format!("{}_{}", self.storage_key_prefix, suffix)
    }

    pub(crate) fn api_client_config(&self) -> ApiClientConfig {
        ApiClientConfig {
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            source_id: self.source_id,
            sdk_version: self.sdk_version.clone(),
            default_timeout: self.request_timeout,
        }
    }
}
