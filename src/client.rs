use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError, RwLock,
};

use reqwest::header::{self, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;

use crate::{
    classify::{classify_response, classify_service_error, classify_transport, excerpt},
    request::QueryParams,
    retry::RetryEngine,
    wire::{LayerInfo, ServiceDirectory, ServiceErrorEnvelope},
    AdmissionController, ClientConfig, GisError, LayerField, Result, ServiceEntry,
};

/// Live state between `start_session` and `end_session`.
pub(crate) struct Session {
    pub(crate) http: reqwest::Client,
    pub(crate) admission: AdmissionController,
    requests: AtomicU64,
}

/// Async client for ArcGIS FeatureServer layers.
///
/// Requests only run inside a session. All requests of a session share
/// one connection pool and one [`AdmissionController`].
pub struct GisClient {
    config: ClientConfig,
    session: RwLock<Option<Arc<Session>>>,
    field_cache: Mutex<HashMap<String, Vec<LayerField>>>,
}

impl fmt::Debug for GisClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GisClient")
            .field("config", &self.config)
            .field("session_active", &self.is_session_active())
            .finish()
    }
}

impl GisClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            field_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a client from `GIS_*` environment variables.
    ///
    /// See [`ClientConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        ClientConfig::from_env().map(Self::new)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Opens the connection pool and admission state.
    ///
    /// Starting an already active session is a no-op.
    pub fn start_session(&self) -> Result<()> {
        self.open_session().map(|_| ())
    }

    /// Returns `true` when this call created the session.
    fn open_session(&self) -> Result<bool> {
        let mut slot = self.session.write().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Ok(false);
        }

        let http = build_http_client(&self.config)?;
        let rate_limit = self.config.rate_limit();
        *slot = Some(Arc::new(Session {
            http,
            admission: AdmissionController::from_rate_limit(rate_limit),
            requests: AtomicU64::new(0),
        }));

        #[cfg(feature = "tracing")]
        tracing::info!(
            "started GIS session for {} (max {} concurrent, {} req/min)",
            self.config.base_url(),
            rate_limit.concurrent_requests,
            rate_limit.requests_per_minute
        );
        Ok(true)
    }

    /// Tears the session down. Returns `false` when none was active.
    ///
    /// Waiting requests fail with [`GisError::SessionNotStarted`]; requests
    /// already dispatched complete and the pool is dropped after them.
    pub fn end_session(&self) -> bool {
        let session = self
            .session
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match session {
            Some(session) => {
                session.admission.close();
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "closed GIS session (made {} requests)",
                    session.requests.load(Ordering::Relaxed)
                );
                true
            }
            None => false,
        }
    }

    pub fn is_session_active(&self) -> bool {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// HTTP requests dispatched in the current session.
    pub fn request_count(&self) -> u64 {
        self.session()
            .map(|session| session.requests.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Runs `f` inside a session.
    ///
    /// When no session is active one is started and ended on every exit
    /// path, including errors and cancellation. A session the caller
    /// already started is reused and left open.
    pub async fn with_session<'a, T, F, Fut>(&'a self, f: F) -> Result<T>
    where
        F: FnOnce(&'a Self) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let _guard = self.open_session()?.then(|| SessionGuard(self));
        f(self).await
    }

    pub(crate) fn session(&self) -> Result<Arc<Session>> {
        self.session
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(GisError::SessionNotStarted)
    }

    /// Resolves a path relative to the configured services root.
    pub fn service_url(&self, service_path: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url(),
            service_path.trim_start_matches('/')
        )
    }

    /// GETs `url` through admission control and retry, decoding JSON into `T`.
    ///
    /// In-body service errors are classified like HTTP statuses.
    pub async fn get_json<T>(&self, url: &str, params: &[(&'static str, String)]) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let session = self.session()?;
        let mut params: QueryParams = params.to_vec();
        if let Some(token) = self.config.token() {
            params.push(("token", token.to_owned()));
        }

        let session = &*session;
        let params = &params;
        RetryEngine::new(self.config.retry(), &session.admission)
            .execute(url, move |_attempt| async move {
                let body = dispatch(session, url, params).await?;
                decode_body(&body, url)
            })
            .await
    }

    /// Service or layer metadata (`?f=json`).
    pub async fn service_info(&self, service_path: &str) -> Result<serde_json::Value> {
        let url = self.service_url(service_path);
        self.get_json(&url, &[("f", "json".to_owned())]).await
    }

    /// Field definitions of a layer, cached per client.
    pub async fn layer_fields(&self, layer_path: &str) -> Result<Vec<LayerField>> {
        if let Some(fields) = self
            .field_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(layer_path)
        {
            return Ok(fields.clone());
        }

        let url = self.service_url(layer_path);
        let info: LayerInfo = self.get_json(&url, &[("f", "json".to_owned())]).await?;

        #[cfg(feature = "tracing")]
        tracing::info!("discovered {} fields for layer {}", info.fields.len(), layer_path);

        self.field_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(layer_path.to_owned(), info.fields.clone());
        Ok(info.fields)
    }

    /// Services listed at the root of the REST directory.
    pub async fn list_services(&self) -> Result<Vec<ServiceEntry>> {
        let url = self.config.base_url().to_owned();
        let directory: ServiceDirectory = self.get_json(&url, &[("f", "json".to_owned())]).await?;
        Ok(directory.services)
    }

    /// Services whose name contains `pattern`, ignoring case.
    pub async fn discover_services(&self, pattern: &str) -> Result<Vec<ServiceEntry>> {
        let pattern = pattern.to_lowercase();
        let matches: Vec<ServiceEntry> = self
            .list_services()
            .await?
            .into_iter()
            .filter(|service| service.name.to_lowercase().contains(&pattern))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::info!("found {} services matching '{}'", matches.len(), pattern);

        Ok(matches)
    }
}

impl Drop for GisClient {
    fn drop(&mut self) {
        self.end_session();
    }
}

struct SessionGuard<'a>(&'a GisClient);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.end_session();
    }
}

fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let timeouts = config.timeouts();
    let limits = config.limits();

    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

    reqwest::Client::builder()
        .user_agent(config.user_agent())
        .default_headers(headers)
        .connect_timeout(timeouts.connect)
        .read_timeout(timeouts.read)
        .pool_idle_timeout(limits.keep_alive_expiry)
        .pool_max_idle_per_host(limits.max_keep_alive)
        .build()
        .map_err(|err| GisError::InvalidConfig(format!("failed to build HTTP client: {err}")))
}

/// One HTTP exchange; the caller holds the admission slot.
async fn dispatch(
    session: &Session,
    url: &str,
    params: &[(&'static str, String)],
) -> Result<String> {
    let response = session
        .http
        .get(url)
        .query(params)
        .send()
        .await
        .map_err(|err| classify_transport(&err, url))?;
    session.requests.fetch_add(1, Ordering::Relaxed);

    if !response.status().is_success() {
        return Err(classify_response(response, url).await);
    }

    response
        .text()
        .await
        .map_err(|err| classify_transport(&err, url))
}

fn decode_body<T: DeserializeOwned>(body: &str, url: &str) -> Result<T> {
    let invalid = || GisError::InvalidResponse {
        url: url.to_owned(),
        status: None,
        body_excerpt: excerpt(body),
    };

    let value: serde_json::Value = serde_json::from_str(body).map_err(|_| invalid())?;
    if value.get("error").is_some() {
        if let Ok(envelope) = serde_json::from_value::<ServiceErrorEnvelope>(value.clone()) {
            let message = envelope.error.describe();
            return Err(match envelope.error.code {
                Some(code) => classify_service_error(code, &message, url),
                None => GisError::InvalidResponse {
                    url: url.to_owned(),
                    status: None,
                    body_excerpt: excerpt(&message),
                },
            });
        }
    }
    serde_json::from_value(value).map_err(|_| invalid())
}
