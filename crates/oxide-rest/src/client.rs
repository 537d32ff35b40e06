//! PostgREST client over HTTP.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_RANGE};
use reqwest::Method;
use serde_json::Value;
use tracing::{debug, error};
use url::Url;

use crate::config::RestConfig;
use crate::envelope::Envelope;
use crate::error::{ClientError, Result, StoreError};
use crate::request::{Action, Cardinality, Filter, Request};
use crate::store::DataStore;

const OBJECT_MEDIA_TYPE: &str = "application/vnd.pgrst.object+json";

/// A [`DataStore`] speaking the PostgREST wire conventions.
///
/// # Example
///
/// ```ignore
/// use oxide_rest::{RequestBuilder, RestClient, RestConfig};
///
/// let client = RestClient::new(RestConfig::from_env()?)?;
/// let envelope = RequestBuilder::from("posts").eq("id", 1).single().execute(&client).await;
/// if envelope.is_success() {
///     println!("{}", envelope.data);
/// }
/// ```
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<RestClientInner>,
}

struct RestClientInner {
    http: reqwest::Client,
    base: Url,
    config: RestConfig,
}

impl RestClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Fails when the URL or key is empty, the URL does not parse, the key
    /// is not a valid header value, or the HTTP client cannot be built.
    pub fn new(config: RestConfig) -> Result<Self> {
        if config.url.trim().is_empty() {
            return Err(ClientError::MissingConfig(String::from("url")));
        }
        if config.key.trim().is_empty() {
            return Err(ClientError::MissingConfig(String::from("key")));
        }
        let base = Url::parse(config.url.trim_end_matches('/'))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value("apikey", &config.key)?);
        headers.insert(
            AUTHORIZATION,
            header_value("authorization", &format!("Bearer {}", config.key))?,
        );

        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(&config.user_agent)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: Arc::new(RestClientInner { http, base, config }),
        })
    }

    /// Builds a client from `SUPABASE_URL` and `SUPABASE_KEY`.
    ///
    /// # Errors
    ///
    /// See [`RestConfig::from_env`] and [`RestClient::new`].
    pub fn from_env() -> Result<Self> {
        Self::new(RestConfig::from_env()?)
    }

    /// The configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &RestConfig {
        &self.inner.config
    }

    /// The URL a request is sent to, query string included.
    ///
    /// # Errors
    ///
    /// Fails when the table name produces an invalid URL.
    pub fn request_url(&self, request: &Request) -> Result<Url> {
        let mut url = self.endpoint(&request.table)?;
        {
            let mut query = url.query_pairs_mut();
            match &request.action {
                Action::Select { columns } => {
                    query.append_pair("select", columns);
                }
                _ => {
                    if let Some(returning) = &request.returning {
                        query.append_pair("select", returning);
                    }
                }
            }
            for filter in &request.filters {
                query.append_pair(&filter.column, &filter_param(filter));
            }
            if let Some(order) = &request.order {
                let direction = if order.ascending { "asc" } else { "desc" };
                query.append_pair("order", &format!("{}.{direction}", order.column));
            }
            if let Some(limit) = request.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        Ok(url)
    }

    /// The URL a stored procedure is invoked at.
    ///
    /// # Errors
    ///
    /// Fails when the procedure name produces an invalid URL.
    pub fn rpc_url(&self, procedure: &str) -> Result<Url> {
        self.endpoint(&format!("rpc/{procedure}"))
    }

    /// The `Prefer` header for a request, if one is needed.
    #[must_use]
    pub fn prefer(request: &Request) -> Option<String> {
        match &request.action {
            Action::Select { .. } => (request.cardinality == Cardinality::Many)
                .then(|| String::from("count=exact")),
            action => {
                let mut prefer = if request.returning.is_some() {
                    String::from("return=representation")
                } else {
                    String::from("return=minimal")
                };
                if matches!(action, Action::Upsert { .. }) {
                    prefer.push_str(",resolution=merge-duplicates");
                }
                Some(prefer)
            }
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/rest/v1/{path}",
            self.inner.base.as_str().trim_end_matches('/')
        ))?)
    }

    async fn send(&self, method: Method, url: Url, mut builder: RequestExtras) -> Envelope {
        let mut http = self.inner.http.request(method.clone(), url.clone());
        if let Some(schema) = &self.inner.config.schema {
            let header = if method == Method::GET {
                "Accept-Profile"
            } else {
                "Content-Profile"
            };
            http = http.header(header, schema);
        }
        if let Some(prefer) = builder.prefer.take() {
            http = http.header("Prefer", prefer);
        }
        if builder.object {
            http = http.header(ACCEPT, OBJECT_MEDIA_TYPE);
        }
        if let Some(body) = builder.body.take() {
            http = http.json(&body);
        }

        debug!(%method, %url, "rest request");
        let response = match http.send().await {
            Ok(response) => response,
            Err(err) => {
                error!(%method, %url, error = %err, "rest request failed");
                return Envelope::failure(StoreError::new("FETCH_ERROR", err.to_string()), 0);
            }
        };

        let status = response.status().as_u16();
        let count = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range);
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                error!(%url, error = %err, "failed to read response body");
                return Envelope::failure(StoreError::new("FETCH_ERROR", err.to_string()), status);
            }
        };

        let mut envelope = if (200..300).contains(&status) {
            let data = if body.trim().is_empty() {
                Value::Null
            } else {
                serde_json::from_str(&body).unwrap_or(Value::String(body))
            };
            Envelope::ok(data, status)
        } else {
            let error = serde_json::from_str::<StoreError>(&body)
                .unwrap_or_else(|_| StoreError::new(status.to_string(), body));
            debug!(status, code = %error.code, "rest request returned an error");
            Envelope::failure(error, status)
        };
        envelope.count = count;
        envelope
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base", &self.inner.base.as_str())
            .field("schema", &self.inner.config.schema)
            .field("timeout", &self.inner.config.timeout)
            .finish_non_exhaustive()
    }
}

#[derive(Default)]
struct RequestExtras {
    prefer: Option<String>,
    object: bool,
    body: Option<Value>,
}

#[async_trait]
impl DataStore for RestClient {
    async fn execute(&self, request: Request) -> Envelope {
        let url = match self.request_url(&request) {
            Ok(url) => url,
            Err(err) => return Envelope::failure(StoreError::new("INVALID_URL", err.to_string()), 0),
        };
        let (method, body) = match &request.action {
            Action::Select { .. } => (Method::GET, None),
            Action::Insert { rows } | Action::Upsert { rows } => (
                Method::POST,
                Some(Value::Array(rows.iter().cloned().map(Value::Object).collect())),
            ),
            Action::Update { values } => (Method::PATCH, Some(Value::Object(values.clone()))),
            Action::Delete => (Method::DELETE, None),
        };
        let extras = RequestExtras {
            prefer: Self::prefer(&request),
            object: request.cardinality == Cardinality::Single,
            body,
        };
        let envelope = self.send(method, url, extras).await;
        if request.cardinality == Cardinality::MaybeSingle {
            return collapse_maybe_single(envelope);
        }
        envelope
    }

    async fn rpc(&self, procedure: &str, params: Value) -> Envelope {
        let url = match self.rpc_url(procedure) {
            Ok(url) => url,
            Err(err) => return Envelope::failure(StoreError::new("INVALID_URL", err.to_string()), 0),
        };
        let extras = RequestExtras {
            body: Some(params),
            ..RequestExtras::default()
        };
        self.send(Method::POST, url, extras).await
    }
}

fn header_value(name: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| ClientError::InvalidHeader(name.to_owned()))
}

/// Renders a filter as the right-hand side of a PostgREST query parameter.
fn filter_param(filter: &Filter) -> String {
    let value = match (filter.operator.as_str(), &filter.value) {
        ("in", Value::Array(items)) => {
            let items: Vec<String> = items.iter().map(list_item).collect();
            format!("({})", items.join(","))
        }
        (_, value) => scalar(value),
    };
    let not = if filter.negated { "not." } else { "" };
    format!("{not}{}.{value}", filter.operator)
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn list_item(value: &Value) -> String {
    match value {
        Value::String(s) if s.contains([',', '(', ')', '"']) => {
            format!("\"{}\"", s.replace('"', "\\\""))
        }
        other => scalar(other),
    }
}

/// Extracts the total from `Content-Range: 0-9/42`.
fn parse_content_range(header: &str) -> Option<u64> {
    header.rsplit_once('/')?.1.parse().ok()
}

fn collapse_maybe_single(mut envelope: Envelope) -> Envelope {
    if !envelope.is_success() {
        return envelope;
    }
    match envelope.data.take() {
        Value::Array(mut items) if items.len() <= 1 => {
            envelope.data = items.pop().unwrap_or(Value::Null);
            envelope
        }
        Value::Array(items) => Envelope::failure(
            StoreError::new(
                "PGRST116",
                "JSON object requested, multiple (or no) rows returned",
            )
            .with_details(format!("The result contains {} rows", items.len())),
            406,
        ),
        other => {
            envelope.data = other;
            envelope
        }
    }
}
