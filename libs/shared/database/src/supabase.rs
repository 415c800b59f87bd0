use reqwest::{
    Client,
    header::{HeaderMap, HeaderValue, CONTENT_TYPE, AUTHORIZATION},
    Method,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error};

use shared_config::AppConfig;

#[derive(Debug, Error)]
pub enum SupabaseError {
    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {message}")]
    Conflict {
        constraint: Option<String>,
        message: String,
    },

    #[error("Missing reference: {message}")]
    MissingReference {
        constraint: Option<String>,
        message: String,
    },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl SupabaseError {
    /// True when the write failed on the named unique constraint or index.
    pub fn is_conflict_on(&self, name: &str) -> bool {
        matches!(self, SupabaseError::Conflict { constraint: Some(c), .. } if c == name)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SupabaseError::NotFound(_))
    }

    /// The foreign key constraint a write violated, if that is why it failed.
    pub fn missing_reference(&self) -> Option<&str> {
        match self {
            SupabaseError::MissingReference { constraint, .. } => constraint.as_deref(),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PostgrestErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
}

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, auth_token: Option<&str>) -> Result<HeaderMap, SupabaseError> {
        let mut headers = HeaderMap::new();

        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.anon_key)
                .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = auth_token {
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| SupabaseError::InvalidHeader(e.to_string()))?,
            );
        }

        Ok(headers)
    }

    pub async fn request<T>(&self, method: Method, path: &str,
                            auth_token: Option<&str>, body: Option<Value>)
                            -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        self.request_with_headers(method, path, auth_token, body, None).await
    }

    pub async fn request_with_headers<T>(&self, method: Method, path: &str,
                                         auth_token: Option<&str>, body: Option<Value>,
                                         extra_headers: Option<HeaderMap>)
                                         -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let response = self.send(method, path, auth_token, body, extra_headers).await?;
        let text = response.text().await?;

        // 204 responses carry no body
        if text.trim().is_empty() {
            return Ok(serde_json::from_value(Value::Null)?);
        }

        Ok(serde_json::from_str(&text)?)
    }

    /// Insert rows and return them as stored.
    pub async fn insert<T>(&self, table: &str, auth_token: Option<&str>, body: Value)
                           -> Result<Vec<T>, SupabaseError>
    where T: DeserializeOwned {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        self.request_with_headers(
            Method::POST,
            &format!("/rest/v1/{}", table),
            auth_token,
            Some(body),
            Some(headers),
        ).await
    }

    /// Call a Postgres function. Each call runs inside a single transaction.
    pub async fn rpc<T>(&self, function: &str, auth_token: Option<&str>, args: Value)
                        -> Result<T, SupabaseError>
    where T: DeserializeOwned {
        let path = format!("/rest/v1/rpc/{}", function);
        self.request(Method::POST, &path, auth_token, Some(args)).await
    }

    /// Fetch a page of rows together with the exact total matching the filters.
    pub async fn request_with_count<T>(&self, path: &str, auth_token: Option<&str>)
                                       -> Result<(Vec<T>, i64), SupabaseError>
    where T: DeserializeOwned {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.send(Method::GET, path, auth_token, None, Some(headers)).await?;
        let total = content_range_total(response.headers());
        let rows: Vec<T> = serde_json::from_str(&response.text().await?)?;
        let total = total.unwrap_or(rows.len() as i64);

        Ok((rows, total))
    }

    /// Exact row count for a filtered table path, without transferring rows.
    pub async fn count(&self, path: &str, auth_token: Option<&str>) -> Result<i64, SupabaseError> {
        let mut headers = HeaderMap::new();
        headers.insert("Prefer", HeaderValue::from_static("count=exact"));

        let response = self.send(Method::HEAD, path, auth_token, None, Some(headers)).await?;

        content_range_total(response.headers()).ok_or_else(|| SupabaseError::Api {
            status: response.status().as_u16(),
            message: "Missing Content-Range total in count response".to_string(),
        })
    }

    async fn send(&self, method: Method, path: &str, auth_token: Option<&str>,
                  body: Option<Value>, extra_headers: Option<HeaderMap>)
                  -> Result<reqwest::Response, SupabaseError> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making {} request to {}", method, url);

        let mut headers = self.get_headers(auth_token)?;
        if let Some(extra) = extra_headers {
            headers.extend(extra);
        }

        let mut req = self.client.request(method, &url)
            .headers(headers);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);
            return Err(classify_error(status.as_u16(), &error_text));
        }

        Ok(response)
    }
}

fn classify_error(status: u16, error_text: &str) -> SupabaseError {
    let parsed: Option<PostgrestErrorBody> = serde_json::from_str(error_text).ok();
    let message = parsed
        .as_ref()
        .and_then(|b| b.message.clone())
        .unwrap_or_else(|| error_text.to_string());

    let code = parsed.as_ref().and_then(|b| b.code.clone()).unwrap_or_default();

    match (status, code.as_str()) {
        (401 | 403, _) => SupabaseError::Auth(message),
        (404, _) | (_, "P0002") => SupabaseError::NotFound(message),
        (_, "23503") => SupabaseError::MissingReference {
            constraint: constraint_name(&message),
            message: parsed
                .and_then(|b| b.details)
                .unwrap_or(message),
        },
        (409, _) | (_, "23505") => SupabaseError::Conflict {
            constraint: constraint_name(&message),
            message: parsed
                .and_then(|b| b.details)
                .unwrap_or(message),
        },
        _ => {
            SupabaseError::Api {
                status,
                message: if code.is_empty() { message } else { format!("{} ({})", message, code) },
            }
        }
    }
}

/// Postgres names the violated constraint as `... constraint "name"`, for
/// unique and foreign key violations alike.
fn constraint_name(message: &str) -> Option<String> {
    let start = message.find("constraint \"")? + "constraint \"".len();
    let rest = &message[start..];
    let end = rest.find('"')?;
    Some(rest[..end].to_string())
}

fn content_range_total(headers: &HeaderMap) -> Option<i64> {
    headers
        .get("content-range")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.rsplit('/').next())
        .and_then(|total| total.parse().ok())
}
