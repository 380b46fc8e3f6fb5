//! Journiv REST API client.
//!
//! Covers the handful of endpoints the journiv plugin needs: login, token
//! refresh, journal listing, entry creation and media upload.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote failures, classified for user-facing replies
#[derive(Debug, Error)]
pub enum JournivError {
    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Journiv server error.")]
    Server { status: u16 },

    #[error("Network error contacting Journiv: {0}")]
    Network(#[source] reqwest::Error),

    #[error("Unexpected response from Journiv ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Could not read {path}: {source}")]
    Media {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl JournivError {
    /// True when retrying with a fresh access token may help
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, JournivError::InvalidCredentials(_))
    }
}

impl From<reqwest::Error> for JournivError {
    fn from(e: reqwest::Error) -> Self {
        JournivError::Network(e)
    }
}

/// Access and refresh token pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Tokens {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// A journal the user can log entries to
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Journal {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Journal ids come back as strings or integers depending on the server
fn id_as_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "unexpected journal id {}",
            other
        ))),
    }
}

/// Body of `POST /api/v1/entries/`
#[derive(Debug, Clone, Serialize)]
pub struct NewEntry {
    pub title: String,
    pub content: String,
    pub entry_date: String,
    pub entry_datetime_utc: String,
    pub entry_timezone: String,
    pub location: String,
    pub weather: String,
    pub journal_id: String,
    pub prompt_id: Option<String>,
}

impl NewEntry {
    /// Entry for `journal_id` dated at `now`
    pub fn new(journal_id: &str, content: &str, now: DateTime<Local>) -> Self {
        Self {
            title: format_title_for(now.date_naive()),
            content: content.to_string(),
            entry_date: now.format("%Y-%m-%d").to_string(),
            entry_datetime_utc: now.with_timezone(&Utc).to_rfc3339(),
            entry_timezone: now.format("%:z").to_string(),
            location: String::new(),
            weather: String::new(),
            journal_id: journal_id.to_string(),
            prompt_id: None,
        }
    }
}

/// Created entry, only the id is used
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedEntry {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
}

/// Title like "Wednesday 21st May"
pub fn format_title_for(date: NaiveDate) -> String {
    let day = date.day();
    let suffix = match (day % 10, day) {
        (1, d) if d != 11 => "st",
        (2, d) if d != 12 => "nd",
        (3, d) if d != 13 => "rd",
        _ => "th",
    };
    format!(
        "{} {}{} {}",
        date.format("%A"),
        day,
        suffix,
        date.format("%B")
    )
}

/// Client for one Journiv server
pub struct JournivClient {
    base_url: String,
    http: reqwest::Client,
}

impl JournivClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `POST /api/v1/auth/login`
    pub async fn login(&self, email: &str, password: &str) -> Result<Tokens, JournivError> {
        let response = self
            .http
            .post(self.url("/api/v1/auth/login"))
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(JournivError::InvalidCredentials(
                "Invalid email or password.".to_string(),
            ));
        }
        let body = expect_success(response).await?;
        parse_tokens(&body, "Journiv login succeeded but tokens are missing.")
    }

    /// `POST /api/v1/auth/refresh`
    pub async fn refresh(&self, refresh_token: &str) -> Result<Tokens, JournivError> {
        let response = self
            .http
            .post(self.url("/api/v1/auth/refresh"))
            .timeout(REQUEST_TIMEOUT)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(JournivError::InvalidCredentials(
                "Refresh token is invalid or expired.".to_string(),
            ));
        }
        let body = expect_success(response).await?;
        parse_tokens(&body, "Unexpected refresh token response.")
    }

    /// `GET /api/v1/journals/?include_archived=false`
    pub async fn journals(&self, access_token: &str) -> Result<Vec<Journal>, JournivError> {
        let response = self
            .http
            .get(self.url("/api/v1/journals/?include_archived=false"))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(access_token)
            .header("Accept", "application/json")
            .send()
            .await?;

        check_token(&response)?;
        let body = expect_success(response).await?;
        serde_json::from_value(body.clone()).map_err(|_| JournivError::UnexpectedResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    /// `POST /api/v1/entries/`
    pub async fn create_entry(
        &self,
        access_token: &str,
        entry: &NewEntry,
    ) -> Result<CreatedEntry, JournivError> {
        let response = self
            .http
            .post(self.url("/api/v1/entries/"))
            .timeout(REQUEST_TIMEOUT)
            .bearer_auth(access_token)
            .json(entry)
            .send()
            .await?;

        check_token(&response)?;
        let body = expect_success(response).await?;
        serde_json::from_value(body.clone()).map_err(|_| JournivError::UnexpectedResponse {
            status: 200,
            body: body.to_string(),
        })
    }

    /// `POST /api/v1/media/upload`, attaching `path` to `entry_id`
    pub async fn upload_media(
        &self,
        access_token: &str,
        path: &Path,
        entry_id: &str,
        alt_text: Option<&str>,
    ) -> Result<Value, JournivError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| JournivError::Media {
                path: path.display().to_string(),
                source,
            })?;
        let file_name = path
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/octet-stream")?;
        let mut form = Form::new()
            .part("file", part)
            .text("entry_id", entry_id.to_string());
        if let Some(alt) = alt_text {
            form = form.text("alt_text", alt.to_string());
        }

        let response = self
            .http
            .post(self.url("/api/v1/media/upload"))
            .timeout(REQUEST_TIMEOUT * 4)
            .bearer_auth(access_token)
            .multipart(form)
            .send()
            .await?;

        check_token(&response)?;
        expect_success(response).await
    }
}

fn check_token(response: &reqwest::Response) -> Result<(), JournivError> {
    if response.status() == StatusCode::UNAUTHORIZED {
        return Err(JournivError::InvalidCredentials(
            "Invalid or expired access token.".to_string(),
        ));
    }
    Ok(())
}

/// Map non-2xx statuses to errors and decode the JSON body
async fn expect_success(response: reqwest::Response) -> Result<Value, JournivError> {
    let status = response.status();
    if status.is_server_error() {
        return Err(JournivError::Server {
            status: status.as_u16(),
        });
    }
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(JournivError::UnexpectedResponse {
            status: status.as_u16(),
            body,
        });
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|_| JournivError::UnexpectedResponse {
        status: status.as_u16(),
        body: text,
    })
}

fn parse_tokens(body: &Value, missing: &str) -> Result<Tokens, JournivError> {
    match serde_json::from_value::<Tokens>(body.clone()) {
        Ok(tokens) if !tokens.access_token.is_empty() => Ok(tokens),
        _ => Err(JournivError::UnexpectedResponse {
            status: 200,
            body: missing.to_string(),
        }),
    }
}
