//! HTTP client for the Alma REST API

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{error, info, warn};

use almapipo_common::types::{Action, RecordId};

use super::sets::{self, PAGE_SIZE};
use super::{ApiError, RecordClient};
use crate::config::AlmaConfig;

/// Header carrying the number of calls left for the day
pub const REMAINING_CALLS_HEADER: &str = "X-Exl-Api-Remaining";

pub struct AlmaClient {
    client: Client,
    base_url: String,
}

impl AlmaClient {
    pub fn new(config: &AlmaConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/xml"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/xml"));
        let mut auth = HeaderValue::from_str(&format!("apikey {}", config.api_key))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(concat!("almapipo/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Send one request and check the status code of the answer
    async fn call(
        &self,
        action: Action,
        path: &str,
        payload: Option<&str>,
    ) -> Result<String, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        let method = match action {
            Action::Get => Method::GET,
            Action::Put => Method::PUT,
            Action::Post => Method::POST,
            Action::Delete => Method::DELETE,
        };

        let mut request = self.client.request(method, &url);
        if let Some(payload) = payload {
            request = request.body(payload.to_string());
        }

        let response = request.send().await.map_err(|e| {
            error!(action = %action, path = %path, error = %e, "Request failed");
            ApiError::from(e)
        })?;
        let status = response.status();
        let body = response.text().await?;

        let expected = action.expected_status();
        if status.as_u16() != expected {
            error!(
                action = %action,
                path = %path,
                status = status.as_u16(),
                body = %body,
                "Request failed"
            );
            return Err(ApiError::Status {
                code: status.as_u16(),
                expected,
                body,
            });
        }

        info!(action = %action, path = %path, "Request completed");

        if action != Action::Delete && body.trim().is_empty() {
            error!(action = %action, path = %path, "Empty response");
            return Err(ApiError::EmptyResponse);
        }

        if body.contains("<errorList>") {
            warn!(
                action = %action,
                path = %path,
                body = %body,
                "Response contains an error list despite status {}",
                status.as_u16()
            );
        } else if action != Action::Delete && !body.trim_start().starts_with("<?xml") {
            warn!(action = %action, path = %path, body = %body, "Response does not look like XML");
        }

        Ok(body)
    }
}

#[async_trait]
impl RecordClient for AlmaClient {
    async fn retrieve(&self, path: &str) -> Result<String, ApiError> {
        self.call(Action::Get, path, None).await
    }

    async fn create(&self, path: &str, payload: &str) -> Result<String, ApiError> {
        self.call(Action::Post, path, Some(payload)).await
    }

    async fn update(&self, path: &str, payload: &str) -> Result<String, ApiError> {
        self.call(Action::Put, path, Some(payload)).await
    }

    async fn delete(&self, path: &str) -> Result<String, ApiError> {
        self.call(Action::Delete, path, None).await
    }

    async fn set_members(&self, set_id: &str) -> Result<Vec<RecordId>, ApiError> {
        info!(set_id = %set_id, "Resolving set members");

        let first = self.call(Action::Get, &sets::members_path(set_id, 1, 0), None).await?;
        let total = sets::total_record_count(&first)?;

        // The count comes from the server, so it only bounds the paging
        let mut record_ids = Vec::new();
        let mut used_fallback = false;

        for offset in (0..total).step_by(PAGE_SIZE) {
            let page = self
                .call(Action::Get, &sets::members_path(set_id, PAGE_SIZE, offset), None)
                .await?;

            let members = sets::parse_members(&page)?;
            if members.is_empty() {
                warn!(
                    set_id = %set_id,
                    total,
                    offset,
                    "Set page is empty before total_record_count was reached"
                );
                break;
            }

            for member in members {
                used_fallback |= member.link.as_deref().map_or(true, str::is_empty);
                record_ids.push(sets::member_record_id(&member, &self.base_url)?);
            }
        }

        if used_fallback {
            info!(
                set_id = %set_id,
                "Some members have no link, using their id only"
            );
        }

        info!(set_id = %set_id, total, resolved = record_ids.len(), "Set members resolved");
        Ok(record_ids)
    }

    async fn calls_remaining(&self) -> Result<u64, ApiError> {
        let url = format!("{}/bibs/test", self.base_url);
        let response = self.client.get(&url).send().await?;

        let remaining = response
            .headers()
            .get(REMAINING_CALLS_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .ok_or_else(|| {
                ApiError::invalid_response(format!("missing or invalid {REMAINING_CALLS_HEADER} header"))
            })?;

        info!(remaining, "API calls left for today");
        Ok(remaining)
    }
}
