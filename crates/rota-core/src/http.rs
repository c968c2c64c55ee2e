use std::time::Duration;

use reqwest::{StatusCode, Url};
use reqwest::blocking::{Client, RequestBuilder};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument};

use crate::backend::{BackendError, ScheduleBackend};
use crate::wire::{
    ApprovalRequest, Directory, LiveSchedule, MessageResponse, Page, PageQuery, ScheduleSummary,
    SnapshotSchedule,
};

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub base_url: String,
    pub token: Option<String>,
    /// `None` waits forever.
    pub timeout: Option<Duration>,
}

/// Blocking client for the HRIS REST API.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    config: HttpConfig,
    base_url: Url,
    http_client: Client,
}

impl HttpBackend {
    pub fn new(mut config: HttpConfig) -> Result<Self, BackendError> {
        let trimmed = config.base_url.trim().trim_end_matches('/').to_string();
        if trimmed.is_empty() {
            return Err(BackendError::Config("api.url is not set".to_string()));
        }
        let base_url = Url::parse(&trimmed)
            .map_err(|err| BackendError::Config(format!("api.url '{trimmed}': {err}")))?;
        if base_url.cannot_be_a_base() {
            return Err(BackendError::Config(format!(
                "api.url '{trimmed}' cannot carry a path"
            )));
        }
        config.base_url = trimmed;

        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        info!(base_url = %config.base_url, "configured HTTP backend");
        Ok(Self {
            config,
            base_url,
            http_client,
        })
    }

    /// Appends each segment percent-encoded, so an id can never leave its own segment.
    fn url(&self, segments: &[&str]) -> Result<Url, BackendError> {
        for segment in segments {
            if segment.is_empty() || *segment == "." || *segment == ".." {
                return Err(BackendError::InvalidId((*segment).to_string()));
            }
        }
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| BackendError::Config("api.url cannot carry a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_headers(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        match &self.config.token {
            Some(token) => builder.header(AUTHORIZATION, format!("Bearer {token}")),
            None => builder,
        }
    }

    fn get(&self, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        Ok(self.with_headers(self.http_client.get(self.url(segments)?)))
    }

    fn post(&self, segments: &[&str]) -> Result<RequestBuilder, BackendError> {
        Ok(self.with_headers(self.http_client.post(self.url(segments)?)))
    }

    #[instrument(skip(self, builder))]
    fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
        context_msg: &str,
    ) -> Result<T, BackendError> {
        let request = builder.build()?;
        let request_url = request.url().to_string();
        debug!(url = %request_url, "sending request");

        let response = self.http_client.execute(request)?;
        let status = response.status();
        info!(url = %request_url, %status, "received response");

        let bytes = response.bytes()?;
        if status.is_success() {
            return serde_json::from_slice::<T>(&bytes).map_err(|err| {
                error!(url = %request_url, error = %err, "failed to deserialize response");
                BackendError::Json(err)
            });
        }

        let message = serde_json::from_slice::<MessageResponse>(&bytes)
            .map(|body| body.message)
            .unwrap_or_else(|_| String::from_utf8_lossy(&bytes).trim().to_string());
        let message = if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        } else {
            message
        };
        error!(%status, %message, "{context_msg} failed");

        Err(match status {
            StatusCode::NOT_FOUND => BackendError::NotFound(message),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => BackendError::Unauthorized(message),
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                BackendError::Conflict(message)
            }
            _ => BackendError::Api { status, message },
        })
    }

    fn mutate(&self, step: &str, request: &ApprovalRequest) -> Result<String, BackendError> {
        let builder = self.post(&["duty-schedules", request.schedule_id.as_str(), step])?;
        let body: MessageResponse = self.send(builder.json(request), step)?;
        Ok(body.message)
    }
}

impl ScheduleBackend for HttpBackend {
    fn fetch_schedule(&self, schedule_id: &str) -> Result<LiveSchedule, BackendError> {
        self.send(self.get(&["duty-schedules", schedule_id])?, "fetch schedule")
    }

    fn fetch_directory(&self, department_id: &str) -> Result<Directory, BackendError> {
        self.send(
            self.get(&["departments", department_id, "directory"])?,
            "fetch directory",
        )
    }

    fn fetch_snapshot(
        &self,
        schedule_id: &str,
        employee_id: Option<&str>,
    ) -> Result<SnapshotSchedule, BackendError> {
        let mut builder = self.get(&["duty-schedules", schedule_id, "snapshot"])?;
        if let Some(employee_id) = employee_id {
            builder = builder.query(&[("employeeId", employee_id)]);
        }
        self.send(builder, "fetch snapshot")
    }

    fn list_by_department(
        &self,
        department_id: &str,
        query: &PageQuery,
    ) -> Result<Page<ScheduleSummary>, BackendError> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(search) = query.search.as_deref().filter(|s| !s.trim().is_empty()) {
            params.push(("search", search.to_string()));
        }
        self.send(
            self.get(&["departments", department_id, "duty-schedules"])?
                .query(&params),
            "list schedules",
        )
    }

    fn submit_for_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.mutate("submit", request)
    }

    fn director_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.mutate("director-approval", request)
    }

    fn hr_approval(&self, request: &ApprovalRequest) -> Result<String, BackendError> {
        self.mutate("hr-approval", request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_blank_base_url() {
        let err = HttpBackend::new(HttpConfig {
            base_url: "  ".to_string(),
            token: None,
            timeout: None,
        })
        .expect_err("blank url");
        assert!(matches!(err, BackendError::Config(_)));
    }

    fn backend(base_url: &str) -> HttpBackend {
        HttpBackend::new(HttpConfig {
            base_url: base_url.to_string(),
            token: Some("t".to_string()),
            timeout: Some(Duration::from_secs(5)),
        })
        .expect("backend")
    }

    #[test]
    fn trims_trailing_slash() {
        let url = backend("http://localhost:8080/api/")
            .url(&["duty-schedules", "1"])
            .expect("url");
        assert_eq!(url.as_str(), "http://localhost:8080/api/duty-schedules/1");
    }

    #[test]
    fn ids_stay_inside_their_segment() {
        let backend = backend("http://h/api");

        let url = backend
            .url(&["duty-schedules", "a?x=1/b", "snapshot"])
            .expect("url");
        assert_eq!(url.path(), "/api/duty-schedules/a%3Fx=1%2Fb/snapshot");
        assert_eq!(url.query(), None);

        let url = backend
            .url(&["duty-schedules", "../departments/d1"])
            .expect("url");
        assert_eq!(url.path(), "/api/duty-schedules/..%2Fdepartments%2Fd1");

        for bad in ["..", ".", ""] {
            assert!(matches!(
                backend.url(&["duty-schedules", bad]),
                Err(BackendError::InvalidId(_))
            ));
        }
    }

    #[test]
    fn rejects_unparseable_base_url() {
        let err = HttpBackend::new(HttpConfig {
            base_url: "not a url".to_string(),
            token: None,
            timeout: None,
        })
        .expect_err("bad url");
        assert!(matches!(err, BackendError::Config(_)));
    }
}
