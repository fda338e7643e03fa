//! Recurring triggers for workflows.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use tracing::{debug, info};

use crate::config::SchedulerConfig;
use crate::error::{AppError, AppResult};
use crate::external::client::HTTP_CLIENT;

const SERVICE: &str = "scheduler";

/// Path the schedule service calls back on every tick.
pub const CALLBACK_PATH: &str = "/api/cron/process-workflow";

/// Longest interval a single hour-field cron expression can express.
pub const MAX_INTERVAL_HOURS: i32 = 24;

/// Every `hours` hours, on the hour. 24 means once a day at midnight; callers
/// keep `hours` within `1..=MAX_INTERVAL_HOURS`.
pub fn interval_to_cron(hours: i32) -> String {
    if hours >= MAX_INTERVAL_HOURS {
        return "0 0 * * *".to_string();
    }
    format!("0 */{hours} * * *")
}

/// Registration of recurring workflow triggers with some scheduler.
#[async_trait]
pub trait ScheduleAdapter: Send + Sync {
    /// Registers a trigger firing every `interval_hours` and returns its handle.
    async fn create(&self, workflow_id: &str, interval_hours: i32) -> AppResult<String>;

    /// Replaces the cron of an existing handle. Returns the handle to keep.
    async fn update(&self, handle: &str, workflow_id: &str, cron: &str) -> AppResult<String>;

    async fn pause(&self, handle: &str) -> AppResult<()>;

    async fn resume(&self, handle: &str) -> AppResult<()>;

    async fn delete(&self, handle: &str) -> AppResult<()>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedSchedule {
    schedule_id: String,
}

/// QStash-style REST schedule service that calls back over HTTP.
#[derive(Debug, Clone)]
pub struct HttpScheduleClient {
    base_url: String,
    token: String,
    public_base_url: String,
}

impl HttpScheduleClient {
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            base_url: config.service_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn destination(&self, workflow_id: &str) -> String {
        format!(
            "{}{}?definitionId={}",
            self.public_base_url, CALLBACK_PATH, workflow_id
        )
    }

    async fn send(&self, request: reqwest::RequestBuilder, action: &str) -> AppResult<reqwest::Response> {
        let response = request
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("{action} request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::external(
                SERVICE,
                format!("{action} failed with status {status}: {body}"),
            ));
        }
        Ok(response)
    }

    async fn upsert(&self, workflow_id: &str, cron: &str, handle: Option<&str>) -> AppResult<String> {
        let url = format!("{}/v2/schedules/{}", self.base_url, self.destination(workflow_id));
        let mut request = HTTP_CLIENT
            .post(url)
            .header("Upstash-Cron", cron)
            .header("Upstash-Method", "GET");
        if let Some(handle) = handle {
            request = request.header("Upstash-Schedule-Id", handle);
        }

        let created: CreatedSchedule = self
            .send(request, "create schedule")
            .await?
            .json()
            .await
            .map_err(|e| AppError::external(SERVICE, format!("invalid JSON: {e}")))?;
        Ok(created.schedule_id)
    }

    async fn call(&self, method: Method, path: String, action: &str) -> AppResult<()> {
        let url = format!("{}/v2/schedules/{}", self.base_url, path);
        self.send(HTTP_CLIENT.request(method, url), action).await?;
        Ok(())
    }
}

#[async_trait]
impl ScheduleAdapter for HttpScheduleClient {
    async fn create(&self, workflow_id: &str, interval_hours: i32) -> AppResult<String> {
        let handle = self
            .upsert(workflow_id, &interval_to_cron(interval_hours), None)
            .await?;
        info!(workflow_definition_id = workflow_id, schedule_id = %handle, interval_hours, "Schedule created");
        Ok(handle)
    }

    async fn update(&self, handle: &str, workflow_id: &str, cron: &str) -> AppResult<String> {
        let handle = self.upsert(workflow_id, cron, Some(handle)).await?;
        debug!(workflow_definition_id = workflow_id, schedule_id = %handle, cron, "Schedule updated");
        Ok(handle)
    }

    async fn pause(&self, handle: &str) -> AppResult<()> {
        self.call(Method::PATCH, format!("{handle}/pause"), "pause schedule")
            .await
    }

    async fn resume(&self, handle: &str) -> AppResult<()> {
        self.call(Method::PATCH, format!("{handle}/resume"), "resume schedule")
            .await
    }

    async fn delete(&self, handle: &str) -> AppResult<()> {
        self.call(Method::DELETE, handle.to_string(), "delete schedule")
            .await
    }
}
