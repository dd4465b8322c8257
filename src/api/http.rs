use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use crate::api::GoalApi;
use crate::config::TokenPair;
use crate::error::AppError;
use crate::filter::query_pairs;
use crate::model::{
    Goal, GoalChanges, GoalFilters, GoalInput, GoalPage, GoalStats, GoalStatus, Roadmap,
    RoadmapChanges, RoadmapInput, Step, StepChanges, StepInput, StepOrder,
};

/// REST client for a remote goal tracker.
pub struct HttpApi {
    agent: ureq::Agent,
    base: String,
    authorization: Option<String>,
}

/// Goal resources wrap their payload with a status message.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

impl HttpApi {
    pub fn new(base: &Url, timeout: Duration, tokens: Option<&TokenPair>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self {
            agent,
            base: base.as_str().trim_end_matches('/').to_string(),
            authorization: tokens.map(TokenPair::authorization),
        }
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<Url, AppError> {
        build_endpoint(&self.base, path, query)
    }

    async fn send_raw(
        &self,
        method: &'static str,
        url: Url,
        body: Option<Value>,
    ) -> Result<String, AppError> {
        let agent = self.agent.clone();
        let authorization = self.authorization.clone();
        tracing::debug!(%method, %url, "sending request");
        tokio::task::spawn_blocking(move || -> Result<String, AppError> {
            let mut request = agent
                .request_url(method, &url)
                .set("Accept", "application/json");
            if let Some(authorization) = &authorization {
                request = request.set("Authorization", authorization);
            }
            let result = match body {
                Some(body) => request.send_json(body),
                None => request.call(),
            };
            match result {
                Ok(response) => Ok(response.into_string()?),
                Err(ureq::Error::Status(status, response)) => {
                    let body = response.into_string().unwrap_or_default();
                    Err(request_error(status, &body))
                }
                Err(ureq::Error::Transport(transport)) => {
                    Err(AppError::Network(transport.to_string()))
                }
            }
        })
        .await
        .map_err(|err| AppError::Network(format!("request task failed: {err}")))?
    }

    async fn send<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: Url,
        body: Option<Value>,
    ) -> Result<T, AppError> {
        let text = self.send_raw(method, url, body).await?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn send_wrapped<T: DeserializeOwned>(
        &self,
        method: &'static str,
        url: Url,
        body: Option<Value>,
    ) -> Result<T, AppError> {
        let envelope: Envelope<T> = self.send(method, url, body).await?;
        Ok(envelope.data)
    }
}

impl GoalApi for HttpApi {
    async fn list_goals(&self, filters: &GoalFilters) -> Result<GoalPage, AppError> {
        let url = self.endpoint("/api/goals", &query_pairs(filters))?;
        self.send("GET", url, None).await
    }

    async fn get_goal(&self, id: i64) -> Result<Goal, AppError> {
        let url = self.endpoint(&format!("/api/goals/{id}"), &[])?;
        self.send_wrapped("GET", url, None).await
    }

    async fn create_goal(&self, input: &GoalInput) -> Result<Goal, AppError> {
        let url = self.endpoint("/api/goals", &[])?;
        let body = serde_json::to_value(input)?;
        self.send_wrapped("POST", url, Some(body)).await
    }

    async fn update_goal(&self, id: i64, changes: &GoalChanges) -> Result<Goal, AppError> {
        let url = self.endpoint(&format!("/api/goals/{id}"), &[])?;
        let body = serde_json::to_value(changes)?;
        self.send_wrapped("PUT", url, Some(body)).await
    }

    async fn update_goal_status(&self, id: i64, status: GoalStatus) -> Result<Goal, AppError> {
        let url = self.endpoint(
            &format!("/api/goals/{id}/status"),
            &[("status", status.as_str().to_string())],
        )?;
        self.send_wrapped("PATCH", url, None).await
    }

    async fn delete_goal(&self, id: i64) -> Result<(), AppError> {
        let url = self.endpoint(&format!("/api/goals/{id}"), &[])?;
        self.send_raw("DELETE", url, None).await?;
        Ok(())
    }

    async fn goal_stats(&self) -> Result<GoalStats, AppError> {
        let url = self.endpoint("/api/goals/stats", &[])?;
        self.send_wrapped("GET", url, None).await
    }

    async fn roadmap_for_goal(&self, goal_id: i64) -> Result<Roadmap, AppError> {
        let url = self.endpoint(&format!("/roadmaps/goal/{goal_id}"), &[])?;
        self.send("GET", url, None).await
    }

    async fn get_roadmap(&self, id: i64) -> Result<Roadmap, AppError> {
        let url = self.endpoint(&format!("/roadmaps/{id}"), &[])?;
        self.send("GET", url, None).await
    }

    async fn create_roadmap(
        &self,
        goal_id: i64,
        input: &RoadmapInput,
    ) -> Result<Roadmap, AppError> {
        let url = self.endpoint(&format!("/roadmaps/goal/{goal_id}"), &[])?;
        let body = serde_json::to_value(input)?;
        self.send("POST", url, Some(body)).await
    }

    async fn update_roadmap(
        &self,
        id: i64,
        changes: &RoadmapChanges,
    ) -> Result<Roadmap, AppError> {
        let url = self.endpoint(&format!("/roadmaps/{id}"), &[])?;
        let body = serde_json::to_value(changes)?;
        self.send("PUT", url, Some(body)).await
    }

    async fn delete_roadmap(&self, id: i64) -> Result<(), AppError> {
        let url = self.endpoint(&format!("/roadmaps/{id}"), &[])?;
        self.send_raw("DELETE", url, None).await?;
        Ok(())
    }

    async fn get_step(&self, id: i64) -> Result<Step, AppError> {
        let url = self.endpoint(&format!("/roadmaps/steps/{id}"), &[])?;
        self.send("GET", url, None).await
    }

    async fn create_step(&self, roadmap_id: i64, input: &StepInput) -> Result<Step, AppError> {
        let url = self.endpoint(&format!("/roadmaps/{roadmap_id}/steps"), &[])?;
        let body = serde_json::to_value(input)?;
        self.send("POST", url, Some(body)).await
    }

    async fn update_step(&self, id: i64, changes: &StepChanges) -> Result<Step, AppError> {
        let url = self.endpoint(&format!("/roadmaps/steps/{id}"), &[])?;
        let body = serde_json::to_value(changes)?;
        self.send("PUT", url, Some(body)).await
    }

    async fn toggle_step(&self, id: i64) -> Result<Step, AppError> {
        let url = self.endpoint(&format!("/roadmaps/steps/{id}/toggle"), &[])?;
        self.send("PATCH", url, None).await
    }

    async fn delete_step(&self, id: i64) -> Result<(), AppError> {
        let url = self.endpoint(&format!("/roadmaps/steps/{id}"), &[])?;
        self.send_raw("DELETE", url, None).await?;
        Ok(())
    }

    async fn reorder_steps(&self, roadmap_id: i64, orders: &[StepOrder]) -> Result<(), AppError> {
        let url = self.endpoint(&format!("/roadmaps/{roadmap_id}/steps/reorder"), &[])?;
        let body = serde_json::to_value(orders)?;
        self.send_raw("POST", url, Some(body)).await?;
        Ok(())
    }
}

fn build_endpoint(base: &str, path: &str, query: &[(&str, String)]) -> Result<Url, AppError> {
    let mut url = Url::parse(&format!("{base}{path}"))
        .map_err(|err| AppError::InvalidInput(format!("invalid request url: {err}")))?;
    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(key, value)| (*key, value.as_str())));
    }
    Ok(url)
}

/// Maps a non-2xx reply to a request error. The message prefers the body's
/// `detail` field, then the raw body, then a generic status line.
fn request_error(status: u16, body: &str) -> AppError {
    let details = serde_json::from_str::<Value>(body).ok();
    let detail = details.as_ref().and_then(|value| match value.get("detail") {
        Some(Value::String(text)) => Some(text.clone()),
        Some(Value::Null) | None => None,
        Some(other) => Some(other.to_string()),
    });
    let message = match detail {
        Some(detail) if !detail.trim().is_empty() => detail,
        _ if !body.trim().is_empty() => body.trim().to_string(),
        _ => format!("HTTP error! status: {status}"),
    };
    AppError::Request {
        message,
        status: Some(status),
        details,
    }
}
