use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fmt;
use timeline::Timeline;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

pub type ProjectId = i64;

/// Lifecycle of a project as tracked by the backend.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    Draft,
    Rendering,
    Ready,
    Error,
}

impl ProjectStatus {
    /// Only `rendering` is worth polling; everything else is terminal.
    pub fn is_rendering(&self) -> bool {
        matches!(self, ProjectStatus::Rendering)
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProjectStatus::Draft => "draft",
            ProjectStatus::Rendering => "rendering",
            ProjectStatus::Ready => "ready",
            ProjectStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// One video production unit. Owned by the backend; the client holds a
/// cached copy reconciled via polling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Project {
    pub id: ProjectId,
    pub title: String,
    pub status: ProjectStatus,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub created: String,
    #[serde(rename = "errorMessage", default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RenderProgress {
    pub status: ProjectStatus,
    pub progress: u32,
}

/// Render-job submission payload. Field names are the backend's wire
/// contract, which mixes camelCase and snake_case.
#[derive(Debug, Clone, Serialize)]
pub struct RenderRequest {
    #[serde(rename = "voiceId")]
    pub voice_id: u32,
    pub format: String,
    pub resolution: String,
    pub music_track: String,
    pub music_volume: f32,
    pub editing_style: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScriptRequest {
    pub title: String,
    pub topic: String,
    pub goal: String,
    pub target_audience: String,
    pub tone: String,
    pub target_duration: u32,
    pub use_trends: bool,
    #[serde(rename = "segmentTypes")]
    pub segment_types: Vec<String>,
}

/// One generated beat in a script response, matched to segments positionally
/// by the primary path and by type by the fallback path.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ScriptSegment {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: String,
    #[serde(rename = "visualPrompt", default)]
    pub visual_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScriptResponse {
    pub segments: Vec<ScriptSegment>,
}

#[derive(Debug, Deserialize)]
struct QueueResponse {
    #[serde(default)]
    queue: Vec<serde_json::Value>,
}

/// HTTP client for the studio backend.
pub struct StudioClient {
    base_url: String,
    client: reqwest::Client,
}

impl StudioClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let response = self
            .client
            .get(self.url("/api/videos"))
            .send()
            .await
            .context("fetch projects")?;
        into_json(response).await
    }

    pub async fn rename_project(&self, id: ProjectId, title: &str) -> Result<()> {
        let response = self
            .client
            .patch(self.url(&format!("/api/videos/{id}")))
            .json(&serde_json::json!({ "title": title }))
            .send()
            .await
            .context("rename project")?;
        check_ok(response).await
    }

    pub async fn render_queue(&self) -> Result<Vec<serde_json::Value>> {
        let response = self
            .client
            .get(self.url("/api/render/queue"))
            .send()
            .await
            .context("fetch render queue")?;
        let parsed: QueueResponse = into_json(response).await?;
        Ok(parsed.queue)
    }

    pub async fn clear_queue(&self) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/clear-queue"))
            .send()
            .await
            .context("clear render queue")?;
        check_ok(response).await
    }

    pub async fn render_progress(&self, id: ProjectId) -> Result<RenderProgress> {
        let response = self
            .client
            .get(self.url(&format!("/api/render/{id}/progress")))
            .send()
            .await
            .context("poll render progress")?;
        into_json(response).await
    }

    pub async fn submit_render(&self, id: ProjectId, request: &RenderRequest) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/render/{id}")))
            .json(request)
            .send()
            .await
            .context("submit render job")?;
        check_ok(response).await
    }

    /// Loads a project's saved timeline. A missing or empty segment list is
    /// `None`; callers fall back to the starter timeline.
    pub async fn load_timeline(&self, id: ProjectId) -> Result<Option<Timeline>> {
        let response = self
            .client
            .get(self.url(&format!("/api/timeline/{id}")))
            .send()
            .await
            .context("load timeline")?;
        let timeline: Timeline = into_json(response).await?;
        if timeline.is_empty() {
            debug!("project {id} has no saved timeline");
            Ok(None)
        } else {
            Ok(Some(timeline))
        }
    }

    pub async fn save_timeline(&self, id: ProjectId, timeline: &Timeline) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/timeline/{id}")))
            .json(timeline)
            .send()
            .await
            .context("save timeline")?;
        check_ok(response).await
    }

    pub async fn generate_script(
        &self,
        id: ProjectId,
        request: &ScriptRequest,
    ) -> Result<ScriptResponse> {
        let response = self
            .client
            .post(self.url(&format!("/api/generate-script/{id}")))
            .json(request)
            .send()
            .await
            .context("backend script generation")?;
        into_json(response).await
    }
}

/// Error responses carry a JSON `detail` field worth surfacing to the user.
async fn error_detail(response: reqwest::Response) -> String {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(String::from));
    match detail {
        Some(detail) => format!("{status}: {detail}"),
        None => format!("{status}"),
    }
}

async fn check_ok(response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        anyhow::bail!("backend error: {}", error_detail(response).await)
    }
}

async fn into_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        anyhow::bail!("backend error: {}", error_detail(response).await);
    }
    response.json().await.context("unexpected response shape")
}
