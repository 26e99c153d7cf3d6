use anyhow::anyhow;
use backend::{Project, ProjectId, ProjectStatus, ScriptRequest, StudioClient};
use credentials::{CredentialStore, Credentials, ProviderKind};
use log::{debug, warn};
use providers::{ChatClient, FalImages, ImageProvider, OpenAiImages};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use timeline::{preset_templates, SegmentId, Template, Timeline};
use tokio::sync::mpsc;

use crate::render::{ProgressPoller, RenderEvent, RenderOptions};
use crate::script::{
    apply_by_type, apply_positional, fallback_system_prompt, fallback_user_prompt, parse_fallback,
};
use crate::slides::{generate_batch, merge_outcomes, pending_requests};
use crate::StudioError;

/// Which path produced a generated script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Backend,
    ChatFallback,
}

impl fmt::Display for ScriptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ScriptSource::Backend => "backend",
            ScriptSource::ChatFallback => "chat fallback",
        };
        f.write_str(s)
    }
}

/// Working state for one editing sitting: the selected project, its timeline,
/// stored credentials, the template catalog, and the set of segments with an
/// image generation in flight.
///
/// All network traffic goes through here so precondition gates run before any
/// request is made.
pub struct Session {
    client: Arc<StudioClient>,
    credentials: Option<Credentials>,
    project: Option<Project>,
    timeline: Timeline,
    templates: Vec<Template>,
    generating: HashSet<SegmentId>,
    custom_prompts: u32,
}

impl Session {
    pub fn new(client: StudioClient) -> Self {
        Self {
            client: Arc::new(client),
            credentials: None,
            project: None,
            timeline: Timeline::starter(),
            templates: preset_templates(),
            generating: HashSet::new(),
            custom_prompts: 0,
        }
    }

    pub fn client(&self) -> Arc<StudioClient> {
        self.client.clone()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    pub fn set_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
    }

    /// Pulls stored credentials into the session. Returns whether any were
    /// found; an empty store is not an error, it just leaves the image and
    /// fallback paths gated.
    pub fn load_credentials(&mut self, store: &CredentialStore) -> Result<bool, StudioError> {
        self.credentials = store.load().map_err(StudioError::Other)?;
        Ok(self.credentials.is_some())
    }

    pub fn project(&self) -> Option<&Project> {
        self.project.as_ref()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn timeline_mut(&mut self) -> &mut Timeline {
        &mut self.timeline
    }

    pub fn templates(&self) -> &[Template] {
        &self.templates
    }

    pub fn is_generating(&self, id: SegmentId) -> bool {
        self.generating.contains(&id)
    }

    /// Switches the session to a project, loading its saved timeline. A
    /// project with nothing saved gets the starter timeline.
    pub async fn select_project(&mut self, project: Project) -> Result<(), StudioError> {
        let saved = self.client.load_timeline(project.id).await?;
        self.timeline = saved.unwrap_or_default();
        self.generating.clear();
        self.project = Some(project);
        Ok(())
    }

    pub async fn select_project_by_id(&mut self, id: ProjectId) -> Result<(), StudioError> {
        let projects = self.client.list_projects().await?;
        let project = projects
            .into_iter()
            .find(|p| p.id == id)
            .ok_or_else(|| StudioError::Other(anyhow!("no project with id {id}")))?;
        self.select_project(project).await
    }

    /// Builds the image provider matching the preferred credential, or the
    /// configuration gate error when its key is missing.
    pub fn image_provider(&self) -> Result<Box<dyn ImageProvider>, StudioError> {
        let credentials = self.credentials.clone().unwrap_or_default();
        let kind = credentials.preferred_provider;
        let key = credentials.key_for(kind).trim();
        if key.is_empty() {
            return Err(StudioError::NotConfigured(kind));
        }
        Ok(match kind {
            ProviderKind::OpenAi => Box::new(OpenAiImages::new(key)),
            ProviderKind::Fal => Box::new(FalImages::new(key)),
        })
    }

    fn openai_key(&self) -> Result<String, StudioError> {
        let key = self
            .credentials
            .as_ref()
            .map(|c| c.openai_key.trim())
            .unwrap_or_default();
        if key.is_empty() {
            return Err(StudioError::NotConfigured(ProviderKind::OpenAi));
        }
        Ok(key.to_string())
    }

    /// Generates one slide image. Gated on segment existence, a non-empty
    /// visual prompt, a configured provider key, and no generation already in
    /// flight for this segment. The merged result is re-checked against
    /// segment identity so a deletion during the request discards the URL.
    pub async fn generate_slide(&mut self, id: SegmentId) -> Result<String, StudioError> {
        let segment = self
            .timeline
            .get(id)
            .ok_or(StudioError::SegmentNotFound(id))?;
        let prompt = segment.visual_prompt.trim().to_string();
        if prompt.is_empty() {
            return Err(StudioError::MissingVisualPrompt(id));
        }
        if self.generating.contains(&id) {
            return Err(StudioError::SlideInFlight(id));
        }
        let provider = self.image_provider()?;

        self.generating.insert(id);
        let result = provider.generate_image(&prompt).await;
        self.generating.remove(&id);

        let url = result?;
        if !self.timeline.set_slide_image(id, url.clone()) {
            warn!("segment {id} was removed while its image generated, discarding");
            return Err(StudioError::SegmentNotFound(id));
        }
        self.persist_timeline().await;
        Ok(url)
    }

    /// Generates images for every segment that has a visual prompt and no
    /// image yet, all concurrently. Failures are logged per segment; the
    /// return value is how many images were merged. The timeline is saved
    /// once after the whole batch.
    pub async fn generate_all_slides(&mut self) -> Result<usize, StudioError> {
        let mut requests = pending_requests(&self.timeline);
        requests.retain(|r| !self.generating.contains(&r.segment_id));
        if requests.is_empty() {
            return Ok(0);
        }
        let provider = self.image_provider()?;

        for request in &requests {
            self.generating.insert(request.segment_id);
        }
        let outcomes = generate_batch(provider.as_ref(), requests).await;
        for outcome in &outcomes {
            self.generating.remove(&outcome.segment_id);
        }

        let merged = merge_outcomes(&mut self.timeline, &outcomes);
        if merged > 0 {
            self.persist_timeline().await;
        }
        Ok(merged)
    }

    /// Writes a script into the timeline from a prompt. Tries the backend
    /// generator first (results merged positionally); when that fails, falls
    /// back to a direct chat completion whose results are matched back by
    /// segment type. A freehand prompt is kept as a saved template; a prompt
    /// seeded from a template (`from_template`) is not re-saved.
    pub async fn generate_script(
        &mut self,
        prompt_text: &str,
        from_template: bool,
    ) -> Result<ScriptSource, StudioError> {
        let prompt_text = prompt_text.trim();
        if prompt_text.is_empty() {
            return Err(StudioError::EmptyPrompt);
        }
        let project = self.project.clone().ok_or(StudioError::NoProject)?;
        let key = self.openai_key()?;

        let segment_types: Vec<String> = self
            .timeline
            .segments()
            .iter()
            .map(|s| s.kind.clone())
            .collect();
        let request = ScriptRequest {
            title: project.title.clone(),
            topic: prompt_text.to_string(),
            goal: "Inform and engage the audience".to_string(),
            target_audience: "Tech enthusiasts".to_string(),
            tone: "informative".to_string(),
            target_duration: self.timeline.total_duration(),
            use_trends: false,
            segment_types: segment_types.clone(),
        };

        let source = match self.client.generate_script(project.id, &request).await {
            Ok(response) => {
                apply_positional(&mut self.timeline, &response.segments);
                ScriptSource::Backend
            }
            Err(err) => {
                warn!("backend script generation failed, trying chat completion: {err:#}");
                let content = ChatClient::new(key)
                    .complete(
                        &fallback_system_prompt(&segment_types),
                        &fallback_user_prompt(&project.title, prompt_text),
                    )
                    .await?;
                let segments = parse_fallback(&content)?;
                apply_by_type(&mut self.timeline, &segments);
                ScriptSource::ChatFallback
            }
        };

        self.remember_prompt(prompt_text, from_template);
        self.persist_timeline().await;
        Ok(source)
    }

    /// Keeps a freehand prompt in the template list for reuse. Prompts that
    /// already came from a template are not saved again.
    fn remember_prompt(&mut self, prompt_text: &str, from_template: bool) {
        if from_template {
            return;
        }
        self.custom_prompts += 1;
        let name = format!("Custom {}", self.custom_prompts);
        self.templates.push(Template::from_prompt(name, prompt_text));
    }

    /// Saves the timeline to the backend. Refused until at least one segment
    /// has script text, so an untouched starter timeline is never persisted.
    pub async fn save_timeline(&self) -> Result<(), StudioError> {
        let project = self.project.as_ref().ok_or(StudioError::NoProject)?;
        if !self.timeline.has_script_text() {
            return Err(StudioError::NothingWritten);
        }
        self.client.save_timeline(project.id, &self.timeline).await?;
        Ok(())
    }

    /// Saves the timeline and submits the render job, then marks the cached
    /// project as `rendering` at zero progress so polling starts from a
    /// consistent state.
    pub async fn start_render(&mut self, options: &RenderOptions) -> Result<(), StudioError> {
        self.save_timeline().await?;
        let project = self.project.as_mut().ok_or(StudioError::NoProject)?;
        self.client
            .submit_render(project.id, &options.to_request())
            .await?;
        project.status = ProjectStatus::Rendering;
        project.progress = 0;
        Ok(())
    }

    /// Spawns a progress poller for the selected project. `None` when no
    /// project is selected.
    pub fn spawn_progress_poller(
        &self,
        events: mpsc::UnboundedSender<RenderEvent>,
    ) -> Option<ProgressPoller> {
        self.project
            .as_ref()
            .map(|p| ProgressPoller::spawn(self.client.clone(), p, events))
    }

    /// Folds a poller event back into the cached project. Events for a
    /// project the session has switched away from are ignored.
    pub fn apply_render_event(&mut self, event: &RenderEvent) -> bool {
        match &mut self.project {
            Some(project) if project.id == event.project_id => {
                project.status = event.status;
                project.progress = event.progress;
                true
            }
            _ => false,
        }
    }

    /// Replaces the timeline with a template's structure and returns the seed
    /// prompt text for the script generator.
    pub fn apply_template(&mut self, template_id: &str) -> Result<String, StudioError> {
        let template = self
            .templates
            .iter()
            .find(|t| t.id == template_id)
            .ok_or_else(|| StudioError::Other(anyhow!("unknown template: {template_id}")))?;
        let title = self
            .project
            .as_ref()
            .map(|p| p.title.as_str())
            .unwrap_or("Untitled");
        let (timeline, seed) = template.apply(title)?;
        self.timeline = timeline;
        self.generating.clear();
        Ok(seed)
    }

    pub async fn rename_project(&mut self, title: &str) -> Result<(), StudioError> {
        let project = self.project.as_mut().ok_or(StudioError::NoProject)?;
        self.client.rename_project(project.id, title).await?;
        project.title = title.to_string();
        Ok(())
    }

    async fn persist_timeline(&self) {
        let Some(project) = &self.project else {
            return;
        };
        // Same gate as the explicit save: a textless timeline must never
        // reach the backend, not even from a background save.
        if !self.timeline.has_script_text() {
            debug!(
                "skipping background save for project {}: no segment has script text",
                project.id
            );
            return;
        }
        if let Err(err) = self.client.save_timeline(project.id, &self.timeline).await {
            warn!("failed to persist timeline for project {}: {err:#}", project.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::SegmentPatch;

    fn session() -> Session {
        Session::new(StudioClient::new("http://192.0.2.1:1"))
    }

    fn session_with_project() -> Session {
        let mut session = session();
        session.project = Some(Project {
            id: 3,
            title: "Rust in 60 Seconds".to_string(),
            status: ProjectStatus::Draft,
            progress: 0,
            duration: String::new(),
            created: String::new(),
            error_message: None,
        });
        session
    }

    #[tokio::test]
    async fn generate_slide_gates_run_before_any_request() {
        let mut session = session();

        let missing = SegmentId::new();
        assert!(matches!(
            session.generate_slide(missing).await,
            Err(StudioError::SegmentNotFound(id)) if id == missing
        ));

        let promptless = session.timeline().segments()[0].id;
        assert!(matches!(
            session.generate_slide(promptless).await,
            Err(StudioError::MissingVisualPrompt(_))
        ));

        session.timeline_mut().update(
            promptless,
            SegmentPatch {
                visual_prompt: Some("a crab on a beach".into()),
                ..Default::default()
            },
        );
        assert!(matches!(
            session.generate_slide(promptless).await,
            Err(StudioError::NotConfigured(ProviderKind::OpenAi))
        ));
    }

    #[tokio::test]
    async fn generate_all_is_a_no_op_with_nothing_pending() {
        // No prompts anywhere, so this returns before the provider gate.
        let mut session = session();
        assert_eq!(session.generate_all_slides().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn script_gates_in_order() {
        let mut session = session();
        assert!(matches!(
            session.generate_script("  ", false).await,
            Err(StudioError::EmptyPrompt)
        ));
        assert!(matches!(
            session.generate_script("explain lifetimes", false).await,
            Err(StudioError::NoProject)
        ));

        let mut session = session_with_project();
        session.set_credentials(Credentials {
            fal_key: "key-abc".to_string(),
            preferred_provider: ProviderKind::Fal,
            ..Default::default()
        });
        // Fallback needs the OpenAI key specifically.
        assert!(matches!(
            session.generate_script("explain lifetimes", false).await,
            Err(StudioError::NotConfigured(ProviderKind::OpenAi))
        ));
    }

    #[test]
    fn only_freehand_prompts_are_saved_as_templates() {
        let mut session = session_with_project();
        let presets = session.templates().len();

        session.remember_prompt("explain lifetimes simply", false);
        assert_eq!(session.templates().len(), presets + 1);
        let saved = session.templates().last().unwrap();
        assert_eq!(saved.name, "Custom 1");
        assert_eq!(saved.prompt.as_deref(), Some("explain lifetimes simply"));

        // A prompt seeded from a template must not grow the list again.
        session.remember_prompt("Create a How-To Tutorial video about X", true);
        assert_eq!(session.templates().len(), presets + 1);

        session.remember_prompt("another freehand idea", false);
        assert_eq!(session.templates().last().unwrap().name, "Custom 2");
    }

    #[tokio::test]
    async fn background_save_skips_textless_timeline() {
        // The base URL is unroutable; if the save were attempted the call
        // would hang on connect instead of returning immediately.
        let mut session = session_with_project();
        let id = session.timeline().segments()[0].id;
        session.timeline_mut().update(
            id,
            SegmentPatch {
                visual_prompt: Some("a crab on a beach".into()),
                ..Default::default()
            },
        );

        tokio::time::timeout(std::time::Duration::from_millis(200), session.persist_timeline())
            .await
            .expect("textless timeline should never be posted");
    }

    #[tokio::test]
    async fn save_requires_project_and_script_text() {
        let session = session();
        assert!(matches!(
            session.save_timeline().await,
            Err(StudioError::NoProject)
        ));

        let session = session_with_project();
        assert!(matches!(
            session.save_timeline().await,
            Err(StudioError::NothingWritten)
        ));
    }

    #[tokio::test]
    async fn render_refuses_unwritten_timeline() {
        let mut session = session_with_project();
        assert!(matches!(
            session.start_render(&RenderOptions::default()).await,
            Err(StudioError::NothingWritten)
        ));
    }

    #[test]
    fn provider_gate_follows_preference() {
        let mut session = session();
        assert!(matches!(
            session.image_provider(),
            Err(StudioError::NotConfigured(ProviderKind::OpenAi))
        ));

        session.set_credentials(Credentials {
            openai_key: "sk-test".to_string(),
            preferred_provider: ProviderKind::Fal,
            ..Default::default()
        });
        assert!(matches!(
            session.image_provider(),
            Err(StudioError::NotConfigured(ProviderKind::Fal))
        ));

        session.set_credentials(Credentials {
            fal_key: "key-abc".to_string(),
            preferred_provider: ProviderKind::Fal,
            ..Default::default()
        });
        assert_eq!(session.image_provider().unwrap().name(), "fal");
    }

    #[test]
    fn apply_template_swaps_timeline_and_returns_seed() {
        let mut session = session_with_project();
        let seed = session.apply_template("how-to").unwrap();
        assert!(seed.contains("How-To Tutorial"));
        assert!(seed.contains("Rust in 60 Seconds"));
        assert_eq!(session.timeline().len(), 5);
        assert!(session.timeline().slide_images().is_empty());

        assert!(session.apply_template("does-not-exist").is_err());
    }

    #[test]
    fn render_events_only_touch_the_matching_project() {
        let mut session = session_with_project();
        let applied = session.apply_render_event(&RenderEvent {
            project_id: 3,
            status: ProjectStatus::Rendering,
            progress: 40,
        });
        assert!(applied);
        assert_eq!(session.project().unwrap().progress, 40);

        let stale = session.apply_render_event(&RenderEvent {
            project_id: 99,
            status: ProjectStatus::Ready,
            progress: 100,
        });
        assert!(!stale);
        assert!(session.project().unwrap().status.is_rendering());
    }
}
