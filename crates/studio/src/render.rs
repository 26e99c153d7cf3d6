use backend::{Project, ProjectId, ProjectStatus, RenderRequest, StudioClient};
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::catalog::{DEFAULT_MUSIC_TRACK, DEFAULT_VOICE_ID};

pub const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Settings carried on a render submission.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    pub voice_id: u32,
    pub format: String,
    pub resolution: String,
    pub music_track: String,
    pub music_volume: f32,
    pub editing_style: String,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            voice_id: DEFAULT_VOICE_ID,
            format: "mp4".to_string(),
            resolution: "1080p".to_string(),
            music_track: DEFAULT_MUSIC_TRACK.to_string(),
            music_volume: 0.3,
            editing_style: "zoom".to_string(),
        }
    }
}

impl RenderOptions {
    pub fn to_request(&self) -> RenderRequest {
        RenderRequest {
            voice_id: self.voice_id,
            format: self.format.clone(),
            resolution: self.resolution.clone(),
            music_track: self.music_track.clone(),
            music_volume: self.music_volume,
            editing_style: self.editing_style.clone(),
        }
    }
}

/// Progress update observed by the poller. Tagged with the project id so
/// receivers can discard events for a project they switched away from.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderEvent {
    pub project_id: ProjectId,
    pub status: ProjectStatus,
    pub progress: u32,
}

/// Cancellable scheduled task that polls render progress for one project.
///
/// The task checks its cached status immediately before each fetch, so a
/// project that is not `rendering` is never polled, and the task exits on
/// its own once the status leaves `rendering`. Switching projects is the
/// owner's job: drop or [`stop`](Self::stop) the poller and spawn a new one.
pub struct ProgressPoller {
    project_id: ProjectId,
    handle: JoinHandle<()>,
}

impl ProgressPoller {
    pub fn spawn(
        client: Arc<StudioClient>,
        project: &Project,
        events: mpsc::UnboundedSender<RenderEvent>,
    ) -> Self {
        let project_id = project.id;
        let mut status = project.status;
        let mut progress = project.progress;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(POLL_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                if !status.is_rendering() {
                    debug!("project {project_id} is {status}, poller exiting");
                    break;
                }
                ticker.tick().await;
                match client.render_progress(project_id).await {
                    Ok(update) => {
                        if update.status != status || update.progress != progress {
                            status = update.status;
                            progress = update.progress;
                            let event = RenderEvent {
                                project_id,
                                status,
                                progress,
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        // Transient backend errors are logged and the next
                        // tick retries; the job itself is unaffected.
                        warn!("progress poll failed for project {project_id}: {err:#}");
                    }
                }
            }
        });
        Self { project_id, handle }
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    pub fn watches(&self, project_id: ProjectId) -> bool {
        self.project_id == project_id
    }

    /// Tears the task down immediately. Used when the watched project
    /// changes identity.
    pub fn stop(self) {
        self.handle.abort();
    }

    /// Waits for the task to exit on its own (terminal status observed).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}
