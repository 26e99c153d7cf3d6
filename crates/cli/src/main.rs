use anyhow::{bail, Context, Result};
use backend::{ProjectId, StudioClient};
use clap::{Parser, Subcommand};
use credentials::CredentialStore;
use indicatif::{ProgressBar, ProgressStyle};
use studio::{music_tracks, voices, RenderOptions, Session, StudioError};
use timeline::{MediaType, SegmentId, SegmentPatch, Timeline};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "reelforge")]
#[command(about = "Reelforge CLI - AI-assisted short-form video production")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Studio backend base URL
    #[arg(long, global = true, default_value = backend::DEFAULT_BASE_URL)]
    api_url: String,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show or set stored API credentials
    Configure {
        /// OpenAI API key
        #[arg(long)]
        openai_key: Option<String>,

        /// FAL API key
        #[arg(long)]
        fal_key: Option<String>,

        /// Preferred image provider (openai, fal)
        #[arg(long)]
        provider: Option<String>,
    },

    /// List backend projects
    Projects,

    /// Rename a project
    Rename {
        /// Project id
        #[arg(short, long)]
        project: ProjectId,

        /// New title
        title: String,
    },

    /// Inspect and edit a project's timeline
    Timeline {
        #[command(subcommand)]
        command: TimelineCommands,
    },

    /// List templates or apply one to a project
    Template {
        #[command(subcommand)]
        command: TemplateCommands,
    },

    /// Generate script text for a project's segments
    Script {
        /// Project id
        #[arg(short, long)]
        project: ProjectId,

        /// Freehand prompt describing the video
        prompt: String,

        /// Apply a template first and seed the prompt from it
        #[arg(long)]
        template: Option<String>,
    },

    /// Generate slide images from visual prompts
    Slides {
        #[command(subcommand)]
        command: SlidesCommands,
    },

    /// Submit and track render jobs
    Render {
        #[command(subcommand)]
        command: RenderCommands,
    },
}

#[derive(Subcommand)]
enum TimelineCommands {
    /// Print the saved timeline (starter if nothing is saved)
    Show {
        #[arg(short, long)]
        project: ProjectId,
    },

    /// Reset to the starter timeline
    Init {
        #[arg(short, long)]
        project: ProjectId,
    },

    /// Add a segment
    Add {
        #[arg(short, long)]
        project: ProjectId,

        /// Narrative role (Hook, Intro, Point, Conclusion, ...)
        kind: String,

        /// Insert after this position (default: append)
        #[arg(long)]
        after: Option<usize>,
    },

    /// Remove a segment
    Remove {
        #[arg(short, long)]
        project: ProjectId,

        /// Segment position (0-based)
        index: usize,
    },

    /// Duplicate a segment in place
    Duplicate {
        #[arg(short, long)]
        project: ProjectId,

        /// Segment position (0-based)
        index: usize,
    },

    /// Edit fields of a segment
    Set {
        #[arg(short, long)]
        project: ProjectId,

        /// Segment position (0-based)
        index: usize,

        /// Narrative role
        #[arg(long)]
        kind: Option<String>,

        /// Script text
        #[arg(long)]
        text: Option<String>,

        /// Visual prompt for image generation
        #[arg(long)]
        prompt: Option<String>,

        /// Duration in seconds (clamped to 2-4)
        #[arg(long)]
        duration: Option<f64>,

        /// Media type (color, image, video)
        #[arg(long)]
        media: Option<String>,

        /// Background color (hex)
        #[arg(long)]
        background: Option<String>,

        /// Caption overlay on/off
        #[arg(long)]
        captions: Option<bool>,
    },
}

#[derive(Subcommand)]
enum TemplateCommands {
    /// List preset templates
    List,

    /// Replace a project's timeline with a template's structure
    Apply {
        #[arg(short, long)]
        project: ProjectId,

        /// Template id (e.g. problem-solution, how-to, listicle)
        template: String,
    },
}

#[derive(Subcommand)]
enum SlidesCommands {
    /// Generate the image for one segment
    One {
        #[arg(short, long)]
        project: ProjectId,

        /// Segment position (0-based)
        index: usize,
    },

    /// Generate all missing images concurrently
    All {
        #[arg(short, long)]
        project: ProjectId,
    },
}

#[derive(Subcommand)]
enum RenderCommands {
    /// Save the timeline and submit a render job
    Start {
        #[arg(short, long)]
        project: ProjectId,

        /// Voice id
        #[arg(long, default_value_t = studio::DEFAULT_VOICE_ID)]
        voice: u32,

        /// Output resolution
        #[arg(long, default_value = "1080p")]
        resolution: String,

        /// Background music track
        #[arg(long, default_value = studio::DEFAULT_MUSIC_TRACK)]
        music: String,

        /// Music volume (0.0-1.0)
        #[arg(long, default_value_t = 0.3)]
        music_volume: f32,

        /// Editing style
        #[arg(long, default_value = "zoom")]
        style: String,
    },

    /// Follow render progress until the job finishes
    Watch {
        #[arg(short, long)]
        project: ProjectId,
    },

    /// Show the backend render queue
    Queue,

    /// Clear the backend render queue
    ClearQueue,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Configure {
            openai_key,
            fal_key,
            provider,
        } => configure_command(openai_key, fal_key, provider),
        Commands::Projects => projects_command(&cli.api_url).await,
        Commands::Rename { project, title } => rename_command(&cli.api_url, project, &title).await,
        Commands::Timeline { command } => timeline_command(&cli.api_url, command).await,
        Commands::Template { command } => template_command(&cli.api_url, command).await,
        Commands::Script {
            project,
            prompt,
            template,
        } => script_command(&cli.api_url, project, &prompt, template.as_deref()).await,
        Commands::Slides { command } => slides_command(&cli.api_url, command).await,
        Commands::Render { command } => render_command(&cli.api_url, command).await,
    }
}

fn configure_command(
    openai_key: Option<String>,
    fal_key: Option<String>,
    provider: Option<String>,
) -> Result<()> {
    let store = CredentialStore::open_default()?;
    let mut credentials = store.load()?.unwrap_or_default();

    let editing = openai_key.is_some() || fal_key.is_some() || provider.is_some();
    if let Some(key) = openai_key {
        credentials.openai_key = key;
    }
    if let Some(key) = fal_key {
        credentials.fal_key = key;
    }
    if let Some(provider) = provider {
        credentials.preferred_provider = provider.parse()?;
    }
    if editing {
        store.save(&credentials)?;
        info!("credentials saved to {:?}", store.path());
    }

    println!("openai key:         {}", mask(&credentials.openai_key));
    println!("fal key:            {}", mask(&credentials.fal_key));
    println!("preferred provider: {}", credentials.preferred_provider);
    if !credentials.has_preferred_key() {
        warn!("the preferred provider has no key; image generation is disabled");
    }
    Ok(())
}

async fn projects_command(api_url: &str) -> Result<()> {
    let client = StudioClient::new(api_url);
    let projects = client.list_projects().await?;
    if projects.is_empty() {
        println!("No projects.");
        return Ok(());
    }
    for project in projects {
        let mut line = format!("{:>4}  {:<10}", project.id, project.status.to_string());
        if project.status.is_rendering() {
            line.push_str(&format!(" {:>3}%", project.progress));
        } else {
            line.push_str("     ");
        }
        line.push_str(&format!("  {}", project.title));
        if let Some(message) = &project.error_message {
            line.push_str(&format!("  ({message})"));
        }
        println!("{line}");
    }
    Ok(())
}

async fn rename_command(api_url: &str, project: ProjectId, title: &str) -> Result<()> {
    let mut session = open_session(api_url, project).await?;
    session.rename_project(title).await?;
    info!("project {project} renamed to '{title}'");
    Ok(())
}

async fn timeline_command(api_url: &str, command: TimelineCommands) -> Result<()> {
    match command {
        TimelineCommands::Show { project } => {
            let session = open_session(api_url, project).await?;
            print_timeline(session.timeline());
        }
        TimelineCommands::Init { project } => {
            let mut session = open_session(api_url, project).await?;
            *session.timeline_mut() = Timeline::starter();
            persist(&session).await?;
            print_timeline(session.timeline());
        }
        TimelineCommands::Add {
            project,
            kind,
            after,
        } => {
            let mut session = open_session(api_url, project).await?;
            let id = match after {
                Some(index) => session.timeline_mut().insert_after(kind, index),
                None => session.timeline_mut().push(kind),
            };
            info!("added segment {id}");
            persist(&session).await?;
            print_timeline(session.timeline());
        }
        TimelineCommands::Remove { project, index } => {
            let mut session = open_session(api_url, project).await?;
            let id = segment_at(session.timeline(), index)?;
            session.timeline_mut().delete(id)?;
            persist(&session).await?;
            print_timeline(session.timeline());
        }
        TimelineCommands::Duplicate { project, index } => {
            let mut session = open_session(api_url, project).await?;
            let id = segment_at(session.timeline(), index)?;
            let clone = session.timeline_mut().duplicate(id)?;
            info!("duplicated as {clone}");
            persist(&session).await?;
            print_timeline(session.timeline());
        }
        TimelineCommands::Set {
            project,
            index,
            kind,
            text,
            prompt,
            duration,
            media,
            background,
            captions,
        } => {
            let mut session = open_session(api_url, project).await?;
            let id = segment_at(session.timeline(), index)?;
            let patch = SegmentPatch {
                kind,
                text,
                visual_prompt: prompt,
                duration,
                media_type: media.as_deref().map(parse_media).transpose()?,
                background,
                captions,
            };
            session.timeline_mut().update(id, patch);
            persist(&session).await?;
            print_timeline(session.timeline());
        }
    }
    Ok(())
}

async fn template_command(api_url: &str, command: TemplateCommands) -> Result<()> {
    match command {
        TemplateCommands::List => {
            for template in timeline::preset_templates() {
                println!("{:<18} {}", template.id, template.name);
                println!("{:<18} {}", "", template.description);
                for slot in &template.structure {
                    println!("{:<18}   {:<12} {}", "", slot.kind, slot.purpose);
                }
            }
        }
        TemplateCommands::Apply { project, template } => {
            let mut session = open_session(api_url, project).await?;
            let seed = session.apply_template(&template)?;
            persist(&session).await?;
            print_timeline(session.timeline());
            println!("\nSeed prompt for script generation:\n  {seed}<your topic>");
        }
    }
    Ok(())
}

async fn script_command(
    api_url: &str,
    project: ProjectId,
    prompt: &str,
    template: Option<&str>,
) -> Result<()> {
    let mut session = open_session(api_url, project).await?;
    let prompt = match template {
        Some(template) => {
            let seed = session.apply_template(template)?;
            format!("{seed}{prompt}")
        }
        None => prompt.to_string(),
    };
    let source = session.generate_script(&prompt, template.is_some()).await?;
    info!("script generated via {source}");
    print_timeline(session.timeline());
    Ok(())
}

async fn slides_command(api_url: &str, command: SlidesCommands) -> Result<()> {
    match command {
        SlidesCommands::One { project, index } => {
            let mut session = open_session(api_url, project).await?;
            let id = segment_at(session.timeline(), index)?;
            let url = session.generate_slide(id).await?;
            println!("{url}");
        }
        SlidesCommands::All { project } => {
            let mut session = open_session(api_url, project).await?;
            let merged = session.generate_all_slides().await?;
            info!("{merged} image(s) generated");
            print_timeline(session.timeline());
        }
    }
    Ok(())
}

async fn render_command(api_url: &str, command: RenderCommands) -> Result<()> {
    match command {
        RenderCommands::Start {
            project,
            voice,
            resolution,
            music,
            music_volume,
            style,
        } => {
            if !voices().iter().any(|v| v.id == voice) {
                warn!("voice id {voice} is not in the catalog; submitting anyway");
            }
            if !music_tracks().contains(&music.as_str()) {
                warn!("music track '{music}' is not in the catalog; submitting anyway");
            }
            let mut session = open_session(api_url, project).await?;
            let options = RenderOptions {
                voice_id: voice,
                resolution,
                music_track: music,
                music_volume,
                editing_style: style,
                ..Default::default()
            };
            session.start_render(&options).await?;
            info!("render started for project {project}");
        }
        RenderCommands::Watch { project } => watch_render(api_url, project).await?,
        RenderCommands::Queue => {
            let client = StudioClient::new(api_url);
            let queue = client.render_queue().await?;
            if queue.is_empty() {
                println!("Render queue is empty.");
            } else {
                println!("{}", serde_json::to_string_pretty(&queue)?);
            }
        }
        RenderCommands::ClearQueue => {
            let client = StudioClient::new(api_url);
            client.clear_queue().await?;
            info!("render queue cleared");
        }
    }
    Ok(())
}

async fn watch_render(api_url: &str, project: ProjectId) -> Result<()> {
    let mut session = open_session(api_url, project).await?;
    let current = session.project().context("no project selected")?;
    if !current.status.is_rendering() {
        println!("Project {project} is {}; nothing to watch.", current.status);
        if let Some(message) = &current.error_message {
            println!("  {message}");
        }
        return Ok(());
    }

    let bar = ProgressBar::new(100);
    bar.set_style(ProgressStyle::with_template(
        "{bar:40.cyan/blue} {pos:>3}% {msg}",
    )?);
    bar.set_position(current.progress as u64);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let poller = session
        .spawn_progress_poller(tx)
        .context("no project selected")?;

    while let Some(event) = rx.recv().await {
        session.apply_render_event(&event);
        bar.set_position(event.progress as u64);
        bar.set_message(event.status.to_string());
        if !event.status.is_rendering() {
            break;
        }
    }
    poller.join().await;
    bar.finish();

    match session.project() {
        Some(p) => println!("Project {project} finished as {}.", p.status),
        None => println!("Project {project} finished."),
    }
    Ok(())
}

/// Opens a session against the backend with stored credentials loaded and
/// the given project selected.
async fn open_session(api_url: &str, project: ProjectId) -> Result<Session> {
    let mut session = Session::new(StudioClient::new(api_url));
    let store = CredentialStore::open_default()?;
    if !session.load_credentials(&store)? {
        warn!("no stored credentials; run `reelforge configure` to set API keys");
    }
    session.select_project_by_id(project).await?;
    Ok(session)
}

/// Saves timeline edits back to the backend. The save gate refuses a
/// timeline with no script text; that is reported but not fatal so structure
/// edits before script generation still work locally.
async fn persist(session: &Session) -> Result<()> {
    match session.save_timeline().await {
        Ok(()) => {
            info!("timeline saved");
            Ok(())
        }
        Err(StudioError::NothingWritten) => {
            warn!("timeline not saved: no segment has script text yet");
            Ok(())
        }
        Err(err) => Err(err.into()),
    }
}

fn segment_at(timeline: &Timeline, index: usize) -> Result<SegmentId> {
    match timeline.segments().get(index) {
        Some(segment) => Ok(segment.id),
        None => bail!(
            "segment index {index} out of range (timeline has {} segments)",
            timeline.len()
        ),
    }
}

fn parse_media(s: &str) -> Result<MediaType> {
    match s.to_ascii_lowercase().as_str() {
        "color" => Ok(MediaType::Color),
        "image" => Ok(MediaType::Image),
        "video" => Ok(MediaType::Video),
        other => bail!("unknown media type: {other} (expected color, image or video)"),
    }
}

fn print_timeline(timeline: &Timeline) {
    println!(
        "{} segment(s), {}s total",
        timeline.len(),
        timeline.total_duration()
    );
    for (index, segment) in timeline.segments().iter().enumerate() {
        let image = match timeline.slide_image(segment.id) {
            Some(_) => "[img]",
            None => "     ",
        };
        println!(
            "{index:>3}  {:<20} {}s {image}  {}",
            segment.kind,
            segment.duration,
            truncate(&segment.text, 60)
        );
        if !segment.visual_prompt.is_empty() {
            println!("     visual: {}", truncate(&segment.visual_prompt, 70));
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}

fn mask(key: &str) -> String {
    let chars: Vec<char> = key.trim().chars().collect();
    if chars.is_empty() {
        "(not set)".to_string()
    } else if chars.len() <= 8 {
        "********".to_string()
    } else {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}
