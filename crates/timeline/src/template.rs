use serde::{Deserialize, Serialize};

use crate::{Segment, Timeline, TimelineError};

/// One entry of a template's segment structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TemplateSlot {
    #[serde(rename = "type")]
    pub kind: String,
    pub purpose: String,
}

impl TemplateSlot {
    pub fn new(kind: impl Into<String>, purpose: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            purpose: purpose.into(),
        }
    }
}

/// A reusable blueprint for a timeline: the segment structure plus the
/// per-segment defaults seeded on application.
///
/// Freehand prompts saved for reuse are also stored as templates; those carry
/// a `prompt` and an empty `structure`, can seed script generation, but
/// cannot be applied to build a timeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Template {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub structure: Vec<TemplateSlot>,
    #[serde(default = "default_slide_duration")]
    pub slide_duration: u32,
    #[serde(default = "default_max_words")]
    pub max_words_per_segment: u32,
    #[serde(default)]
    pub captions: bool,
    #[serde(default = "default_aspect_ratio")]
    pub aspect_ratio: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

fn default_slide_duration() -> u32 {
    3
}

fn default_max_words() -> u32 {
    8
}

fn default_aspect_ratio() -> String {
    "9:16".to_string()
}

impl Template {
    /// Wraps a freehand prompt as a saved, structureless template.
    pub fn from_prompt(name: impl Into<String>, text: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: name.to_lowercase().replace(' ', "-"),
            name,
            description: String::new(),
            structure: Vec::new(),
            slide_duration: default_slide_duration(),
            max_words_per_segment: default_max_words(),
            captions: false,
            aspect_ratio: default_aspect_ratio(),
            prompt: Some(text.into()),
        }
    }

    /// Expands the structure into a brand-new timeline: one fresh segment per
    /// slot, each seeded with the template's duration/captions/aspect-ratio
    /// defaults and empty text/visual prompt.
    pub fn apply(&self, project_title: &str) -> Result<(Timeline, String), TimelineError> {
        if self.structure.is_empty() {
            return Err(TimelineError::EmptyTemplate(self.name.clone()));
        }
        let segments = self
            .structure
            .iter()
            .map(|slot| {
                let mut segment = Segment::new(slot.kind.clone());
                segment.duration = self.slide_duration;
                segment.captions = self.captions;
                segment.max_words_per_segment = Some(self.max_words_per_segment);
                segment.aspect_ratio = Some(self.aspect_ratio.clone());
                segment
            })
            .collect();
        let seed = format!(
            "Create a {} video about {}. Use this prompt for guidance: ",
            self.name, project_title
        );
        Ok((Timeline::new(segments), seed))
    }
}

/// Built-in templates, mirrored from the studio backend's presets.
pub fn preset_templates() -> Vec<Template> {
    vec![
        Template {
            id: "problem-solution".to_string(),
            name: "Problem-Solution".to_string(),
            description: "Introduces a problem and presents your product/service as the solution"
                .to_string(),
            structure: vec![
                TemplateSlot::new("Intro", "Introduce the problem that many face"),
                TemplateSlot::new("Point", "Explain why the problem persists"),
                TemplateSlot::new("Point", "Introduce your solution"),
                TemplateSlot::new("Point", "Show benefits and results"),
                TemplateSlot::new("Conclusion", "Call to action"),
            ],
            slide_duration: 3,
            max_words_per_segment: 8,
            captions: false,
            aspect_ratio: "9:16".to_string(),
            prompt: None,
        },
        Template {
            id: "how-to".to_string(),
            name: "How-To Tutorial".to_string(),
            description: "Step-by-step instructions to accomplish a specific task".to_string(),
            structure: vec![
                TemplateSlot::new("Intro", "Introduce what viewers will learn"),
                TemplateSlot::new("Point", "Step 1 with details"),
                TemplateSlot::new("Point", "Step 2 with details"),
                TemplateSlot::new("Point", "Step 3 with details"),
                TemplateSlot::new("Conclusion", "Recap and benefits"),
            ],
            slide_duration: 3,
            max_words_per_segment: 8,
            captions: false,
            aspect_ratio: "9:16".to_string(),
            prompt: None,
        },
        Template {
            id: "listicle".to_string(),
            name: "Listicle (Top 5)".to_string(),
            description: "Presents a list of tips, ideas, or products".to_string(),
            structure: vec![
                TemplateSlot::new("Intro", "Introduce the topic and why it matters"),
                TemplateSlot::new("Point", "Item #1 with explanation"),
                TemplateSlot::new("Point", "Item #2 with explanation"),
                TemplateSlot::new("Point", "Item #3 with explanation"),
                TemplateSlot::new("Point", "Item #4 with explanation"),
                TemplateSlot::new("Point", "Item #5 with explanation"),
                TemplateSlot::new("Conclusion", "Summarize and call to action"),
            ],
            slide_duration: 3,
            max_words_per_segment: 8,
            captions: false,
            aspect_ratio: "9:16".to_string(),
            prompt: None,
        },
    ]
}
