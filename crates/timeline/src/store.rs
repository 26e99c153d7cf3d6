use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{clamp_duration, Segment, SegmentId, SegmentPatch, TimelineError};

/// The ordered segment sequence for one video project, together with the
/// per-segment generated slide images and the "open for editing" marker.
///
/// Invariants: the sequence is never empty, segment ids are unique, and the
/// slide map only holds keys for live segments. All mutation goes through the
/// methods here; order changes only via explicit insert/delete/duplicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Timeline {
    #[serde(default)]
    segments: Vec<Segment>,
    #[serde(rename = "slideImages", default)]
    slide_images: HashMap<SegmentId, String>,
    #[serde(skip)]
    editing: Option<SegmentId>,
}

impl Timeline {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments,
            slide_images: HashMap::new(),
            editing: None,
        }
    }

    /// Default timeline for a project with nothing saved yet.
    pub fn starter() -> Self {
        Self::new(vec![
            Segment::new("Intro"),
            Segment::new("Point"),
            Segment::new("Point"),
            Segment::new("Conclusion"),
        ])
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.iter().find(|s| s.id == id)
    }

    pub fn index_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id == id)
    }

    pub fn total_duration(&self) -> u32 {
        self.segments.iter().map(|s| s.duration).sum()
    }

    pub fn has_script_text(&self) -> bool {
        self.segments.iter().any(|s| !s.text.trim().is_empty())
    }

    /// Inserts a fresh segment immediately after `after_index` (appends when
    /// the index points at the last segment or beyond) and marks it as the
    /// segment open for editing.
    pub fn insert_after(&mut self, kind: impl Into<String>, after_index: usize) -> SegmentId {
        let segment = Segment::new(kind);
        let id = segment.id;
        let idx = (after_index + 1).min(self.segments.len());
        self.segments.insert(idx, segment);
        self.editing = Some(id);
        id
    }

    /// Appends a fresh segment at the end of the sequence.
    pub fn push(&mut self, kind: impl Into<String>) -> SegmentId {
        let after = self.segments.len().saturating_sub(1);
        self.insert_after(kind, after)
    }

    /// Removes a segment and its slide image. Refused when it would leave the
    /// timeline empty; the timeline is unchanged on error.
    pub fn delete(&mut self, id: SegmentId) -> Result<(), TimelineError> {
        if self.segments.len() <= 1 {
            return Err(TimelineError::LastSegment);
        }
        let idx = self
            .index_of(id)
            .ok_or(TimelineError::SegmentNotFound(id))?;
        self.segments.remove(idx);
        self.slide_images.remove(&id);
        if self.editing == Some(id) {
            self.editing = None;
        }
        Ok(())
    }

    /// Clones a segment under a new id, inserts the clone right after its
    /// source, and marks the clone as open for editing. The clone does not
    /// inherit the source's slide image.
    pub fn duplicate(&mut self, id: SegmentId) -> Result<SegmentId, TimelineError> {
        let idx = self
            .index_of(id)
            .ok_or(TimelineError::SegmentNotFound(id))?;
        let mut clone = self.segments[idx].clone();
        clone.id = SegmentId::new();
        let clone_id = clone.id;
        self.segments.insert(idx + 1, clone);
        self.editing = Some(clone_id);
        Ok(clone_id)
    }

    /// Merges patch fields into the segment with the given id. Unknown ids
    /// are a no-op. Duration writes are clamped into the accepted range.
    pub fn update(&mut self, id: SegmentId, patch: SegmentPatch) {
        let Some(segment) = self.segments.iter_mut().find(|s| s.id == id) else {
            return;
        };
        if let Some(kind) = patch.kind {
            segment.kind = kind;
        }
        if let Some(text) = patch.text {
            segment.text = text;
        }
        if let Some(prompt) = patch.visual_prompt {
            segment.visual_prompt = prompt;
        }
        if let Some(duration) = patch.duration {
            segment.duration = clamp_duration(duration);
        }
        if let Some(media_type) = patch.media_type {
            segment.media_type = media_type;
        }
        if let Some(background) = patch.background {
            segment.background = background;
        }
        if let Some(captions) = patch.captions {
            segment.captions = captions;
        }
    }

    /// Toggles the "open for editing" marker: selecting the segment already
    /// open closes it.
    pub fn toggle_editing(&mut self, id: SegmentId) {
        if self.editing == Some(id) {
            self.editing = None;
        } else if self.get(id).is_some() {
            self.editing = Some(id);
        }
    }

    pub fn editing(&self) -> Option<SegmentId> {
        self.editing
    }

    pub fn slide_image(&self, id: SegmentId) -> Option<&str> {
        self.slide_images.get(&id).map(String::as_str)
    }

    pub fn slide_images(&self) -> &HashMap<SegmentId, String> {
        &self.slide_images
    }

    /// Merge-by-key write of one generated image URL. Entries for other
    /// segments are untouched; writes for ids no longer in the timeline are
    /// dropped (the async result went stale).
    pub fn set_slide_image(&mut self, id: SegmentId, url: String) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.slide_images.insert(id, url);
        true
    }

}

impl Default for Timeline {
    fn default() -> Self {
        Self::starter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MediaType;
    use std::collections::HashSet;

    fn timeline_of(kinds: &[&str]) -> Timeline {
        Timeline::new(kinds.iter().copied().map(Segment::new).collect())
    }

    #[test]
    fn starter_has_four_segments() {
        let timeline = Timeline::starter();
        let kinds: Vec<_> = timeline.segments().iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(kinds, ["Intro", "Point", "Point", "Conclusion"]);
    }

    #[test]
    fn delete_refuses_last_segment() {
        let mut timeline = timeline_of(&["Hook"]);
        let id = timeline.segments()[0].id;
        let before = timeline.clone();
        assert!(matches!(
            timeline.delete(id),
            Err(TimelineError::LastSegment)
        ));
        assert_eq!(timeline, before);
    }

    #[test]
    fn delete_removes_slide_image_and_editing_marker() {
        let mut timeline = timeline_of(&["Hook", "Point"]);
        let id = timeline.segments()[0].id;
        let other = timeline.segments()[1].id;
        timeline.set_slide_image(id, "https://img/a.png".into());
        timeline.set_slide_image(other, "https://img/b.png".into());
        timeline.toggle_editing(id);

        timeline.delete(id).unwrap();

        assert_eq!(timeline.len(), 1);
        assert!(timeline.slide_image(id).is_none());
        assert_eq!(timeline.slide_image(other), Some("https://img/b.png"));
        assert_eq!(timeline.editing(), None);
    }

    #[test]
    fn insert_after_places_and_marks_editing() {
        let mut timeline = timeline_of(&["Intro", "Conclusion"]);
        let id = timeline.insert_after("Point", 0);
        assert_eq!(timeline.index_of(id), Some(1));
        assert_eq!(timeline.editing(), Some(id));

        // Appending via the last index.
        let tail = timeline.insert_after("Point", timeline.len() - 1);
        assert_eq!(timeline.index_of(tail), Some(timeline.len() - 1));
    }

    #[test]
    fn duplicate_is_adjacent_with_fresh_id() {
        let mut timeline = timeline_of(&["Intro", "Point", "Conclusion"]);
        let source = timeline.segments()[1].id;
        timeline.update(
            source,
            SegmentPatch {
                text: Some("hello".into()),
                duration: Some(4.0),
                ..Default::default()
            },
        );

        let clone = timeline.duplicate(source).unwrap();
        assert_eq!(timeline.index_of(clone), Some(2));
        assert_ne!(clone, source);

        let src = timeline.get(source).unwrap();
        let dup = timeline.get(clone).unwrap();
        assert_eq!(src.text, dup.text);
        assert_eq!(src.duration, dup.duration);
        assert_eq!(src.kind, dup.kind);
        assert_eq!(timeline.editing(), Some(clone));
    }

    #[test]
    fn ids_stay_unique_under_op_sequences() {
        let mut timeline = timeline_of(&["Intro", "Point"]);
        let first = timeline.segments()[0].id;
        timeline.insert_after("Point", 0);
        let cloned = timeline.duplicate(first).unwrap();
        timeline.delete(cloned).unwrap();
        timeline.push("Conclusion");
        timeline.duplicate(timeline.segments()[2].id).unwrap();

        let ids: HashSet<_> = timeline.segments().iter().map(|s| s.id).collect();
        assert_eq!(ids.len(), timeline.len());
    }

    #[test]
    fn update_clamps_duration_and_ignores_unknown_id() {
        let mut timeline = timeline_of(&["Hook"]);
        let id = timeline.segments()[0].id;

        timeline.update(
            id,
            SegmentPatch {
                duration: Some(10.0),
                ..Default::default()
            },
        );
        assert_eq!(timeline.get(id).unwrap().duration, 4);

        timeline.update(
            id,
            SegmentPatch {
                duration: Some(-1.0),
                ..Default::default()
            },
        );
        assert_eq!(timeline.get(id).unwrap().duration, 2);

        timeline.update(
            id,
            SegmentPatch {
                duration: Some(f64::NAN),
                ..Default::default()
            },
        );
        assert_eq!(timeline.get(id).unwrap().duration, 3);

        let before = timeline.clone();
        timeline.update(
            SegmentId::new(),
            SegmentPatch {
                text: Some("stray".into()),
                ..Default::default()
            },
        );
        assert_eq!(timeline, before);
    }

    #[test]
    fn update_merges_partial_fields() {
        let mut timeline = timeline_of(&["Point"]);
        let id = timeline.segments()[0].id;
        timeline.update(
            id,
            SegmentPatch {
                media_type: Some(MediaType::Image),
                captions: Some(true),
                ..Default::default()
            },
        );
        let segment = timeline.get(id).unwrap();
        assert_eq!(segment.media_type, MediaType::Image);
        assert!(segment.captions);
        assert_eq!(segment.kind, "Point");
    }

    #[test]
    fn toggle_editing_closes_on_second_select() {
        let mut timeline = timeline_of(&["Hook", "Point"]);
        let id = timeline.segments()[0].id;
        timeline.toggle_editing(id);
        assert_eq!(timeline.editing(), Some(id));
        timeline.toggle_editing(id);
        assert_eq!(timeline.editing(), None);
    }

    #[test]
    fn stale_slide_write_is_dropped() {
        let mut timeline = timeline_of(&["Hook", "Point"]);
        assert!(!timeline.set_slide_image(SegmentId::new(), "https://img/x.png".into()));
        assert!(timeline.slide_images().is_empty());
    }

    #[test]
    fn payload_round_trips() {
        let mut timeline = timeline_of(&["Intro", "Point", "Conclusion"]);
        let id = timeline.segments()[1].id;
        timeline.update(
            id,
            SegmentPatch {
                text: Some("the middle beat".into()),
                visual_prompt: Some("a sunrise over a city".into()),
                ..Default::default()
            },
        );
        timeline.set_slide_image(id, "https://img/mid.png".into());

        let json = serde_json::to_string(&timeline).unwrap();
        let restored: Timeline = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.segments(), timeline.segments());
        assert_eq!(restored.slide_images(), timeline.slide_images());
    }
}
