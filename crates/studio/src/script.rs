use anyhow::{Context, Result};
use backend::ScriptSegment;
use serde::Deserialize;
use timeline::{SegmentPatch, Timeline};

/// System prompt for the direct chat-completion fallback. Asks for a JSON
/// object with one record per segment type so results can be matched back by
/// type.
pub fn fallback_system_prompt(segment_types: &[String]) -> String {
    format!(
        "You are a professional video script writer. Create a script for a short-form video \
         with the following segments: {}. \
         For each segment, also provide a visual prompt that could be used to generate an image \
         for that segment. \
         Return your response as JSON in this format: \
         {{\"segments\": [{{\"type\": \"Intro\", \"text\": \"Script text for this segment...\", \
         \"visualPrompt\": \"Description of the visual for this segment...\"}}, ...]}}",
        segment_types.join(", ")
    )
}

pub fn fallback_user_prompt(project_title: &str, prompt_text: &str) -> String {
    format!(
        "Create a script for a video titled \"{project_title}\". \
         Use this prompt for guidance: {prompt_text}"
    )
}

#[derive(Debug, Deserialize)]
struct FallbackScript {
    segments: Vec<ScriptSegment>,
}

/// Parses the assistant content of the fallback path. An unparseable body is
/// a generation failure; the caller leaves the timeline untouched.
pub fn parse_fallback(content: &str) -> Result<Vec<ScriptSegment>> {
    let parsed: FallbackScript =
        serde_json::from_str(content.trim()).context("failed to parse script data from response")?;
    Ok(parsed.segments)
}

/// Primary-path merge: results line up with segments by index. Only
/// non-empty result fields overwrite; missing trailing results leave their
/// segments unchanged.
pub fn apply_positional(timeline: &mut Timeline, results: &[ScriptSegment]) {
    let updates: Vec<_> = timeline
        .segments()
        .iter()
        .zip(results)
        .map(|(segment, result)| (segment.id, patch_from(result)))
        .collect();
    for (id, patch) in updates {
        timeline.update(id, patch);
    }
}

/// Fallback-path merge: results are matched to segments by type (the model
/// is not trusted to preserve order). A segment whose type has no matching
/// result keeps its original text and visual prompt. Each result is consumed
/// at most once so repeated types fill in order.
pub fn apply_by_type(timeline: &mut Timeline, results: &[ScriptSegment]) {
    let mut taken = vec![false; results.len()];
    let updates: Vec<_> = timeline
        .segments()
        .iter()
        .filter_map(|segment| {
            let idx = results.iter().enumerate().position(|(i, result)| {
                !taken[i] && result.kind.eq_ignore_ascii_case(&segment.kind)
            })?;
            taken[idx] = true;
            Some((segment.id, patch_from(&results[idx])))
        })
        .collect();
    for (id, patch) in updates {
        timeline.update(id, patch);
    }
}

fn patch_from(result: &ScriptSegment) -> SegmentPatch {
    SegmentPatch {
        text: (!result.text.is_empty()).then(|| result.text.clone()),
        visual_prompt: (!result.visual_prompt.is_empty()).then(|| result.visual_prompt.clone()),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use timeline::Segment;

    fn timeline_of(kinds: &[&str]) -> Timeline {
        Timeline::new(kinds.iter().copied().map(Segment::new).collect())
    }

    fn result(kind: &str, text: &str, prompt: &str) -> ScriptSegment {
        ScriptSegment {
            kind: kind.to_string(),
            text: text.to_string(),
            visual_prompt: prompt.to_string(),
        }
    }

    #[test]
    fn positional_merge_respects_empty_fields() {
        let mut timeline = timeline_of(&["Intro", "Point"]);
        let first = timeline.segments()[0].id;
        timeline.update(
            first,
            SegmentPatch {
                visual_prompt: Some("keep me".into()),
                ..Default::default()
            },
        );

        apply_positional(
            &mut timeline,
            &[result("", "new intro text", ""), result("", "point text", "a chart")],
        );

        let segments = timeline.segments();
        assert_eq!(segments[0].text, "new intro text");
        assert_eq!(segments[0].visual_prompt, "keep me");
        assert_eq!(segments[1].text, "point text");
        assert_eq!(segments[1].visual_prompt, "a chart");
    }

    #[test]
    fn positional_merge_with_short_response() {
        let mut timeline = timeline_of(&["Intro", "Point", "Conclusion"]);
        apply_positional(&mut timeline, &[result("", "only the intro", "")]);
        assert_eq!(timeline.segments()[0].text, "only the intro");
        assert!(timeline.segments()[1].text.is_empty());
        assert!(timeline.segments()[2].text.is_empty());
    }

    #[test]
    fn by_type_merge_leaves_unmatched_segments_alone() {
        let mut timeline = timeline_of(&["Hook", "Point", "Conclusion"]);
        let hook = timeline.segments()[0].id;
        timeline.update(
            hook,
            SegmentPatch {
                text: Some("original hook".into()),
                ..Default::default()
            },
        );

        apply_by_type(
            &mut timeline,
            &[
                result("Point", "the point", "a diagram"),
                result("Conclusion", "wrap up", "a sunset"),
            ],
        );

        let segments = timeline.segments();
        assert_eq!(segments[0].text, "original hook");
        assert_eq!(segments[1].text, "the point");
        assert_eq!(segments[2].visual_prompt, "a sunset");
    }

    #[test]
    fn by_type_merge_consumes_duplicates_in_order() {
        let mut timeline = timeline_of(&["Point", "Point"]);
        apply_by_type(
            &mut timeline,
            &[result("Point", "first", ""), result("point", "second", "")],
        );
        assert_eq!(timeline.segments()[0].text, "first");
        assert_eq!(timeline.segments()[1].text, "second");
    }

    #[test]
    fn parse_fallback_rejects_non_json() {
        assert!(parse_fallback("Sure! Here is your script:").is_err());
    }

    #[test]
    fn parse_fallback_reads_segments() {
        let content = r#"{
            "segments": [
                {"type": "Intro", "text": "hi", "visualPrompt": "a wave"}
            ]
        }"#;
        let parsed = parse_fallback(content).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].kind, "Intro");
        assert_eq!(parsed[0].visual_prompt, "a wave");
    }

    #[test]
    fn fallback_prompt_lists_segment_types() {
        let prompt = fallback_system_prompt(&["Hook".into(), "Point".into()]);
        assert!(prompt.contains("Hook, Point"));
        assert!(prompt.contains("visualPrompt"));
    }
}
