use anyhow::Result;
use futures::future::join_all;
use log::warn;
use providers::ImageProvider;
use timeline::{SegmentId, Timeline};

/// One pending image generation: a segment id and the prompt captured at
/// fan-out time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlideRequest {
    pub segment_id: SegmentId,
    pub prompt: String,
}

#[derive(Debug)]
pub struct SlideOutcome {
    pub segment_id: SegmentId,
    pub result: Result<String>,
}

/// Segments eligible for "generate all": those with a visual prompt and no
/// image yet.
pub fn pending_requests(timeline: &Timeline) -> Vec<SlideRequest> {
    timeline
        .segments()
        .iter()
        .filter(|s| !s.visual_prompt.trim().is_empty() && timeline.slide_image(s.id).is_none())
        .map(|s| SlideRequest {
            segment_id: s.id,
            prompt: s.visual_prompt.clone(),
        })
        .collect()
}

/// Fans out one provider call per request, all concurrently. Completions are
/// independent: one failure never blocks or taints the others, and no
/// ordering is guaranteed between them.
pub async fn generate_batch(
    provider: &dyn ImageProvider,
    requests: Vec<SlideRequest>,
) -> Vec<SlideOutcome> {
    let tasks = requests.into_iter().map(|request| async move {
        let result = provider.generate_image(&request.prompt).await;
        SlideOutcome {
            segment_id: request.segment_id,
            result,
        }
    });
    join_all(tasks).await
}

/// Applies batch outcomes to the timeline with merge-by-key semantics,
/// re-checking segment identity so results for since-deleted segments are
/// dropped. Returns how many images were merged.
pub fn merge_outcomes(timeline: &mut Timeline, outcomes: &[SlideOutcome]) -> usize {
    let mut merged = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(url) => {
                if timeline.set_slide_image(outcome.segment_id, url.clone()) {
                    merged += 1;
                } else {
                    warn!(
                        "discarding stale image result for removed segment {}",
                        outcome.segment_id
                    );
                }
            }
            Err(err) => {
                warn!("slide generation failed for {}: {err:#}", outcome.segment_id);
            }
        }
    }
    merged
}
