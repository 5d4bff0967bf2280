//! Confidence scoring and handoff decision
//!
//! Pure functions over the relevance scores that survived retrieval.
//! Recomputed per query; no state is carried between turns.

/// Confidence assigned when retrieval found nothing relevant
pub const NO_CONTEXT_CONFIDENCE: f32 = 0.3;

/// Score an answer's confidence from the surviving relevance scores.
///
/// The mean score is rescaled from the usable [0.5, 1.0] band onto [0, 1],
/// then a small bonus (0.02 per supporting chunk, capped at 0.1) rewards
/// corroboration across chunks. The result is clamped to [0, 1].
pub fn score_confidence(scores: &[f32]) -> f32 {
    if scores.is_empty() {
        return NO_CONTEXT_CONFIDENCE;
    }

    let mean = scores.iter().sum::<f32>() / scores.len() as f32;
    let rescaled = ((mean - 0.5) * 2.0).clamp(0.0, 1.0);
    let bonus = (0.02 * scores.len() as f32).min(0.1);

    (rescaled + bonus).clamp(0.0, 1.0)
}

/// Whether the answer should be handed off to a human
pub fn should_handoff(confidence: f32, threshold: f32) -> bool {
    confidence < threshold
}
