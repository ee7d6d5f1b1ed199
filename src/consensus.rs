use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::candidate::{CandidateResult, normalize_key};
use crate::scoring;

/// Candidates whose texts agree up to whitespace and case, merged.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusGroup {
    /// Representative text: the highest-confidence member's spelling.
    pub text: String,
    pub confidence: f32,
    pub agreement_count: usize,
    pub explanation: String,
    pub members: Vec<CandidateResult>,
}

/// Final pipeline output: the winning group plus the full ranking for
/// callers that want to show alternatives.
#[derive(Debug, Clone, Serialize)]
pub struct ConsensusResult {
    pub final_text: String,
    pub final_confidence: f32,
    pub agreement_count: usize,
    pub groups: Vec<ConsensusGroup>,
}

/// Groups candidates by normalized text and ranks the groups.
///
/// Pure and deterministic: the same multiset of candidates yields the
/// same result regardless of arrival order. Returns `None` when there is
/// nothing to aggregate.
pub fn aggregate(candidates: Vec<CandidateResult>) -> Option<ConsensusResult> {
    if candidates.is_empty() {
        return None;
    }

    let mut buckets: BTreeMap<String, Vec<CandidateResult>> = BTreeMap::new();
    for candidate in candidates {
        buckets
            .entry(normalize_key(&candidate.text))
            .or_default()
            .push(candidate);
    }

    let mut groups: Vec<ConsensusGroup> = buckets
        .into_values()
        .map(|mut members| {
            members.sort_by(|a, b| {
                b.confidence
                    .partial_cmp(&a.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.source_stage.cmp(&b.source_stage))
                    .then_with(|| a.text.cmp(&b.text))
            });
            let strongest = members[0].confidence;
            let average =
                members.iter().map(|m| m.confidence).sum::<f32>() / members.len() as f32;
            let confidence = scoring::group_confidence(average, strongest, members.len());
            let explanation = if members.len() == 1 {
                format!("single source ({})", members[0].source_stage.label())
            } else {
                format!(
                    "{} sources agreed (+{:.0} agreement bonus, capped at {:.0})",
                    members.len(),
                    scoring::agreement_bonus(members.len() - 1),
                    scoring::CONSENSUS_CEILING,
                )
            };
            ConsensusGroup {
                text: members[0].text.clone(),
                confidence,
                agreement_count: members.len(),
                explanation,
                members,
            }
        })
        .collect();

    groups.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| normalize_key(&a.text).cmp(&normalize_key(&b.text)))
    });

    let winner = &groups[0];
    debug!(
        final_text = %winner.text,
        final_confidence = winner.confidence,
        groups = groups.len(),
        "consensus reached"
    );

    Some(ConsensusResult {
        final_text: winner.text.clone(),
        final_confidence: winner.confidence,
        agreement_count: winner.agreement_count,
        groups,
    })
}
