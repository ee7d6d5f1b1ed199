//! All confidence arithmetic in one place: template score weights,
//! agreement bonuses, and the various caps. Every stage that assigns or
//! combines confidence goes through these helpers.

/// Weight of required-token coverage in a template score.
pub const REQUIRED_TOKEN_WEIGHT: f32 = 50.0;
/// Weight of optional-token coverage in a template score.
pub const OPTIONAL_TOKEN_WEIGHT: f32 = 20.0;
/// Weight of the best known-variant word overlap (0-100) in a template score.
pub const VARIANT_OVERLAP_WEIGHT: f32 = 0.3;
/// Minimum template score admitted as a candidate.
pub const TEMPLATE_ADMISSION_THRESHOLD: f32 = 25.0;

/// Hard ceiling for a consensus group.
pub const CONSENSUS_CEILING: f32 = 98.0;
/// Ceiling for a disambiguator answer that matched a supplied candidate.
pub const DISAMBIGUATION_CEILING: f32 = 95.0;
/// Boost applied when the disambiguator picks an existing candidate.
pub const DISAMBIGUATION_MATCH_BOOST: f32 = 8.0;
/// Fixed confidence for a disambiguator answer unlike any supplied candidate.
pub const UNVERIFIED_REWRITE_CONFIDENCE: f32 = 85.0;

pub fn clamp_confidence(value: f32) -> f32 {
    value.clamp(0.0, 100.0)
}

/// Combines the weighted template score components, capped at 100.
pub fn template_score(
    required_coverage: f32,
    optional_coverage: f32,
    best_variant_overlap: f32,
    bonus: f32,
) -> f32 {
    let score = required_coverage * REQUIRED_TOKEN_WEIGHT
        + optional_coverage * OPTIONAL_TOKEN_WEIGHT
        + best_variant_overlap * VARIANT_OVERLAP_WEIGHT
        + bonus;
    score.min(100.0)
}

/// Bonus for `extra` candidates beyond the first agreeing on the same text.
/// Grows with agreement, capped so a group can never ride bonuses alone to
/// the ceiling.
pub fn agreement_bonus(extra: usize) -> f32 {
    (extra as f32 * 6.0).min(18.0)
}

/// Confidence of a consensus group: the better of the member average and
/// the strongest member, plus the agreement bonus, capped at
/// [`CONSENSUS_CEILING`]. Non-decreasing as agreeing members join: the
/// average never exceeds the strongest member, so a weak newcomer cannot
/// drag the group below what it scored without them.
pub fn group_confidence(average: f32, strongest: f32, members: usize) -> f32 {
    let extra = members.saturating_sub(1);
    let boosted = average.max(strongest) + agreement_bonus(extra);
    clamp_confidence(boosted.min(CONSENSUS_CEILING))
}

/// Confidence for a disambiguator answer that exactly matched a supplied
/// candidate with confidence `matched`.
pub fn disambiguation_match_confidence(matched: f32) -> f32 {
    (matched + DISAMBIGUATION_MATCH_BOOST).min(DISAMBIGUATION_CEILING)
}
