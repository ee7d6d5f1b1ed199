use crate::candidate::{CandidateResult, SourceStage};
use crate::scoring::{self, TEMPLATE_ADMISSION_THRESHOLD};

/// A catalogued canonical expression with its known recognizer
/// misreadings. Static data consulted on every request, never mutated.
#[derive(Debug, Clone)]
pub struct ExpressionTemplate {
    pub name: &'static str,
    pub canonical_form: &'static str,
    /// Tokens that must appear for the template to apply.
    pub required_tokens: Vec<&'static str>,
    /// Tokens that strengthen the match when present.
    pub optional_tokens: Vec<&'static str>,
    /// Whole raw strings previously seen for this expression.
    pub known_variants: Vec<&'static str>,
    /// Cap on the confidence this template may claim.
    pub base_confidence: f32,
    /// Template-specific heuristic: if the text's digit run contains this
    /// sequence, the bonus applies.
    pub digit_signature: Option<(&'static str, f32)>,
}

/// The builtin catalogue. This is the single place holding the
/// development-set expressions the matcher was tuned on; replace or
/// extend it to cover a different corpus.
pub fn builtin_templates() -> Vec<ExpressionTemplate> {
    vec![
        ExpressionTemplate {
            name: "polynomial-integral",
            canonical_form: "∫ (5x^4 - 6x^2 + 3) dx",
            required_tokens: vec!["5x", "6x"],
            optional_tokens: vec!["dx", "∫", "3"],
            known_variants: vec!["5x4 6x2 3", "5x^4 6x^2 3", "∫(5x^4-6x^2+3)dx"],
            base_confidence: 92.0,
            digit_signature: Some(("54623", 15.0)),
        },
        ExpressionTemplate {
            name: "secant-integral",
            canonical_form: "∫ sec^2(2x) dx",
            required_tokens: vec!["sec", "2x"],
            optional_tokens: vec!["dx", "∫", "tan"],
            // "ean" is a recurring misread fragment seen alongside this
            // expression in training captures.
            known_variants: vec!["sec2 2x", "ean sec 2x", "∫ sec^2(2x) dx"],
            base_confidence: 88.0,
            digit_signature: None,
        },
        ExpressionTemplate {
            name: "quadratic-formula",
            canonical_form: "x = (-b ± √(b^2 - 4ac)) / 2a",
            required_tokens: vec!["4ac", "2a"],
            optional_tokens: vec!["±", "√", "b^2", "b2"],
            known_variants: vec!["b 4ac 2a", "x = -b ± √(b^2 - 4ac) / 2a"],
            base_confidence: 90.0,
            digit_signature: None,
        },
        ExpressionTemplate {
            name: "pythagorean-identity",
            canonical_form: "sin^2(x) + cos^2(x) = 1",
            required_tokens: vec!["sin", "cos"],
            optional_tokens: vec!["= 1", "^2", "x"],
            known_variants: vec!["sin2x cos2x 1", "sin^2 x + cos^2 x = 1"],
            base_confidence: 85.0,
            digit_signature: None,
        },
        ExpressionTemplate {
            name: "log-derivative",
            canonical_form: "d/dx ln(x) = 1/x",
            required_tokens: vec!["ln", "dx"],
            optional_tokens: vec!["1/x", "d/dx"],
            known_variants: vec!["d dx ln x 1 x"],
            base_confidence: 84.0,
            digit_signature: None,
        },
    ]
}

/// Scores `raw_text` against every template and returns the candidates
/// above the admission threshold, sorted by descending confidence (name
/// as tiebreak, so the ranking is reproducible).
///
/// Ambiguous texts matching several templates yield several candidates;
/// reconciling them is the consensus aggregator's job, not ours.
pub fn match_templates(
    templates: &[ExpressionTemplate],
    raw_text: &str,
) -> Vec<CandidateResult> {
    let lower = raw_text.to_lowercase();
    let mut candidates: Vec<(f32, CandidateResult)> = templates
        .iter()
        .filter_map(|template| {
            let score = score_template(template, &lower);
            if score < TEMPLATE_ADMISSION_THRESHOLD {
                return None;
            }
            let confidence = template.base_confidence.min(score.round());
            let candidate = CandidateResult::new(
                SourceStage::Template(template.name.to_string()),
                template.canonical_form,
                confidence,
                format!("matched template '{}' with score {:.0}", template.name, score),
            );
            Some((score, candidate))
        })
        .collect();

    candidates.sort_by(|(score_a, a), (score_b, b)| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| {
                score_b
                    .partial_cmp(score_a)
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .then_with(|| a.source_stage.cmp(&b.source_stage))
    });
    candidates.into_iter().map(|(_, candidate)| candidate).collect()
}

fn score_template(template: &ExpressionTemplate, lower_text: &str) -> f32 {
    let required_coverage = token_coverage(&template.required_tokens, lower_text);
    let optional_coverage = token_coverage(&template.optional_tokens, lower_text);
    let variant_overlap = template
        .known_variants
        .iter()
        .map(|variant| variant_word_overlap(variant, lower_text))
        .fold(0.0f32, f32::max);

    let bonus = template
        .digit_signature
        .map(|(signature, bonus)| {
            let digits: String = lower_text.chars().filter(char::is_ascii_digit).collect();
            if digits.contains(signature) { bonus } else { 0.0 }
        })
        .unwrap_or(0.0);

    scoring::template_score(required_coverage, optional_coverage, variant_overlap, bonus)
}

fn token_coverage(tokens: &[&str], lower_text: &str) -> f32 {
    if tokens.is_empty() {
        return 0.0;
    }
    let matched = tokens
        .iter()
        .filter(|token| lower_text.contains(&token.to_lowercase()))
        .count();
    matched as f32 / tokens.len() as f32
}

/// Word-level overlap between a known variant and the text, 0-100.
fn variant_word_overlap(variant: &str, lower_text: &str) -> f32 {
    let words: Vec<String> = variant
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    if words.is_empty() {
        return 0.0;
    }
    let matched = words
        .iter()
        .filter(|word| lower_text.contains(word.as_str()))
        .count();
    matched as f32 / words.len() as f32 * 100.0
}
