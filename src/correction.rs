use regex::Regex;

/// One ordered rewrite rule. Rules are individually idempotent; the list
/// as a whole is order-sensitive (later rules rely on earlier ones having
/// normalized whitespace and glyphs).
#[derive(Debug)]
pub struct CorrectionRule {
    pub id: &'static str,
    pub pattern: Regex,
    pub replacement: &'static str,
    pub rationale: &'static str,
}

impl CorrectionRule {
    fn new(
        id: &'static str,
        pattern: &str,
        replacement: &'static str,
        rationale: &'static str,
    ) -> Self {
        Self {
            id,
            // Patterns are compile-time constants; a bad one is a
            // programming error, so panicking at catalogue build is fine.
            pattern: Regex::new(pattern).expect("invalid correction rule pattern"),
            replacement,
            rationale,
        }
    }
}

/// The builtin rule catalogue, in application order. Append-only: new
/// rules go at the position their prerequisites allow, existing ids keep
/// their behavior.
pub fn builtin_rules() -> Vec<CorrectionRule> {
    vec![
        CorrectionRule::new(
            "collapse-whitespace",
            r"\s+",
            " ",
            "recognizers emit runs of spaces and stray newlines",
        ),
        // The exponent and multiplication splits run before the glyph
        // words so that glued forms like "pi2" gain their word boundary
        // first; the glyph rules then see the text in final shape.
        CorrectionRule::new(
            "caret-exponent",
            r"([a-zA-Z])(\d)",
            "${1}^${2}",
            "recognizers flatten superscripts: x4 means x^4",
        ),
        CorrectionRule::new(
            "implicit-multiplication",
            r"(\d)([a-zA-Z(])",
            "${1}*${2}",
            "adjacent coefficient and variable imply multiplication",
        ),
        CorrectionRule::new(
            "integral-glyph",
            r"[ʃ∮]|\bint\b",
            "∫",
            "integral sign commonly misread as long s or spelled out",
        ),
        CorrectionRule::new(
            "sqrt-glyph",
            r"(?i)\bsqrt\b",
            "√",
            "root sign transcribed as the word sqrt",
        ),
        CorrectionRule::new(
            "pi-glyph",
            r"\b[pP][iI]\b",
            "π",
            "pi transcribed as letters",
        ),
        CorrectionRule::new(
            "times-glyph",
            r"[×✕·]",
            "*",
            "multiplication glyph variants",
        ),
        CorrectionRule::new(
            "minus-glyph",
            r"[–—−]",
            "-",
            "dash/minus glyph variants",
        ),
        CorrectionRule::new(
            "operator-spacing",
            r"\s*([+*/=])\s*",
            " ${1} ",
            "uniform spacing around binary operators",
        ),
        CorrectionRule::new(
            "differential-compaction",
            r"\bd\s+([a-zA-Z])\b",
            "d${1}",
            "differential operator split from its variable",
        ),
    ]
}

/// Applies every rule once, in catalogue order, in a single pass.
///
/// Never fails: a rule that does not match leaves the text alone, and the
/// result is always a string (possibly identical to the input).
pub fn apply_rules(rules: &[CorrectionRule], input: &str) -> String {
    let mut text = input.to_string();
    for rule in rules {
        text = rule.pattern.replace_all(&text, rule.replacement).into_owned();
    }
    text.trim().to_string()
}
