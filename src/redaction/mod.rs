//! Best-effort text sanitization: ordered, case-insensitive pattern
//! substitution followed by an encoded-blob heuristic.

use std::sync::OnceLock;

use anyhow::{Context, Result};
use log::warn;
use regex::{Regex, RegexBuilder};

use crate::settings::RedactionRule;

/// Marker that replaces an entire text judged to be an encoded secret.
pub const BLOB_MARKER: &str = "[redacted:blob]";

const BLOB_MIN_TEXT_CHARS: usize = 180;

fn blob_run() -> &'static Regex {
    static BLOB_RUN: OnceLock<Regex> = OnceLock::new();
    BLOB_RUN.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9+/=_\-]{60,}").expect("blob pattern is a valid regex")
    })
}

/// Built-in rule set. Each replacement is chosen so that it is a fixed point of
/// every rule, which keeps `redact` idempotent.
pub fn default_rules() -> Vec<RedactionRule> {
    vec![
        RedactionRule::new(
            "email",
            r"[a-z0-9._%+\-]+@[a-z0-9.\-]+\.[a-z]{2,}",
            "[redacted:email]",
        ),
        RedactionRule::new(
            "jwt",
            r"\beyJ[a-z0-9_\-]+\.[a-z0-9_\-]+\.[a-z0-9_\-]+",
            "[redacted:jwt]",
        ),
        RedactionRule::new(
            "bearer",
            r"\bbearer\s+[a-z0-9._~+/\-]+=*",
            "Bearer [redacted:token]",
        ),
        RedactionRule::new(
            "credential-assignment",
            r"\b(api[_\-]?key|secret|password|passwd|pwd|access[_\-]?token)\s*[:=]\s*[^\s&;,]+",
            "$1=[redacted]",
        ),
        RedactionRule::new("card-number", r"\b(?:\d[ \-]?){12,18}\d\b", "[redacted:card]"),
        RedactionRule::new("ssn", r"\b\d{3}-\d{2}-\d{4}\b", "[redacted:ssn]"),
    ]
}

/// Compile a rule the way the engine applies it.
pub fn compile_rule(rule: &RedactionRule) -> Result<Regex> {
    RegexBuilder::new(&rule.match_pattern)
        .case_insensitive(true)
        .build()
        .with_context(|| format!("failed to compile pattern {:?}", rule.match_pattern))
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    regex: Regex,
    replacement: String,
}

/// A compiled, ordered rule set. Rules that fail to compile are dropped at
/// construction and never abort redaction.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<CompiledRule>,
}

impl Redactor {
    pub fn new(rules: &[RedactionRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match compile_rule(rule) {
                Ok(regex) => Some(CompiledRule {
                    name: rule.name.clone(),
                    regex,
                    replacement: braced_group_refs(&rule.replacement),
                }),
                Err(err) => {
                    warn!("skipping redaction rule '{}': {err:#}", rule.name);
                    None
                }
            })
            .collect();

        Self { rules }
    }

    pub fn rule_names(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|rule| rule.name.as_str())
    }

    pub fn redact(&self, text: &str) -> String {
        let mut output = text.to_string();
        for rule in &self.rules {
            output = rule
                .regex
                .replace_all(&output, rule.replacement.as_str())
                .into_owned();
        }

        if output.chars().count() > BLOB_MIN_TEXT_CHARS && blob_run().is_match(&output) {
            return BLOB_MARKER.to_string();
        }

        output
    }

    pub fn redact_opt(&self, text: Option<String>) -> Option<String> {
        text.map(|value| self.redact(&value))
    }
}

/// Rewrite numbered group references as `${N}` so `$1abc` means group 1
/// followed by `abc` instead of a group named `1abc`. `$$` and `${..}` pass
/// through unchanged.
fn braced_group_refs(replacement: &str) -> String {
    let mut output = String::with_capacity(replacement.len());
    let mut chars = replacement.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            output.push(ch);
            continue;
        }
        match chars.peek() {
            Some('$') => {
                chars.next();
                output.push_str("$$");
            }
            Some(next) if next.is_ascii_digit() => {
                output.push_str("${");
                while let Some(digit) = chars.next_if(char::is_ascii_digit) {
                    output.push(digit);
                }
                output.push('}');
            }
            _ => output.push('$'),
        }
    }
    output
}

/// One-shot form: absent text stays absent.
pub fn redact(text: Option<&str>, rules: &[RedactionRule]) -> Option<String> {
    text.map(|value| Redactor::new(rules).redact(value))
}
