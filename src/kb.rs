use crate::entry::LogEntry;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

/// One knowledge-base rule: a message pattern and the remediation to
/// surface when it matches. `title` is the rule's identity for batch-level
/// de-duplication; remaining descriptive fields are carried opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KbRule {
    pub pattern: String,
    pub title: String,
    #[serde(default)]
    pub recommendation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    regex: Regex,
    rule: KbRule,
}

/// An ordered set of compiled rules. Loading degrades instead of failing:
/// a malformed rule is skipped, an unreadable or unparsable file yields an
/// empty knowledge base, and matching over an empty base yields no
/// recommendations while the rest of the pipeline proceeds unaffected.
#[derive(Debug, Clone, Default)]
pub struct KnowledgeBase {
    rules: Vec<CompiledRule>,
}

static BUILTIN_KB: Lazy<KnowledgeBase> = Lazy::new(|| {
    KnowledgeBase::from_values(
        serde_json::from_str(include_str!("builtin_kb.json"))
            .expect("builtin knowledge base is valid JSON"),
    )
});

impl KnowledgeBase {
    pub fn empty() -> KnowledgeBase {
        KnowledgeBase::default()
    }

    /// The knowledge base bundled with the binary.
    pub fn builtin() -> KnowledgeBase {
        BUILTIN_KB.clone()
    }

    /// Load rules from a JSON file holding an array of rule objects.
    pub fn load(path: &Path) -> KnowledgeBase {
        let data = match fs::read(path) {
            Ok(d) => d,
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to read knowledge base");
                return KnowledgeBase::empty();
            }
        };
        match serde_json::from_slice::<Vec<Value>>(&data) {
            Ok(values) => KnowledgeBase::from_values(values),
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "failed to parse knowledge base");
                KnowledgeBase::empty()
            }
        }
    }

    /// Compile a rule list, skipping entries that are missing `pattern` or
    /// `title` or whose pattern does not compile.
    pub fn from_values(values: Vec<Value>) -> KnowledgeBase {
        let mut rules = Vec::with_capacity(values.len());
        for value in values {
            let rule: KbRule = match serde_json::from_value(value) {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(%err, "skipping malformed knowledge base rule");
                    continue;
                }
            };
            if rule.pattern.trim().is_empty() || rule.title.trim().is_empty() {
                tracing::warn!(title = %rule.title, "skipping rule with empty pattern or title");
                continue;
            }
            match RegexBuilder::new(&rule.pattern).case_insensitive(true).build() {
                Ok(regex) => rules.push(CompiledRule { regex, rule }),
                Err(err) => {
                    tracing::warn!(title = %rule.title, %err, "skipping rule with invalid pattern")
                }
            }
        }
        KnowledgeBase { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Match every entry's message against every rule (case-insensitive
    /// substring search, not a full match). Each rule fires at most once per
    /// batch; output order is the order in which titles first triggered.
    pub fn match_entries(&self, entries: &[LogEntry]) -> Vec<KbRule> {
        entries
            .iter()
            .flat_map(|entry| {
                self.rules
                    .iter()
                    .filter(|compiled| compiled.regex.is_match(&entry.message))
            })
            .map(|compiled| compiled.rule.clone())
            .unique_by(|rule| rule.title.clone())
            .collect()
    }
}
