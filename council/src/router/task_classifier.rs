//! Task classification
//!
//! Maps free-text tasks onto a fixed set of [`TaskCategory`] values using
//! keyword counts and length signals. Classification is a pure function of
//! the input text.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::RouterConfig;

/// Categories a task can be routed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskCategory {
    /// Write new code from a description
    CodeGeneration,
    /// Review or analyze existing code
    CodeReview,
    /// Strategy, planning and multi-step reasoning
    ComplexReasoning,
    /// Calculations, statistics and research
    MathResearch,
    /// Short, simple requests
    QuickTasks,
    /// Small code snippets that do not need a large coder
    FastCode,
    /// Anything else
    General,
}

impl TaskCategory {
    /// Every category, in declaration order.
    pub fn all() -> &'static [TaskCategory] {
        &[
            Self::CodeGeneration,
            Self::CodeReview,
            Self::ComplexReasoning,
            Self::MathResearch,
            Self::QuickTasks,
            Self::FastCode,
            Self::General,
        ]
    }

    /// Snake-case identifier, as used in config files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CodeGeneration => "code_generation",
            Self::CodeReview => "code_review",
            Self::ComplexReasoning => "complex_reasoning",
            Self::MathResearch => "math_research",
            Self::QuickTasks => "quick_tasks",
            Self::FastCode => "fast_code",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for TaskCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| format!("unknown task category: {}", s))
    }
}

const CODE_KEYWORDS: &[&str] = &[
    "code",
    "function",
    "class",
    "algorithm",
    "implement",
    "debug",
    "refactor",
    "review code",
    "write code",
    "generate code",
    "programming",
    "syntax",
    "api",
    "endpoint",
    "database query",
];

/// Code words that only count as whole words ("bug" must not fire inside
/// "debug", "fix" inside "prefix").
static CODE_WORD_PATTERNS: LazyLock<[Regex; 2]> = LazyLock::new(|| {
    [
        Regex::new(r"\bbugs?\b").expect("bug pattern should compile"),
        Regex::new(r"\bfix(es|ed)?\b").expect("fix pattern should compile"),
    ]
});

const REASONING_KEYWORDS: &[&str] = &[
    "analyze",
    "reason",
    "strategy",
    "decision",
    "evaluate",
    "complex",
    "solve",
    "plan",
    "design",
    "architecture",
];

const MATH_KEYWORDS: &[&str] = &[
    "calculate",
    "math",
    "mathematical",
    "research",
    "study",
    "analyze data",
    "statistics",
    "formula",
    "equation",
];

const QUICK_KEYWORDS: &[&str] = &[
    "quick",
    "simple",
    "brief",
    "short",
    "summarize",
    "monitor",
    "check",
    "status",
];

/// Keyword hit counts behind a classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordSignals {
    pub code: usize,
    pub reasoning: usize,
    pub math: usize,
    pub quick: usize,
    /// Task length in characters
    pub length: usize,
}

impl KeywordSignals {
    /// Count keyword matches in `text` (case-insensitive substring match).
    pub fn scan(text: &str) -> Self {
        let lower = text.to_lowercase();
        let hits = |set: &[&str]| set.iter().filter(|kw| lower.contains(*kw)).count();
        Self {
            code: hits(CODE_KEYWORDS)
                + CODE_WORD_PATTERNS
                    .iter()
                    .filter(|re| re.is_match(&lower))
                    .count(),
            reasoning: hits(REASONING_KEYWORDS),
            math: hits(MATH_KEYWORDS),
            quick: hits(QUICK_KEYWORDS),
            length: text.chars().count(),
        }
    }
}

/// Heuristic task classifier
#[derive(Debug, Clone)]
pub struct TaskClassifier {
    quick_task_max_chars: usize,
    fast_code_max_chars: usize,
}

impl TaskClassifier {
    /// Classifier with the default length boundaries (200 / 500).
    pub fn new() -> Self {
        Self::from_config(&RouterConfig::default())
    }

    /// Classifier using the boundaries from `config`.
    pub fn from_config(config: &RouterConfig) -> Self {
        Self {
            quick_task_max_chars: config.quick_task_max_chars,
            fast_code_max_chars: config.fast_code_max_chars,
        }
    }

    /// Classify a task. The first matching rule wins.
    pub fn classify(&self, text: &str) -> TaskCategory {
        let signals = KeywordSignals::scan(text);
        let lower = text.to_lowercase();

        if signals.code >= 2 || lower.contains("code review") {
            return if lower.contains("review") {
                TaskCategory::CodeReview
            } else {
                TaskCategory::CodeGeneration
            };
        }

        if signals.math >= 2 {
            return TaskCategory::MathResearch;
        }

        if signals.reasoning >= 2 {
            return TaskCategory::ComplexReasoning;
        }

        if signals.quick >= 2 || signals.length < self.quick_task_max_chars {
            return TaskCategory::QuickTasks;
        }

        if signals.code == 1 && signals.length < self.fast_code_max_chars {
            return TaskCategory::FastCode;
        }

        TaskCategory::General
    }

    /// Explicit category if supplied, otherwise the heuristic result.
    pub fn resolve(&self, text: &str, explicit: Option<TaskCategory>) -> TaskCategory {
        explicit.unwrap_or_else(|| self.classify(text))
    }
}

impl Default for TaskClassifier {
    fn default() -> Self {
        Self::new()
    }
}
