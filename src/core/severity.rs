//! 缺陷分级 - class → severity taxonomy shared by the session log and the report

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unified class taxonomy, indexed by model class id.
pub const CLASS_NAMES: [&str; 7] = [
    "corrosion",
    "marine_growth",
    "debris",
    "damage",
    "free_span",
    "healthy",
    "anode",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Warning,
    Normal,
}

static SEVERITY_MAP: Lazy<HashMap<&'static str, Severity>> = Lazy::new(|| {
    HashMap::from([
        ("corrosion", Severity::Critical),
        ("damage", Severity::Critical),
        ("free_span", Severity::Critical),
        ("debris", Severity::Warning),
        ("marine_growth", Severity::Warning),
        ("healthy", Severity::Normal),
        ("anode", Severity::Normal),
    ])
});

impl Severity {
    /// Unknown classes are treated as warnings.
    pub fn of(class_name: &str) -> Self {
        SEVERITY_MAP
            .get(class_name)
            .copied()
            .unwrap_or(Severity::Warning)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Warning => "WARNING",
            Severity::Normal => "NORMAL",
        }
    }

    /// Strong colour (header bars, labels)
    pub fn color(&self) -> (u8, u8, u8) {
        match self {
            Severity::Critical => (0xD6, 0x28, 0x39),
            Severity::Warning => (0xE0, 0x7B, 0x39),
            Severity::Normal => (0x1A, 0x8C, 0x6E),
        }
    }

    /// Light tint (tile and frame backgrounds)
    pub fn background(&self) -> (u8, u8, u8) {
        match self {
            Severity::Critical => (0xFD, 0xF0, 0xF1),
            Severity::Warning => (0xFE, 0xF6, 0xEE),
            Severity::Normal => (0xEE, 0xF8, 0xF5),
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// `free_span` → `Free Span`
pub fn display_name(class_name: &str) -> String {
    class_name
        .split(|c: char| c == '_' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
