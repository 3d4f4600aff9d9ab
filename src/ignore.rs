//! Ignore pattern matching for sync candidates

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::errors::Result;

/// Patterns excluded from sync regardless of user configuration.
const DEFAULT_PATTERNS: &[&str] = &[
    "**/.DS_Store",
    "**/Thumbs.db",
    "**/.git/**",
    "**/node_modules/**",
    "**/*.tmp",
    "**/*.swp",
    "**/*~",
];

/// Compiled ignore set: built-in defaults plus user-configured patterns.
#[derive(Debug, Clone)]
pub struct IgnoreFilter {
    set: GlobSet,
}

impl IgnoreFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let mut builder = GlobSetBuilder::new();

        for pattern in DEFAULT_PATTERNS
            .iter()
            .copied()
            .chain(patterns.iter().map(String::as_str))
        {
            let pattern = pattern.trim();
            if pattern.is_empty() {
                continue;
            }
            builder.add(Glob::new(pattern)?);
        }

        Ok(Self { set: builder.build()? })
    }

    pub fn is_ignored(&self, path: &str) -> bool {
        self.set.is_match(path)
    }

    pub fn is_accepted(&self, path: &str) -> bool {
        !self.is_ignored(path)
    }
}
