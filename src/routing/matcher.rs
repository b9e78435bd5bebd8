//! Path matching and rewriting.
//!
//! # Responsibilities
//! - Match request paths against exact or subtree (`/prefix/**`) patterns
//! - Rewrite matched paths by substituting the captured remainder
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A subtree pattern matches its base path and everything below it
//! - No regex to guarantee O(n) matching

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Matches exactly one path.
    Exact(String),
    /// Matches the base path and every path below it. `/**` has an empty base.
    Subtree(String),
}

impl PathPattern {
    /// Parse `"/exact/path"` or `"/prefix/**"`. Patterns must start with `/`
    /// and may only use `**` as the final segment.
    pub fn parse(pattern: &str) -> Option<Self> {
        if !pattern.starts_with('/') {
            return None;
        }

        match pattern.strip_suffix("/**") {
            Some(base) if !base.contains('*') => Some(Self::Subtree(base.to_string())),
            Some(_) => None,
            None if pattern.contains('*') => None,
            None => Some(Self::Exact(pattern.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Exact(expected) => path == expected,
            Self::Subtree(base) => match path.strip_prefix(base.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }
}

/// True when `path` has a `.` or `..` segment once `%2e`/`%2f` escapes and
/// backslashes are read the way a normalizing backend would read them.
pub fn has_dot_segment(path: &str) -> bool {
    let decoded = path
        .to_ascii_lowercase()
        .replace("%2e", ".")
        .replace("%2f", "/")
        .replace('\\', "/")
        .replace("%5c", "/");

    decoded.split('/').any(|segment| segment == "." || segment == "..")
}

/// Replaces the path remainder after `prefix` into `template`'s `{segment}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    prefix: String,
    template: String,
}

impl RewriteRule {
    pub fn new(prefix: impl Into<String>, template: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            template: template.into(),
        }
    }

    /// Rewritten path, or `None` when `path` does not start with the prefix.
    pub fn apply(&self, path: &str) -> Option<String> {
        path.strip_prefix(self.prefix.as_str())
            .map(|segment| self.template.replace("{segment}", segment))
    }
}
