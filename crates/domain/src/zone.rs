use std::fmt;
use std::sync::Arc;

/// A normalized, lowercased, fully qualified domain name (`"example.org."`, root is `"."`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ZoneName(Arc<str>);

impl ZoneName {
    pub fn new(name: &str) -> Self {
        let trimmed = name.trim().trim_end_matches('.').to_ascii_lowercase();
        if trimmed.is_empty() {
            return Self(Arc::from("."));
        }
        Self(Arc::from(format!("{}.", trimmed)))
    }

    pub fn root() -> Self {
        Self(Arc::from("."))
    }

    pub fn is_root(&self) -> bool {
        &*self.0 == "."
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when `name` equals this zone or sits below it on a label boundary.
    pub fn contains(&self, name: &ZoneName) -> bool {
        if self.is_root() {
            return true;
        }
        if name.0 == self.0 {
            return true;
        }
        name.0
            .strip_suffix(&*self.0)
            .is_some_and(|prefix| prefix.ends_with('.'))
    }
}

impl fmt::Display for ZoneName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneName {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}
