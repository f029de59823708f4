use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable identifier of an installed application (a package name on Android).
///
/// Opaque to the engine: compared for equality only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

impl AppId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AppId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for AppId {
    fn from(value: String) -> Self {
        Self(value)
    }
}
