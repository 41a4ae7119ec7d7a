//! Persisted viewer preferences and shareable locations
//!
//! Preferences live in `$XDG_STATE_HOME/runscope/preferences.toml`. They are
//! small, rewritten whole on every change, and never fatal: a missing or
//! unreadable file yields defaults.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::types::RunId;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Switch to whichever run last received an update
    #[serde(default)]
    pub follow_new_runs: bool,

    /// Location of the last viewed run (`<url>#<run id>`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_location: Option<String>,
}

impl Preferences {
    /// Load preferences, falling back to defaults on any problem.
    pub fn load(path: &Path) -> Self {
        match Self::try_load(path) {
            Ok(prefs) => prefs,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Using default preferences");
                Self::default()
            }
        }
    }

    fn try_load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse preferences: {}", e)))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string(self)
            .map_err(|e| Error::Config(format!("failed to encode preferences: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Save, logging instead of failing.
    pub fn save_or_warn(&self, path: &Path) {
        if let Err(e) = self.save(path) {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save preferences");
        }
    }

    /// The run addressed by `last_location`, if it points at `endpoint`.
    pub fn last_run_for(&self, endpoint: &Url) -> Option<RunId> {
        let location: Location = self.last_location.as_deref()?.parse().ok()?;
        (location.endpoint() == *endpoint)
            .then_some(location.run_id)
            .flatten()
    }
}

/// A server endpoint plus an optional selected run, written `<url>#<run id>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    endpoint: Url,
    pub run_id: Option<RunId>,
}

impl Location {
    pub fn new(endpoint: &Url, run_id: Option<RunId>) -> Self {
        let mut endpoint = endpoint.clone();
        endpoint.set_fragment(None);
        Self { endpoint, run_id }
    }

    /// The server URL without the run fragment.
    pub fn endpoint(&self) -> Url {
        self.endpoint.clone()
    }

    pub fn with_run(&self, run_id: RunId) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            run_id: Some(run_id),
        }
    }
}

impl FromStr for Location {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let url = Url::parse(s).map_err(|e| Error::Location(format!("{s:?}: {e}")))?;
        let run_id = match url.fragment() {
            None | Some("") => None,
            Some(fragment) => Some(
                fragment
                    .parse::<RunId>()
                    .map_err(|_| Error::Location(format!("{s:?}: run id {fragment:?} is not a number")))?,
            ),
        };
        Ok(Self::new(&url, run_id))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.run_id {
            Some(run_id) => write!(f, "{}#{}", self.endpoint, run_id),
            None => write!(f, "{}", self.endpoint),
        }
    }
}
