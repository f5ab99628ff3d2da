use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_TEMPLATE_URL: &str =
    "https://raw.githubusercontent.com/l3oku/clashrule-lucy/refs/heads/main/Mihomo.yaml";
pub const DEFAULT_USER_AGENT: &str = "Clash Verge";

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Fetch timeout cannot be 0")]
    InvalidTimeout,

    #[error("Structural marker list cannot be empty")]
    EmptyMarkers,

    #[error("Empty structural marker")]
    EmptyMarker,

    #[error("Fixed endpoint name cannot be empty")]
    EmptyFixedName,

    #[error("Duplicate manual group name: {0}")]
    DuplicateManualGroup(String),
}

/// Converter configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Main listener for conversion requests
    #[serde(default)]
    pub listener: Listener,
    /// Admin listener for health and readiness checks
    #[serde(default = "Listener::admin_default")]
    pub admin_listener: Listener,
    /// Location of the template document every feed is merged into
    #[serde(default = "default_template_url")]
    pub template_url: Url,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub merge: MergePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listener: Listener::default(),
            admin_listener: Listener::admin_default(),
            template_url: default_template_url(),
            fetch: FetchConfig::default(),
            merge: MergePolicy::default(),
        }
    }
}

impl Config {
    /// Validates the converter configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.fetch.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }

        self.merge.validate()
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Default for Listener {
    fn default() -> Self {
        Listener {
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl Listener {
    fn admin_default() -> Self {
        Listener {
            host: "127.0.0.1".into(),
            port: 3001,
        }
    }

    /// Validates the listener configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Settings for the template and feed fetches
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct FetchConfig {
    /// Upper bound for a single fetch, including reading the body
    pub timeout_secs: u64,
    /// User agent sent on the template fetch and on feed fetches whose
    /// originating request carried none
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_secs: 15,
            user_agent: DEFAULT_USER_AGENT.into(),
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Which literal name is kept when a feed endpoint replaces a template
/// endpoint with the same canonical key. Field values always come from the feed.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SurvivingName {
    #[default]
    Feed,
    Template,
}

/// Knobs of the detection, merge and group reconciliation steps
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct MergePolicy {
    /// Groups whose curated member list is preserved instead of replaced
    pub manual_groups: Vec<String>,
    /// Display name forced onto every custom-format endpoint
    pub fixed_name: Option<String>,
    pub surviving_name: SurvivingName,
    /// Substrings that mark a feed as a structured document, checked in order
    pub markers: Vec<String>,
    /// Group references that never name an endpoint
    pub builtin_policies: Vec<String>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        MergePolicy {
            manual_groups: Vec::new(),
            fixed_name: None,
            surviving_name: SurvivingName::default(),
            markers: ["proxies:", "port:", "mixed-port:", "proxy-groups:", "rules:"]
                .into_iter()
                .map(String::from)
                .collect(),
            builtin_policies: ["DIRECT", "REJECT", "REJECT-DROP", "PASS", "COMPATIBLE"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl MergePolicy {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.markers.is_empty() {
            return Err(ValidationError::EmptyMarkers);
        }
        if self.markers.iter().any(|m| m.is_empty()) {
            return Err(ValidationError::EmptyMarker);
        }

        if let Some(name) = &self.fixed_name
            && name.trim().is_empty()
        {
            return Err(ValidationError::EmptyFixedName);
        }

        let mut seen = HashSet::new();
        for group in &self.manual_groups {
            if !seen.insert(group) {
                return Err(ValidationError::DuplicateManualGroup(group.clone()));
            }
        }

        Ok(())
    }

    pub fn is_manual_group(&self, name: &str) -> bool {
        self.manual_groups.iter().any(|g| g == name)
    }

    pub fn is_builtin_policy(&self, name: &str) -> bool {
        self.builtin_policies.iter().any(|p| p == name)
    }
}

fn default_template_url() -> Url {
    Url::parse(DEFAULT_TEMPLATE_URL).expect("default template url is valid")
}
