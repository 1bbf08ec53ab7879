//! Triggering events and the user's decision on them.
//!
//! Both taxonomies are closed enums with an explicit `Unknown` fallback: the
//! host may report element or decision names this build does not know about,
//! and those must be carried through (and ignored by policy) rather than
//! rejected.

use serde::{Deserialize, Serialize};

/// Kind of security-relevant browser surface that produced an event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventCategory {
    SslOverridable,
    SslNonOverridable,
    Malware,
    Phishing,
    ExtensionInstall,
    /// Inline (web-initiated) extension install.
    InlineInstall,
    Harmful,
    BundleInstall,
    RemoteInstall,
    Unknown(String),
}

impl EventCategory {
    /// Parse the host's element name. Unrecognised names map to `Unknown`.
    pub fn from_element_name(name: &str) -> Self {
        match name.trim() {
            "ssl" | "ssl_overridable" => Self::SslOverridable,
            "ssl_nonoverridable" => Self::SslNonOverridable,
            "malware" => Self::Malware,
            "phishing" => Self::Phishing,
            "extension_install_dialog" => Self::ExtensionInstall,
            "extension_inline_install_dialog" => Self::InlineInstall,
            "harmful" => Self::Harmful,
            "extension_bundle_install_dialog" => Self::BundleInstall,
            "extension_remote_install_dialog" => Self::RemoteInstall,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::SslOverridable => "ssl_overridable",
            Self::SslNonOverridable => "ssl_nonoverridable",
            Self::Malware => "malware",
            Self::Phishing => "phishing",
            Self::ExtensionInstall => "extension_install_dialog",
            Self::InlineInstall => "extension_inline_install_dialog",
            Self::Harmful => "harmful",
            Self::BundleInstall => "extension_bundle_install_dialog",
            Self::RemoteInstall => "extension_remote_install_dialog",
            Self::Unknown(name) => name,
        }
    }

    /// Whether a survey exists for this category at all.
    pub fn is_supported(&self) -> bool {
        match self {
            Self::SslOverridable
            | Self::SslNonOverridable
            | Self::Malware
            | Self::Phishing
            | Self::ExtensionInstall
            | Self::InlineInstall => true,
            Self::Harmful | Self::BundleInstall | Self::RemoteInstall | Self::Unknown(_) => false,
        }
    }
}

impl From<String> for EventCategory {
    fn from(value: String) -> Self {
        Self::from_element_name(&value)
    }
}

impl From<EventCategory> for String {
    fn from(value: EventCategory) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user did on the interstitial or dialog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum DecisionOutcome {
    Proceed,
    /// The user backed out (for install dialogs: cancelled the install).
    Deny,
    Ignore,
    Cancel,
    Reload,
    Unknown(String),
}

impl DecisionOutcome {
    pub fn parse(name: &str) -> Self {
        match name.trim() {
            "proceed" => Self::Proceed,
            "deny" => Self::Deny,
            "ignore" => Self::Ignore,
            "cancel" => Self::Cancel,
            "reload" => Self::Reload,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Proceed => "proceed",
            Self::Deny => "deny",
            Self::Ignore => "ignore",
            Self::Cancel => "cancel",
            Self::Reload => "reload",
            Self::Unknown(name) => name,
        }
    }
}

impl From<String> for DecisionOutcome {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<DecisionOutcome> for String {
    fn from(value: DecisionOutcome) -> Self {
        value.as_str().to_string()
    }
}

impl core::fmt::Display for DecisionOutcome {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A security-relevant surface the user just saw.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub category: EventCategory,
    /// URL the user was trying to reach, if the host reports one.
    #[serde(default)]
    pub destination: Option<String>,
}

impl TriggerEvent {
    pub fn new(category: EventCategory) -> Self {
        Self {
            category,
            destination: None,
        }
    }

    pub fn with_destination(mut self, url: impl Into<String>) -> Self {
        self.destination = Some(url.into());
        self
    }
}

/// The user's decision on a [`TriggerEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub outcome: DecisionOutcome,
}

impl Decision {
    pub fn new(outcome: DecisionOutcome) -> Self {
        Self { outcome }
    }
}
