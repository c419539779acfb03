//! Plugin identity and handler types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Maximum accepted length of a plugin identity, in bytes.
pub const MAX_PLUGIN_ID_LEN: usize = 512;

/// Opaque, unique plugin identity.
///
/// Keys every piece of per-plugin state (execution contexts, pending calls,
/// capability grants). The value is immutable for the plugin's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl<'de> Deserialize<'de> for PluginId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

impl PluginId {
    /// Create a validated plugin identity.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidPluginId`] if the id is empty, longer than
    /// [`MAX_PLUGIN_ID_LEN`], or contains whitespace or control characters.
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(id: &str) -> CoreResult<()> {
        if id.is_empty() {
            return Err(CoreError::InvalidPluginId(
                "plugin id must not be empty".into(),
            ));
        }
        if id.len() > MAX_PLUGIN_ID_LEN {
            return Err(CoreError::InvalidPluginId(format!(
                "plugin id exceeds {MAX_PLUGIN_ID_LEN} bytes"
            )));
        }
        if id.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(CoreError::InvalidPluginId(format!(
                "plugin id must not contain whitespace or control characters, got: {id:?}"
            )));
        }
        Ok(())
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PluginId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for PluginId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Named entry points a plugin may export.
///
/// The serialized form is the export name the sandbox looks up on
/// `module.exports`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandlerType {
    /// JSON-RPC requests from dapps or other plugins.
    #[serde(rename = "onRpcRequest")]
    OnRpcRequest,
    /// Transaction insight requests.
    #[serde(rename = "onTransaction")]
    OnTransaction,
    /// Scheduled background jobs.
    #[serde(rename = "onCronjob")]
    OnCronjob,
    /// First installation of the plugin.
    #[serde(rename = "onInstall")]
    OnInstall,
    /// Plugin update.
    #[serde(rename = "onUpdate")]
    OnUpdate,
    /// Signature insight requests.
    #[serde(rename = "onSignature")]
    OnSignature,
    /// Name resolution requests.
    #[serde(rename = "onNameLookup")]
    OnNameLookup,
    /// Home page rendering.
    #[serde(rename = "onHomePage")]
    OnHomePage,
    /// Interactive user input events.
    #[serde(rename = "onUserInput")]
    OnUserInput,
    /// Keyring requests.
    #[serde(rename = "onKeyringRequest")]
    OnKeyringRequest,
}

impl HandlerType {
    /// All handler types, in declaration order.
    pub const ALL: [Self; 10] = [
        Self::OnRpcRequest,
        Self::OnTransaction,
        Self::OnCronjob,
        Self::OnInstall,
        Self::OnUpdate,
        Self::OnSignature,
        Self::OnNameLookup,
        Self::OnHomePage,
        Self::OnUserInput,
        Self::OnKeyringRequest,
    ];

    /// The export name of this handler.
    #[must_use]
    pub fn export_name(self) -> &'static str {
        match self {
            Self::OnRpcRequest => "onRpcRequest",
            Self::OnTransaction => "onTransaction",
            Self::OnCronjob => "onCronjob",
            Self::OnInstall => "onInstall",
            Self::OnUpdate => "onUpdate",
            Self::OnSignature => "onSignature",
            Self::OnNameLookup => "onNameLookup",
            Self::OnHomePage => "onHomePage",
            Self::OnUserInput => "onUserInput",
            Self::OnKeyringRequest => "onKeyringRequest",
        }
    }
}

impl fmt::Display for HandlerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.export_name())
    }
}

impl FromStr for HandlerType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|h| h.export_name() == s)
            .ok_or_else(|| CoreError::UnknownHandler(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plugin_id_accepts_npm_and_local_ids() {
        assert!(PluginId::new("npm:@keel/example").is_ok());
        assert!(PluginId::new("local:http://localhost:8080").is_ok());
    }

    #[test]
    fn test_plugin_id_rejects_empty() {
        assert!(matches!(
            PluginId::new(""),
            Err(CoreError::InvalidPluginId(_))
        ));
    }

    #[test]
    fn test_plugin_id_rejects_whitespace() {
        assert!(PluginId::new("npm:bad id").is_err());
        assert!(PluginId::new("npm:bad\nid").is_err());
    }

    #[test]
    fn test_plugin_id_rejects_oversized() {
        let long = "a".repeat(MAX_PLUGIN_ID_LEN + 1);
        assert!(PluginId::new(long).is_err());
    }

    #[test]
    fn test_plugin_id_deserialize_validates() {
        let ok: PluginId = serde_json::from_str("\"npm:ok\"").unwrap();
        assert_eq!(ok.as_str(), "npm:ok");
        assert!(serde_json::from_str::<PluginId>("\"\"").is_err());
    }

    #[test]
    fn test_handler_type_serde_uses_export_name() {
        let json = serde_json::to_string(&HandlerType::OnRpcRequest).unwrap();
        assert_eq!(json, "\"onRpcRequest\"");

        for handler in HandlerType::ALL {
            let parsed: HandlerType = handler.export_name().parse().unwrap();
            assert_eq!(parsed, handler);
        }
    }

    #[test]
    fn test_handler_type_unknown() {
        assert_eq!(
            "onSomething".parse::<HandlerType>(),
            Err(CoreError::UnknownHandler("onSomething".into()))
        );
    }
}
