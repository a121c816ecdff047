use super::error::{PluginError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

pub const OPTIMIZER_PLUGIN_API_VERSION: &str = "gepa.optimizer/v1";
pub const OPTIMIZER_PLUGIN_KIND: &str = "optimizer";

/// Identity a plugin module exports alongside its `create` factory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginDescriptor {
    #[serde(alias = "api_version")]
    pub api_version: String,
    pub kind: String,
    pub id: String,
    pub name: String,
}

impl PluginDescriptor {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            api_version: OPTIMIZER_PLUGIN_API_VERSION.to_string(),
            kind: OPTIMIZER_PLUGIN_KIND.to_string(),
            id: id.into(),
            name: name.into(),
        }
    }

    /// Decode from an exported descriptor object; unknown fields are ignored
    pub fn from_value(value: &Value) -> Result<Self> {
        let field = |name: &str, alias: &str| {
            value
                .get(name)
                .or_else(|| value.get(alias))
                .and_then(Value::as_str)
                .map(|s| s.trim().to_string())
                .unwrap_or_default()
        };
        if !value.is_object() {
            return Err(PluginError::InvalidDescriptor(
                "module did not export an object descriptor".to_string(),
            ));
        }
        let descriptor = Self {
            api_version: field("apiVersion", "api_version"),
            kind: field("kind", "kind"),
            id: field("id", "id"),
            name: field("name", "name"),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<()> {
        let api_version = self.api_version.trim();
        if api_version.is_empty() {
            return Err(PluginError::InvalidDescriptor(
                "apiVersion is required".to_string(),
            ));
        }
        if api_version != OPTIMIZER_PLUGIN_API_VERSION {
            return Err(PluginError::InvalidDescriptor(format!(
                "unsupported apiVersion {:?} (expected {:?})",
                api_version, OPTIMIZER_PLUGIN_API_VERSION
            )));
        }
        if self.kind.trim() != OPTIMIZER_PLUGIN_KIND {
            return Err(PluginError::InvalidDescriptor(format!(
                "kind must be {:?}",
                OPTIMIZER_PLUGIN_KIND
            )));
        }
        if self.id.trim().is_empty() {
            return Err(PluginError::InvalidDescriptor("id is required".to_string()));
        }
        if self.name.trim().is_empty() {
            return Err(PluginError::InvalidDescriptor("name is required".to_string()));
        }
        Ok(())
    }
}

/// Context handed to a plugin's `create` factory
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostContext {
    pub app: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extra: Map<String, Value>,
}

impl HostContext {
    pub fn new(app: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            ..Default::default()
        }
    }

    pub fn with_script_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.script_path = Some(path.into());
        self
    }

    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use weft_core::ErrorKind;

    #[test]
    fn test_from_value() {
        let descriptor = PluginDescriptor::from_value(&json!({
            "apiVersion": "gepa.optimizer/v1",
            "kind": "optimizer",
            "id": "toy",
            "name": " Toy Plugin ",
            "create": "function"
        }))
        .unwrap();
        assert_eq!(descriptor, PluginDescriptor::new("toy", "Toy Plugin"));
    }

    #[test]
    fn test_rejections() {
        let cases = [
            json!({"apiVersion": "gepa.optimizer/v2", "kind": "optimizer", "id": "a", "name": "b"}),
            json!({"kind": "optimizer", "id": "a", "name": "b"}),
            json!({"apiVersion": "gepa.optimizer/v1", "kind": "scorer", "id": "a", "name": "b"}),
            json!({"apiVersion": "gepa.optimizer/v1", "kind": "optimizer", "id": "", "name": "b"}),
            json!({"apiVersion": "gepa.optimizer/v1", "kind": "optimizer", "id": "a"}),
            json!("not an object"),
        ];
        for case in cases {
            let err = PluginDescriptor::from_value(&case).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidConfig, "{}", case);
        }
    }

    #[test]
    fn test_host_context_serialization() {
        let host = HostContext::new("weft").with_profile("fast");
        assert_eq!(
            serde_json::to_value(&host).unwrap(),
            json!({"app": "weft", "profile": "fast"})
        );
    }
}
