//! Manifest: the declarative definition of an agent.
//!
//! A manifest is supplied whole by the caller and never mutated. It carries
//! the prompt chunks, reusable blocks, variable declarations, tool
//! declarations, model configurations and optional scenarios. Manifests are
//! validated before any model call is made.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::error::ManifestError;

/// Key stripped from model parameters before they reach a vendor.
pub const LABEL_PARAM: &str = "label";

/// The root manifest structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Optional stable identifier (used for tracing only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Optional human-readable name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Optional version tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Ordered system prompt chunks
    #[serde(default)]
    pub system: Vec<Chunk>,

    /// Ordered user prompt chunks
    #[serde(default)]
    pub user: Vec<Chunk>,

    /// Named reusable blocks, referenced as `{component.<name>}`
    #[serde(default)]
    pub blocks: BTreeMap<String, String>,

    /// Variable declarations
    #[serde(default)]
    pub variables: Vec<VariableDecl>,

    /// Tool declarations, in any accepted shape
    #[serde(default)]
    pub tools: Vec<ToolDeclaration>,

    /// Model configurations; the first entry is primary
    #[serde(default)]
    pub models: Vec<ModelConfig>,

    /// Named scenarios discoverable through the built-in scenario tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scenarios: Vec<Scenario>,
}

/// A named text fragment of the system or user prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub name: String,
    pub content: String,
}

impl Chunk {
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
        }
    }
}

/// The declared JSON type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Object,
    Array,
    Any,
}

impl VariableType {
    /// Whether `value` is acceptable for this declared type.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        use serde_json::Value;
        match self {
            VariableType::Any => true,
            VariableType::String => value.is_string(),
            VariableType::Number => value.is_number(),
            VariableType::Boolean => value.is_boolean(),
            VariableType::Object => value.is_object(),
            VariableType::Array => matches!(value, Value::Array(_)),
        }
    }
}

impl std::fmt::Display for VariableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VariableType::String => "string",
            VariableType::Number => "number",
            VariableType::Boolean => "boolean",
            VariableType::Object => "object",
            VariableType::Array => "array",
            VariableType::Any => "any",
        };
        f.write_str(s)
    }
}

/// A declared runtime variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: VariableType,

    #[serde(default)]
    pub required: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
}

/// A tool declaration exactly as written in the manifest.
///
/// Declarations are kept as raw JSON because three input shapes are
/// accepted (vendor-native, `parameters`, `input_schema`); each provider
/// adapter classifies and translates them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ToolDeclaration(pub serde_json::Value);

impl ToolDeclaration {
    /// Build a declaration in the `parameters` shape.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self(serde_json::json!({
            "name": name.into(),
            "description": description.into(),
            "parameters": parameters,
        }))
    }

    /// The tool name, looked up in every accepted shape.
    pub fn name(&self) -> Option<&str> {
        let v = &self.0;
        v.get("name")
            .and_then(|n| n.as_str())
            .or_else(|| v.pointer("/function/name").and_then(|n| n.as_str()))
            .or_else(|| v.pointer("/toolSpec/name").and_then(|n| n.as_str()))
            .filter(|n| !n.is_empty())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// One model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier, e.g. "openai", "anthropic", "gemini", "bedrock"
    pub provider: String,

    /// Vendor model name
    pub model: String,

    /// Provider-specific parameters passed through verbatim
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub params: serde_json::Map<String, serde_json::Value>,
}

impl ModelConfig {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            params: serde_json::Map::new(),
        }
    }

    /// Display label, if the manifest supplied one.
    pub fn label(&self) -> Option<&str> {
        self.params.get(LABEL_PARAM).and_then(|v| v.as_str())
    }

    /// Parameters with the display-only label removed.
    pub fn vendor_params(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut params = self.params.clone();
        params.remove(LABEL_PARAM);
        params
    }
}

/// A named scenario with instructions the model can fetch on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub instructions: String,
}

impl Manifest {
    /// Parse a manifest from JSON text and validate it.
    pub fn from_json(text: &str) -> Result<Self, ManifestError> {
        let manifest: Self =
            serde_json::from_str(text).map_err(|e| ManifestError::Parse(e.to_string()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// The primary model configuration.
    pub fn primary_model(&self) -> Result<&ModelConfig, ManifestError> {
        self.models
            .first()
            .ok_or_else(|| ManifestError::MissingField("models".into()))
    }

    /// Look up a scenario by name.
    pub fn scenario(&self, name: &str) -> Option<&Scenario> {
        self.scenarios.iter().find(|s| s.name == name)
    }

    /// Whether a tool with this name is declared.
    pub fn declares_tool(&self, name: &str) -> bool {
        self.tools.iter().any(|t| t.name() == Some(name))
    }

    /// Validate every structural invariant.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.system.is_empty() {
            return Err(ManifestError::MissingField("system".into()));
        }
        if self.user.is_empty() {
            return Err(ManifestError::MissingField("user".into()));
        }
        if self.models.is_empty() {
            return Err(ManifestError::MissingField("models".into()));
        }

        for (i, model) in self.models.iter().enumerate() {
            if model.provider.trim().is_empty() {
                return Err(ManifestError::MissingField(format!("models[{i}].provider")));
            }
            if model.model.trim().is_empty() {
                return Err(ManifestError::MissingField(format!("models[{i}].model")));
            }
        }

        let mut seen = HashSet::new();
        for (i, var) in self.variables.iter().enumerate() {
            if var.name.trim().is_empty() {
                return Err(ManifestError::MissingField(format!("variables[{i}].name")));
            }
            if !seen.insert(var.name.as_str()) {
                return Err(ManifestError::Duplicate {
                    kind: "variable",
                    name: var.name.clone(),
                });
            }
            if let Some(default) = &var.default {
                if !var.kind.accepts(default) {
                    return Err(ManifestError::Invalid(format!(
                        "default for variable '{}' is not a {}",
                        var.name, var.kind
                    )));
                }
            }
        }

        let mut seen = HashSet::new();
        for (i, tool) in self.tools.iter().enumerate() {
            let name = tool
                .name()
                .ok_or_else(|| ManifestError::MissingField(format!("tools[{i}].name")))?;
            if !seen.insert(name) {
                return Err(ManifestError::Duplicate {
                    kind: "tool",
                    name: name.to_string(),
                });
            }
        }

        let mut seen = HashSet::new();
        for (i, scenario) in self.scenarios.iter().enumerate() {
            if scenario.name.trim().is_empty() {
                return Err(ManifestError::MissingField(format!("scenarios[{i}].name")));
            }
            if !seen.insert(scenario.name.as_str()) {
                return Err(ManifestError::Duplicate {
                    kind: "scenario",
                    name: scenario.name.clone(),
                });
            }
        }

        Ok(())
    }
}
