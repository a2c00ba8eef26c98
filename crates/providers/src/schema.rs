//! Tool declaration shapes.
//!
//! Manifests may declare tools in any of several shapes. [`classify`] is a
//! pure discriminator that maps a raw declaration to a [`ToolShape`]; each
//! adapter passes its own native shape through untouched and rebuilds the
//! others from the extracted [`ToolSignature`].

use serde_json::{Value, json};
use tracing::warn;

/// Name, description and JSON schema common to every shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolSignature {
    pub name: String,
    pub description: String,
    pub schema: Value,
}

/// The recognized declaration shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolShape {
    /// `{"type": "function", "function": {name, description, parameters}}`
    OpenAiFunction(ToolSignature),
    /// `{"toolSpec": {name, description, inputSchema: {json}}}`
    BedrockToolSpec(ToolSignature),
    /// `{name, description, parameters}`
    Parameters(ToolSignature),
    /// `{name, description, input_schema}`
    InputSchema(ToolSignature),
    /// Anything else; adapters wrap it on a best-effort basis.
    Unrecognized(Value),
}

fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(String::from)
}

fn signature(holder: &Value, schema: Option<&Value>) -> Option<ToolSignature> {
    Some(ToolSignature {
        name: str_field(holder, "name").filter(|n| !n.is_empty())?,
        description: str_field(holder, "description").unwrap_or_default(),
        schema: schema.cloned().unwrap_or_else(empty_object_schema),
    })
}

/// `{"type": "object", "properties": {}}`
pub fn empty_object_schema() -> Value {
    json!({ "type": "object", "properties": {} })
}

/// Classify a raw tool declaration.
pub fn classify(decl: &Value) -> ToolShape {
    if let Some(function) = decl.get("function").filter(|f| f.is_object()) {
        if decl.get("type").and_then(|t| t.as_str()).unwrap_or("function") == "function" {
            if let Some(sig) = signature(function, function.get("parameters")) {
                return ToolShape::OpenAiFunction(sig);
            }
        }
    }

    if let Some(spec) = decl.get("toolSpec").filter(|s| s.is_object()) {
        let schema = spec
            .get("inputSchema")
            .map(|s| s.get("json").unwrap_or(s));
        if let Some(sig) = signature(spec, schema) {
            return ToolShape::BedrockToolSpec(sig);
        }
    }

    if let Some(params) = decl.get("parameters") {
        if let Some(sig) = signature(decl, Some(params)) {
            return ToolShape::Parameters(sig);
        }
    }

    if let Some(schema) = decl.get("input_schema") {
        if let Some(sig) = signature(decl, Some(schema)) {
            return ToolShape::InputSchema(sig);
        }
    }

    ToolShape::Unrecognized(decl.clone())
}

impl ToolShape {
    /// The signature of this declaration, wrapping unrecognized shapes.
    pub fn into_signature(self) -> ToolSignature {
        match self {
            ToolShape::OpenAiFunction(sig)
            | ToolShape::BedrockToolSpec(sig)
            | ToolShape::Parameters(sig)
            | ToolShape::InputSchema(sig) => sig,
            ToolShape::Unrecognized(value) => best_effort_signature(&value),
        }
    }
}

/// Wrap a declaration that matched no known shape.
///
/// Keeps `name`/`description` when present and treats the remaining object
/// as the schema if it looks like one.
pub fn best_effort_signature(value: &Value) -> ToolSignature {
    let name = str_field(value, "name")
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "unnamed_tool".into());
    warn!(tool = %name, "Unrecognized tool declaration shape, wrapping best-effort");

    let schema = match value.as_object() {
        Some(obj) if obj.contains_key("type") || obj.contains_key("properties") => {
            let mut obj = obj.clone();
            obj.remove("name");
            obj.remove("description");
            Value::Object(obj)
        }
        _ => empty_object_schema(),
    };

    ToolSignature {
        name,
        description: str_field(value, "description").unwrap_or_default(),
        schema,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn search_schema() -> Value {
        json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]})
    }

    #[test]
    fn classifies_openai_function() {
        let decl = json!({
            "type": "function",
            "function": {"name": "search", "description": "Search", "parameters": search_schema()}
        });
        match classify(&decl) {
            ToolShape::OpenAiFunction(sig) => {
                assert_eq!(sig.name, "search");
                assert_eq!(sig.schema, search_schema());
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn classifies_bedrock_tool_spec() {
        let decl = json!({
            "toolSpec": {"name": "search", "description": "Search", "inputSchema": {"json": search_schema()}}
        });
        let sig = match classify(&decl) {
            ToolShape::BedrockToolSpec(sig) => sig,
            other => panic!("unexpected shape: {other:?}"),
        };
        assert_eq!(sig.schema, search_schema());
    }

    #[test]
    fn classifies_parameters_and_input_schema() {
        let params = json!({"name": "a", "description": "A", "parameters": search_schema()});
        let input = json!({"name": "b", "description": "B", "input_schema": search_schema()});
        assert!(matches!(classify(&params), ToolShape::Parameters(_)));
        assert!(matches!(classify(&input), ToolShape::InputSchema(_)));
    }

    #[test]
    fn unknown_shape_falls_back() {
        let decl = json!({"name": "loose", "type": "object", "properties": {"x": {"type": "number"}}});
        let shape = classify(&decl);
        assert!(matches!(shape, ToolShape::Unrecognized(_)));
        let sig = shape.into_signature();
        assert_eq!(sig.name, "loose");
        assert_eq!(sig.schema["properties"]["x"]["type"], "number");
        assert!(sig.schema.get("name").is_none());
    }

    #[test]
    fn unknown_shape_without_schema_gets_empty_object() {
        let sig = classify(&json!({"name": "bare", "description": "Bare tool"})).into_signature();
        assert_eq!(sig.description, "Bare tool");
        assert_eq!(sig.schema, empty_object_schema());
    }

    #[test]
    fn missing_name_is_unrecognized() {
        let decl = json!({"parameters": search_schema()});
        assert!(matches!(classify(&decl), ToolShape::Unrecognized(_)));
        assert_eq!(classify(&decl).into_signature().name, "unnamed_tool");
    }
}
