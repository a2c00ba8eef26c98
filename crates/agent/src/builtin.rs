//! Built-in tools: the terminating tool and the two scenario tools.

use agentrun_core::{Scenario, ToolDeclaration};
use serde_json::{Value, json};

pub const LIST_SCENARIOS: &str = "list_scenarios";
pub const GET_SCENARIO_INSTRUCTIONS: &str = "get_scenario_instructions";

/// Whether `name` is one of the scenario tools.
pub fn is_scenario_tool(name: &str) -> bool {
    name == LIST_SCENARIOS || name == GET_SCENARIO_INSTRUCTIONS
}

/// Declaration of the terminating tool.
pub fn finish_declaration(name: &str) -> ToolDeclaration {
    ToolDeclaration::new(
        name,
        "Call this when the task is complete. The arguments you pass become the final result of the run.",
        json!({
            "type": "object",
            "properties": {
                "result": {"description": "The final result of the task"}
            },
            "additionalProperties": true
        }),
    )
}

/// Declarations of the scenario tools.
pub fn scenario_declarations() -> Vec<ToolDeclaration> {
    vec![
        ToolDeclaration::new(
            LIST_SCENARIOS,
            "List the available scenarios with a short description of each.",
            json!({"type": "object", "properties": {}}),
        ),
        ToolDeclaration::new(
            GET_SCENARIO_INSTRUCTIONS,
            "Get the full instructions for one or more scenarios by name.",
            json!({
                "type": "object",
                "properties": {
                    "scenarios": {
                        "type": "array",
                        "items": {"type": "string"},
                        "description": "Scenario names, as returned by list_scenarios"
                    }
                },
                "required": ["scenarios"]
            }),
        ),
    ]
}

/// `list_scenarios`: names and descriptions.
pub fn list_scenarios(scenarios: &[Scenario]) -> Value {
    let items: Vec<Value> = scenarios
        .iter()
        .map(|s| json!({"name": s.name, "description": s.description}))
        .collect();
    json!({ "scenarios": items })
}

/// `get_scenario_instructions`: full instructions for the requested names.
///
/// A non-array argument or an unknown name yields an `error: true` result
/// the model can recover from.
pub fn get_scenario_instructions(scenarios: &[Scenario], arguments: &Value) -> Value {
    let Some(requested) = arguments.get("scenarios").and_then(|v| v.as_array()) else {
        return json!({
            "error": true,
            "message": "'scenarios' must be an array of scenario names"
        });
    };

    let mut found = Vec::new();
    let mut missing = Vec::new();
    for item in requested {
        let name = item.as_str().unwrap_or_default();
        match scenarios.iter().find(|s| s.name == name) {
            Some(s) => found.push(json!({"name": s.name, "instructions": s.instructions})),
            None => missing.push(item.as_str().map(String::from).unwrap_or_else(|| item.to_string())),
        }
    }

    if !missing.is_empty() {
        let available: Vec<&str> = scenarios.iter().map(|s| s.name.as_str()).collect();
        return json!({
            "error": true,
            "message": format!("Unknown scenario(s): {}", missing.join(", ")),
            "available": available,
        });
    }

    json!({ "scenarios": found })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenarios() -> Vec<Scenario> {
        vec![
            Scenario {
                name: "refund".into(),
                description: "Handle refunds".into(),
                instructions: "Check the order first.".into(),
            },
            Scenario {
                name: "upgrade".into(),
                description: "Plan upgrades".into(),
                instructions: "Compare tiers.".into(),
            },
        ]
    }

    #[test]
    fn lists_names_and_descriptions() {
        let out = list_scenarios(&scenarios());
        assert_eq!(out["scenarios"][0], json!({"name": "refund", "description": "Handle refunds"}));
        assert_eq!(out["scenarios"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn returns_requested_instructions() {
        let out = get_scenario_instructions(&scenarios(), &json!({"scenarios": ["upgrade"]}));
        assert_eq!(
            out,
            json!({"scenarios": [{"name": "upgrade", "instructions": "Compare tiers."}]})
        );
    }

    #[test]
    fn unknown_scenario_is_recoverable_error() {
        let out = get_scenario_instructions(&scenarios(), &json!({"scenarios": ["refund", "ghost"]}));
        assert_eq!(out["error"], true);
        assert!(out["message"].as_str().unwrap().contains("ghost"));
        assert_eq!(out["available"], json!(["refund", "upgrade"]));
    }

    #[test]
    fn non_array_argument_is_recoverable_error() {
        let out = get_scenario_instructions(&scenarios(), &json!({"scenarios": "refund"}));
        assert_eq!(out["error"], true);
    }

    #[test]
    fn declarations_are_named() {
        assert_eq!(finish_declaration("finish_agent_run").name(), Some("finish_agent_run"));
        let names: Vec<_> = scenario_declarations().iter().map(|d| d.name().unwrap().to_string()).collect();
        assert_eq!(names, vec![LIST_SCENARIOS, GET_SCENARIO_INSTRUCTIONS]);
        assert!(is_scenario_tool(LIST_SCENARIOS));
        assert!(!is_scenario_tool("finish_agent_run"));
    }
}
