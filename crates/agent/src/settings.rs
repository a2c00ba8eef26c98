//! Execution limits and defaults.

use agentrun_config::ExecutionConfig;
use agentrun_core::ToolChoice;

/// Knobs for one execution, normally taken from `[execution]` config.
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Message-stack ceiling; reaching it aborts the run
    pub max_messages: usize,

    /// Failures of one tool after which its error becomes fatal
    pub max_tool_failures: u32,

    /// Nesting ceiling for block expansion
    pub max_block_depth: usize,

    /// Name of the terminating tool
    pub finish_tool: String,

    /// Tool choice for every turn not pinned by `forceNextTool`
    pub tool_choice: ToolChoice,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            max_messages: config.max_messages,
            max_tool_failures: config.max_tool_failures,
            max_block_depth: config.max_block_depth,
            finish_tool: config.finish_tool.clone(),
            tool_choice: ToolChoice::parse(&config.tool_choice),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let settings = ExecutionSettings::default();
        assert_eq!(settings.max_messages, 50);
        assert_eq!(settings.max_tool_failures, 3);
        assert_eq!(settings.max_block_depth, 50);
        assert_eq!(settings.finish_tool, "finish_agent_run");
        assert_eq!(settings.tool_choice, ToolChoice::Required);
    }

    #[test]
    fn tool_choice_is_parsed() {
        let config = ExecutionConfig {
            tool_choice: "auto".into(),
            ..ExecutionConfig::default()
        };
        assert_eq!(ExecutionSettings::from(&config).tool_choice, ToolChoice::Auto);
    }
}
