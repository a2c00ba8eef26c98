//! `agentrun render`: Print the rendered prompts.

use std::path::Path;

use agentrun_core::TemplateRenderer;

use super::{CliResult, VarArgs, load_manifest};

pub fn run(manifest_path: &Path, vars: &VarArgs) -> CliResult<()> {
    let manifest = load_manifest(manifest_path)?;
    let (system, user) = render(&manifest, &vars.bindings()?);

    println!("── system ──");
    println!("{system}");
    println!();
    println!("── user ──");
    println!("{user}");
    Ok(())
}

/// Render both prompts. Variable declarations are not enforced here, so
/// unbound placeholders stay visible.
pub fn render(
    manifest: &agentrun_core::Manifest,
    bindings: &agentrun_core::Bindings,
) -> (String, String) {
    let mut bindings = bindings.clone();
    for decl in &manifest.variables {
        if let Some(default) = &decl.default {
            bindings.entry(decl.name.clone()).or_insert_with(|| default.clone());
        }
    }

    let renderer = TemplateRenderer::new(&manifest.blocks);
    (
        renderer.render(&manifest.system, &bindings),
        renderer.render(&manifest.user, &bindings),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrun_core::{Bindings, Chunk, Manifest, ModelConfig, VariableDecl, VariableType};
    use serde_json::json;

    #[test]
    fn renders_blocks_defaults_and_bindings() {
        let mut manifest = Manifest {
            system: vec![
                Chunk::new("role", "You are {assistantName}."),
                Chunk::new("rules", "{component.rules}"),
            ],
            user: vec![Chunk::new("ask", "Help {who} in a {tone} tone.")],
            models: vec![ModelConfig::new("openai", "gpt-4o")],
            variables: vec![VariableDecl {
                name: "tone".into(),
                kind: VariableType::String,
                required: false,
                default: Some(json!("calm")),
            }],
            ..Manifest::default()
        };
        manifest
            .blocks
            .insert("rules".into(), "Be brief.".into());

        let mut bindings = Bindings::new();
        bindings.insert("assistantName".into(), json!("Bot"));

        let (system, user) = render(&manifest, &bindings);
        assert_eq!(system, "You are Bot.\n\nBe brief.");
        assert_eq!(user, "Help {who} in a calm tone.");
    }
}
