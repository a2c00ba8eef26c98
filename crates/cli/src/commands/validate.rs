//! `agentrun validate`: Check a manifest and summarize it.

use std::path::Path;

use super::{CliResult, load_manifest};

pub fn run(manifest_path: &Path) -> CliResult<()> {
    println!("🔍 Validating {}...", manifest_path.display());

    let manifest = match load_manifest(manifest_path) {
        Ok(manifest) => manifest,
        Err(e) => {
            println!("   ❌ {e}");
            return Err(e);
        }
    };
    println!("   ✅ Manifest is valid");
    println!();

    let primary = manifest.primary_model()?;
    println!(
        "   Name:       {}",
        manifest.name.as_deref().or(manifest.id.as_deref()).unwrap_or("(unnamed)")
    );
    println!("   Model:      {}/{}", primary.provider, primary.model);
    if manifest.models.len() > 1 {
        println!("   Fallbacks:  {} (not used)", manifest.models.len() - 1);
    }
    println!("   Variables:  {}", manifest.variables.len());
    println!("   Tools:      {}", manifest.tools.len());
    println!("   Blocks:     {}", manifest.blocks.len());
    println!("   Scenarios:  {}", manifest.scenarios.len());
    Ok(())
}
