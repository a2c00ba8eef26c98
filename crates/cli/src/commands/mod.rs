//! CLI command implementations and their shared input handling.

pub mod config;
pub mod render;
pub mod run;
pub mod validate;

use std::path::{Path, PathBuf};

use agentrun_core::{Bindings, ContentPart, Manifest, ManifestError};
use base64::Engine;
use serde_json::Value;

pub type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

/// Variable flags shared by `run` and `render`.
#[derive(Debug, Default, clap::Args)]
pub struct VarArgs {
    /// Variable binding as key=value; the value is parsed as JSON when it can be
    #[arg(long = "var", value_name = "KEY=VALUE")]
    pub vars: Vec<String>,

    /// JSON object file with variable bindings; --var entries override it
    #[arg(long = "vars", value_name = "FILE")]
    pub vars_file: Option<PathBuf>,
}

impl VarArgs {
    pub fn bindings(&self) -> CliResult<Bindings> {
        let mut bindings = match &self.vars_file {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
                match serde_json::from_str::<Value>(&text)? {
                    Value::Object(map) => map,
                    _ => return Err(format!("{} must contain a JSON object", path.display()).into()),
                }
            }
            None => Bindings::new(),
        };

        for pair in &self.vars {
            let (key, value) = parse_var(pair)?;
            bindings.insert(key, value);
        }
        Ok(bindings)
    }
}

/// Split `key=value`. Values that parse as JSON keep their type; anything
/// else is a string.
pub fn parse_var(pair: &str) -> CliResult<(String, Value)> {
    let (key, raw) = pair
        .split_once('=')
        .ok_or_else(|| format!("Invalid --var '{pair}': expected KEY=VALUE"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("Invalid --var '{pair}': empty key").into());
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
    Ok((key.to_string(), value))
}

/// Load and validate a manifest from a `.json` or `.toml` file.
pub fn load_manifest(path: &Path) -> CliResult<Manifest> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read manifest {}: {e}", path.display()))?;

    let manifest = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let manifest: Manifest =
                toml::from_str(&text).map_err(|e| ManifestError::Parse(e.to_string()))?;
            manifest.validate()?;
            manifest
        }
        _ => Manifest::from_json(&text)?,
    };
    Ok(manifest)
}

/// Read an image file into an inline content part.
pub fn load_attachment(path: &Path) -> CliResult<ContentPart> {
    let media_type = media_type_for(path)
        .ok_or_else(|| format!("Unsupported attachment type: {}", path.display()))?;
    let bytes = std::fs::read(path)
        .map_err(|e| format!("Failed to read attachment {}: {e}", path.display()))?;
    Ok(ContentPart::Image {
        media_type: media_type.to_string(),
        data: base64::engine::general_purpose::STANDARD.encode(bytes),
    })
}

fn media_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}
