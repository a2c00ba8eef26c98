//! `agentrun config`: Configuration helpers.

use agentrun_config::AppConfig;

#[derive(Debug, clap::Subcommand)]
pub enum ConfigAction {
    /// Print the default config file path
    Path,

    /// Write a default config file if none exists
    Init,

    /// Load and validate the config file
    Check,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_dir().join("config.toml");
    match action {
        ConfigAction::Path => println!("{}", path.display()),
        ConfigAction::Init => {
            if path.exists() {
                println!("Config already exists at {}", path.display());
                return Ok(());
            }
            std::fs::create_dir_all(AppConfig::config_dir())?;
            std::fs::write(&path, AppConfig::default_toml())?;
            println!("Wrote {}", path.display());
        }
        ConfigAction::Check => {
            let config = AppConfig::load().map_err(|e| format!("Config error: {e}"))?;
            println!("   ✅ Config is valid");
            let mut providers = config.providers.providers();
            providers.sort_unstable();
            println!("   Providers:  {}", providers.join(", "));
            println!("   Pricing:    {}", config.pricing.source_url.as_deref().unwrap_or("default rate"));
            println!("   Tracing:    {}", config.tracing.endpoint.as_deref().unwrap_or("disabled"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    #[test]
    fn config_path_is_valid() {
        let path = agentrun_config::AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains("config.toml"));
    }
}
