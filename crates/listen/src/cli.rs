use std::path::{Path, PathBuf};

use clap::Parser;
use pl_client::ClientConfig;

/// Listen to a pushline event stream and print every event as a JSON line.
#[derive(Debug, Parser)]
#[command(name = "pushline-listen", version, about)]
pub struct Cli {
    /// Path to the TOML config (default: $PUSHLINE_CONFIG or pushline.toml).
    #[arg(long, short)]
    pub config: Option<PathBuf>,
    /// Override `base_url` from the config file.
    #[arg(long)]
    pub base_url: Option<String>,
    /// Override `token` from the config file.
    #[arg(long)]
    pub token: Option<String>,
    /// Override `client_id` from the config file.
    #[arg(long)]
    pub client_id: Option<String>,
    /// Exit after this many application events.
    #[arg(long)]
    pub max_events: Option<u64>,
    /// Emit logs as JSON instead of compact text.
    #[arg(long)]
    pub json_logs: bool,
}

impl Cli {
    /// The config file to read: the flag, then `PUSHLINE_CONFIG`, then
    /// `pushline.toml` in the working directory.
    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| {
            std::env::var("PUSHLINE_CONFIG")
                .unwrap_or_else(|_| "pushline.toml".into())
                .into()
        })
    }

    /// Apply command-line overrides on top of the file config.
    pub fn apply(&self, config: &mut ClientConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.token = token.clone();
        }
        if let Some(id) = &self.client_id {
            config.client_id = id.clone();
        }
    }
}

/// Load the config file.  A missing file yields the defaults, so every
/// required field can come from flags alone.
pub fn load_config(path: &Path) -> anyhow::Result<ClientConfig> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file; using defaults");
        return Ok(ClientConfig::default());
    }
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("reading {}: {e}", path.display()))?;
    toml::from_str(&raw).map_err(|e| anyhow::anyhow!("parsing {}: {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_file_values() {
        let cli = Cli::parse_from([
            "pushline-listen",
            "--base-url",
            "http://localhost:9000",
            "--token",
            "cli-token",
        ]);
        let mut config: ClientConfig = toml::from_str(
            r#"
base_url = "https://push.example.com"
token = "file-token"
client_id = "desk-1"
"#,
        )
        .unwrap();
        cli.apply(&mut config);

        assert_eq!(config.base_url, "http://localhost:9000");
        assert_eq!(config.token, "cli-token");
        assert_eq!(config.client_id, "desk-1");
    }

    #[test]
    fn explicit_config_path_wins() {
        let cli = Cli::parse_from(["pushline-listen", "-c", "/etc/pushline/listen.toml"]);
        assert_eq!(cli.config_path(), PathBuf::from("/etc/pushline/listen.toml"));
        assert!(!cli.json_logs);
        assert_eq!(cli.max_events, None);
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = load_config(Path::new("/nonexistent/pushline.toml")).unwrap();
        assert_eq!(config.stream_path, "stream");
        assert!(config.base_url.is_empty());
    }
}
