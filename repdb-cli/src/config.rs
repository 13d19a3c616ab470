use anyhow::Result;
use serde_derive::{Deserialize, Serialize};

pub const DEFAULT_PROMPT: &str = "repdb";

/// Settings loaded from an optional YAML file. Everything has a default, so
/// running without a config file is fine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLoad {
    version: u8,

    /// REPL prompt.
    pub prompt: Option<String>,

    /// Show elapsed seconds after a non-interactive run.
    pub show_stats: Option<bool>,

    /// Suppress everything that is not simulator output.
    pub quiet: Option<bool>,
}

impl Default for ConfigLoad {
    fn default() -> Self {
        ConfigLoad {
            version: 0,
            prompt: Some(DEFAULT_PROMPT.to_string()),
            show_stats: Some(false),
            quiet: Some(false),
        }
    }
}

impl ConfigLoad {
    /// Loads settings from the given file.
    pub fn new(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Interactive sessions get stats by default.
    pub fn terminal_update(&mut self) {
        self.show_stats = Some(true);
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet.unwrap_or(false)
    }

    pub fn is_show_stats(&self) -> bool {
        self.show_stats.unwrap_or(false)
    }
}
