//! User settings file handling

use serde::Deserialize;

use super::paths::config_path;
use super::Result;

/// Main settings structure, read from `config.toml`
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Report output settings
    #[serde(default)]
    pub output: OutputConfig,

    /// HTTP action settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Shell action settings
    #[serde(default)]
    pub shell: ShellConfig,
}

/// Report output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OutputConfig {
    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,

    /// Colorize human-readable output
    #[serde(default = "default_color")]
    pub color: bool,

    /// Default verbosity: off, default, info, debug
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            color: default_color(),
            level: default_level(),
        }
    }
}

fn default_color() -> bool {
    true
}
fn default_level() -> String {
    "default".to_string()
}

/// HTTP action configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    /// Request timeout, independent of any step timeout
    #[serde(default = "default_http_timeout")]
    pub timeout_secs: u64,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_http_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    format!("crash/{}", env!("CARGO_PKG_VERSION"))
}

/// Shell action configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ShellConfig {
    /// Shell used to run commands
    #[serde(default = "default_shell")]
    pub program: String,

    /// Flag that makes the shell read the command from its argument
    #[serde(default = "default_shell_arg")]
    pub arg: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            program: default_shell(),
            arg: default_shell_arg(),
        }
    }
}

fn default_shell() -> String {
    "sh".to_string()
}
fn default_shell_arg() -> String {
    "-c".to_string()
}

impl Config {
    /// Load settings from the default config file
    ///
    /// Returns default settings if the file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    super::Error::FileRead {
                        path: path.display().to_string(),
                        error: e.to_string(),
                    }
                })?;
                return Self::parse(&content);
            }
        }
        Ok(Self::default())
    }

    /// Parse settings from TOML text
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }
}
