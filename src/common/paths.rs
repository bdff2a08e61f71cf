//! Configuration paths and Crashfile discovery

use std::path::{Path, PathBuf};

/// Name used for the platform config directory
const APP_NAME: &str = "crash";

/// Files searched for, in order, when no test file is given
pub const CRASHFILE_NAMES: [&str; 3] = ["Crashfile", "Crashfile.yml", "Crashfile.yaml"];

/// Get the configuration directory path
///
/// Uses the directories crate for platform-appropriate locations:
/// - Linux: `~/.config/crash/`
/// - macOS: `~/Library/Application Support/crash/`
/// - Windows: `%APPDATA%\crash\`
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Find the first Crashfile present in `dir`
pub fn find_crashfile(dir: &Path) -> Option<PathBuf> {
    CRASHFILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }

    #[test]
    fn test_find_crashfile_prefers_first_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("Crashfile.yaml"), "plans: []").unwrap();
        assert_eq!(
            find_crashfile(dir.path()).unwrap(),
            dir.path().join("Crashfile.yaml")
        );

        std::fs::write(dir.path().join("Crashfile"), "plans: []").unwrap();
        assert_eq!(find_crashfile(dir.path()).unwrap(), dir.path().join("Crashfile"));
    }

    #[test]
    fn test_find_crashfile_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_crashfile(dir.path()).is_none());
    }
}
