use std::path::{Path, PathBuf};
use std::sync::Once;

use crate::defaults::{DEFAULT_CONFIG_DIR, RUN_LOCK_FILE};

static CREATE_DIR_WARNED: Once = Once::new();

/// Resolve the eoflow home directory.
///
/// Priority:
/// 1) EOFLOW_HOME
/// 2) HOME/USERPROFILE
/// 3) ./.eoflow
pub fn eoflow_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("EOFLOW_HOME") {
        return PathBuf::from(override_path);
    }
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".eoflow");
    }
    PathBuf::from(".").join(".eoflow")
}

fn ensure_home_dir(home: &Path) {
    if let Err(err) = std::fs::create_dir_all(home) {
        CREATE_DIR_WARNED.call_once(|| {
            eprintln!(
                "Warning: failed to create eoflow home directory {}: {}. Set EOFLOW_HOME.",
                home.display(),
                err
            );
        });
    }
}

/// Default logs directory: ~/.eoflow/logs
pub fn default_logs_dir() -> PathBuf {
    let home = eoflow_home();
    ensure_home_dir(&home);
    home.join("logs")
}

/// Resolve a CLI profile argument to a config file.
///
/// A value that already names an existing file (or ends in `.toml`) is used
/// as-is; anything else is looked up as `{config_dir}/{profile}.toml`.
pub fn resolve_profile_path(config_dir: &Path, profile: &str) -> PathBuf {
    let literal = PathBuf::from(profile);
    if literal.is_file() || profile.ends_with(".toml") {
        return literal;
    }
    config_dir.join(format!("{profile}.toml"))
}

/// Default config directory: ./configs
pub fn default_config_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CONFIG_DIR)
}

/// Run lock path inside a state directory.
pub fn run_lock_path(state_dir: &Path) -> PathBuf {
    state_dir.join(RUN_LOCK_FILE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_lookup_in_config_dir() {
        let resolved = resolve_profile_path(Path::new("/etc/eoflow"), "prod");
        assert_eq!(resolved, PathBuf::from("/etc/eoflow/prod.toml"));
    }

    #[test]
    fn test_profile_literal_path() {
        let temp = tempfile::TempDir::new().unwrap();
        let file = temp.path().join("custom.conf");
        std::fs::write(&file, "").unwrap();

        let resolved = resolve_profile_path(Path::new("ignored"), file.to_str().unwrap());
        assert_eq!(resolved, file);

        let resolved = resolve_profile_path(Path::new("ignored"), "other/gmi.toml");
        assert_eq!(resolved, PathBuf::from("other/gmi.toml"));
    }
}
