/// Canonical file locations used by the companion.
///
/// Two groups of paths live here:
///   - the companion's own data directory (config.toml, status.toml), under the
///     platform config dir (`%APPDATA%\DPM Companion\` on Windows)
///   - the ordered list of directories where the game client may have written
///     its `lockfile`
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "DPM Companion";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";

pub const LOCKFILE_NAME: &str = "lockfile";
const CLIENT_SUBDIR: &str = "Riot Games/League of Legends";

const WINDOWS_C_INSTALL_DIR: &str = "C:/Riot Games/League of Legends";
const WINDOWS_D_INSTALL_DIR: &str = "D:/Riot Games/League of Legends";
const MACOS_INSTALL_DIR: &str = "/Applications/League of Legends.app/Contents/LoL";

/// Returns the companion data directory, e.g. %APPDATA%\DPM Companion\
pub fn app_data_dir() -> Result<PathBuf> {
    let base = dirs::config_dir().context("No platform config directory available")?;
    Ok(base.join(APP_DIR_NAME))
}

/// Returns the full path to the config file inside `app_dir`.
pub fn config_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(CONFIG_FILE_NAME)
}

/// Returns the full path to the status file inside `app_dir`.
pub fn status_file_path(app_dir: &Path) -> PathBuf {
    app_dir.join(STATUS_FILE_NAME)
}

/// Built-in install directories in search order. The local-app-data entry is
/// skipped when the platform does not provide one.
pub fn default_install_dirs(local_app_data: Option<&Path>) -> Vec<PathBuf> {
    let mut dirs = vec![
        PathBuf::from(WINDOWS_C_INSTALL_DIR),
        PathBuf::from(WINDOWS_D_INSTALL_DIR),
    ];
    if let Some(base) = local_app_data {
        dirs.push(base.join(CLIENT_SUBDIR));
    }
    dirs.push(PathBuf::from(MACOS_INSTALL_DIR));
    dirs
}

/// Full lockfile paths to search, built-in locations first, then `extra_dirs`.
pub fn lockfile_candidates(extra_dirs: &[PathBuf]) -> Vec<PathBuf> {
    let local_app_data = dirs::data_local_dir();
    default_install_dirs(local_app_data.as_deref())
        .into_iter()
        .chain(extra_dirs.iter().cloned())
        .map(|dir| dir.join(LOCKFILE_NAME))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_install_dirs_order_with_local_app_data() {
        let dirs = default_install_dirs(Some(Path::new("/home/u/AppData/Local")));
        assert_eq!(
            dirs,
            vec![
                PathBuf::from(WINDOWS_C_INSTALL_DIR),
                PathBuf::from(WINDOWS_D_INSTALL_DIR),
                PathBuf::from("/home/u/AppData/Local").join(CLIENT_SUBDIR),
                PathBuf::from(MACOS_INSTALL_DIR),
            ]
        );
    }

    #[test]
    fn default_install_dirs_without_local_app_data() {
        let dirs = default_install_dirs(None);
        assert_eq!(dirs.len(), 3);
        assert_eq!(dirs[2], PathBuf::from(MACOS_INSTALL_DIR));
    }

    #[test]
    fn lockfile_candidates_append_extras_last() {
        let extra = PathBuf::from("/opt/league");
        let candidates = lockfile_candidates(std::slice::from_ref(&extra));
        assert_eq!(candidates.last(), Some(&extra.join(LOCKFILE_NAME)));
        assert!(candidates.iter().all(|p| p.file_name().unwrap() == LOCKFILE_NAME));
        assert_eq!(
            candidates.first(),
            Some(&PathBuf::from(WINDOWS_C_INSTALL_DIR).join(LOCKFILE_NAME))
        );
    }

    #[test]
    fn config_and_status_share_same_parent_dir() {
        let dir = Path::new("/tmp/app");
        assert_eq!(config_file_path(dir).parent(), status_file_path(dir).parent());
        assert_eq!(config_file_path(dir).file_name().unwrap(), CONFIG_FILE_NAME);
        assert_eq!(status_file_path(dir).file_name().unwrap(), STATUS_FILE_NAME);
    }
}
