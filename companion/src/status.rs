use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Connection state towards the game client.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum CompanionState {
    /// No lockfile found yet; searching on a fixed delay.
    Searching,
    /// Lockfile found; the event stream is being opened for the first time.
    Connecting,
    /// The event stream is open and subscribed.
    Connected,
    /// The event stream closed; reopening with the same credentials.
    Reconnecting,
}

/// Runtime status written to status.toml for the host shell.
/// The shell reads this file (read-only); the companion never reads it back.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct CompanionStatus {
    /// Binary version (set from Cargo.toml at compile time).
    pub version: String,
    pub state: CompanionState,
    /// Local API port of the discovered client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Last match phase reported by the client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    /// Page the shell should be showing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_url: Option<String>,
    /// RFC 3339 timestamp of the last navigation, so a re-dispatch is visible
    /// even when the URL repeats an earlier one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub navigated_at: Option<String>,
    /// Last transport error; cleared once the stream opens again.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CompanionStatus {
    /// Constructs the initial status on startup.
    pub fn new() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            state: CompanionState::Searching,
            port: None,
            phase: None,
            current_url: None,
            navigated_at: None,
            error: None,
        }
    }
}

impl Default for CompanionStatus {
    fn default() -> Self {
        Self::new()
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged, never propagated.
pub fn write_status(path: &Path, status: &CompanionStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!(dir = %parent.display(), error = %e, "failed to create status directory");
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!(error = %e, "failed to write status file");
            }
        }
        Err(e) => warn!(error = %e, "failed to serialize status"),
    }
}

// ── Host shell boundary ───────────────────────────────────────────────────────

/// The surface that owns the browser view. Navigation is fire-and-forget;
/// deduplication happens before this is called.
pub trait HostShell {
    fn navigate(&mut self, url: &str);

    /// Latest companion status. Called after every processed event.
    fn report(&mut self, _status: &CompanionStatus) {}
}

/// Shell bridge that publishes everything through status.toml. The window
/// process watches the file and loads `current_url` when it changes.
///
/// The shell owns `current_url` and `navigated_at`; whatever the controller
/// reports in those fields is overwritten with the last navigation received.
pub struct StatusFileShell {
    path: PathBuf,
    current_url: Option<String>,
    navigated_at: Option<String>,
    last_written: Option<CompanionStatus>,
}

impl StatusFileShell {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            current_url: None,
            navigated_at: None,
            last_written: None,
        }
    }

    fn publish(&mut self, mut status: CompanionStatus) {
        status.current_url = self.current_url.clone();
        status.navigated_at = self.navigated_at.clone();
        if self.last_written.as_ref() == Some(&status) {
            return;
        }
        write_status(&self.path, &status);
        self.last_written = Some(status);
    }
}

impl HostShell for StatusFileShell {
    /// Written through immediately so the window does not wait for the
    /// controller's next report.
    fn navigate(&mut self, url: &str) {
        self.current_url = Some(url.to_string());
        self.navigated_at = Some(chrono::Local::now().to_rfc3339());
        let base = self.last_written.clone().unwrap_or_default();
        self.publish(base);
    }

    fn report(&mut self, status: &CompanionStatus) {
        self.publish(status.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── CompanionStatus::new ──────────────────────────────────────────────────

    #[test]
    fn new_starts_searching() {
        let s = CompanionStatus::new();
        assert_eq!(s.state, CompanionState::Searching);
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn new_has_no_optional_fields() {
        let s = CompanionStatus::new();
        assert!(s.port.is_none());
        assert!(s.phase.is_none());
        assert!(s.current_url.is_none());
        assert!(s.navigated_at.is_none());
        assert!(s.error.is_none());
    }

    // ── serialization ─────────────────────────────────────────────────────────

    #[test]
    fn state_serializes_to_lowercase() {
        let mut s = CompanionStatus::new();
        for (state, expected) in [
            (CompanionState::Searching, "state = \"searching\""),
            (CompanionState::Connecting, "state = \"connecting\""),
            (CompanionState::Connected, "state = \"connected\""),
            (CompanionState::Reconnecting, "state = \"reconnecting\""),
        ] {
            s.state = state;
            assert!(toml::to_string_pretty(&s).unwrap().contains(expected));
        }
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.toml");
        write_status(&path, &CompanionStatus::new());
        assert!(path.exists());
    }

    #[test]
    fn write_status_omits_none_optional_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &CompanionStatus::new());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("port"));
        assert!(!content.contains("current_url"));
        assert!(!content.contains("error"));
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = CompanionStatus::new();
        original.state = CompanionState::Connected;
        original.port = Some(54321);
        original.current_url = Some("https://dpm.lol/Faker-KR1".to_string());

        write_status(&path, &original);

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: CompanionStatus = toml::from_str(&content).unwrap();
        assert_eq!(parsed, original);
    }

    // ── StatusFileShell ───────────────────────────────────────────────────────

    #[test]
    fn shell_skips_unchanged_status() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        let mut shell = StatusFileShell::new(path.clone());

        let mut status = CompanionStatus::new();
        shell.report(&status);
        assert!(path.exists());

        std::fs::remove_file(&path).unwrap();
        shell.report(&status);
        assert!(!path.exists(), "unchanged status should not be rewritten");

        status.state = CompanionState::Connected;
        shell.report(&status);
        assert!(path.exists());
    }

    #[test]
    fn navigate_publishes_url_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        let mut shell = StatusFileShell::new(path.clone());

        shell.navigate("https://dpm.lol/Faker-KR1");

        let written: CompanionStatus =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.current_url.as_deref(), Some("https://dpm.lol/Faker-KR1"));
        assert!(written.navigated_at.is_some());
        assert_eq!(written.state, CompanionState::Searching);
    }

    #[test]
    fn report_keeps_last_navigation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        let mut shell = StatusFileShell::new(path.clone());

        shell.navigate("https://dpm.lol/");
        let mut status = CompanionStatus::new();
        status.state = CompanionState::Connected;
        status.port = Some(54321);
        shell.report(&status);

        let written: CompanionStatus =
            toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written.state, CompanionState::Connected);
        assert_eq!(written.port, Some(54321));
        assert_eq!(written.current_url.as_deref(), Some("https://dpm.lol/"));
    }
}
