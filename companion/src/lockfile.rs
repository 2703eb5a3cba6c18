/// Locating and parsing the game client's `lockfile`.
///
/// The client writes a single line `name:pid:port:password:protocol` when it
/// starts. The file only exists while the client is running, so callers retry
/// [`locate`] on a fixed delay until it yields a connection.
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Fixed user name the local API expects in Basic auth.
pub const AUTH_USER: &str = "riot";
const LOCKFILE_FIELDS: usize = 5;

#[derive(Debug, Error)]
pub enum LockfileError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("expected 5 colon-separated fields, found {0}")]
    FieldCount(usize),
    #[error("invalid port {0:?}")]
    InvalidPort(String),
    #[error("password field is empty")]
    EmptyPassword,
}

/// Connection parameters for the local API, captured from one lockfile.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl ConnectionInfo {
    /// Value for the `Authorization` header on both HTTP and WebSocket requests.
    pub fn basic_auth(&self) -> String {
        let credential = format!("{AUTH_USER}:{}", self.password);
        format!("Basic {}", BASE64.encode(credential))
    }

    pub fn api_base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }

    /// `wss` for the `https` the client writes; plain `ws` for any other protocol.
    pub fn stream_url(&self) -> String {
        let scheme = if self.protocol == "https" { "wss" } else { "ws" };
        format!("{scheme}://127.0.0.1:{}", self.port)
    }
}

// The password is a live credential; keep it out of logs.
impl fmt::Debug for ConnectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionInfo")
            .field("port", &self.port)
            .field("password", &"<redacted>")
            .field("protocol", &self.protocol)
            .finish()
    }
}

impl FromStr for ConnectionInfo {
    type Err = LockfileError;

    fn from_str(content: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = content.trim().split(':').collect();
        if fields.len() != LOCKFILE_FIELDS {
            return Err(LockfileError::FieldCount(fields.len()));
        }
        let port = fields[2]
            .parse::<u16>()
            .map_err(|_| LockfileError::InvalidPort(fields[2].to_string()))?;
        if fields[3].is_empty() {
            return Err(LockfileError::EmptyPassword);
        }
        Ok(Self {
            port,
            password: fields[3].to_string(),
            protocol: fields[4].to_string(),
        })
    }
}

/// Reads and parses the lockfile at `path`.
pub fn read(path: &Path) -> Result<ConnectionInfo, LockfileError> {
    let content = std::fs::read_to_string(path).map_err(|source| LockfileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    content.parse()
}

/// Tries `candidates` in order and returns the first lockfile that parses.
///
/// Missing files are expected (the client is not installed there) and only
/// logged at debug level. Unreadable or malformed files are logged and skipped.
pub fn locate(candidates: &[PathBuf]) -> Option<ConnectionInfo> {
    for path in candidates {
        if !path.exists() {
            debug!(path = %path.display(), "no lockfile");
            continue;
        }
        match read(path) {
            Ok(info) => {
                info!(path = %path.display(), port = info.port, "found game client lockfile");
                return Some(info);
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unusable lockfile"),
        }
    }
    None
}
