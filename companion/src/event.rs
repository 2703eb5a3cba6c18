use std::fmt;

use crate::config::Config;
use crate::lcu::{ChampionDetail, GameflowPhase, PlayerIdentity};
use crate::lockfile::ConnectionInfo;
use crate::stream::LcuEvent;

/// Identifies one discovery of the game client. Every completion carries the
/// id it was issued under so results from a superseded client are dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
pub enum CompanionEvent {
    /// A lockfile search finished.
    Located(Option<ConnectionInfo>),
    /// The event stream connected and subscribed.
    StreamOpened(SessionId),
    /// A subscribed resource changed.
    StreamEvent(SessionId, LcuEvent),
    /// The stream reported a transport error. A `StreamClosed` always follows.
    StreamError(SessionId, String),
    StreamClosed(SessionId),
    PlayerFetched(SessionId, Option<PlayerIdentity>),
    PhaseFetched(SessionId, GameflowPhase),
    ChampionFetched(SessionId, ChampionDetail),
    /// The config file changed on disk and was successfully re-parsed.
    ConfigReloaded(Config),
    /// Ctrl+C received; close the stream and exit.
    Shutdown,
}
