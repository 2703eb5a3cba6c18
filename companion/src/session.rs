/// Session context and controller.
///
/// The controller is the single consumer of [`CompanionEvent`]s. It owns all
/// mutable state (current connection info, reconnect counter, navigation
/// state, status) and turns each event into a list of [`Command`]s for the
/// runtime to carry out. It never performs I/O itself, so every transition can
/// be exercised without a network.
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::event::{CompanionEvent, SessionId};
use crate::lcu::{ChampSelectSession, GameflowPhase};
use crate::lockfile::ConnectionInfo;
use crate::navigation::{Navigator, Site};
use crate::paths;
use crate::status::{CompanionState, CompanionStatus};
use crate::stream::{LcuEvent, ReconnectDecision, ReconnectPolicy};

/// A local API read the runtime should issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LcuRequest {
    CurrentPlayer,
    GameflowPhase,
    Champion(i64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Search `candidates` for a lockfile after `after`.
    Locate {
        after: Duration,
        candidates: Vec<PathBuf>,
    },
    /// Open the event stream after `after`, replacing any previous stream.
    OpenStream {
        session: SessionId,
        connection: ConnectionInfo,
        after: Duration,
    },
    Fetch {
        session: SessionId,
        connection: ConnectionInfo,
        request: LcuRequest,
    },
    /// Hand `url` to the host shell.
    Navigate(String),
}

pub struct Controller {
    config: Config,
    session: SessionId,
    connection: Option<ConnectionInfo>,
    /// An `OpenStream` is outstanding and has not reported open yet.
    awaiting_open: bool,
    reconnect: ReconnectPolicy,
    navigator: Navigator,
    status: CompanionStatus,
}

impl Controller {
    pub fn new(config: Config) -> Self {
        let navigator = Navigator::new(Site::new(&config.site));
        let reconnect = ReconnectPolicy::new(config.stream.max_reconnect_attempts);
        Self {
            config,
            session: SessionId::default(),
            connection: None,
            awaiting_open: false,
            reconnect,
            navigator,
            status: CompanionStatus::new(),
        }
    }

    pub fn status(&self) -> &CompanionStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.connection.as_ref()
    }

    #[cfg(test)]
    pub fn session(&self) -> SessionId {
        self.session
    }

    #[cfg(test)]
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect.attempts()
    }

    #[cfg(test)]
    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Initial commands: show the home page and start looking for the client.
    pub fn start(&mut self) -> Vec<Command> {
        let mut commands = Vec::new();
        if let Some(url) = self.navigator.home() {
            commands.push(Command::Navigate(url));
        }
        commands.push(self.locate(Duration::ZERO));
        commands
    }

    pub fn handle(&mut self, event: CompanionEvent) -> Vec<Command> {
        match event {
            CompanionEvent::Located(found) => self.on_located(found),
            CompanionEvent::StreamOpened(session) => self.on_stream_opened(session),
            CompanionEvent::StreamEvent(session, event) => {
                if !self.is_current(session) {
                    debug!(%session, "dropping event from stale stream");
                    return Vec::new();
                }
                match event {
                    LcuEvent::ChampSelect(Some(champ_select)) => self.on_champ_select(&champ_select),
                    LcuEvent::ChampSelect(None) => Vec::new(),
                    LcuEvent::GameflowPhase(phase) => self.on_phase(phase),
                }
            }
            CompanionEvent::StreamError(session, message) => {
                if self.is_current(session) {
                    self.status.error = Some(message);
                }
                Vec::new()
            }
            CompanionEvent::StreamClosed(session) => self.on_stream_closed(session),
            CompanionEvent::PlayerFetched(session, player) => {
                if !self.is_current(session) {
                    debug!(%session, "discarding stale player response");
                    return Vec::new();
                }
                let Some(identity) = player else {
                    debug!("current player has no name or tag; not navigating");
                    return Vec::new();
                };
                self.navigator
                    .on_player(identity)
                    .map(|url| vec![Command::Navigate(url)])
                    .unwrap_or_default()
            }
            CompanionEvent::PhaseFetched(session, phase) => {
                if !self.is_current(session) {
                    debug!(%session, "discarding stale phase response");
                    return Vec::new();
                }
                self.on_phase(phase)
            }
            CompanionEvent::ChampionFetched(session, detail) => {
                if !self.is_current(session) {
                    debug!(%session, alias = %detail.alias, "discarding stale champion response");
                    return Vec::new();
                }
                self.navigator
                    .on_champion(&detail)
                    .map(|url| vec![Command::Navigate(url)])
                    .unwrap_or_default()
            }
            CompanionEvent::ConfigReloaded(config) => {
                self.apply_config(config);
                Vec::new()
            }
            // Shutdown is handled by the runtime loop.
            CompanionEvent::Shutdown => Vec::new(),
        }
    }

    fn apply_config(&mut self, config: Config) {
        self.navigator.set_site(Site::new(&config.site));
        self.reconnect
            .set_max_attempts(config.stream.max_reconnect_attempts);
        self.config = config;
    }

    /// Completions are only acted on while the connection info they were
    /// issued under is still the current one.
    fn is_current(&self, session: SessionId) -> bool {
        self.connection.is_some() && session == self.session
    }

    fn locate(&self, after: Duration) -> Command {
        Command::Locate {
            after,
            candidates: paths::lockfile_candidates(&self.config.discovery.extra_lockfile_dirs),
        }
    }

    fn fetch(&self, connection: &ConnectionInfo, request: LcuRequest) -> Command {
        Command::Fetch {
            session: self.session,
            connection: connection.clone(),
            request,
        }
    }

    fn on_located(&mut self, found: Option<ConnectionInfo>) -> Vec<Command> {
        if self.connection.is_some() {
            debug!("ignoring lockfile search result; already connected");
            return Vec::new();
        }
        let Some(connection) = found else {
            debug!(
                retry_secs = self.config.discovery.retry_secs,
                "game client not found; will retry"
            );
            self.status.state = CompanionState::Searching;
            return vec![self.locate(self.config.discovery.retry_delay())];
        };

        self.session = self.session.next();
        self.reconnect.reset();
        self.awaiting_open = true;
        self.status.state = CompanionState::Connecting;
        self.status.port = Some(connection.port);
        info!(session = %self.session, port = connection.port, "game client discovered");

        let commands = vec![
            self.fetch(&connection, LcuRequest::CurrentPlayer),
            Command::OpenStream {
                session: self.session,
                connection: connection.clone(),
                after: Duration::ZERO,
            },
        ];
        self.connection = Some(connection);
        commands
    }

    fn on_stream_opened(&mut self, session: SessionId) -> Vec<Command> {
        if !self.is_current(session) {
            debug!(%session, "ignoring open from stale stream");
            return Vec::new();
        }
        if !self.awaiting_open {
            warn!(%session, "ignoring duplicate stream open");
            return Vec::new();
        }
        self.awaiting_open = false;
        self.reconnect.on_open();
        self.status.state = CompanionState::Connected;
        self.status.error = None;

        // Catch a match that was already running before the stream existed.
        match &self.connection {
            Some(connection) => vec![self.fetch(connection, LcuRequest::GameflowPhase)],
            None => Vec::new(),
        }
    }

    fn on_stream_closed(&mut self, session: SessionId) -> Vec<Command> {
        if !self.is_current(session) {
            debug!(%session, "ignoring close from stale stream");
            return Vec::new();
        }
        self.awaiting_open = false;

        match self.reconnect.on_close() {
            ReconnectDecision::Retry { attempt } => {
                let Some(connection) = self.connection.clone() else {
                    return Vec::new();
                };
                info!(
                    attempt,
                    max = self.reconnect.max_attempts(),
                    delay_secs = self.config.stream.reconnect_delay_secs,
                    "event stream closed; reconnecting"
                );
                self.awaiting_open = true;
                self.status.state = CompanionState::Reconnecting;
                vec![Command::OpenStream {
                    session: self.session,
                    connection,
                    after: self.config.stream.reconnect_delay(),
                }]
            }
            ReconnectDecision::Exhausted => {
                warn!(
                    cooldown_secs = self.config.stream.rediscovery_cooldown_secs,
                    "maximum reconnection attempts reached; searching for the client again later"
                );
                self.connection = None;
                self.status.state = CompanionState::Searching;
                self.status.port = None;
                vec![self.locate(self.config.stream.rediscovery_cooldown())]
            }
        }
    }

    fn on_champ_select(&mut self, champ_select: &ChampSelectSession) -> Vec<Command> {
        let Some(champion_id) = self.navigator.on_champ_select(champ_select) else {
            return Vec::new();
        };
        match &self.connection {
            Some(connection) => vec![self.fetch(connection, LcuRequest::Champion(champion_id))],
            None => Vec::new(),
        }
    }

    fn on_phase(&mut self, phase: GameflowPhase) -> Vec<Command> {
        info!(?phase, "game flow phase");
        self.status.phase = Some(format!("{phase:?}"));
        if !self.navigator.on_phase(phase) {
            return Vec::new();
        }
        match &self.connection {
            Some(connection) => vec![self.fetch(connection, LcuRequest::CurrentPlayer)],
            None => Vec::new(),
        }
    }
}
