/// Turns game-client observations into page navigations.
///
/// The resolver holds only three pieces of state: the last identity seen, the
/// live-match flag, and the last URL handed to the host shell. Every method is
/// a pure transition: it updates that state and returns what should happen
/// next. Nothing here touches the network.
use tracing::{debug, info};

use crate::lcu::{ChampSelectSession, ChampionDetail, GameflowPhase, PlayerIdentity};

/// URL templates for the remote site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    host: String,
}

impl Site {
    pub fn new(host: &str) -> Self {
        let host = host
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_end_matches('/');
        Self {
            host: host.to_string(),
        }
    }

    pub fn home(&self) -> String {
        format!("https://{}/", self.host)
    }

    /// `None` when either part of the Riot ID is empty; a partial URL would
    /// land on someone else's page.
    pub fn player(&self, identity: &PlayerIdentity) -> Option<String> {
        if identity.display_name.is_empty() || identity.tag.is_empty() {
            return None;
        }
        Some(format!(
            "https://{}/{}-{}",
            self.host,
            encode_uri_component(&identity.display_name),
            identity.tag
        ))
    }

    pub fn live(&self, identity: &PlayerIdentity) -> Option<String> {
        self.player(identity).map(|url| format!("{url}/live"))
    }

    pub fn champion_build(&self, alias: &str) -> Option<String> {
        if alias.is_empty() {
            return None;
        }
        Some(format!("https://{}/champions/{alias}/build", self.host))
    }
}

/// Percent-encodes everything except `A-Z a-z 0-9 - _ . ! ~ * ' ( )`, the
/// unreserved set browsers leave alone in a path component.
pub fn encode_uri_component(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for byte in input.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => out.push(byte as char),
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[derive(Debug)]
pub struct Navigator {
    site: Site,
    last_identity: Option<PlayerIdentity>,
    live: bool,
    last_dispatched: Option<String>,
}

impl Navigator {
    pub fn new(site: Site) -> Self {
        Self {
            site,
            last_identity: None,
            live: false,
            last_dispatched: None,
        }
    }

    /// Applies to targets computed after the call; does not re-navigate.
    pub fn set_site(&mut self, site: Site) {
        self.site = site;
    }

    #[cfg(test)]
    pub fn last_dispatched(&self) -> Option<&str> {
        self.last_dispatched.as_deref()
    }

    #[cfg(test)]
    pub fn last_identity(&self) -> Option<&PlayerIdentity> {
        self.last_identity.as_ref()
    }

    #[cfg(test)]
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn home(&mut self) -> Option<String> {
        let target = self.site.home();
        self.dispatch(target)
    }

    /// A fresh identity snapshot. Targets the live page while a match is in
    /// progress, the profile page otherwise.
    pub fn on_player(&mut self, identity: PlayerIdentity) -> Option<String> {
        let target = if self.live {
            self.site.live(&identity)
        } else {
            self.site.player(&identity)
        };
        if self.last_identity.as_ref() != Some(&identity) {
            info!(
                player = %identity.display_name,
                tag = %identity.tag,
                "signed-in player changed"
            );
            self.last_identity = Some(identity);
        }
        self.dispatch(target?)
    }

    /// Returns the champion to look up, if the local player has locked one.
    pub fn on_champ_select(&self, session: &ChampSelectSession) -> Option<i64> {
        let champion_id = session.local_champion_id()?;
        debug!(champion_id, "champion selected");
        Some(champion_id)
    }

    pub fn on_champion(&mut self, detail: &ChampionDetail) -> Option<String> {
        let target = self.site.champion_build(&detail.alias)?;
        self.dispatch(target)
    }

    /// Records the phase. Returns `true` when the caller should refresh the
    /// player identity so the live page can be built. Leaving a match clears
    /// the live flag but never navigates away.
    pub fn on_phase(&mut self, phase: GameflowPhase) -> bool {
        self.live = phase.is_live();
        self.live
    }

    fn dispatch(&mut self, target: String) -> Option<String> {
        if self.last_dispatched.as_deref() == Some(target.as_str()) {
            debug!(url = %target, "already at target");
            return None;
        }
        info!(url = %target, "navigating");
        self.last_dispatched = Some(target.clone());
        Some(target)
    }
}
