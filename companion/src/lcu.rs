/// Request/response client for the game client's local API.
///
/// Only the handful of fields the companion consumes are modelled. Every call
/// is a plain authenticated GET against `127.0.0.1:{port}`; a non-success
/// status or an undecodable body is an error for that single call and is
/// never retried here.
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use rustls::ClientConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::lockfile::ConnectionInfo;

pub const CURRENT_SUMMONER_PATH: &str = "/lol-summoner/v1/current-summoner";
pub const GAMEFLOW_PHASE_PATH: &str = "/lol-gameflow/v1/gameflow-phase";
const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum LcuError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("invalid credential header")]
    Credential,
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{path} returned {status}")]
    Status { path: String, status: StatusCode },
    #[error("{path} returned an unexpected body: {source}")]
    Decode {
        path: String,
        #[source]
        source: reqwest::Error,
    },
}

// ── Wire types ────────────────────────────────────────────────────────────────

/// The signed-in player's Riot ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerIdentity {
    pub display_name: String,
    pub tag: String,
}

/// Subset of `/lol-summoner/v1/current-summoner`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentSummoner {
    #[serde(default)]
    pub game_name: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub tag_line: Option<String>,
}

impl CurrentSummoner {
    /// Prefers `gameName`, falling back to `displayName`. Empty strings count
    /// as absent. Returns `None` unless both a name and a tag are present.
    pub fn into_identity(self) -> Option<PlayerIdentity> {
        let non_empty = |s: Option<String>| s.filter(|v| !v.is_empty());
        let display_name = non_empty(self.game_name).or_else(|| non_empty(self.display_name))?;
        let tag = non_empty(self.tag_line)?;
        Some(PlayerIdentity { display_name, tag })
    }
}

/// Match phase as reported by `/lol-gameflow/v1/gameflow-phase`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum GameflowPhase {
    None,
    Lobby,
    Matchmaking,
    CheckedIntoTournament,
    ReadyCheck,
    ChampSelect,
    GameStart,
    FailedToLaunch,
    InProgress,
    Reconnect,
    WaitingForStats,
    PreEndOfGame,
    EndOfGame,
    TerminatedInError,
    #[serde(other)]
    Unknown,
}

impl GameflowPhase {
    /// Only an active match drives navigation.
    pub fn is_live(self) -> bool {
        self == GameflowPhase::InProgress
    }
}

/// One entry of `myTeam` in a champion-select session.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub cell_id: i64,
    #[serde(default)]
    pub champion_id: i64,
}

/// Subset of `/lol-champ-select/v1/session`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChampSelectSession {
    #[serde(default)]
    pub local_player_cell_id: Option<i64>,
    #[serde(rename = "myTeam", default)]
    pub team: Vec<TeamMember>,
}

impl ChampSelectSession {
    /// Champion the local player has selected, if any. Hover and empty slots
    /// report `0` or a negative id and are treated as no selection.
    pub fn local_champion_id(&self) -> Option<i64> {
        let cell_id = self.local_player_cell_id?;
        self.team
            .iter()
            .find(|member| member.cell_id == cell_id)
            .map(|member| member.champion_id)
            .filter(|&id| id > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChampionDetail {
    pub alias: String,
}

pub fn champion_path(champion_id: i64) -> String {
    format!("/lol-game-data/assets/v1/champions/{champion_id}.json")
}

// ── Client ────────────────────────────────────────────────────────────────────

/// HTTP client bound to one discovered [`ConnectionInfo`]. Cheap to clone.
#[derive(Clone)]
pub struct LcuClient {
    http: reqwest::Client,
    base_url: String,
    auth: HeaderValue,
}

impl LcuClient {
    pub fn new(connection: &ConnectionInfo, tls: &Arc<ClientConfig>) -> Result<Self, LcuError> {
        let http = reqwest::Client::builder()
            .use_preconfigured_tls(ClientConfig::clone(tls))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(LcuError::Client)?;
        let mut auth =
            HeaderValue::from_str(&connection.basic_auth()).map_err(|_| LcuError::Credential)?;
        auth.set_sensitive(true);
        Ok(Self {
            http,
            base_url: connection.api_base_url(),
            auth,
        })
    }

    #[cfg(test)]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, LcuError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path, "local API request");
        let response = self
            .http
            .get(&url)
            .header(AUTHORIZATION, self.auth.clone())
            .send()
            .await
            .map_err(|source| LcuError::Request {
                path: path.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(LcuError::Status {
                path: path.to_string(),
                status,
            });
        }
        response.json().await.map_err(|source| LcuError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// `Ok(None)` when the summoner is known but has no usable name or tag.
    pub async fn current_player(&self) -> Result<Option<PlayerIdentity>, LcuError> {
        let summoner: CurrentSummoner = self.get_json(CURRENT_SUMMONER_PATH).await?;
        Ok(summoner.into_identity())
    }

    pub async fn gameflow_phase(&self) -> Result<GameflowPhase, LcuError> {
        self.get_json(GAMEFLOW_PHASE_PATH).await
    }

    pub async fn champion(&self, champion_id: i64) -> Result<ChampionDetail, LcuError> {
        self.get_json(&champion_path(champion_id)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn summoner(json: &str) -> CurrentSummoner {
        serde_json::from_str(json).unwrap()
    }

    // ── CurrentSummoner ───────────────────────────────────────────────────────

    #[test]
    fn identity_from_game_name_and_tag() {
        let identity = summoner(r#"{"gameName":"Faker","tagLine":"KR1"}"#)
            .into_identity()
            .unwrap();
        assert_eq!(identity.display_name, "Faker");
        assert_eq!(identity.tag, "KR1");
    }

    #[test]
    fn identity_falls_back_to_display_name() {
        let identity = summoner(r#"{"gameName":"","displayName":"Old Name","tagLine":"EUW"}"#)
            .into_identity()
            .unwrap();
        assert_eq!(identity.display_name, "Old Name");
    }

    #[test]
    fn identity_requires_tag() {
        assert!(summoner(r#"{"gameName":"Faker"}"#).into_identity().is_none());
        assert!(summoner(r#"{"gameName":"Faker","tagLine":""}"#).into_identity().is_none());
    }

    #[test]
    fn identity_requires_some_name() {
        assert!(summoner(r#"{"tagLine":"KR1","summonerLevel":30}"#)
            .into_identity()
            .is_none());
    }

    // ── GameflowPhase ─────────────────────────────────────────────────────────

    #[test]
    fn phase_parses_known_and_unknown_values() {
        let live: GameflowPhase = serde_json::from_str(r#""InProgress""#).unwrap();
        assert!(live.is_live());
        let lobby: GameflowPhase = serde_json::from_str(r#""Lobby""#).unwrap();
        assert_eq!(lobby, GameflowPhase::Lobby);
        let future: GameflowPhase = serde_json::from_str(r#""SomeNewPhase""#).unwrap();
        assert_eq!(future, GameflowPhase::Unknown);
    }

    #[test]
    fn only_in_progress_is_live() {
        for phase in [
            GameflowPhase::None,
            GameflowPhase::Lobby,
            GameflowPhase::ChampSelect,
            GameflowPhase::GameStart,
            GameflowPhase::Reconnect,
            GameflowPhase::EndOfGame,
            GameflowPhase::Unknown,
        ] {
            assert!(!phase.is_live(), "{phase:?} should not be live");
        }
    }

    // ── ChampSelectSession ────────────────────────────────────────────────────

    #[test]
    fn local_champion_found_by_cell_id() {
        let session: ChampSelectSession = serde_json::from_str(
            r#"{"localPlayerCellId":2,"myTeam":[{"cellId":1,"championId":7},{"cellId":2,"championId":103}]}"#,
        )
        .unwrap();
        assert_eq!(session.local_champion_id(), Some(103));
    }

    #[test]
    fn unselected_champion_is_ignored() {
        for id in [0, -1] {
            let session = ChampSelectSession {
                local_player_cell_id: Some(0),
                team: vec![TeamMember { cell_id: 0, champion_id: id }],
            };
            assert_eq!(session.local_champion_id(), None);
        }
    }

    #[test]
    fn missing_local_player_yields_nothing() {
        let session: ChampSelectSession =
            serde_json::from_str(r#"{"localPlayerCellId":4,"myTeam":[{"cellId":1,"championId":7}]}"#)
                .unwrap();
        assert_eq!(session.local_champion_id(), None);

        let no_cell: ChampSelectSession =
            serde_json::from_str(r#"{"myTeam":[{"cellId":0,"championId":7}]}"#).unwrap();
        assert_eq!(no_cell.local_champion_id(), None);
    }

    // ── Champion detail ───────────────────────────────────────────────────────

    #[test]
    fn champion_detail_ignores_extra_fields() {
        let detail: ChampionDetail =
            serde_json::from_str(r#"{"id":103,"name":"Ahri","alias":"Ahri","title":"the Nine-Tailed Fox"}"#)
                .unwrap();
        assert_eq!(detail.alias, "Ahri");
        assert_eq!(champion_path(103), "/lol-game-data/assets/v1/champions/103.json");
    }

    // ── LcuClient ─────────────────────────────────────────────────────────────

    #[test]
    fn client_targets_discovered_port() {
        let tls = crate::tls::loopback_client_config().unwrap();
        let connection: ConnectionInfo = "LeagueClientUx:1:54321:abc123:https".parse().unwrap();
        let client = LcuClient::new(&connection, &tls).unwrap();
        assert_eq!(client.base_url(), "https://127.0.0.1:54321");
        assert!(client.auth.is_sensitive());
    }

    #[tokio::test]
    async fn unreachable_port_is_a_request_error() {
        let tls = crate::tls::loopback_client_config().unwrap();
        // Bind then drop a listener to get a port nothing is listening on.
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };
        let connection = ConnectionInfo {
            port,
            password: "pw".to_string(),
            protocol: "https".to_string(),
        };
        let client = LcuClient::new(&connection, &tls).unwrap();
        let err = client.gameflow_phase().await.unwrap_err();
        assert!(matches!(err, LcuError::Request { .. }));
    }

    /// Serves one canned HTTP/1.1 response on loopback. The task yields the raw
    /// request head it received.
    async fn serve_once(status: &'static str, body: &'static str) -> (u16, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut buf = [0u8; 1024];
            while !head.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                head.extend_from_slice(&buf[..n]);
            }
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&head).into_owned()
        });
        (port, task)
    }

    fn plain_client(port: u16) -> LcuClient {
        let tls = crate::tls::loopback_client_config().unwrap();
        let connection = ConnectionInfo {
            port,
            password: "abc123".to_string(),
            protocol: "http".to_string(),
        };
        LcuClient::new(&connection, &tls).unwrap()
    }

    #[tokio::test]
    async fn current_player_sends_credential_and_parses_identity() {
        let (port, server) = serve_once("200 OK", r#"{"gameName":"Faker","tagLine":"KR1"}"#).await;
        let player = plain_client(port).current_player().await.unwrap();
        assert_eq!(
            player,
            Some(PlayerIdentity {
                display_name: "Faker".to_string(),
                tag: "KR1".to_string(),
            })
        );

        let head = server.await.unwrap().to_ascii_lowercase();
        assert!(head.starts_with("get /lol-summoner/v1/current-summoner http/1.1"));
        assert!(head.contains("authorization: basic cmlvdDphYmMxMjM="));
    }

    #[tokio::test]
    async fn non_success_status_is_a_status_error() {
        let (port, _server) = serve_once("404 Not Found", "").await;
        let err = plain_client(port).gameflow_phase().await.unwrap_err();
        assert!(matches!(
            err,
            LcuError::Status { ref path, status } if path == GAMEFLOW_PHASE_PATH && status == StatusCode::NOT_FOUND
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let (port, _server) = serve_once("200 OK", "{bad}").await;
        let err = plain_client(port).champion(103).await.unwrap_err();
        assert!(matches!(err, LcuError::Decode { ref path, .. } if path == &champion_path(103)));
    }
}
