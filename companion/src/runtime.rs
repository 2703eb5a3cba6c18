/// Executes controller commands.
///
/// Every command either calls the host shell directly or spawns a task whose
/// only way back is posting a [`CompanionEvent`] into the controller's
/// channel. The runtime owns the single event stream handle; the controller
/// never sees it.
use rustls::ClientConfig;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::event::{CompanionEvent, SessionId};
use crate::lcu::LcuClient;
use crate::lockfile::{self, ConnectionInfo};
use crate::session::{Command, LcuRequest};
use crate::status::HostShell;
use crate::stream::{self, StreamHandle};

pub struct Runtime {
    tx: mpsc::Sender<CompanionEvent>,
    tls: Arc<ClientConfig>,
    client: Option<(SessionId, LcuClient)>,
    stream: Option<StreamHandle>,
}

impl Runtime {
    pub fn new(tx: mpsc::Sender<CompanionEvent>, tls: Arc<ClientConfig>) -> Self {
        Self {
            tx,
            tls,
            client: None,
            stream: None,
        }
    }

    pub fn execute(&mut self, command: Command, shell: &mut impl HostShell) {
        match command {
            Command::Locate { after, candidates } => self.locate(after, candidates),
            Command::OpenStream {
                session,
                connection,
                after,
            } => self.open_stream(session, connection, after),
            Command::Fetch {
                session,
                connection,
                request,
            } => self.fetch(session, &connection, request),
            Command::Navigate(url) => shell.navigate(&url),
        }
    }

    /// Closes the event stream, if any, and waits for its task to finish.
    pub async fn shutdown(&mut self) {
        if let Some(stream) = self.stream.take() {
            debug!(session = %stream.session(), "closing event stream");
            stream.close().await;
        }
    }

    fn locate(&self, after: Duration, candidates: Vec<PathBuf>) {
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(after).await;
            let found = match tokio::task::spawn_blocking(move || lockfile::locate(&candidates)).await {
                Ok(found) => found,
                Err(e) => {
                    error!(error = %e, "lockfile search task failed");
                    None
                }
            };
            let _ = tx.send(CompanionEvent::Located(found)).await;
        });
    }

    fn open_stream(&mut self, session: SessionId, connection: ConnectionInfo, after: Duration) {
        // Dropping the previous handle closes its socket if it is still open.
        if let Some(previous) = self.stream.take() {
            debug!(session = %previous.session(), "replacing event stream");
        }
        self.stream = Some(stream::spawn(
            session,
            connection,
            Arc::clone(&self.tls),
            self.tx.clone(),
            after,
        ));
    }

    fn fetch(&mut self, session: SessionId, connection: &ConnectionInfo, request: LcuRequest) {
        let Some(client) = self.client_for(session, connection) else {
            return;
        };
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let result = match request {
                LcuRequest::CurrentPlayer => client
                    .current_player()
                    .await
                    .map(|player| CompanionEvent::PlayerFetched(session, player)),
                LcuRequest::GameflowPhase => client
                    .gameflow_phase()
                    .await
                    .map(|phase| CompanionEvent::PhaseFetched(session, phase)),
                LcuRequest::Champion(champion_id) => client
                    .champion(champion_id)
                    .await
                    .map(|detail| CompanionEvent::ChampionFetched(session, detail)),
            };
            match result {
                Ok(event) => {
                    let _ = tx.send(event).await;
                }
                Err(e) => warn!(%session, ?request, error = %e, "local API request failed"),
            }
        });
    }

    /// One HTTP client per session; rebuilt when the session changes.
    fn client_for(&mut self, session: SessionId, connection: &ConnectionInfo) -> Option<LcuClient> {
        if let Some((cached, client)) = &self.client {
            if *cached == session {
                return Some(client.clone());
            }
        }
        match LcuClient::new(connection, &self.tls) {
            Ok(client) => {
                self.client = Some((session, client.clone()));
                Some(client)
            }
            Err(e) => {
                warn!(%session, error = %e, "failed to create local API client");
                None
            }
        }
    }
}
