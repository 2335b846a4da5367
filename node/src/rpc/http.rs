use super::{PeerApi, PeerDirectory, RpcError};
use crate::game::{Command, GameState, PeerInfo, PlayerId};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

// ============= Wire Types =============

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitPlayerRequest {
    pub player: PeerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteCommandRequest {
    pub player: PlayerId,
    pub command: Command,
}

/// Body of sync_game_state and promote_to_backup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRequest {
    pub state: GameState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPrimaryRequest {
    pub primary: PeerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingResponse {
    pub alive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncResponse {
    pub applied: bool,
}

/// Build the HTTP client shared by all outgoing calls of a node
pub fn http_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .build()
        .context("Failed to build HTTP client")
}

/// Map a response to success, Rejected (409) or Unreachable (anything else)
async fn check(response: Response) -> Result<Response, RpcError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status == StatusCode::CONFLICT {
        Err(RpcError::Rejected(body))
    } else {
        Err(RpcError::Unreachable(format!("{}: {}", status, body)))
    }
}

fn transport_error(url: &str, e: reqwest::Error) -> RpcError {
    RpcError::Unreachable(format!("{} failed: {}", url, e))
}

pub(crate) async fn post_json<B, T>(client: &Client, url: &str, body: &B) -> Result<T, RpcError>
where
    B: Serialize + ?Sized,
    T: DeserializeOwned,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;
    check(response)
        .await?
        .json()
        .await
        .map_err(|e| transport_error(url, e))
}

pub(crate) async fn post_unit<B>(client: &Client, url: &str, body: &B) -> Result<(), RpcError>
where
    B: Serialize + ?Sized,
{
    let response = client
        .post(url)
        .json(body)
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;
    check(response).await.map(|_| ())
}

pub(crate) async fn get_json<T: DeserializeOwned>(client: &Client, url: &str) -> Result<T, RpcError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, e))?;
    check(response)
        .await?
        .json()
        .await
        .map_err(|e| transport_error(url, e))
}

/// HTTP connection to a single peer's RPC server
pub struct HttpPeer {
    base_url: String,
    client: Client,
}

impl HttpPeer {
    pub fn new(peer: &PeerInfo, client: Client) -> Self {
        Self {
            base_url: format!("http://{}", peer.endpoint()),
            client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

#[async_trait]
impl PeerApi for HttpPeer {
    async fn init_player(&self, player: PeerInfo) -> Result<GameState, RpcError> {
        post_json(&self.client, &self.url("init_player"), &InitPlayerRequest { player }).await
    }

    async fn execute_command(&self, player: PlayerId, command: Command) -> Result<GameState, RpcError> {
        let body = ExecuteCommandRequest { player, command };
        post_json(&self.client, &self.url("execute_command"), &body).await
    }

    async fn ping(&self) -> Result<bool, RpcError> {
        let response: PingResponse = get_json(&self.client, &self.url("ping")).await?;
        Ok(response.alive)
    }

    async fn sync_game_state(&self, state: GameState) -> Result<bool, RpcError> {
        let response: SyncResponse =
            post_json(&self.client, &self.url("sync_game_state"), &StateRequest { state }).await?;
        Ok(response.applied)
    }

    async fn promote_to_backup(&self, state: GameState) -> Result<(), RpcError> {
        post_unit(&self.client, &self.url("promote_to_backup"), &StateRequest { state }).await
    }

    async fn set_primary(&self, primary: PeerInfo) -> Result<(), RpcError> {
        post_unit(&self.client, &self.url("set_primary"), &SetPrimaryRequest { primary }).await
    }
}

/// Directory of HTTP peers
/// Caches one handle per player id; a player that comes back on a new
/// address gets a fresh handle
#[derive(Clone)]
pub struct HttpDirectory {
    client: Client,
    peers: Arc<RwLock<HashMap<PlayerId, (String, Arc<HttpPeer>)>>>,
}

impl HttpDirectory {
    /// Create a directory whose calls time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: http_client(timeout)?,
            peers: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Number of cached peer handles
    #[cfg(test)]
    pub(crate) async fn len(&self) -> usize {
        self.peers.read().await.len()
    }
}

#[async_trait]
impl PeerDirectory for HttpDirectory {
    async fn resolve(&self, peer: &PeerInfo) -> Arc<dyn PeerApi> {
        let endpoint = peer.endpoint();
        {
            let peers = self.peers.read().await;
            if let Some((cached_endpoint, handle)) = peers.get(&peer.id) {
                if *cached_endpoint == endpoint {
                    return handle.clone();
                }
            }
        }

        let handle = Arc::new(HttpPeer::new(peer, self.client.clone()));
        self.peers
            .write()
            .await
            .insert(peer.id.clone(), (endpoint, handle.clone()));
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(id: &str, port: u16) -> PeerInfo {
        PeerInfo::new(id.parse().unwrap(), "127.0.0.1", port)
    }

    #[tokio::test]
    async fn test_directory_caches_by_id() {
        let directory = HttpDirectory::new(Duration::from_millis(200)).unwrap();

        directory.resolve(&peer("p1", 7001)).await;
        directory.resolve(&peer("p1", 7001)).await;
        directory.resolve(&peer("p2", 7002)).await;
        assert_eq!(directory.len().await, 2);

        // Same id on a new port replaces the cached handle
        directory.resolve(&peer("p1", 7999)).await;
        assert_eq!(directory.len().await, 2);
        let peers = directory.peers.read().await;
        assert_eq!(peers.get(&"p1".parse().unwrap()).unwrap().0, "127.0.0.1:7999");
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let directory = HttpDirectory::new(Duration::from_millis(200)).unwrap();
        // Port 1 is never a peer server
        let handle = directory.resolve(&peer("p1", 1)).await;

        let err = handle.ping().await.unwrap_err();
        assert!(err.is_unreachable());
    }

    #[test]
    fn test_request_serialization() {
        let body = ExecuteCommandRequest {
            player: "p1".parse().unwrap(),
            command: Command::MoveEast,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"player\":\"p1\""));
        assert!(json.contains("\"command\":\"move_east\""));
    }
}
