use crate::game::PeerInfo;
use crate::rpc::http::{get_json, http_client, post_json, post_unit};
use crate::rpc::RpcError;
use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::info;

/// Bootstrap view held by the tracker: board parameters and the current
/// (primary, backup) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerSnapshot {
    pub n: usize,
    pub k: usize,
    pub primary: Option<PeerInfo>,
    pub backup: Option<PeerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub player: PeerInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateServersRequest {
    pub primary: PeerInfo,
    pub backup: Option<PeerInfo>,
}

/// Tracker bookkeeping
/// The first player to register becomes primary; afterwards only
/// promotions change the pair
#[derive(Debug, Clone)]
pub struct TrackerBook {
    snapshot: TrackerSnapshot,
}

impl TrackerBook {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            snapshot: TrackerSnapshot {
                n,
                k,
                primary: None,
                backup: None,
            },
        }
    }

    /// Register a player; it is named primary when no primary is known
    pub fn register(&mut self, player: &PeerInfo) -> TrackerSnapshot {
        if self.snapshot.primary.is_none() {
            info!(player = %player.id, "No primary yet, assigning registering player");
            self.snapshot.primary = Some(player.clone());
        } else {
            info!(player = %player.id, "Player registered");
        }
        self.snapshot.clone()
    }

    /// Overwrite the (primary, backup) pair
    pub fn update_servers(&mut self, primary: PeerInfo, backup: Option<PeerInfo>) {
        info!(
            primary = %primary.id,
            backup = ?backup.as_ref().map(|b| b.id.to_string()),
            "Servers updated"
        );
        self.snapshot.primary = Some(primary);
        self.snapshot.backup = backup;
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        self.snapshot.clone()
    }
}

/// Calls a peer makes on the tracker
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn register(&self, player: &PeerInfo) -> Result<TrackerSnapshot, RpcError>;

    async fn update_servers(&self, primary: PeerInfo, backup: Option<PeerInfo>) -> Result<(), RpcError>;

    async fn get_tracker_state(&self) -> Result<TrackerSnapshot, RpcError>;
}

/// Tracker reached over HTTP
pub struct HttpTracker {
    tracker_url: String,
    client: Client,
}

impl HttpTracker {
    /// `tracker_url` like "http://10.0.0.1:9000"
    pub fn new(tracker_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            tracker_url: tracker_url.into(),
            client: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl TrackerApi for HttpTracker {
    async fn register(&self, player: &PeerInfo) -> Result<TrackerSnapshot, RpcError> {
        let body = RegisterRequest {
            player: player.clone(),
        };
        post_json(&self.client, &format!("{}/register", self.tracker_url), &body).await
    }

    async fn update_servers(&self, primary: PeerInfo, backup: Option<PeerInfo>) -> Result<(), RpcError> {
        let body = UpdateServersRequest { primary, backup };
        post_unit(&self.client, &format!("{}/update_servers", self.tracker_url), &body).await
    }

    async fn get_tracker_state(&self) -> Result<TrackerSnapshot, RpcError> {
        get_json(&self.client, &format!("{}/state", self.tracker_url)).await
    }
}

/// In-process tracker
/// Can be taken offline to exercise the retry paths
pub struct LocalTracker {
    book: Mutex<TrackerBook>,
    offline: AtomicBool,
}

impl LocalTracker {
    pub fn new(n: usize, k: usize) -> Self {
        Self {
            book: Mutex::new(TrackerBook::new(n, k)),
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn snapshot(&self) -> TrackerSnapshot {
        self.book.lock().await.snapshot()
    }

    fn check_online(&self) -> Result<(), RpcError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(RpcError::Unreachable("tracker offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl TrackerApi for LocalTracker {
    async fn register(&self, player: &PeerInfo) -> Result<TrackerSnapshot, RpcError> {
        self.check_online()?;
        Ok(self.book.lock().await.register(player))
    }

    async fn update_servers(&self, primary: PeerInfo, backup: Option<PeerInfo>) -> Result<(), RpcError> {
        self.check_online()?;
        self.book.lock().await.update_servers(primary, backup);
        Ok(())
    }

    async fn get_tracker_state(&self) -> Result<TrackerSnapshot, RpcError> {
        self.check_online()?;
        Ok(self.book.lock().await.snapshot())
    }
}
