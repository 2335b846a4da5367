use super::http::{
    ExecuteCommandRequest, InitPlayerRequest, PingResponse, SetPrimaryRequest, StateRequest, SyncResponse,
};
use super::{PeerApi, RpcError};
use crate::game::GameState;
use crate::peer::{NodeStatus, PeerNode};
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        match self {
            RpcError::Rejected(reason) => (StatusCode::CONFLICT, reason).into_response(),
            RpcError::Unreachable(reason) => (StatusCode::SERVICE_UNAVAILABLE, reason).into_response(),
        }
    }
}

/// Peer RPC routes served by every node
pub fn router(node: Arc<PeerNode>) -> Router {
    Router::new()
        .route("/init_player", post(init_player))
        .route("/execute_command", post(execute_command))
        .route("/ping", get(ping))
        .route("/sync_game_state", post(sync_game_state))
        .route("/promote_to_backup", post(promote_to_backup))
        .route("/set_primary", post(set_primary))
        .route("/status", get(status))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serve the peer RPC routes until the listener fails
pub async fn serve(listener: TcpListener, node: Arc<PeerNode>) -> Result<()> {
    let addr = listener.local_addr().context("Listener has no local address")?;
    info!(%addr, player = %node.id(), "Peer server listening");
    axum::serve(listener, router(node))
        .await
        .context("Peer server failed")
}

async fn init_player(
    State(node): State<Arc<PeerNode>>,
    Json(req): Json<InitPlayerRequest>,
) -> Result<Json<GameState>, RpcError> {
    node.init_player(req.player).await.map(Json)
}

async fn execute_command(
    State(node): State<Arc<PeerNode>>,
    Json(req): Json<ExecuteCommandRequest>,
) -> Result<Json<GameState>, RpcError> {
    node.execute_command(req.player, req.command).await.map(Json)
}

async fn ping(State(node): State<Arc<PeerNode>>) -> Result<Json<PingResponse>, RpcError> {
    let alive = node.ping().await?;
    Ok(Json(PingResponse { alive }))
}

async fn sync_game_state(
    State(node): State<Arc<PeerNode>>,
    Json(req): Json<StateRequest>,
) -> Result<Json<SyncResponse>, RpcError> {
    let applied = node.sync_game_state(req.state).await?;
    Ok(Json(SyncResponse { applied }))
}

async fn promote_to_backup(
    State(node): State<Arc<PeerNode>>,
    Json(req): Json<StateRequest>,
) -> Result<StatusCode, RpcError> {
    node.promote_to_backup(req.state).await?;
    Ok(StatusCode::OK)
}

async fn set_primary(
    State(node): State<Arc<PeerNode>>,
    Json(req): Json<SetPrimaryRequest>,
) -> Result<StatusCode, RpcError> {
    node.set_primary(req.primary).await?;
    Ok(StatusCode::OK)
}

async fn status(State(node): State<Arc<PeerNode>>) -> Json<NodeStatus> {
    Json(node.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::game::{Command, PeerInfo, PlayerId};
    use crate::peer::RoleState;
    use crate::rpc::http::{http_client, HttpDirectory, HttpPeer};
    use crate::tracker::LocalTracker;
    use std::time::Duration;

    fn pid(s: &str) -> PlayerId {
        s.parse().unwrap()
    }

    async fn serving_primary() -> (Arc<PeerNode>, PeerInfo) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let me = PeerInfo::new(pid("p1"), "127.0.0.1", port);

        let directory = HttpDirectory::new(Duration::from_millis(500)).unwrap();
        let tracker = Arc::new(LocalTracker::new(4, 2));
        let node = PeerNode::new(me.clone(), NodeConfig::default(), Arc::new(directory), tracker);
        assert_eq!(node.join().await.unwrap(), RoleState::Primary);

        tokio::spawn(serve(listener, node.clone()));
        (node, me)
    }

    #[tokio::test]
    async fn test_peer_calls_over_http() {
        let (_node, me) = serving_primary().await;
        let remote = HttpPeer::new(&me, http_client(Duration::from_secs(2)).unwrap());

        assert!(remote.ping().await.unwrap());

        let joiner = PeerInfo::new(pid("p2"), "127.0.0.1", 1);
        let state = remote.init_player(joiner).await.unwrap();
        assert!(state.contains(&pid("p2")));
        assert_eq!(state.backup(), Some(&pid("p2")));

        let after = remote.execute_command(pid("p2"), Command::Query).await.unwrap();
        assert_eq!(after.version(), state.version());
    }

    #[tokio::test]
    async fn test_rejection_maps_to_conflict() {
        let (_node, me) = serving_primary().await;
        let remote = HttpPeer::new(&me, http_client(Duration::from_secs(2)).unwrap());

        // The primary's own id cannot join a second time
        let err = remote.init_player(me.clone()).await.unwrap_err();
        assert!(matches!(err, RpcError::Rejected(_)));

        let err = remote.execute_command(pid("zz"), Command::MoveEast).await.unwrap_err();
        assert!(matches!(err, RpcError::Rejected(_)));
    }

    #[tokio::test]
    async fn test_status_route() {
        let (_node, me) = serving_primary().await;
        let client = http_client(Duration::from_secs(2)).unwrap();

        let status: NodeStatus = client
            .get(format!("http://{}/status", me.endpoint()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status.role, RoleState::Primary);
        assert_eq!(status.primary, Some(pid("p1")));
        assert_eq!(status.players, 1);
    }
}
