use super::{NodeState, PeerNode, RoleState};
use crate::game::{PeerInfo, PlayerId};
use crate::rpc::RpcError;
use tracing::{debug, info, warn};

impl PeerNode {
    /// Pick a new backup and repoint everyone else at this primary.
    ///
    /// Candidates are scanned in ascending id order. The first one that
    /// accepts promote_to_backup becomes the backup; every later one gets
    /// set_primary. Candidates that turn out unreachable are dropped from the
    /// game. The tracker learns the outcome last.
    pub(crate) async fn run_promotion(&self, s: &mut NodeState) {
        let candidates = s.peers_except(&[&self.me.id]);
        let mut chosen: Option<PlayerId> = None;
        let mut dead = Vec::new();

        for candidate in candidates {
            if chosen.is_none() {
                match self.try_promote(s, &candidate).await {
                    Ok(()) => {
                        info!(backup = %candidate.id, "Promoted new backup");
                        chosen = Some(candidate.id);
                    }
                    Err(e) if e.is_unreachable() => {
                        // A timed-out call may still have landed. Such a node keeps
                        // acting as backup until its commands come back rejected.
                        warn!(candidate = %candidate.id, error = %e, "Backup candidate unreachable");
                        dead.push(candidate.id);
                    }
                    Err(e) => warn!(candidate = %candidate.id, error = %e, "Backup candidate refused"),
                }
                continue;
            }

            let handle = self.directory.resolve(&candidate).await;
            match handle.set_primary(self.me.clone()).await {
                Ok(()) => debug!(player = %candidate.id, "Announced primary"),
                Err(e) if e.is_unreachable() => {
                    warn!(player = %candidate.id, error = %e, "Player unreachable during announcement");
                    dead.push(candidate.id);
                }
                Err(e) => warn!(player = %candidate.id, error = %e, "Primary announcement refused"),
            }
        }

        if chosen.is_none() {
            info!("No backup available");
        }
        if !dead.is_empty() {
            for id in &dead {
                s.exit_player(id);
            }
            info!(removed = dead.len(), "Dropped unreachable players");
            self.replicate(s);
        }
        self.notify_tracker(s).await;
    }

    /// Offer the backup role to one candidate, with a snapshot naming it as
    /// backup. The assignment is undone when the candidate fails.
    pub(crate) async fn try_promote(&self, s: &mut NodeState, candidate: &PeerInfo) -> Result<(), RpcError> {
        s.game.assign_backup(Some(candidate.id.clone()));
        let handle = self.directory.resolve(candidate).await;
        let result = handle.promote_to_backup(s.game.clone()).await;
        if result.is_err() {
            s.game.assign_backup(None);
        }
        result
    }

    /// [Backup] The primary stopped answering: take over
    pub(crate) async fn handle_primary_down(&self, dead: &PlayerId) {
        let mut s = self.inner.lock().await;
        if s.role != RoleState::Backup || s.game.primary() != Some(dead) {
            debug!(primary = %dead, "Primary failure already handled");
            return;
        }

        warn!(primary = %dead, "Primary is down, taking over");
        s.exit_player(dead);
        s.game.assign_primary(Some(self.me.id.clone()));
        s.primary_hint = None;
        s.transition(RoleState::Primary, &self.me.id);
        let me = self.me.id.clone();
        s.record = s.game.player(&me).cloned();

        self.run_promotion(&mut s).await;
        self.ensure_heartbeat(&mut s);
    }

    /// [Primary] The backup stopped answering: drop it and pick another
    pub(crate) async fn handle_backup_down(&self, dead: &PlayerId) {
        let mut s = self.inner.lock().await;
        if s.role != RoleState::Primary || s.game.backup() != Some(dead) {
            debug!(backup = %dead, "Backup failure already handled");
            return;
        }

        warn!(backup = %dead, "Backup is down, choosing another");
        s.exit_player(dead);
        self.run_promotion(&mut s).await;
    }

    /// [Primary] Push the current state to the backup without waiting
    pub(crate) fn replicate(&self, s: &NodeState) {
        let Some(backup) = s.backup_peer() else {
            return;
        };
        if backup.id == self.me.id {
            return;
        }

        let directory = self.directory.clone();
        let state = s.game.clone();
        tokio::spawn(async move {
            let handle = directory.resolve(&backup).await;
            match handle.sync_game_state(state).await {
                Ok(true) => debug!(backup = %backup.id, "Backup synced"),
                Ok(false) => debug!(backup = %backup.id, "Backup kept a newer state"),
                Err(e) => warn!(backup = %backup.id, error = %e, "Failed to sync backup"),
            }
        });
    }

    /// [Primary] Push the current state to the backup and wait for the answer
    pub(crate) async fn replicate_now(&self, s: &NodeState) {
        let Some(backup) = s.backup_peer() else {
            return;
        };
        let handle = self.directory.resolve(&backup).await;
        if let Err(e) = handle.sync_game_state(s.game.clone()).await {
            warn!(backup = %backup.id, error = %e, "Failed to sync backup");
        }
    }

    /// [Primary] Publish (self, backup) to the tracker
    pub(crate) async fn notify_tracker(&self, s: &NodeState) {
        let backup = s.backup_peer();
        match self.tracker.update_servers(self.me.clone(), backup).await {
            Ok(()) => debug!("Tracker updated"),
            Err(e) => warn!(error = %e, "Failed to update tracker"),
        }
    }
}
