use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use system::{
    now_millis, resolve_claim, CellState, ClaimError, ClaimOutcome, ClientMessage, Grid,
    GridDimensions, ServerMessage, SessionId, SessionInfo,
};

use crate::broadcast::{self, ConnectionTx, DeliveryError, Fanout};
use crate::connection::ConnectionEvent;
use crate::session::SessionRegistry;

/// Every mutation is a single assignment under the lock, so a poisoned lock
/// never guards half-applied state.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStats {
    pub total_cells: usize,
    pub claimed_cells: usize,
    pub unclaimed_cells: usize,
    pub connected_users: usize,
    pub active_users: Vec<SessionId>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub evicted: Vec<SessionId>,
    pub live_count: usize,
}

/// Shared state behind every connection. Locks are always taken grid first,
/// registry second.
///
/// Cell updates are queued while the grid lock is held and count updates
/// while the registry lock is held, so each session sees both in commit
/// order. Queuing never waits on a socket; the connection actors do the
/// actual writes.
pub struct Server {
    grid: Mutex<Grid>,
    registry: Mutex<SessionRegistry>,
}

impl Server {
    pub fn new(dimensions: GridDimensions) -> Self {
        Self::with_registry(dimensions, SessionRegistry::new())
    }

    pub fn with_registry(dimensions: GridDimensions, registry: SessionRegistry) -> Self {
        Self {
            grid: Mutex::new(Grid::new(dimensions)),
            registry: Mutex::new(registry),
        }
    }

    /// Registers a session, queues its `init_state` and tells everyone else
    /// the new count.
    pub fn connect(&self, tx: ConnectionTx) -> SessionInfo {
        let grid = lock(&self.grid);
        let mut registry = lock(&self.registry);

        let session = registry.register(tx, Instant::now());
        let info = session.info();
        let tx = session.tx().clone();
        let count = registry.live_count();
        let init_delivery = broadcast::send_to(
            &tx,
            &ServerMessage::InitState {
                you: info.clone(),
                grid: grid.cells().map(CellState::from).collect(),
                connected_users: count,
            },
        );
        drop(grid);

        log::info!("Session {} connected ({} online)", info.user_id, count);
        if let Err(err) = init_delivery {
            log::warn!("Failed to queue initial state for {}: {}", info.user_id, err);
            registry.mark_delivery_failed(&info.user_id);
        }
        publish_count(&mut registry, Some(&info.user_id));
        info
    }

    /// Removes a session and broadcasts the new count. Returns `false` if the
    /// session was already gone.
    pub fn disconnect(&self, session_id: &SessionId) -> bool {
        let mut registry = lock(&self.registry);
        match registry.unregister(session_id) {
            Some(_) => {
                log::info!(
                    "Session {} disconnected ({} online)",
                    session_id,
                    registry.live_count()
                );
                publish_count(&mut registry, None);
                true
            }
            None => false,
        }
    }

    pub fn touch(&self, session_id: &SessionId) -> bool {
        self.touch_at(session_id, Instant::now())
    }

    pub fn touch_at(&self, session_id: &SessionId, now: Instant) -> bool {
        lock(&self.registry).touch(session_id, now)
    }

    /// Entry point for a text frame: counts as a liveness signal, then any
    /// reply is queued for the sender.
    pub fn handle_frame(&self, from: &SessionId, text: &str) {
        self.touch(from);
        let reply = match ClientMessage::from_json(text) {
            Ok(message) => self.handle_client_message(from, message),
            Err(err) => {
                log::warn!("Malformed frame from {}: {}", from, err);
                Some(ServerMessage::error(format!("invalid message: {}", err)))
            }
        };
        if let Some(reply) = reply {
            self.send_to(from, &reply);
        }
    }

    /// Returns the reply for the sender, if any. Broadcasts happen inside.
    pub fn handle_client_message(
        &self,
        from: &SessionId,
        message: ClientMessage,
    ) -> Option<ServerMessage> {
        match message {
            ClientMessage::Join => {
                log::info!("Session {} joined", from);
                None
            }
            ClientMessage::Ping => Some(ServerMessage::Pong),
            ClientMessage::ClaimCell { cell_id } => match self.claim(from, cell_id) {
                Ok(ClaimOutcome::Accepted(_)) | Ok(ClaimOutcome::AlreadyOwned) => None,
                Ok(ClaimOutcome::Rejected(reason)) => {
                    Some(ServerMessage::claim_rejected(cell_id, reason))
                }
                Err(err) => {
                    log::debug!("Invalid claim from {} on {}: {}", from, cell_id, err);
                    Some(ServerMessage::error(err.to_string()))
                }
            },
        }
    }

    /// Resolves a claim and, when it commits, broadcasts `cell_updated` to
    /// every open session including the claimant.
    pub fn claim(&self, from: &SessionId, cell_id: i64) -> Result<ClaimOutcome, ClaimError> {
        let mut grid = lock(&self.grid);
        let (outcome, targets) = {
            let registry = lock(&self.registry);
            let outcome = resolve_claim(&mut *grid, &*registry, from, cell_id, now_millis())?;
            let targets = match outcome {
                ClaimOutcome::Accepted(_) => registry.targets(None),
                _ => Vec::new(),
            };
            (outcome, targets)
        };

        let fanout = match &outcome {
            ClaimOutcome::Accepted(cell) => {
                log::debug!("Session {} claimed cell {}", from, cell.index);
                ServerMessage::cell_updated(cell)
                    .map(|message| broadcast::publish(&targets, &message, None))
                    .unwrap_or_default()
            }
            ClaimOutcome::Rejected(reason) => {
                log::debug!("Session {} rejected on cell {}: {:?}", from, cell_id, reason);
                Fanout::default()
            }
            ClaimOutcome::AlreadyOwned => Fanout::default(),
        };
        drop(grid);

        self.flag_failures(&fanout.failed);
        Ok(outcome)
    }

    /// Queues a message for one session.
    pub fn send_to(&self, session_id: &SessionId, message: &ServerMessage) {
        let mut registry = lock(&self.registry);
        let result = match registry.get(session_id) {
            Some(session) => broadcast::send_to(session.tx(), message),
            None => return,
        };
        if let Err(DeliveryError::Full) = result {
            log::warn!("Outbound queue of session {} is full", session_id);
            registry.mark_delivery_failed(session_id);
        }
    }

    /// One liveness pass: evicts closed, unresponsive and silent sessions and
    /// broadcasts a single count update if anything was evicted.
    pub fn sweep(&self, now: Instant, timeout: Duration) -> SweepReport {
        let mut registry = lock(&self.registry);
        let expired = registry.expired(now, timeout);

        let mut evicted = Vec::with_capacity(expired.len());
        for session_id in expired {
            if let Some(session) = registry.unregister(&session_id) {
                // A full queue still closes: the connection sees its sender dropped.
                if let Err(err) = session.tx().try_send(ConnectionEvent::Close) {
                    log::debug!("Close for {} not queued: {}", session_id, err);
                }
                evicted.push(session_id);
            }
        }

        let live_count = registry.live_count();
        // A pass that evicts nobody leaves the count unchanged and stays silent.
        if !evicted.is_empty() {
            log::info!(
                "Evicted {} stale session(s) ({} online)",
                evicted.len(),
                live_count
            );
            publish_count(&mut registry, None);
        }

        SweepReport {
            evicted,
            live_count,
        }
    }

    pub fn live_count(&self) -> usize {
        lock(&self.registry).live_count()
    }

    pub fn dimensions(&self) -> GridDimensions {
        lock(&self.grid).dimensions()
    }

    pub fn grid_snapshot(&self) -> Vec<CellState> {
        lock(&self.grid).cells().map(CellState::from).collect()
    }

    pub fn stats(&self) -> ServerStats {
        let grid = lock(&self.grid);
        let registry = lock(&self.registry);
        let claimed_cells = grid.claimed_count();
        ServerStats {
            total_cells: grid.len(),
            claimed_cells,
            unclaimed_cells: grid.len() - claimed_cells,
            connected_users: registry.live_count(),
            active_users: registry.live_session_ids(),
        }
    }

    fn flag_failures(&self, failed: &[SessionId]) {
        if failed.is_empty() {
            return;
        }
        let mut registry = lock(&self.registry);
        for session_id in failed {
            registry.mark_delivery_failed(session_id);
        }
    }
}

fn publish_count(registry: &mut SessionRegistry, exclude: Option<&SessionId>) {
    let message = ServerMessage::UsersCount {
        count: registry.live_count(),
    };
    let fanout = broadcast::publish(&registry.targets(exclude), &message, None);
    for session_id in &fanout.failed {
        registry.mark_delivery_failed(session_id);
    }
}
