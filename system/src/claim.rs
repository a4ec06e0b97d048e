use crate::grid::{Cell, Grid, GridError};
use crate::message::RejectReason;
use crate::traits::SessionDirectory;
use crate::types::{SessionId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// The cell was unowned and now belongs to the claimant.
    Accepted(Cell),
    /// The claimant already owns the cell. Nothing changes, nothing is broadcast.
    AlreadyOwned,
    Rejected(RejectReason),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClaimError {
    #[error("invalid cell id")]
    InvalidCell(i64),
    #[error("unknown session")]
    UnknownSession(SessionId),
}

/// First-come-first-served claim resolution. The caller must hold exclusive
/// access to `grid` for the whole call so that exactly one of two racing
/// claims observes the cell as unowned.
pub fn resolve_claim<D: SessionDirectory + ?Sized>(
    grid: &mut Grid,
    sessions: &D,
    session_id: &SessionId,
    cell_index: i64,
    now: Timestamp,
) -> Result<ClaimOutcome, ClaimError> {
    let current = grid
        .get(cell_index)
        .map_err(|_| ClaimError::InvalidCell(cell_index))?;
    let color = sessions
        .session_color(session_id)
        .ok_or(ClaimError::UnknownSession(*session_id))?;

    match current.owner() {
        Some(owner) if owner == session_id => return Ok(ClaimOutcome::AlreadyOwned),
        Some(_) => return Ok(ClaimOutcome::Rejected(RejectReason::AlreadyClaimed)),
        None => {}
    }

    match grid.apply(cell_index, *session_id, color, now) {
        Ok(cell) => Ok(ClaimOutcome::Accepted(cell.clone())),
        Err(GridError::Conflict { .. }) => Ok(ClaimOutcome::Rejected(RejectReason::AlreadyClaimed)),
        Err(GridError::OutOfRange(index)) => Err(ClaimError::InvalidCell(index)),
    }
}
