use crate::grid::Cell;
use crate::types::{CellId, Color, SessionId, Timestamp};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Join,
    #[serde(rename_all = "camelCase")]
    ClaimCell {
        cell_id: i64,
    },
    Ping,
}

impl ClientMessage {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    AlreadyClaimed,
}

impl RejectReason {
    pub fn describe(&self) -> &'static str {
        match self {
            RejectReason::AlreadyClaimed => "Cell already claimed by another user",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub user_id: SessionId,
    pub color: Color,
}

/// Wire form of a cell; the claim fields are all null for an unclaimed cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellState {
    pub id: CellId,
    pub owner_id: Option<SessionId>,
    pub color: Option<Color>,
    pub updated_at: Option<Timestamp>,
}

impl From<&Cell> for CellState {
    fn from(cell: &Cell) -> Self {
        Self {
            id: cell.index,
            owner_id: cell.claim.map(|c| c.owner),
            color: cell.claim.map(|c| c.color),
            updated_at: cell.claim.map(|c| c.updated_at),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    #[serde(rename_all = "camelCase")]
    InitState {
        you: SessionInfo,
        grid: Vec<CellState>,
        connected_users: usize,
    },
    #[serde(rename_all = "camelCase")]
    CellUpdated {
        cell_id: CellId,
        owner_id: SessionId,
        color: Color,
        updated_at: Timestamp,
    },
    #[serde(rename_all = "camelCase")]
    ClaimRejected {
        cell_id: i64,
        reason: RejectReason,
        message: String,
    },
    UsersCount {
        count: usize,
    },
    Pong,
    Error {
        message: String,
    },
}

impl ServerMessage {
    /// `None` for an unclaimed cell, which never produces an update.
    pub fn cell_updated(cell: &Cell) -> Option<Self> {
        cell.claim.map(|claim| ServerMessage::CellUpdated {
            cell_id: cell.index,
            owner_id: claim.owner,
            color: claim.color,
            updated_at: claim.updated_at,
        })
    }

    pub fn claim_rejected(cell_id: i64, reason: RejectReason) -> Self {
        ServerMessage::ClaimRejected {
            cell_id,
            reason,
            message: reason.describe().to_owned(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
