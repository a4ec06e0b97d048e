use std::time::Duration;

use clap::Parser;
use system::GridDimensions;

use crate::liveness::LivenessSettings;

pub const MAX_CELLS: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("grid must have at least one row and one column (got {rows}x{cols})")]
    EmptyGrid { rows: usize, cols: usize },
    #[error("grid of {rows}x{cols} exceeds {max} cells")]
    GridTooLarge { rows: usize, cols: usize, max: usize },
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Read once at startup.
#[derive(Debug, Clone, Parser)]
#[command(name = "claim-canvas-server")]
#[command(about = "Shared grid canvas where every cell can be claimed once")]
#[command(version)]
pub struct ServerConfig {
    #[arg(long, env = "HOST", default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, env = "PORT", default_value_t = 3001)]
    pub port: u16,

    #[arg(long, env = "GRID_ROWS", default_value_t = 20)]
    pub rows: usize,

    #[arg(long, env = "GRID_COLS", default_value_t = 20)]
    pub cols: usize,

    /// Seconds between liveness sweeps
    #[arg(long, env = "LIVENESS_INTERVAL_SECS", default_value_t = 30)]
    pub liveness_interval_secs: u64,

    /// Seconds of silence after which a session is evicted
    #[arg(long, env = "SESSION_TIMEOUT_SECS", default_value_t = 35)]
    pub session_timeout_secs: u64,
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (rows, cols) = (self.rows, self.cols);
        if rows == 0 || cols == 0 {
            return Err(ConfigError::EmptyGrid { rows, cols });
        }
        match rows.checked_mul(cols) {
            Some(cells) if cells <= MAX_CELLS => {}
            _ => {
                return Err(ConfigError::GridTooLarge {
                    rows,
                    cols,
                    max: MAX_CELLS,
                })
            }
        }
        if self.liveness_interval_secs == 0 {
            return Err(ConfigError::ZeroDuration("liveness interval"));
        }
        if self.session_timeout_secs == 0 {
            return Err(ConfigError::ZeroDuration("session timeout"));
        }
        Ok(())
    }

    pub fn dimensions(&self) -> GridDimensions {
        GridDimensions::new(self.rows, self.cols)
    }

    pub fn liveness(&self) -> LivenessSettings {
        LivenessSettings {
            interval: Duration::from_secs(self.liveness_interval_secs),
            timeout: Duration::from_secs(self.session_timeout_secs),
        }
    }
}
