//! Replacing a store's files with a freshly migrated copy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StoreError;
use crate::store::{OpenMode, StoreLocation};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SwapStrategy {
    /// Fold the original's WAL into its main file, then rename the new main
    /// file over it. The path always names a complete store.
    #[default]
    AtomicReplace,
    /// Delete the original files, then move the new ones into place. A crash
    /// between the two steps leaves no store at the path.
    DeleteThenMove,
}

impl fmt::Display for SwapStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwapStrategy::AtomicReplace => write!(f, "atomic_replace"),
            SwapStrategy::DeleteThenMove => write!(f, "delete_then_move"),
        }
    }
}

impl FromStr for SwapStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "atomic_replace" => Ok(SwapStrategy::AtomicReplace),
            "delete_then_move" => Ok(SwapStrategy::DeleteThenMove),
            _ => Err(format!(
                "Invalid swap strategy '{}'. Valid options: atomic_replace, delete_then_move",
                s
            )),
        }
    }
}

/// Puts the closed store at `staging` in place of the store at `target`.
///
/// Both stores must be closed. On success `staging` no longer exists.
pub async fn replace_store(
    target: &StoreLocation,
    staging: &StoreLocation,
    strategy: SwapStrategy,
    busy_timeout: Duration,
) -> Result<(), StoreError> {
    tracing::info!(
        "Swapping {} into {} ({})",
        staging.path().display(),
        target.path().display(),
        strategy
    );

    match strategy {
        SwapStrategy::AtomicReplace => {
            checkpoint(target, busy_timeout).await?;
            staging.remove_side_files()?;
            target.remove_side_files()?;
            rename(staging.path(), target.path())?;
        }
        SwapStrategy::DeleteThenMove => {
            target.remove_all()?;
            for (from, to) in staging.files().iter().zip(target.files().iter()) {
                if from.exists() {
                    rename(from, to)?;
                }
            }
        }
    }
    Ok(())
}

/// Moves every committed page of the store's WAL into its main file and
/// truncates the WAL.
pub(crate) async fn checkpoint(location: &StoreLocation, busy_timeout: Duration) -> Result<(), StoreError> {
    let pool = location.connect(OpenMode::Existing, busy_timeout).await?;
    let result = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
        .execute(&pool)
        .await;
    pool.close().await;
    result?;
    Ok(())
}

fn rename(from: &Path, to: &Path) -> Result<(), StoreError> {
    fs::rename(from, to).map_err(|e| StoreError::io(from, e))
}
