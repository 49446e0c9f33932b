//! Local persistence for a running app: users, run sessions and friendships
//! in a versioned SQLite store, with schema migration and an offline queue of
//! mutations waiting to be synced.
//!
//! ```no_run
//! use runstore::models::User;
//! use runstore::store::{Store, StoreLocation, StoreOptions};
//! use runstore::sync::PendingMutation;
//! use runstore::models::Operation;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Store::open(StoreLocation::new("run.sqlite"), &StoreOptions::default()).await?;
//! let user = User::new("ann");
//! store.users().save(&user).await?;
//! store
//!     .sync_queue()
//!     .enqueue(PendingMutation::for_item(&user, Operation::Create)?)
//!     .await?;
//! store.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod models;
pub mod schema;
pub mod store;
pub mod sync;
pub mod value;

pub use error::{ErrorClass, StoreError};
pub use store::{OpenError, Store, StoreLocation, StoreOptions};
