//! Typed repositories over the current schema.

mod entity;
mod repository;

pub use entity::{Attribute, Entity};
pub(crate) use repository::{count, select, upsert};
pub use repository::{Comparison, Direction, FetchRequest, Predicate, Repository, SortKey};
