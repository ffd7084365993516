pub mod legacy;
mod repository;
mod schema;

pub use repository::{DigestReplacePolicy, HistoryStore};
