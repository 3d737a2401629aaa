pub mod config;
pub mod path;
pub mod render;
pub mod search;
pub mod state;
pub mod store;
pub mod types;
pub mod web;

pub use path::{KeyPath, PathSegment};
pub use search::{search, search_documents, search_with_limits, SearchError, SearchLimits};
pub use types::{Match, SearchResponse};
