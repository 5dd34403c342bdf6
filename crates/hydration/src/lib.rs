//! Variable hydration for askwise.
//!
//! Capability handlers ask for user data by symbolic name
//! (`nd_score_average`, `weight_logs`, ...). The [`HydrationEngine`] resolves
//! those names through a [`VariableRegistry`]: cached values are reused,
//! misses are grouped so that one remote fetch serves every variable mapped
//! to it, and fetches run on a bounded pool.

pub mod window;
pub mod extract;
pub mod fetcher;
pub mod http;
pub mod registry;
pub mod engine;

pub use window::DateWindow;
pub use extract::{extract_key_path, Extraction};
pub use fetcher::{CachedFetcher, Fetcher, FnFetcher};
pub use http::HttpFetcher;
pub use registry::{VariableRegistry, VariableSpec};
pub use engine::HydrationEngine;
