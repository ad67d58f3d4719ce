//! In-process, best-effort memoisation of stub call results.

pub mod entry;
pub mod error;
pub mod exact;
pub mod similarity;
pub mod tiered;

pub use entry::{CacheEntry, cache_key};
pub use error::{CacheError, CacheResult};
pub use exact::{ExactCache, ExactStats};
pub use similarity::{Embedder, SimilarityCache, SimilarityHit, cosine_similarity};
pub use tiered::{CacheConfig, CacheStats, TieredCache};
