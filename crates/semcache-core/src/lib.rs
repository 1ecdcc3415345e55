//! # Semcache Core
//!
//! A self-learning semantic cache for a generative image service: given a
//! request, decide whether to return a cached image unchanged (`hit`), drive
//! a cheap diff regeneration from a similar cached artifact (`diff`), or
//! request a full new generation (`new`).
//!
//! ## Why a Semantic Cache?
//!
//! Exact-match caching barely helps an image generator — the same prompt is
//! rarely asked twice verbatim. But many prompts are *close*: "a cat on a
//! windowsill" and "a cat sitting on a windowsill at sunset" could plausibly
//! share a base image and a small diff regeneration. This crate is the
//! decision layer that notices that closeness and acts on it:
//!
//! - **Vectorization** ([`layer`], [`relation`], [`vectorize`]) splits a
//!   prompt into five semantic layers (subject, attribute, style,
//!   composition, emotion) plus a cross-layer relation matrix.
//! - **Similarity & uncertainty** ([`similarity`], [`uncertainty`]) compare
//!   two vectors four different ways and quantify how much those four ways
//!   disagree.
//! - **Learning** ([`ensemble`], [`threshold`]) combines the four metrics
//!   into one predicted similarity and adapts its cut-points from feedback.
//! - **Decision** ([`decision`]) picks the best candidate and maps it to an
//!   action, downgrading conservatively under high uncertainty.
//! - **Storage** ([`storage`], [`shard`], [`prefetch`]) is a four-tier cache
//!   (L1/L2/L3/cold) with composite eviction, semantic sharding for
//!   candidate retrieval, and a predictive prefetcher.
//!
//! [`cache::SemanticCache`] is the façade that orchestrates all of the above;
//! it is the type most hosts construct and call directly.
//!
//! ## Example
//!
//! ```rust
//! use semcache_core::cache::SemanticCache;
//! use semcache_core::config::CacheConfig;
//! use semcache_core::embedding::InMemoryEmbeddingTable;
//! use semcache_core::vectorize::{vectorize, VectorizeConfig};
//!
//! let table = InMemoryEmbeddingTable::new();
//! let mut rng = rand::thread_rng();
//! let cache = SemanticCache::new(CacheConfig::default(), &mut rng);
//!
//! let query = vectorize(&table, "a cat on a windowsill", &VectorizeConfig::default(), 0);
//! let decision = cache.decide(&query, SemanticCache::DEFAULT_CANDIDATE_LIMIT);
//! // Cold cache: nothing to compare against yet.
//! assert!(matches!(decision.action, semcache_core::decision::Action::New));
//! ```
//!
//! ## Performance
//!
//! - No suspension points: every operation here is synchronous and CPU-bound
//!   (§5). Hosts that are themselves async wrap at the boundary.
//! - Per-tier and per-shard locking is fine-grained (`parking_lot::Mutex`),
//!   never held across a call into a user callback (the core has none).
//! - Candidate ranking is `O(candidates * layer_dims)`; candidate lists are
//!   bounded by the shard manager's top-k before decision ever runs.
//!
//! ## References
//!
//! This crate implements a documented algorithm, not a patented one — see
//! `DESIGN.md` for the per-module grounding and the design notes carried
//! over from the source specification.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::needless_return)]

pub mod cache;
pub mod config;
pub mod decision;
pub mod embedding;
pub mod ensemble;
pub mod error;
pub mod feedback;
pub mod layer;
pub mod prefetch;
pub mod relation;
pub mod shard;
pub mod similarity;
pub mod snapshot;
pub mod storage;
pub mod threshold;
pub mod uncertainty;
pub mod vectorize;

pub use cache::SemanticCache;
pub use decision::{decide, Action, Decision};
pub use error::{CacheError, CacheResult};
pub use layer::{LayerKind, MultiLayerVector};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
