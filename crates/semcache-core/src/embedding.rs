//! Token embedding table (C1).
//!
//! A pre-built token-to-vector lookup, one table per layer. The core does
//! not train or load any neural encoder — the vectorizer consumes whatever
//! table the host hands it at startup.

use std::collections::HashMap;

use crate::layer::LayerKind;

/// Host-provided mapping from `(layer, token)` to an embedding vector.
///
/// Implementers are free to back this with a memory-mapped file, a flat
/// array with an offset table, or (as in [`InMemoryEmbeddingTable`]) a plain
/// hash map; the core only ever calls `get`/`vocabulary_size`.
pub trait EmbeddingTable: Send + Sync {
	/// Look up the embedding for `token` in `layer`. Returns `None` if the
	/// token is out of vocabulary for that layer.
	fn get(&self, layer: LayerKind, token: &str) -> Option<&[f32]>;

	/// Number of distinct tokens known for `layer`.
	fn vocabulary_size(&self, layer: LayerKind) -> usize;

	/// Optional per-layer keyword weight for `token`, used by the
	/// vectorizer's weighted aggregation (§4.1). Defaults to `1.0` for any
	/// token not present in a layer's keyword table.
	fn keyword_weight(&self, layer: LayerKind, token: &str) -> f32 {
		let _ = (layer, token);
		1.0
	}
}

/// A simple in-memory embedding table backed by `HashMap`s, one per layer.
#[derive(Debug, Default)]
pub struct InMemoryEmbeddingTable {
	vectors: HashMap<LayerKind, HashMap<String, Vec<f32>>>,
	keyword_weights: HashMap<LayerKind, HashMap<String, f32>>,
}

impl InMemoryEmbeddingTable {
	/// An empty table. Every lookup misses until tokens are inserted.
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Insert (or overwrite) the embedding for `token` in `layer`.
	///
	/// Does not validate `vector.len()` against `layer.dimension()` — the
	/// vectorizer's aggregation step operates on whatever length it finds,
	/// so a mismatched table simply produces a malformed layer vector rather
	/// than panicking; hosts are expected to populate tables consistently.
	pub fn insert(&mut self, layer: LayerKind, token: impl Into<String>, vector: Vec<f32>) {
		self.vectors
			.entry(layer)
			.or_default()
			.insert(token.into(), vector);
	}

	/// Set a keyword weight used in the vectorizer's weighted average
	/// (fallback weight is `1.0` for tokens not set here).
	pub fn set_keyword_weight(&mut self, layer: LayerKind, token: impl Into<String>, weight: f32) {
		self.keyword_weights
			.entry(layer)
			.or_default()
			.insert(token.into(), weight);
	}
}

impl EmbeddingTable for InMemoryEmbeddingTable {
	fn get(&self, layer: LayerKind, token: &str) -> Option<&[f32]> {
		self.vectors
			.get(&layer)
			.and_then(|m| m.get(token))
			.map(Vec::as_slice)
	}

	fn vocabulary_size(&self, layer: LayerKind) -> usize {
		self.vectors.get(&layer).map_or(0, HashMap::len)
	}

	fn keyword_weight(&self, layer: LayerKind, token: &str) -> f32 {
		self.keyword_weights
			.get(&layer)
			.and_then(|m| m.get(token))
			.copied()
			.unwrap_or(1.0)
	}
}
