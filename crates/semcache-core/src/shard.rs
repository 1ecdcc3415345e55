//! Semantic shard manager (C12).
//!
//! Bounds candidate-retrieval cost by hashing each item's normalized
//! `subject` layer onto a small number of random hyperplanes, then routing
//! a query only to shards within a small Hamming-distance cutoff of its own
//! hash. Each eligible shard runs a linear cosine scan (parallelized with
//! `rayon`, §5: "search may visit multiple shards in parallel") and the
//! shards' local top-k are merged into the global top-k.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::Rng;
use rayon::prelude::*;

use crate::layer::{LayerKind, MultiLayerVector};
use crate::similarity::cosine;

/// Configuration for the shard manager.
#[derive(Clone, Debug)]
pub struct ShardConfig {
	/// Number of shards. Should be a power of two so the hyperplane hash
	/// code maps onto shard ids directly (default 8 -> 3 hyperplanes).
	pub num_shards: usize,
	/// Maximum Hamming distance between a query's shard code and a shard's
	/// id for that shard to be searched.
	pub hamming_cutoff: u32,
}

impl Default for ShardConfig {
	fn default() -> Self {
		Self {
			num_shards: 8,
			hamming_cutoff: 2,
		}
	}
}

/// Query-time search options.
#[derive(Clone, Copy, Debug)]
pub struct SearchOptions {
	/// Number of results to return, globally, after merging per-shard
	/// top-k lists.
	pub top_k: usize,
}

/// One search result: the candidate id, its overall weighted cosine, and
/// the per-layer cosine breakdown (in [`LayerKind::ALL`] order).
#[derive(Clone, Debug)]
pub struct ShardMatch {
	/// The candidate's id.
	pub id: String,
	/// Overall layer-weighted cosine similarity (§4.2's `cosine` metric,
	/// not the other three).
	pub cosine: f32,
	/// Per-layer cosine similarity.
	pub per_layer: [f32; 5],
}

/// Number of bits needed to address `num_shards` buckets.
fn bits_for(num_shards: usize) -> u32 {
	if num_shards <= 1 {
		0
	} else {
		(num_shards as f64).log2().ceil() as u32
	}
}

/// A lightweight copy of the fields the shard index needs for routing and
/// scoring; the shard never owns the full [`crate::storage::CacheItem`].
#[derive(Clone)]
struct ShardEntry {
	vector: MultiLayerVector,
}

/// The semantic shard manager: a fixed set of shards, each independently
/// locked, plus a top-level id -> shard-index map for O(1) removal.
pub struct ShardManager {
	config: ShardConfig,
	hyperplanes: Vec<Vec<f32>>,
	shards: Vec<Mutex<HashMap<String, ShardEntry>>>,
	locations: Mutex<HashMap<String, usize>>,
}

impl ShardManager {
	/// Build a new shard manager with `subject_dim`-dimensional random
	/// hyperplanes seeded from `rng`.
	#[must_use]
	pub fn new(config: ShardConfig, subject_dim: usize, rng: &mut impl Rng) -> Self {
		let bits = bits_for(config.num_shards);
		let hyperplanes = (0..bits)
			.map(|_| (0..subject_dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
			.collect();
		let shards = (0..config.num_shards).map(|_| Mutex::new(HashMap::new())).collect();
		Self {
			config,
			hyperplanes,
			shards,
			locations: Mutex::new(HashMap::new()),
		}
	}

	/// Hash `vector`'s subject layer onto the hyperplanes, producing a
	/// shard id in `[0, num_shards)`.
	#[must_use]
	pub fn shard_id_for(&self, vector: &MultiLayerVector) -> usize {
		let subject = vector.layer(LayerKind::Subject);
		let mut code = 0u32;
		for (i, plane) in self.hyperplanes.iter().enumerate() {
			let dot: f32 = subject
				.iter()
				.zip(plane.iter())
				.map(|(a, b)| a * b)
				.sum();
			if dot >= 0.0 {
				code |= 1 << i;
			}
		}
		(code as usize) % self.config.num_shards.max(1)
	}

	/// Insert or overwrite `id`'s entry, routing it by its own subject-layer
	/// hash. Removes any prior entry for `id` first.
	pub fn insert(&self, id: String, vector: MultiLayerVector) {
		self.remove(&id);
		let shard_id = self.shard_id_for(&vector);
		self.shards[shard_id].lock().insert(id.clone(), ShardEntry { vector });
		self.locations.lock().insert(id, shard_id);
	}

	/// Remove `id` from whichever shard holds it. Idempotent.
	pub fn remove(&self, id: &str) {
		if let Some(shard_id) = self.locations.lock().remove(id) {
			self.shards[shard_id].lock().remove(id);
		}
	}

	/// Shards eligible for a query with shard code `query_code`: those
	/// within `hamming_cutoff` bits.
	fn eligible_shards(&self, query_code: usize) -> Vec<usize> {
		(0..self.config.num_shards)
			.filter(|&s| ((s ^ query_code) as u32).count_ones() <= self.config.hamming_cutoff)
			.collect()
	}

	/// Linear cosine scan of one shard's members against `query`, returning
	/// its local top-`top_k`.
	fn scan_shard(shard_id: usize, members: &HashMap<String, ShardEntry>, query: &MultiLayerVector, top_k: usize) -> Vec<ShardMatch> {
		let _ = shard_id;
		let mut results: Vec<ShardMatch> = members
			.iter()
			.map(|(id, entry)| {
				let per_layer = LayerKind::ALL.map(|l| cosine(query.layer(l), entry.vector.layer(l)));
				let overall: f32 = LayerKind::ALL
					.iter()
					.zip(per_layer.iter())
					.map(|(l, &v)| l.similarity_weight() * v)
					.sum();
				ShardMatch {
					id: id.clone(),
					cosine: overall.clamp(0.0, 1.0),
					per_layer,
				}
			})
			.collect();
		results.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
		results.truncate(top_k);
		results
	}

	/// Search for the top-k candidates similar to `query` (§4.8). Shards
	/// are scanned in parallel; their local top-k lists are merged and
	/// truncated to the requested global top-k.
	#[must_use]
	pub fn search(&self, query: &MultiLayerVector, options: &SearchOptions) -> Vec<ShardMatch> {
		let query_code = self.shard_id_for(query);
		let eligible = self.eligible_shards(query_code);

		let mut merged: Vec<ShardMatch> = eligible
			.par_iter()
			.flat_map(|&shard_id| {
				let members = self.shards[shard_id].lock();
				Self::scan_shard(shard_id, &members, query, options.top_k)
			})
			.collect();

		merged.sort_by(|a, b| b.cosine.partial_cmp(&a.cosine).unwrap_or(std::cmp::Ordering::Equal));
		merged.truncate(options.top_k);
		merged
	}

	/// Total number of indexed ids across all shards.
	#[must_use]
	pub fn len(&self) -> usize {
		self.locations.lock().len()
	}

	/// Whether the index holds no ids.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::RelationMatrix;
	use rand::SeedableRng;

	fn vector(subject: Vec<f32>) -> MultiLayerVector {
		MultiLayerVector::new(subject, vec![], vec![], vec![], vec![], RelationMatrix::identity(), 0)
	}

	fn manager() -> ShardManager {
		let mut rng = rand::rngs::StdRng::seed_from_u64(7);
		ShardManager::new(ShardConfig::default(), 4, &mut rng)
	}

	#[test]
	fn insert_then_remove_clears_membership() {
		let mgr = manager();
		mgr.insert("a".into(), vector(vec![1.0, 0.0, 0.0, 0.0]));
		assert_eq!(mgr.len(), 1);
		mgr.remove("a");
		assert_eq!(mgr.len(), 0);
	}

	#[test]
	fn remove_is_idempotent() {
		let mgr = manager();
		mgr.remove("does-not-exist");
	}

	#[test]
	fn search_finds_the_closest_match() {
		let mgr = manager();
		mgr.insert("near".into(), vector(vec![1.0, 0.0, 0.0, 0.0]));
		mgr.insert("far".into(), vector(vec![0.0, 1.0, 0.0, 0.0]));
		let query = vector(vec![0.95, 0.05, 0.0, 0.0]);
		let results = mgr.search(&query, &SearchOptions { top_k: 5 });
		assert!(!results.is_empty());
		assert_eq!(results[0].id, "near");
	}

	#[test]
	fn search_on_empty_index_returns_empty() {
		let mgr = manager();
		let results = mgr.search(&vector(vec![1.0, 0.0, 0.0, 0.0]), &SearchOptions { top_k: 5 });
		assert!(results.is_empty());
	}

	#[test]
	fn reinserting_an_id_does_not_duplicate_it() {
		let mgr = manager();
		mgr.insert("a".into(), vector(vec![1.0, 0.0, 0.0, 0.0]));
		mgr.insert("a".into(), vector(vec![0.0, 1.0, 0.0, 0.0]));
		assert_eq!(mgr.len(), 1);
	}
}
