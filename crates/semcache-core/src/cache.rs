//! Cache façade (C14).
//!
//! Orchestrates vectorization, sharding, decision, storage, feedback and
//! prefetch into the public surface an embedding host actually calls.
//! Owns the statistics counters and the hot-swappable ensemble/threshold
//! parameters (§9: "Parameter hot-swap" — readers never observe a partially
//! updated state, since both are stored behind a single `RwLock` per
//! parameter set and swapped wholesale).

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::decision::{self, Decision};
use crate::ensemble::{self, EnsembleConfig, EnsembleParameters, TrainingSample};
use crate::error::{CacheError, CacheResult};
use crate::feedback::{ContextFingerprint, ExplicitFeedback, FeedbackRecord, RingBuffer};
use crate::layer::MultiLayerVector;
use crate::prefetch::Prefetcher;
use crate::shard::{SearchOptions, ShardManager, ShardMatch};
use crate::similarity::SimilarityMetrics;
use crate::snapshot::{CacheSnapshot, ItemSnapshot};
use crate::storage::{CacheItem, EvictionOutcome, HierarchicalStorage, TierLevel};
use crate::threshold::{self, ThresholdPair};

/// Result of a successful `add`.
#[derive(Clone, Debug)]
pub struct AddResult {
	/// The item's id.
	pub id: String,
	/// The tier it was finally placed in.
	pub tier: TierLevel,
	/// Ids evicted to make room for it, if any.
	pub evicted_ids: Vec<String>,
}

/// Aggregated counters exposed by [`SemanticCache::statistics`].
#[derive(Clone, Debug, Default)]
pub struct CacheStatistics {
	/// Total `get` calls.
	pub total_requests: u64,
	/// `get` calls that found an item.
	pub hits: u64,
	/// `get` calls that found nothing.
	pub misses: u64,
	/// Total decisions resulting in `Action::Hit`.
	pub decisions_hit: u64,
	/// Total decisions resulting in `Action::Diff`.
	pub decisions_diff: u64,
	/// Total decisions resulting in `Action::New`.
	pub decisions_new: u64,
	/// Running sum of observed latencies, for `health()`'s average.
	pub total_latency_ms: u64,
}

impl CacheStatistics {
	/// Hits divided by total requests, `0.0` if there have been none.
	#[must_use]
	pub fn hit_rate(&self) -> f32 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.hits as f32 / self.total_requests as f32
		}
	}

	/// Average latency in ms across all recorded requests.
	#[must_use]
	pub fn avg_latency_ms(&self) -> f32 {
		if self.total_requests == 0 {
			0.0
		} else {
			self.total_latency_ms as f32 / self.total_requests as f32
		}
	}
}

/// Severity of a health issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IssueSeverity {
	/// Worth investigating.
	Warning,
	/// Needs attention soon.
	Critical,
}

/// One health-report finding.
#[derive(Clone, Debug)]
pub struct HealthIssue {
	/// Severity.
	pub severity: IssueSeverity,
	/// Human-readable description.
	pub description: String,
}

/// Cache-wide health snapshot (§4.10).
#[derive(Clone, Debug, Default)]
pub struct HealthReport {
	/// Fractional usage (`current_usage / capacity`) per tier.
	pub memory_usage: Vec<(TierLevel, f32)>,
	/// Overall hit rate.
	pub hit_rate: f32,
	/// Average latency in ms.
	pub avg_latency_ms: f32,
	/// Issues found, if any.
	pub issues: Vec<HealthIssue>,
}

struct AdaptiveParameters {
	ensemble: RwLock<EnsembleParameters>,
	thresholds: RwLock<ThresholdPair>,
}

/// The cache façade: the single entry point an embedding host talks to.
pub struct SemanticCache {
	config: CacheConfig,
	storage: HierarchicalStorage,
	shards: ShardManager,
	prefetcher: Prefetcher,
	params: AdaptiveParameters,
	feedback_buffer: RwLock<RingBuffer<FeedbackRecord>>,
	training_buffer: RwLock<RingBuffer<TrainingSample>>,
	stats: RwLock<CacheStatistics>,
	clock: AtomicU64,
}

impl SemanticCache {
	/// Build a new cache façade from `config`, seeding the shard manager's
	/// hyperplanes from `rng`.
	#[must_use]
	pub fn new(config: CacheConfig, rng: &mut impl rand::Rng) -> Self {
		let storage = HierarchicalStorage::new(config.storage.capacities, config.storage.eviction_weights);
		let subject_dim = crate::layer::LayerKind::Subject.dimension();
		let shards = ShardManager::new(config.shard.clone(), subject_dim, rng);
		let prefetcher = Prefetcher::new(config.prefetch.clone());
		Self {
			config,
			storage,
			shards,
			prefetcher,
			params: AdaptiveParameters {
				ensemble: RwLock::new(EnsembleParameters::default()),
				thresholds: RwLock::new(ThresholdPair::default()),
			},
			feedback_buffer: RwLock::new(RingBuffer::new(1000)),
			training_buffer: RwLock::new(RingBuffer::new(1000)),
			stats: RwLock::new(CacheStatistics::default()),
			clock: AtomicU64::new(0),
		}
	}

	/// Logical clock used when the host does not supply timestamps
	/// explicitly; monotonically increasing so tests and hosts without a
	/// wall clock still get well-ordered `last_access` comparisons.
	fn tick(&self) -> u64 {
		self.clock.fetch_add(1, Ordering::Relaxed)
	}

	/// Current ensemble parameters (a cheap clone of the hot-swapped
	/// struct).
	#[must_use]
	pub fn ensemble_parameters(&self) -> EnsembleParameters {
		self.params.ensemble.read().clone()
	}

	/// Current threshold pair.
	#[must_use]
	pub fn thresholds(&self) -> ThresholdPair {
		*self.params.thresholds.read()
	}

	/// Decide an action for `query` against the top candidates retrieved
	/// via sharding (§4.6, §4.8). Does not mutate any state — candidates are
	/// peeked, not accessed, so merely being *considered* by a `decide` call
	/// never bumps an item's `access_count`/`last_access_ms` or triggers
	/// promotion (those only happen through a genuine [`Self::get`]).
	/// Callers use [`Self::get`] to both decide and act when `query`
	/// corresponds to an id already in the cache, or drive the
	/// decision/insert flow themselves for a fresh prompt.
	#[must_use]
	pub fn decide(&self, query: &MultiLayerVector, candidate_limit: usize) -> Decision {
		let matches = self.shards.search(query, &SearchOptions { top_k: candidate_limit });
		let candidates: Vec<CacheItem> = matches
			.iter()
			.filter_map(|m: &ShardMatch| self.storage.peek(&m.id))
			.collect();
		decision::decide(
			query,
			&candidates,
			&self.ensemble_parameters(),
			&self.thresholds(),
			&self.config.decision,
		)
	}

	/// Insert `item` into storage and the shard index. `target` overrides
	/// automatic tier placement (e.g. a fresh generation the caller wants
	/// to seed directly into L1, §4.7).
	///
	/// # Errors
	///
	/// Returns [`CacheError::CapacityExhausted`] if no combination of
	/// evictions in the target tier can make room; in that case nothing is
	/// mutated (atomic success/fail, §7).
	pub fn add(&self, item: CacheItem, target: Option<TierLevel>) -> CacheResult<AddResult> {
		let id = item.id.clone();
		let vector = item.vector.clone();
		let now = self.tick();
		let size = item.size_bytes();

		match self.storage.insert(item, target, now) {
			Ok(tier) => {
				self.shards.insert(id.clone(), vector);
				Ok(AddResult {
					id,
					tier,
					evicted_ids: Vec::new(),
				})
			}
			Err(EvictionOutcome { bytes_freed, .. }) => {
				warn!(id = %id, size, bytes_freed, "add failed: capacity exhausted");
				Err(CacheError::CapacityExhausted {
					tier: format!("{:?}", target.unwrap_or(TierLevel::Cold)),
					needed: size,
					available: bytes_freed,
				})
			}
		}
	}

	/// Look up `id`; on hit, records the access with the prefetcher (if
	/// `context` is supplied), promotes eligible predictions into L1, and
	/// promotes `id` itself if its access count has crossed the promotion
	/// threshold. Returns `None` on miss rather than an error (§7).
	pub fn get(&self, id: &str, context: Option<ContextFingerprint>) -> Option<CacheItem> {
		let now = self.tick();
		let found = self.storage.get(id, now);

		let mut stats = self.stats.write();
		stats.total_requests += 1;
		stats.total_latency_ms += self.locate_latency(id) as u64;
		if found.is_some() {
			stats.hits += 1;
		} else {
			stats.misses += 1;
		}
		drop(stats);

		if let Some(item) = &found {
			if item.access_count >= self.config.storage.promotion_threshold {
				self.storage.promote(id, now);
			}
			if let Some(ctx) = context {
				self.prefetcher.record_access(id, ctx.clone(), now);
				for prediction in self.prefetcher.predict(id, &ctx) {
					self.storage.promote(&prediction.item_id, now);
				}
			}
		}
		found
	}

	/// Nominal latency of whichever tier currently holds `id`, `0.0` if
	/// not found (used only for the statistics average).
	fn locate_latency(&self, id: &str) -> f32 {
		self.storage
			.locate(id)
			.map_or(0.0, TierLevel::nominal_latency_ms)
	}

	/// Remove `id` from storage and the shard index. Idempotent (§7).
	pub fn remove(&self, id: &str) -> Option<CacheItem> {
		self.shards.remove(id);
		self.storage.remove(id)
	}

	/// Semantic top-k search, delegating to the shard manager (§4.8). When
	/// `record_top_as_access` is `true`, the top result (if any) is recorded
	/// as an access by the prefetcher.
	#[must_use]
	pub fn search(
		&self,
		query: &MultiLayerVector,
		top_k: usize,
		context: Option<ContextFingerprint>,
	) -> Vec<ShardMatch> {
		let results = self.shards.search(query, &SearchOptions { top_k });
		if let (Some(top), Some(ctx)) = (results.first(), context) {
			self.prefetcher.record_access(&top.id, ctx, self.tick());
		}
		results
	}

	/// Promote `id` one tier up.
	pub fn promote_item(&self, id: &str) -> bool {
		self.storage.promote(id, self.tick())
	}

	/// Current aggregated statistics.
	#[must_use]
	pub fn statistics(&self) -> CacheStatistics {
		self.stats.read().clone()
	}

	/// While any tier exceeds its usable capacity, demote the bottom 20% by
	/// eviction score toward the next tier down (§4.10). Returns total
	/// bytes freed across all tiers.
	pub fn optimize_memory(&self) -> u64 {
		let now = self.tick();
		let mut freed = 0u64;
		for level in TierLevel::ALL {
			if level.demoted().is_none() {
				continue;
			}
			let tier = self.storage.tier(level);
			let usable = (tier.capacity_bytes() as f64 * crate::storage::MEMORY_LIMIT_FRACTION) as u64;
			if tier.current_usage() <= usable {
				continue;
			}
			let victims = tier.lowest_scored(0.2, now, self.storage.eviction_weights());
			for victim in victims {
				let size = victim.size_bytes();
				if self.storage.demote(&victim.id, now) {
					freed += size;
				}
			}
		}
		freed
	}

	/// Aggregated health report (§4.10): memory usage per tier, hit rate,
	/// average latency, and threshold-triggered issues.
	#[must_use]
	pub fn health(&self) -> HealthReport {
		let stats = self.statistics();
		let mut issues = Vec::new();
		let mut memory_usage = Vec::new();

		for level in TierLevel::ALL {
			let tier = self.storage.tier(level);
			let usage = tier.current_usage() as f32 / tier.capacity_bytes().max(1) as f32;
			memory_usage.push((level, usage));
			if usage > 0.95 {
				issues.push(HealthIssue {
					severity: IssueSeverity::Critical,
					description: format!("{level:?} memory usage at {:.1}%", usage * 100.0),
				});
			} else if usage > 0.90 {
				issues.push(HealthIssue {
					severity: IssueSeverity::Warning,
					description: format!("{level:?} memory usage at {:.1}%", usage * 100.0),
				});
			}
		}

		if stats.total_requests > 100 && stats.hit_rate() < 0.5 {
			issues.push(HealthIssue {
				severity: IssueSeverity::Warning,
				description: format!("hit rate {:.1}% after {} requests", stats.hit_rate() * 100.0, stats.total_requests),
			});
		}
		if stats.avg_latency_ms() > 100.0 {
			issues.push(HealthIssue {
				severity: IssueSeverity::Warning,
				description: format!("average latency {:.1}ms", stats.avg_latency_ms()),
			});
		}

		HealthReport {
			memory_usage,
			hit_rate: stats.hit_rate(),
			avg_latency_ms: stats.avg_latency_ms(),
			issues,
		}
	}

	/// Clear one tier (or all tiers if `level` is `None`). A real
	/// operation (§9 Open Question, SPEC_FULL.md §10.6), not a no-op.
	pub fn clear_cache(&self, level: Option<TierLevel>) -> u64 {
		self.storage.clear(level)
	}

	/// Record one feedback observation (§9 Open Question: implemented as a
	/// real operation). `metrics` should be the metrics carried on the
	/// [`Decision`] that produced `record.result_id`, so the ensemble trains
	/// on the same features the decision was made from. Always appends to
	/// the threshold buffer; appends to the ensemble training buffer only
	/// when `record.explicit` is not `Null` (an unlabelled sample has no
	/// ground truth to train against).
	pub fn record_feedback(&self, metrics: SimilarityMetrics, record: FeedbackRecord) {
		if record.explicit != ExplicitFeedback::Null {
			let ground_truth = f32::from(record.explicit == ExplicitFeedback::Accepted);
			self.training_buffer.write().push(TrainingSample { metrics, ground_truth });
		}
		self.feedback_buffer.write().push(record);
	}

	/// Run one adaptive-threshold update (§4.5) and one ensemble SGD step
	/// (§4.4) from the current feedback/training buffers, atomically
	/// publishing both (§9 "Parameter hot-swap"). Safe to call concurrently
	/// with lookups.
	pub fn optimize_parameters(&self, ensemble_config: &EnsembleConfig, rng: &mut impl rand::Rng) {
		let feedback_snapshot = self.feedback_buffer.read().snapshot();
		if feedback_snapshot.len() >= threshold::MIN_FEEDBACK_FOR_UPDATE {
			let current = self.thresholds();
			let updated = threshold::update(&current, &feedback_snapshot);
			if updated != current {
				debug!(?updated, "threshold parameters updated");
				*self.params.thresholds.write() = updated;
			}
		}

		let training_snapshot = self.training_buffer.read().snapshot();
		if !training_snapshot.is_empty() {
			let current = self.ensemble_parameters();
			let updated = ensemble::optimize(&current, &training_snapshot, ensemble_config, rng);
			*self.params.ensemble.write() = updated;
		}
	}

	/// Number of candidates the decision engine considers per request, used
	/// by hosts that want to pass the spec's default bound (§4.6, §5:
	/// "bounding candidate list sizes (default top-10 from sharding)").
	pub const DEFAULT_CANDIDATE_LIMIT: usize = 10;

	/// Capture the complete persisted state described in §6: every item
	/// across all four tiers plus the current ensemble/threshold parameters.
	/// Non-durable — this is an in-memory snapshot a host may serialize and
	/// store itself (§6, SPEC_FULL.md §10.6); no file I/O happens here.
	#[must_use]
	pub fn snapshot(&self) -> CacheSnapshot {
		let items = TierLevel::ALL
			.iter()
			.flat_map(|&level| self.storage.tier(level).snapshot())
			.map(|item| ItemSnapshot::from(&item))
			.collect();
		CacheSnapshot {
			items,
			ensemble: self.ensemble_parameters(),
			thresholds: self.thresholds(),
		}
	}

	/// Restore from a [`CacheSnapshot`] previously produced by
	/// [`Self::snapshot`]: re-insert every item into the tier it was
	/// snapshotted in (bypassing automatic tier placement), rebuild the
	/// shard index, and atomically publish the saved ensemble/threshold
	/// parameters. Items whose tier can no longer hold them (e.g. a smaller
	/// configured capacity) are dropped; the shard index and remaining
	/// tiers stay consistent with whatever was actually inserted.
	pub fn restore(&self, snapshot: CacheSnapshot) {
		*self.params.ensemble.write() = snapshot.ensemble;
		*self.params.thresholds.write() = snapshot.thresholds;

		for item_snapshot in snapshot.items {
			let tier = item_snapshot.tier;
			let item: CacheItem = item_snapshot.into();
			let id = item.id.clone();
			let vector = item.vector.clone();
			let now = self.tick();
			if self.storage.insert(item, Some(tier), now).is_ok() {
				self.shards.insert(id, vector);
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::decision::Action;
	use crate::feedback::ImplicitFeedback;
	use crate::layer::RelationMatrix;
	use crate::storage::ItemMetadata;
	use rand::SeedableRng;

	fn vector(subject: Vec<f32>) -> MultiLayerVector {
		let dims = [96, 64, 48, 32];
		MultiLayerVector::new(
			subject,
			vec![0.0; dims[0]],
			vec![0.0; dims[1]],
			vec![0.0; dims[2]],
			vec![0.0; dims[3]],
			RelationMatrix::identity(),
			0,
		)
	}

	fn item(id: &str, subject: Vec<f32>) -> CacheItem {
		CacheItem {
			id: id.to_string(),
			vector: vector(subject),
			payload: vec![0u8; 16],
			metadata: ItemMetadata::default(),
			access_count: 0,
			last_access_ms: 0,
			generation_difficulty: 0.3,
			tier: TierLevel::Cold,
		}
	}

	fn cache() -> SemanticCache {
		let mut rng = rand::rngs::StdRng::seed_from_u64(11);
		SemanticCache::new(CacheConfig::default(), &mut rng)
	}

	#[test]
	fn cold_cache_always_decides_new() {
		let cache = cache();
		let query = vector(vec![1.0; 128]);
		let decision = cache.decide(&query, 10);
		assert_eq!(decision.action, Action::New);
		assert_eq!(decision.confidence, 1.0);
		assert_eq!(decision.uncertainty, 0.0);
	}

	#[test]
	fn add_then_get_increments_access_count() {
		let cache = cache();
		let result = cache.add(item("a", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		assert_eq!(result.id, "a");
		let fetched = cache.get("a", None).unwrap();
		assert!(fetched.access_count >= 1);
		let fetched_again = cache.get("a", None).unwrap();
		assert!(fetched_again.access_count >= 2);
	}

	#[test]
	fn decide_never_mutates_candidate_access_stats_or_promotes() {
		let cache = cache();
		cache.add(item("x", vec![1.0; 128]), Some(TierLevel::Cold)).unwrap();
		let query = vector(vec![1.0; 128]);

		// Repeated decide() calls re-select "x" as a candidate many times,
		// which must never look like a real access: no access_count bump, no
		// promotion out of cold storage.
		for _ in 0..50 {
			let _ = cache.decide(&query, 10);
		}

		let peeked = cache.storage.peek("x").unwrap();
		assert_eq!(peeked.access_count, 0);
		assert_eq!(peeked.tier, TierLevel::Cold);
	}

	#[test]
	fn exact_match_decides_hit_or_diff() {
		let cache = cache();
		cache.add(item("x", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		let query = vector(vec![1.0; 128]);
		let decision = cache.decide(&query, 10);
		assert!(matches!(decision.action, Action::Hit | Action::Diff));
		assert_eq!(decision.matched_item_id, Some("x".to_string()));
	}

	#[test]
	fn remove_is_idempotent_and_clears_shard_index() {
		let cache = cache();
		cache.add(item("a", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		assert!(cache.remove("a").is_some());
		assert!(cache.remove("a").is_none());
		assert!(cache.get("a", None).is_none());
	}

	#[test]
	fn clear_cache_empties_named_tier_only() {
		let cache = cache();
		cache.add(item("a", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		cache.add(item("b", vec![0.0; 128]), Some(TierLevel::L2)).unwrap();
		cache.clear_cache(Some(TierLevel::L1));
		assert!(cache.get("a", None).is_none());
		assert!(cache.get("b", None).is_some());
	}

	#[test]
	fn record_feedback_feeds_training_buffer_only_when_labelled() {
		let cache = cache();
		let metrics = SimilarityMetrics {
			cosine: 0.9,
			tree: 0.9,
			latent: 0.9,
			coherence: 0.9,
		};
		cache.record_feedback(
			metrics,
			FeedbackRecord {
				prompt_id: "p".into(),
				result_id: "r".into(),
				explicit: ExplicitFeedback::Null,
				implicit: ImplicitFeedback::default(),
				timestamp_ms: 0,
				user_id: None,
			},
		);
		assert!(cache.training_buffer.read().is_empty());
		assert_eq!(cache.feedback_buffer.read().len(), 1);
	}

	#[test]
	fn snapshot_then_restore_preserves_items_and_parameters() {
		let source = cache();
		source.add(item("a", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		source.add(item("b", vec![0.0; 128]), Some(TierLevel::L2)).unwrap();
		let snap = source.snapshot();
		assert_eq!(snap.items.len(), 2);

		let restored = cache();
		restored.restore(snap);
		assert!(restored.get("a", None).is_some());
		assert!(restored.get("b", None).is_some());
		assert_eq!(restored.ensemble_parameters(), source.ensemble_parameters());
		assert_eq!(restored.thresholds(), source.thresholds());

		let query = vector(vec![1.0; 128]);
		let decision = restored.decide(&query, 10);
		assert_eq!(decision.matched_item_id, Some("a".to_string()));
	}

	#[test]
	fn statistics_track_hits_and_misses() {
		let cache = cache();
		cache.add(item("a", vec![1.0; 128]), Some(TierLevel::L1)).unwrap();
		let _ = cache.get("a", None);
		let _ = cache.get("missing", None);
		let stats = cache.statistics();
		assert_eq!(stats.hits, 1);
		assert_eq!(stats.misses, 1);
		assert_eq!(stats.total_requests, 2);
	}
}
