//! Aggregate configuration (§6).
//!
//! One `CacheConfig` bundling every component's own config struct, each with
//! a `Default` matching the literal defaults spec.md §6 enumerates. Loading
//! these from a file or environment is a host concern (§1 Non-goals); this
//! crate only defines the typed structs and their defaults.

use crate::decision::DecisionConfig;
use crate::ensemble::EnsembleConfig;
use crate::prefetch::PrefetchConfig;
use crate::shard::ShardConfig;
use crate::storage::{EvictionWeights, TierLevel};
use crate::vectorize::VectorizeConfig;

/// Storage-level configuration: per-tier capacities, the promotion
/// threshold, and the composite eviction weights.
#[derive(Clone, Debug)]
pub struct StorageConfig {
	/// Capacity in bytes for each tier.
	pub capacities: [(TierLevel, u64); 4],
	/// `access_count` crossing this value triggers a promotion.
	pub promotion_threshold: u64,
	/// Weights for the composite eviction score.
	pub eviction_weights: EvictionWeights,
}

impl Default for StorageConfig {
	fn default() -> Self {
		Self {
			capacities: [
				(TierLevel::L1, TierLevel::L1.default_capacity_bytes()),
				(TierLevel::L2, TierLevel::L2.default_capacity_bytes()),
				(TierLevel::L3, TierLevel::L3.default_capacity_bytes()),
				(TierLevel::Cold, TierLevel::Cold.default_capacity_bytes()),
			],
			promotion_threshold: 10,
			eviction_weights: EvictionWeights::default(),
		}
	}
}

/// The complete configuration surface for one [`crate::cache::SemanticCache`]
/// instance.
#[derive(Clone, Debug, Default)]
pub struct CacheConfig {
	/// Vectorization engine configuration (C1-C4).
	pub vectorize: VectorizeConfig,
	/// Decision engine configuration (C9).
	pub decision: DecisionConfig,
	/// Ensemble training configuration (C7).
	pub ensemble: EnsembleConfig,
	/// Storage tiers and eviction (C10-C11).
	pub storage: StorageConfig,
	/// Shard manager configuration (C12).
	pub shard: ShardConfig,
	/// Prefetcher configuration (C13).
	pub prefetch: PrefetchConfig,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn default_storage_capacities_match_spec_defaults() {
		let config = StorageConfig::default();
		assert_eq!(config.capacities[0], (TierLevel::L1, 100 * 1024 * 1024));
		assert_eq!(config.promotion_threshold, 10);
	}

	#[test]
	fn default_cache_config_builds() {
		let config = CacheConfig::default();
		assert_eq!(config.shard.num_shards, 8);
		assert_eq!(config.prefetch.max_items, 5);
	}
}
