//! Non-durable snapshot/restore (§6 "Persisted state").
//!
//! A pure in-memory (de)serialization of everything needed to resume a
//! [`crate::cache::SemanticCache`]: per-item id/tier/access stats/metadata/
//! vector/payload, plus the ensemble and threshold parameter structs. No
//! file I/O happens here — writing the serialized form to disk, object
//! storage, or anywhere else is a host concern.

use serde::{Deserialize, Serialize};

use crate::ensemble::EnsembleParameters;
use crate::layer::MultiLayerVector;
use crate::storage::{CacheItem, ItemMetadata, TierLevel};
use crate::threshold::ThresholdPair;

/// Serializable mirror of [`ItemMetadata`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataSnapshot {
	/// See [`ItemMetadata::original_prompt`].
	pub original_prompt: String,
	/// See [`ItemMetadata::generation_params`].
	pub generation_params: String,
	/// See [`ItemMetadata::width`].
	pub width: u32,
	/// See [`ItemMetadata::height`].
	pub height: u32,
	/// See [`ItemMetadata::format`].
	pub format: String,
	/// See [`ItemMetadata::created_at_ms`].
	pub created_at_ms: u64,
}

impl From<&ItemMetadata> for MetadataSnapshot {
	fn from(m: &ItemMetadata) -> Self {
		Self {
			original_prompt: m.original_prompt.clone(),
			generation_params: m.generation_params.clone(),
			width: m.width,
			height: m.height,
			format: m.format.clone(),
			created_at_ms: m.created_at_ms,
		}
	}
}

impl From<MetadataSnapshot> for ItemMetadata {
	fn from(m: MetadataSnapshot) -> Self {
		Self {
			original_prompt: m.original_prompt,
			generation_params: m.generation_params,
			width: m.width,
			height: m.height,
			format: m.format,
			created_at_ms: m.created_at_ms,
		}
	}
}

/// One item's persisted state: id, tier, access stats, metadata, vector,
/// and raw image bytes (§6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ItemSnapshot {
	/// Unique id.
	pub id: String,
	/// Tier the item resided in when snapshotted.
	pub tier: TierLevel,
	/// Number of times looked up.
	pub access_count: u64,
	/// Milliseconds since epoch of the most recent access.
	pub last_access_ms: u64,
	/// Cost to regenerate this item from scratch.
	pub generation_difficulty: f32,
	/// Descriptive metadata.
	pub metadata: MetadataSnapshot,
	/// The vector this item was cached under.
	pub vector: MultiLayerVector,
	/// Raw image bytes.
	pub image_bytes: Vec<u8>,
}

impl From<&CacheItem> for ItemSnapshot {
	fn from(item: &CacheItem) -> Self {
		Self {
			id: item.id.clone(),
			tier: item.tier,
			access_count: item.access_count,
			last_access_ms: item.last_access_ms,
			generation_difficulty: item.generation_difficulty,
			metadata: MetadataSnapshot::from(&item.metadata),
			vector: item.vector.clone(),
			image_bytes: item.payload.clone(),
		}
	}
}

impl From<ItemSnapshot> for CacheItem {
	fn from(s: ItemSnapshot) -> Self {
		Self {
			id: s.id,
			vector: s.vector,
			payload: s.image_bytes,
			metadata: s.metadata.into(),
			access_count: s.access_count,
			last_access_ms: s.last_access_ms,
			generation_difficulty: s.generation_difficulty,
			tier: s.tier,
		}
	}
}

/// The complete persisted state of one cache instance (§6). No other state
/// is required to resume: shard placement and the access log are derived
/// from `items` and a fresh sequence of accesses respectively.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheSnapshot {
	/// Every item across all tiers, in no particular order.
	pub items: Vec<ItemSnapshot>,
	/// Ensemble parameters at snapshot time.
	pub ensemble: EnsembleParameters,
	/// Threshold pair at snapshot time.
	pub thresholds: ThresholdPair,
}

impl CacheSnapshot {
	/// Serialize to a JSON string.
	///
	/// # Errors
	///
	/// Returns an error if `serde_json` fails to serialize (never expected
	/// in practice, since every field here is a plain data type).
	pub fn to_json(&self) -> serde_json::Result<String> {
		serde_json::to_string(self)
	}

	/// Deserialize from a JSON string previously produced by [`Self::to_json`].
	///
	/// # Errors
	///
	/// Returns an error if `json` is not a valid `CacheSnapshot` encoding.
	pub fn from_json(json: &str) -> serde_json::Result<Self> {
		serde_json::from_str(json)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::RelationMatrix;

	fn item(id: &str) -> CacheItem {
		CacheItem {
			id: id.to_string(),
			vector: MultiLayerVector::new(
				vec![1.0, 0.0],
				vec![],
				vec![],
				vec![],
				vec![],
				RelationMatrix::identity(),
				0,
			),
			payload: vec![1, 2, 3],
			metadata: ItemMetadata {
				original_prompt: "a cat".to_string(),
				generation_params: String::new(),
				width: 512,
				height: 512,
				format: "png".to_string(),
				created_at_ms: 0,
			},
			access_count: 3,
			last_access_ms: 100,
			generation_difficulty: 0.4,
			tier: TierLevel::L2,
		}
	}

	#[test]
	fn item_round_trips_through_snapshot() {
		let original = item("a");
		let snapshot = ItemSnapshot::from(&original);
		let restored: CacheItem = snapshot.into();
		assert_eq!(restored.id, original.id);
		assert_eq!(restored.tier, original.tier);
		assert_eq!(restored.access_count, original.access_count);
		assert_eq!(restored.payload, original.payload);
		assert_eq!(restored.metadata.original_prompt, original.metadata.original_prompt);
	}

	#[test]
	fn cache_snapshot_round_trips_through_json() {
		let snapshot = CacheSnapshot {
			items: vec![ItemSnapshot::from(&item("a")), ItemSnapshot::from(&item("b"))],
			ensemble: EnsembleParameters::default(),
			thresholds: ThresholdPair::default(),
		};
		let json = snapshot.to_json().unwrap();
		let restored = CacheSnapshot::from_json(&json).unwrap();
		assert_eq!(restored.items.len(), 2);
		assert_eq!(restored.thresholds, snapshot.thresholds);
	}

	#[test]
	fn from_json_rejects_garbage() {
		assert!(CacheSnapshot::from_json("not json").is_err());
	}
}
