//! Hierarchical storage (C10) and composite eviction policy (C11).
//!
//! Four tiers (L1/L2/L3/cold), each a fine-grained-locked membership map
//! (one `parking_lot::Mutex` per tier, per §5 — never held across a call
//! into a user callback, of which the core has none). Lookup walks
//! L1 -> L2 -> L3 -> cold; promotion/demotion moves an item exactly one tier;
//! eviction scores victims by frequency, difficulty, and age.

use std::collections::HashMap;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::layer::MultiLayerVector;

/// One of the four storage tiers, fastest to slowest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TierLevel {
	/// Hottest, smallest, lowest latency.
	L1,
	/// Warm.
	L2,
	/// Cool.
	L3,
	/// Coldest, largest, highest latency.
	Cold,
}

impl TierLevel {
	/// All four tiers, fastest first.
	pub const ALL: [Self; 4] = [Self::L1, Self::L2, Self::L3, Self::Cold];

	/// The tier one step up (faster), or `None` if already `L1`.
	#[must_use]
	pub const fn promoted(self) -> Option<Self> {
		match self {
			Self::L1 => None,
			Self::L2 => Some(Self::L1),
			Self::L3 => Some(Self::L2),
			Self::Cold => Some(Self::L3),
		}
	}

	/// The tier one step down (slower), or `None` if already `cold`.
	#[must_use]
	pub const fn demoted(self) -> Option<Self> {
		match self {
			Self::L1 => Some(Self::L2),
			Self::L2 => Some(Self::L3),
			Self::L3 => Some(Self::Cold),
			Self::Cold => None,
		}
	}

	/// Default capacity in bytes (§4.7).
	#[must_use]
	pub const fn default_capacity_bytes(self) -> u64 {
		const MIB: u64 = 1024 * 1024;
		const GIB: u64 = 1024 * MIB;
		match self {
			Self::L1 => 100 * MIB,
			Self::L2 => 500 * MIB,
			Self::L3 => 2 * GIB,
			Self::Cold => 10 * GIB,
		}
	}

	/// Nominal latency in milliseconds (§4.7, informational only).
	#[must_use]
	pub const fn nominal_latency_ms(self) -> f32 {
		match self {
			Self::L1 => 1.0,
			Self::L2 => 5.0,
			Self::L3 => 10.0,
			Self::Cold => 50.0,
		}
	}

	/// Tier a fresh item should be placed in based on its starting
	/// `access_count` (§4.7): `>100 -> L1`, `>10 -> L2`, `>1 -> L3`, else
	/// `cold`.
	#[must_use]
	pub const fn for_access_count(access_count: u64) -> Self {
		if access_count > 100 {
			Self::L1
		} else if access_count > 10 {
			Self::L2
		} else if access_count > 1 {
			Self::L3
		} else {
			Self::Cold
		}
	}
}

/// Generation parameters and descriptive metadata carried alongside a
/// cached image's bytes (§3).
#[derive(Clone, Debug, Default)]
pub struct ItemMetadata {
	/// The original prompt that produced this item.
	pub original_prompt: String,
	/// Opaque generation parameters forwarded by the producer.
	pub generation_params: String,
	/// Width in pixels.
	pub width: u32,
	/// Height in pixels.
	pub height: u32,
	/// Image format, e.g. `"png"`.
	pub format: String,
	/// Milliseconds since epoch at creation.
	pub created_at_ms: u64,
}

impl ItemMetadata {
	/// Approximate serialized size in bytes, used by the item-size formula
	/// (§4.7). A cheap estimate (field byte lengths plus small fixed
	/// overhead per numeric field) rather than an actual serialization
	/// round-trip, since the exact on-wire format is a host concern.
	#[must_use]
	pub fn serialized_bytes(&self) -> u64 {
		(self.original_prompt.len()
			+ self.generation_params.len()
			+ self.format.len()
			+ 4 * std::mem::size_of::<u32>()
			+ std::mem::size_of::<u64>()) as u64
	}
}

/// A cached artifact: its vector, payload, metadata, and access/tier state
/// (§3). Owned by exactly one tier at a time.
#[derive(Clone, Debug)]
pub struct CacheItem {
	/// Unique id.
	pub id: String,
	/// The vector this item was cached under.
	pub vector: MultiLayerVector,
	/// Raw image bytes.
	pub payload: Vec<u8>,
	/// Descriptive metadata.
	pub metadata: ItemMetadata,
	/// Number of times this item has been looked up. `>= 1` after the
	/// first successful lookup (invariant).
	pub access_count: u64,
	/// Milliseconds since epoch of the most recent access.
	pub last_access_ms: u64,
	/// Cost to regenerate this item from scratch, in `[0, 1]`.
	pub generation_difficulty: f32,
	/// The tier currently holding this item.
	pub tier: TierLevel,
}

impl CacheItem {
	/// Total size in bytes per the §4.7 formula: payload bytes + serialized
	/// metadata bytes + `4 * len(layer)` per layer + `8 * 25` for the
	/// relation matrix.
	#[must_use]
	pub fn size_bytes(&self) -> u64 {
		self.payload.len() as u64 + self.metadata.serialized_bytes() + self.vector.layer_bytes() + 8 * 25
	}
}

/// Parameters for the composite eviction score (§4.7):
/// `score = alpha*normalized_frequency + beta*normalized_difficulty -
/// gamma*normalized_age`.
#[derive(Clone, Copy, Debug)]
pub struct EvictionWeights {
	/// Weight on normalized access frequency.
	pub alpha: f32,
	/// Weight on normalized generation difficulty.
	pub beta: f32,
	/// Weight on normalized age (subtracted: older is less valuable).
	pub gamma: f32,
}

impl Default for EvictionWeights {
	fn default() -> Self {
		Self {
			alpha: 0.4,
			beta: 0.4,
			gamma: 0.2,
		}
	}
}

const AGE_NORMALIZATION_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Normalized access frequency: `log(1+n) / log(1001)`.
#[must_use]
pub fn normalized_frequency(access_count: u64) -> f32 {
	(f64::from(access_count as u32 + 1)).ln() as f32 / 1001f64.ln() as f32
}

/// Normalized age: `min(1, age_ms / 24h)`.
#[must_use]
pub fn normalized_age(age_ms: u64) -> f32 {
	((age_ms as f64) / AGE_NORMALIZATION_MS).min(1.0) as f32
}

/// Composite eviction score for one item at `now_ms` (§4.7). Higher scores
/// are kept; victims are the lowest-scoring items.
#[must_use]
pub fn eviction_score(item: &CacheItem, now_ms: u64, weights: EvictionWeights) -> f32 {
	let freq = normalized_frequency(item.access_count);
	let age_ms = now_ms.saturating_sub(item.last_access_ms);
	let age = normalized_age(age_ms);
	weights.alpha * freq + weights.beta * item.generation_difficulty - weights.gamma * age
}

/// Fraction of a tier's capacity that may actually be used before eviction
/// kicks in (§4.7, §6: `memory_limit`).
pub const MEMORY_LIMIT_FRACTION: f64 = 0.92;

/// One storage tier: a capacity, current usage, and a locked membership
/// map. Invariant: `current_usage == sum(size(item) for item in members)`
/// and `current_usage <= capacity * 0.92` after any single operation
/// completes.
pub struct TierStore {
	level: TierLevel,
	capacity_bytes: u64,
	inner: Mutex<TierInner>,
}

struct TierInner {
	current_usage: u64,
	members: HashMap<String, CacheItem>,
}

/// Result of attempting to add an item to a tier: how many bytes were
/// freed by eviction and which ids were evicted.
#[derive(Clone, Debug, Default)]
pub struct EvictionOutcome {
	/// Ids evicted to make room, in eviction order.
	pub evicted_ids: Vec<String>,
	/// Total bytes freed by eviction.
	pub bytes_freed: u64,
}

impl TierStore {
	/// A new, empty tier with the given capacity.
	#[must_use]
	pub fn new(level: TierLevel, capacity_bytes: u64) -> Self {
		Self {
			level,
			capacity_bytes,
			inner: Mutex::new(TierInner {
				current_usage: 0,
				members: HashMap::new(),
			}),
		}
	}

	/// This tier's level.
	#[must_use]
	pub const fn level(&self) -> TierLevel {
		self.level
	}

	/// This tier's configured capacity in bytes.
	#[must_use]
	pub const fn capacity_bytes(&self) -> u64 {
		self.capacity_bytes
	}

	/// Current usage in bytes.
	#[must_use]
	pub fn current_usage(&self) -> u64 {
		self.inner.lock().current_usage
	}

	/// Number of items currently held.
	#[must_use]
	pub fn len(&self) -> usize {
		self.inner.lock().members.len()
	}

	/// Whether the tier holds no items.
	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// The usable capacity after applying `MEMORY_LIMIT_FRACTION`.
	fn usable_capacity(&self) -> u64 {
		(self.capacity_bytes as f64 * MEMORY_LIMIT_FRACTION) as u64
	}

	/// Look up `id`, bumping `access_count`/`last_access_ms` on hit (§4.7).
	#[must_use]
	pub fn get(&self, id: &str, now_ms: u64) -> Option<CacheItem> {
		let mut guard = self.inner.lock();
		let item = guard.members.get_mut(id)?;
		item.access_count += 1;
		item.last_access_ms = now_ms;
		Some(item.clone())
	}

	/// Peek without mutating access stats (used by shard-side scoring).
	#[must_use]
	pub fn peek(&self, id: &str) -> Option<CacheItem> {
		self.inner.lock().members.get(id).cloned()
	}

	/// All items currently in this tier (a snapshot, for candidate scans).
	#[must_use]
	pub fn snapshot(&self) -> Vec<CacheItem> {
		self.inner.lock().members.values().cloned().collect()
	}

	/// Evict the lowest-scoring members until `needed_bytes` of headroom is
	/// available (or there is nothing left to evict). Returns the outcome;
	/// callers use this before inserting a new item that would otherwise
	/// overflow the tier.
	fn evict_for_headroom(
		&self,
		guard: &mut TierInner,
		needed_bytes: u64,
		now_ms: u64,
		weights: EvictionWeights,
	) -> EvictionOutcome {
		let usable = self.usable_capacity();
		let mut outcome = EvictionOutcome::default();
		if guard.current_usage + needed_bytes <= usable {
			return outcome;
		}

		let mut scored: Vec<(String, f32, u64)> = guard
			.members
			.values()
			.map(|item| (item.id.clone(), eviction_score(item, now_ms, weights), item.size_bytes()))
			.collect();
		scored.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

		for (id, _, size) in scored {
			if guard.current_usage + needed_bytes <= usable {
				break;
			}
			if guard.members.remove(&id).is_some() {
				guard.current_usage = guard.current_usage.saturating_sub(size);
				outcome.evicted_ids.push(id);
				outcome.bytes_freed += size;
			}
		}
		outcome
	}

	/// Insert `item`, evicting lower-scored members first if necessary.
	/// Fails (returning `Err` with the partial eviction outcome) if even
	/// evicting everything else would not make room; in that case nothing
	/// is mutated beyond the attempted eviction, and the item is not
	/// inserted (atomic success/fail, §7).
	pub fn insert(
		&self,
		mut item: CacheItem,
		now_ms: u64,
		weights: EvictionWeights,
	) -> Result<EvictionOutcome, EvictionOutcome> {
		item.tier = self.level;
		let size = item.size_bytes();
		let mut guard = self.inner.lock();

		let outcome = self.evict_for_headroom(&mut guard, size, now_ms, weights);
		let usable = self.usable_capacity();
		if guard.current_usage + size > usable {
			warn!(tier = ?self.level, needed = size, "insert failed: cannot free enough space");
			return Err(outcome);
		}

		guard.current_usage += size;
		guard.members.insert(item.id.clone(), item);
		Ok(outcome)
	}

	/// Remove `id` if present, returning it. Idempotent: removing an absent
	/// id returns `None` without error (§7).
	pub fn remove(&self, id: &str) -> Option<CacheItem> {
		let mut guard = self.inner.lock();
		if let Some(item) = guard.members.remove(id) {
			guard.current_usage = guard.current_usage.saturating_sub(item.size_bytes());
			Some(item)
		} else {
			None
		}
	}

	/// The bottom `fraction` of members by eviction score (lowest first),
	/// used by `optimize_memory` to pick demotion victims.
	#[must_use]
	pub fn lowest_scored(&self, fraction: f32, now_ms: u64, weights: EvictionWeights) -> Vec<CacheItem> {
		let guard = self.inner.lock();
		let mut scored: Vec<(f32, CacheItem)> = guard
			.members
			.values()
			.map(|item| (eviction_score(item, now_ms, weights), item.clone()))
			.collect();
		scored.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
		let take = ((scored.len() as f32) * fraction).ceil() as usize;
		scored.into_iter().take(take).map(|(_, item)| item).collect()
	}
}

/// The four tiers together, keyed by level. Lookup walks `L1 -> L2 -> L3 ->
/// cold`.
pub struct HierarchicalStorage {
	tiers: HashMap<TierLevel, TierStore>,
	eviction_weights: EvictionWeights,
}

impl HierarchicalStorage {
	/// Build storage with the given per-tier capacities.
	#[must_use]
	pub fn new(capacities: [(TierLevel, u64); 4], eviction_weights: EvictionWeights) -> Self {
		let tiers = capacities
			.into_iter()
			.map(|(level, capacity)| (level, TierStore::new(level, capacity)))
			.collect();
		Self {
			tiers,
			eviction_weights,
		}
	}

	/// Borrow a single tier.
	#[must_use]
	pub fn tier(&self, level: TierLevel) -> &TierStore {
		&self.tiers[&level]
	}

	/// Borrow a single tier, constructed by name (§7: "a requested tier is
	/// missing" is a configuration error, not a panic). Every
	/// [`HierarchicalStorage`] built via [`Self::new`] carries all four
	/// tiers, so this only fails for a storage instance assembled with a
	/// partial tier set.
	///
	/// # Errors
	///
	/// Returns [`CacheError::UnknownTier`] if `level` has no backing
	/// [`TierStore`].
	pub fn try_tier(&self, level: TierLevel) -> CacheResult<&TierStore> {
		self.tiers
			.get(&level)
			.ok_or_else(|| CacheError::UnknownTier(format!("{level:?}")))
	}

	/// This instance's eviction weights.
	#[must_use]
	pub const fn eviction_weights(&self) -> EvictionWeights {
		self.eviction_weights
	}

	/// Search `L1 -> L2 -> L3 -> cold` for `id`, bumping access stats on
	/// first match.
	#[must_use]
	pub fn get(&self, id: &str, now_ms: u64) -> Option<CacheItem> {
		for level in TierLevel::ALL {
			if let Some(item) = self.tiers[&level].get(id, now_ms) {
				return Some(item);
			}
		}
		None
	}

	/// Search `L1 -> L2 -> L3 -> cold` for `id` without mutating its access
	/// stats (mirrors [`Self::get`] but calls [`TierStore::peek`] at each
	/// tier). Used by callers that need to look at an item's current state
	/// merely to score or rank it as a *candidate* — shard-side scoring, the
	/// decision engine's candidate list — without recording a real access.
	#[must_use]
	pub fn peek(&self, id: &str) -> Option<CacheItem> {
		for level in TierLevel::ALL {
			if let Some(item) = self.tiers[&level].peek(id) {
				return Some(item);
			}
		}
		None
	}

	/// Which tier (if any) currently holds `id`.
	#[must_use]
	pub fn locate(&self, id: &str) -> Option<TierLevel> {
		for level in TierLevel::ALL {
			if self.tiers[&level].peek(id).is_some() {
				return Some(level);
			}
		}
		None
	}

	/// Insert `item` into `target` (auto-selected by
	/// [`TierLevel::for_access_count`] if `None`).
	pub fn insert(
		&self,
		item: CacheItem,
		target: Option<TierLevel>,
		now_ms: u64,
	) -> Result<TierLevel, EvictionOutcome> {
		let level = target.unwrap_or_else(|| TierLevel::for_access_count(item.access_count));
		self.tiers[&level]
			.insert(item, now_ms, self.eviction_weights)
			.map(|_| level)
	}

	/// Remove `id` from whichever tier holds it. Idempotent.
	pub fn remove(&self, id: &str) -> Option<CacheItem> {
		for level in TierLevel::ALL {
			if let Some(item) = self.tiers[&level].remove(id) {
				return Some(item);
			}
		}
		None
	}

	/// Move `id` one tier up (cold -> L3 -> L2 -> L1). No-op (`false`
	/// returned) if the item is already in L1 or not found.
	pub fn promote(&self, id: &str, now_ms: u64) -> bool {
		let Some(current) = self.locate(id) else {
			return false;
		};
		let Some(target) = current.promoted() else {
			return false;
		};
		let Some(item) = self.tiers[&current].remove(id) else {
			return false;
		};
		match self.tiers[&target].insert(item.clone(), now_ms, self.eviction_weights) {
			Ok(_) => true,
			Err(_) => {
				// Roll back: promotion failed to find room upstream, put it
				// back where it was rather than losing the item.
				let _ = self.tiers[&current].insert(item, now_ms, self.eviction_weights);
				false
			}
		}
	}

	/// Move `id` one tier down (L1 -> L2 -> L3 -> cold). No-op (`false`
	/// returned) if the item is already cold or not found.
	pub fn demote(&self, id: &str, now_ms: u64) -> bool {
		let Some(current) = self.locate(id) else {
			return false;
		};
		let Some(target) = current.demoted() else {
			return false;
		};
		let Some(item) = self.tiers[&current].remove(id) else {
			return false;
		};
		match self.tiers[&target].insert(item.clone(), now_ms, self.eviction_weights) {
			Ok(_) => true,
			Err(_) => {
				let _ = self.tiers[&current].insert(item, now_ms, self.eviction_weights);
				false
			}
		}
	}

	/// Clear one tier (or all tiers if `level` is `None`), returning the
	/// total bytes freed. A real operation, not a no-op (§9 Open Question,
	/// SPEC_FULL.md §10.6).
	pub fn clear(&self, level: Option<TierLevel>) -> u64 {
		let levels: Vec<TierLevel> = level.map_or_else(|| TierLevel::ALL.to_vec(), |l| vec![l]);
		let mut freed = 0u64;
		for level in levels {
			let tier = &self.tiers[&level];
			let mut guard = tier.inner.lock();
			freed += guard.current_usage;
			guard.current_usage = 0;
			guard.members.clear();
		}
		freed
	}
}
