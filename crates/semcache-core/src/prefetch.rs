//! Predictive prefetcher (C13).
//!
//! Combines a sequence-transition predictor, a context-similarity
//! predictor, and raw popularity into a blended "next likely item" score.
//! Observes accesses via [`Prefetcher::record_access`]; the cache façade
//! calls [`Prefetcher::predict`] after every access and promotes any
//! eligible prediction into L1.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::feedback::{AccessPattern, ContextFingerprint, RingBuffer};

/// Session window within which two accesses are considered part of the
/// same sequence (§3: "≤ 5 min").
pub const SESSION_WINDOW_MS: u64 = 5 * 60 * 1000;

/// Counts of observed `A -> B` transitions within the session window.
#[derive(Debug, Default)]
pub struct SequenceTable {
	transitions: HashMap<String, HashMap<String, u64>>,
}

impl SequenceTable {
	/// Record one `from -> to` transition.
	pub fn record(&mut self, from: &str, to: &str) {
		*self
			.transitions
			.entry(from.to_string())
			.or_default()
			.entry(to.to_string())
			.or_insert(0) += 1;
	}

	/// `count(from -> to) / sum(count(from -> *))`, `0.0` if `from` has no
	/// recorded outgoing transitions.
	#[must_use]
	pub fn probability(&self, from: &str, to: &str) -> f32 {
		let Some(outgoing) = self.transitions.get(from) else {
			return 0.0;
		};
		let total: u64 = outgoing.values().sum();
		if total == 0 {
			return 0.0;
		}
		outgoing.get(to).copied().unwrap_or(0) as f32 / total as f32
	}

	/// Every item ever observed as a transition target from `from`.
	#[must_use]
	pub fn targets_of(&self, from: &str) -> Vec<String> {
		self.transitions
			.get(from)
			.map(|m| m.keys().cloned().collect())
			.unwrap_or_default()
	}
}

/// Configuration for the prefetcher.
#[derive(Clone, Debug)]
pub struct PrefetchConfig {
	/// Whether prefetching is active at all.
	pub enable: bool,
	/// Weight on the sequence-probability component.
	pub alpha: f32,
	/// Weight on the context-probability component.
	pub beta: f32,
	/// Weight on the popularity component.
	pub gamma: f32,
	/// Maximum predictions emitted per access.
	pub max_items: usize,
	/// Minimum blended probability for a prediction to be eligible.
	pub probability_threshold: f32,
	/// Capacity of the access-log ring buffer.
	pub access_log_capacity: usize,
	/// Context-similarity threshold above which a past access pattern
	/// counts toward the context-probability component.
	pub context_similarity_threshold: f32,
}

impl Default for PrefetchConfig {
	fn default() -> Self {
		Self {
			enable: true,
			alpha: 0.4,
			beta: 0.4,
			gamma: 0.2,
			max_items: 5,
			probability_threshold: 0.6,
			access_log_capacity: 1000,
			context_similarity_threshold: 0.5,
		}
	}
}

/// A single "next likely item" prediction.
#[derive(Clone, Debug, PartialEq)]
pub struct Prediction {
	/// The predicted item id.
	pub item_id: String,
	/// Blended probability in `[0, 1]`.
	pub probability: f32,
	/// Confidence derived from how much data backed the prediction
	/// (diagnostics only, per GLOSSARY).
	pub confidence: f32,
	/// Human-readable explanation (diagnostics only).
	pub reason: String,
}

/// Jaccard similarity of two string sets.
fn jaccard(a: &[String], b: &[String]) -> f32 {
	if a.is_empty() && b.is_empty() {
		return 0.0;
	}
	let sa: std::collections::HashSet<&String> = a.iter().collect();
	let sb: std::collections::HashSet<&String> = b.iter().collect();
	let intersection = sa.intersection(&sb).count();
	let union = sa.union(&sb).count();
	if union == 0 {
		0.0
	} else {
		intersection as f32 / union as f32
	}
}

/// Context similarity between two fingerprints (§4.9): equal-weighted
/// average of userId match, sessionId match, `|hour - hour| <= 1`, and
/// Jaccard of recent-prompt sets.
#[must_use]
pub fn context_similarity(a: &ContextFingerprint, b: &ContextFingerprint) -> f32 {
	let user_match = f32::from(a.user_id.is_some() && a.user_id == b.user_id);
	let session_match = f32::from(a.session_id.is_some() && a.session_id == b.session_id);
	let hour_close = f32::from((i16::from(a.hour_of_day) - i16::from(b.hour_of_day)).abs() <= 1);
	let prompt_overlap = jaccard(&a.recent_prompts, &b.recent_prompts);
	(user_match + session_match + hour_close + prompt_overlap) / 4.0
}

struct State {
	access_log: RingBuffer<AccessPattern>,
	access_counts: HashMap<String, u64>,
	sequence_table: SequenceTable,
}

/// The prefetcher: access log, per-item counts, and a sequence table,
/// behind a single lock (§5: writers take a short lock; readers snapshot
/// and release before computing).
pub struct Prefetcher {
	config: PrefetchConfig,
	state: Mutex<State>,
}

impl Prefetcher {
	/// A new prefetcher with the given configuration.
	#[must_use]
	pub fn new(config: PrefetchConfig) -> Self {
		let capacity = config.access_log_capacity;
		Self {
			config,
			state: Mutex::new(State {
				access_log: RingBuffer::new(capacity),
				access_counts: HashMap::new(),
				sequence_table: SequenceTable::default(),
			}),
		}
	}

	/// Record one access to `item_id` under `context` at `now_ms`. Updates
	/// the access count, appends this item to the `following_items` of any
	/// still-open session-window patterns, records a sequence transition
	/// from the most recent prior access (if within the session window),
	/// and pushes a new [`AccessPattern`] onto the ring buffer.
	pub fn record_access(&self, item_id: &str, context: ContextFingerprint, now_ms: u64) {
		let mut state = self.state.lock();
		*state.access_counts.entry(item_id.to_string()).or_insert(0) += 1;

		let mut transition_from = None;
		for pattern in state.access_log.iter() {
			if now_ms.saturating_sub(pattern.timestamp_ms) <= SESSION_WINDOW_MS {
				transition_from = Some(pattern.item_id.clone());
			}
		}

		// Append this access to every still-open pattern's sequence, then
		// record the most recent one as the direct predecessor transition.
		let snapshot = state.access_log.snapshot();
		let mut updated: Vec<AccessPattern> = Vec::with_capacity(snapshot.len());
		for mut pattern in snapshot {
			if now_ms.saturating_sub(pattern.timestamp_ms) <= SESSION_WINDOW_MS {
				pattern.following_items.push(item_id.to_string());
			}
			updated.push(pattern);
		}
		state.access_log = RingBuffer::new(self.config.access_log_capacity);
		for pattern in updated {
			state.access_log.push(pattern);
		}

		if let Some(from) = transition_from {
			state.sequence_table.record(&from, item_id);
		}

		state.access_log.push(AccessPattern {
			item_id: item_id.to_string(),
			context,
			timestamp_ms: now_ms,
			following_items: Vec::new(),
		});
	}

	/// Predict up to `max_items` next-likely items given `current_item` and
	/// the current `context` (§4.9). Only predictions with blended
	/// probability `>= probability_threshold` are returned.
	#[must_use]
	pub fn predict(&self, current_item: &str, context: &ContextFingerprint) -> Vec<Prediction> {
		if !self.config.enable {
			return Vec::new();
		}
		let state = self.state.lock();
		let candidates = state.sequence_table.targets_of(current_item);
		let max_count = state.access_counts.values().copied().max().unwrap_or(0);

		let context_patterns: Vec<&AccessPattern> = state
			.access_log
			.iter()
			.filter(|p| context_similarity(&p.context, context) > self.config.context_similarity_threshold)
			.collect();

		let mut predictions: Vec<Prediction> = candidates
			.into_iter()
			.map(|candidate| {
				let seq_p = state.sequence_table.probability(current_item, &candidate);
				let context_p = if context_patterns.is_empty() {
					0.0
				} else {
					let hits = context_patterns
						.iter()
						.filter(|p| p.following_items.contains(&candidate))
						.count();
					hits as f32 / context_patterns.len() as f32
				};
				let pop_p = if max_count == 0 {
					0.0
				} else {
					state.access_counts.get(&candidate).copied().unwrap_or(0) as f32 / max_count as f32
				};
				let probability =
					self.config.alpha * seq_p + self.config.beta * context_p + self.config.gamma * pop_p;
				let data_points = context_patterns.len() + state.access_counts.len();
				let confidence = (data_points as f32 / (data_points as f32 + 10.0)).clamp(0.0, 1.0);
				Prediction {
					item_id: candidate,
					probability,
					confidence,
					reason: format!(
						"sequence={seq_p:.2} context={context_p:.2} popularity={pop_p:.2}"
					),
				}
			})
			.filter(|p| p.probability >= self.config.probability_threshold)
			.collect();

		predictions.sort_by(|a, b| b.probability.partial_cmp(&a.probability).unwrap_or(std::cmp::Ordering::Equal));
		predictions.truncate(self.config.max_items);
		predictions
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn ctx() -> ContextFingerprint {
		ContextFingerprint {
			user_id: Some("u1".into()),
			session_id: Some("s1".into()),
			hour_of_day: 10,
			recent_prompts: vec!["a cat".into()],
		}
	}

	#[test]
	fn sequence_table_probability_is_fraction_of_transitions() {
		let mut table = SequenceTable::default();
		table.record("a", "b");
		table.record("a", "b");
		table.record("a", "c");
		assert!((table.probability("a", "b") - 2.0 / 3.0).abs() < 1e-6);
		assert_eq!(table.probability("missing", "b"), 0.0);
	}

	#[test]
	fn context_similarity_of_identical_context_is_one() {
		let c = ctx();
		assert!((context_similarity(&c, &c) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn context_similarity_of_unrelated_context_is_low() {
		let a = ctx();
		let b = ContextFingerprint {
			user_id: Some("u2".into()),
			session_id: Some("s2".into()),
			hour_of_day: 22,
			recent_prompts: vec!["a city".into()],
		};
		assert!(context_similarity(&a, &b) < 0.5);
	}

	#[test]
	fn repeated_sequence_is_predicted_above_threshold() {
		let prefetcher = Prefetcher::new(PrefetchConfig::default());
		for t in 0..20 {
			let base = t * 10_000;
			prefetcher.record_access("a", ctx(), base);
			prefetcher.record_access("b", ctx(), base + 1000);
		}
		let predictions = prefetcher.predict("a", &ctx());
		assert!(predictions.iter().any(|p| p.item_id == "b"));
	}

	#[test]
	fn disabled_prefetcher_predicts_nothing() {
		let config = PrefetchConfig {
			enable: false,
			..PrefetchConfig::default()
		};
		let prefetcher = Prefetcher::new(config);
		prefetcher.record_access("a", ctx(), 0);
		prefetcher.record_access("b", ctx(), 1000);
		assert!(prefetcher.predict("a", &ctx()).is_empty());
	}

	#[test]
	fn jaccard_of_identical_sets_is_one() {
		let a = vec!["x".to_string(), "y".to_string()];
		assert!((jaccard(&a, &a) - 1.0).abs() < 1e-6);
	}
}
