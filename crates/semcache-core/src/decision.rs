//! Decision engine (C9).
//!
//! Combines similarity (C5), uncertainty (C6), the ensemble predictor (C7)
//! and the adaptive threshold (C8) into a single hit/diff/new call per
//! request, conservatively downgrading under high uncertainty.

use crate::ensemble::EnsembleParameters;
use crate::similarity::SimilarityMetrics;
use crate::storage::CacheItem;
use crate::threshold::ThresholdPair;
use crate::{ensemble, layer::MultiLayerVector, similarity, uncertainty};

/// The three possible actions (GLOSSARY).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
	/// Return the cached image unchanged.
	Hit,
	/// Regenerate with low denoising strength from a similar base.
	Diff,
	/// Generate from scratch.
	New,
}

impl Action {
	/// One step toward `New`; `New` downgrades to itself (never upgrades).
	#[must_use]
	pub const fn downgrade(self) -> Self {
		match self {
			Self::Hit => Self::Diff,
			Self::Diff | Self::New => Self::New,
		}
	}

	/// Total order used to verify the decision engine never returns an
	/// action "stronger" than the threshold map alone would produce
	/// (invariant 7): `Hit > Diff > New`.
	#[must_use]
	pub const fn strength(self) -> u8 {
		match self {
			Self::Hit => 2,
			Self::Diff => 1,
			Self::New => 0,
		}
	}
}

/// Configuration for the decision engine.
#[derive(Clone, Copy, Debug)]
pub struct DecisionConfig {
	/// Uncertainty above which the chosen action is downgraded one step.
	/// Spec range 0.2-0.5 depending on deployment; 0.35 is a reasonable
	/// mid-point default.
	pub uncertainty_threshold: f32,
}

impl Default for DecisionConfig {
	fn default() -> Self {
		Self {
			uncertainty_threshold: 0.35,
		}
	}
}

/// The outcome of a single decide call.
#[derive(Clone, Debug)]
pub struct Decision {
	/// The chosen action, after any uncertainty downgrade.
	pub action: Action,
	/// The action the threshold map alone would have produced, before
	/// downgrade. Used to check invariant 7 in tests and for diagnostics.
	pub undowngraded_action: Action,
	/// Id of the best-matching candidate, `None` for an empty candidate
	/// list.
	pub matched_item_id: Option<String>,
	/// `1 - uncertainty` of the winning candidate, or `1.0` for an empty
	/// candidate list.
	pub confidence: f32,
	/// Uncertainty of the winning candidate, or `0.0` for an empty
	/// candidate list.
	pub uncertainty: f32,
	/// The ensemble's predicted similarity for the winning candidate.
	pub predicted_similarity: f32,
	/// `1 - predicted_similarity`, present only when `action == Diff`.
	pub diff_strength: Option<f32>,
	/// The four similarity metrics behind the winning candidate (or all
	/// zero for an empty candidate list). Callers thread this through to
	/// [`crate::cache::SemanticCache::record_feedback`] so the ensemble can
	/// be trained from the same metrics the decision was made on.
	pub metrics: SimilarityMetrics,
}

struct Scored {
	item_id: String,
	predicted: f32,
	uncertainty: f32,
	last_access_ms: u64,
	metrics: SimilarityMetrics,
}

/// Decide an action for `query` against `candidates` (§4.6). An empty
/// candidate list always yields `New` with confidence `1.0` and
/// uncertainty `0.0` (invariant 8).
#[must_use]
pub fn decide(
	query: &MultiLayerVector,
	candidates: &[CacheItem],
	ensemble_params: &EnsembleParameters,
	thresholds: &ThresholdPair,
	config: &DecisionConfig,
) -> Decision {
	if candidates.is_empty() {
		return Decision {
			action: Action::New,
			undowngraded_action: Action::New,
			matched_item_id: None,
			confidence: 1.0,
			uncertainty: 0.0,
			predicted_similarity: 0.0,
			diff_strength: None,
			metrics: SimilarityMetrics::default(),
		};
	}

	let mut best: Option<Scored> = None;
	for candidate in candidates {
		let metrics = similarity::compute_all(query, &candidate.vector);
		let predicted = ensemble::predict(ensemble_params, metrics);
		let report = uncertainty::quantify(metrics);
		let scored = Scored {
			item_id: candidate.id.clone(),
			predicted,
			uncertainty: report.uncertainty,
			last_access_ms: candidate.last_access_ms,
			metrics,
		};
		best = Some(match best {
			None => scored,
			Some(current) => pick_better(current, scored),
		});
	}
	// Safety: candidates is non-empty, loop runs at least once.
	let best = best.expect("non-empty candidate list produces a winner");

	let undowngraded_action = thresholds.classify(best.predicted);
	let action = if best.uncertainty > config.uncertainty_threshold {
		undowngraded_action.downgrade()
	} else {
		undowngraded_action
	};

	let diff_strength = (action == Action::Diff).then_some((1.0 - best.predicted).clamp(0.0, 1.0));

	Decision {
		action,
		undowngraded_action,
		matched_item_id: Some(best.item_id),
		confidence: 1.0 - best.uncertainty,
		uncertainty: best.uncertainty,
		predicted_similarity: best.predicted,
		diff_strength,
		metrics: best.metrics,
	}
}

/// Pick the better of two candidates: higher predicted similarity wins;
/// ties broken by lower uncertainty, then by more recent `last_access_ms`
/// (§4.6).
fn pick_better(a: Scored, b: Scored) -> Scored {
	if b.predicted > a.predicted {
		return b;
	}
	if b.predicted < a.predicted {
		return a;
	}
	if b.uncertainty < a.uncertainty {
		return b;
	}
	if b.uncertainty > a.uncertainty {
		return a;
	}
	if b.last_access_ms > a.last_access_ms {
		b
	} else {
		a
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::RelationMatrix;
	use crate::storage::{ItemMetadata, TierLevel};

	fn vec_layer(v: Vec<f32>) -> MultiLayerVector {
		MultiLayerVector::new(v, vec![], vec![], vec![], vec![], RelationMatrix::identity(), 0)
	}

	fn candidate(id: &str, v: Vec<f32>, last_access_ms: u64) -> CacheItem {
		CacheItem {
			id: id.to_string(),
			vector: vec_layer(v),
			payload: vec![],
			metadata: ItemMetadata::default(),
			access_count: 1,
			last_access_ms,
			generation_difficulty: 0.2,
			tier: TierLevel::L1,
		}
	}

	#[test]
	fn empty_candidates_always_yield_new() {
		let query = vec_layer(vec![1.0, 0.0]);
		let decision = decide(
			&query,
			&[],
			&EnsembleParameters::default(),
			&ThresholdPair::default(),
			&DecisionConfig::default(),
		);
		assert_eq!(decision.action, Action::New);
		assert_eq!(decision.confidence, 1.0);
		assert_eq!(decision.uncertainty, 0.0);
		assert!(decision.matched_item_id.is_none());
	}

	#[test]
	fn exact_match_is_chosen_as_the_winner() {
		let query = vec_layer(vec![1.0, 0.0, 0.0]);
		let candidates = vec![
			candidate("far", vec![0.0, 1.0, 0.0], 0),
			candidate("exact", vec![1.0, 0.0, 0.0], 0),
		];
		let decision = decide(
			&query,
			&candidates,
			&EnsembleParameters::default(),
			&ThresholdPair::default(),
			&DecisionConfig::default(),
		);
		assert_eq!(decision.matched_item_id, Some("exact".to_string()));
	}

	#[test]
	fn diff_strength_only_set_for_diff_action() {
		let query = vec_layer(vec![1.0, 0.0]);
		let candidates = vec![candidate("a", vec![1.0, 0.0], 0)];
		let mut thresholds = ThresholdPair::default();
		thresholds.hit_cut = 0.99;
		thresholds.diff_cut = 0.4;
		let decision = decide(
			&query,
			&candidates,
			&EnsembleParameters::default(),
			&thresholds,
			&DecisionConfig {
				uncertainty_threshold: 1.0,
			},
		);
		if decision.action == Action::Diff {
			assert!(decision.diff_strength.unwrap() > 0.0);
		} else {
			assert!(decision.diff_strength.is_none());
		}
	}

	#[test]
	fn downgrade_never_upgrades() {
		assert_eq!(Action::New.downgrade(), Action::New);
		assert_eq!(Action::Diff.downgrade(), Action::New);
		assert_eq!(Action::Hit.downgrade(), Action::Diff);
	}

	#[test]
	fn decision_action_never_stronger_than_undowngraded() {
		let query = vec_layer(vec![1.0, 0.0]);
		let candidates = vec![candidate("a", vec![1.0, 0.0], 0)];
		let decision = decide(
			&query,
			&candidates,
			&EnsembleParameters::default(),
			&ThresholdPair::default(),
			&DecisionConfig {
				uncertainty_threshold: -1.0,
			},
		);
		assert!(decision.action.strength() <= decision.undowngraded_action.strength());
	}
}
