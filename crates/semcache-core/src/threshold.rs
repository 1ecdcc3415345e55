//! Adaptive threshold (C8).
//!
//! Two cut-points partition predicted similarity into hit/diff/new. The
//! cut-points adapt from aggregated explicit feedback once enough records
//! have accumulated, per §4.5.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decision::Action;
use crate::feedback::FeedbackRecord;

/// Minimum aggregate feedback records before an update is attempted.
pub const MIN_FEEDBACK_FOR_UPDATE: usize = 50;
/// Minimum per-action sample count before that action's rate influences an
/// update.
const MIN_SAMPLES_PER_ACTION: usize = 10;

const HIT_CUT_MIN: f32 = 0.7;
const HIT_CUT_MAX: f32 = 0.95;
const DIFF_CUT_MIN: f32 = 0.4;
const MIN_GAP: f32 = 0.05;
const CLAMP_EPSILON: f32 = 1e-4;

/// Hit/diff cut-points. Invariant (clamped after every update): `hit_cut >=
/// diff_cut + epsilon`, `hit_cut` in `[0.7, 0.95]`, `diff_cut` in `[0.4,
/// hit_cut - 0.05]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdPair {
	/// Similarity at or above which the action is `hit`.
	pub hit_cut: f32,
	/// Similarity at or above which the action is `diff` (below `hit_cut`).
	pub diff_cut: f32,
}

impl Default for ThresholdPair {
	fn default() -> Self {
		Self {
			hit_cut: 0.85,
			diff_cut: 0.65,
		}
	}
}

impl ThresholdPair {
	/// Map a predicted similarity to an action, ignoring uncertainty
	/// downgrade (applied separately by the decision engine, §4.6).
	#[must_use]
	pub fn classify(&self, similarity: f32) -> Action {
		if similarity >= self.hit_cut {
			Action::Hit
		} else if similarity >= self.diff_cut {
			Action::Diff
		} else {
			Action::New
		}
	}

	/// Clamp both cuts back into their allowed ranges and preserve the
	/// minimum gap, logging if a clamp actually changed a value (§7:
	/// "invariant-breaking threshold update" is logged, not fatal).
	fn clamp(&mut self) {
		let before = *self;
		self.hit_cut = self.hit_cut.clamp(HIT_CUT_MIN, HIT_CUT_MAX);
		self.diff_cut = self
			.diff_cut
			.clamp(DIFF_CUT_MIN, self.hit_cut - MIN_GAP);
		if self.hit_cut < self.diff_cut + MIN_GAP {
			self.hit_cut = (self.diff_cut + MIN_GAP).min(HIT_CUT_MAX);
		}
		if (before.hit_cut - self.hit_cut).abs() > CLAMP_EPSILON
			|| (before.diff_cut - self.diff_cut).abs() > CLAMP_EPSILON
		{
			debug!(
				before.hit_cut,
				before.diff_cut, self.hit_cut, self.diff_cut, "threshold update clamped"
			);
		}
	}
}

/// Infer the action a feedback record implies from
/// `implicit.regeneration_count`: `0 -> hit`, `1 -> diff`, `>=2 -> new`
/// (§4.5, §9 Open Question: the source does not persist the actual
/// decision, so this heuristic substitutes for it).
#[must_use]
pub fn infer_action(record: &FeedbackRecord) -> Action {
	match record.implicit.regeneration_count {
		0 => Action::Hit,
		1 => Action::Diff,
		_ => Action::New,
	}
}

/// Per-action acceptance rate over a feedback batch.
#[derive(Clone, Copy, Debug, Default)]
struct ActionRate {
	accepted: usize,
	total: usize,
}

impl ActionRate {
	fn rate(self) -> Option<f32> {
		if self.total == 0 {
			None
		} else {
			Some(self.accepted as f32 / self.total as f32)
		}
	}
}

/// Apply the adaptive-threshold update rule (§4.5) over `records`,
/// returning a new, clamped [`ThresholdPair`]. Does nothing (returns `*pair`
/// unchanged) if `records.len() < MIN_FEEDBACK_FOR_UPDATE`.
#[must_use]
pub fn update(pair: &ThresholdPair, records: &[FeedbackRecord]) -> ThresholdPair {
	if records.len() < MIN_FEEDBACK_FOR_UPDATE {
		return *pair;
	}

	let mut hit_rate = ActionRate::default();
	let mut diff_rate = ActionRate::default();
	for record in records {
		let accepted = record.explicit == crate::feedback::ExplicitFeedback::Accepted;
		match infer_action(record) {
			Action::Hit => {
				hit_rate.total += 1;
				hit_rate.accepted += usize::from(accepted);
			}
			Action::Diff => {
				diff_rate.total += 1;
				diff_rate.accepted += usize::from(accepted);
			}
			Action::New => {}
		}
	}

	let mut updated = *pair;

	if hit_rate.total >= MIN_SAMPLES_PER_ACTION {
		if let Some(rate) = hit_rate.rate() {
			if rate < 0.7 {
				updated.hit_cut = (updated.hit_cut + 0.02).min(HIT_CUT_MAX);
			} else if rate > 0.9 {
				updated.hit_cut = (updated.hit_cut - 0.01).max(HIT_CUT_MIN);
			}
		}
	}

	if diff_rate.total >= MIN_SAMPLES_PER_ACTION {
		if let Some(rate) = diff_rate.rate() {
			if rate < 0.6 {
				updated.diff_cut += 0.02;
			} else if rate > 0.85 {
				updated.diff_cut -= 0.01;
			}
		}
	}

	updated.clamp();
	updated
}
