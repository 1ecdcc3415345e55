//! Cross-layer relation matrix calculator (C3).
//!
//! Direct cross-layer cosine is undefined — layers have different
//! dimensions — so the relation between two layers is approximated from
//! per-layer statistical moments (mean, stddev, skew) plus an optional
//! token-co-occurrence blend.

use crate::layer::{LayerKind, RelationMatrix, NUM_LAYERS};

/// Per-layer statistics over a layer vector's components, used to compare
/// layers that live in different dimensions.
#[derive(Clone, Copy, Debug, Default)]
pub struct LayerMoments {
	mean: f32,
	stddev: f32,
	skew: f32,
}

impl LayerMoments {
	/// Compute mean/stddev/skew over `v`. All three are `0.0` for an empty
	/// or all-zero vector.
	#[must_use]
	pub fn compute(v: &[f32]) -> Self {
		if v.is_empty() {
			return Self::default();
		}
		let n = v.len() as f32;
		let mean = v.iter().sum::<f32>() / n;
		let variance = v.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / n;
		let stddev = variance.sqrt();
		let skew = if stddev > 0.0 {
			v.iter().map(|x| ((x - mean) / stddev).powi(3)).sum::<f32>() / n
		} else {
			0.0
		};
		Self { mean, stddev, skew }
	}

	/// Statistical-moment similarity between two layers (§4.1): each of
	/// |Δmean|, |Δstddev|, |Δskew| is mapped `1 - absdiff` (clamped to
	/// `[0,1]`) and combined 0.4/0.4/0.2.
	#[must_use]
	pub fn similarity(&self, other: &Self) -> f32 {
		let mean_sim = (1.0 - (self.mean - other.mean).abs()).clamp(0.0, 1.0);
		let std_sim = (1.0 - (self.stddev - other.stddev).abs()).clamp(0.0, 1.0);
		let skew_sim = (1.0 - (self.skew - other.skew).abs()).clamp(0.0, 1.0);
		0.4 * mean_sim + 0.4 * std_sim + 0.2 * skew_sim
	}
}

/// Token-window co-occurrence score between two layers' token streams,
/// using a sliding window of `window_size` tokens. Returns a value in
/// `[0, 1]`: the fraction of window pairs where a token from `tokens_a`
/// and a token from `tokens_b` fall in the same window.
///
/// This is a coarse proxy, not a real co-occurrence statistic — both input
/// slices are expected to be the same underlying tokenized prompt split
/// into per-layer-relevant subsets; an empty window yields `0.0`.
#[must_use]
pub fn cooccurrence_score(tokens_a: &[&str], tokens_b: &[&str], window_size: usize) -> f32 {
	if tokens_a.is_empty() || tokens_b.is_empty() || window_size == 0 {
		return 0.0;
	}
	let mut hits = 0usize;
	let mut total = 0usize;
	for (i, ta) in tokens_a.iter().enumerate() {
		let lo = i.saturating_sub(window_size);
		let hi = (i + window_size).min(tokens_b.len().saturating_sub(1));
		if tokens_b.is_empty() {
			continue;
		}
		for tb in &tokens_b[lo..=hi.min(tokens_b.len() - 1)] {
			total += 1;
			if ta == tb {
				hits += 1;
			}
		}
	}
	if total == 0 {
		0.0
	} else {
		hits as f32 / total as f32
	}
}

/// Build the 5x5 relation matrix from per-layer moments, optionally
/// blending 80/20 with a co-occurrence score per cell, and optionally
/// symmetrizing.
#[must_use]
pub fn build_relation_matrix(
	moments: &[LayerMoments; NUM_LAYERS],
	cooccurrence: Option<&[[f32; NUM_LAYERS]; NUM_LAYERS]>,
	symmetrize: bool,
) -> RelationMatrix {
	let mut cells = [[0.0f32; NUM_LAYERS]; NUM_LAYERS];
	for i in 0..NUM_LAYERS {
		for j in 0..NUM_LAYERS {
			if i == j {
				cells[i][j] = 1.0;
				continue;
			}
			let moment_sim = moments[i].similarity(&moments[j]);
			cells[i][j] = match cooccurrence {
				Some(co) => 0.8 * moment_sim + 0.2 * co[i][j],
				None => moment_sim,
			};
		}
	}
	let mut matrix = RelationMatrix::from_cells(cells);
	if symmetrize {
		matrix.symmetrize();
	}
	matrix
}

/// Convenience wrapper computing moments directly from the five layer
/// vectors (in [`LayerKind::ALL`] order) and building the matrix.
#[must_use]
pub fn relation_matrix_from_layers(
	layers: &[&[f32]; NUM_LAYERS],
	cooccurrence: Option<&[[f32; NUM_LAYERS]; NUM_LAYERS]>,
	symmetrize: bool,
) -> RelationMatrix {
	let mut moments = [LayerMoments::default(); NUM_LAYERS];
	for (i, layer) in layers.iter().enumerate() {
		moments[i] = LayerMoments::compute(layer);
	}
	let _ = LayerKind::ALL;
	build_relation_matrix(&moments, cooccurrence, symmetrize)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn identical_layers_have_moment_similarity_one() {
		let m = LayerMoments::compute(&[1.0, 2.0, 3.0, 4.0]);
		assert!((m.similarity(&m) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn empty_layer_has_zero_moments() {
		let m = LayerMoments::compute(&[]);
		assert_eq!(m.mean, 0.0);
		assert_eq!(m.stddev, 0.0);
	}

	#[test]
	fn relation_matrix_has_unit_diagonal_and_bounded_cells() {
		let layers: [&[f32]; NUM_LAYERS] = [
			&[0.1, 0.2, 0.3],
			&[0.5, 0.5],
			&[0.9],
			&[0.0, 0.0],
			&[0.3, 0.3, 0.3, 0.3],
		];
		let m = relation_matrix_from_layers(&layers, None, false);
		for i in 0..NUM_LAYERS {
			assert_eq!(m.get(i, i), 1.0);
			for j in 0..NUM_LAYERS {
				assert!((0.0..=1.0).contains(&m.get(i, j)));
			}
		}
	}

	#[test]
	fn cooccurrence_of_disjoint_tokens_is_low() {
		let a = vec!["cat", "windowsill"];
		let b = vec!["city", "cyberpunk"];
		let score = cooccurrence_score(&a, &b, 5);
		assert_eq!(score, 0.0);
	}

	#[test]
	fn cooccurrence_of_identical_streams_is_high() {
		let a = vec!["cat", "cat", "cat"];
		let score = cooccurrence_score(&a, &a, 5);
		assert!(score > 0.5);
	}

	/// The intended call shape (§4.1, vectorize.rs's per-layer matched-token
	/// subsets): two *distinct* token slices, e.g. a subject-layer subset and
	/// a style-layer subset of the same prompt, with some overlap but not
	/// identical. A shared token should still register as a hit within the
	/// window without the two slices needing to be the same object.
	#[test]
	fn cooccurrence_of_distinct_overlapping_slices_counts_shared_tokens() {
		let subject_tokens = vec!["cat", "windowsill", "sunlight"];
		let style_tokens = vec!["painterly", "cat", "warm"];
		let score = cooccurrence_score(&subject_tokens, &style_tokens, 5);
		assert!(score > 0.0);

		let disjoint_style_tokens = vec!["painterly", "moody", "warm"];
		let disjoint_score = cooccurrence_score(&subject_tokens, &disjoint_style_tokens, 5);
		assert!(score > disjoint_score);
	}
}
