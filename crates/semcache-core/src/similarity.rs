//! Similarity calculators (C5).
//!
//! Four independent metrics between two [`MultiLayerVector`]s, each defined
//! per layer and weight-summed with [`LayerKind::similarity_weight`]. Every
//! metric absorbs degenerate inputs (zero norm, empty reduction) to `0.0`
//! rather than propagating a `NaN` or panicking — callers downstream
//! (uncertainty, ensemble, decision) all assume finite `[0, 1]` values.

use crate::layer::{LayerKind, MultiLayerVector};

/// The four similarity scalars computed between a query and a candidate,
/// each in `[0, 1]`.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SimilarityMetrics {
	/// Per-layer cosine, weight-summed across layers.
	pub cosine: f32,
	/// Discretized edit-distance similarity ("tree"), weight-summed.
	pub tree: f32,
	/// Reduced-dimension Pearson correlation ("latent"), weight-summed.
	pub latent: f32,
	/// `1 - mean_abs_diff` of the two relation matrices.
	pub coherence: f32,
}

impl SimilarityMetrics {
	/// The four metrics as a fixed-order array, matching the order used by
	/// [`crate::uncertainty`] and [`crate::ensemble`].
	#[must_use]
	pub fn as_array(&self) -> [f32; 4] {
		[self.cosine, self.tree, self.latent, self.coherence]
	}
}

/// Cosine similarity between two equal-length vectors, `0.0` if either is
/// zero-norm or the lengths differ.
#[must_use]
#[inline]
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}
	let (dot, norm_a, norm_b) = a
		.iter()
		.zip(b.iter())
		.fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (&x, &y)| {
			(x.mul_add(y, dot), x.mul_add(x, na), y.mul_add(y, nb))
		});
	let magnitude = norm_a.sqrt() * norm_b.sqrt();
	if magnitude <= 0.0 {
		0.0
	} else {
		(dot / magnitude).clamp(0.0, 1.0)
	}
}

/// Weight-sum a per-layer scalar metric using [`LayerKind::similarity_weight`].
fn weight_sum(per_layer: [f32; 5]) -> f32 {
	LayerKind::ALL
		.iter()
		.zip(per_layer.iter())
		.map(|(l, &v)| l.similarity_weight() * v)
		.sum()
}

/// Per-layer weighted cosine similarity (§4.2).
#[must_use]
pub fn cosine_metric(a: &MultiLayerVector, b: &MultiLayerVector) -> f32 {
	let per_layer = LayerKind::ALL.map(|l| cosine(a.layer(l), b.layer(l)));
	weight_sum(per_layer).clamp(0.0, 1.0)
}

/// Discretize a component into one of 10 bins, `[0, 9]`.
fn bin(v: f32) -> u8 {
	(v.clamp(0.0, 0.999_999) * 10.0).floor() as u8
}

/// Levenshtein edit distance between two byte strings.
fn levenshtein(a: &[u8], b: &[u8]) -> usize {
	if a.is_empty() {
		return b.len();
	}
	if b.is_empty() {
		return a.len();
	}
	let mut prev: Vec<usize> = (0..=b.len()).collect();
	let mut curr = vec![0usize; b.len() + 1];
	for (i, &ca) in a.iter().enumerate() {
		curr[0] = i + 1;
		for (j, &cb) in b.iter().enumerate() {
			let cost = usize::from(ca != cb);
			curr[j + 1] = (prev[j] + cost).min(curr[j] + 1).min(prev[j + 1] + 1);
		}
		std::mem::swap(&mut prev, &mut curr);
	}
	prev[b.len()]
}

/// One layer's tree ("discretized edit distance") similarity: discretize
/// every component into 10 bins, Levenshtein-distance the resulting byte
/// strings, return `1 - edit/max_len`. `1.0` when both layers are empty.
fn tree_layer(a: &[f32], b: &[f32]) -> f32 {
	if a.is_empty() && b.is_empty() {
		return 1.0;
	}
	let da: Vec<u8> = a.iter().map(|&x| bin(x)).collect();
	let db: Vec<u8> = b.iter().map(|&x| bin(x)).collect();
	let max_len = da.len().max(db.len());
	if max_len == 0 {
		return 1.0;
	}
	let dist = levenshtein(&da, &db);
	(1.0 - dist as f32 / max_len as f32).clamp(0.0, 1.0)
}

/// Per-layer discretized edit-distance similarity (§4.2).
#[must_use]
pub fn tree_metric(a: &MultiLayerVector, b: &MultiLayerVector) -> f32 {
	let per_layer = LayerKind::ALL.map(|l| tree_layer(a.layer(l), b.layer(l)));
	weight_sum(per_layer).clamp(0.0, 1.0)
}

/// Average adjacent pairs, producing a vector of length `floor(n/2)`.
fn reduce_adjacent(v: &[f32]) -> Vec<f32> {
	v.chunks_exact(2).map(|pair| 0.5 * (pair[0] + pair[1])).collect()
}

/// Pearson correlation between two equal-length vectors. `0.0` if either
/// has zero variance or the lengths differ or are empty.
fn pearson(a: &[f32], b: &[f32]) -> f32 {
	if a.len() != b.len() || a.is_empty() {
		return 0.0;
	}
	let n = a.len() as f32;
	let mean_a = a.iter().sum::<f32>() / n;
	let mean_b = b.iter().sum::<f32>() / n;
	let mut cov = 0.0f32;
	let mut var_a = 0.0f32;
	let mut var_b = 0.0f32;
	for (&x, &y) in a.iter().zip(b.iter()) {
		let da = x - mean_a;
		let db = y - mean_b;
		cov += da * db;
		var_a += da * da;
		var_b += db * db;
	}
	let denom = var_a.sqrt() * var_b.sqrt();
	if denom <= 0.0 {
		0.0
	} else {
		(cov / denom).clamp(-1.0, 1.0)
	}
}

/// One layer's latent similarity: reduce both layers by averaging adjacent
/// pairs, Pearson-correlate the reductions, map `[-1, 1] -> [0, 1]`.
fn latent_layer(a: &[f32], b: &[f32]) -> f32 {
	let ra = reduce_adjacent(a);
	let rb = reduce_adjacent(b);
	let r = pearson(&ra, &rb);
	(r + 1.0) / 2.0
}

/// Per-layer reduced-dimension correlation similarity (§4.2).
#[must_use]
pub fn latent_metric(a: &MultiLayerVector, b: &MultiLayerVector) -> f32 {
	let per_layer = LayerKind::ALL.map(|l| latent_layer(a.layer(l), b.layer(l)));
	weight_sum(per_layer).clamp(0.0, 1.0)
}

/// `1 - mean_abs_diff` of the two relation matrices, clamped to `[0, 1]`.
#[must_use]
pub fn coherence_metric(a: &MultiLayerVector, b: &MultiLayerVector) -> f32 {
	(1.0 - a.relation().mean_abs_diff(b.relation())).clamp(0.0, 1.0)
}

/// Compute all four metrics between `a` and `b`.
#[must_use]
pub fn compute_all(a: &MultiLayerVector, b: &MultiLayerVector) -> SimilarityMetrics {
	SimilarityMetrics {
		cosine: cosine_metric(a, b),
		tree: tree_metric(a, b),
		latent: latent_metric(a, b),
		coherence: coherence_metric(a, b),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::layer::RelationMatrix;

	fn vector_from(subject: Vec<f32>) -> MultiLayerVector {
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

	#[test]
	fn cosine_of_identical_vectors_is_one() {
		let v = vector_from(vec![1.0, 0.0, 0.0]);
		assert!((cosine_metric(&v, &v) - LayerKind::Subject.similarity_weight()).abs() < 1e-5);
	}

	#[test]
	fn cosine_is_symmetric_and_bounded() {
		let a = vector_from(vec![1.0, 0.0]);
		let b = vector_from(vec![0.5, 0.5]);
		let ab = cosine_metric(&a, &b);
		let ba = cosine_metric(&b, &a);
		assert!((ab - ba).abs() < 1e-5);
		assert!((0.0..=1.0).contains(&ab));
	}

	#[test]
	fn zero_vector_cosine_is_zero() {
		let a = vector_from(vec![0.0, 0.0]);
		let b = vector_from(vec![1.0, 0.0]);
		assert_eq!(cosine(a.layer(LayerKind::Subject), b.layer(LayerKind::Subject)), 0.0);
	}

	#[test]
	fn tree_metric_of_identical_vectors_is_full_weight() {
		let v = vector_from(vec![0.9, 0.1, 0.5]);
		let total: f32 = LayerKind::ALL.iter().map(|l| l.similarity_weight()).sum();
		assert!((tree_metric(&v, &v) - total).abs() < 1e-5);
	}

	#[test]
	fn levenshtein_empty_strings_is_zero() {
		assert_eq!(levenshtein(&[], &[]), 0);
	}

	#[test]
	fn latent_metric_of_identical_vectors_is_full_weight() {
		let v = vector_from(vec![0.1, 0.2, 0.3, 0.4]);
		let total: f32 = LayerKind::ALL.iter().map(|l| l.similarity_weight()).sum();
		assert!((latent_metric(&v, &v) - total).abs() < 1e-4);
	}

	#[test]
	fn latent_metric_handles_short_vectors_without_panicking() {
		let a = vector_from(vec![1.0]);
		let b = vector_from(vec![0.0]);
		let _ = latent_metric(&a, &b);
	}

	#[test]
	fn coherence_of_identical_matrices_is_one() {
		let v = vector_from(vec![1.0, 0.0]);
		assert_eq!(coherence_metric(&v, &v), 1.0);
	}

	#[test]
	fn compute_all_is_finite_for_degenerate_input() {
		let a = vector_from(vec![]);
		let b = vector_from(vec![]);
		let m = compute_all(&a, &b);
		for v in m.as_array() {
			assert!(v.is_finite());
			assert!((0.0..=1.0).contains(&v));
		}
	}
}
