//! Layer kinds and the multi-layer vector produced by vectorization.

use nalgebra::SMatrix;
use serde::{Deserialize, Serialize};

/// One of the five semantic subspaces a prompt is decomposed into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
	/// What the image is of.
	Subject,
	/// Adjectival qualities (color, material, mood words attached to nouns).
	Attribute,
	/// Artistic/rendering style.
	Style,
	/// Framing, camera angle, layout.
	Composition,
	/// Affective tone of the prompt.
	Emotion,
}

impl LayerKind {
	/// All five layers, in the fixed order used throughout the crate
	/// (matches `dimension()`'s ordering and the layer weights in
	/// [`crate::similarity`]).
	pub const ALL: [Self; 5] = [
		Self::Subject,
		Self::Attribute,
		Self::Style,
		Self::Composition,
		Self::Emotion,
	];

	/// Fixed embedding dimension for this layer.
	#[must_use]
	pub const fn dimension(self) -> usize {
		match self {
			Self::Subject => 128,
			Self::Attribute => 96,
			Self::Style => 64,
			Self::Composition => 48,
			Self::Emotion => 32,
		}
	}

	/// Fixed weight used when combining per-layer similarity into a single
	/// scalar (§4.2). Sums to 1 across `ALL`.
	#[must_use]
	pub const fn similarity_weight(self) -> f32 {
		match self {
			Self::Subject => 0.30,
			Self::Attribute => 0.25,
			Self::Style => 0.20,
			Self::Composition => 0.15,
			Self::Emotion => 0.10,
		}
	}

	/// Index into `ALL` / the relation matrix.
	#[must_use]
	pub const fn index(self) -> usize {
		match self {
			Self::Subject => 0,
			Self::Attribute => 1,
			Self::Style => 2,
			Self::Composition => 3,
			Self::Emotion => 4,
		}
	}
}

/// Number of layers (and the relation matrix's side length).
pub const NUM_LAYERS: usize = 5;

/// A 5x5 matrix of pairwise layer relations, values in `[0, 1]`, 1.0 on the
/// diagonal. See [`crate::relation`] for how it is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RelationMatrix {
	cells: [[f32; NUM_LAYERS]; NUM_LAYERS],
}

impl RelationMatrix {
	/// An identity-like matrix: 1.0 on the diagonal, 0.0 elsewhere. Used as a
	/// safe default before any relation has been computed.
	#[must_use]
	pub fn identity() -> Self {
		let mut cells = [[0.0f32; NUM_LAYERS]; NUM_LAYERS];
		for (i, row) in cells.iter_mut().enumerate() {
			row[i] = 1.0;
		}
		Self { cells }
	}

	/// Build from a raw cell grid, clamping every off-diagonal cell into
	/// `[0, 1]` and forcing the diagonal to exactly `1.0` (invariant 4).
	#[must_use]
	pub fn from_cells(mut cells: [[f32; NUM_LAYERS]; NUM_LAYERS]) -> Self {
		for (i, row) in cells.iter_mut().enumerate() {
			for (j, cell) in row.iter_mut().enumerate() {
				*cell = if i == j { 1.0 } else { cell.clamp(0.0, 1.0) };
			}
		}
		Self { cells }
	}

	/// Value at `(i, j)`.
	#[must_use]
	pub fn get(&self, i: usize, j: usize) -> f32 {
		self.cells[i][j]
	}

	/// View this matrix as a dense `nalgebra` matrix, for operations
	/// (transpose, elementwise difference) that read more naturally as
	/// linear algebra than as nested loops.
	fn as_matrix(&self) -> SMatrix<f32, NUM_LAYERS, NUM_LAYERS> {
		SMatrix::from_fn(|i, j| self.cells[i][j])
	}

	/// Average `(i,j)` and `(j,i)` into both cells, in place.
	pub fn symmetrize(&mut self) {
		let m = self.as_matrix();
		let symmetric = 0.5 * (m + m.transpose());
		for i in 0..NUM_LAYERS {
			for j in 0..NUM_LAYERS {
				self.cells[i][j] = symmetric[(i, j)];
			}
		}
	}

	/// Mean absolute difference between this matrix and `other`, used by
	/// the coherence metric (§4.2).
	#[must_use]
	pub fn mean_abs_diff(&self, other: &Self) -> f32 {
		let diff = self.as_matrix() - other.as_matrix();
		diff.abs().sum() / (NUM_LAYERS * NUM_LAYERS) as f32
	}
}

impl Default for RelationMatrix {
	fn default() -> Self {
		Self::identity()
	}
}

/// Five L2-normalized layer vectors, the 5x5 relation matrix between them,
/// and the time the vector was produced. Immutable once constructed.
///
/// Invariant 3: each layer vector is either all-zero (no token matched that
/// layer) or has L2 norm `1 ± 1e-5`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MultiLayerVector {
	subject: Vec<f32>,
	attribute: Vec<f32>,
	style: Vec<f32>,
	composition: Vec<f32>,
	emotion: Vec<f32>,
	relation: RelationMatrix,
	/// Milliseconds since epoch at construction time.
	pub created_at_ms: u64,
}

impl MultiLayerVector {
	/// Construct from five already-normalized layer vectors and a relation
	/// matrix. Panics in debug builds only via the invariant check left to
	/// callers — production construction happens exclusively through
	/// [`crate::vectorize::vectorize`], which guarantees normalization.
	#[must_use]
	pub fn new(
		subject: Vec<f32>,
		attribute: Vec<f32>,
		style: Vec<f32>,
		composition: Vec<f32>,
		emotion: Vec<f32>,
		relation: RelationMatrix,
		created_at_ms: u64,
	) -> Self {
		Self {
			subject,
			attribute,
			style,
			composition,
			emotion,
			relation,
			created_at_ms,
		}
	}

	/// Borrow the vector for a given layer.
	#[must_use]
	pub fn layer(&self, kind: LayerKind) -> &[f32] {
		match kind {
			LayerKind::Subject => &self.subject,
			LayerKind::Attribute => &self.attribute,
			LayerKind::Style => &self.style,
			LayerKind::Composition => &self.composition,
			LayerKind::Emotion => &self.emotion,
		}
	}

	/// Borrow the relation matrix.
	#[must_use]
	pub const fn relation(&self) -> &RelationMatrix {
		&self.relation
	}

	/// Total byte size of the five layer vectors, per §4.7's item-size
	/// formula: `4·len(layer)` per layer.
	#[must_use]
	pub fn layer_bytes(&self) -> u64 {
		LayerKind::ALL
			.iter()
			.map(|&l| 4 * self.layer(l).len() as u64)
			.sum()
	}
}

/// L2-normalize `v` in place. Leaves an all-zero vector untouched (invariant
/// 3 explicitly allows the zero vector as a valid "no token matched" state).
pub fn l2_normalize(v: &mut [f32]) {
	let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
	if norm > 0.0 {
		for x in v {
			*x /= norm;
		}
	}
}

/// L2 norm of `v`.
#[must_use]
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
	v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn layer_weights_sum_to_one() {
		let total: f32 = LayerKind::ALL.iter().map(|l| l.similarity_weight()).sum();
		assert!((total - 1.0).abs() < 1e-6);
	}

	#[test]
	fn identity_relation_has_unit_diagonal() {
		let m = RelationMatrix::identity();
		for i in 0..NUM_LAYERS {
			assert_eq!(m.get(i, i), 1.0);
		}
	}

	#[test]
	fn from_cells_clamps_and_forces_diagonal() {
		let mut cells = [[0.0f32; NUM_LAYERS]; NUM_LAYERS];
		cells[0][1] = 1.5;
		cells[1][0] = -0.5;
		cells[2][2] = 0.3; // diagonal entry, must become 1.0
		let m = RelationMatrix::from_cells(cells);
		assert_eq!(m.get(0, 1), 1.0);
		assert_eq!(m.get(1, 0), 0.0);
		assert_eq!(m.get(2, 2), 1.0);
	}

	#[test]
	fn symmetrize_averages_pairs() {
		let mut cells = [[0.0f32; NUM_LAYERS]; NUM_LAYERS];
		cells[0][1] = 0.8;
		cells[1][0] = 0.2;
		let mut m = RelationMatrix::from_cells(cells);
		m.symmetrize();
		assert!((m.get(0, 1) - 0.5).abs() < 1e-6);
		assert!((m.get(1, 0) - 0.5).abs() < 1e-6);
	}

	#[test]
	fn l2_normalize_produces_unit_norm() {
		let mut v = vec![3.0, 4.0];
		l2_normalize(&mut v);
		assert!((l2_norm(&v) - 1.0).abs() < 1e-5);
	}

	#[test]
	fn l2_normalize_leaves_zero_vector_zero() {
		let mut v = vec![0.0, 0.0, 0.0];
		l2_normalize(&mut v);
		assert_eq!(v, vec![0.0, 0.0, 0.0]);
	}
}
