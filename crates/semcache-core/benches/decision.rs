//! Benchmarks for the decision/candidate-ranking hot path (C5-C9).
//!
//! Tests `decide`'s cost as the candidate-list size grows, since every
//! candidate pays a full four-metric similarity computation plus an
//! ensemble prediction and an uncertainty quantification.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use semcache_core::decision::{decide, DecisionConfig};
use semcache_core::ensemble::EnsembleParameters;
use semcache_core::layer::{LayerKind, MultiLayerVector, RelationMatrix};
use semcache_core::storage::{CacheItem, ItemMetadata, TierLevel};
use semcache_core::threshold::ThresholdPair;

fn random_vector(rng: &mut impl Rng) -> MultiLayerVector {
	let subject: Vec<f32> = (0..LayerKind::Subject.dimension()).map(|_| rng.gen::<f32>()).collect();
	let attribute: Vec<f32> = (0..LayerKind::Attribute.dimension()).map(|_| rng.gen::<f32>()).collect();
	let style: Vec<f32> = (0..LayerKind::Style.dimension()).map(|_| rng.gen::<f32>()).collect();
	let composition: Vec<f32> = (0..LayerKind::Composition.dimension()).map(|_| rng.gen::<f32>()).collect();
	let emotion: Vec<f32> = (0..LayerKind::Emotion.dimension()).map(|_| rng.gen::<f32>()).collect();
	MultiLayerVector::new(subject, attribute, style, composition, emotion, RelationMatrix::identity(), 0)
}

fn generate_candidates(count: usize) -> Vec<CacheItem> {
	let mut rng = rand::thread_rng();
	(0..count)
		.map(|i| CacheItem {
			id: format!("item{i}"),
			vector: random_vector(&mut rng),
			payload: vec![0u8; 1024],
			metadata: ItemMetadata::default(),
			access_count: rng.gen_range(1..200),
			last_access_ms: rng.gen_range(0..1_000_000),
			generation_difficulty: rng.gen::<f32>(),
			tier: TierLevel::L1,
		})
		.collect()
}

fn bench_decide_by_candidate_count(c: &mut Criterion) {
	let mut group = c.benchmark_group("decide_candidate_count");
	let mut rng = rand::thread_rng();
	let query = random_vector(&mut rng);
	let ensemble = EnsembleParameters::default();
	let thresholds = ThresholdPair::default();
	let config = DecisionConfig::default();

	for candidate_count in &[1, 10, 50, 200] {
		let candidates = generate_candidates(*candidate_count);
		let _ = group.throughput(Throughput::Elements(*candidate_count as u64));
		let _ = group.bench_with_input(
			BenchmarkId::new("candidates", candidate_count),
			candidate_count,
			|bench, _| {
				bench.iter(|| {
					decide(
						black_box(&query),
						black_box(&candidates),
						black_box(&ensemble),
						black_box(&thresholds),
						black_box(&config),
					)
				});
			},
		);
	}

	group.finish();
}

criterion_group!(benches, bench_decide_by_candidate_count);
criterion_main!(benches);
