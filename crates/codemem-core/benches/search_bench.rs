//! Benchmarks for hot-path retrieval and consolidation operations.
//! Run with: cargo bench -p codemem-core

use chrono::Utc;
use codemem_core::config::LifecycleConfig;
use codemem_core::embeddings::cosine_similarity;
use codemem_core::lifecycle::reweight_by_lifecycle;
use codemem_core::model::{
    ContextLevel, LifecycleState, MemoryCategory, MemoryProvenance, MemoryScope, MemoryUnit,
    ProvenanceSource,
};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use uuid::Uuid;

fn sample_unit(days_old: i64) -> MemoryUnit {
    let now = Utc::now();
    MemoryUnit {
        id: Uuid::new_v4(),
        content: "sample memory content for benchmarking".into(),
        category: MemoryCategory::Fact,
        context_level: ContextLevel::ProjectContext,
        scope: MemoryScope::Global,
        project_name: None,
        importance: 0.5,
        tags: Default::default(),
        metadata: Default::default(),
        created_at: now - chrono::Duration::days(days_old),
        updated_at: now,
        last_accessed: now - chrono::Duration::days(days_old),
        lifecycle_state: LifecycleState::Active,
        provenance: MemoryProvenance::capture(ProvenanceSource::UserExplicit, None),
        embedding_model: "bench".into(),
    }
}

fn bench_cosine_similarity(c: &mut Criterion) {
    let a: Vec<f32> = (0..256).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..256).map(|i| (i as f32).cos()).collect();

    c.bench_function("cosine_similarity_256d", |bench| {
        bench.iter(|| black_box(cosine_similarity(&a, &b)));
    });
}

fn bench_reweight_by_lifecycle(c: &mut Criterion) {
    let config = LifecycleConfig::default();
    let hits: Vec<(MemoryUnit, f32)> = (0..200)
        .map(|i| (sample_unit(i % 400), 1.0 - (i as f32 / 200.0)))
        .collect();

    c.bench_function("reweight_by_lifecycle_200", |bench| {
        bench.iter(|| black_box(reweight_by_lifecycle(hits.clone(), &config, Utc::now())));
    });
}

criterion_group!(benches, bench_cosine_similarity, bench_reweight_by_lifecycle);
criterion_main!(benches);
