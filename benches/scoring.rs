use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use resume_match::{DocumentType, SummaryEmbedding, VectorDocument, compute_similarity};
use std::hint::black_box;

const DIMENSION: usize = 768;

// Deterministic pseudo-random vectors so runs are comparable.
fn vectors(count: usize, seed: u32) -> Vec<Vec<f32>> {
    let mut state = seed.wrapping_mul(2_654_435_761).max(1);
    (0..count)
        .map(|_| {
            (0..DIMENSION)
                .map(|_| {
                    state ^= state << 13;
                    state ^= state >> 17;
                    state ^= state << 5;
                    (state % 2000) as f32 / 1000.0 - 1.0
                })
                .collect()
        })
        .collect()
}

fn document(document_type: DocumentType, seed: u32, items: usize) -> VectorDocument {
    VectorDocument {
        embedding_model: "bench-model".to_string(),
        source_hash: format!("bench-{seed}"),
        document_type,
        experience_years: Some(5.0),
        summary: SummaryEmbedding::Pooled(vectors(3, seed)),
        skills: vectors(items, seed + 1),
        certifications: vectors(2, seed + 2),
        responsibilities: vectors(items, seed + 3),
        degraded_fields: Vec::new(),
        created_at: Utc::now(),
    }
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let jd = document(DocumentType::Jd, 7, 12);
    let resume = document(DocumentType::Resume, 42, 25);
    c.bench_function("compute_similarity", |b| {
        b.iter(|| compute_similarity(black_box(&jd), black_box(&resume)))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
