use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Instant;
use weak_cache::{Interner, Signature};

fn intern_cold(c: &mut Criterion) {
    c.bench_function("Interner: signature, cold", |b| {
        b.iter_custom(|iters| {
            let interner: Interner<Signature<u64>> = Interner::new();
            let ret = Arc::new(u64::MAX);
            let params: Vec<Arc<u64>> = (0..iters).map(Arc::new).collect();
            let mut signatures = Vec::with_capacity(params.len());
            let start = Instant::now();
            for param in &params {
                signatures.push(interner.signature(&ret, &[param.clone(), ret.clone()]));
            }
            let elapsed = start.elapsed();
            drop(signatures);
            elapsed
        })
    });
}

fn intern_warmed_up(c: &mut Criterion) {
    c.bench_function("Interner: signature, warmed up", |b| {
        b.iter_custom(|iters| {
            let interner: Interner<Signature<u64>> = Interner::new();
            let ret = Arc::new(u64::MAX);
            let params: Vec<Arc<u64>> = (0..iters).map(Arc::new).collect();
            let signatures: Vec<_> = params
                .iter()
                .map(|param| interner.signature(&ret, &[param.clone(), ret.clone()]))
                .collect();
            let start = Instant::now();
            for (param, signature) in params.iter().zip(signatures.iter()) {
                let interned = interner.signature(&ret, &[param.clone(), ret.clone()]);
                assert!(Arc::ptr_eq(&interned, signature));
            }
            start.elapsed()
        })
    });
}

criterion_group!(interner, intern_cold, intern_warmed_up);
criterion_main!(interner);
