//! Therapy Search Benchmarks
//!
//! Synthetic fact bases with overlapping indications and a sprinkling of
//! interactions, solved for every disease they know.
//! Run with: cargo bench -p safetherapy-core

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use safetherapy_core::{
    AdverseEventTable, CostModel, DiseaseId, FactBase, FrailtyTable, PatientProfile, RiskOracles,
    SearchConfig, Severity, Sex, TherapyNode, TherapyOptimizer,
};
use std::sync::Arc;

/// `diseases` targets, three drugs per disease, every third drug pleiotropic
fn synthetic_facts(diseases: usize) -> FactBase {
    let mut builder = FactBase::builder();
    let drugs = diseases * 3;
    for d in 0..drugs {
        let drug = format!("drug_{:03}", d);
        let home = d % diseases;
        builder = builder.indication(&drug, &format!("disease_{:03}", home), (d % 3 + 1) as u8);
        if d % 3 == 0 {
            let neighbour = (home + 1) % diseases;
            builder = builder.indication(&drug, &format!("disease_{:03}", neighbour), 2);
        }
    }
    for d in (0..drugs).step_by(4) {
        let other = (d * 7 + 5) % drugs;
        if other != d {
            let severity = if d % 8 == 0 { Severity::High } else { Severity::Medium };
            builder = builder.interaction(
                &format!("drug_{:03}", d),
                &format!("drug_{:03}", other),
                severity,
                "synthetic",
            );
        }
    }
    builder.build()
}

fn synthetic_oracles(diseases: usize) -> RiskOracles {
    let table = (0..diseases * 3).fold(AdverseEventTable::new(), |t, d| {
        t.with_baseline(&format!("drug_{:03}", d), 0.05 + (d % 10) as f64 * 0.03)
    });
    RiskOracles::new(Arc::new(table), Arc::new(FrailtyTable::new()))
}

fn targets(diseases: usize) -> Vec<DiseaseId> {
    (0..diseases).map(|x| DiseaseId::from(format!("disease_{:03}", x))).collect()
}

fn patient() -> PatientProfile {
    PatientProfile::new(72.0, 61.0, Sex::Female, vec!["chronic_kidney_disease".into()])
}

// ============================================================================
// Search Benchmarks
// ============================================================================

fn bench_solve(c: &mut Criterion) {
    let mut group = c.benchmark_group("solve");
    let p = patient();

    for size in [2usize, 4, 6, 8] {
        let optimizer = TherapyOptimizer::new(
            Arc::new(synthetic_facts(size)),
            synthetic_oracles(size),
            SearchConfig::default(),
        );
        let goals = targets(size);

        group.bench_with_input(BenchmarkId::new("diseases", size), &size, |b, _| {
            b.iter(|| black_box(optimizer.solve(black_box(&p), black_box(&goals))))
        });
    }

    group.finish();
}

fn bench_expand(c: &mut Criterion) {
    let facts = synthetic_facts(8);
    let oracles = synthetic_oracles(8);
    let config = SearchConfig::default();
    let p = patient();

    c.bench_function("expand_root_8", |b| {
        b.iter(|| {
            let mut cost = CostModel::new(&config, &facts, &oracles, &p);
            let root = TherapyNode::root(targets(8).into_iter().collect(), &cost);
            black_box(root.expand(&mut cost))
        })
    });
}

criterion_group!(benches, bench_solve, bench_expand);
criterion_main!(benches);
