//! Per-site hot paths of discovery and genotyping.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pilecall::genomics::{
    AlleleTally, BaseCallScanner, FactorialTable, GenotypeLikelihoodEngine, PileupRecord,
    ThresholdPolicy, DEFAULT_ERROR_RATE, DEFAULT_MAX_FACTORIAL,
};

const LINE: &str = "1\t10234\tA\t24\t^I.,,.T.t+2AG.,,.TT.-1C,,^!.t,.,,T$.\tIIIIIIIIIIIIIIIIIIIIIIII";

fn bench_scanner(c: &mut Criterion) {
    let record = PileupRecord::parse(LINE).unwrap();
    c.bench_function("scan_base_calls", |b| {
        b.iter(|| BaseCallScanner::new(black_box(&record.bases)).count())
    });
}

fn bench_filter(c: &mut Criterion) {
    let record = PileupRecord::parse(LINE).unwrap();
    let policy = ThresholdPolicy::default();
    let mut tally = AlleleTally::new();
    c.bench_function("tally_and_filter", |b| {
        b.iter(|| {
            tally.reset();
            tally.tally_record(black_box(&record));
            policy.evaluate(&tally, record.depth, 20.0)
        })
    });
}

fn bench_likelihood(c: &mut Criterion) {
    let factorials = FactorialTable::new(DEFAULT_MAX_FACTORIAL).unwrap();
    let engine = GenotypeLikelihoodEngine::new(DEFAULT_ERROR_RATE, factorials).unwrap();
    c.bench_function("call_biallelic", |b| {
        b.iter(|| engine.call(black_box(&[14, 9])))
    });
    c.bench_function("call_triallelic_deep", |b| {
        b.iter(|| engine.call(black_box(&[60, 45, 12])))
    });
}

criterion_group!(benches, bench_scanner, bench_filter, bench_likelihood);
criterion_main!(benches);
