use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use metron::calc::estimate::estimate_person_ability;
use metron::calc::matrix;
use metron::calc::model::ModelKind;
use metron::config::EstimationConfig;
use metron::data::{ItemParamList, ItemParams, Outcome, ParamStatus, ResponseRecord, ResponseSet};

fn synthetic_attempt(items: usize) -> (ResponseSet, ItemParamList) {
    let mut rng = StdRng::seed_from_u64(0xCA7_5EED);
    let mut params = Vec::with_capacity(items);
    let mut records = Vec::with_capacity(items);
    for i in 0..items {
        let id = format!("B{i:03}");
        let difficulty = rng.gen_range(-2.0..2.0);
        let discrimination = rng.gen_range(0.5..2.0);
        params.push(
            ItemParams::new(
                id.clone(),
                ModelKind::TwoParam,
                vec![difficulty, discrimination],
                ParamStatus::EstimatedAutomatically,
            )
            .unwrap(),
        );
        records.push(ResponseRecord {
            person: 1,
            item: id,
            outcome: if i % 2 == 0 { Outcome::Correct } else { Outcome::Incorrect },
            timestamp: i as i64,
        });
    }
    (ResponseSet::new(records), params.into_iter().collect())
}

fn benchmark_ability(c: &mut Criterion) {
    let config = EstimationConfig::default();
    let mut group = c.benchmark_group("estimate_person_ability");
    for items in [10_usize, 25, 100] {
        let (responses, params) = synthetic_attempt(items);
        group.bench_with_input(BenchmarkId::from_parameter(items), &items, |b, _| {
            b.iter(|| {
                estimate_person_ability(black_box(&responses), black_box(&params), &config)
                    .unwrap()
            })
        });
    }
    group.finish();
}

fn benchmark_invert(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(0xD1CE);
    let matrix3 = Array2::from_shape_fn((3, 3), |_| rng.gen_range(-1.0..1.0));
    c.bench_function("gauss_jordan_invert_3x3", |b| {
        b.iter(|| matrix::invert(black_box(&matrix3), 1e-10).unwrap())
    });
}

criterion_group!(benches, benchmark_ability, benchmark_invert);
criterion_main!(benches);
