use achr_rs::test_models::{cone_model, simplex_model, LinearModel};
use achr_rs::{AchrSampler, SampleOptions, SamplerSettings};
use approx::assert_abs_diff_eq;
use faer::Mat;
use pretty_assertions::assert_eq;

fn sampler_for(model: LinearModel, seed: u64) -> AchrSampler<LinearModel> {
    let settings = SamplerSettings {
        thinning: 10,
        nproj: None,
        seed: Some(seed),
    };
    let mut sampler = AchrSampler::new(model, settings).unwrap();
    sampler.generate_fva_warmup(false).unwrap();
    sampler
}

#[test]
fn warmup_spans_the_simplex() {
    let sampler = sampler_for(simplex_model(), 1);
    let warmup = sampler.warmup().unwrap();

    assert!(warmup.ncols() >= 3);
    for j in 0..warmup.ncols() {
        let point = warmup.col_as_slice(j);
        // every corner satisfies x1 + x2 + x3 = 10 in flux space
        let total: f64 = (0..3).map(|r| point[r] - point[r + 3]).sum();
        assert_abs_diff_eq!(total, 10.0, epsilon = 1e-9);
    }
}

#[test]
fn samples_stay_inside_the_simplex() {
    let mut sampler = sampler_for(simplex_model(), 42);
    let samples = sampler.sample(1000).unwrap();

    assert_eq!(samples.nrows(), 1000);
    assert_eq!(samples.names(), ["R1", "R2", "R3"]);
    for i in 0..samples.nrows() {
        let row = samples.row(i);
        let total: f64 = row.iter().sum();
        assert_abs_diff_eq!(total, 10.0, epsilon = 1e-6);
        assert!(row.iter().all(|&v| (-1e-6..=10.0 + 1e-6).contains(&v)));
    }

    let codes = sampler.validate(samples.data(), None, None).unwrap();
    assert!(codes.iter().all(|c| c == "v"), "bad codes: {codes:?}");
}

#[test]
fn sampling_is_reproducible_per_seed() {
    let mut first = sampler_for(simplex_model(), 1234);
    let mut second = sampler_for(simplex_model(), 1234);

    let a = first.sample(50).unwrap();
    let b = second.sample(50).unwrap();
    assert!(a == b);

    let mut other = sampler_for(simplex_model(), 4321);
    let c = other.sample(50).unwrap();
    assert!(a != c);
}

#[test]
fn homogeneous_samples_satisfy_the_cone_equality() {
    let mut sampler = sampler_for(cone_model(), 7);
    assert!(sampler.problem().homogeneous);

    let samples = sampler.sample(100).unwrap();
    for i in 0..samples.nrows() {
        let row = samples.row(i);
        assert_abs_diff_eq!(row[0] + row[1] - row[2], 0.0, epsilon = 1e-6);
    }
    let codes = sampler.validate(samples.data(), None, None).unwrap();
    assert!(codes.iter().all(|c| c == "v"), "bad codes: {codes:?}");
}

#[test]
fn batches_are_lazy_and_sized() {
    let mut sampler = sampler_for(simplex_model(), 99);
    let tables: Vec<_> = sampler
        .batch(10, 3, true)
        .collect::<Result<_, _>>()
        .unwrap();

    assert_eq!(tables.len(), 3);
    for table in &tables {
        assert_eq!(table.nrows(), 10);
        assert_eq!(table.ncols(), 3);
    }
    // consecutive batches continue the chain instead of repeating it
    assert!(tables[0] != tables[1]);
}

#[test]
fn posterior_sampling_reports_acceptance() {
    let mut sampler = sampler_for(simplex_model(), 5);
    // favor probability mass near v1 = 10
    let likelihood = |p: &[f64]| -(p[0] - p[3] - 10.0).powi(2);
    let options = SampleOptions {
        likelihood: Some(&likelihood),
        ..SampleOptions::default()
    };

    let samples = sampler.sample_with(100, options).unwrap();
    assert_eq!(samples.nrows(), 100);

    let rate = sampler.acceptance_rate().unwrap();
    assert!(rate > 0.0 && rate <= 1.0);

    let best = sampler.best_sample().unwrap();
    assert_abs_diff_eq!(best.posterior, likelihood(&best.point), epsilon = 1e-12);

    // the biased chain should pull the first flux above the uniform mean
    let v1 = samples.column("R1").unwrap();
    let mean = v1.iter().sum::<f64>() / v1.len() as f64;
    assert!(mean > 10.0 / 3.0, "posterior mean too low: {mean}");
}

#[test]
fn validation_flags_violating_rows() {
    let mut sampler = sampler_for(simplex_model(), 3);

    let rows = [
        vec![2.0, 3.0, 5.0],    // feasible
        vec![20.0, -5.0, -5.0], // bound violations on both sides
        vec![1.0, 1.0, 1.0],    // equality violation
    ];
    let samples = Mat::from_fn(3, 3, |i, j| rows[i][j]);

    let codes = sampler.validate(&samples, None, None).unwrap();
    assert_eq!(codes, ["v", "lu", "e"]);
}
