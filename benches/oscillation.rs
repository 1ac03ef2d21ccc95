//! Benchmarks for nuosc oscillation probability calculations
//!
//! Run with: cargo bench
//!
//! Covers:
//! - Closed-form vacuum vs matter kernels
//! - Different Newton iteration counts
//! - Each backend over a DUNE-like energy spectrum
//! - Layered matter through the density-matrix backend

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use nuosc::analytic::{probability_matter, probability_vacuum, ThreeFlavorInputs};
use nuosc::{
    BackendKind, CalculatorConfig, Flavor, MatterModel, OscCalculator, OscillationParameters,
    PropagationRequest,
};

const YE_RHO: f64 = 0.5 * 3.0;

fn inputs() -> ThreeFlavorInputs {
    let params = OscillationParameters::nufit52_no();
    let (angles, splittings) = params.require().unwrap();
    ThreeFlavorInputs::from_parameters(angles, splittings, false).unwrap()
}

fn spectrum(n_points: usize) -> Vec<f64> {
    let (e_min, e_max) = (0.5, 5.0);
    (0..n_points)
        .map(|i| e_min + (e_max - e_min) * (i as f64 / n_points as f64))
        .collect()
}

/// Single-point closed-form kernels
fn bench_kernels(c: &mut Criterion) {
    let inputs = inputs();
    c.bench_function("vacuum_single", |b| {
        b.iter(|| probability_vacuum(black_box(&inputs), 1300.0, 2.5))
    });

    let mut group = c.benchmark_group("matter_single");
    let potential = YE_RHO * 2.5 * nuosc::YE_RHO_E_TO_A;
    for n_newton in [0u8, 1, 2, 3] {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("N_Newton={n_newton}")),
            &n_newton,
            |b, &n| b.iter(|| probability_matter(black_box(&inputs), 1300.0, 2.5, potential, n)),
        );
    }
    group.finish();
}

/// 1000-point spectrum through each backend
fn bench_backends(c: &mut Criterion) {
    let energies = spectrum(1000);
    let mut group = c.benchmark_group("spectrum_1000");
    group.sample_size(20);

    for backend in [BackendKind::Analytic, BackendKind::Grid, BackendKind::DensityMatrix] {
        let mut calc = OscCalculator::new(CalculatorConfig::new(backend)).unwrap();
        calc.set_matter(MatterModel::uniform(3.0, 0.5)).unwrap();
        let request = PropagationRequest::new(energies.clone(), Flavor::Mu).distance_km(1300.0);
        group.bench_function(backend.name(), |b| {
            b.iter(|| calc.calc_osc_prob(black_box(&request)).unwrap())
        });
    }
    group.finish();
}

/// Three layers along a 1300 km baseline
fn bench_layers(c: &mut Criterion) {
    let mut calc = OscCalculator::new(CalculatorConfig::new(BackendKind::DensityMatrix)).unwrap();
    calc.set_matter(
        MatterModel::layered(&[400.0, 900.0, 1300.0], &[2.6, 3.3, 2.6], &[0.5, 0.5, 0.5]).unwrap(),
    )
    .unwrap();
    let request = PropagationRequest::new(spectrum(100), Flavor::Mu)
        .distance_km(vec![300.0, 700.0, 1300.0]);
    c.bench_function("density_layered_100x3", |b| {
        b.iter(|| calc.calc_osc_prob(black_box(&request)).unwrap())
    });
}

criterion_group!(benches, bench_kernels, bench_backends, bench_layers);

criterion_main!(benches);
