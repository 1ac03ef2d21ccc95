//! nuosc CLI - Quick probability tables for every backend
//!
//! Run with: `cargo run --release`
//! Set `RUST_LOG=nuosc=debug` to follow configuration and propagation.

use nuosc::{
    BackendKind, CalculatorConfig, Flavor, MatterModel, NamedModel, OscCalculator,
    PropagationRequest, Result,
};
use tracing_subscriber::EnvFilter;

const BASELINE_KM: f64 = 1300.0;
const ENERGY_GEV: f64 = 2.5;
const DENSITY: f64 = 2.848;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    if let Err(err) = run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    println!("nuosc - Neutrino Oscillation Probabilities");
    println!("==========================================\n");

    println!("Parameters (DUNE-like, NuFit 5.2 Normal Ordering):");
    println!("  Baseline: {BASELINE_KM} km");
    println!("  Energy: {ENERGY_GEV} GeV");
    println!("  Density: {DENSITY} g/cm³");
    println!();

    for backend in [BackendKind::Analytic, BackendKind::Grid, BackendKind::DensityMatrix] {
        let mut calc = OscCalculator::new(CalculatorConfig::new(backend))?;
        let vacuum = table(&calc)?;
        calc.set_matter(MatterModel::uniform(DENSITY, 0.5))?;
        let matter = table(&calc)?;

        println!("[{}] Vacuum Oscillation Probabilities:", backend.name());
        print_matrix(&vacuum);
        println!("[{}] Matter Oscillation Probabilities:", backend.name());
        print_matrix(&matter);
        println!(
            "  P(νμ → νe): vacuum {:.6}, matter {:.6} ({:+.1}%)\n",
            vacuum[1][0],
            matter[1][0],
            (matter[1][0] / vacuum[1][0] - 1.0) * 100.0
        );
    }

    let mut calc = OscCalculator::new(CalculatorConfig::new(BackendKind::DensityMatrix))?;
    calc.set_decoherence_model(NamedModel::RandomizePhase, 1e-23, 0.0, 1e9)?;
    println!("[density_matrix] Phase randomization, Γ = 1e-23 eV:");
    print_matrix(&table(&calc)?);

    Ok(())
}

/// Rows are the initial flavor, columns the final one.
fn table(calc: &OscCalculator) -> Result<Vec<Vec<f64>>> {
    [Flavor::E, Flavor::Mu, Flavor::Tau]
        .into_iter()
        .map(|initial| -> Result<Vec<f64>> {
            let request = PropagationRequest::new(ENERGY_GEV, initial).distance_km(BASELINE_KM);
            Ok(calc.calc_osc_prob(&request)?.iter().copied().collect())
        })
        .collect()
}

fn print_matrix(probs: &[Vec<f64>]) {
    println!("         e          μ          τ");
    let labels = ['e', 'μ', 'τ'];
    for (i, row) in probs.iter().enumerate() {
        println!(
            "  {} → {:>9.6}  {:>9.6}  {:>9.6}",
            labels[i], row[0], row[1], row[2]
        );
    }
}
