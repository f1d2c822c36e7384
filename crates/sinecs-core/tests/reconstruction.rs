//! End-to-end reconstruction tests against signals with known coefficients.

use std::sync::Arc;

use approx::assert_relative_eq;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::SeedableRng;

use sinecs_compute::{ComputeBackend, CpuBackend};
use sinecs_core::{
    InitialGuess, ReconstructionParams, ReconstructionSession, SignalComponent, SolverError,
    TestSignal, TimeGrid, Variant,
};

// ─────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────

fn backend() -> Arc<dyn ComputeBackend> {
    Arc::new(CpuBackend::new())
}

/// 1000 samples over [0, 1) s.
fn unit_grid() -> TimeGrid {
    TimeGrid::uniform(0.0, 1.0, 1e-3).unwrap()
}

fn sine_10hz() -> TestSignal {
    TestSignal::new(vec![SignalComponent::Sine {
        amplitude: 1.0,
        frequency: 10.0,
        phase: 0.0,
    }])
    .unwrap()
}

/// Step sizes matched to the operator scale of `unit_grid`: the gradient step
/// contracts the row-space error by roughly one half per iteration.
fn tuned_params(initial_guess: InitialGuess) -> ReconstructionParams {
    ReconstructionParams {
        step_size_sparse: 1e-3,
        step_size_manifold: 1000.0,
        convergence_threshold: 1.0,
        max_iterations: 1000,
        initial_guess,
    }
}

fn rms(v: &Array1<f64>) -> f64 {
    (v.mapv(|x| x * x).sum() / v.len() as f64).sqrt()
}

// ─────────────────────────────────────────────────────────────
// Scenarios
// ─────────────────────────────────────────────────────────────

#[test]
fn test_fista_reconstructs_single_sine() {
    let grid = unit_grid();
    let signal = sine_10hz();
    let mut rng = StdRng::seed_from_u64(1);

    // From zero the run needs several momentum-blended iterations.
    let params = ReconstructionParams {
        convergence_threshold: 1e-2,
        ..tuned_params(InitialGuess::Zero)
    };
    let mut session = ReconstructionSession::new(&grid, params, backend());
    session
        .ingest_test_signal(&signal, &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
        .unwrap();
    let report = session.run(Variant::Fista).unwrap().clone();
    assert_eq!(report.variant, Variant::Fista);
    assert!(report.iterations > 2, "stopped after {}", report.iterations);

    let (time_grid, amplitude) = session.export_result().unwrap();
    assert_eq!(amplitude.len(), time_grid.len());

    let truth = signal.sample(&grid);
    let error = rms(&(amplitude - &truth));
    assert!(
        error < 0.05 * rms(&truth),
        "RMS error {:.3e} exceeds 5% of signal RMS {:.3e}",
        error,
        rms(&truth)
    );
}

#[test]
fn test_every_variant_reconstructs_single_sine() {
    let grid = unit_grid();
    let signal = sine_10hz();
    let truth = signal.sample(&grid);

    for variant in Variant::ALL {
        for guess in [InitialGuess::Adjoint, InitialGuess::Zero] {
            let mut rng = StdRng::seed_from_u64(2);
            let mut session = ReconstructionSession::new(&grid, tuned_params(guess), backend());
            session
                .ingest_test_signal(&signal, &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
                .unwrap();
            session.run(variant).unwrap();
            let (_, amplitude) = session.export_result().unwrap();
            let error = rms(&(amplitude - &truth));
            assert!(
                error < 0.1 * rms(&truth),
                "{variant} from {guess:?}: RMS error {error:.3e}"
            );
        }
    }
}

#[test]
fn test_fista_needs_no_more_iterations_than_ista() {
    let grid = unit_grid();
    let signal = sine_10hz();
    let params = ReconstructionParams {
        convergence_threshold: 1e-2,
        ..tuned_params(InitialGuess::Zero)
    };

    let iterations = |variant: Variant| {
        let mut rng = StdRng::seed_from_u64(3);
        let mut session = ReconstructionSession::new(&grid, params.clone(), backend());
        session
            .ingest_test_signal(&signal, &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
            .unwrap();
        session.run(variant).unwrap().iterations
    };
    let ista = iterations(Variant::Ista);
    let fista = iterations(Variant::Fista);
    assert!(fista > 2 && ista > 2, "FISTA {fista}, ISTA {ista}");
    assert!(fista <= ista, "FISTA took {fista} iterations, ISTA {ista}");
}

#[test]
fn test_prediction_reproduces_measured_coefficient() {
    let grid = unit_grid();
    let signal = sine_10hz();
    let mut rng = StdRng::seed_from_u64(4);

    let params = ReconstructionParams {
        step_size_sparse: 0.0,
        step_size_manifold: 1000.0,
        convergence_threshold: 1e-14,
        max_iterations: 500,
        initial_guess: InitialGuess::Adjoint,
    };
    let backend = backend();
    let mut session = ReconstructionSession::new(&grid, params, backend.clone());
    session
        .ingest_test_signal(&signal, &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
        .unwrap();
    session.run(Variant::Ista).unwrap();

    let samples = session.samples();
    let frequency = Array1::from_iter(samples.iter().map(|s| s.frequency));
    let operator = sinecs_core::FourierOperator::build(backend.as_ref(), &frequency, &grid).unwrap();
    let (_, amplitude) = session.export_result().unwrap();
    let predicted = operator.apply(backend.as_ref(), amplitude).unwrap();

    let index = samples.iter().position(|s| s.frequency == 10.0).unwrap();
    assert_relative_eq!(
        predicted[index],
        samples[index].amplitude,
        max_relative = 1e-6
    );
}

#[test]
fn test_pathological_step_size_fails_fast() {
    let grid = unit_grid();
    let mut rng = StdRng::seed_from_u64(5);
    let params = ReconstructionParams {
        step_size_manifold: 1e6,
        max_iterations: 20,
        ..tuned_params(InitialGuess::Zero)
    };
    let mut session = ReconstructionSession::new(&grid, params, backend());
    session
        .ingest_test_signal(&sine_10hz(), &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
        .unwrap();

    let err = session.run(Variant::Fista).unwrap_err();
    assert!(
        matches!(err, SolverError::ConvergenceFailure { iterations, .. } if iterations <= 20),
        "unexpected error: {err}"
    );
    assert!(matches!(
        session.export_result(),
        Err(SolverError::NotReady(_))
    ));
}

#[test]
fn test_fixed_seed_selects_same_samples() {
    let grid = unit_grid();
    let frequency: Vec<f64> = (1..=50).map(f64::from).collect();
    let amplitude: Vec<f64> = frequency.iter().map(|f| 1.0 / f).collect();

    let select = |seed: u64| {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut session = ReconstructionSession::new(&grid, ReconstructionParams::default(), backend());
        session
            .ingest_samples(&frequency, &amplitude, 10, 30.5, &mut rng)
            .unwrap();
        session.samples()
    };

    let a = select(42);
    assert_eq!(a, select(42));
    assert_eq!(a.len(), 10);
    assert!(a.iter().all(|s| s.frequency < 30.5));
    assert!(a.windows(2).all(|w| w[0].frequency < w[1].frequency));
    assert!(a.iter().all(|s| s.amplitude == 1.0 / s.frequency));
}

#[test]
fn test_cancelled_run_reports_cancellation() {
    let grid = unit_grid();
    let mut rng = StdRng::seed_from_u64(6);
    let mut session =
        ReconstructionSession::new(&grid, tuned_params(InitialGuess::Zero), backend());
    session
        .ingest_test_signal(&sine_10hz(), &[10.0, 20.0, 30.0], 3, 100.0, &mut rng)
        .unwrap();

    let token = sinecs_core::CancelToken::new();
    token.cancel();
    let err = session.run_with_cancel(Variant::Ista, &token).unwrap_err();
    assert!(matches!(err, SolverError::Cancelled { iterations: 0 }));
}
