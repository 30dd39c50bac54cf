use std::{cell::Cell, ops::Range};

use approx::assert_relative_eq;
use weft_core::{EvalError, LinearOperator, Mode};

use super::*;

/// A dense row-major operator with an optional block partition.
#[derive(Debug)]
struct DenseOp {
    n: usize,
    values: Vec<f64>,
    blocks: Option<Vec<Range<usize>>>,
    custom_block_solve: bool,
    block_solves: Cell<usize>,
}

impl DenseOp {
    fn new(rows: &[&[f64]]) -> Self {
        Self {
            n: rows.len(),
            values: rows.iter().flat_map(|r| r.iter().copied()).collect(),
            blocks: None,
            custom_block_solve: false,
            block_solves: Cell::new(0),
        }
    }

    fn with_blocks(mut self, blocks: Vec<Range<usize>>) -> Self {
        self.blocks = Some(blocks);
        self
    }

    fn entry(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    fn check(&self, x: &[f64], rhs: &[f64], mode: Mode, epsilon: f64) {
        let mut y = vec![0.0; self.n];
        self.apply(mode, x, &mut y).unwrap();
        for (yi, bi) in y.iter().zip(rhs) {
            assert_relative_eq!(*yi, *bi, epsilon = epsilon);
        }
    }
}

impl LinearOperator for DenseOp {
    fn dim(&self) -> usize {
        self.n
    }

    fn apply(&self, mode: Mode, x: &[f64], y: &mut [f64]) -> Result<(), EvalError> {
        y.fill(0.0);
        for i in 0..self.n {
            for j in 0..self.n {
                match mode {
                    Mode::Fwd => y[i] += self.entry(i, j) * x[j],
                    Mode::Rev => y[j] += self.entry(i, j) * x[i],
                }
            }
        }
        Ok(())
    }

    fn blocks(&self) -> Vec<Range<usize>> {
        self.blocks.clone().unwrap_or_else(|| vec![0..self.n])
    }

    /// Only handles 1×1 blocks, dividing by the diagonal.
    fn solve_block(&self, block: usize, rhs: &[f64], _mode: Mode) -> Option<Result<Vec<f64>, EvalError>> {
        if !self.custom_block_solve {
            return None;
        }
        self.block_solves.set(self.block_solves.get() + 1);
        let i = self.blocks()[block].start;
        Some(Ok(vec![rhs[0] / self.entry(i, i)]))
    }
}

fn coupled() -> DenseOp {
    DenseOp::new(&[
        &[4.0, 1.0, 0.0, 0.5],
        &[2.0, 5.0, 1.0, 0.0],
        &[0.0, 1.0, 3.0, -1.0],
        &[0.5, 0.0, 1.0, 6.0],
    ])
}

/// Lower block triangular in the partition `[0..2, 2..3]`.
fn triangular() -> DenseOp {
    DenseOp::new(&[
        &[3.0, 1.0, 0.0],
        &[1.0, 2.0, 0.0],
        &[-2.0, 4.0, 5.0],
    ])
    .with_blocks(vec![0..2, 2..3])
}

const RHS: [f64; 4] = [1.0, -2.0, 0.5, 3.0];

#[test]
fn direct_solves_both_modes() {
    let op = coupled();
    let mut solver = Direct::new();
    solver.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let solution = solver.solve(&op, &RHS, mode).unwrap();
        assert!(solution.is_converged());
        assert!(solution.residual_norm < 1e-12);
        op.check(&solution.x, &RHS, mode, 1e-12);
    }
}

#[test]
fn direct_reports_singular_jacobian() {
    let op = DenseOp::new(&[&[1.0, 2.0], &[0.0, 0.0]]);
    let mut solver = Direct::new();
    solver.setup(&op).unwrap();

    let err = solver.solve(&op, &[1.0, 1.0], Mode::Fwd).unwrap_err();
    assert!(matches!(err, Error::SingularJacobian));
}

#[test]
fn direct_reports_rank_deficient_jacobian() {
    let op = DenseOp::new(&[&[0.1, 0.2, 0.3], &[0.4, 0.5, 0.6], &[0.7, 0.8, 0.9]]);
    let mut solver = Direct::new();
    solver.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let err = solver.solve(&op, &[1.0, 0.0, 0.0], mode).unwrap_err();
        assert!(matches!(err, Error::SingularJacobian));
    }
}

#[test]
fn direct_solves_badly_scaled_but_regular_jacobian() {
    let op = DenseOp::new(&[&[1e6, 1.0], &[1.0, 1e-3]]);
    let mut solver = Direct::new();
    solver.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let solution = solver.solve(&op, &[1.0, 2.0], mode).unwrap();
        op.check(&solution.x, &[1.0, 2.0], mode, 1e-9);
    }
}

#[test]
fn rejects_wrong_rhs_length() {
    let op = coupled();
    let err = Direct::new().solve(&op, &[1.0], Mode::Fwd).unwrap_err();
    assert!(matches!(err, Error::DimensionMismatch { expected: 4, found: 1 }));
}

#[test]
fn gmres_matches_direct() {
    let op = coupled();
    let mut direct = Direct::new();
    let mut gmres = Gmres::new(GmresConfig::default()).unwrap();
    gmres.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let expected = direct.solve(&op, &RHS, mode).unwrap();
        let actual = gmres.solve(&op, &RHS, mode).unwrap();
        assert_eq!(actual.status, Status::Converged);
        for (a, e) in actual.x.iter().zip(&expected.x) {
            assert_relative_eq!(*a, *e, epsilon = 1e-9);
        }
    }
}

#[test]
fn gmres_converges_with_short_restarts() {
    let op = coupled();
    let config = GmresConfig {
        restart: 2,
        use_cached_guess: false,
        ..GmresConfig::default()
    };
    let mut gmres = Gmres::new(config).unwrap();

    let solution = gmres.solve(&op, &RHS, Mode::Fwd).unwrap();
    assert_eq!(solution.status, Status::Converged);
    op.check(&solution.x, &RHS, Mode::Fwd, 1e-8);
}

#[test]
fn gmres_preconditioner_reduces_iterations() {
    let op = coupled().with_blocks(vec![0..1, 1..2, 2..3, 3..4]);
    let plain_config = GmresConfig {
        use_cached_guess: false,
        ..GmresConfig::default()
    };
    let precon_config = GmresConfig {
        precon: Some(Box::new(LinearSolverConfig::Direct)),
        ..plain_config.clone()
    };

    let mut plain = Gmres::new(plain_config).unwrap();
    let mut preconditioned = Gmres::new(precon_config).unwrap();
    preconditioned.setup(&op).unwrap();

    let plain = plain.solve(&op, &RHS, Mode::Fwd).unwrap();
    let preconditioned = preconditioned.solve(&op, &RHS, Mode::Fwd).unwrap();

    assert_eq!(preconditioned.status, Status::Converged);
    assert!(preconditioned.iters < plain.iters);
    op.check(&preconditioned.x, &RHS, Mode::Fwd, 1e-8);
}

#[test]
fn gmres_reuses_cached_solution() {
    let op = coupled();
    let mut gmres = Gmres::new(GmresConfig::default()).unwrap();

    let first = gmres.solve(&op, &RHS, Mode::Rev).unwrap();
    let second = gmres.solve(&op, &RHS, Mode::Rev).unwrap();

    assert!(first.iters > 0);
    assert_eq!(second.iters, 0);
    assert_eq!(second.status, Status::Converged);
}

#[test]
fn gmres_observer_can_stop() {
    let op = coupled();
    let mut gmres = Gmres::new(GmresConfig::default()).unwrap();

    let mut seen = Vec::new();
    let solution = gmres
        .solve_observed(&op, &RHS, Mode::Fwd, |event: &Event| {
            seen.push(event.residual_norm);
            Some(Action::StopEarly)
        })
        .unwrap();

    assert_eq!(solution.status, Status::StoppedByObserver);
    assert_eq!(solution.iters, 0);
    assert_eq!(seen.len(), 1);
}

#[test]
fn run_once_is_exact_for_triangular_blocks() {
    let op = triangular();
    let rhs = [1.0, 2.0, 3.0];
    let mut solver = LinearRunOnce::new();
    solver.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let solution = solver.solve(&op, &rhs, mode).unwrap();
        op.check(&solution.x, &rhs, mode, 1e-12);
    }
}

#[test]
fn block_gauss_seidel_converges_on_coupled_blocks() {
    let op = coupled().with_blocks(vec![0..2, 2..4]);
    let config = BlockConfig {
        maxiter: 100,
        atol: 1e-12,
        rtol: 1e-12,
        use_cached_guess: false,
    };
    let mut solver = BlockGaussSeidel::new(config).unwrap();
    solver.setup(&op).unwrap();

    for mode in [Mode::Fwd, Mode::Rev] {
        let solution = solver.solve(&op, &RHS, mode).unwrap();
        assert_eq!(solution.status, Status::Converged);
        assert!(solution.iters > 1);
        op.check(&solution.x, &RHS, mode, 1e-10);
    }
}

#[test]
fn block_jacobi_needs_more_sweeps_than_gauss_seidel() {
    let op = coupled().with_blocks(vec![0..1, 1..2, 2..3, 3..4]);
    let config = BlockConfig {
        maxiter: 200,
        atol: 1e-12,
        rtol: 1e-12,
        use_cached_guess: false,
    };
    let mut gauss_seidel = BlockGaussSeidel::new(config).unwrap();
    let mut jacobi = BlockJacobi::new(config).unwrap();

    let gs = gauss_seidel.solve(&op, &RHS, Mode::Fwd).unwrap();
    let jac = jacobi.solve(&op, &RHS, Mode::Fwd).unwrap();

    assert_eq!(jac.status, Status::Converged);
    assert!(gs.iters < jac.iters);
    op.check(&jac.x, &RHS, Mode::Fwd, 1e-10);
}

#[test]
fn block_solvers_report_max_iters() {
    let op = coupled().with_blocks(vec![0..1, 1..2, 2..3, 3..4]);
    let config = BlockConfig {
        maxiter: 2,
        use_cached_guess: false,
        ..BlockConfig::default()
    };
    let solution = BlockGaussSeidel::new(config)
        .unwrap()
        .solve(&op, &RHS, Mode::Fwd)
        .unwrap();

    assert_eq!(solution.status, Status::MaxIters);
    assert_eq!(solution.iters, 2);
    assert!(solution.residual_norm > 0.0);
}

#[test]
fn custom_block_solves_are_preferred() {
    let mut op = coupled().with_blocks(vec![0..1, 1..2, 2..3, 3..4]);
    op.custom_block_solve = true;

    let mut solver = BlockGaussSeidel::new(BlockConfig {
        maxiter: 50,
        ..BlockConfig::default()
    })
    .unwrap();
    let solution = solver.solve(&op, &RHS, Mode::Fwd).unwrap();

    assert_eq!(solution.status, Status::Converged);
    assert_eq!(op.block_solves.get(), 4 * solution.iters);
}

#[test]
fn config_deserializes_from_toml() {
    let config: LinearSolverConfig = toml::from_str(
        r#"
        type = "gmres"
        restart = 5
        rtol = 1e-8

        [precon]
        type = "block_jacobi"
        maxiter = 3
        "#,
    )
    .unwrap();

    let LinearSolverConfig::Gmres(gmres) = &config else {
        panic!("expected gmres, got {config:?}");
    };
    assert_eq!(gmres.restart, 5);
    assert_relative_eq!(gmres.rtol, 1e-8);
    assert_relative_eq!(gmres.atol, GmresConfig::default().atol);
    assert!(matches!(
        gmres.precon.as_deref(),
        Some(LinearSolverConfig::BlockJacobi(BlockConfig { maxiter: 3, .. }))
    ));
    assert!(config.build().is_ok());
}

#[test]
fn config_rejects_bad_values() {
    let bad_restart = LinearSolverConfig::Gmres(GmresConfig {
        restart: 0,
        ..GmresConfig::default()
    });
    assert_eq!(bad_restart.validate(), Err(ConfigError::Restart));

    let bad_precon = LinearSolverConfig::Gmres(GmresConfig {
        precon: Some(Box::new(LinearSolverConfig::BlockGaussSeidel(BlockConfig {
            atol: -1.0,
            ..BlockConfig::default()
        }))),
        ..GmresConfig::default()
    });
    assert!(matches!(bad_precon.build(), Err(ConfigError::Atol)));

    let bad_rtol = BlockConfig {
        rtol: f64::NAN,
        ..BlockConfig::default()
    };
    assert!(matches!(BlockJacobi::new(bad_rtol), Err(ConfigError::Rtol)));
}
