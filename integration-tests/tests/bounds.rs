use approx::assert_relative_eq;
use integration_tests::test_units::bounded::Bounded;
use weft_model::{BlockSolverOptions, Model, Problem};
use weft_solvers::nonlinear::{
    BoundEnforcement, LineSearchConfig, LineSearchKind, NewtonConfig, NonlinearSolverConfig, Status,
};

fn bounded(maxiter: usize, bound_enforcement: BoundEnforcement) -> Problem {
    let mut model = Model::new();
    model.add_implicit("b", Bounded).unwrap();
    model.set_solver(
        "b",
        BlockSolverOptions {
            nonlinear: NonlinearSolverConfig::Newton(NewtonConfig {
                maxiter,
                line_search: LineSearchConfig {
                    kind: LineSearchKind::BoundsEnforce,
                    bound_enforcement,
                    ..LineSearchConfig::default()
                },
                ..NewtonConfig::default()
            }),
            ..BlockSolverOptions::default()
        },
    );
    model.setup().unwrap()
}

#[test]
fn wall_pins_the_bounded_state_and_moves_the_rest() {
    let mut problem = bounded(1, BoundEnforcement::Wall);
    let report = problem.run_model().unwrap();
    assert_eq!(report.blocks[0].solution.status, Status::MaxIters);

    assert_relative_eq!(problem.get("b.z").unwrap()[0], 1.5);
    assert_relative_eq!(problem.get("b.w").unwrap()[0], 3.0, epsilon = 1e-12);
}

#[test]
fn vector_scales_back_the_whole_step() {
    let mut problem = bounded(1, BoundEnforcement::Vector);
    problem.run_model().unwrap();

    // The full step (1.5, 3) is cut to a third so that z lands on its bound.
    assert_relative_eq!(problem.get("b.z").unwrap()[0], 1.5, epsilon = 1e-12);
    assert_relative_eq!(problem.get("b.w").unwrap()[0], 1.0, epsilon = 1e-12);
}

#[test]
fn scalar_clips_only_the_violating_entry() {
    let mut problem = bounded(1, BoundEnforcement::Scalar);
    problem.run_model().unwrap();
    assert_relative_eq!(problem.get("b.z").unwrap()[0], 1.5);
    assert_relative_eq!(problem.get("b.w").unwrap()[0], 3.0, epsilon = 1e-12);
}

#[test]
fn bounded_state_never_leaves_its_bound() {
    let mut problem = bounded(20, BoundEnforcement::Wall);
    let report = problem.run_model().unwrap();

    // z = 2 is out of reach, so the solve cannot converge.
    assert!(!report.is_converged());
    assert!(problem.get("b.z").unwrap()[0] <= 1.5);
    assert_relative_eq!(problem.get("b.w").unwrap()[0], 3.0, epsilon = 1e-10);

    let listed = problem.list_residuals(1e-6);
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, "b.z");
}
