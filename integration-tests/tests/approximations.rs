use approx::assert_relative_eq;
use integration_tests::test_units::{sincos, wavy};
use weft_core::{CsOptions, FdForm, FdOptions, Method, Mode};
use weft_model::{Model, Problem};

fn wavy_problem(method: Method) -> Problem {
    let mut model = Model::new();
    model.add_explicit("w", wavy::Wavy { method }).unwrap();
    let mut problem = model.setup().unwrap();
    problem.run_model().unwrap();
    problem
}

fn total(method: Method) -> f64 {
    let mut problem = wavy_problem(method);
    let totals = problem.compute_totals(&["w.y"], &["w.x"], Mode::Fwd).unwrap();
    totals.value("w.y", "w.x").unwrap()
}

#[test]
fn complex_step_is_accurate_to_round_off() {
    let exact = wavy::exact(0.7);
    assert_relative_eq!(total(Method::cs()), exact, max_relative = 1e-10);

    let tiny = Method::Cs(CsOptions { step: 1e-200 });
    assert_relative_eq!(total(tiny), exact, max_relative = 1e-10);
}

#[test]
fn finite_differences_have_their_expected_order() {
    let exact = wavy::exact(0.7);
    let forward = total(Method::fd());
    let central = total(Method::Fd(FdOptions {
        form: FdForm::Central,
        step: 1e-4,
        ..FdOptions::default()
    }));

    assert_relative_eq!(forward, exact, max_relative = 1e-5);
    assert_relative_eq!(central, exact, max_relative = 1e-7);
    assert!((total(Method::cs()) - exact).abs() < (forward - exact).abs());
}

#[test]
fn complex_step_partial_check_falls_back_where_unsupported() {
    let mut problem = sincos::model().unwrap().setup().unwrap();
    problem.run_model().unwrap();

    let checks = problem.check_partials(Method::cs()).unwrap();
    // z wrt y, and y wrt x, z, y
    assert_eq!(checks.len(), 4);

    let sine = checks.iter().find(|c| c.unit == "sine").unwrap();
    assert!(sine.rel_error < 1e-12, "complex step on sine: {}", sine.rel_error);
    for check in checks.iter().filter(|c| c.unit == "balance") {
        assert!(check.rel_error < 1e-5, "{} wrt {}: {}", check.of, check.wrt, check.rel_error);
    }
}
