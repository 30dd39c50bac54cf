use approx::assert_relative_eq;
use integration_tests::test_units::paraboloid::Paraboloid;
use weft_core::{FdForm, FdOptions, Method, Mode};
use weft_model::Model;

#[test]
fn analytic_partials_are_exact_at_sample_points() {
    let mut model = Model::new();
    model.add_explicit("p", Paraboloid).unwrap();
    let mut problem = model.setup().unwrap();

    for (x, y) in [(0.0, 0.0), (3.0, -4.0), (-1.5, 2.25), (6.6667, -7.3333)] {
        problem.set("p.x", &[x]).unwrap();
        problem.set("p.y", &[y]).unwrap();
        problem.run_model().unwrap();

        let f = problem.get("p.f").unwrap()[0];
        assert_relative_eq!(f, (x - 3.0).powi(2) + x * y + (y + 4.0).powi(2) - 3.0);

        let totals = problem.compute_totals(&["p.f"], &["p.x", "p.y"], Mode::Fwd).unwrap();
        assert_relative_eq!(totals.value("p.f", "p.x").unwrap(), 2.0 * x - 6.0 + y, max_relative = 1e-14);
        assert_relative_eq!(totals.value("p.f", "p.y").unwrap(), 2.0 * y + 8.0 + x, max_relative = 1e-14);

        let partials = problem.unit("p").unwrap().partials();
        assert_eq!(partials.get("f", "x").unwrap(), &[2.0 * x - 6.0 + y]);
        assert_eq!(partials.get("f", "y").unwrap(), &[2.0 * y + 8.0 + x]);
    }
}

#[test]
fn partial_check_reports_both_inputs() {
    let mut model = Model::new();
    model.add_explicit("p", Paraboloid).unwrap();
    let mut problem = model.setup().unwrap();
    problem.set("p.x", &[1.0]).unwrap();
    problem.set("p.y", &[2.0]).unwrap();
    problem.run_model().unwrap();

    let central = Method::Fd(FdOptions {
        form: FdForm::Central,
        ..FdOptions::default()
    });
    let checks = problem.check_partials(central).unwrap();
    let mut wrt: Vec<&str> = checks.iter().map(|c| c.wrt.as_str()).collect();
    wrt.sort_unstable();
    assert_eq!(wrt, ["x", "y"]);
    for check in &checks {
        assert_eq!(check.unit, "p");
        assert!(check.rel_error < 1e-8, "{}: {}", check.wrt, check.rel_error);
    }
}
