use ::approx::assert_relative_eq;
use num_complex::Complex64;

use super::*;
use crate::{Error, PartialsError, Variable};

/// `f = (x - 3)² + x y + (y + 4)² - 3`, with partials chosen per test.
struct Paraboloid {
    method: Method,
    write_extra: bool,
}

impl Paraboloid {
    fn exact() -> Self {
        Self {
            method: Method::Exact,
            write_extra: false,
        }
    }

    fn f<T>(x: T, y: T) -> T
    where
        T: Copy
            + std::ops::Add<Output = T>
            + std::ops::Sub<Output = T>
            + std::ops::Mul<Output = T>
            + From<f64>,
    {
        let sq = |v: T| v * v;
        sq(x - T::from(3.0)) + x * y + sq(y + T::from(4.0)) - T::from(3.0)
    }
}

impl ExplicitUnit for Paraboloid {
    fn declare(&self, decl: &mut Declarations) {
        decl.add_input(Variable::new("x"))
            .add_input(Variable::new("y"))
            .add_output(Variable::new("f"))
            .declare_partials("f", "*", Partial::dense().method(self.method));
    }

    fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
        outputs.set("f", Self::f(inputs.value("x"), inputs.value("y")));
        Ok(())
    }

    fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
        if self.method.is_approximated() {
            return Ok(());
        }
        let (x, y) = (inputs.value("x"), inputs.value("y"));
        partials.set("f", "x", &[2.0 * x - 6.0 + y])?;
        partials.set("f", "y", &[2.0 * y + 8.0 + x])?;
        if self.write_extra {
            partials.set("f", "z", &[0.0])?;
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            complex_step: true,
            ..Capabilities::default()
        }
    }

    fn compute_complex(
        &self,
        inputs: Vector<'_, Complex64>,
        mut outputs: VectorMut<'_, Complex64>,
    ) -> Result<(), EvalError> {
        outputs.set("f", Self::f(inputs.value("x"), inputs.value("y")));
        Ok(())
    }
}

/// `y = exp(x) sin(x)`, a function with nonzero higher derivatives.
struct Wavy {
    method: Method,
}

impl ExplicitUnit for Wavy {
    fn declare(&self, decl: &mut Declarations) {
        decl.add_input(Variable::new("x"))
            .add_output(Variable::new("y"))
            .declare_partials("y", "x", Partial::dense().method(self.method));
    }

    fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
        let x = inputs.value("x");
        outputs.set("y", x.exp() * x.sin());
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            complex_step: true,
            ..Capabilities::default()
        }
    }

    fn compute_complex(
        &self,
        inputs: Vector<'_, Complex64>,
        mut outputs: VectorMut<'_, Complex64>,
    ) -> Result<(), EvalError> {
        let x = inputs.value("x");
        outputs.set("y", x.exp() * x.sin());
        Ok(())
    }
}

/// `a x² + b x + c = 0`, optionally matrix-free and self-solving.
struct Quadratic {
    capabilities: Capabilities,
    slope: f64,
}

impl Quadratic {
    fn new(capabilities: Capabilities) -> Self {
        Self {
            capabilities,
            slope: 0.0,
        }
    }
}

impl ImplicitUnit for Quadratic {
    fn declare(&self, decl: &mut Declarations) {
        decl.add_input(Variable::new("a"))
            .add_input(Variable::new("b").value(&[-4.0]))
            .add_input(Variable::new("c").value(&[3.0]))
            .add_output(Variable::new("x").value(&[5.0]));
        if !self.capabilities.apply_linear {
            decl.declare_partials("x", "*", Partial::dense());
        }
    }

    fn apply_nonlinear(
        &self,
        inputs: Vector<'_>,
        outputs: Vector<'_>,
        mut residuals: VectorMut<'_>,
    ) -> Result<(), EvalError> {
        let (a, b, c) = (inputs.value("a"), inputs.value("b"), inputs.value("c"));
        let x = outputs.value("x");
        residuals.set("x", a * x * x + b * x + c);
        Ok(())
    }

    fn linearize(
        &mut self,
        inputs: Vector<'_>,
        outputs: Vector<'_>,
        partials: &mut Partials,
    ) -> Result<(), EvalError> {
        let (a, b) = (inputs.value("a"), inputs.value("b"));
        let x = outputs.value("x");
        self.slope = 2.0 * a * x + b;
        if !self.capabilities.apply_linear {
            partials.set("x", "a", &[x * x])?;
            partials.set("x", "b", &[x])?;
            partials.set("x", "c", &[1.0])?;
            partials.set("x", "x", &[self.slope])?;
        }
        Ok(())
    }

    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn solve_nonlinear(&mut self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
        let (a, b, c) = (inputs.value("a"), inputs.value("b"), inputs.value("c"));
        let disc = b * b - 4.0 * a * c;
        if disc < 0.0 {
            return Err(EvalError::analysis("no real root"));
        }
        outputs.set("x", (-b + disc.sqrt()) / (2.0 * a));
        Ok(())
    }

    fn guess_nonlinear(&self, _inputs: Vector<'_>, mut outputs: VectorMut<'_>, residuals: Vector<'_>) {
        if residuals.value("x").abs() > 1.0 {
            outputs.set("x", 3.0);
        }
    }

    fn solve_linear(&self, rhs: Vector<'_>, mut solution: VectorMut<'_>, _mode: Mode) -> Result<(), EvalError> {
        solution.set("x", rhs.value("x") / self.slope);
        Ok(())
    }

    fn apply_linear(
        &self,
        inputs: Vector<'_>,
        outputs: Vector<'_>,
        product: JacVec<'_>,
    ) -> Result<(), EvalError> {
        let (a, b) = (inputs.value("a"), inputs.value("b"));
        let x = outputs.value("x");
        let slope = 2.0 * a * x + b;
        match product {
            JacVec::Fwd {
                d_inputs,
                d_outputs,
                mut d_residuals,
            } => {
                d_residuals["x"][0] += slope * d_outputs.value("x")
                    + x * x * d_inputs.value("a")
                    + x * d_inputs.value("b")
                    + d_inputs.value("c");
            }
            JacVec::Rev {
                d_residuals,
                mut d_inputs,
                mut d_outputs,
            } => {
                let dr = d_residuals.value("x");
                d_outputs["x"][0] += slope * dr;
                d_inputs["a"][0] += x * x * dr;
                d_inputs["b"][0] += x * dr;
                d_inputs["c"][0] += dr;
            }
        }
        Ok(())
    }
}

fn dense_entries(adapter: &UnitAdapter) -> Vec<(usize, Column, f64)> {
    let mut entries = Vec::new();
    adapter.for_each_entry(|r, c, v| entries.push((r, c, v)));
    entries
}

#[test]
fn exact_partials_are_written_by_the_unit() {
    let mut adapter = UnitAdapter::explicit("parab", Paraboloid::exact()).unwrap();
    adapter.linearize(&[3.0, 5.0], &[0.0], None).unwrap();

    assert_eq!(adapter.partials().get("f", "x"), Some(&[5.0][..]));
    assert_eq!(adapter.partials().get("f", "y"), Some(&[21.0][..]));
}

#[test]
fn explicit_units_present_residual_form() {
    let mut adapter = UnitAdapter::explicit("parab", Paraboloid::exact()).unwrap();

    let mut residual = [0.0];
    adapter.evaluate_residuals(&[3.0, 5.0], &[100.0], &mut residual).unwrap();
    assert_relative_eq!(residual[0], 100.0 - (15.0 + 81.0 - 3.0));

    adapter.linearize(&[3.0, 5.0], &[0.0], None).unwrap();
    assert_eq!(
        dense_entries(&adapter),
        vec![
            (0, Column::Output(0), 1.0),
            (0, Column::Input(0), -5.0),
            (0, Column::Input(1), -21.0),
        ]
    );
}

#[test]
fn complex_step_is_more_accurate_than_finite_difference() {
    let x = 0.7_f64;
    let exact = x.exp() * (x.sin() + x.cos());

    let mut fd = UnitAdapter::explicit("fd", Wavy { method: Method::fd() }).unwrap();
    fd.linearize(&[x], &[0.0], None).unwrap();
    let fd_value = fd.partials().get("y", "x").unwrap()[0];

    let mut cs = UnitAdapter::explicit("cs", Wavy { method: Method::cs() }).unwrap();
    cs.linearize(&[x], &[0.0], None).unwrap();
    let cs_value = cs.partials().get("y", "x").unwrap()[0];

    assert_relative_eq!(fd_value, exact, epsilon = 1e-5);
    assert_relative_eq!(cs_value, exact, epsilon = 1e-12);
    assert!((cs_value - exact).abs() < (fd_value - exact).abs());
}

#[test]
fn central_difference_beats_forward() {
    let x = 0.7_f64;
    let exact = x.exp() * (x.sin() + x.cos());
    let central = Method::Fd(FdOptions {
        form: FdForm::Central,
        step: 1e-4,
        ..FdOptions::default()
    });
    let forward = Method::Fd(FdOptions {
        step: 1e-4,
        ..FdOptions::default()
    });

    let value = |method| {
        let mut adapter = UnitAdapter::explicit("wavy", Wavy { method }).unwrap();
        adapter.linearize(&[x], &[0.0], None).unwrap();
        adapter.partials().get("y", "x").unwrap()[0]
    };

    assert!((value(central) - exact).abs() < (value(forward) - exact).abs());
    assert_relative_eq!(value(central), exact, epsilon = 1e-7);
}

#[test]
fn implicit_partials_by_finite_difference() {
    struct Approximated;
    impl ImplicitUnit for Approximated {
        fn declare(&self, decl: &mut Declarations) {
            Quadratic::new(Capabilities::default()).declare(decl);
            decl.declare_partials("x", "*", Partial::dense().method(Method::fd()));
        }

        fn apply_nonlinear(
            &self,
            inputs: Vector<'_>,
            outputs: Vector<'_>,
            residuals: VectorMut<'_>,
        ) -> Result<(), EvalError> {
            Quadratic::new(Capabilities::default()).apply_nonlinear(inputs, outputs, residuals)
        }
    }

    let mut adapter = UnitAdapter::implicit("quad", Approximated).unwrap();
    adapter.linearize(&[1.0, -4.0, 3.0], &[3.0], None).unwrap();

    let partials = adapter.partials();
    assert_relative_eq!(partials.get("x", "a").unwrap()[0], 9.0, epsilon = 1e-4);
    assert_relative_eq!(partials.get("x", "b").unwrap()[0], 3.0, epsilon = 1e-4);
    assert_relative_eq!(partials.get("x", "c").unwrap()[0], 1.0, epsilon = 1e-4);
    assert_relative_eq!(partials.get("x", "x").unwrap()[0], 2.0, epsilon = 1e-4);
}

#[test]
fn writing_an_undeclared_partial_fails() {
    let unit = Paraboloid {
        method: Method::Exact,
        write_extra: true,
    };
    let mut adapter = UnitAdapter::explicit("parab", unit).unwrap();

    let err = adapter.linearize(&[3.0, 5.0], &[0.0], None).unwrap_err();
    assert!(matches!(
        err,
        EvalError::Partials(PartialsError::Undeclared { ref of, ref wrt }) if of == "f" && wrt == "z"
    ));
}

#[test]
fn strict_mode_flags_undeclared_dependence() {
    struct Sloppy;
    impl ExplicitUnit for Sloppy {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x"))
                .add_input(Variable::new("y"))
                .add_output(Variable::new("f"))
                .declare_partials("f", "x", Partial::dense().constant(&[1.0]));
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            outputs.set("f", inputs.value("x") + 2.0 * inputs.value("y"));
            Ok(())
        }
    }

    let mut adapter = UnitAdapter::explicit("sloppy", Sloppy).unwrap();
    assert!(adapter.linearize(&[1.0, 1.0], &[0.0], None).is_ok());

    let err = adapter.linearize(&[1.0, 1.0], &[0.0], Some(1e-8)).unwrap_err();
    match err {
        EvalError::UndeclaredNonzero { unit, of, wrt, row, col } => {
            assert_eq!((unit.as_str(), of.as_str(), wrt.as_str()), ("sloppy", "f", "y"));
            assert_eq!((row, col), (0, 0));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn invalid_declarations_are_rejected() {
    struct Declares(fn(&mut Declarations));
    impl ExplicitUnit for Declares {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x").shape(&[2]))
                .add_output(Variable::new("y").shape(&[2]));
            (self.0)(decl);
        }

        fn compute(&self, _inputs: Vector<'_>, _outputs: VectorMut<'_>) -> Result<(), EvalError> {
            Ok(())
        }
    }

    let check = |declare: fn(&mut Declarations)| UnitAdapter::explicit("bad", Declares(declare)).unwrap_err();

    assert!(matches!(
        check(|d| {
            d.declare_partials("y", "y", Partial::dense());
        }),
        Error::InvalidPartial { .. }
    ));
    assert!(matches!(
        check(|d| {
            d.declare_partials("y", "x", Partial::sparse(vec![0, 2], vec![0, 1]));
        }),
        Error::InvalidPartial { .. }
    ));
    assert!(matches!(
        check(|d| {
            d.declare_partials("y", "x", Partial::sparse(vec![0, 1], vec![0, 1]).constant(&[1.0, 2.0, 3.0]));
        }),
        Error::InvalidPartial { .. }
    ));
    assert!(matches!(
        check(|d| {
            d.declare_partials("y", "w", Partial::dense());
        }),
        Error::InvalidPartial { .. }
    ));
    assert!(matches!(
        check(|d| {
            d.declare_partials("y", "x", Partial::dense().method(Method::cs()));
        }),
        Error::ComplexStepUnsupported(_)
    ));
    assert!(matches!(
        check(|d| {
            d.add_output(Variable::new("x"));
        }),
        Error::DuplicateVariable(_)
    ));
}

#[test]
fn later_declarations_override_earlier_ones() {
    struct Overrides;
    impl ExplicitUnit for Overrides {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x").shape(&[3]))
                .add_output(Variable::new("y").shape(&[3]))
                .declare_partials("y", "x", Partial::dense())
                .declare_partials("y", "x", Partial::sparse(vec![0, 1, 2], vec![0, 1, 2]).constant(&[2.0]));
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            for (y, x) in outputs["y"].iter_mut().zip(&inputs["x"]) {
                *y = 2.0 * x;
            }
            Ok(())
        }
    }

    let adapter = UnitAdapter::explicit("diag", Overrides).unwrap();
    assert_eq!(adapter.partials().len(), 1);
    assert_eq!(adapter.partials().get("y", "x"), Some(&[2.0, 2.0, 2.0][..]));
}

#[test]
fn matrix_free_units_are_probed() {
    let caps = Capabilities {
        apply_linear: true,
        ..Capabilities::default()
    };
    let mut free = UnitAdapter::implicit("free", Quadratic::new(caps)).unwrap();
    let mut declared = UnitAdapter::implicit("declared", Quadratic::new(Capabilities::default())).unwrap();

    let (inputs, outputs) = ([1.0, -4.0, 3.0], [2.5]);
    free.linearize(&inputs, &outputs, None).unwrap();
    declared.linearize(&inputs, &outputs, None).unwrap();

    let value = |adapter: &UnitAdapter, column: Column| {
        dense_entries(adapter)
            .into_iter()
            .find(|&(_, c, _)| c == column)
            .map(|(_, _, v)| v)
    };
    for column in [Column::Output(0), Column::Input(0), Column::Input(1), Column::Input(2)] {
        assert_relative_eq!(
            value(&free, column).unwrap(),
            value(&declared, column).unwrap()
        );
    }
}

#[test]
fn matrix_free_products_are_consistent() {
    let caps = Capabilities {
        apply_linear: true,
        ..Capabilities::default()
    };
    let adapter = UnitAdapter::implicit("free", Quadratic::new(caps)).unwrap();
    let (inputs, outputs) = ([2.0, -3.0, 1.0], [0.5]);

    // <R' v, w> == <v, R'ᵀ w>
    let (d_in, d_out, w) = ([0.3, -0.2, 1.1], [0.7], [1.9]);
    let mut forward = [0.0];
    adapter.apply_fwd(&inputs, &outputs, &d_in, &d_out, &mut forward).unwrap();

    let mut rev_in = [0.0; 3];
    let mut rev_out = [0.0];
    adapter.apply_rev(&inputs, &outputs, &w, &mut rev_in, &mut rev_out).unwrap();

    let lhs = forward[0] * w[0];
    let rhs: f64 = d_in.iter().zip(&rev_in).map(|(a, b)| a * b).sum::<f64>() + d_out[0] * rev_out[0];
    assert_relative_eq!(lhs, rhs, epsilon = 1e-12);
}

#[test]
fn capabilities_gate_custom_solves() {
    let plain = UnitAdapter::implicit("plain", Quadratic::new(Capabilities::default())).unwrap();
    assert!(plain.solve_linear(&[1.0], Mode::Fwd).is_none());

    let caps = Capabilities {
        solve_nonlinear: true,
        solve_linear: true,
        ..Capabilities::default()
    };
    let mut custom = UnitAdapter::implicit("custom", Quadratic::new(caps)).unwrap();

    let inputs = [1.0, -4.0, 3.0];
    let mut outputs = [0.0];
    assert!(custom.solve_nonlinear(&inputs, &mut outputs).unwrap());
    assert_relative_eq!(outputs[0], 3.0);

    custom.linearize(&inputs, &outputs, None).unwrap();
    let solution = custom.solve_linear(&[4.0], Mode::Rev).unwrap().unwrap();
    assert_relative_eq!(solution[0], 2.0);
}

#[test]
fn analysis_errors_name_the_unit() {
    let caps = Capabilities {
        solve_nonlinear: true,
        ..Capabilities::default()
    };
    let mut adapter = UnitAdapter::implicit("quad", Quadratic::new(caps)).unwrap();

    let err = adapter.solve_nonlinear(&[1.0, 0.0, 1.0], &mut [0.0]).unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, EvalError::Analysis { ref unit, .. } if unit == "quad"));
}

#[test]
fn guess_adjusts_outputs() {
    let adapter = UnitAdapter::implicit("quad", Quadratic::new(Capabilities::default())).unwrap();
    let mut outputs = [50.0];
    adapter.guess(&[1.0, -4.0, 3.0], &mut outputs, &[2303.0]);
    assert_relative_eq!(outputs[0], 3.0);
}
