pub mod sincos {
    use num_complex::Complex64;
    use weft_core::{
        Capabilities, Declarations, EvalError, ExplicitUnit, ImplicitUnit, Partial, Partials, Variable, Vector,
        VectorMut,
    };
    use weft_model::{Error, Model};

    /// `z = sin(y)`, with exact partials and complex-step support.
    pub struct Sine;

    impl ExplicitUnit for Sine {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("y").value(&[1.0]))
                .add_output(Variable::new("z"))
                .declare_partials("z", "y", Partial::dense());
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            outputs.set("z", inputs.value("y").sin());
            Ok(())
        }

        fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            partials.set("z", "y", &[inputs.value("y").cos()])?;
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
            outputs.set("z", inputs.value("y").sin());
            Ok(())
        }
    }

    /// `cos(x y) - z y = 0`, solved for `y`.
    pub struct CosBalance;

    impl ImplicitUnit for CosBalance {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x").value(&[1.0]))
                .add_input(Variable::new("z"))
                .add_output(Variable::new("y").value(&[1.0]))
                .declare_partials("y", "*", Partial::dense());
        }

        fn apply_nonlinear(
            &self,
            inputs: Vector<'_>,
            outputs: Vector<'_>,
            mut residuals: VectorMut<'_>,
        ) -> Result<(), EvalError> {
            let (x, z) = (inputs.value("x"), inputs.value("z"));
            let y = outputs.value("y");
            residuals.set("y", (x * y).cos() - z * y);
            Ok(())
        }

        fn linearize(&mut self, inputs: Vector<'_>, outputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            let (x, z) = (inputs.value("x"), inputs.value("z"));
            let y = outputs.value("y");
            let s = (x * y).sin();
            partials.set("y", "x", &[-y * s])?;
            partials.set("y", "z", &[-y])?;
            partials.set("y", "y", &[-x * s - z])?;
            Ok(())
        }
    }

    /// The two units wired into a cycle through `y` and `z`.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit or connection is rejected.
    pub fn model() -> Result<Model, Error> {
        let mut model = Model::new();
        model.add_explicit("sine", Sine)?;
        model.add_implicit("balance", CosBalance)?;
        model.connect("balance.y", "sine.y")?;
        model.connect("sine.z", "balance.z")?;
        Ok(model)
    }

    /// Root of `cos(x y) - sin(y) y` in `y`, by scalar Newton from `y = 1`.
    #[must_use]
    pub fn reference_root(x: f64) -> f64 {
        let mut y: f64 = 1.0;
        for _ in 0..50 {
            let r = (x * y).cos() - y.sin() * y;
            let dr = -x * (x * y).sin() - y.cos() * y - y.sin();
            y -= r / dr;
        }
        y
    }
}

pub mod paraboloid {
    use weft_core::{Declarations, EvalError, ExplicitUnit, Partial, Partials, Variable, Vector, VectorMut};

    /// `f = (x - 3)² + x y + (y + 4)² - 3`
    pub struct Paraboloid;

    impl ExplicitUnit for Paraboloid {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x"))
                .add_input(Variable::new("y"))
                .add_output(Variable::new("f"))
                .declare_partials("f", "*", Partial::dense());
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            let (x, y) = (inputs.value("x"), inputs.value("y"));
            outputs.set("f", (x - 3.0).powi(2) + x * y + (y + 4.0).powi(2) - 3.0);
            Ok(())
        }

        fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            let (x, y) = (inputs.value("x"), inputs.value("y"));
            partials.set("f", "x", &[2.0 * x - 6.0 + y])?;
            partials.set("f", "y", &[2.0 * y + 8.0 + x])?;
            Ok(())
        }
    }
}

pub mod bounded {
    use weft_core::{Declarations, EvalError, ImplicitUnit, Partial, Partials, Variable, Vector, VectorMut};

    /// `z² - 4 = 0` with `z <= 1.5`, next to an unbounded `w - 3 = 0`.
    ///
    /// From `z = 1, w = 0` the first Newton step is `(1.5, 3)`, which
    /// carries `z` past its bound.
    pub struct Bounded;

    impl ImplicitUnit for Bounded {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_output(Variable::new("z").value(&[1.0]).upper(1.5))
                .add_output(Variable::new("w").value(&[0.0]))
                .declare_partials("z", "z", Partial::dense())
                .declare_partials("w", "w", Partial::dense().constant(&[1.0]));
        }

        fn apply_nonlinear(
            &self,
            _inputs: Vector<'_>,
            outputs: Vector<'_>,
            mut residuals: VectorMut<'_>,
        ) -> Result<(), EvalError> {
            let (z, w) = (outputs.value("z"), outputs.value("w"));
            residuals.set("z", z * z - 4.0);
            residuals.set("w", w - 3.0);
            Ok(())
        }

        fn linearize(&mut self, _inputs: Vector<'_>, outputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            partials.set("z", "z", &[2.0 * outputs.value("z")])?;
            Ok(())
        }
    }
}

pub mod sellar {
    use weft_core::{Declarations, EvalError, ExplicitUnit, Partial, Partials, Variable, Vector, VectorMut};
    use weft_model::{Error, Model};

    /// Holds the design variables `x` and `z` and hands them to the disciplines.
    pub struct Design;

    impl ExplicitUnit for Design {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x").value(&[1.0]))
                .add_input(Variable::new("z").shape(&[2]).value(&[5.0, 2.0]))
                .add_output(Variable::new("x_out"))
                .add_output(Variable::new("z_out").shape(&[2]))
                .declare_partials("x_out", "x", Partial::dense().constant(&[1.0]))
                .declare_partials("z_out", "z", Partial::sparse(vec![0, 1], vec![0, 1]).constant(&[1.0, 1.0]));
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            outputs.set("x_out", inputs.value("x"));
            outputs["z_out"].copy_from_slice(&inputs["z"]);
            Ok(())
        }
    }

    /// `y1 = z₁² + z₂ + x - 0.2 y2`
    pub struct Discipline1;

    impl ExplicitUnit for Discipline1 {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("z").shape(&[2]))
                .add_input(Variable::new("x"))
                .add_input(Variable::new("y2").value(&[1.0]))
                .add_output(Variable::new("y1").value(&[1.0]))
                .declare_partials("y1", "z", Partial::dense())
                .declare_partials("y1", "x", Partial::dense().constant(&[1.0]))
                .declare_partials("y1", "y2", Partial::dense().constant(&[-0.2]));
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            let z = &inputs["z"];
            outputs.set("y1", z[0] * z[0] + z[1] + inputs.value("x") - 0.2 * inputs.value("y2"));
            Ok(())
        }

        fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            partials.set("y1", "z", &[2.0 * inputs["z"][0], 1.0])?;
            Ok(())
        }
    }

    /// `y2 = √y1 + z₁ + z₂`
    pub struct Discipline2;

    impl ExplicitUnit for Discipline2 {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("z").shape(&[2]))
                .add_input(Variable::new("y1").value(&[1.0]))
                .add_output(Variable::new("y2").value(&[1.0]))
                .declare_partials("y2", "z", Partial::dense().constant(&[1.0, 1.0]))
                .declare_partials("y2", "y1", Partial::dense());
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            let y1 = inputs.value("y1");
            if y1 < 0.0 {
                return Err(EvalError::analysis(format!("y1 = {y1} is negative")));
            }
            let z = &inputs["z"];
            outputs.set("y2", y1.sqrt() + z[0] + z[1]);
            Ok(())
        }

        fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            partials.set("y2", "y1", &[0.5 / inputs.value("y1").sqrt()])?;
            Ok(())
        }
    }

    /// `obj = x² + z₂ + y1 + e^(-y2)`
    pub struct Objective;

    impl ExplicitUnit for Objective {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x"))
                .add_input(Variable::new("z").shape(&[2]))
                .add_input(Variable::new("y1"))
                .add_input(Variable::new("y2"))
                .add_output(Variable::new("obj"))
                .declare_partials("obj", "x", Partial::dense())
                .declare_partials("obj", "z", Partial::dense().constant(&[0.0, 1.0]))
                .declare_partials("obj", "y1", Partial::dense().constant(&[1.0]))
                .declare_partials("obj", "y2", Partial::dense());
        }

        fn compute(&self, inputs: Vector<'_>, mut outputs: VectorMut<'_>) -> Result<(), EvalError> {
            let x = inputs.value("x");
            let obj = x * x + inputs["z"][1] + inputs.value("y1") + (-inputs.value("y2")).exp();
            outputs.set("obj", obj);
            Ok(())
        }

        fn compute_partials(&mut self, inputs: Vector<'_>, partials: &mut Partials) -> Result<(), EvalError> {
            partials.set("obj", "x", &[2.0 * inputs.value("x")])?;
            partials.set("obj", "y2", &[-(-inputs.value("y2")).exp()])?;
            Ok(())
        }
    }

    /// The Sellar problem: two coupled disciplines and an objective.
    ///
    /// # Errors
    ///
    /// Returns an error if a unit or connection is rejected.
    pub fn model() -> Result<Model, Error> {
        let mut model = Model::new();
        model.add_explicit("dv", Design)?;
        model.add_explicit("d1", Discipline1)?;
        model.add_explicit("d2", Discipline2)?;
        model.add_explicit("obj", Objective)?;
        for target in ["d1.z", "d2.z", "obj.z"] {
            model.connect("dv.z_out", target)?;
        }
        for target in ["d1.x", "obj.x"] {
            model.connect("dv.x_out", target)?;
        }
        model.connect("d1.y1", "d2.y1")?;
        model.connect("d2.y2", "d1.y2")?;
        model.connect("d1.y1", "obj.y1")?;
        model.connect("d2.y2", "obj.y2")?;
        Ok(model)
    }
}

pub mod wavy {
    use num_complex::Complex64;
    use weft_core::{Capabilities, Declarations, EvalError, ExplicitUnit, Method, Partial, Variable, Vector, VectorMut};

    /// `y = eˣ sin(x)`, with its partial approximated by `method`.
    pub struct Wavy {
        pub method: Method,
    }

    /// `dy/dx` of [`Wavy`].
    #[must_use]
    pub fn exact(x: f64) -> f64 {
        x.exp() * (x.sin() + x.cos())
    }

    impl ExplicitUnit for Wavy {
        fn declare(&self, decl: &mut Declarations) {
            decl.add_input(Variable::new("x").value(&[0.7]))
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
}
