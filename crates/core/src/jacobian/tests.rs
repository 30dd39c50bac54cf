use approx::assert_relative_eq;

use super::*;
use crate::{
    Declarations, ExplicitUnit, ImplicitUnit, Partial, Partials, Variable, Vector, VectorMut,
};

/// `f = (x - 3)² + x y + (y + 4)² - 3`
struct Paraboloid;

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

/// `R = b² - a`
struct Root;

impl ImplicitUnit for Root {
    fn declare(&self, decl: &mut Declarations) {
        decl.add_input(Variable::new("a"))
            .add_output(Variable::new("b"))
            .declare_partials("b", "a", Partial::dense().constant(&[-1.0]))
            .declare_partials("b", "b", Partial::dense());
    }

    fn apply_nonlinear(
        &self,
        inputs: Vector<'_>,
        outputs: Vector<'_>,
        mut residuals: VectorMut<'_>,
    ) -> Result<(), EvalError> {
        residuals.set("b", outputs.value("b").powi(2) - inputs.value("a"));
        Ok(())
    }

    fn linearize(
        &mut self,
        _inputs: Vector<'_>,
        outputs: Vector<'_>,
        partials: &mut Partials,
    ) -> Result<(), EvalError> {
        partials.set("b", "b", &[2.0 * outputs.value("b")])?;
        Ok(())
    }
}

/// Slots are `[f, b, x, y]`; `root.a` reads `f` through a factor of 2.
struct Fixture {
    layout: Layout,
    units: Vec<UnitAdapter>,
    slots: Vec<f64>,
    inputs: Vec<f64>,
}

impl Fixture {
    fn new(x: f64, y: f64, b: f64) -> Self {
        let route = |slot, scale| Route {
            slot,
            scale,
            offset: 0.0,
        };
        let layout = Layout::new(
            4,
            vec![
                UnitSlots {
                    outputs: 0..1,
                    inputs: 0..2,
                    routes: vec![route(2, 1.0), route(3, 1.0)],
                },
                UnitSlots {
                    outputs: 1..2,
                    inputs: 2..3,
                    routes: vec![route(0, 2.0)],
                },
            ],
            vec![2..3, 3..4],
        );
        let units = vec![
            UnitAdapter::explicit("parab", Paraboloid).unwrap(),
            UnitAdapter::implicit("root", Root).unwrap(),
        ];
        let mut fixture = Self {
            layout,
            units,
            slots: vec![0.0, b, x, y],
            inputs: vec![x, y, 0.0],
        };
        fixture.linearize();
        fixture
    }

    fn linearize(&mut self) {
        for (u, unit) in self.units.iter_mut().enumerate() {
            let slots = self.layout.unit(u);
            unit.linearize(
                &self.inputs[slots.inputs.clone()],
                &self.slots[slots.outputs.clone()],
                None,
            )
            .unwrap();
        }
    }

    fn dense(jacobian: &Jacobian) -> Vec<Vec<f64>> {
        let n = jacobian.dim();
        let mut dense = vec![vec![0.0; n]; n];
        for (r, row) in jacobian.matrix().outer_iterator().enumerate() {
            for (c, &v) in row.iter() {
                dense[r][c] = v;
            }
        }
        dense
    }
}

#[test]
fn structure_composes_partials_along_connections() {
    let fixture = Fixture::new(1.0, 2.0, 3.0);
    let jacobian = Jacobian::new(&fixture.layout, &fixture.units, vec![0, 1], 0..4);

    assert_eq!(
        jacobian.pattern(),
        vec![(0, 0), (0, 2), (0, 3), (1, 0), (1, 1), (2, 2), (3, 3)]
    );
}

#[test]
fn values_follow_residual_convention() {
    let fixture = Fixture::new(1.0, 2.0, 3.0);
    let jacobian = Jacobian::new(&fixture.layout, &fixture.units, vec![0, 1], 0..4);
    let dense = Fixture::dense(&jacobian);

    // Explicit rows are `y - f(x)`.
    assert_relative_eq!(dense[0][0], 1.0);
    assert_relative_eq!(dense[0][2], -(2.0 * 1.0 - 6.0 + 2.0));
    assert_relative_eq!(dense[0][3], -(2.0 * 2.0 + 8.0 + 1.0));

    // The connection scale multiplies the input column.
    assert_relative_eq!(dense[1][0], -2.0);
    assert_relative_eq!(dense[1][1], 6.0);

    assert_relative_eq!(dense[2][2], 1.0);
    assert_relative_eq!(dense[3][3], 1.0);
}

#[test]
fn restricted_range_drops_outside_columns() {
    let fixture = Fixture::new(1.0, 2.0, 3.0);
    let jacobian = Jacobian::new(&fixture.layout, &fixture.units, vec![1], 1..2);

    assert_eq!(jacobian.dim(), 1);
    assert_eq!(jacobian.pattern(), vec![(0, 0)]);
    assert_relative_eq!(Fixture::dense(&jacobian)[0][0], 6.0);
}

#[test]
fn refresh_keeps_structure() {
    let mut fixture = Fixture::new(1.0, 2.0, 3.0);
    let mut jacobian = Jacobian::new(&fixture.layout, &fixture.units, vec![0, 1], 0..4);
    let before = jacobian.pattern();

    fixture.slots = vec![0.0, -0.5, 4.0, -1.0];
    fixture.inputs = vec![4.0, -1.0, 0.0];
    fixture.linearize();
    jacobian.refresh(&fixture.layout, &fixture.units);

    assert_eq!(jacobian.pattern(), before);
    let dense = Fixture::dense(&jacobian);
    assert_relative_eq!(dense[0][2], -(2.0 * 4.0 - 6.0 - 1.0));
    assert_relative_eq!(dense[1][1], -1.0);
}

#[test]
fn matrix_free_products_match_assembled() {
    let fixture = Fixture::new(1.5, -0.5, 2.0);
    let assembled = Jacobian::new(&fixture.layout, &fixture.units, vec![0, 1], 0..4);
    let free = MatrixFree::new(
        &fixture.layout,
        &fixture.units,
        &[0, 1],
        0..4,
        &fixture.slots,
        &fixture.inputs,
    );
    let x = [0.3, -1.2, 2.5, 0.7];

    for mode in [Mode::Fwd, Mode::Rev] {
        let mut expected = vec![0.0; 4];
        let mut actual = vec![0.0; 4];
        assembled.apply(mode, &x, &mut expected).unwrap();
        free.apply(mode, &x, &mut actual).unwrap();
        for (e, a) in expected.iter().zip(&actual) {
            assert_relative_eq!(*e, *a, epsilon = 1e-12);
        }
    }
}

#[test]
fn reverse_product_is_transpose() {
    let fixture = Fixture::new(1.0, 2.0, 3.0);
    let jacobian = Jacobian::new(&fixture.layout, &fixture.units, vec![0, 1], 0..4);
    let dense = Fixture::dense(&jacobian);

    let mut y = vec![0.0; 4];
    jacobian.product(Mode::Rev, &[0.0, 1.0, 0.0, 0.0], &mut y);
    for (c, value) in y.iter().enumerate() {
        assert_relative_eq!(*value, dense[1][c]);
    }
}
