//! Physical unit parsing and affine conversion between compatible units.
//!
//! Unit expressions are products and quotients of known symbols with optional
//! integer exponents, such as `"m/s"`, `"kg*m/s**2"`, or `"ft^2"`. A conversion
//! between two expressions is the affine map `to = scale * from + offset`.
//! Offsets only apply to bare temperature units (`degC`, `degF`); inside a
//! compound expression temperature symbols are treated as differences.

use std::f64::consts::PI;

use thiserror::Error;

/// Errors raised while parsing or converting unit expressions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum UnitsError {
    #[error("unknown unit '{0}'")]
    Unknown(String),

    #[error("malformed unit expression '{0}'")]
    Malformed(String),

    #[error("cannot convert from '{from}' to '{to}'")]
    Incompatible { from: String, to: String },
}

/// Exponents of the base dimensions: length, mass, time, temperature, angle, current.
type Dims = [i32; 6];

const NONE: Dims = [0, 0, 0, 0, 0, 0];
const LENGTH: Dims = [1, 0, 0, 0, 0, 0];
const MASS: Dims = [0, 1, 0, 0, 0, 0];
const TIME: Dims = [0, 0, 1, 0, 0, 0];
const TEMPERATURE: Dims = [0, 0, 0, 1, 0, 0];
const ANGLE: Dims = [0, 0, 0, 0, 1, 0];
const CURRENT: Dims = [0, 0, 0, 0, 0, 1];
const FREQUENCY: Dims = [0, 0, -1, 0, 0, 0];
const FORCE: Dims = [1, 1, -2, 0, 0, 0];
const PRESSURE: Dims = [-1, 1, -2, 0, 0, 0];
const ENERGY: Dims = [2, 1, -2, 0, 0, 0];
const POWER: Dims = [2, 1, -3, 0, 0, 0];
const VOLTAGE: Dims = [2, 1, -3, 0, 0, -1];

/// Symbol, SI scale, SI offset, dimensions.
const SYMBOLS: &[(&str, f64, f64, Dims)] = &[
    ("unitless", 1.0, 0.0, NONE),
    ("percent", 0.01, 0.0, NONE),
    ("m", 1.0, 0.0, LENGTH),
    ("cm", 0.01, 0.0, LENGTH),
    ("mm", 1e-3, 0.0, LENGTH),
    ("km", 1e3, 0.0, LENGTH),
    ("inch", 0.0254, 0.0, LENGTH),
    ("ft", 0.3048, 0.0, LENGTH),
    ("mi", 1609.344, 0.0, LENGTH),
    ("kg", 1.0, 0.0, MASS),
    ("g", 1e-3, 0.0, MASS),
    ("lbm", 0.453_592_37, 0.0, MASS),
    ("s", 1.0, 0.0, TIME),
    ("ms", 1e-3, 0.0, TIME),
    ("min", 60.0, 0.0, TIME),
    ("h", 3600.0, 0.0, TIME),
    ("K", 1.0, 0.0, TEMPERATURE),
    ("degR", 5.0 / 9.0, 0.0, TEMPERATURE),
    ("degC", 1.0, 273.15, TEMPERATURE),
    ("degF", 5.0 / 9.0, 459.67 * 5.0 / 9.0, TEMPERATURE),
    ("rad", 1.0, 0.0, ANGLE),
    ("deg", PI / 180.0, 0.0, ANGLE),
    ("A", 1.0, 0.0, CURRENT),
    ("Hz", 1.0, 0.0, FREQUENCY),
    ("N", 1.0, 0.0, FORCE),
    ("kN", 1e3, 0.0, FORCE),
    ("lbf", 4.448_221_615_260_5, 0.0, FORCE),
    ("Pa", 1.0, 0.0, PRESSURE),
    ("kPa", 1e3, 0.0, PRESSURE),
    ("MPa", 1e6, 0.0, PRESSURE),
    ("bar", 1e5, 0.0, PRESSURE),
    ("atm", 101_325.0, 0.0, PRESSURE),
    ("psi", 6_894.757_293_168_361, 0.0, PRESSURE),
    ("J", 1.0, 0.0, ENERGY),
    ("kJ", 1e3, 0.0, ENERGY),
    ("W", 1.0, 0.0, POWER),
    ("kW", 1e3, 0.0, POWER),
    ("V", 1.0, 0.0, VOLTAGE),
];

/// A parsed unit expression in SI terms.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalUnit {
    scale: f64,
    offset: f64,
    dims: Dims,
}

impl PhysicalUnit {
    /// Parses a unit expression.
    ///
    /// # Errors
    ///
    /// Returns an error if a symbol is unknown or the expression is malformed.
    pub fn parse(expr: &str) -> Result<Self, UnitsError> {
        let trimmed = expr.trim();
        if trimmed.is_empty() {
            return Err(UnitsError::Malformed(expr.to_owned()));
        }

        let mut unit = Self {
            scale: 1.0,
            offset: 0.0,
            dims: NONE,
        };
        let mut factors = 0;
        let mut sign = 1;
        let mut token = String::new();

        // Split on `*` and `/`, treating `**` as an exponent marker.
        let chars: Vec<char> = trimmed.chars().collect();
        let mut i = 0;
        while i <= chars.len() {
            let c = chars.get(i).copied();
            let is_pow = c == Some('*') && chars.get(i + 1) == Some(&'*');
            if is_pow {
                token.push('^');
                i += 2;
                continue;
            }
            match c {
                Some('*' | '/') | None => {
                    let (scale, offset, dims) = parse_factor(token.trim(), expr)?;
                    unit.scale *= scale.powi(sign);
                    unit.offset = offset;
                    for (d, e) in unit.dims.iter_mut().zip(dims) {
                        *d += sign * e;
                    }
                    factors += 1;
                    token.clear();
                    if c == Some('/') {
                        sign = -1;
                    } else if c == Some('*') {
                        sign = 1;
                    }
                }
                Some(other) => token.push(other),
            }
            i += 1;
        }

        if factors != 1 || sign != 1 {
            unit.offset = 0.0;
        }
        Ok(unit)
    }

    /// Returns `true` if both units measure the same physical quantity.
    #[must_use]
    pub fn is_compatible(&self, other: &Self) -> bool {
        self.dims == other.dims
    }
}

/// Parses one `symbol` or `symbol^n` factor.
fn parse_factor(token: &str, expr: &str) -> Result<(f64, f64, Dims), UnitsError> {
    if token.is_empty() {
        return Err(UnitsError::Malformed(expr.to_owned()));
    }
    let (symbol, power) = match token.split_once('^') {
        Some((symbol, power)) => {
            let power: i32 = power
                .trim()
                .parse()
                .map_err(|_| UnitsError::Malformed(expr.to_owned()))?;
            (symbol.trim(), power)
        }
        None => (token, 1),
    };

    let &(_, scale, offset, dims) = SYMBOLS
        .iter()
        .find(|(name, ..)| *name == symbol)
        .ok_or_else(|| UnitsError::Unknown(symbol.to_owned()))?;

    let offset = if power == 1 { offset } else { 0.0 };
    Ok((scale.powi(power), offset, dims.map(|d| d * power)))
}

/// Returns `(scale, offset)` such that a value in `from` units equals
/// `scale * value + offset` in `to` units.
///
/// # Errors
///
/// Returns an error if either expression is invalid or the units measure
/// different quantities.
pub fn conversion(from: &str, to: &str) -> Result<(f64, f64), UnitsError> {
    let source = PhysicalUnit::parse(from)?;
    let target = PhysicalUnit::parse(to)?;
    if !source.is_compatible(&target) {
        return Err(UnitsError::Incompatible {
            from: from.to_owned(),
            to: to.to_owned(),
        });
    }
    let scale = source.scale / target.scale;
    let offset = (source.offset - target.offset) / target.scale;
    Ok((scale, offset))
}
