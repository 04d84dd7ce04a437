//! Operation arguments

use glam::DVec2;
use qd_core::{Expr, IntoExpr, Unit, Variable};

use super::{ModelerError, ModelerResult};

/// Options for [`super::Modeler::unite`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniteOptions {
    /// Entity the others are merged into; it is moved to the front
    pub main: Option<String>,
    /// Leave the inputs in place and produce the union as a new entity
    pub keep_originals: bool,
    /// Name for the union when originals are kept
    pub new_name: Option<String>,
}

impl UniteOptions {
    /// Destructive union into the first entity
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the main entity
    pub fn main(mut self, name: impl Into<String>) -> Self {
        self.main = Some(name.into());
        self
    }

    /// Keep the original entities
    pub fn keep_originals(mut self, keep: bool) -> Self {
        self.keep_originals = keep;
        self
    }

    /// Name the union (only used when originals are kept)
    pub fn new_name(mut self, name: impl Into<String>) -> Self {
        self.new_name = Some(name.into());
        self
    }
}

/// Rotation argument: an angle, or a direction whose angle from +x is used
#[derive(Debug, Clone, PartialEq)]
pub enum RotationAngle {
    /// Angle expression; bare numbers are degrees
    Angle(Expr),
    /// Angle expression as text, parsed on use
    Text(String),
    /// Direction vector, must have two components
    Vector(Vec<f64>),
}

impl RotationAngle {
    /// Reduce to an angle expression
    pub fn into_angle(self) -> ModelerResult<Expr> {
        match self {
            RotationAngle::Angle(expr) => Ok(expr),
            RotationAngle::Text(text) => Ok(text.into_expr()?),
            RotationAngle::Vector(components) => {
                let [x, y] = components.as_slice() else {
                    return Err(ModelerError::Validation(format!(
                        "rotation vector must have 2 components, got {}",
                        components.len()
                    )));
                };
                let direction = DVec2::new(*x, *y);
                if direction == DVec2::ZERO {
                    return Err(ModelerError::Validation(
                        "rotation vector has no direction".into(),
                    ));
                }
                Ok(Expr::quantity(angle_from_x(direction), Unit::Degree))
            }
        }
    }
}

/// Angle from (1, 0) to `v` in degrees, in (-180, 180]
pub fn angle_from_x(v: DVec2) -> f64 {
    DVec2::X.perp_dot(v).atan2(DVec2::X.dot(v)).to_degrees()
}

impl From<Expr> for RotationAngle {
    fn from(expr: Expr) -> Self {
        RotationAngle::Angle(expr)
    }
}

impl From<&Variable> for RotationAngle {
    fn from(variable: &Variable) -> Self {
        RotationAngle::Angle(variable.expr())
    }
}

impl From<f64> for RotationAngle {
    fn from(degrees: f64) -> Self {
        RotationAngle::Angle(Expr::number(degrees))
    }
}

impl From<i32> for RotationAngle {
    fn from(degrees: i32) -> Self {
        RotationAngle::Angle(Expr::number(degrees as f64))
    }
}

impl From<&str> for RotationAngle {
    fn from(text: &str) -> Self {
        RotationAngle::Text(text.to_string())
    }
}

impl From<[f64; 2]> for RotationAngle {
    fn from(v: [f64; 2]) -> Self {
        RotationAngle::Vector(v.to_vec())
    }
}

impl From<Vec<f64>> for RotationAngle {
    fn from(v: Vec<f64>) -> Self {
        RotationAngle::Vector(v)
    }
}

impl From<&[f64]> for RotationAngle {
    fn from(v: &[f64]) -> Self {
        RotationAngle::Vector(v.to_vec())
    }
}
