//! Symbolic Expressions
//!
//! Unit-bearing expressions that can be kept symbolic (for backends that
//! understand design variables) or evaluated to a number against a [`Scope`].

mod parser;

use std::collections::HashMap;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units::{Unit, UnitKind};

pub use parser::parse;

/// Expression-related errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unknown unit: {0}")]
    UnknownUnit(String),

    #[error("Undefined variable: {0}")]
    UndefinedVariable(String),

    #[error("Circular definition involving variable: {0}")]
    Cycle(String),

    #[error("Incompatible units: cannot combine {lhs} and {rhs}")]
    IncompatibleUnits {
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Redefinition would turn {name} from a {from} into a {to}")]
    KindChanged {
        name: String,
        from: &'static str,
        to: &'static str,
    },
}

/// Result type for expression operations
pub type ExprResult<T> = Result<T, ExprError>;

/// A literal number with the unit it was written in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quantity {
    pub value: f64,
    pub unit: Unit,
}

impl Quantity {
    /// Magnitude in the canonical unit of this quantity's kind
    pub fn to_base(&self) -> Value {
        Value {
            magnitude: self.value * self.unit.to_base_factor(),
            kind: self.unit.kind(),
        }
    }
}

/// Binary operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl BinOp {
    fn symbol(&self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            BinOp::Add | BinOp::Sub => 1,
            BinOp::Mul | BinOp::Div => 2,
        }
    }
}

/// A symbolic expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Literal with unit
    Quantity(Quantity),
    /// Reference to a named variable
    Var(String),
    /// Negation
    Neg(Box<Expr>),
    /// Binary operation
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// An evaluated expression: magnitude in canonical units
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Value {
    pub magnitude: f64,
    pub kind: UnitKind,
}

impl Value {
    /// A dimensionless value
    pub fn scalar(magnitude: f64) -> Self {
        Self {
            magnitude,
            kind: UnitKind::Scalar,
        }
    }

    fn add(self, rhs: Value, negate: bool) -> ExprResult<Value> {
        let kind = match (self.kind, rhs.kind) {
            (a, b) if a == b => a,
            (UnitKind::Scalar, b) => b,
            (a, UnitKind::Scalar) => a,
            (a, b) => {
                return Err(ExprError::IncompatibleUnits {
                    lhs: a.name(),
                    rhs: b.name(),
                });
            }
        };
        let rhs = if negate { -rhs.magnitude } else { rhs.magnitude };
        Ok(Value {
            magnitude: self.magnitude + rhs,
            kind,
        })
    }

    fn mul(self, rhs: Value) -> Value {
        let kind = match (self.kind, rhs.kind) {
            (UnitKind::Scalar, b) => b,
            (a, UnitKind::Scalar) => a,
            _ => UnitKind::Compound,
        };
        Value {
            magnitude: self.magnitude * rhs.magnitude,
            kind,
        }
    }

    fn div(self, rhs: Value) -> ExprResult<Value> {
        if rhs.magnitude == 0.0 {
            return Err(ExprError::DivisionByZero);
        }
        let kind = match (self.kind, rhs.kind) {
            (a, UnitKind::Scalar) => a,
            (a, b) if a == b && a != UnitKind::Compound => UnitKind::Scalar,
            _ => UnitKind::Compound,
        };
        Ok(Value {
            magnitude: self.magnitude / rhs.magnitude,
            kind,
        })
    }
}

/// Name resolution for expression evaluation
pub trait Scope {
    /// Look up the current definition of a variable
    fn lookup(&self, name: &str) -> Option<Expr>;
}

impl Scope for () {
    fn lookup(&self, _name: &str) -> Option<Expr> {
        None
    }
}

impl Scope for HashMap<String, Expr> {
    fn lookup(&self, name: &str) -> Option<Expr> {
        self.get(name).cloned()
    }
}

impl Expr {
    /// Parse an expression from text
    pub fn parse(source: &str) -> ExprResult<Self> {
        parse(source)
    }

    /// A bare number
    pub fn number(value: f64) -> Self {
        Expr::Quantity(Quantity {
            value,
            unit: Unit::None,
        })
    }

    /// A number with a unit
    pub fn quantity(value: f64, unit: Unit) -> Self {
        Expr::Quantity(Quantity { value, unit })
    }

    /// A variable reference
    pub fn var(name: impl Into<String>) -> Self {
        Expr::Var(name.into())
    }

    /// Build a binary expression
    pub fn binary(op: BinOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    /// Value of the expression when it contains no variable references
    pub fn constant(&self) -> Option<Value> {
        self.eval(&()).ok()
    }

    /// Check whether the expression references any variable
    pub fn is_symbolic(&self) -> bool {
        match self {
            Expr::Quantity(_) => false,
            Expr::Var(_) => true,
            Expr::Neg(inner) => inner.is_symbolic(),
            Expr::Binary { lhs, rhs, .. } => lhs.is_symbolic() || rhs.is_symbolic(),
        }
    }

    /// Evaluate to a value in canonical units
    pub fn eval(&self, scope: &dyn Scope) -> ExprResult<Value> {
        let mut stack = Vec::new();
        self.eval_in(scope, &mut stack)
    }

    fn eval_in(&self, scope: &dyn Scope, stack: &mut Vec<String>) -> ExprResult<Value> {
        match self {
            Expr::Quantity(q) => Ok(q.to_base()),
            Expr::Var(name) => {
                if stack.iter().any(|n| n == name) {
                    return Err(ExprError::Cycle(name.clone()));
                }
                let definition = scope
                    .lookup(name)
                    .ok_or_else(|| ExprError::UndefinedVariable(name.clone()))?;
                stack.push(name.clone());
                let value = definition.eval_in(scope, stack);
                stack.pop();
                value
            }
            Expr::Neg(inner) => {
                let value = inner.eval_in(scope, stack)?;
                Ok(Value {
                    magnitude: -value.magnitude,
                    kind: value.kind,
                })
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = lhs.eval_in(scope, stack)?;
                let rhs = rhs.eval_in(scope, stack)?;
                match op {
                    BinOp::Add => lhs.add(rhs, false),
                    BinOp::Sub => lhs.add(rhs, true),
                    BinOp::Mul => Ok(lhs.mul(rhs)),
                    BinOp::Div => lhs.div(rhs),
                }
            }
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Neg(_) => 3,
            Expr::Quantity(q) if q.value < 0.0 => 3,
            _ => 4,
        }
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::quantity(value.magnitude, Unit::base_of(value.kind))
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::number(value)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Quantity(q) => write!(f, "{}{}", q.value, q.unit.symbol()),
            Expr::Var(name) => f.write_str(name),
            Expr::Neg(inner) => {
                if inner.precedence() < 3 {
                    write!(f, "-({})", inner)
                } else {
                    write!(f, "-{}", inner)
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let prec = op.precedence();
                if lhs.precedence() < prec {
                    write!(f, "({})", lhs)?;
                } else {
                    write!(f, "{}", lhs)?;
                }
                write!(f, " {} ", op.symbol())?;
                let wrap_rhs = rhs.precedence() < prec
                    || (rhs.precedence() == prec && matches!(op, BinOp::Sub | BinOp::Div));
                if wrap_rhs {
                    write!(f, "({})", rhs)
                } else {
                    write!(f, "{}", rhs)
                }
            }
        }
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Add, self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Sub, self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mul, self, rhs)
    }
}

impl Mul<Expr> for f64 {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Mul, Expr::number(self), rhs)
    }
}

impl Div for Expr {
    type Output = Expr;

    fn div(self, rhs: Expr) -> Expr {
        Expr::binary(BinOp::Div, self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Neg(inner) => *inner,
            other => Expr::Neg(Box::new(other)),
        }
    }
}

/// Conversion into an expression, parsing text where needed
pub trait IntoExpr {
    fn into_expr(self) -> ExprResult<Expr>;
}

impl IntoExpr for Expr {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(self)
    }
}

impl IntoExpr for &Expr {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(self.clone())
    }
}

impl IntoExpr for &str {
    fn into_expr(self) -> ExprResult<Expr> {
        parse(self)
    }
}

impl IntoExpr for String {
    fn into_expr(self) -> ExprResult<Expr> {
        parse(&self)
    }
}

impl IntoExpr for &String {
    fn into_expr(self) -> ExprResult<Expr> {
        parse(self)
    }
}

impl IntoExpr for f64 {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(Expr::number(self))
    }
}

impl IntoExpr for i32 {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(Expr::number(self as f64))
    }
}

/// Parse a list of coordinates, e.g. `["10um", "-gap"]`
pub fn parse_coords<T: IntoExpr>(items: impl IntoIterator<Item = T>) -> ExprResult<Vec<Expr>> {
    items.into_iter().map(IntoExpr::into_expr).collect()
}
