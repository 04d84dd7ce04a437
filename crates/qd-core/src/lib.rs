//! Core data for chip drawings
//!
//! This crate provides:
//! - Physical units with canonical conversion
//! - Symbolic, unit-bearing expressions (parsed with pest)
//! - A session-local store of design variables
//! - Entities and the name-keyed entity registry

pub mod entity;
pub mod expr;
pub mod units;
pub mod variable;

// Re-exports for convenience
pub use entity::{Dimension, Entity, EntityError, EntityRegistry, Layer};
pub use expr::{
    BinOp, Expr, ExprError, ExprResult, IntoExpr, Quantity, Scope, Value, parse, parse_coords,
};
pub use units::{Unit, UnitKind};
pub use variable::{Variable, VariableStore, is_identifier};
