//! Design Variables
//!
//! A [`VariableStore`] is the session-local registry of named variables.
//! Handles returned by the store are shared: redefining a name updates the
//! existing handle in place, so every holder observes the new value.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::expr::{Expr, ExprError, ExprResult, IntoExpr, Scope, Value};

#[derive(Debug)]
struct VariableCell {
    name: String,
    value: RefCell<Expr>,
}

/// Shared handle to a named variable
#[derive(Debug, Clone)]
pub struct Variable(Rc<VariableCell>);

impl Variable {
    fn new(name: &str, value: Expr) -> Self {
        Self(Rc::new(VariableCell {
            name: name.to_string(),
            value: RefCell::new(value),
        }))
    }

    /// Variable name
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Current definition
    pub fn value(&self) -> Expr {
        self.0.value.borrow().clone()
    }

    /// Symbolic reference to this variable, for use in other expressions
    pub fn expr(&self) -> Expr {
        Expr::Var(self.0.name.clone())
    }

    /// Check whether two handles refer to the same variable instance
    pub fn ptr_eq(a: &Variable, b: &Variable) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    fn set(&self, value: Expr) {
        *self.0.value.borrow_mut() = value;
    }
}

impl IntoExpr for &Variable {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(self.expr())
    }
}

impl IntoExpr for Variable {
    fn into_expr(self) -> ExprResult<Expr> {
        Ok(self.expr())
    }
}

/// Check that a name can be referenced from an expression
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Registry of design variables for one modeling session
#[derive(Debug, Default)]
pub struct VariableStore {
    /// Canonical instance per name
    instances: HashMap<String, Variable>,
    /// Names in definition order
    order: Vec<String>,
}

impl VariableStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a variable, or redefine it in place if the name already exists
    pub fn define(&mut self, name: &str, value: Expr) -> Variable {
        if let Some(existing) = self.instances.get(name) {
            tracing::info!("{} is redefined to {}", name, value);
            existing.set(value);
            return existing.clone();
        }

        let variable = Variable::new(name, value);
        self.instances.insert(name.to_string(), variable.clone());
        self.order.push(name.to_string());
        variable
    }

    /// Update an existing variable. Returns `None` if the name is unknown.
    pub fn update(&mut self, name: &str, value: Expr) -> Option<Variable> {
        let existing = self.instances.get(name)?;
        existing.set(value);
        Some(existing.clone())
    }

    /// Get a variable by name
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.instances.get(name)
    }

    /// Check if a variable exists
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name)
    }

    /// Number of variables
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Check if the store is empty
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterate over variables in definition order
    pub fn iter(&self) -> impl Iterator<Item = &Variable> {
        self.order.iter().filter_map(|name| self.instances.get(name))
    }

    /// Evaluate an expression against the current definitions
    pub fn eval(&self, expr: &Expr) -> ExprResult<Value> {
        expr.eval(self)
    }

    /// Evaluate `name` as if it were (re)defined to `value`, without storing it.
    ///
    /// Catches undefined references and cycles before they enter the store.
    /// Every other variable is re-evaluated under the new definition and must
    /// keep its unit kind.
    pub fn check(&self, name: &str, value: &Expr) -> ExprResult<Value> {
        let pending = Pending {
            store: self,
            name,
            value,
        };
        let result = Expr::Var(name.to_string()).eval(&pending)?;

        for other in self.iter().filter(|v| v.name() != name) {
            let Ok(before) = self.eval(&other.expr()) else {
                continue;
            };
            let after = other.expr().eval(&pending)?;
            if after.kind != before.kind {
                return Err(ExprError::KindChanged {
                    name: other.name().to_string(),
                    from: before.kind.name(),
                    to: after.kind.name(),
                });
            }
        }
        Ok(result)
    }
}

impl Scope for VariableStore {
    fn lookup(&self, name: &str) -> Option<Expr> {
        self.instances.get(name).map(Variable::value)
    }
}

/// Store view with one definition replaced
struct Pending<'a> {
    store: &'a VariableStore,
    name: &'a str,
    value: &'a Expr,
}

impl Scope for Pending<'_> {
    fn lookup(&self, name: &str) -> Option<Expr> {
        if name == self.name {
            Some(self.value.clone())
        } else {
            self.store.lookup(name)
        }
    }
}
