//! Drawing backend trait definitions
//!
//! These traits define the interface that every drawing backend must implement.

use std::path::Path;

use qd_core::{Expr, Layer, Unit};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for backend operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{operation} is not supported by the {backend} backend")]
    Unsupported {
        backend: String,
        operation: &'static str,
    },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Object already exists: {0}")]
    ObjectExists(String),

    #[error("Expression cannot be resolved to a number: {0}")]
    Unresolved(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("File I/O error: {0}")]
    FileIo(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl BackendError {
    /// Capability error for `operation` on `backend`
    pub fn unsupported(backend: &str, operation: &'static str) -> Self {
        BackendError::Unsupported {
            backend: backend.to_string(),
            operation,
        }
    }
}

/// Result type for backend operations
pub type BackendResult<T> = Result<T, BackendError>;

/// A dielectric or conductor definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub name: String,
    /// Relative permittivity
    pub permittivity: f64,
    pub loss_tangent: f64,
    /// Bulk conductivity in S/m
    pub conductivity: f64,
}

impl Material {
    /// Create a lossless dielectric
    pub fn dielectric(name: impl Into<String>, permittivity: f64) -> Self {
        Self {
            name: name.into(),
            permittivity,
            loss_tangent: 0.0,
            conductivity: 0.0,
        }
    }

    /// Set the loss tangent
    pub fn with_loss_tangent(mut self, loss_tangent: f64) -> Self {
        self.loss_tangent = loss_tangent;
        self
    }

    /// Set the conductivity
    pub fn with_conductivity(mut self, conductivity: f64) -> Self {
        self.conductivity = conductivity;
        self
    }
}

/// The drawing backend trait
///
/// Implementations receive already validated arguments: names exist (or are
/// free, for creation), and when [`Backend::supports_variables`] is false
/// every expression has been reduced to a constant.
pub trait Backend {
    /// Get the name of this backend
    fn name(&self) -> &str;

    /// Whether the backend keeps symbolic design variables
    fn supports_variables(&self) -> bool {
        false
    }

    /// Set the model length unit
    fn set_units(&mut self, _unit: Unit) -> BackendResult<()> {
        Ok(())
    }

    /// Remove every object from the underlying design
    fn delete_all_objects(&mut self) -> BackendResult<()> {
        Ok(())
    }

    /// Create or update a design variable
    fn set_variable(&mut self, _name: &str, _value: &Expr) -> BackendResult<()> {
        Ok(())
    }

    // ========== Creation ==========

    /// Draw an axis-aligned rectangle
    ///
    /// # Arguments
    /// * `origin` - Corner position (x, y, z)
    /// * `size` - Width and height, may be negative
    fn draw_rect(
        &mut self,
        name: &str,
        origin: &[Expr; 3],
        size: &[Expr; 2],
        layer: Layer,
    ) -> BackendResult<()>;

    /// Draw a polyline through `points`, closed into a polygon if requested
    fn draw_polyline(
        &mut self,
        name: &str,
        points: &[[Expr; 2]],
        closed: bool,
        layer: Layer,
    ) -> BackendResult<()>;

    /// Draw a box
    fn draw_box(&mut self, _name: &str, _origin: &[Expr; 3], _size: &[Expr; 3]) -> BackendResult<()> {
        Err(BackendError::unsupported(self.name(), "draw_box"))
    }

    // ========== Modification ==========

    /// Round the corners of an object
    fn fillet(&mut self, name: &str, radius: &Expr) -> BackendResult<()>;

    /// Duplicate an object under a new name
    fn copy(&mut self, name: &str, new_name: &str) -> BackendResult<()>;

    /// Rename an object
    fn rename(&mut self, name: &str, new_name: &str) -> BackendResult<()>;

    /// Delete objects
    fn delete(&mut self, names: &[&str]) -> BackendResult<()>;

    /// Merge objects into the first one
    ///
    /// Returns the name of the result, which is the name of `names[0]`.
    fn unite(&mut self, names: &[&str], keep_originals: bool) -> BackendResult<String>;

    /// Rotate objects about the z axis through the origin
    fn rotate(&mut self, names: &[&str], angle: &Expr) -> BackendResult<()>;

    /// Translate objects
    fn translate(&mut self, names: &[&str], vector: &[Expr; 3]) -> BackendResult<()>;

    // ========== Optional capabilities ==========

    /// Intersect objects into the first one
    fn intersect(&mut self, _names: &[&str], _keep_originals: bool) -> BackendResult<String> {
        Err(BackendError::unsupported(self.name(), "intersect"))
    }

    /// Define a material
    fn make_material(&mut self, _material: &Material) -> BackendResult<()> {
        Err(BackendError::unsupported(self.name(), "make_material"))
    }

    /// Write the backend's output artifact
    fn generate_output(&mut self, _path: &Path) -> BackendResult<()> {
        Err(BackendError::unsupported(self.name(), "generate_output"))
    }
}
