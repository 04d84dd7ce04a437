//! Chip Geometry Modeler
//!
//! This crate provides:
//! - The `Backend` trait every drawing backend implements
//! - An HFSS backend that journals scripting calls
//! - A GDS backend that keeps polygons and writes GDSII streams
//! - The `Modeler` facade with boolean union, transforms and variables
//! - RON configuration

pub mod backend;
pub mod config;
pub mod modeler;

// Re-exports for convenience
pub use backend::{
    Backend, BackendError, BackendResult, GdsBackend, HfssBackend, HfssCommand, HfssDesign,
    Material, ObjectKind,
};
pub use config::{ConfigError, GdsConfig, HfssConfig, ModelerConfig};
pub use modeler::{
    Mode, Modeler, ModelerError, ModelerResult, RotationAngle, UniteOptions, angle_from_x,
};
