//! Modeler Facade
//!
//! One entry point for drawing with either backend. The modeler owns the
//! variable store and the entity registry, validates every request against
//! them, and delegates geometry to the backend chosen at construction.

mod options;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use qd_core::{
    Dimension, Entity, EntityError, EntityRegistry, Expr, ExprError, IntoExpr, Layer, Unit,
    UnitKind, Value, Variable, VariableStore, is_identifier,
};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{Backend, BackendError, GdsBackend, HfssBackend, HfssDesign, Material};
use crate::config::ModelerConfig;

pub use options::{RotationAngle, UniteOptions, angle_from_x};

/// Backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// 3D electromagnetic design
    Hfss,
    /// 2D mask layout
    Gds,
}

impl FromStr for Mode {
    type Err = ModelerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hfss" | "backend-3d" => Ok(Mode::Hfss),
            "gds" | "backend-2d" => Ok(Mode::Gds),
            other => Err(ModelerError::Configuration(format!(
                "unknown mode {:?}, expected \"hfss\" or \"gds\"",
                other
            ))),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Hfss => f.write_str("hfss"),
            Mode::Gds => f.write_str("gds"),
        }
    }
}

/// Modeler errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelerError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Expression error: {0}")]
    Expr(ExprError),

    #[error(transparent)]
    Backend(BackendError),
}

impl From<ExprError> for ModelerError {
    fn from(error: ExprError) -> Self {
        match error {
            ExprError::UndefinedVariable(name) => {
                ModelerError::NotFound(format!("variable {}", name))
            }
            other => ModelerError::Expr(other),
        }
    }
}

impl From<BackendError> for ModelerError {
    fn from(error: BackendError) -> Self {
        match error {
            unsupported @ BackendError::Unsupported { .. } => {
                ModelerError::Unsupported(unsupported.to_string())
            }
            other => ModelerError::Backend(other),
        }
    }
}

impl From<EntityError> for ModelerError {
    fn from(error: EntityError) -> Self {
        match error {
            EntityError::NotFound(name) => ModelerError::NotFound(format!("entity {}", name)),
            EntityError::NameTaken(name) => {
                ModelerError::Validation(format!("entity name {} is already in use", name))
            }
        }
    }
}

/// Result type for modeler operations
pub type ModelerResult<T> = Result<T, ModelerError>;

/// Geometry modeler over one backend
pub struct Modeler {
    mode: Mode,
    backend: Box<dyn Backend>,
    variables: VariableStore,
    entities: EntityRegistry,
    /// Every entity ever registered, in creation order
    bodies: Vec<Uuid>,
}

impl fmt::Debug for Modeler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Modeler")
            .field("mode", &self.mode)
            .field("backend", &self.backend.name())
            .field("variables", &self.variables.len())
            .field("entities", &self.entities.len())
            .finish()
    }
}

impl Modeler {
    /// Create a modeler from a mode string
    ///
    /// `"hfss"` attaches to a fresh default design; use [`Modeler::hfss`] to
    /// attach to a design you keep a handle on.
    pub fn new(mode: &str) -> ModelerResult<Self> {
        match mode.parse::<Mode>()? {
            Mode::Hfss => Self::hfss(HfssDesign::default()),
            Mode::Gds => Ok(Self::gds(GdsBackend::default())),
        }
    }

    /// Attach to an HFSS design.
    ///
    /// Sets the model units to millimetres and deletes every object already in
    /// the design.
    pub fn hfss(design: HfssDesign) -> ModelerResult<Self> {
        let mut backend = HfssBackend::attach(design);
        backend.set_units(Unit::Millimeter)?;
        backend.delete_all_objects()?;
        Ok(Self::with_backend(Mode::Hfss, Box::new(backend)))
    }

    /// Draw into a layout
    pub fn gds(backend: GdsBackend) -> Self {
        Self::with_backend(Mode::Gds, Box::new(backend))
    }

    /// Create a modeler from configuration
    pub fn from_config(config: &ModelerConfig) -> ModelerResult<Self> {
        match config.mode.parse::<Mode>()? {
            Mode::Hfss => Self::hfss(HfssDesign::new(config.hfss.design_name.clone())),
            Mode::Gds => {
                let gds = &config.gds;
                Ok(Self::gds(
                    GdsBackend::new(gds.library.clone(), gds.cell.clone())
                        .with_units(gds.unit, gds.precision)
                        .with_fillet_points(gds.fillet_points),
                ))
            }
        }
    }

    fn with_backend(mode: Mode, backend: Box<dyn Backend>) -> Self {
        tracing::info!("Modeler created with {} backend", backend.name());
        Self {
            mode,
            backend,
            variables: VariableStore::new(),
            entities: EntityRegistry::new(),
            bodies: Vec::new(),
        }
    }

    // ============== Accessors ==============

    /// Backend mode
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The backend
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Design variables
    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    /// Registered entities
    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    /// Get an entity by name
    pub fn entity(&self, name: &str) -> Option<&Entity> {
        self.entities.get(name)
    }

    /// IDs of every entity registered so far, in creation order
    pub fn bodies(&self) -> &[Uuid] {
        &self.bodies
    }

    // ============== Variables ==============

    /// Define a variable, or redefine it in place.
    ///
    /// Returns the variable handle; redefinition returns the existing handle.
    pub fn set_variable(&mut self, name: &str, value: impl IntoExpr) -> ModelerResult<Variable> {
        if !is_identifier(name) {
            return Err(ModelerError::Validation(format!(
                "{:?} is not a valid variable name",
                name
            )));
        }
        let value = value.into_expr()?;
        self.variables.check(name, &value)?;

        if self.backend.supports_variables() {
            self.backend.set_variable(name, &value)?;
        }
        Ok(self.variables.define(name, value))
    }

    /// Update an existing variable
    pub fn update_variable(&mut self, name: &str, value: impl IntoExpr) -> ModelerResult<Variable> {
        if !self.variables.contains(name) {
            return Err(ModelerError::NotFound(format!("variable {}", name)));
        }
        let value = value.into_expr()?;
        self.variables.check(name, &value)?;

        if self.backend.supports_variables() {
            self.backend.set_variable(name, &value)?;
        }
        self.variables
            .update(name, value)
            .ok_or_else(|| ModelerError::NotFound(format!("variable {}", name)))
    }

    /// Get a variable by name
    pub fn variable(&self, name: &str) -> Option<&Variable> {
        self.variables.get(name)
    }

    /// Evaluate an expression to canonical units (mm, deg, H, F)
    pub fn value_of(&self, value: impl IntoExpr) -> ModelerResult<Value> {
        Ok(self.variables.eval(&value.into_expr()?)?)
    }

    // ============== Drawing ==============

    /// Draw a rectangle from a corner (x, y[, z]) and a size (w, h)
    pub fn rect<T: IntoExpr, U: IntoExpr>(
        &mut self,
        name: &str,
        origin: impl IntoIterator<Item = T>,
        size: impl IntoIterator<Item = U>,
        layer: Layer,
    ) -> ModelerResult<Entity> {
        self.require_free(name)?;
        let origin = self.point(origin)?;
        let size = self.lengths::<2, _>(size, "rectangle size")?;

        self.backend.draw_rect(name, &origin, &size, layer)?;
        self.register(Entity::new(name, Dimension::Surface).with_layer(layer))
    }

    /// Draw a polyline; closed polylines are surfaces
    pub fn polyline<T: IntoExpr>(
        &mut self,
        name: &str,
        points: impl IntoIterator<Item = [T; 2]>,
        closed: bool,
        layer: Layer,
    ) -> ModelerResult<Entity> {
        self.require_free(name)?;
        let points = points
            .into_iter()
            .map(|point| self.lengths::<2, _>(point, "polyline point"))
            .collect::<ModelerResult<Vec<_>>>()?;
        if points.len() < 2 {
            return Err(ModelerError::Validation(format!(
                "polyline {} needs at least two points",
                name
            )));
        }

        self.backend.draw_polyline(name, &points, closed, layer)?;
        let dimension = if closed {
            Dimension::Surface
        } else {
            Dimension::Line
        };
        self.register(Entity::new(name, dimension).with_layer(layer))
    }

    /// Draw a box from a corner and a size (x, y, z)
    pub fn draw_box<T: IntoExpr, U: IntoExpr>(
        &mut self,
        name: &str,
        origin: impl IntoIterator<Item = T>,
        size: impl IntoIterator<Item = U>,
    ) -> ModelerResult<Entity> {
        self.require_free(name)?;
        let origin = self.point(origin)?;
        let size = self.lengths::<3, _>(size, "box size")?;

        self.backend.draw_box(name, &origin, &size)?;
        self.register(Entity::new(name, Dimension::Solid))
    }

    /// Round the corners of an entity
    pub fn fillet(&mut self, name: &str, radius: impl IntoExpr) -> ModelerResult<()> {
        self.require(&[name])?;
        let radius = self.resolve(radius.into_expr()?, LENGTH)?;

        self.backend.fillet(name, &radius)?;
        if let Some(entity) = self.entities.get_mut(name) {
            entity.is_fillet = true;
        }
        Ok(())
    }

    /// Copy an entity; the copy is named `<name>_<n>`
    pub fn copy(&mut self, name: &str) -> ModelerResult<Entity> {
        self.require(&[name])?;
        let new_name = self.entities.unique_name(name);

        self.backend.copy(name, &new_name)?;
        let id = self.entities.copy(name, &new_name)?;
        self.bodies.push(id);
        tracing::debug!("Copied {} to {}", name, new_name);
        self.entity_or_missing(&new_name)
    }

    /// Rename an entity
    pub fn rename(&mut self, name: &str, new_name: &str) -> ModelerResult<()> {
        self.require(&[name])?;
        if name == new_name {
            return Ok(());
        }
        self.require_free(new_name)?;

        self.backend.rename(name, new_name)?;
        self.entities.rename(name, new_name)?;
        Ok(())
    }

    /// Delete entities from the backend and the registry
    pub fn delete_entities(&mut self, names: &[&str]) -> ModelerResult<()> {
        if names.is_empty() {
            return Ok(());
        }
        self.require(names)?;

        self.backend.delete(names)?;
        for name in names {
            self.entities.remove(name);
        }
        Ok(())
    }

    // ============== Booleans ==============

    /// Unite entities into one.
    ///
    /// The first entity (or `options.main`) gives its name to the result.
    /// Without `keep_originals` every input is consumed; with it the main
    /// entity is copied first and the copy absorbs the others.
    pub fn unite(&mut self, entities: &[&str], options: UniteOptions) -> ModelerResult<Entity> {
        let names = self.normalize(entities, options.main.as_deref())?;
        if let (true, Some(new_name)) = (options.keep_originals, options.new_name.as_deref()) {
            // A lone input may keep its own name
            if !(names.len() == 1 && names[0] == new_name) {
                self.require_free(new_name)?;
            }
        }

        if names.len() == 1 {
            let name = &names[0];
            if options.keep_originals {
                let name = self.rename_result(name, options.new_name.as_deref())?;
                return self.entity_or_missing(&name);
            }
            return self.entity_or_missing(name);
        }

        let dimension = self.common_dimension(&names)?;
        let mut names = names;
        let main = names[0].clone();
        let layer = self.entity_or_missing(&main)?.layer;

        if options.keep_originals {
            let copy = self.copy(&main)?;
            names[0] = copy.name;
        }

        let is_fillet = names
            .iter()
            .filter_map(|name| self.entities.get(name))
            .any(|entity| entity.is_fillet);

        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let result_name = self.backend.unite(&refs, options.keep_originals)?;
        tracing::debug!("United {:?} into {}", refs, result_name);

        if options.keep_originals {
            let entity = self
                .entities
                .get_mut(&result_name)
                .ok_or_else(|| ModelerError::NotFound(format!("entity {}", result_name)))?;
            entity.is_boolean = true;
            entity.is_fillet |= is_fillet;

            let name = self.rename_result(&result_name, options.new_name.as_deref())?;
            return self.entity_or_missing(&name);
        }

        for name in &names {
            self.entities.remove(name);
        }
        let mut result = Entity::new(main, dimension).with_layer(layer);
        result.is_boolean = true;
        result.is_fillet = is_fillet;
        self.register(result)
    }

    /// Intersect entities into the first one
    pub fn intersect(&mut self, entities: &[&str], keep_originals: bool) -> ModelerResult<Entity> {
        let names = self.normalize(entities, None)?;
        self.common_dimension(&names)?;

        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let result_name = self.backend.intersect(&refs, keep_originals)?;

        if !keep_originals {
            for name in names.iter().filter(|name| **name != result_name) {
                self.entities.remove(name);
            }
        }
        if let Some(entity) = self.entities.get_mut(&result_name) {
            entity.is_boolean = true;
        }
        self.entity_or_missing(&result_name)
    }

    // ============== Transforms ==============

    /// Rotate entities about the z axis.
    ///
    /// Accepts an angle (bare numbers are degrees) or a 2D direction vector,
    /// in which case the angle from +x to the vector is used.
    pub fn rotate(&mut self, entities: &[&str], angle: impl Into<RotationAngle>) -> ModelerResult<()> {
        let angle = angle.into().into_angle()?;
        self.require(entities)?;
        let angle = self.resolve(angle, ANGLE)?;

        self.backend.rotate(entities, &angle)?;
        tracing::debug!("Rotated {:?} by {}", entities, angle);
        Ok(())
    }

    /// Translate entities by (x, y[, z])
    pub fn translate<T: IntoExpr>(
        &mut self,
        entities: &[&str],
        vector: impl IntoIterator<Item = T>,
    ) -> ModelerResult<()> {
        let vector = self.point(vector)?;
        self.require(entities)?;

        self.backend.translate(entities, &vector)?;
        Ok(())
    }

    // ============== Capabilities ==============

    /// Define a material
    pub fn make_material(&mut self, material: &Material) -> ModelerResult<()> {
        Ok(self.backend.make_material(material)?)
    }

    /// Write the layout to `folder/filename`, returning the path
    pub fn generate_gds(&mut self, folder: impl AsRef<Path>, filename: &str) -> ModelerResult<PathBuf> {
        let path = folder.as_ref().join(filename);
        self.backend.generate_output(&path)?;
        Ok(path)
    }

    // ============== Helpers ==============

    fn register(&mut self, entity: Entity) -> ModelerResult<Entity> {
        let registered = entity.clone();
        let id = self.entities.insert(entity)?;
        self.bodies.push(id);
        Ok(registered)
    }

    fn entity_or_missing(&self, name: &str) -> ModelerResult<Entity> {
        self.entities
            .get(name)
            .cloned()
            .ok_or_else(|| ModelerError::NotFound(format!("entity {}", name)))
    }

    fn require(&self, names: &[&str]) -> ModelerResult<()> {
        match names.iter().find(|name| !self.entities.contains(name)) {
            Some(missing) => Err(ModelerError::NotFound(format!("entity {}", missing))),
            None => Ok(()),
        }
    }

    fn require_free(&self, name: &str) -> ModelerResult<()> {
        if name.is_empty() {
            return Err(ModelerError::Validation("entity name is empty".into()));
        }
        if self.entities.contains(name) {
            return Err(ModelerError::Validation(format!(
                "entity name {} is already in use",
                name
            )));
        }
        Ok(())
    }

    /// Owned, de-duplicated list with `main` first; every name must exist
    fn normalize(&self, entities: &[&str], main: Option<&str>) -> ModelerResult<Vec<String>> {
        let mut names: Vec<String> = Vec::with_capacity(entities.len() + 1);
        for name in entities {
            if !names.iter().any(|n| n == name) {
                names.push(name.to_string());
            }
        }
        if let Some(main) = main {
            names.retain(|n| n != main);
            names.insert(0, main.to_string());
        }
        if names.is_empty() {
            return Err(ModelerError::Validation("no entities given".into()));
        }

        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        self.require(&refs)?;
        Ok(names)
    }

    fn common_dimension(&self, names: &[String]) -> ModelerResult<Dimension> {
        let first = self.entity_or_missing(&names[0])?.dimension;
        for name in &names[1..] {
            if self.entity_or_missing(name)?.dimension != first {
                return Err(ModelerError::TypeMismatch(
                    "all united elements must share the same dimension".into(),
                ));
            }
        }
        Ok(first)
    }

    /// Rename a kept-originals result; no name leaves it as is
    fn rename_result(&mut self, name: &str, new_name: Option<&str>) -> ModelerResult<String> {
        match new_name {
            Some(new_name) => {
                self.rename(name, new_name)?;
                Ok(new_name.to_string())
            }
            None => {
                tracing::warn!("No new name given for union result, keeping {}", name);
                Ok(name.to_string())
            }
        }
    }

    /// Check an expression's unit and, for backends without variables,
    /// replace it with its constant value.
    fn resolve(&self, expr: Expr, kinds: &[UnitKind]) -> ModelerResult<Expr> {
        let value = self.variables.eval(&expr)?;
        if !kinds.contains(&value.kind) {
            return Err(ModelerError::Validation(format!(
                "{} is a {}, expected {}",
                expr,
                value.kind.name(),
                kinds[0].name()
            )));
        }
        if self.backend.supports_variables() {
            Ok(expr)
        } else {
            Ok(Expr::from(value))
        }
    }

    fn lengths<const N: usize, T: IntoExpr>(
        &self,
        items: impl IntoIterator<Item = T>,
        what: &str,
    ) -> ModelerResult<[Expr; N]> {
        let exprs = items
            .into_iter()
            .map(|item| -> ModelerResult<Expr> { self.resolve(item.into_expr()?, LENGTH) })
            .collect::<ModelerResult<Vec<_>>>()?;
        let count = exprs.len();
        exprs.try_into().map_err(|_| {
            ModelerError::Validation(format!("{} needs {} components, got {}", what, N, count))
        })
    }

    /// (x, y) or (x, y, z); z defaults to 0
    fn point<T: IntoExpr>(&self, items: impl IntoIterator<Item = T>) -> ModelerResult<[Expr; 3]> {
        let mut exprs = items
            .into_iter()
            .map(|item| -> ModelerResult<Expr> { self.resolve(item.into_expr()?, LENGTH) })
            .collect::<ModelerResult<Vec<_>>>()?;
        if exprs.len() == 2 {
            exprs.push(Expr::number(0.0));
        }
        let count = exprs.len();
        exprs.try_into().map_err(|_| {
            ModelerError::Validation(format!("expected 2 or 3 coordinates, got {}", count))
        })
    }
}

const LENGTH: &[UnitKind] = &[UnitKind::Length, UnitKind::Scalar];
const ANGLE: &[UnitKind] = &[UnitKind::Angle, UnitKind::Scalar];
