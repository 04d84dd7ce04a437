//! GDS Backend
//!
//! Keeps flat polygons per object name and writes them to a GDSII stream.
//! All coordinates are millimetres; expressions must already be constants.

pub mod stream;

use std::collections::BTreeMap;
use std::path::Path;

use glam::DVec2;
use qd_core::{Expr, Layer, UnitKind};

use super::{Backend, BackendError, BackendResult};
use stream::{StreamElement, StreamLibrary};

/// One polygon or path of a shape
#[derive(Debug, Clone, PartialEq)]
pub struct GdsElement {
    pub layer: Layer,
    pub points: Vec<DVec2>,
    pub closed: bool,
}

/// All elements drawn under one object name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GdsShape {
    pub elements: Vec<GdsElement>,
}

/// In-memory layout backend
#[derive(Debug, Clone)]
pub struct GdsBackend {
    library: String,
    cell: String,
    /// User unit in metres
    unit: f64,
    /// Database unit in metres
    precision: f64,
    /// Points per rounded corner
    fillet_points: usize,
    shapes: BTreeMap<String, GdsShape>,
}

impl Default for GdsBackend {
    fn default() -> Self {
        Self::new("LIB", "TOP")
    }
}

impl GdsBackend {
    /// Create an empty layout with one top cell
    pub fn new(library: impl Into<String>, cell: impl Into<String>) -> Self {
        Self {
            library: library.into(),
            cell: cell.into(),
            unit: 1e-6,
            precision: 1e-9,
            fillet_points: 8,
            shapes: BTreeMap::new(),
        }
    }

    /// Set the user and database units (in metres)
    pub fn with_units(mut self, unit: f64, precision: f64) -> Self {
        self.unit = unit;
        self.precision = precision;
        self
    }

    /// Set the number of points used for each rounded corner
    pub fn with_fillet_points(mut self, fillet_points: usize) -> Self {
        self.fillet_points = fillet_points.max(2);
        self
    }

    /// Get a shape by name
    pub fn shape(&self, name: &str) -> Option<&GdsShape> {
        self.shapes.get(name)
    }

    /// Shape names, sorted
    pub fn shape_names(&self) -> Vec<String> {
        self.shapes.keys().cloned().collect()
    }

    /// Encode the layout as a GDSII stream
    pub fn to_bytes(&self) -> BackendResult<Vec<u8>> {
        let elements: Vec<StreamElement<'_>> = self
            .shapes
            .values()
            .flat_map(|shape| shape.elements.iter())
            .map(|element| StreamElement {
                layer: element.layer.layer,
                datatype: element.layer.datatype,
                points: &element.points,
                closed: element.closed,
            })
            .collect();

        stream::encode(
            &StreamLibrary {
                name: &self.library,
                cell: &self.cell,
                unit: self.unit,
                precision: self.precision,
            },
            &elements,
        )
    }

    fn insert(&mut self, name: &str, element: GdsElement) -> BackendResult<()> {
        if self.shapes.contains_key(name) {
            return Err(BackendError::ObjectExists(name.to_string()));
        }
        self.shapes.insert(
            name.to_string(),
            GdsShape {
                elements: vec![element],
            },
        );
        Ok(())
    }

    fn require(&self, names: &[&str]) -> BackendResult<()> {
        match names.iter().find(|name| !self.shapes.contains_key(**name)) {
            Some(missing) => Err(BackendError::ObjectNotFound(missing.to_string())),
            None => Ok(()),
        }
    }

    fn transform(&mut self, names: &[&str], f: impl Fn(DVec2) -> DVec2) -> BackendResult<()> {
        self.require(names)?;
        for name in names {
            if let Some(shape) = self.shapes.get_mut(*name) {
                for element in &mut shape.elements {
                    for point in &mut element.points {
                        *point = f(*point);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Constant magnitude of an expression of one of the given kinds
fn constant(expr: &Expr, kinds: &[UnitKind]) -> BackendResult<f64> {
    let value = expr
        .constant()
        .ok_or_else(|| BackendError::Unresolved(expr.to_string()))?;
    if kinds.contains(&value.kind) {
        Ok(value.magnitude)
    } else {
        Err(BackendError::InvalidGeometry(format!(
            "{} is a {}",
            expr,
            value.kind.name()
        )))
    }
}

fn length(expr: &Expr) -> BackendResult<f64> {
    constant(expr, &[UnitKind::Length, UnitKind::Scalar])
}

fn degrees(expr: &Expr) -> BackendResult<f64> {
    constant(expr, &[UnitKind::Angle, UnitKind::Scalar])
}

impl Backend for GdsBackend {
    fn name(&self) -> &str {
        "gds"
    }

    fn delete_all_objects(&mut self) -> BackendResult<()> {
        self.shapes.clear();
        Ok(())
    }

    fn draw_rect(
        &mut self,
        name: &str,
        origin: &[Expr; 3],
        size: &[Expr; 2],
        layer: Layer,
    ) -> BackendResult<()> {
        let corner = DVec2::new(length(&origin[0])?, length(&origin[1])?);
        let size = DVec2::new(length(&size[0])?, length(&size[1])?);
        if size.x == 0.0 || size.y == 0.0 {
            return Err(BackendError::InvalidGeometry(format!(
                "rectangle {} has zero area",
                name
            )));
        }

        tracing::debug!("rect {} at {} size {}", name, corner, size);
        self.insert(
            name,
            GdsElement {
                layer,
                points: vec![
                    corner,
                    corner + DVec2::new(size.x, 0.0),
                    corner + size,
                    corner + DVec2::new(0.0, size.y),
                ],
                closed: true,
            },
        )
    }

    fn draw_polyline(
        &mut self,
        name: &str,
        points: &[[Expr; 2]],
        closed: bool,
        layer: Layer,
    ) -> BackendResult<()> {
        let mut points = points
            .iter()
            .map(|[x, y]| -> BackendResult<DVec2> { Ok(DVec2::new(length(x)?, length(y)?)) })
            .collect::<BackendResult<Vec<_>>>()?;
        // A closing point equal to the first one is implied
        if closed && points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        let min = if closed { 3 } else { 2 };
        if points.len() < min {
            return Err(BackendError::InvalidGeometry(format!(
                "polyline {} needs at least {} distinct points",
                name, min
            )));
        }

        tracing::debug!("polyline {} ({} points)", name, points.len());
        self.insert(
            name,
            GdsElement {
                layer,
                points,
                closed,
            },
        )
    }

    fn fillet(&mut self, name: &str, radius: &Expr) -> BackendResult<()> {
        let radius = length(radius)?;
        if radius < 0.0 {
            return Err(BackendError::InvalidGeometry(format!(
                "negative fillet radius {}",
                radius
            )));
        }
        let arc_points = self.fillet_points;
        let shape = self
            .shapes
            .get_mut(name)
            .ok_or_else(|| BackendError::ObjectNotFound(name.to_string()))?;
        if radius == 0.0 {
            return Ok(());
        }

        for element in &mut shape.elements {
            element.points = round_corners(&element.points, element.closed, radius, arc_points);
        }
        tracing::debug!("fillet {} radius {}", name, radius);
        Ok(())
    }

    fn copy(&mut self, name: &str, new_name: &str) -> BackendResult<()> {
        let shape = self
            .shapes
            .get(name)
            .cloned()
            .ok_or_else(|| BackendError::ObjectNotFound(name.to_string()))?;
        if self.shapes.contains_key(new_name) {
            return Err(BackendError::ObjectExists(new_name.to_string()));
        }
        self.shapes.insert(new_name.to_string(), shape);
        Ok(())
    }

    fn rename(&mut self, name: &str, new_name: &str) -> BackendResult<()> {
        if self.shapes.contains_key(new_name) {
            return Err(BackendError::ObjectExists(new_name.to_string()));
        }
        let shape = self
            .shapes
            .remove(name)
            .ok_or_else(|| BackendError::ObjectNotFound(name.to_string()))?;
        self.shapes.insert(new_name.to_string(), shape);
        Ok(())
    }

    fn delete(&mut self, names: &[&str]) -> BackendResult<()> {
        self.require(names)?;
        for name in names {
            self.shapes.remove(*name);
        }
        Ok(())
    }

    fn unite(&mut self, names: &[&str], keep_originals: bool) -> BackendResult<String> {
        let (first, rest) = names
            .split_first()
            .ok_or_else(|| BackendError::InvalidGeometry("no objects to unite".into()))?;
        self.require(names)?;

        let mut merged = Vec::new();
        for name in rest {
            let elements = if keep_originals {
                self.shapes.get(*name).map(|s| s.elements.clone())
            } else {
                self.shapes.remove(*name).map(|s| s.elements)
            };
            merged.extend(elements.unwrap_or_default());
        }
        if let Some(main) = self.shapes.get_mut(*first) {
            main.elements.extend(merged);
        }

        tracing::debug!("unite {:?} into {}", rest, first);
        Ok(first.to_string())
    }

    fn rotate(&mut self, names: &[&str], angle: &Expr) -> BackendResult<()> {
        let rotation = DVec2::from_angle(degrees(angle)?.to_radians());
        self.transform(names, |p| rotation.rotate(p))
    }

    fn translate(&mut self, names: &[&str], vector: &[Expr; 3]) -> BackendResult<()> {
        // z has no meaning in a layout
        let offset = DVec2::new(length(&vector[0])?, length(&vector[1])?);
        self.transform(names, |p| p + offset)
    }

    fn generate_output(&mut self, path: &Path) -> BackendResult<()> {
        let bytes = self.to_bytes()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BackendError::FileIo(e.to_string()))?;
        }
        std::fs::write(path, bytes).map_err(|e| BackendError::FileIo(e.to_string()))?;
        tracing::info!(
            "GDS written to {} ({} shapes)",
            path.display(),
            self.shapes.len()
        );
        Ok(())
    }
}

/// Counter-clockwise angle from `a` to `b`, in radians
fn signed_angle(a: DVec2, b: DVec2) -> f64 {
    a.perp_dot(b).atan2(a.dot(b))
}

/// Replace every corner with a circular arc of `radius`.
///
/// The tangent distance is clamped to half the shorter adjacent edge, which
/// shrinks the radius at tight corners. Open paths keep their end points.
fn round_corners(points: &[DVec2], closed: bool, radius: f64, arc_points: usize) -> Vec<DVec2> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }

    let mut rounded = Vec::with_capacity(n * arc_points);
    for i in 0..n {
        let corner = points[i];
        let is_end = !closed && (i == 0 || i == n - 1);
        if is_end {
            rounded.push(corner);
            continue;
        }

        let prev = points[(i + n - 1) % n];
        let next = points[(i + 1) % n];
        let to_prev = prev - corner;
        let to_next = next - corner;
        let (len_prev, len_next) = (to_prev.length(), to_next.length());
        if len_prev < f64::EPSILON || len_next < f64::EPSILON {
            rounded.push(corner);
            continue;
        }

        let (u_prev, u_next) = (to_prev / len_prev, to_next / len_next);
        let angle = signed_angle(u_prev, u_next).abs();
        // Straight or reversed edges have no corner to round
        if angle < 1e-9 || (std::f64::consts::PI - angle) < 1e-9 {
            rounded.push(corner);
            continue;
        }

        let half = angle / 2.0;
        let tangent = (radius / half.tan()).min(len_prev.min(len_next) / 2.0);
        let r = tangent * half.tan();
        let start = corner + u_prev * tangent;
        let end = corner + u_next * tangent;
        let center = corner + (u_prev + u_next).normalize() * (r / half.sin());

        let from = start - center;
        let sweep = signed_angle(from, end - center);
        for k in 0..arc_points {
            let t = k as f64 / (arc_points - 1) as f64;
            rounded.push(center + DVec2::from_angle(sweep * t).rotate(from));
        }
    }
    rounded
}
