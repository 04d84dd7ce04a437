//! HFSS Backend
//!
//! Drives an HFSS design through its scripting API. Every operation is
//! recorded in the design journal; the journal renders to an IronPython
//! script that replays the drawing inside the desktop application.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;
use std::rc::Rc;

use qd_core::{Expr, Layer, Unit};

use super::{Backend, BackendError, BackendResult, Material};

/// Kind of object in the design tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Rectangle,
    Polyline,
    Box,
    /// Object that existed before the modeler attached
    Existing,
}

/// One scripting call recorded in the journal
#[derive(Debug, Clone, PartialEq)]
pub enum HfssCommand {
    SetUnits(Unit),
    SetVariable {
        name: String,
        value: String,
        new: bool,
    },
    CreateRectangle {
        name: String,
        origin: [String; 3],
        size: [String; 2],
    },
    CreatePolyline {
        name: String,
        points: Vec<[String; 2]>,
        closed: bool,
    },
    CreateBox {
        name: String,
        origin: [String; 3],
        size: [String; 3],
    },
    Fillet {
        name: String,
        radius: String,
    },
    Copy {
        name: String,
        new_name: String,
    },
    Rename {
        name: String,
        new_name: String,
    },
    Delete(Vec<String>),
    Unite {
        names: Vec<String>,
        keep_originals: bool,
    },
    Intersect {
        names: Vec<String>,
        keep_originals: bool,
    },
    Rotate {
        names: Vec<String>,
        angle: String,
    },
    Move {
        names: Vec<String>,
        vector: [String; 3],
    },
    AddMaterial(Material),
}

#[derive(Debug)]
struct DesignState {
    name: String,
    units: Unit,
    /// Design variables in definition order
    variables: Vec<(String, String)>,
    objects: BTreeMap<String, ObjectKind>,
    materials: Vec<Material>,
    journal: Vec<HfssCommand>,
}

/// Shared handle on an HFSS design
///
/// The design outlives any modeler attached to it; clones observe the same
/// state.
#[derive(Debug, Clone)]
pub struct HfssDesign(Rc<RefCell<DesignState>>);

impl Default for HfssDesign {
    fn default() -> Self {
        Self::new("HFSSDesign1")
    }
}

impl HfssDesign {
    /// Create an empty design
    pub fn new(name: impl Into<String>) -> Self {
        Self(Rc::new(RefCell::new(DesignState {
            name: name.into(),
            units: Unit::Millimeter,
            variables: Vec::new(),
            objects: BTreeMap::new(),
            materials: Vec::new(),
            journal: Vec::new(),
        })))
    }

    /// Design name
    pub fn name(&self) -> String {
        self.0.borrow().name.clone()
    }

    /// Current model units
    pub fn units(&self) -> Unit {
        self.0.borrow().units
    }

    /// Add an object that was drawn outside of the modeler
    pub fn register_object(&self, name: impl Into<String>) {
        self.0
            .borrow_mut()
            .objects
            .insert(name.into(), ObjectKind::Existing);
    }

    /// Check if an object exists
    pub fn contains(&self, name: &str) -> bool {
        self.0.borrow().objects.contains_key(name)
    }

    /// Kind of an object
    pub fn object_kind(&self, name: &str) -> Option<ObjectKind> {
        self.0.borrow().objects.get(name).copied()
    }

    /// Object names, sorted
    pub fn objects(&self) -> Vec<String> {
        self.0.borrow().objects.keys().cloned().collect()
    }

    /// Value text of a design variable
    pub fn variable(&self, name: &str) -> Option<String> {
        self.0
            .borrow()
            .variables
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, value)| value.clone())
    }

    /// Design variables in definition order
    pub fn variables(&self) -> Vec<(String, String)> {
        self.0.borrow().variables.clone()
    }

    /// Defined materials
    pub fn materials(&self) -> Vec<Material> {
        self.0.borrow().materials.clone()
    }

    /// Recorded commands
    pub fn journal(&self) -> Vec<HfssCommand> {
        self.0.borrow().journal.clone()
    }

    /// Render the journal as an IronPython script
    pub fn to_script(&self) -> String {
        let state = self.0.borrow();
        let mut script = String::new();
        script.push_str("# Generated by qd-draw\n");
        script.push_str("import ScriptEnv\n");
        script.push_str("ScriptEnv.Initialize(\"Ansoft.ElectronicsDesktop\")\n");
        script.push_str("oDesktop.RestoreWindow()\n");
        script.push_str("oProject = oDesktop.GetActiveProject()\n");
        let _ = writeln!(
            script,
            "oDesign = oProject.SetActiveDesign({})",
            quote(&state.name)
        );
        script.push_str("oEditor = oDesign.SetActiveEditor(\"3D Modeler\")\n");
        script.push_str("oDefinitionManager = oProject.GetDefinitionManager()\n\n");

        for command in &state.journal {
            render_command(&mut script, command);
        }
        script
    }

    /// Write the script to `path`
    pub fn save_script(&self, path: impl AsRef<Path>) -> BackendResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| BackendError::FileIo(e.to_string()))?;
        }
        std::fs::write(path, self.to_script()).map_err(|e| BackendError::FileIo(e.to_string()))?;
        tracing::info!("HFSS script written to {}", path.display());
        Ok(())
    }

    fn record(&self, command: HfssCommand) {
        self.0.borrow_mut().journal.push(command);
    }

    fn require(&self, names: &[&str]) -> BackendResult<()> {
        let state = self.0.borrow();
        match names.iter().find(|name| !state.objects.contains_key(**name)) {
            Some(missing) => Err(BackendError::ObjectNotFound(missing.to_string())),
            None => Ok(()),
        }
    }

    fn create(&self, name: &str, kind: ObjectKind, command: HfssCommand) -> BackendResult<()> {
        let mut state = self.0.borrow_mut();
        if state.objects.contains_key(name) {
            return Err(BackendError::ObjectExists(name.to_string()));
        }
        state.objects.insert(name.to_string(), kind);
        state.journal.push(command);
        Ok(())
    }
}

/// Backend driving an [`HfssDesign`]
#[derive(Debug, Clone)]
pub struct HfssBackend {
    design: HfssDesign,
}

impl HfssBackend {
    /// Attach to a design
    pub fn attach(design: HfssDesign) -> Self {
        Self { design }
    }

    /// The attached design
    pub fn design(&self) -> &HfssDesign {
        &self.design
    }
}

impl Backend for HfssBackend {
    fn name(&self) -> &str {
        "hfss"
    }

    fn supports_variables(&self) -> bool {
        true
    }

    fn set_units(&mut self, unit: Unit) -> BackendResult<()> {
        if unit.kind() != qd_core::UnitKind::Length {
            return Err(BackendError::OperationFailed(format!(
                "{} is not a length unit",
                unit
            )));
        }
        self.design.0.borrow_mut().units = unit;
        self.design.record(HfssCommand::SetUnits(unit));
        Ok(())
    }

    fn delete_all_objects(&mut self) -> BackendResult<()> {
        let names = self.design.objects();
        if names.is_empty() {
            return Ok(());
        }
        tracing::debug!("Deleting {} existing objects", names.len());
        self.design.0.borrow_mut().objects.clear();
        self.design.record(HfssCommand::Delete(names));
        Ok(())
    }

    fn set_variable(&mut self, name: &str, value: &Expr) -> BackendResult<()> {
        let value = value.to_string();
        let new = {
            let mut state = self.design.0.borrow_mut();
            match state.variables.iter_mut().find(|(n, _)| n == name) {
                Some((_, existing)) => {
                    *existing = value.clone();
                    false
                }
                None => {
                    state.variables.push((name.to_string(), value.clone()));
                    true
                }
            }
        };
        self.design.record(HfssCommand::SetVariable {
            name: name.to_string(),
            value,
            new,
        });
        Ok(())
    }

    fn draw_rect(
        &mut self,
        name: &str,
        origin: &[Expr; 3],
        size: &[Expr; 2],
        _layer: Layer,
    ) -> BackendResult<()> {
        tracing::debug!("CreateRectangle {}", name);
        self.design.create(
            name,
            ObjectKind::Rectangle,
            HfssCommand::CreateRectangle {
                name: name.to_string(),
                origin: origin.each_ref().map(Expr::to_string),
                size: size.each_ref().map(Expr::to_string),
            },
        )
    }

    fn draw_polyline(
        &mut self,
        name: &str,
        points: &[[Expr; 2]],
        closed: bool,
        _layer: Layer,
    ) -> BackendResult<()> {
        if points.len() < 2 {
            return Err(BackendError::InvalidGeometry(format!(
                "polyline {} needs at least two points",
                name
            )));
        }
        tracing::debug!("CreatePolyline {} ({} points)", name, points.len());
        self.design.create(
            name,
            ObjectKind::Polyline,
            HfssCommand::CreatePolyline {
                name: name.to_string(),
                points: points
                    .iter()
                    .map(|point| point.each_ref().map(Expr::to_string))
                    .collect(),
                closed,
            },
        )
    }

    fn draw_box(&mut self, name: &str, origin: &[Expr; 3], size: &[Expr; 3]) -> BackendResult<()> {
        tracing::debug!("CreateBox {}", name);
        self.design.create(
            name,
            ObjectKind::Box,
            HfssCommand::CreateBox {
                name: name.to_string(),
                origin: origin.each_ref().map(Expr::to_string),
                size: size.each_ref().map(Expr::to_string),
            },
        )
    }

    fn fillet(&mut self, name: &str, radius: &Expr) -> BackendResult<()> {
        self.design.require(&[name])?;
        self.design.record(HfssCommand::Fillet {
            name: name.to_string(),
            radius: radius.to_string(),
        });
        Ok(())
    }

    fn copy(&mut self, name: &str, new_name: &str) -> BackendResult<()> {
        self.design.require(&[name])?;
        let kind = self.design.object_kind(name).unwrap_or(ObjectKind::Existing);
        self.design.create(
            new_name,
            kind,
            HfssCommand::Copy {
                name: name.to_string(),
                new_name: new_name.to_string(),
            },
        )
    }

    fn rename(&mut self, name: &str, new_name: &str) -> BackendResult<()> {
        self.design.require(&[name])?;
        let mut state = self.design.0.borrow_mut();
        if state.objects.contains_key(new_name) {
            return Err(BackendError::ObjectExists(new_name.to_string()));
        }
        if let Some(kind) = state.objects.remove(name) {
            state.objects.insert(new_name.to_string(), kind);
        }
        state.journal.push(HfssCommand::Rename {
            name: name.to_string(),
            new_name: new_name.to_string(),
        });
        Ok(())
    }

    fn delete(&mut self, names: &[&str]) -> BackendResult<()> {
        self.design.require(names)?;
        let mut state = self.design.0.borrow_mut();
        for name in names {
            state.objects.remove(*name);
        }
        state
            .journal
            .push(HfssCommand::Delete(names.iter().map(|n| n.to_string()).collect()));
        Ok(())
    }

    fn unite(&mut self, names: &[&str], keep_originals: bool) -> BackendResult<String> {
        combine(&self.design, names, keep_originals, |names| {
            HfssCommand::Unite {
                names,
                keep_originals,
            }
        })
    }

    fn rotate(&mut self, names: &[&str], angle: &Expr) -> BackendResult<()> {
        self.design.require(names)?;
        self.design.record(HfssCommand::Rotate {
            names: names.iter().map(|n| n.to_string()).collect(),
            angle: angle_text(angle),
        });
        Ok(())
    }

    fn translate(&mut self, names: &[&str], vector: &[Expr; 3]) -> BackendResult<()> {
        self.design.require(names)?;
        self.design.record(HfssCommand::Move {
            names: names.iter().map(|n| n.to_string()).collect(),
            vector: vector.each_ref().map(Expr::to_string),
        });
        Ok(())
    }

    fn intersect(&mut self, names: &[&str], keep_originals: bool) -> BackendResult<String> {
        combine(&self.design, names, keep_originals, |names| {
            HfssCommand::Intersect {
                names,
                keep_originals,
            }
        })
    }

    fn make_material(&mut self, material: &Material) -> BackendResult<()> {
        let mut state = self.design.0.borrow_mut();
        if state.materials.iter().any(|m| m.name == material.name) {
            return Err(BackendError::ObjectExists(material.name.clone()));
        }
        state.materials.push(material.clone());
        state.journal.push(HfssCommand::AddMaterial(material.clone()));
        Ok(())
    }
}

/// Boolean combination: the result takes the first name, the others go away
/// unless kept.
fn combine(
    design: &HfssDesign,
    names: &[&str],
    keep_originals: bool,
    command: impl FnOnce(Vec<String>) -> HfssCommand,
) -> BackendResult<String> {
    let first = names
        .first()
        .ok_or_else(|| BackendError::InvalidGeometry("no objects to combine".into()))?;
    design.require(names)?;

    let mut state = design.0.borrow_mut();
    if !keep_originals {
        for name in &names[1..] {
            state.objects.remove(*name);
        }
    }
    state
        .journal
        .push(command(names.iter().map(|n| n.to_string()).collect()));
    Ok(first.to_string())
}

/// Bare numbers in an angle slot are degrees
fn angle_text(angle: &Expr) -> String {
    match angle {
        Expr::Quantity(q) if q.unit == Unit::None => format!("{}deg", q.value),
        other => other.to_string(),
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

fn selections(names: &[String]) -> String {
    format!(
        "[\"NAME:Selections\", \"Selections:=\", {}]",
        quote(&names.join(","))
    )
}

fn render_command(script: &mut String, command: &HfssCommand) {
    // Writing into a String cannot fail
    let _ = match command {
        HfssCommand::SetUnits(unit) => writeln!(
            script,
            "oEditor.SetModelUnits([\"NAME:Units Parameter\", \"Units:=\", {}, \"Rescale:=\", False])",
            quote(unit.symbol())
        ),
        HfssCommand::SetVariable { name, value, new } => {
            let props = if *new {
                format!(
                    "[\"NAME:NewProps\", [\"NAME:{}\", \"PropType:=\", \"VariableProp\", \"UserDef:=\", True, \"Value:=\", {}]]",
                    name,
                    quote(value)
                )
            } else {
                format!(
                    "[\"NAME:ChangedProps\", [\"NAME:{}\", \"Value:=\", {}]]",
                    name,
                    quote(value)
                )
            };
            writeln!(
                script,
                "oDesign.ChangeProperty([\"NAME:AllTabs\", [\"NAME:LocalVariableTab\", [\"NAME:PropServers\", \"LocalVariables\"], {}]])",
                props
            )
        }
        HfssCommand::CreateRectangle { name, origin, size } => writeln!(
            script,
            "oEditor.CreateRectangle([\"NAME:RectangleParameters\", \"IsCovered:=\", True, \"XStart:=\", {}, \"YStart:=\", {}, \"ZStart:=\", {}, \"Width:=\", {}, \"Height:=\", {}, \"WhichAxis:=\", \"Z\"], [\"NAME:Attributes\", \"Name:=\", {}, \"SolveInside:=\", True])",
            quote(&origin[0]),
            quote(&origin[1]),
            quote(&origin[2]),
            quote(&size[0]),
            quote(&size[1]),
            quote(name)
        ),
        HfssCommand::CreatePolyline {
            name,
            points,
            closed,
        } => {
            let plpoints: Vec<String> = points
                .iter()
                .map(|[x, y]| {
                    format!(
                        "[\"NAME:PLPoint\", \"X:=\", {}, \"Y:=\", {}, \"Z:=\", \"0mm\"]",
                        quote(x),
                        quote(y)
                    )
                })
                .collect();
            let segment_count = if *closed {
                points.len()
            } else {
                points.len() - 1
            };
            let segments: Vec<String> = (0..segment_count)
                .map(|i| {
                    format!(
                        "[\"NAME:PLSegment\", \"SegmentType:=\", \"Line\", \"StartIndex:=\", {}, \"NoOfPoints:=\", 2]",
                        i
                    )
                })
                .collect();
            let py_bool = if *closed { "True" } else { "False" };
            writeln!(
                script,
                "oEditor.CreatePolyline([\"NAME:PolylineParameters\", \"IsPolylineCovered:=\", True, \"IsPolylineClosed:=\", {}, [\"NAME:PolylinePoints\", {}], [\"NAME:PolylineSegments\", {}]], [\"NAME:Attributes\", \"Name:=\", {}, \"SolveInside:=\", True])",
                py_bool,
                plpoints.join(", "),
                segments.join(", "),
                quote(name)
            )
        }
        HfssCommand::CreateBox { name, origin, size } => writeln!(
            script,
            "oEditor.CreateBox([\"NAME:BoxParameters\", \"XPosition:=\", {}, \"YPosition:=\", {}, \"ZPosition:=\", {}, \"XSize:=\", {}, \"YSize:=\", {}, \"ZSize:=\", {}], [\"NAME:Attributes\", \"Name:=\", {}, \"SolveInside:=\", True])",
            quote(&origin[0]),
            quote(&origin[1]),
            quote(&origin[2]),
            quote(&size[0]),
            quote(&size[1]),
            quote(&size[2]),
            quote(name)
        ),
        HfssCommand::Fillet { name, radius } => writeln!(
            script,
            "oEditor.Fillet({}, [\"NAME:Parameters\", [\"NAME:FilletParameters\", \"Edges:=\", [], \"Vertices:=\", [int(v) for v in oEditor.GetVertexIDsFromObject({})], \"Radius:=\", {}, \"Setback:=\", \"0mm\"]])",
            selections(std::slice::from_ref(name)),
            quote(name),
            quote(radius)
        ),
        HfssCommand::Copy { name, new_name } => {
            let _ = writeln!(
                script,
                "oEditor.Copy({})",
                selections(std::slice::from_ref(name))
            );
            let _ = writeln!(script, "pasted = oEditor.Paste()");
            writeln!(
                script,
                "oEditor.ChangeProperty([\"NAME:AllTabs\", [\"NAME:Geometry3DAttributeTab\", [\"NAME:PropServers\", pasted[0]], [\"NAME:ChangedProps\", [\"NAME:Name\", \"Value:=\", {}]]]])",
                quote(new_name)
            )
        }
        HfssCommand::Rename { name, new_name } => writeln!(
            script,
            "oEditor.ChangeProperty([\"NAME:AllTabs\", [\"NAME:Geometry3DAttributeTab\", [\"NAME:PropServers\", {}], [\"NAME:ChangedProps\", [\"NAME:Name\", \"Value:=\", {}]]]])",
            quote(name),
            quote(new_name)
        ),
        HfssCommand::Delete(names) => writeln!(script, "oEditor.Delete({})", selections(names)),
        HfssCommand::Unite {
            names,
            keep_originals,
        } => writeln!(
            script,
            "oEditor.Unite({}, [\"NAME:UniteParameters\", \"KeepOriginals:=\", {}])",
            selections(names),
            if *keep_originals { "True" } else { "False" }
        ),
        HfssCommand::Intersect {
            names,
            keep_originals,
        } => writeln!(
            script,
            "oEditor.Intersect({}, [\"NAME:IntersectParameters\", \"KeepOriginals:=\", {}])",
            selections(names),
            if *keep_originals { "True" } else { "False" }
        ),
        HfssCommand::Rotate { names, angle } => writeln!(
            script,
            "oEditor.Rotate({}, [\"NAME:RotateParameters\", \"RotateAxis:=\", \"Z\", \"RotateAngle:=\", {}])",
            selections(names),
            quote(angle)
        ),
        HfssCommand::Move { names, vector } => writeln!(
            script,
            "oEditor.Move({}, [\"NAME:TranslateParameters\", \"TranslateVectorX:=\", {}, \"TranslateVectorY:=\", {}, \"TranslateVectorZ:=\", {}])",
            selections(names),
            quote(&vector[0]),
            quote(&vector[1]),
            quote(&vector[2])
        ),
        HfssCommand::AddMaterial(material) => writeln!(
            script,
            "oDefinitionManager.AddMaterial([\"NAME:{}\", \"permittivity:=\", \"{}\", \"dielectric_loss_tangent:=\", \"{}\", \"conductivity:=\", \"{}\"])",
            material.name,
            material.permittivity,
            material.loss_tangent,
            material.conductivity
        ),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exprs<const N: usize>(items: [&str; N]) -> [Expr; N] {
        items.map(|item| Expr::parse(item).unwrap())
    }

    #[test]
    fn test_clones_share_state() {
        let design = HfssDesign::new("Q1");
        let mut backend = HfssBackend::attach(design.clone());

        backend
            .draw_rect("pad", &exprs(["0", "0", "0"]), &exprs(["xx", "50um"]), Layer::default())
            .unwrap();

        assert!(design.contains("pad"));
        assert_eq!(design.object_kind("pad"), Some(ObjectKind::Rectangle));
        assert_eq!(
            design.journal()[0],
            HfssCommand::CreateRectangle {
                name: "pad".into(),
                origin: ["0".into(), "0".into(), "0".into()],
                size: ["xx".into(), "50um".into()],
            }
        );
    }

    #[test]
    fn test_create_rejects_existing_name() {
        let design = HfssDesign::new("Q1");
        design.register_object("pad");
        let mut backend = HfssBackend::attach(design);

        let err = backend
            .draw_rect("pad", &exprs(["0", "0", "0"]), &exprs(["1", "1"]), Layer::default())
            .unwrap_err();
        assert_eq!(err, BackendError::ObjectExists("pad".into()));
    }

    #[test]
    fn test_variable_redefinition_changes_props() {
        let design = HfssDesign::new("Q1");
        let mut backend = HfssBackend::attach(design.clone());

        backend.set_variable("xx", &Expr::parse("100um").unwrap()).unwrap();
        backend.set_variable("xx", &Expr::parse("200um").unwrap()).unwrap();

        assert_eq!(design.variables(), vec![("xx".to_string(), "200um".to_string())]);
        let script = design.to_script();
        assert!(script.contains("\"NAME:NewProps\", [\"NAME:xx\""));
        assert!(script.contains("\"NAME:ChangedProps\", [\"NAME:xx\", \"Value:=\", \"200um\"]"));
    }

    #[test]
    fn test_unite_keeps_first_name() {
        let design = HfssDesign::new("Q1");
        design.register_object("a");
        design.register_object("b");
        let mut backend = HfssBackend::attach(design.clone());

        let result = backend.unite(&["a", "b"], false).unwrap();
        assert_eq!(result, "a");
        assert_eq!(design.objects(), vec!["a".to_string()]);
        assert!(
            design
                .to_script()
                .contains("oEditor.Unite([\"NAME:Selections\", \"Selections:=\", \"a,b\"]")
        );
    }

    #[test]
    fn test_bare_angle_is_degrees() {
        let design = HfssDesign::new("Q1");
        design.register_object("a");
        let mut backend = HfssBackend::attach(design.clone());

        backend.rotate(&["a"], &Expr::number(90.0)).unwrap();
        backend.rotate(&["a"], &Expr::parse("theta").unwrap()).unwrap();

        let journal = design.journal();
        assert!(matches!(&journal[0], HfssCommand::Rotate { angle, .. } if angle == "90deg"));
        assert!(matches!(&journal[1], HfssCommand::Rotate { angle, .. } if angle == "theta"));
    }

    #[test]
    fn test_missing_object() {
        let mut backend = HfssBackend::attach(HfssDesign::new("Q1"));
        let err = backend.fillet("ghost", &Expr::number(0.01)).unwrap_err();
        assert_eq!(err, BackendError::ObjectNotFound("ghost".into()));
    }

    #[test]
    fn test_script_header_selects_design() {
        let design = HfssDesign::new("Transmon");
        let script = design.to_script();
        assert!(script.contains("oDesign = oProject.SetActiveDesign(\"Transmon\")"));
        assert!(script.contains("oEditor = oDesign.SetActiveEditor(\"3D Modeler\")"));
    }
}
