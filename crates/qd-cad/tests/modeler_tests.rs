//! Modeler behaviour across both backends

use approx::assert_relative_eq;
use qd_cad::backend::gds::GdsBackend;
use qd_cad::{HfssCommand, HfssDesign, Material, Modeler, ModelerError, UniteOptions};
use qd_core::{Dimension, Expr, ExprError, Layer, Variable};

fn gds_with_squares(names: &[&str]) -> Modeler {
    let mut modeler = Modeler::new("gds").unwrap();
    for (i, name) in names.iter().enumerate() {
        let x = format!("{}um", i * 200);
        modeler
            .rect(name, [x.as_str(), "0um"], ["100um", "100um"], Layer::default())
            .unwrap();
    }
    modeler
}

fn unite_count(design: &HfssDesign) -> usize {
    design
        .journal()
        .iter()
        .filter(|command| matches!(command, HfssCommand::Unite { .. }))
        .count()
}

#[test]
fn unknown_mode_is_configuration_error() {
    let err = Modeler::new("autocad").unwrap_err();
    assert!(matches!(err, ModelerError::Configuration(_)));
}

#[test]
fn attaching_to_hfss_clears_design_and_sets_units() {
    let design = HfssDesign::new("Q1");
    design.register_object("leftover");

    let modeler = Modeler::hfss(design.clone()).unwrap();
    assert!(design.objects().is_empty());
    assert!(modeler.entities().is_empty());
    assert_eq!(
        design.journal()[..2],
        [
            HfssCommand::SetUnits(qd_core::Unit::Millimeter),
            HfssCommand::Delete(vec!["leftover".to_string()]),
        ]
    );
}

#[test]
fn unite_requires_common_dimension() {
    let mut modeler = gds_with_squares(&["a"]);
    modeler
        .polyline("wire", [["0um", "0um"], ["50um", "0um"]], false, Layer::default())
        .unwrap();

    let err = modeler.unite(&["a", "wire"], UniteOptions::new()).unwrap_err();
    assert_eq!(
        err,
        ModelerError::TypeMismatch("all united elements must share the same dimension".into())
    );
    assert!(modeler.entity("a").is_some());
    assert!(modeler.entity("wire").is_some());
    assert_eq!(modeler.entities().len(), 2);
}

#[test]
fn single_entity_union_is_identity() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    let pad = modeler
        .rect("pad", ["0", "0"], ["1", "1"], Layer::default())
        .unwrap();

    let result = modeler.unite(&["pad", "pad"], UniteOptions::new()).unwrap();
    assert_eq!(result, pad);
    assert!(!result.is_boolean);
    assert_eq!(unite_count(&design), 0);
}

#[test]
fn destructive_union_consumes_inputs() {
    let mut modeler = gds_with_squares(&["a", "b", "c"]);
    let bodies_before = modeler.bodies().len();

    let result = modeler.unite(&["a", "b", "c"], UniteOptions::new()).unwrap();
    assert_eq!(result.name, "a");
    assert_eq!(result.dimension, Dimension::Surface);
    assert!(result.is_boolean);
    assert!(modeler.entity("b").is_none());
    assert!(modeler.entity("c").is_none());
    assert_eq!(modeler.entities().names(), vec!["a".to_string()]);
    assert_eq!(modeler.bodies().len(), bodies_before + 1);
    assert_eq!(modeler.bodies().last(), Some(&result.id));
}

#[test]
fn fillet_flag_propagates_through_union() {
    let mut modeler = gds_with_squares(&["a", "b"]);
    modeler.fillet("b", "10um").unwrap();
    assert!(modeler.entity("b").unwrap().is_fillet);
    assert!(!modeler.entity("a").unwrap().is_fillet);

    let result = modeler.unite(&["a", "b"], UniteOptions::new()).unwrap();
    assert!(result.is_fillet);
}

#[test]
fn keep_originals_builds_a_new_entity() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    for name in ["a", "b"] {
        modeler
            .rect(name, ["0", "0"], ["1", "1"], Layer::default())
            .unwrap();
    }

    let result = modeler
        .unite(
            &["a", "b"],
            UniteOptions::new().keep_originals(true).new_name("ab"),
        )
        .unwrap();

    assert_eq!(result.name, "ab");
    assert!(result.is_boolean);
    assert!(modeler.entity("a").is_some());
    assert!(modeler.entity("b").is_some());
    assert!(modeler.entity("a_1").is_none());
    assert!(!modeler.entity("a").unwrap().is_boolean);
    assert!(design.contains("ab"));
    assert!(design.journal().contains(&HfssCommand::Unite {
        names: vec!["a_1".into(), "b".into()],
        keep_originals: true,
    }));
}

#[test]
fn keep_originals_without_name_keeps_copy_name() {
    let mut modeler = gds_with_squares(&["a", "b"]);

    let result = modeler
        .unite(&["a", "b"], UniteOptions::new().keep_originals(true))
        .unwrap();
    assert_eq!(result.name, "a_1");
    assert!(result.is_boolean);
    assert_eq!(modeler.entities().len(), 3);
}

#[test]
fn main_entity_moves_to_front() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    for name in ["a", "b", "c"] {
        modeler
            .rect(name, ["0", "0"], ["1", "1"], Layer::default())
            .unwrap();
    }

    let result = modeler
        .unite(&["a", "b", "c"], UniteOptions::new().main("c"))
        .unwrap();
    assert_eq!(result.name, "c");
    assert_eq!(modeler.entities().names(), vec!["c".to_string()]);
    assert!(design.journal().contains(&HfssCommand::Unite {
        names: vec!["c".into(), "a".into(), "b".into()],
        keep_originals: false,
    }));
}

#[test]
fn missing_main_is_not_found() {
    let mut modeler = gds_with_squares(&["a", "b"]);
    let err = modeler
        .unite(&["a", "b"], UniteOptions::new().main("ghost"))
        .unwrap_err();
    assert!(matches!(err, ModelerError::NotFound(_)));
    assert_eq!(modeler.entities().len(), 2);
}

#[test]
fn main_outside_inputs_is_prepended() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    for name in ["a", "b", "c"] {
        modeler
            .rect(name, ["0", "0"], ["1", "1"], Layer::default())
            .unwrap();
    }

    let result = modeler
        .unite(&["a", "b"], UniteOptions::new().main("c"))
        .unwrap();
    assert_eq!(result.name, "c");
    assert_eq!(modeler.entities().names(), vec!["c".to_string()]);
    assert!(design.journal().contains(&HfssCommand::Unite {
        names: vec!["c".into(), "a".into(), "b".into()],
        keep_originals: false,
    }));
}

#[test]
fn keep_originals_name_clash_changes_nothing() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    for name in ["a", "b", "taken"] {
        modeler
            .rect(name, ["0", "0"], ["1", "1"], Layer::default())
            .unwrap();
    }
    let names_before = modeler.entities().names();
    let bodies_before = modeler.bodies().len();
    let journal_before = design.journal().len();

    for new_name in ["taken", "b"] {
        let err = modeler
            .unite(
                &["a", "b"],
                UniteOptions::new().keep_originals(true).new_name(new_name),
            )
            .unwrap_err();
        assert!(matches!(err, ModelerError::Validation(_)));
    }

    assert_eq!(modeler.entities().names(), names_before);
    assert_eq!(modeler.bodies().len(), bodies_before);
    assert_eq!(design.journal().len(), journal_before);
    assert!(!design.contains("a_1"));
}

#[test]
fn single_entity_name_clash_changes_nothing() {
    let mut modeler = gds_with_squares(&["a", "taken"]);

    let err = modeler
        .unite(
            &["a"],
            UniteOptions::new().keep_originals(true).new_name("taken"),
        )
        .unwrap_err();
    assert!(matches!(err, ModelerError::Validation(_)));
    assert_eq!(
        modeler.entities().names(),
        vec!["a".to_string(), "taken".to_string()]
    );
}

#[test]
fn keep_originals_propagates_fillet_flag() {
    let mut modeler = gds_with_squares(&["a", "b"]);
    modeler.fillet("b", "10um").unwrap();

    let result = modeler
        .unite(
            &["a", "b"],
            UniteOptions::new().keep_originals(true).new_name("ab"),
        )
        .unwrap();
    assert!(result.is_fillet);
    assert!(result.is_boolean);
    assert!(!modeler.entity("a").unwrap().is_fillet);
    assert!(modeler.entity("b").unwrap().is_fillet);
}

#[test]
fn single_entity_keep_originals_renames_input() {
    let mut modeler = gds_with_squares(&["a"]);
    let original = modeler.entity("a").unwrap().clone();

    let result = modeler
        .unite(
            &["a"],
            UniteOptions::new().keep_originals(true).new_name("pad"),
        )
        .unwrap();
    assert_eq!(result.name, "pad");
    assert_eq!(result.id, original.id);
    assert!(!result.is_boolean);
    assert!(modeler.entity("a").is_none());
    assert_eq!(modeler.entities().names(), vec!["pad".to_string()]);
}

#[test]
fn rotate_by_direction_vector() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    modeler
        .rect("a", ["0", "0"], ["1", "1"], Layer::default())
        .unwrap();

    modeler.rotate(&["a"], [0.0, 1.0]).unwrap();
    assert!(design.journal().contains(&HfssCommand::Rotate {
        names: vec!["a".into()],
        angle: "90deg".into(),
    }));

    let err = modeler.rotate(&["a"], vec![1.0, 0.0, 0.0]).unwrap_err();
    assert!(matches!(err, ModelerError::Validation(_)));
}

#[test]
fn gds_rotation_resolves_variables() {
    let mut modeler = Modeler::gds(GdsBackend::default());
    modeler
        .rect("a", ["1mm", "0mm"], ["1mm", "1mm"], Layer::default())
        .unwrap();
    let theta = modeler.set_variable("theta", "45deg").unwrap();
    modeler.set_variable("theta", "90deg").unwrap();

    modeler.rotate(&["a"], &theta).unwrap();
    let value = modeler.value_of(&theta).unwrap();
    assert_relative_eq!(value.magnitude, 90.0, epsilon = 1e-12);
}

#[test]
fn redefinition_returns_same_handle() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();

    let first = modeler.set_variable("gap", "20um").unwrap();
    let second = modeler.set_variable("gap", "30um").unwrap();
    assert!(Variable::ptr_eq(&first, &second));
    assert_eq!(first.value(), Expr::parse("30um").unwrap());
    assert_eq!(design.variable("gap").as_deref(), Some("30um"));
}

#[test]
fn gds_does_not_mirror_variables() {
    let mut modeler = Modeler::new("gds").unwrap();
    modeler.set_variable("xx", "100um").unwrap();
    let value = modeler.value_of("xx / 2").unwrap();
    assert_relative_eq!(value.magnitude, 0.05, epsilon = 1e-12);
}

#[test]
fn update_variable_is_strict() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    let journal_len = design.journal().len();

    let err = modeler.update_variable("missing", "1mm").unwrap_err();
    assert!(matches!(err, ModelerError::NotFound(_)));
    assert_eq!(design.journal().len(), journal_len);

    modeler.set_variable("w", "1mm").unwrap();
    let w = modeler.update_variable("w", "2mm").unwrap();
    assert_eq!(w.value(), Expr::parse("2mm").unwrap());
}

#[test]
fn invalid_variable_definitions_are_rejected() {
    let mut modeler = Modeler::new("gds").unwrap();
    assert!(matches!(
        modeler.set_variable("2x", "1mm"),
        Err(ModelerError::Validation(_))
    ));
    assert!(matches!(
        modeler.set_variable("w", "h * 2"),
        Err(ModelerError::NotFound(_))
    ));
    modeler.set_variable("w", "1mm").unwrap();
    assert!(matches!(
        modeler.set_variable("w", "w + 1mm"),
        Err(ModelerError::Expr(_))
    ));
}

#[test]
fn redefinition_cannot_change_dependent_units() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    modeler.set_variable("a", "1mm").unwrap();
    modeler.set_variable("b", "a * 2").unwrap();
    let journal_before = design.journal().len();

    let err = modeler.set_variable("a", "90deg").unwrap_err();
    assert!(matches!(
        err,
        ModelerError::Expr(ExprError::KindChanged { ref name, .. }) if name == "b"
    ));
    let err = modeler.update_variable("a", "90deg").unwrap_err();
    assert!(matches!(err, ModelerError::Expr(ExprError::KindChanged { .. })));

    assert_eq!(design.journal().len(), journal_before);
    assert_eq!(design.variable("a").as_deref(), Some("1mm"));
    assert_relative_eq!(modeler.value_of("b").unwrap().magnitude, 2.0, epsilon = 1e-12);
}

#[test]
fn gds_lacks_optional_capabilities() {
    let mut modeler = gds_with_squares(&["a", "b"]);

    let err = modeler.intersect(&["a", "b"], false).unwrap_err();
    assert!(matches!(err, ModelerError::Unsupported(_)));
    let err = modeler
        .make_material(&Material::dielectric("silicon", 11.9))
        .unwrap_err();
    assert!(matches!(err, ModelerError::Unsupported(_)));
    let err = modeler
        .draw_box("slab", ["0", "0", "0"], ["1", "1", "1"])
        .unwrap_err();
    assert!(matches!(err, ModelerError::Unsupported(_)));
    assert!(modeler.entity("slab").is_none());
}

#[test]
fn hfss_cannot_write_gds() {
    let mut modeler = Modeler::new("hfss").unwrap();
    let err = modeler.generate_gds("out", "chip.gds").unwrap_err();
    assert!(matches!(err, ModelerError::Unsupported(_)));
}

#[test]
fn hfss_supports_intersect_and_materials() {
    let design = HfssDesign::new("Q1");
    let mut modeler = Modeler::hfss(design.clone()).unwrap();
    modeler
        .draw_box("sub", ["0", "0", "0"], ["1", "1", "-0.5"])
        .unwrap();
    modeler
        .draw_box("cut", ["0.5", "0", "0"], ["1", "1", "-0.5"])
        .unwrap();

    let result = modeler.intersect(&["sub", "cut"], false).unwrap();
    assert_eq!(result.name, "sub");
    assert_eq!(result.dimension, Dimension::Solid);
    assert!(modeler.entity("cut").is_none());

    modeler
        .make_material(&Material::dielectric("silicon", 11.9).with_loss_tangent(1e-6))
        .unwrap();
    assert_eq!(design.materials().len(), 1);
}

#[test]
fn copy_rename_delete_lifecycle() {
    let mut modeler = gds_with_squares(&["a"]);

    let copy = modeler.copy("a").unwrap();
    assert_eq!(copy.name, "a_1");
    modeler.rename("a_1", "b").unwrap();
    assert!(modeler.entity("b").is_some());

    let err = modeler.rename("a", "b").unwrap_err();
    assert!(matches!(err, ModelerError::Validation(_)));

    modeler.delete_entities(&["a", "b"]).unwrap();
    assert!(modeler.entities().is_empty());
    let err = modeler.delete_entities(&["a"]).unwrap_err();
    assert!(matches!(err, ModelerError::NotFound(_)));
}

#[test]
fn generate_gds_writes_stream() {
    let dir = tempfile::tempdir().unwrap();
    let mut modeler = gds_with_squares(&["a", "b"]);
    modeler.unite(&["a", "b"], UniteOptions::new()).unwrap();
    modeler.translate(&["a"], ["0.5mm", "0.5mm"]).unwrap();

    let path = modeler.generate_gds(dir.path().join("masks"), "chip.gds").unwrap();
    let bytes = std::fs::read(&path).unwrap();
    assert_eq!(&bytes[..6], &[0x00, 0x06, 0x00, 0x02, 0x02, 0x58]);
    assert_eq!(&bytes[bytes.len() - 4..], &[0x00, 0x04, 0x04, 0x00]);
    // Two boundaries, one per united square
    let boundaries = bytes
        .windows(4)
        .filter(|w| *w == [0x00, 0x04, 0x08, 0x00])
        .count();
    assert_eq!(boundaries, 2);
}
