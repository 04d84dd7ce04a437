//! Demo chip: a two-pad transmon in a ground-plane cutout

use qd_cad::{Modeler, ModelerResult, UniteOptions};
use qd_core::{Entity, Layer};

const METAL: Layer = Layer {
    layer: 1,
    datatype: 0,
};
const CUTOUT: Layer = Layer {
    layer: 2,
    datatype: 0,
};

/// Draw the transmon and place it in the first grid cell
pub fn draw_transmon(modeler: &mut Modeler) -> ModelerResult<Entity> {
    // Grid pitch
    modeler.set_variable("xx", "100um")?;
    modeler.set_variable("yy", "50um")?;

    modeler.set_variable("cutout_w", "200um")?;
    modeler.set_variable("cutout_h", "100um")?;
    modeler.set_variable("pad_spacing", "20um")?;
    modeler.set_variable("pad_w", "50um")?;
    modeler.set_variable("pad_h", "50um")?;
    modeler.set_variable("jwidth", "1um")?;
    modeler.set_variable("jinduc", "1nH")?;

    let cutout = modeler.rect(
        "cutout",
        ["-cutout_w / 2", "-cutout_h / 2"],
        ["cutout_w", "cutout_h"],
        CUTOUT,
    )?;
    modeler.rect(
        "pad_left",
        ["-pad_spacing / 2 - pad_w", "-pad_h / 2"],
        ["pad_w", "pad_h"],
        METAL,
    )?;
    modeler.rect(
        "pad_right",
        ["pad_spacing / 2", "-pad_h / 2"],
        ["pad_w", "pad_h"],
        METAL,
    )?;
    modeler.rect(
        "junction",
        ["-pad_spacing / 2", "-jwidth / 2"],
        ["pad_spacing", "jwidth"],
        METAL,
    )?;

    modeler.fillet("pad_left", "2um")?;
    modeler.fillet("pad_right", "2um")?;

    let transmon = modeler.unite(
        &["junction", "pad_right", "pad_left"],
        UniteOptions::new().main("pad_left"),
    )?;
    modeler.rename(&transmon.name, "transmon")?;

    let placed = ["transmon", cutout.name.as_str()];
    modeler.rotate(&placed, [0.0, 1.0])?;
    modeler.translate(&placed, ["0.5 * xx", "0.5 * yy"])?;

    tracing::info!("Transmon drawn with {} backend", modeler.mode());
    modeler
        .entity("transmon")
        .cloned()
        .ok_or_else(|| qd_cad::ModelerError::NotFound("entity transmon".into()))
}
