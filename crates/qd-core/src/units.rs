//! Physical units
//!
//! Every quantity is stored internally in a canonical unit per kind:
//! lengths in millimetres, angles in degrees, inductances in henries and
//! capacitances in farads.

use serde::{Deserialize, Serialize};

/// Physical kind of a quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnitKind {
    /// Dimensionless number
    Scalar,
    /// Length (canonical: mm)
    Length,
    /// Angle (canonical: degrees)
    Angle,
    /// Inductance (canonical: H)
    Inductance,
    /// Capacitance (canonical: F)
    Capacitance,
    /// Product or ratio of kinds that has no dedicated variant
    Compound,
}

impl UnitKind {
    /// Display name
    pub fn name(&self) -> &'static str {
        match self {
            UnitKind::Scalar => "scalar",
            UnitKind::Length => "length",
            UnitKind::Angle => "angle",
            UnitKind::Inductance => "inductance",
            UnitKind::Capacitance => "capacitance",
            UnitKind::Compound => "compound",
        }
    }
}

/// A unit suffix accepted in expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Unit {
    /// No unit (bare number)
    #[default]
    None,
    Meter,
    Millimeter,
    Micrometer,
    Nanometer,
    Degree,
    Radian,
    Henry,
    Nanohenry,
    Picohenry,
    Farad,
    Picofarad,
    Femtofarad,
}

impl Unit {
    /// Parse a unit suffix such as `"um"` or `"nH"`
    pub fn parse(symbol: &str) -> Option<Self> {
        let unit = match symbol {
            "" => Unit::None,
            "m" => Unit::Meter,
            "mm" => Unit::Millimeter,
            "um" | "µm" => Unit::Micrometer,
            "nm" => Unit::Nanometer,
            "deg" => Unit::Degree,
            "rad" => Unit::Radian,
            "H" => Unit::Henry,
            "nH" => Unit::Nanohenry,
            "pH" => Unit::Picohenry,
            "F" => Unit::Farad,
            "pF" => Unit::Picofarad,
            "fF" => Unit::Femtofarad,
            _ => return None,
        };
        Some(unit)
    }

    /// Symbol used when rendering expressions
    pub fn symbol(&self) -> &'static str {
        match self {
            Unit::None => "",
            Unit::Meter => "m",
            Unit::Millimeter => "mm",
            Unit::Micrometer => "um",
            Unit::Nanometer => "nm",
            Unit::Degree => "deg",
            Unit::Radian => "rad",
            Unit::Henry => "H",
            Unit::Nanohenry => "nH",
            Unit::Picohenry => "pH",
            Unit::Farad => "F",
            Unit::Picofarad => "pF",
            Unit::Femtofarad => "fF",
        }
    }

    /// Physical kind of this unit
    pub fn kind(&self) -> UnitKind {
        match self {
            Unit::None => UnitKind::Scalar,
            Unit::Meter | Unit::Millimeter | Unit::Micrometer | Unit::Nanometer => {
                UnitKind::Length
            }
            Unit::Degree | Unit::Radian => UnitKind::Angle,
            Unit::Henry | Unit::Nanohenry | Unit::Picohenry => UnitKind::Inductance,
            Unit::Farad | Unit::Picofarad | Unit::Femtofarad => UnitKind::Capacitance,
        }
    }

    /// Factor converting a value in this unit to the canonical unit of its kind
    pub fn to_base_factor(&self) -> f64 {
        match self {
            Unit::None => 1.0,
            Unit::Meter => 1000.0,
            Unit::Millimeter => 1.0,
            Unit::Micrometer => 1e-3,
            Unit::Nanometer => 1e-6,
            Unit::Degree => 1.0,
            Unit::Radian => 180.0 / std::f64::consts::PI,
            Unit::Henry => 1.0,
            Unit::Nanohenry => 1e-9,
            Unit::Picohenry => 1e-12,
            Unit::Farad => 1.0,
            Unit::Picofarad => 1e-12,
            Unit::Femtofarad => 1e-15,
        }
    }

    /// Canonical unit for a kind, if the kind has one
    pub fn base_of(kind: UnitKind) -> Unit {
        match kind {
            UnitKind::Length => Unit::Millimeter,
            UnitKind::Angle => Unit::Degree,
            UnitKind::Inductance => Unit::Henry,
            UnitKind::Capacitance => Unit::Farad,
            UnitKind::Scalar | UnitKind::Compound => Unit::None,
        }
    }
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}
