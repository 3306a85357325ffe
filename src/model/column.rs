use serde::Serialize;
use std::fmt;

/// Cross-section classification of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Shape {
    Rectangular,
    Circular,
    Other,
}

impl Shape {
    pub const ALL: [Shape; 3] = [Shape::Rectangular, Shape::Circular, Shape::Other];

    /// Label in the source vocabulary, also used for display and search.
    #[must_use]
    pub fn source_label(self) -> &'static str {
        match self {
            Shape::Rectangular => "Прямоугольная",
            Shape::Circular => "Круглая",
            Shape::Other => "Другая",
        }
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.source_label())
    }
}

/// Length units a source may declare for heights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LengthUnit {
    #[default]
    Millimetre,
    Centimetre,
    Decimetre,
    Metre,
}

impl LengthUnit {
    /// Multiplier converting a value in this unit to millimetres.
    #[must_use]
    pub fn millimetres(self) -> f64 {
        match self {
            LengthUnit::Millimetre => 1.0,
            LengthUnit::Centimetre => 10.0,
            LengthUnit::Decimetre => 100.0,
            LengthUnit::Metre => 1000.0,
        }
    }

    /// Parses a unit symbol such as `mm`, `cm`, `m` (Latin or Cyrillic).
    #[must_use]
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol.trim().to_lowercase().as_str() {
            "mm" | "мм" | "millimetre" | "millimeter" | "millimetres" | "millimeters" => {
                Some(LengthUnit::Millimetre)
            }
            "cm" | "см" | "centimetre" | "centimeter" | "centimetres" | "centimeters" => {
                Some(LengthUnit::Centimetre)
            }
            "dm" | "дм" => Some(LengthUnit::Decimetre),
            "m" | "м" | "metre" | "meter" | "metres" | "meters" => Some(LengthUnit::Metre),
            _ => None,
        }
    }
}

/// One normalized vertical structural element.
///
/// Instances are only produced by the record normalizer, so every record held
/// by a catalog has a non-empty id and name and a positive height in
/// millimetres.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnRecord {
    id: String,
    name: String,
    shape: Shape,
    level: String,
    height: f64,
    material: String,
}

impl ColumnRecord {
    pub(crate) fn new(
        id: String,
        name: String,
        shape: Shape,
        level: String,
        height: f64,
        material: String,
    ) -> Self {
        Self {
            id,
            name,
            shape,
            level,
            height,
            material,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn shape(&self) -> Shape {
        self.shape
    }

    /// Building level name, empty when the source did not say.
    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Level name for display, `Unspecified` when empty.
    #[must_use]
    pub fn level_label(&self) -> &str {
        if self.level.is_empty() {
            "Unspecified"
        } else {
            &self.level
        }
    }

    /// Height in millimetres.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.height
    }

    #[must_use]
    pub fn material(&self) -> &str {
        &self.material
    }
}
