//! Record normalizer: one raw source record in, one [`ColumnRecord`] out.

use crate::error::MalformedRecordError;
use crate::model::{ColumnRecord, LengthUnit, Shape};

/// Height as it appears in the source, before unit coercion.
#[derive(Debug, Clone, PartialEq)]
pub enum RawHeight {
    Number(f64),
    Text(String),
}

/// Field set extracted from one source record, prior to validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawFields {
    /// 1-based position in the source payload.
    pub position: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    /// Source vocabulary shape tag (free text, IFC profile type, ...).
    pub shape: Option<String>,
    pub level: Option<String>,
    pub height: Option<RawHeight>,
    /// Unit the source declares for `height`; millimetres when absent.
    pub unit: Option<LengthUnit>,
    pub material: Option<String>,
}

// Keys are lowercase. Matched against the whole tag first, then per word.
const SHAPE_VOCABULARY: &[(&str, Shape)] = &[
    ("прямоугольная", Shape::Rectangular),
    ("прямоугольный", Shape::Rectangular),
    ("прямоугольное", Shape::Rectangular),
    ("квадратная", Shape::Rectangular),
    ("квадратный", Shape::Rectangular),
    ("rectangular", Shape::Rectangular),
    ("rectangle", Shape::Rectangular),
    ("rect", Shape::Rectangular),
    ("square", Shape::Rectangular),
    ("ifcrectangleprofiledef", Shape::Rectangular),
    ("ifcrectanglehollowprofiledef", Shape::Rectangular),
    ("ifcroundedrectangleprofiledef", Shape::Rectangular),
    ("круглая", Shape::Circular),
    ("круглый", Shape::Circular),
    ("круглое", Shape::Circular),
    ("circular", Shape::Circular),
    ("circle", Shape::Circular),
    ("round", Shape::Circular),
    ("ifccircleprofiledef", Shape::Circular),
    ("ifccirclehollowprofiledef", Shape::Circular),
    ("другая", Shape::Other),
    ("other", Shape::Other),
];

/// Maps a source shape tag onto [`Shape`]. Unknown or ambiguous tags are `Other`.
#[must_use]
pub fn classify_shape(tag: &str) -> Shape {
    let key = tag.trim().to_lowercase();

    if let Some((_, shape)) = SHAPE_VOCABULARY.iter().find(|(k, _)| *k == key) {
        return *shape;
    }

    // Family names like "M_Concrete-Rectangular-Column"
    let mut found: Option<Shape> = None;
    for word in key.split(|c: char| !c.is_alphanumeric()) {
        if let Some((_, shape)) = SHAPE_VOCABULARY.iter().find(|(k, _)| *k == word) {
            match found {
                Some(previous) if previous != *shape => return Shape::Other,
                _ => found = Some(*shape),
            }
        }
    }

    found.unwrap_or(Shape::Other)
}

/// Validates and canonicalizes one raw record.
///
/// Heights are converted to millimetres, using the unit suffix of a text
/// height if present, else the declared unit, else millimetres. A missing id
/// is generated from the record position; a missing name falls back to the id.
pub fn normalize(raw: RawFields) -> Result<ColumnRecord, MalformedRecordError> {
    normalize_with(raw, |_| false)
}

/// Like [`normalize`], but a generated id skips every id `is_taken` reports.
///
/// `COL-NNN` is tried first, then `COL-NNN-1`, `COL-NNN-2` and so on.
pub(crate) fn normalize_with(
    raw: RawFields,
    is_taken: impl Fn(&str) -> bool,
) -> Result<ColumnRecord, MalformedRecordError> {
    let position = raw.position;
    let height = normalize_height(position, raw.height, raw.unit)?;

    let id = clean(raw.id);
    let name = clean(raw.name);
    let (id, name) = match (id, name) {
        (None, None) => return Err(MalformedRecordError::MissingIdentity { position }),
        (Some(id), Some(name)) => (id, name),
        (Some(id), None) => (id.clone(), id),
        (None, Some(name)) => (generate_id(position, is_taken), name),
    };

    let shape = raw
        .shape
        .as_deref()
        .map_or(Shape::Other, classify_shape);

    Ok(ColumnRecord::new(
        id,
        name,
        shape,
        clean(raw.level).unwrap_or_default(),
        height,
        clean(raw.material).unwrap_or_default(),
    ))
}

fn generate_id(position: usize, is_taken: impl Fn(&str) -> bool) -> String {
    let base = format!("COL-{position:03}");
    if !is_taken(&base) {
        return base;
    }
    let mut suffix = 1;
    loop {
        let candidate = format!("{base}-{suffix}");
        if !is_taken(&candidate) {
            return candidate;
        }
        suffix += 1;
    }
}

/// Trimmed, non-empty id as the normalizer will keep it.
pub(crate) fn explicit_id(raw: &RawFields) -> Option<&str> {
    raw.id.as_deref().map(str::trim).filter(|id| !id.is_empty())
}

fn normalize_height(
    position: usize,
    height: Option<RawHeight>,
    declared: Option<LengthUnit>,
) -> Result<f64, MalformedRecordError> {
    let (value, unit, source) = match height {
        None => return Err(MalformedRecordError::MissingHeight { position }),
        Some(RawHeight::Number(value)) => (value, declared, value.to_string()),
        Some(RawHeight::Text(text)) => match parse_height_text(&text) {
            Some((value, suffix)) => (value, suffix.or(declared), text),
            None => {
                return Err(MalformedRecordError::InvalidHeight {
                    position,
                    value: text,
                })
            }
        },
    };

    let millimetres = value * unit.unwrap_or_default().millimetres();
    // Strip float noise from unit conversion (3.2 m -> 3200.0000000000005)
    let millimetres = (millimetres * 1000.0).round() / 1000.0;

    if !millimetres.is_finite() {
        Err(MalformedRecordError::InvalidHeight {
            position,
            value: source,
        })
    } else if millimetres > 0.0 {
        Ok(millimetres)
    } else {
        Err(MalformedRecordError::NonPositiveHeight {
            position,
            height: value,
        })
    }
}

/// Splits "3.5 m", "350cm" or "3 500,5" into a value and an optional unit.
fn parse_height_text(text: &str) -> Option<(f64, Option<LengthUnit>)> {
    let text = text.trim();
    let split = text.find(char::is_alphabetic).unwrap_or(text.len());
    let (number, suffix) = text.split_at(split);

    let number: String = number.chars().filter(|c| !c.is_whitespace()).collect();
    let number = if number.contains('.') {
        number
    } else {
        number.replace(',', ".")
    };
    let value = number.parse::<f64>().ok()?;

    let suffix = suffix.trim();
    if suffix.is_empty() {
        return Some((value, None));
    }
    LengthUnit::from_symbol(suffix).map(|unit| (value, Some(unit)))
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
