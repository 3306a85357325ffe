//! Extracts column records from IFC (STEP) payloads.

use crate::error::{IngestionError, MalformedRecordError};
use crate::model::LengthUnit;
use crate::parser::normalize::{RawFields, RawHeight};
use crate::parser::step::{StepEntity, StepFile, StepValue};
use std::collections::HashMap;

const COLUMN_ENTITIES: &[&str] = &["IFCCOLUMN", "IFCCOLUMNSTANDARDCASE"];

// Property and quantity names that carry the column height, in priority order
const HEIGHT_PROPERTIES: &[&str] = &["Height", "Высота", "Length", "Длина"];

// Guards against reference cycles in malformed files
const MAX_DEPTH: usize = 8;

/// Decodes an IFC payload into one raw field set per column entity.
///
/// Columns are visited in entity id order. Every attribute the normalizer
/// needs is resolved here by following IFC relationships:
///
/// - level from `IFCRELCONTAINEDINSPATIALSTRUCTURE` to a building storey
/// - type name from `IFCRELDEFINESBYTYPE`
/// - material from `IFCRELASSOCIATESMATERIAL` (element first, then its type)
/// - shape and height from the extruded body geometry, with `Height`/`Length`
///   properties and quantities as the height fallback
///
/// # Errors
///
/// Returns [`IngestionError::Parse`] when the STEP structure is broken.
pub fn read_records(
    text: &str,
) -> Result<Vec<Result<RawFields, MalformedRecordError>>, IngestionError> {
    let step_file = StepFile::parse(text)?;
    let context = ModelContext::build(&step_file);

    let mut columns: Vec<&StepEntity> = COLUMN_ENTITIES
        .iter()
        .flat_map(|entity_type| step_file.entities_of_type(entity_type))
        .collect();
    columns.sort_by_key(|column| column.id);

    tracing::debug!(
        schema = %step_file.schema,
        entities = step_file.entities.len(),
        columns = columns.len(),
        "scanned IFC model"
    );

    Ok(columns
        .into_iter()
        .enumerate()
        .map(|(index, column)| Ok(context.column_fields(index + 1, column)))
        .collect())
}

/// Relationship lookups shared by every column of one model.
struct ModelContext<'a> {
    step_file: &'a StepFile,
    unit: Option<LengthUnit>,
    element_to_storey: HashMap<u64, u64>,
    element_to_type: HashMap<u64, u64>,
    object_to_material: HashMap<u64, u64>,
    element_heights: HashMap<u64, f64>,
}

impl<'a> ModelContext<'a> {
    fn build(step_file: &'a StepFile) -> Self {
        Self {
            step_file,
            unit: extract_length_unit(step_file),
            element_to_storey: extract_relation(
                step_file,
                "IFCRELCONTAINEDINSPATIALSTRUCTURE",
                4,
                5,
            ),
            element_to_type: extract_relation(step_file, "IFCRELDEFINESBYTYPE", 4, 5),
            object_to_material: extract_relation(step_file, "IFCRELASSOCIATESMATERIAL", 4, 5),
            element_heights: extract_height_properties(step_file),
        }
    }

    fn column_fields(&self, position: usize, column: &StepEntity) -> RawFields {
        // IFCCOLUMN: GlobalId, OwnerHistory, Name, Description, ObjectType,
        // ObjectPlacement, Representation, Tag, PredefinedType
        let type_entity = self
            .element_to_type
            .get(&column.id)
            .and_then(|id| self.step_file.get_entity(*id));
        let type_name = type_entity.and_then(|t| non_empty(t.str_at(2)));
        let object_type = non_empty(column.str_at(4));

        let body = column
            .ref_at(6)
            .and_then(|id| self.find_extrusion(id, 0));

        let shape = body
            .as_ref()
            .map(|b| b.profile_type.clone())
            .or_else(|| object_type.clone())
            .or_else(|| type_name.clone());

        let height = body
            .and_then(|b| b.depth)
            .or_else(|| self.element_heights.get(&column.id).copied())
            .or_else(|| type_entity.and_then(|t| self.element_heights.get(&t.id).copied()))
            .map(RawHeight::Number);

        let level = self
            .element_to_storey
            .get(&column.id)
            .and_then(|id| self.step_file.get_entity(*id))
            .filter(|storey| storey.entity_type == "IFCBUILDINGSTOREY")
            .map(|storey| {
                non_empty(storey.str_at(2)).unwrap_or_else(|| format!("Storey #{}", storey.id))
            });

        let material = self
            .object_to_material
            .get(&column.id)
            .or_else(|| type_entity.and_then(|t| self.object_to_material.get(&t.id)))
            .and_then(|id| self.material_name(*id, 0));

        RawFields {
            position,
            id: non_empty(column.str_at(0)),
            name: non_empty(column.str_at(2)).or(type_name).or(object_type),
            shape,
            level,
            height,
            unit: self.unit,
            material,
        }
    }

    /// Walks a product shape down to its first extruded solid, preferring the
    /// `Body` representation.
    fn find_extrusion(&self, id: u64, depth: usize) -> Option<Extrusion> {
        if depth > MAX_DEPTH {
            return None;
        }
        let entity = self.step_file.get_entity(id)?;

        match entity.entity_type.as_str() {
            "IFCPRODUCTDEFINITIONSHAPE" => {
                let representations: Vec<&StepEntity> = entity
                    .refs_at(2)
                    .into_iter()
                    .filter_map(|r| self.step_file.get_entity(r))
                    .collect();
                let (body, rest): (Vec<&StepEntity>, Vec<&StepEntity>) = representations
                    .into_iter()
                    .partition(|r| r.str_at(1) == Some("Body"));
                body.into_iter()
                    .chain(rest)
                    .find_map(|r| self.find_extrusion(r.id, depth + 1))
            }
            "IFCSHAPEREPRESENTATION" => entity
                .refs_at(3)
                .into_iter()
                .find_map(|item| self.find_extrusion(item, depth + 1)),
            // MappingSource -> IFCREPRESENTATIONMAP(MappingOrigin, MappedRepresentation)
            "IFCMAPPEDITEM" => {
                let map = self.step_file.get_entity(entity.ref_at(0)?)?;
                self.find_extrusion(map.ref_at(1)?, depth + 1)
            }
            "IFCBOOLEANCLIPPINGRESULT" | "IFCBOOLEANRESULT" => {
                self.find_extrusion(entity.ref_at(1)?, depth + 1)
            }
            "IFCEXTRUDEDAREASOLID" | "IFCEXTRUDEDAREASOLIDTAPERED" => Some(Extrusion {
                profile_type: self.profile_type(entity.ref_at(0)?, 0)?,
                depth: entity.real_at(3),
            }),
            _ => None,
        }
    }

    /// Entity type of a swept-area profile, seen through derived profiles.
    fn profile_type(&self, id: u64, depth: usize) -> Option<String> {
        let profile = self.step_file.get_entity(id)?;
        if profile.entity_type == "IFCDERIVEDPROFILEDEF" && depth < MAX_DEPTH {
            return self.profile_type(profile.ref_at(2)?, depth + 1);
        }
        Some(profile.entity_type.clone())
    }

    fn material_name(&self, id: u64, depth: usize) -> Option<String> {
        if depth > MAX_DEPTH {
            return None;
        }
        let entity = self.step_file.get_entity(id)?;

        match entity.entity_type.as_str() {
            "IFCMATERIAL" => non_empty(entity.str_at(0)),
            "IFCMATERIALLIST" => self.join_materials(&entity.refs_at(0), depth),
            "IFCMATERIALLAYERSETUSAGE" | "IFCMATERIALPROFILESETUSAGE" => {
                self.material_name(entity.ref_at(0)?, depth + 1)
            }
            "IFCMATERIALLAYERSET" => non_empty(entity.str_at(1))
                .or_else(|| self.join_materials(&entity.refs_at(0), depth)),
            "IFCMATERIALLAYER" => self.material_name(entity.ref_at(0)?, depth + 1),
            "IFCMATERIALPROFILESET" | "IFCMATERIALCONSTITUENTSET" => non_empty(entity.str_at(0))
                .or_else(|| self.join_materials(&entity.refs_at(2), depth)),
            "IFCMATERIALPROFILE" | "IFCMATERIALCONSTITUENT" => {
                self.material_name(entity.ref_at(2)?, depth + 1)
            }
            _ => None,
        }
    }

    fn join_materials(&self, ids: &[u64], depth: usize) -> Option<String> {
        let mut names: Vec<String> = Vec::new();
        for name in ids.iter().filter_map(|id| self.material_name(*id, depth + 1)) {
            if !names.contains(&name) {
                names.push(name);
            }
        }
        if names.is_empty() {
            None
        } else {
            Some(names.join(", "))
        }
    }
}

struct Extrusion {
    profile_type: String,
    depth: Option<f64>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Maps each related object to the relating entity of a one-to-many
/// relationship (`RelatedObjects` at `related`, `Relating*` at `relating`).
fn extract_relation(
    step_file: &StepFile,
    relationship: &str,
    related: usize,
    relating: usize,
) -> HashMap<u64, u64> {
    let mut map = HashMap::new();
    for rel in step_file.entities_of_type(relationship) {
        if let Some(target) = rel.ref_at(relating) {
            for object in rel.refs_at(related) {
                map.entry(object).or_insert(target);
            }
        }
    }
    map
}

/// Length unit of the model from its `IFCSIUNIT(.LENGTHUNIT.)`.
///
/// Prefers the unit assigned to the project. Conversion-based units (feet,
/// inches) and unusual prefixes yield `None`, i.e. millimetres.
fn extract_length_unit(step_file: &StepFile) -> Option<LengthUnit> {
    let assigned: Vec<u64> = step_file
        .entities_of_type("IFCPROJECT")
        .next()
        .and_then(|project| project.ref_at(8))
        .and_then(|id| step_file.get_entity(id))
        .map(|assignment| assignment.refs_at(0))
        .unwrap_or_default();

    let is_length_unit = |unit: &&StepEntity| unit.enum_at(1) == Some("LENGTHUNIT");

    let unit = assigned
        .iter()
        .filter_map(|id| step_file.get_entity(*id))
        .find(is_length_unit)
        .or_else(|| step_file.entities_of_type("IFCSIUNIT").find(is_length_unit))?;

    if unit.entity_type != "IFCSIUNIT" {
        tracing::debug!(unit = %unit.entity_type, "non-SI length unit, assuming millimetres");
        return None;
    }

    match unit.values.get(2) {
        Some(StepValue::Enum(prefix)) => match prefix.as_str() {
            "MILLI" => Some(LengthUnit::Millimetre),
            "CENTI" => Some(LengthUnit::Centimetre),
            "DECI" => Some(LengthUnit::Decimetre),
            other => {
                tracing::debug!(prefix = other, "unsupported length prefix, assuming millimetres");
                None
            }
        },
        _ => Some(LengthUnit::Metre),
    }
}

/// Height-like values from property sets and element quantities, per object.
fn extract_height_properties(step_file: &StepFile) -> HashMap<u64, f64> {
    let mut heights = HashMap::new();

    for rel in step_file.entities_of_type("IFCRELDEFINESBYPROPERTIES") {
        let Some(definition) = rel.ref_at(5).and_then(|id| step_file.get_entity(id)) else {
            continue;
        };

        let members = match definition.entity_type.as_str() {
            "IFCPROPERTYSET" => definition.refs_at(4),
            "IFCELEMENTQUANTITY" => definition.refs_at(5),
            _ => continue,
        };

        let Some(height) = height_in(step_file, &members) else {
            continue;
        };
        for object in rel.refs_at(4) {
            heights.entry(object).or_insert(height);
        }
    }

    // Types carry their property sets directly (HasPropertySets)
    for type_entity in step_file.entities_of_type("IFCCOLUMNTYPE") {
        let found = type_entity
            .refs_at(5)
            .into_iter()
            .filter_map(|id| step_file.get_entity(id))
            .filter(|pset| pset.entity_type == "IFCPROPERTYSET")
            .find_map(|pset| height_in(step_file, &pset.refs_at(4)));
        if let Some(height) = found {
            heights.entry(type_entity.id).or_insert(height);
        }
    }

    heights
}

fn height_in(step_file: &StepFile, members: &[u64]) -> Option<f64> {
    let named: Vec<(&str, f64)> = members
        .iter()
        .filter_map(|id| step_file.get_entity(*id))
        .filter_map(|member| {
            // IFCPROPERTYSINGLEVALUE(Name, Description, NominalValue, Unit)
            // IFCQUANTITYLENGTH(Name, Description, Unit, LengthValue, Formula)
            let value = match member.entity_type.as_str() {
                "IFCPROPERTYSINGLEVALUE" => member.real_at(2),
                "IFCQUANTITYLENGTH" => member.real_at(3),
                _ => None,
            }?;
            Some((member.str_at(0)?, value))
        })
        .collect();

    HEIGHT_PROPERTIES.iter().find_map(|wanted| {
        named
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| *value)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Shape;
    use crate::parser::normalize::normalize;
    use pretty_assertions::assert_eq;

    fn model(data: &str, unit: &str) -> String {
        format!(
            "ISO-10303-21;
HEADER;
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0proj',$,'Test',$,$,$,$,$,#2);
#2=IFCUNITASSIGNMENT((#3));
#3={unit};
{data}
ENDSEC;
END-ISO-10303-21;
"
        )
    }

    const MILLIMETRES: &str = "IFCSIUNIT(*,.LENGTHUNIT.,.MILLI.,.METRE.)";
    const METRES: &str = "IFCSIUNIT(*,.LENGTHUNIT.,$,.METRE.)";

    const TWO_COLUMNS: &str = "
#10=IFCBUILDINGSTOREY('0st1',$,'\\X2\\0423\\X0\\ровень 1',$,$,$,$,$,.ELEMENT.,0.);
#11=IFCBUILDINGSTOREY('0st2',$,'Level 2',$,$,$,$,$,.ELEMENT.,3500.);
#20=IFCRECTANGLEPROFILEDEF(.AREA.,$,$,300.,300.);
#21=IFCEXTRUDEDAREASOLID(#20,$,$,3500.);
#22=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#21));
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));
#30=IFCCIRCLEPROFILEDEF(.AREA.,$,$,175.);
#31=IFCEXTRUDEDAREASOLID(#30,$,$,3200.);
#32=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#31));
#33=IFCREPRESENTATIONMAP($,#32);
#34=IFCMAPPEDITEM(#33,$);
#35=IFCSHAPEREPRESENTATION($,'Axis','Curve3D',());
#36=IFCSHAPEREPRESENTATION($,'Body','MappedRepresentation',(#34));
#37=IFCPRODUCTDEFINITIONSHAPE($,$,(#35,#36));
#40=IFCCOLUMN('2O2Fr$t4X7Zf8NOew3FL01',$,'Column 300x300',$,$,$,#23,$,.COLUMN.);
#41=IFCCOLUMN('2O2Fr$t4X7Zf8NOew3FL02',$,$,$,$,$,#37,$,.COLUMN.);
#42=IFCBEAM('beam',$,'Beam',$,$,$,$,$,$);
#50=IFCRELCONTAINEDINSPATIALSTRUCTURE('r1',$,$,$,(#40,#42),#10);
#51=IFCRELCONTAINEDINSPATIALSTRUCTURE('r2',$,$,$,(#41),#11);
#60=IFCCOLUMNTYPE('t1',$,'Round 350',$,$,$,$,$,$,.COLUMN.);
#61=IFCRELDEFINESBYTYPE('r3',$,$,$,(#41),#60);
#70=IFCMATERIAL('Concrete C25/30',$,$);
#71=IFCMATERIAL('Steel',$,$);
#72=IFCMATERIALLIST((#70,#71));
#73=IFCRELASSOCIATESMATERIAL('r4',$,$,$,(#40),#70);
#74=IFCRELASSOCIATESMATERIAL('r5',$,$,$,(#60),#72);
";

    #[test]
    fn extracts_columns_with_relationships() {
        let records = read_records(&model(TWO_COLUMNS, MILLIMETRES)).unwrap();
        assert_eq!(records.len(), 2);

        let first = records[0].as_ref().unwrap();
        assert_eq!(first.position, 1);
        assert_eq!(first.id.as_deref(), Some("2O2Fr$t4X7Zf8NOew3FL01"));
        assert_eq!(first.name.as_deref(), Some("Column 300x300"));
        assert_eq!(first.shape.as_deref(), Some("IFCRECTANGLEPROFILEDEF"));
        assert_eq!(first.level.as_deref(), Some("Уровень 1"));
        assert_eq!(first.height, Some(RawHeight::Number(3500.0)));
        assert_eq!(first.unit, Some(LengthUnit::Millimetre));
        assert_eq!(first.material.as_deref(), Some("Concrete C25/30"));

        let second = records[1].as_ref().unwrap();
        assert_eq!(second.name.as_deref(), Some("Round 350"));
        assert_eq!(second.shape.as_deref(), Some("IFCCIRCLEPROFILEDEF"));
        assert_eq!(second.level.as_deref(), Some("Level 2"));
        assert_eq!(second.height, Some(RawHeight::Number(3200.0)));
        assert_eq!(second.material.as_deref(), Some("Concrete C25/30, Steel"));
    }

    #[test]
    fn normalized_ifc_columns_use_shape_table() {
        let records = read_records(&model(TWO_COLUMNS, MILLIMETRES)).unwrap();
        let shapes: Vec<Shape> = records
            .into_iter()
            .map(|r| normalize(r.unwrap()).unwrap().shape())
            .collect();
        assert_eq!(shapes, vec![Shape::Rectangular, Shape::Circular]);
    }

    #[test]
    fn metre_models_convert_to_millimetres() {
        let data = "
#20=IFCCIRCLEPROFILEDEF(.AREA.,$,$,0.2);
#21=IFCEXTRUDEDAREASOLID(#20,$,$,3.2);
#22=IFCSHAPEREPRESENTATION($,'Body','SweptSolid',(#21));
#23=IFCPRODUCTDEFINITIONSHAPE($,$,(#22));
#40=IFCCOLUMN('c1',$,'C1',$,$,$,#23,$,$);
";
        let records = read_records(&model(data, METRES)).unwrap();
        let record = normalize(records[0].clone().unwrap()).unwrap();
        assert_eq!(record.height(), 3200.0);
        assert_eq!(record.shape(), Shape::Circular);
        assert_eq!(record.level(), "");
    }

    #[test]
    fn height_falls_back_to_quantities() {
        let data = "
#40=IFCCOLUMNSTANDARDCASE('c1',$,'C1',$,'Прямоугольная',$,$,$,$);
#41=IFCQUANTITYLENGTH('Length',$,$,2950.,$);
#42=IFCELEMENTQUANTITY('q',$,'Qto_ColumnBaseQuantities',$,$,(#41));
#43=IFCRELDEFINESBYPROPERTIES('r',$,$,$,(#40),#42);
#44=IFCCOLUMN('c2',$,'C2',$,$,$,$,$,$);
#45=IFCPROPERTYSINGLEVALUE('Height',$,IFCLENGTHMEASURE(3100.),$);
#46=IFCPROPERTYSET('p',$,'Pset_Dimensions',$,(#45));
#47=IFCRELDEFINESBYPROPERTIES('r2',$,$,$,(#44),#46);
";
        let records = read_records(&model(data, MILLIMETRES)).unwrap();
        let first = records[0].as_ref().unwrap();
        assert_eq!(first.height, Some(RawHeight::Number(2950.0)));
        assert_eq!(first.shape.as_deref(), Some("Прямоугольная"));
        let second = records[1].as_ref().unwrap();
        assert_eq!(second.height, Some(RawHeight::Number(3100.0)));
    }

    #[test]
    fn columns_without_height_fail_normalization() {
        let data = "#40=IFCCOLUMN('c1',$,'C1',$,$,$,$,$,$);";
        let records = read_records(&model(data, MILLIMETRES)).unwrap();
        let err = normalize(records[0].clone().unwrap()).unwrap_err();
        assert_eq!(err, MalformedRecordError::MissingHeight { position: 1 });
    }

    #[test]
    fn model_without_columns_yields_no_records() {
        let data = "#42=IFCBEAM('beam',$,'Beam',$,$,$,$,$,$);";
        assert!(read_records(&model(data, MILLIMETRES)).unwrap().is_empty());
    }

    #[test]
    fn conversion_based_units_default_to_millimetres() {
        let unit = "IFCCONVERSIONBASEDUNIT(#4,.LENGTHUNIT.,'FOOT',#5)";
        let data = "#40=IFCCOLUMN('c1',$,'C1',$,$,$,$,$,$);";
        let records = read_records(&model(data, unit)).unwrap();
        assert_eq!(records[0].as_ref().unwrap().unit, None);
    }
}
