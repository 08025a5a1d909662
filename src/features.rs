//! Feature frame construction for model inputs.
//!
//! Turns normalized listing records into the exact engineered rows the trained
//! regressor expects: loose coercion of numeric-ish attributes, default filling,
//! and the derived area/furnishing columns.
//!
//! **Critical for correctness**: every rule here must agree with the featurizer
//! the model was trained with, otherwise predictions drift silently
//! (train/serve skew). Rows are built independently of each other, so a batch
//! frame is always the concatenation of single-row frames.

use crate::Result;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Bedrooms assumed when missing or unparseable.
pub const DEFAULT_BEDROOMS: f64 = 0.0;

/// Bathrooms assumed when missing or unparseable.
pub const DEFAULT_BATHROOMS: f64 = 1.0;

/// Building age (years) assumed when missing or unparseable.
pub const DEFAULT_BUILDING_AGE: f64 = 5.0;

/// Area bin edges in square meters. The first bin is closed on both sides,
/// the rest are right-closed; anything above the last edge has no bin.
pub const AREA_BIN_EDGES: [f64; 7] = [0.0, 60.0, 90.0, 120.0, 160.0, 220.0, 10_000.0];

/// Age labels meaning "less than a year old".
const SUB_YEAR_LABELS: [&str; 4] = ["0–11 months", "0-11 months", "0 to 11 months", "0–11 month"];

/// Age band labels and the representative age used for each (substring match, in order).
const AGE_BANDS: [(&str, f64); 12] = [
    ("1-5 years", 3.0),
    ("1–5 years", 3.0),
    ("5-10 years", 7.5),
    ("5–10 years", 7.5),
    ("10-19 years", 15.0),
    ("10–19 years", 15.0),
    ("20-29 years", 25.0),
    ("20–29 years", 25.0),
    ("30-39 years", 35.0),
    ("30–39 years", 35.0),
    ("40-49 years", 45.0),
    ("40–49 years", 45.0),
];

/// Tokens accepted as "furnished" (after trimming and lower-casing).
const TRUTHY_TOKENS: [&str; 7] = ["1", "true", "yes", "y", "t", "فurnished", "مفروش"];

/// A loosely typed attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Scalar {
    /// Numeric reading of the value; `None` when it cannot be read as a number.
    pub fn as_f64(&self) -> Option<f64> {
        let v = match self {
            Scalar::Bool(b) => f64::from(u8::from(*b)),
            Scalar::Number(n) => *n,
            Scalar::Text(s) => s.trim().parse::<f64>().ok()?,
        };
        (!v.is_nan()).then_some(v)
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Scalar::Number(v)
    }
}

impl From<bool> for Scalar {
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Scalar::Text(v.to_string())
    }
}

/// A normalized listing, as handed from the normalizer to the feature builder.
///
/// Numeric attributes stay loosely typed so records read from files or other
/// services go through the same coercion rules as validated queries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ListingRecord {
    pub bedrooms: Option<Scalar>,
    pub bathrooms: Option<Scalar>,
    pub area_sqm: Option<Scalar>,
    /// Square of a positive area, when known
    pub area_sq: Option<f64>,
    pub floor: Option<Scalar>,
    pub building_age: Option<Scalar>,
    pub city: String,
    pub neighborhood: String,
    pub property_type: String,
    pub furnished: Option<Scalar>,
}

impl ListingRecord {
    /// Numeric area as used by the adjustment stages (missing → 0).
    pub fn area(&self) -> f64 {
        self.area_sqm
            .as_ref()
            .and_then(Scalar::as_f64)
            .unwrap_or(0.0)
    }

    /// Numeric floor, if one was given and parses.
    pub fn floor_value(&self) -> Option<f64> {
        self.floor.as_ref().and_then(Scalar::as_f64)
    }

    pub fn is_furnished(&self) -> bool {
        self.furnished.as_ref().map(to_bool).unwrap_or(false)
    }

    /// Copy of this record with the furnished flag forced.
    pub fn with_furnished(&self, furnished: bool) -> Self {
        Self {
            furnished: Some(Scalar::Bool(furnished)),
            ..self.clone()
        }
    }

    /// Copy of this record with the neighborhood cleared.
    pub fn without_neighborhood(&self) -> Self {
        Self {
            neighborhood: String::new(),
            ..self.clone()
        }
    }
}

/// Whether a column is fed to the model as `float32` or as a string tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Categorical,
}

/// One column of the model's input contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    Bedrooms,
    Bathrooms,
    AreaSqm,
    AreaLog,
    AreaSq,
    AreaPerBed,
    Floor,
    BuildingAge,
    FurnApt,
    AreaBin,
    Furnished,
    City,
    Neighborhood,
    PropertyType,
}

impl Column {
    /// Get all columns in contract order.
    pub fn all() -> [Column; 14] {
        [
            Column::Bedrooms,
            Column::Bathrooms,
            Column::AreaSqm,
            Column::AreaLog,
            Column::AreaSq,
            Column::AreaPerBed,
            Column::Floor,
            Column::BuildingAge,
            Column::FurnApt,
            Column::AreaBin,
            Column::Furnished,
            Column::City,
            Column::Neighborhood,
            Column::PropertyType,
        ]
    }

    /// Input name used by the model artifact.
    pub fn name(&self) -> &'static str {
        match self {
            Column::Bedrooms => "bedrooms",
            Column::Bathrooms => "bathrooms",
            Column::AreaSqm => "area_sqm",
            Column::AreaLog => "area_log",
            Column::AreaSq => "area_sq",
            Column::AreaPerBed => "area_per_bed",
            Column::Floor => "floor",
            Column::BuildingAge => "building_age",
            Column::FurnApt => "furn_apt",
            Column::AreaBin => "area_bin",
            Column::Furnished => "furnished",
            Column::City => "city",
            Column::Neighborhood => "neighborhood",
            Column::PropertyType => "property_type",
        }
    }

    pub fn from_name(name: &str) -> Option<Column> {
        Column::all().into_iter().find(|c| c.name() == name)
    }

    pub fn kind(&self) -> ColumnKind {
        match self {
            Column::City | Column::Neighborhood | Column::PropertyType => ColumnKind::Categorical,
            _ => ColumnKind::Numeric,
        }
    }
}

/// The engineered representation of one listing.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub bedrooms: f64,
    pub bathrooms: f64,
    pub area_sqm: f64,
    pub area_log: f64,
    pub area_sq: f64,
    pub area_per_bed: f64,
    pub floor: f64,
    pub building_age: f64,
    /// Furnished × is-apartment interaction
    pub furn_apt: f64,
    /// Bin index, NaN above the last edge
    pub area_bin: f64,
    pub furnished: bool,
    pub city: String,
    pub neighborhood: String,
    pub property_type: String,
}

impl FeatureRow {
    /// Numeric value of a column; `None` for categorical columns.
    pub fn numeric(&self, column: Column) -> Option<f64> {
        let v = match column {
            Column::Bedrooms => self.bedrooms,
            Column::Bathrooms => self.bathrooms,
            Column::AreaSqm => self.area_sqm,
            Column::AreaLog => self.area_log,
            Column::AreaSq => self.area_sq,
            Column::AreaPerBed => self.area_per_bed,
            Column::Floor => self.floor,
            Column::BuildingAge => self.building_age,
            Column::FurnApt => self.furn_apt,
            Column::AreaBin => self.area_bin,
            Column::Furnished => f64::from(u8::from(self.furnished)),
            Column::City | Column::Neighborhood | Column::PropertyType => return None,
        };
        Some(v)
    }

    /// Text value of a column; `None` for numeric columns.
    pub fn text(&self, column: Column) -> Option<&str> {
        match column {
            Column::City => Some(&self.city),
            Column::Neighborhood => Some(&self.neighborhood),
            Column::PropertyType => Some(&self.property_type),
            _ => None,
        }
    }
}

/// A batch of feature rows in input order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureFrame {
    pub rows: Vec<FeatureRow>,
}

impl FeatureFrame {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column as an `(n, 1)` float tensor.
    pub fn numeric_tensor(&self, column: Column) -> Result<Array2<f32>> {
        let values = self
            .rows
            .iter()
            .map(|row| {
                row.numeric(column)
                    .map(|v| v as f32)
                    .ok_or_else(|| anyhow::anyhow!("column `{}` is not numeric", column.name()))
            })
            .collect::<Result<Vec<f32>>>()?;
        Ok(Array2::from_shape_vec((self.rows.len(), 1), values)?)
    }

    /// Column as an `(n, 1)` string tensor.
    pub fn text_tensor(&self, column: Column) -> Result<Array2<String>> {
        let values = self
            .rows
            .iter()
            .map(|row| {
                row.text(column)
                    .map(str::to_string)
                    .ok_or_else(|| anyhow::anyhow!("column `{}` is not categorical", column.name()))
            })
            .collect::<Result<Vec<String>>>()?;
        Ok(Array2::from_shape_vec((self.rows.len(), 1), values)?)
    }
}

/// Parse a building age into years.
///
/// Accepts plain numbers, the sub-year label, age bands (mapped to a
/// representative age) and free text mentioning years (digits extracted).
///
/// # Returns
/// Age in years, `None` when nothing usable is found
pub fn parse_building_age(value: &Scalar) -> Option<f64> {
    let s = match value {
        Scalar::Number(n) => return (!n.is_nan()).then_some(*n),
        Scalar::Bool(b) => b.to_string(),
        Scalar::Text(t) => t.trim().to_lowercase(),
    };

    if SUB_YEAR_LABELS.contains(&s.as_str()) {
        return Some(0.5);
    }
    if let Some((_, age)) = AGE_BANDS.iter().find(|(label, _)| s.contains(label)) {
        return Some(*age);
    }
    if s.contains("year") {
        let digits: String = s
            .chars()
            .filter(|ch| ch.is_ascii_digit() || *ch == '.')
            .collect();
        return digits.parse::<f64>().ok().filter(|v| !v.is_nan());
    }
    s.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Coerce a boolean-like value to a strict boolean.
pub fn to_bool(value: &Scalar) -> bool {
    match value {
        Scalar::Bool(b) => *b,
        Scalar::Number(n) => *n == 1.0,
        Scalar::Text(s) => TRUTHY_TOKENS.contains(&s.trim().to_lowercase().as_str()),
    }
}

/// Bin index for an area (already clipped at zero).
///
/// # Returns
/// 0.0 for `[0, 60]`, 1.0 for `(60, 90]`, ... 5.0 for `(220, 10000]`, NaN above
pub fn area_bin(area: f64) -> f64 {
    if !(area >= AREA_BIN_EDGES[0]) {
        return f64::NAN;
    }
    if area <= AREA_BIN_EDGES[1] {
        return 0.0;
    }
    AREA_BIN_EDGES
        .windows(2)
        .position(|edge| area > edge[0] && area <= edge[1])
        .map(|i| i as f64)
        .unwrap_or(f64::NAN)
}

fn numeric_or(value: &Option<Scalar>, default: f64) -> f64 {
    value.as_ref().and_then(Scalar::as_f64).unwrap_or(default)
}

/// Build the feature row for a single record.
pub fn build_row(record: &ListingRecord) -> FeatureRow {
    let bedrooms = numeric_or(&record.bedrooms, DEFAULT_BEDROOMS);
    let bathrooms = numeric_or(&record.bathrooms, DEFAULT_BATHROOMS);
    let area_sqm = numeric_or(&record.area_sqm, 0.0);
    let floor = numeric_or(&record.floor, 0.0);
    let building_age = record
        .building_age
        .as_ref()
        .and_then(parse_building_age)
        .unwrap_or(DEFAULT_BUILDING_AGE);

    let property_type = crate::normalize::title_case(&record.property_type);
    let furnished = record.is_furnished();

    let area = area_sqm.max(0.0);
    let beds = if bedrooms == 0.0 { 1.0 } else { bedrooms };
    let furn_apt = if furnished && property_type == "Apartment" {
        1.0
    } else {
        0.0
    };

    FeatureRow {
        bedrooms,
        bathrooms,
        area_sqm,
        area_log: area.ln_1p(),
        area_sq: area * area,
        area_per_bed: area / beds.max(1.0),
        floor,
        building_age,
        furn_apt,
        area_bin: area_bin(area),
        furnished,
        city: record.city.clone(),
        neighborhood: record.neighborhood.clone(),
        property_type,
    }
}

/// Build a feature frame, one row per record, in input order.
pub fn build_frame(records: &[ListingRecord]) -> FeatureFrame {
    FeatureFrame {
        rows: records.iter().map(build_row).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> ListingRecord {
        ListingRecord {
            bedrooms: Some(Scalar::Number(3.0)),
            bathrooms: Some(Scalar::Number(2.0)),
            area_sqm: Some(Scalar::Number(150.0)),
            area_sq: Some(22_500.0),
            floor: Some(Scalar::Number(2.0)),
            building_age: Some(Scalar::Number(10.0)),
            city: "Amman".to_string(),
            neighborhood: "Khalda".to_string(),
            property_type: "apartment".to_string(),
            furnished: Some(true.into()),
        }
    }

    #[test]
    fn test_building_age_labels() {
        assert_eq!(parse_building_age(&"0-11 months".into()), Some(0.5));
        assert_eq!(parse_building_age(&" 0–11 Months ".into()), Some(0.5));
        assert_eq!(parse_building_age(&"10–19 years".into()), Some(15.0));
        assert_eq!(parse_building_age(&"20-29 years".into()), Some(25.0));
        assert_eq!(parse_building_age(&"40-49 Years old".into()), Some(45.0));
        assert_eq!(parse_building_age(&"5-10 years".into()), Some(7.5));
        assert_eq!(parse_building_age(&"1-5 years".into()), Some(3.0));
    }

    #[test]
    fn test_building_age_free_text() {
        assert_eq!(parse_building_age(&"12 years".into()), Some(12.0));
        assert_eq!(parse_building_age(&"7".into()), Some(7.0));
        assert_eq!(parse_building_age(&Scalar::Number(3.5)), Some(3.5));
        assert_eq!(parse_building_age(&"many years".into()), None);
        assert_eq!(parse_building_age(&"new".into()), None);
        assert_eq!(parse_building_age(&Scalar::Number(f64::NAN)), None);
    }

    #[test]
    fn test_to_bool_tokens() {
        assert!(to_bool(&true.into()));
        assert!(!to_bool(&false.into()));
        assert!(to_bool(&" Yes ".into()));
        assert!(to_bool(&"T".into()));
        assert!(to_bool(&"1".into()));
        assert!(to_bool(&"مفروش".into()));
        assert!(to_bool(&Scalar::Number(1.0)));
        assert!(!to_bool(&Scalar::Number(0.0)));
        assert!(!to_bool(&"furnished".into()));
        assert!(!to_bool(&"no".into()));
    }

    #[test]
    fn test_area_bin_edges() {
        assert_eq!(area_bin(0.0), 0.0);
        assert_eq!(area_bin(60.0), 0.0);
        assert_eq!(area_bin(60.5), 1.0);
        assert_eq!(area_bin(90.0), 1.0);
        assert_eq!(area_bin(120.0), 2.0);
        assert_eq!(area_bin(150.0), 3.0);
        assert_eq!(area_bin(220.0), 4.0);
        assert_eq!(area_bin(221.0), 5.0);
        assert_eq!(area_bin(10_000.0), 5.0);
        assert!(area_bin(10_001.0).is_nan());
    }

    #[test]
    fn test_build_row_derived_columns() {
        let row = build_row(&record());
        assert_eq!(row.property_type, "Apartment");
        assert!((row.area_log - 151.0_f64.ln()).abs() < 1e-12);
        assert_eq!(row.area_sq, 22_500.0);
        assert_eq!(row.area_per_bed, 50.0);
        assert_eq!(row.area_bin, 3.0);
        assert_eq!(row.furn_apt, 1.0);
        assert!(row.furnished);
    }

    #[test]
    fn test_build_row_defaults() {
        let row = build_row(&ListingRecord::default());
        assert_eq!(row.bedrooms, 0.0);
        assert_eq!(row.bathrooms, 1.0);
        assert_eq!(row.area_sqm, 0.0);
        assert_eq!(row.floor, 0.0);
        assert_eq!(row.building_age, 5.0);
        assert!(!row.furnished);
        assert_eq!(row.area_per_bed, 0.0);
        assert_eq!(row.area_bin, 0.0);
    }

    #[test]
    fn test_unparseable_counts_fall_back() {
        let mut rec = record();
        rec.bedrooms = Some("three".into());
        rec.bathrooms = Some("".into());
        rec.floor = Some("ground".into());
        let row = build_row(&rec);
        assert_eq!(row.bedrooms, 0.0);
        assert_eq!(row.bathrooms, 1.0);
        assert_eq!(row.floor, 0.0);
        assert_eq!(row.area_per_bed, 150.0);
    }

    #[test]
    fn test_furn_apt_only_for_apartments() {
        let mut rec = record();
        rec.property_type = "Villa".to_string();
        assert_eq!(build_row(&rec).furn_apt, 0.0);

        let rec = record().with_furnished(false);
        assert_eq!(build_row(&rec).furn_apt, 0.0);
    }

    #[test]
    fn test_negative_area_clipped_for_derived() {
        let mut rec = record();
        rec.area_sqm = Some(Scalar::Number(-20.0));
        let row = build_row(&rec);
        assert_eq!(row.area_sqm, -20.0);
        assert_eq!(row.area_log, 0.0);
        assert_eq!(row.area_sq, 0.0);
        assert_eq!(row.area_bin, 0.0);
    }

    #[test]
    fn test_batch_frame_equals_single_rows() {
        let mut other = record();
        other.neighborhood = String::new();
        other.area_sqm = Some("90".into());
        let records = vec![record(), other.clone(), ListingRecord::default()];

        let frame = build_frame(&records);
        assert_eq!(frame.len(), 3);
        for (i, rec) in records.iter().enumerate() {
            let single = build_frame(std::slice::from_ref(rec));
            assert_eq!(single.rows[0].bedrooms, frame.rows[i].bedrooms);
            assert_eq!(single.rows[0].neighborhood, frame.rows[i].neighborhood);
            assert_eq!(single.rows[0].area_log, frame.rows[i].area_log);
        }
    }

    #[test]
    fn test_tensors_have_column_shape() {
        let frame = build_frame(&[record(), record()]);
        let area = frame.numeric_tensor(Column::AreaSqm).unwrap();
        assert_eq!(area.shape(), &[2, 1]);
        assert_eq!(area[[1, 0]], 150.0_f32);

        let city = frame.text_tensor(Column::City).unwrap();
        assert_eq!(city[[0, 0]], "Amman");

        assert!(frame.numeric_tensor(Column::City).is_err());
        assert!(frame.text_tensor(Column::Floor).is_err());
    }

    #[test]
    fn test_column_names_round_trip() {
        for column in Column::all() {
            assert_eq!(Column::from_name(column.name()), Some(column));
        }
        assert_eq!(Column::from_name("bed_per_bath"), None);
        assert_eq!(Column::Neighborhood.kind(), ColumnKind::Categorical);
        assert_eq!(Column::FurnApt.kind(), ColumnKind::Numeric);
    }

    #[test]
    fn test_record_from_loose_json() {
        let rec: ListingRecord = serde_json::from_str(
            r#"{"bedrooms":"2","area_sqm":110,"furnished":"yes",
                "building_age":"10-19 years","city":"Amman","property_type":"apartment"}"#,
        )
        .unwrap();
        let row = build_row(&rec);
        assert_eq!(row.bedrooms, 2.0);
        assert_eq!(row.building_age, 15.0);
        assert!(row.furnished);
        assert_eq!(row.neighborhood, "");
    }
}
