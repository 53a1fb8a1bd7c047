//! Typed census tract records and the fields reports group and filter on.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::join::{JoinSource, left_join};
use crate::table::Table;

/// Column names of the model results file.
pub mod model_columns {
    pub const ID: &str = "GEOID";
    pub const STATE_ABBR: &str = "StateAbbr";
    pub const RESILIENCE_SCORE: &str = "resilience_score";
    pub const BURDEN: &str = "burden";
    pub const RESIDUAL: &str = "resid";
}

/// Column names of the Food Access Research Atlas extract.
pub mod attribute_columns {
    pub const ID: &str = "CensusTract";
    pub const COUNTY: &str = "County";
    pub const STATE: &str = "State";
    pub const URBAN: &str = "Urban";
    pub const POPULATION: &str = "Pop2010";
    pub const POVERTY_RATE: &str = "PovertyRate";
    pub const MEDIAN_FAMILY_INCOME: &str = "MedianFamilyIncome";
    pub const GROUP_QUARTERS_PCT: &str = "PCTGQTRS";
    pub const LOW_INCOME: &str = "LowIncomeTracts";
    pub const SNAP: &str = "TractSNAP";
    pub const WHITE: &str = "TractWhite";
    pub const BLACK: &str = "TractBlack";
    pub const ASIAN: &str = "TractAsian";
    pub const HISPANIC: &str = "TractHispanic";
    pub const NO_VEHICLE_FAR: &str = "lahunv10";
}

/// Column names of the centroid table after [`read_centroids`](crate::parser::read_centroids).
pub mod centroid_columns {
    pub const ID: &str = "GEOID";
    pub const LATITUDE: &str = "latitude";
    pub const LONGITUDE: &str = "longitude";
}

/// Official LILA threshold definitions. A tract can satisfy several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LilaDefinition {
    OneAndTen,
    HalfAndTen,
    OneAndTwenty,
    Vehicle,
}

impl LilaDefinition {
    pub const ALL: [LilaDefinition; 4] = [
        LilaDefinition::OneAndTen,
        LilaDefinition::HalfAndTen,
        LilaDefinition::OneAndTwenty,
        LilaDefinition::Vehicle,
    ];

    /// Distance-only definitions, without the vehicle-access variant.
    pub const DISTANCE: [LilaDefinition; 3] = [
        LilaDefinition::OneAndTen,
        LilaDefinition::HalfAndTen,
        LilaDefinition::OneAndTwenty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            LilaDefinition::OneAndTen => "1-mile-and-10-mile",
            LilaDefinition::HalfAndTen => "half-mile-and-10-mile",
            LilaDefinition::OneAndTwenty => "1-mile-and-20-mile",
            LilaDefinition::Vehicle => "vehicle-access",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            LilaDefinition::OneAndTen => "LILATracts_1And10",
            LilaDefinition::HalfAndTen => "LILATracts_halfAnd10",
            LilaDefinition::OneAndTwenty => "LILATracts_1And20",
            LilaDefinition::Vehicle => "LILATracts_Vehicle",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LilaDefinition::OneAndTen => "LILA (1+10 miles)",
            LilaDefinition::HalfAndTen => "LILA (0.5+10 miles)",
            LilaDefinition::OneAndTwenty => "LILA (1+20 miles)",
            LilaDefinition::Vehicle => "LILA (vehicle access)",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Settlement {
    Urban,
    Rural,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Settlement::Urban => f.write_str("Urban"),
            Settlement::Rural => f.write_str("Rural"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialPopulation {
    None,
    College,
    Military,
}

impl fmt::Display for SpecialPopulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecialPopulation::None => f.write_str("None"),
            SpecialPopulation::College => f.write_str("College"),
            SpecialPopulation::Military => f.write_str("Military"),
        }
    }
}

/// County name fragment → university it hosts.
pub const COLLEGE_COUNTIES: &[(&str, &str)] = &[
    ("Washtenaw", "University of Michigan"),
    ("Centre", "Penn State"),
    ("Story", "Iowa State"),
    ("Tippecanoe", "Purdue"),
    ("Clarke", "University of Georgia"),
    ("Orange", "UNC Chapel Hill"),
    ("Alachua", "University of Florida"),
    ("Dane", "UW Madison"),
    ("Boulder", "CU Boulder"),
    ("Tompkins", "Cornell"),
    ("Lafayette", "Ole Miss"),
    ("Riley", "Kansas State"),
    ("Oktibbeha", "Mississippi State"),
    ("Lee", "Auburn"),
    ("Brazos", "Texas A&M"),
];

/// County name fragment → military installation it hosts.
pub const MILITARY_COUNTIES: &[(&str, &str)] = &[
    ("El Paso", "Fort Bliss"),
    ("Bell", "Fort Hood"),
    ("Cumberland", "Fort Bragg"),
    ("Hardin", "Fort Knox"),
    ("Christian", "Fort Campbell"),
    ("Comanche", "Fort Sill"),
    ("Muscogee", "Fort Benning"),
    ("Liberty", "Fort Stewart"),
    ("Onslow", "Camp Lejeune"),
    ("San Diego", "Multiple bases"),
    ("Norfolk", "Naval Station Norfolk"),
    ("Pierce", "Joint Base Lewis-McChord"),
];

/// First institution in `table` whose county fragment occurs in `county`.
pub fn institution(table: &'static [(&'static str, &'static str)], county: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(key, _)| county.contains(key))
        .map(|(_, institution)| *institution)
}

/// Matches a county name against the lookup tables by substring. College
/// counties are checked first.
pub fn special_population(county: &str) -> Option<(SpecialPopulation, &'static str)> {
    institution(COLLEGE_COUNTIES, county)
        .map(|i| (SpecialPopulation::College, i))
        .or_else(|| institution(MILITARY_COUNTIES, county).map(|i| (SpecialPopulation::Military, i)))
}

/// One census tract with its model output and joined attributes.
///
/// Attributes come from a left join and are `None` when the attribute
/// table had no row (or a null cell) for this tract.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Tract {
    pub id: String,
    pub state_abbr: Option<String>,
    pub resilience_score: f64,
    pub burden: f64,
    pub residual: Option<f64>,

    pub county: Option<String>,
    pub state: Option<String>,
    pub is_urban: Option<bool>,
    pub population: Option<u64>,
    pub poverty_rate: Option<f64>,
    pub median_family_income: Option<f64>,
    pub group_quarters_pct: Option<f64>,
    pub lila: BTreeMap<LilaDefinition, bool>,
    pub low_income: Option<bool>,

    pub snap: Option<f64>,
    pub white: Option<f64>,
    pub black: Option<f64>,
    pub asian: Option<f64>,
    pub hispanic: Option<f64>,
    pub no_vehicle_far: Option<f64>,

    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Tract {
    pub fn new(id: impl Into<String>, resilience_score: f64, burden: f64) -> Self {
        Tract {
            id: id.into(),
            resilience_score,
            burden,
            ..Default::default()
        }
    }

    /// `Some(true)`/`Some(false)` for a known flag, `None` when null.
    pub fn lila_flag(&self, definition: LilaDefinition) -> Option<bool> {
        self.lila.get(&definition).copied()
    }

    /// True only for a known, set flag.
    pub fn is_lila(&self, definition: LilaDefinition) -> bool {
        self.lila_flag(definition) == Some(true)
    }

    pub fn settlement(&self) -> Option<Settlement> {
        self.is_urban
            .map(|u| if u { Settlement::Urban } else { Settlement::Rural })
    }

    pub fn special_population(&self) -> SpecialPopulation {
        self.county
            .as_deref()
            .and_then(special_population)
            .map(|(kind, _)| kind)
            .unwrap_or(SpecialPopulation::None)
    }

    /// `count` as a percentage of the tract population.
    pub fn share_of_population(&self, count: Option<f64>) -> Option<f64> {
        let population = self.population? as f64;
        if population == 0.0 {
            return None;
        }
        Some(count? / population * 100.0)
    }

    pub fn snap_rate(&self) -> Option<f64> {
        self.share_of_population(self.snap)
    }

    pub fn no_vehicle_far_rate(&self) -> Option<f64> {
        self.share_of_population(self.no_vehicle_far)
    }

    /// Google Maps link for the centroid, when known.
    pub fn map_url(&self) -> Option<String> {
        Some(format!(
            "https://maps.google.com/?q={},{}",
            self.latitude?, self.longitude?
        ))
    }
}

/// Grouping keys a report can aggregate by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoricalField {
    Id,
    State,
    StateAbbr,
    County,
    Type,
    SpecialPopulation,
    /// Only set on classified views.
    Bucket,
}

impl CategoricalField {
    pub fn name(self) -> &'static str {
        match self {
            CategoricalField::Id => "GEOID",
            CategoricalField::State => "State",
            CategoricalField::StateAbbr => "StateAbbr",
            CategoricalField::County => "County",
            CategoricalField::Type => "Type",
            CategoricalField::SpecialPopulation => "SpecialPopulation",
            CategoricalField::Bucket => "Bucket",
        }
    }
}

/// Numeric and boolean (1.0/0.0) values a report can aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumericField {
    ResilienceScore,
    Burden,
    Residual,
    Population,
    PovertyRate,
    MedianFamilyIncome,
    GroupQuartersPct,
    Urban,
    Rural,
    Lila(LilaDefinition),
    LowIncome,
    PctWhite,
    PctBlack,
    PctAsian,
    PctHispanic,
    SnapRate,
    NoVehicleFarRate,
    Latitude,
    Longitude,
    /// Only set on classified views.
    Resilient,
    /// Only set on classified views.
    Vulnerable,
}

impl NumericField {
    pub fn name(self) -> &'static str {
        match self {
            NumericField::ResilienceScore => "resilience_score",
            NumericField::Burden => "burden",
            NumericField::Residual => "resid",
            NumericField::Population => "Pop2010",
            NumericField::PovertyRate => "PovertyRate",
            NumericField::MedianFamilyIncome => "MedianFamilyIncome",
            NumericField::GroupQuartersPct => "PCTGQTRS",
            NumericField::Urban => "Urban",
            NumericField::Rural => "Rural",
            NumericField::Lila(definition) => definition.column(),
            NumericField::LowIncome => "LowIncomeTracts",
            NumericField::PctWhite => "pct_white",
            NumericField::PctBlack => "pct_black",
            NumericField::PctAsian => "pct_asian",
            NumericField::PctHispanic => "pct_hispanic",
            NumericField::SnapRate => "snap_rate",
            NumericField::NoVehicleFarRate => "no_vehicle_far",
            NumericField::Latitude => "latitude",
            NumericField::Longitude => "longitude",
            NumericField::Resilient => "resilient",
            NumericField::Vulnerable => "vulnerable",
        }
    }
}

/// Field access shared by tracts and classified views of them.
pub trait Fields {
    fn categorical(&self, field: CategoricalField) -> Option<String>;
    fn numeric(&self, field: NumericField) -> Option<f64>;
}

impl<T: Fields + ?Sized> Fields for &T {
    fn categorical(&self, field: CategoricalField) -> Option<String> {
        (**self).categorical(field)
    }

    fn numeric(&self, field: NumericField) -> Option<f64> {
        (**self).numeric(field)
    }
}

fn flag(value: Option<bool>) -> Option<f64> {
    value.map(|b| if b { 1.0 } else { 0.0 })
}

impl Fields for Tract {
    fn categorical(&self, field: CategoricalField) -> Option<String> {
        match field {
            CategoricalField::Id => Some(self.id.clone()),
            CategoricalField::State => self.state.clone(),
            CategoricalField::StateAbbr => self.state_abbr.clone(),
            CategoricalField::County => self.county.clone(),
            CategoricalField::Type => self.settlement().map(|s| s.to_string()),
            CategoricalField::SpecialPopulation => Some(self.special_population().to_string()),
            CategoricalField::Bucket => None,
        }
    }

    fn numeric(&self, field: NumericField) -> Option<f64> {
        match field {
            NumericField::ResilienceScore => Some(self.resilience_score),
            NumericField::Burden => Some(self.burden),
            NumericField::Residual => self.residual,
            NumericField::Population => self.population.map(|p| p as f64),
            NumericField::PovertyRate => self.poverty_rate,
            NumericField::MedianFamilyIncome => self.median_family_income,
            NumericField::GroupQuartersPct => self.group_quarters_pct,
            NumericField::Urban => flag(self.is_urban),
            NumericField::Rural => flag(self.is_urban.map(|u| !u)),
            NumericField::Lila(definition) => flag(self.lila_flag(definition)),
            NumericField::LowIncome => flag(self.low_income),
            NumericField::PctWhite => self.share_of_population(self.white),
            NumericField::PctBlack => self.share_of_population(self.black),
            NumericField::PctAsian => self.share_of_population(self.asian),
            NumericField::PctHispanic => self.share_of_population(self.hispanic),
            NumericField::SnapRate => self.snap_rate(),
            NumericField::NoVehicleFarRate => self.no_vehicle_far_rate(),
            NumericField::Latitude => self.latitude,
            NumericField::Longitude => self.longitude,
            NumericField::Resilient | NumericField::Vulnerable => None,
        }
    }
}

/// Attribute columns pulled from the atlas extract, in output order.
fn attribute_join_columns() -> Vec<&'static str> {
    use attribute_columns::*;

    let mut columns = vec![
        COUNTY,
        STATE,
        URBAN,
        POPULATION,
        POVERTY_RATE,
        MEDIAN_FAMILY_INCOME,
        GROUP_QUARTERS_PCT,
        LOW_INCOME,
        SNAP,
        WHITE,
        BLACK,
        ASIAN,
        HISPANIC,
        NO_VEHICLE_FAR,
    ];
    columns.extend(LilaDefinition::ALL.iter().map(|d| d.column()));
    columns
}

/// Reads numeric cells, coercing unparseable text to null the way the
/// atlas extract's "NULL" markers are.
struct RowReader<'a> {
    table: &'a Table,
    row: usize,
    coerced: &'a mut usize,
}

impl RowReader<'_> {
    fn text(&self, column: &str) -> Result<Option<String>> {
        Ok(self.table.value(self.row, column)?.map(str::to_string))
    }

    fn number(&mut self, column: &str) -> Result<Option<f64>> {
        let Some(raw) = self.table.value(self.row, column)? else {
            return Ok(None);
        };
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(Some(v)),
            _ => {
                *self.coerced += 1;
                debug!(column, value = raw, "Non-numeric cell read as null");
                Ok(None)
            }
        }
    }

    fn required_number(&self, column: &str) -> Result<f64> {
        let raw = self.table.value(self.row, column)?;
        raw.and_then(|r| r.parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .ok_or_else(|| AnalysisError::InvalidValue {
                table: self.table.name().to_string(),
                row: self.row,
                column: column.to_string(),
                value: raw.unwrap_or_default().to_string(),
            })
    }

    fn boolean(&mut self, column: &str) -> Result<Option<bool>> {
        Ok(self.number(column)?.map(|v| v != 0.0))
    }

    fn count(&mut self, column: &str) -> Result<Option<u64>> {
        match self.number(column)? {
            Some(v) if v < 0.0 => {
                *self.coerced += 1;
                debug!(column, value = v, "Negative count read as null");
                Ok(None)
            }
            v => Ok(v.map(|v| v.round() as u64)),
        }
    }
}

fn tract_from_row(table: &Table, row: usize, coerced: &mut usize) -> Result<Tract> {
    use attribute_columns as attr;
    use model_columns as model;

    let mut r = RowReader {
        table,
        row,
        coerced,
    };

    let mut lila = BTreeMap::new();
    for definition in LilaDefinition::ALL {
        if let Some(set) = r.boolean(definition.column())? {
            lila.insert(definition, set);
        }
    }

    let (latitude, longitude) = if table.has_column(centroid_columns::LATITUDE) {
        (
            r.number(centroid_columns::LATITUDE)?,
            r.number(centroid_columns::LONGITUDE)?,
        )
    } else {
        (None, None)
    };

    Ok(Tract {
        id: r.text(model::ID)?.unwrap_or_default(),
        state_abbr: r.text(model::STATE_ABBR)?,
        resilience_score: r.required_number(model::RESILIENCE_SCORE)?,
        burden: r.required_number(model::BURDEN)?,
        residual: r.number(model::RESIDUAL)?,
        county: r.text(attr::COUNTY)?,
        state: r.text(attr::STATE)?,
        is_urban: r.boolean(attr::URBAN)?,
        population: r.count(attr::POPULATION)?,
        poverty_rate: r.number(attr::POVERTY_RATE)?,
        median_family_income: r.number(attr::MEDIAN_FAMILY_INCOME)?,
        group_quarters_pct: r.number(attr::GROUP_QUARTERS_PCT)?,
        lila,
        low_income: r.boolean(attr::LOW_INCOME)?,
        snap: r.number(attr::SNAP)?,
        white: r.number(attr::WHITE)?,
        black: r.number(attr::BLACK)?,
        asian: r.number(attr::ASIAN)?,
        hispanic: r.number(attr::HISPANIC)?,
        no_vehicle_far: r.number(attr::NO_VEHICLE_FAR)?,
        latitude,
        longitude,
    })
}

/// Joins model results with tract attributes (and centroids, if given)
/// and builds one [`Tract`] per model row.
///
/// # Errors
///
/// Any join error, a missing model or attribute column, or a model row
/// whose score or burden is not a number.
#[tracing::instrument(skip_all, fields(model_rows = model.len(), attribute_rows = attributes.len()))]
pub fn load_tracts(model: &Table, attributes: &Table, centroids: Option<&Table>) -> Result<Vec<Tract>> {
    for column in [
        model_columns::STATE_ABBR,
        model_columns::RESILIENCE_SCORE,
        model_columns::BURDEN,
        model_columns::RESIDUAL,
    ] {
        model.column_index(column)?;
    }

    let attribute_cols = attribute_join_columns();
    let centroid_cols = [centroid_columns::LATITUDE, centroid_columns::LONGITUDE];

    let mut sources = vec![JoinSource {
        table: attributes,
        key: attribute_columns::ID,
        columns: &attribute_cols,
    }];
    if let Some(centroids) = centroids {
        sources.push(JoinSource {
            table: centroids,
            key: centroid_columns::ID,
            columns: &centroid_cols,
        });
    }

    let joined = left_join(model, model_columns::ID, &sources)?;

    let mut coerced = 0usize;
    let tracts = (0..joined.len())
        .map(|row| tract_from_row(&joined, row, &mut coerced))
        .collect::<Result<Vec<_>>>()?;

    let without_attributes = tracts.iter().filter(|t| t.county.is_none() && t.state.is_none()).count();
    info!(
        tracts = tracts.len(),
        without_attributes,
        coerced_cells = coerced,
        "Tracts loaded"
    );

    Ok(tracts)
}
