use serde::{Deserialize, Deserializer};
use std::io::Read;

/// One row of the room inventory export.
#[derive(Debug, Deserialize)]
pub(crate) struct InventoryRow {
    pub(crate) dormitory_id: String,
    pub(crate) dormitory_name: String,
    pub(crate) floor: i32,
    pub(crate) room: String,
    pub(crate) room_type: String,
    pub(crate) gender_policy: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) max_capacity: Option<String>,
    pub(crate) price_per_month: u32,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) status: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) amenities: Option<String>,
}

impl InventoryRow {
    pub(crate) fn amenity_list(&self) -> Vec<String> {
        self.amenities
            .as_deref()
            .map(|raw| {
                raw.split([';', '|'])
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// One row of the student roster export.
#[derive(Debug, Deserialize)]
pub(crate) struct RosterRow {
    pub(crate) student_id: String,
    pub(crate) name: String,
    #[serde(default)]
    pub(crate) email: String,
    #[serde(default)]
    pub(crate) phone: String,
    pub(crate) gender: String,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) academic_year: Option<String>,
    #[serde(default, deserialize_with = "empty_string_as_none")]
    pub(crate) faculty: Option<String>,
}

pub(crate) fn parse_inventory<R: Read>(reader: R) -> Result<Vec<InventoryRow>, csv::Error> {
    parse_rows(reader)
}

pub(crate) fn parse_roster<R: Read>(reader: R) -> Result<Vec<RosterRow>, csv::Error> {
    parse_rows(reader)
}

fn parse_rows<R, T>(reader: R) -> Result<Vec<T>, csv::Error>
where
    R: Read,
    T: for<'de> Deserialize<'de>,
{
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    csv_reader.deserialize::<T>().collect()
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
