//! Row types for the two raw tables.
//!
//! Every field is `Option`-wrapped: nullability is expressed by the wrapper,
//! never by overloading a field's own value space. The one deliberately messy
//! field is visibility, which upstream sensors report either as meters or as a
//! textual error sentinel; it gets a two-variant enum under the `Option`.
//!
//! Field order matches the persisted CSV column order exactly.

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// First weather row id; ids are sequential per row before duplication.
pub const WEATHER_ID_BASE: i64 = 5001;
/// First traffic row id.
pub const TRAFFIC_ID_BASE: i64 = 9001;

/// The single city this feed simulates.
pub const CITY: &str = "London";

// =============================================================================
// CATEGORICAL VALUES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    /// Meteorological season for a calendar month (1-12).
    pub fn from_month(month: u32) -> Season {
        match month {
            12 | 1 | 2 => Season::Winter,
            3..=5 => Season::Spring,
            6..=8 => Season::Summer,
            _ => Season::Autumn,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WeatherCondition {
    Clear,
    Fog,
    Rain,
    Storm,
    Snow,
}

impl WeatherCondition {
    /// Conditions that slow traffic and raise accident probability.
    pub fn is_adverse(self) -> bool {
        matches!(
            self,
            WeatherCondition::Rain
                | WeatherCondition::Storm
                | WeatherCondition::Snow
                | WeatherCondition::Fog
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RoadCondition {
    Dry,
    Wet,
    Snowy,
    Damaged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

/// Districts the traffic sensors cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum District {
    Camden,
    Chelsea,
    Islington,
    Southwark,
    Kensington,
    Westminster,
    Greenwich,
}

impl District {
    pub const ALL: [District; 7] = [
        District::Camden,
        District::Chelsea,
        District::Islington,
        District::Southwark,
        District::Kensington,
        District::Westminster,
        District::Greenwich,
    ];
}

// =============================================================================
// VISIBILITY
// =============================================================================

/// A visibility reading: meters, or the raw sentinel a broken sensor emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Visibility {
    Meters(i64),
    Sentinel(String),
}

impl Visibility {
    pub fn meters(&self) -> Option<i64> {
        match self {
            Visibility::Meters(m) => Some(*m),
            Visibility::Sentinel(_) => None,
        }
    }
}

impl Serialize for Visibility {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Visibility::Meters(m) => serializer.serialize_i64(*m),
            Visibility::Sentinel(s) => serializer.serialize_str(s),
        }
    }
}

struct VisibilityVisitor;

impl<'de> Visitor<'de> for VisibilityVisitor {
    type Value = Visibility;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("visibility in meters or a textual sentinel")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Visibility, E> {
        Ok(Visibility::Meters(v))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Visibility, E> {
        Ok(Visibility::Meters(v as i64))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Visibility, E> {
        Ok(Visibility::Meters(v as i64))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Visibility, E> {
        match v.parse::<i64>() {
            Ok(m) => Ok(Visibility::Meters(m)),
            Err(_) => Ok(Visibility::Sentinel(v.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Visibility {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Visibility, D::Error> {
        deserializer.deserialize_any(VisibilityVisitor)
    }
}

// =============================================================================
// ROW TYPES
// =============================================================================

/// One synthetic weather observation, after defect injection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub weather_id: Option<i64>,
    pub date_time: Option<String>,
    pub city: Option<String>,
    pub season: Option<Season>,
    pub temperature_c: Option<f64>,
    pub humidity: Option<i64>,
    pub rain_mm: Option<f64>,
    pub weather_condition: Option<WeatherCondition>,
    pub wind_speed_kmh: Option<f64>,
    pub visibility_m: Option<Visibility>,
    pub air_pressure_hpa: Option<f64>,
}

/// One synthetic traffic observation, positionally paired with a weather row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficRecord {
    pub traffic_id: Option<i64>,
    pub date_time: Option<String>,
    pub city: Option<String>,
    pub area: Option<District>,
    pub vehicle_count: Option<i64>,
    pub road_condition: Option<RoadCondition>,
    pub avg_speed_kmh: Option<f64>,
    pub congestion_level: Option<CongestionLevel>,
    pub accident_count: Option<i64>,
    pub visibility_m: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_month_mapping() {
        assert_eq!(Season::from_month(12), Season::Winter);
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(2), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Spring);
        assert_eq!(Season::from_month(5), Season::Spring);
        assert_eq!(Season::from_month(6), Season::Summer);
        assert_eq!(Season::from_month(8), Season::Summer);
        assert_eq!(Season::from_month(9), Season::Autumn);
        assert_eq!(Season::from_month(11), Season::Autumn);
    }

    #[test]
    fn adverse_conditions() {
        assert!(WeatherCondition::Storm.is_adverse());
        assert!(WeatherCondition::Fog.is_adverse());
        assert!(!WeatherCondition::Clear.is_adverse());
    }

    #[test]
    fn visibility_csv_round_trip() {
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(vec![]);
        wtr.serialize((
            Visibility::Meters(8200),
            Visibility::Sentinel("unknown".into()),
        ))
        .unwrap();
        let bytes = wtr.into_inner().unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "8200,unknown\n");

        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader("8200,unknown\n".as_bytes());
        let row: (Visibility, Visibility) = rdr.deserialize().next().unwrap().unwrap();
        assert_eq!(row.0, Visibility::Meters(8200));
        assert_eq!(row.1, Visibility::Sentinel("unknown".into()));
    }

    #[test]
    fn nulled_fields_serialize_to_empty_cells() {
        let record = WeatherRecord {
            weather_id: Some(5001),
            date_time: Some("2024-01-01 00:00".into()),
            city: None,
            season: Some(Season::Winter),
            temperature_c: None,
            humidity: Some(61),
            rain_mm: Some(0.0),
            weather_condition: Some(WeatherCondition::Clear),
            wind_speed_kmh: Some(12.5),
            visibility_m: None,
            air_pressure_hpa: Some(1011.3),
        };
        let mut wtr = csv::Writer::from_writer(vec![]);
        wtr.serialize(&record).unwrap();
        let text = String::from_utf8(wtr.into_inner().unwrap()).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "weather_id,date_time,city,season,temperature_c,humidity,rain_mm,\
             weather_condition,wind_speed_kmh,visibility_m,air_pressure_hpa"
        );
        assert_eq!(
            lines.next().unwrap(),
            "5001,2024-01-01 00:00,,Winter,,61,0.0,Clear,12.5,,1011.3"
        );
    }
}
