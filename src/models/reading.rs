use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Environmental attributes a reading carries, in advisory order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Attribute {
    N,
    P,
    K,
    #[serde(rename = "temperature")]
    Temperature,
    #[serde(rename = "humidity")]
    Humidity,
    #[serde(rename = "soilMoisture")]
    SoilMoisture,
}

impl Attribute {
    pub const ALL: [Attribute; 6] = [
        Attribute::N,
        Attribute::P,
        Attribute::K,
        Attribute::Temperature,
        Attribute::Humidity,
        Attribute::SoilMoisture,
    ];

    /// Attributes a crop profile carries ranges for.
    pub const CROP_RANGED: [Attribute; 5] = [
        Attribute::N,
        Attribute::P,
        Attribute::K,
        Attribute::Temperature,
        Attribute::Humidity,
    ];

    /// Key used on the wire by the sensor API and model schema.
    pub fn key(&self) -> &'static str {
        match self {
            Attribute::N => "N",
            Attribute::P => "P",
            Attribute::K => "K",
            Attribute::Temperature => "temperature",
            Attribute::Humidity => "humidity",
            Attribute::SoilMoisture => "soilMoisture",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.key() == key)
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Attribute::N => "Nitrogen",
            Attribute::P => "Phosphorus",
            Attribute::K => "Potassium",
            Attribute::Temperature => "Temperature",
            Attribute::Humidity => "Humidity",
            Attribute::SoilMoisture => "Soil Moisture",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Attribute::N | Attribute::P | Attribute::K => "",
            Attribute::Temperature => "°C",
            Attribute::Humidity | Attribute::SoilMoisture => "%",
        }
    }

    /// Decimal places used whenever a value of this attribute is shown.
    pub fn precision(&self) -> usize {
        match self {
            Attribute::N | Attribute::P | Attribute::K => 2,
            _ => 0,
        }
    }

    pub fn format_value(&self, value: f64) -> String {
        format!("{:.*}{}", self.precision(), value, self.unit())
    }
}

impl std::fmt::Display for Attribute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SensorReading {
    #[serde(rename = "N", deserialize_with = "deserialize_lenient_f64")]
    pub n: f64,
    #[serde(rename = "P", deserialize_with = "deserialize_lenient_f64")]
    pub p: f64,
    #[serde(rename = "K", deserialize_with = "deserialize_lenient_f64")]
    pub k: f64,
    #[serde(deserialize_with = "deserialize_lenient_f64")]
    pub temperature: f64,
    #[serde(deserialize_with = "deserialize_lenient_f64")]
    pub humidity: f64,
    #[serde(deserialize_with = "deserialize_lenient_f64")]
    pub soil_moisture: f64,
}

impl SensorReading {
    pub fn value(&self, attribute: Attribute) -> f64 {
        match attribute {
            Attribute::N => self.n,
            Attribute::P => self.p,
            Attribute::K => self.k,
            Attribute::Temperature => self.temperature,
            Attribute::Humidity => self.humidity,
            Attribute::SoilMoisture => self.soil_moisture,
        }
    }
}

/// A reading as returned by the history endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimestampedReading {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub reading: SensorReading,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(f64),
    Text(String),
}

/// Sensor collaborators are not consistent about numeric encoding; some
/// emit fixed-decimal strings ("23.47"). Both are accepted, non-finite values
/// are not.
pub fn deserialize_lenient_f64<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let value = match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n,
        NumberOrString::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| D::Error::custom(format!("invalid numeric value '{}'", s)))?,
    };
    if !value.is_finite() {
        return Err(D::Error::custom("numeric value must be finite"));
    }
    Ok(value)
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            // Naive SQL-style timestamps are stored in UTC
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| D::Error::custom(format!("unrecognised timestamp '{}'", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn reading_accepts_numbers_and_numeric_strings() {
        let json = r#"{"N": 50, "P": "30.5", "K": 20, "temperature": "25.12",
                       "humidity": 50, "soilMoisture": 35}"#;
        let reading: SensorReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.n, 50.0);
        assert_eq!(reading.p, 30.5);
        assert_eq!(reading.temperature, 25.12);
        assert_eq!(reading.value(Attribute::SoilMoisture), 35.0);
    }

    #[test]
    fn reading_rejects_missing_and_garbage_fields() {
        let missing = r#"{"N": 50, "P": 30, "K": 20, "temperature": 25, "humidity": 50}"#;
        assert!(serde_json::from_str::<SensorReading>(missing).is_err());

        let garbage = r#"{"N": "lots", "P": 30, "K": 20, "temperature": 25,
                          "humidity": 50, "soilMoisture": 35}"#;
        assert!(serde_json::from_str::<SensorReading>(garbage).is_err());

        let empty = "{}";
        assert!(serde_json::from_str::<SensorReading>(empty).is_err());
    }

    #[test]
    fn reading_serializes_with_wire_keys() {
        let reading = SensorReading {
            n: 1.0,
            p: 2.0,
            k: 3.0,
            temperature: 4.0,
            humidity: 5.0,
            soil_moisture: 6.0,
        };
        let value = serde_json::to_value(reading).unwrap();
        assert_eq!(value["N"], 1.0);
        assert_eq!(value["soilMoisture"], 6.0);
    }

    #[test]
    fn attribute_keys_round_trip() {
        for attribute in Attribute::ALL {
            assert_eq!(Attribute::from_key(attribute.key()), Some(attribute));
        }
        assert_eq!(Attribute::from_key("ph"), None);
    }

    #[test]
    fn attribute_formatting_precision() {
        assert_eq!(Attribute::N.format_value(50.0), "50.00");
        assert_eq!(Attribute::K.format_value(19.457), "19.46");
        assert_eq!(Attribute::Temperature.format_value(24.6), "25°C");
        assert_eq!(Attribute::Humidity.format_value(80.2), "80%");
    }

    #[test]
    fn timestamps_in_http_date_and_rfc3339() {
        let expected = Utc.with_ymd_and_hms(2026, 10, 19, 10, 0, 0).unwrap();
        assert_eq!(
            parse_timestamp("Mon, 19 Oct 2026 10:00:00 GMT"),
            Some(expected)
        );
        assert_eq!(parse_timestamp("2026-10-19T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-10-19 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn history_entry_flattens_reading() {
        let json = r#"{"id": 7, "N": 50, "P": 30, "K": 20, "temperature": 25,
                       "humidity": 50, "soilMoisture": 35,
                       "timestamp": "Mon, 19 Oct 2026 10:00:00 GMT"}"#;
        let entry: TimestampedReading = serde_json::from_str(json).unwrap();
        assert_eq!(entry.id, Some(7));
        assert_eq!(entry.reading.k, 20.0);
    }
}
