/*!
Payload model: the data kinds the pipeline produces and the two payload shapes
a snapshot can hold.
*/

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Result, StoreError};

/// A single JSON object (a flight, a train, a license offer, a feed).
pub type Record = Map<String, Value>;

/// Tag selecting which structural validator applies to a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Airport arrivals
    Flights,
    /// Train departures
    Trains,
    /// Second-hand taxi-license offers
    Licenses,
    /// Web ticker feed for the license market
    WebFeed,
    /// Cruise-port arrivals/departures summary
    Cruises,
    /// No structural guarantees
    Generic,
}

impl DataKind {
    pub const ALL: [DataKind; 6] = [
        DataKind::Flights,
        DataKind::Trains,
        DataKind::Licenses,
        DataKind::WebFeed,
        DataKind::Cruises,
        DataKind::Generic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            DataKind::Flights => "flights",
            DataKind::Trains => "trains",
            DataKind::Licenses => "licenses",
            DataKind::WebFeed => "web_feed",
            DataKind::Cruises => "cruises",
            DataKind::Generic => "generic",
        }
    }
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self> {
        DataKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                StoreError::config(format!(
                    "unknown data kind '{s}' (expected one of: flights, trains, licenses, web_feed, cruises, generic)"
                ))
            })
    }
}

/// Structured data a producer wants persisted.
///
/// Serializes to a JSON array of objects or a single JSON object, which is
/// exactly the on-disk snapshot format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    /// Ordered list of records ("list" artifacts)
    Sequence(Vec<Record>),
    /// Single structured record ("dict" artifacts)
    Record(Record),
}

impl Payload {
    /// Convert a raw JSON value, rejecting anything that is not one of the two shapes.
    ///
    /// # Errors
    /// * `StoreError::EmptyPayload` - for `null`
    /// * `StoreError::InvalidPayload` - for scalars or arrays holding non-objects
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Err(StoreError::empty("payload is null")),
            Value::Object(record) => Ok(Payload::Record(record)),
            Value::Array(items) => {
                let mut records = Vec::with_capacity(items.len());
                for (index, item) in items.into_iter().enumerate() {
                    match item {
                        Value::Object(record) => records.push(record),
                        other => {
                            return Err(StoreError::invalid_payload(format!(
                                "item {index} is a {}, expected an object",
                                value_type_name(&other)
                            )))
                        }
                    }
                }
                Ok(Payload::Sequence(records))
            }
            other => Err(StoreError::invalid_payload(format!(
                "payload is a {}, expected an array of objects or an object",
                value_type_name(&other)
            ))),
        }
    }

    /// Parse a payload from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Number of items reported when the payload is written: the sequence
    /// length, or 1 for a single record.
    pub fn item_count(&self) -> usize {
        match self {
            Payload::Sequence(records) => records.len(),
            Payload::Record(_) => 1,
        }
    }

    /// True for an empty sequence or an empty record.
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Sequence(records) => records.is_empty(),
            Payload::Record(record) => record.is_empty(),
        }
    }

    pub fn as_sequence(&self) -> Option<&[Record]> {
        match self {
            Payload::Sequence(records) => Some(records),
            Payload::Record(_) => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Payload::Record(record) => Some(record),
            Payload::Sequence(_) => None,
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            Payload::Sequence(_) => "sequence",
            Payload::Record(_) => "record",
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Payload::Sequence(records) => {
                Value::Array(records.iter().cloned().map(Value::Object).collect())
            }
            Payload::Record(record) => Value::Object(record.clone()),
        }
    }
}

pub(crate) fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_kind_parse_and_display() {
        for kind in DataKind::ALL {
            let parsed: DataKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert_eq!("web_feed".parse::<DataKind>().unwrap(), DataKind::WebFeed);
        assert!("webfeed".parse::<DataKind>().is_err());
    }

    #[test]
    fn test_data_kind_serde_names() {
        let json = serde_json::to_string(&DataKind::WebFeed).unwrap();
        assert_eq!(json, "\"web_feed\"");
        let kind: DataKind = serde_json::from_str("\"cruises\"").unwrap();
        assert_eq!(kind, DataKind::Cruises);
    }

    #[test]
    fn test_from_value_shapes() {
        let seq = Payload::from_value(json!([{"hora": "10:00"}, {"hora": "11:00"}])).unwrap();
        assert_eq!(seq.item_count(), 2);
        assert!(seq.as_sequence().is_some());

        let rec = Payload::from_value(json!({"ticker": {}})).unwrap();
        assert_eq!(rec.item_count(), 1);
        assert!(rec.as_record().is_some());
    }

    #[test]
    fn test_from_value_rejects_null() {
        let err = Payload::from_value(Value::Null).unwrap_err();
        assert!(matches!(err, StoreError::EmptyPayload(_)));
    }

    #[test]
    fn test_from_value_rejects_scalars_and_mixed_arrays() {
        let err = Payload::from_value(json!(42)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));

        let err = Payload::from_value(json!([{"a": 1}, "oops"])).unwrap_err();
        assert!(err.to_string().contains("item 1 is a string"));
    }

    #[test]
    fn test_empty_detection() {
        assert!(Payload::Sequence(vec![]).is_empty());
        assert!(Payload::Record(Record::new()).is_empty());
        assert!(!Payload::from_value(json!({"k": null})).unwrap().is_empty());
    }

    #[test]
    fn test_serializes_to_plain_json() {
        let payload = Payload::from_value(json!([{"nombre": "Costa Pacífica"}])).unwrap();
        let text = serde_json::to_string(&payload).unwrap();
        assert_eq!(text, r#"[{"nombre":"Costa Pacífica"}]"#);
        assert_eq!(payload.to_value(), json!([{"nombre": "Costa Pacífica"}]));
    }
}
