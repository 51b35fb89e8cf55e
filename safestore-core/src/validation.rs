/*!
Structural validators, one per data kind.

A validator only checks that a payload has the minimum shape of a usable
artifact. Whether it is the *best* data available is a separate concern
handled by the writer's comparison against the previous snapshot.
*/

use serde_json::Value;

use crate::payload::{value_type_name, DataKind, Payload, Record};

/// Outcome of a structural check: `Err` carries a human-readable reason.
pub type Verdict = std::result::Result<(), String>;

/// Per-kind structural check.
pub trait PayloadValidator: Send + Sync {
    /// The data kind this validator guards
    fn kind(&self) -> DataKind;

    /// Check the payload, returning the failure reason if it is malformed
    fn validate(&self, payload: &Payload) -> Verdict;
}

/// Sequence whose first `sample` records must carry non-empty `fields`.
#[derive(Debug, Clone)]
pub struct RequiredFieldsValidator {
    kind: DataKind,
    noun: &'static str,
    fields: &'static [&'static str],
    sample: usize,
}

impl RequiredFieldsValidator {
    pub const fn new(
        kind: DataKind,
        noun: &'static str,
        fields: &'static [&'static str],
        sample: usize,
    ) -> Self {
        Self {
            kind,
            noun,
            fields,
            sample,
        }
    }
}

impl PayloadValidator for RequiredFieldsValidator {
    fn kind(&self) -> DataKind {
        self.kind
    }

    fn validate(&self, payload: &Payload) -> Verdict {
        let records = expect_sequence(payload, self.kind)?;
        if records.is_empty() {
            return Err(format!("{} list is empty", self.noun));
        }
        for (index, record) in records.iter().take(self.sample).enumerate() {
            if let Some(field) = first_missing(record, self.fields) {
                return Err(format!("{} {index} is missing '{field}'", self.noun));
            }
        }
        Ok(())
    }
}

/// License offers: at least `min_offers` records.
#[derive(Debug, Clone)]
pub struct LicenseValidator {
    min_offers: usize,
}

impl LicenseValidator {
    pub const fn new(min_offers: usize) -> Self {
        Self { min_offers }
    }
}

impl PayloadValidator for LicenseValidator {
    fn kind(&self) -> DataKind {
        DataKind::Licenses
    }

    fn validate(&self, payload: &Payload) -> Verdict {
        let records = expect_sequence(payload, DataKind::Licenses)?;
        if records.is_empty() {
            return Err("license list is empty".to_string());
        }
        if records.len() < self.min_offers {
            return Err(format!(
                "only {} offers (expected at least {})",
                records.len(),
                self.min_offers
            ));
        }
        Ok(())
    }
}

/// Web ticker feed: fixed top-level keys and a positive current price.
#[derive(Debug, Clone, Default)]
pub struct WebFeedValidator;

impl WebFeedValidator {
    const REQUIRED_KEYS: [&'static str; 4] = ["ticker", "charts", "market_depth", "updated_at"];
}

impl PayloadValidator for WebFeedValidator {
    fn kind(&self) -> DataKind {
        DataKind::WebFeed
    }

    fn validate(&self, payload: &Payload) -> Verdict {
        let record = expect_record(payload, DataKind::WebFeed)?;
        if let Some(key) = first_absent(record, &Self::REQUIRED_KEYS) {
            return Err(format!("missing key '{key}'"));
        }

        let price = record
            .get("ticker")
            .and_then(Value::as_object)
            .and_then(|ticker| ticker.get("current_price"));
        if let Some(price) = price {
            match price.as_f64() {
                Some(p) if p > 0.0 => {}
                Some(_) => return Err("ticker.current_price is zero or negative".to_string()),
                None => {
                    return Err(format!(
                        "ticker.current_price is a {}, expected a number",
                        value_type_name(price)
                    ))
                }
            }
        }
        Ok(())
    }
}

/// Cruise summary: arrivals and departures lists plus summary and metadata.
#[derive(Debug, Clone)]
pub struct CruiseValidator {
    sample: usize,
}

impl CruiseValidator {
    const REQUIRED_KEYS: [&'static str; 4] = ["llegadas", "salidas", "resumen", "metadata"];
    const ENTRY_FIELDS: [&'static str; 2] = ["hora", "nombre"];

    pub const fn new(sample: usize) -> Self {
        Self { sample }
    }

    fn check_entries(&self, record: &Record, key: &str, label: &str) -> Verdict {
        let entries = record
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| format!("'{key}' is not a list"))?;

        for (index, entry) in entries.iter().take(self.sample).enumerate() {
            let entry = entry
                .as_object()
                .ok_or_else(|| format!("cruise {label} {index} is not an object"))?;
            if let Some(field) = first_missing(entry, &Self::ENTRY_FIELDS) {
                return Err(format!("cruise {label} {index} is missing '{field}'"));
            }
        }
        Ok(())
    }
}

impl PayloadValidator for CruiseValidator {
    fn kind(&self) -> DataKind {
        DataKind::Cruises
    }

    fn validate(&self, payload: &Payload) -> Verdict {
        let record = expect_record(payload, DataKind::Cruises)?;
        if let Some(key) = first_absent(record, &Self::REQUIRED_KEYS) {
            return Err(format!("missing key '{key}'"));
        }
        // Both lists must be checked for shape before either is sampled.
        for key in ["llegadas", "salidas"] {
            if !record.get(key).is_some_and(Value::is_array) {
                return Err(format!("'{key}' is not a list"));
            }
        }
        self.check_entries(record, "llegadas", "arrival")?;
        self.check_entries(record, "salidas", "departure")
    }
}

/// Accepts everything.
#[derive(Debug, Clone, Default)]
pub struct GenericValidator;

impl PayloadValidator for GenericValidator {
    fn kind(&self) -> DataKind {
        DataKind::Generic
    }

    fn validate(&self, _payload: &Payload) -> Verdict {
        Ok(())
    }
}

static FLIGHTS: RequiredFieldsValidator =
    RequiredFieldsValidator::new(DataKind::Flights, "flight", &["hora", "terminal"], 5);
static TRAINS: RequiredFieldsValidator =
    RequiredFieldsValidator::new(DataKind::Trains, "train", &["hora", "tren"], 5);
static LICENSES: LicenseValidator = LicenseValidator::new(3);
static WEB_FEED: WebFeedValidator = WebFeedValidator;
static CRUISES: CruiseValidator = CruiseValidator::new(3);
static GENERIC: GenericValidator = GenericValidator;

/// The fixed validator for a data kind.
pub fn validator_for(kind: DataKind) -> &'static dyn PayloadValidator {
    match kind {
        DataKind::Flights => &FLIGHTS,
        DataKind::Trains => &TRAINS,
        DataKind::Licenses => &LICENSES,
        DataKind::WebFeed => &WEB_FEED,
        DataKind::Cruises => &CRUISES,
        DataKind::Generic => &GENERIC,
    }
}

/// Run the structural validator for `kind` against `payload`.
pub fn validate(kind: DataKind, payload: &Payload) -> Verdict {
    validator_for(kind).validate(payload)
}

/// Truthiness as the producers understand it: null, `false`, zero and empty
/// strings/lists/objects all count as "no value".
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn expect_sequence(payload: &Payload, kind: DataKind) -> std::result::Result<&[Record], String> {
    payload
        .as_sequence()
        .ok_or_else(|| format!("{kind} payload must be a list of records, got a single record"))
}

fn expect_record(payload: &Payload, kind: DataKind) -> std::result::Result<&Record, String> {
    payload
        .as_record()
        .ok_or_else(|| format!("{kind} payload must be a single record, got a list"))
}

fn first_missing<'a>(record: &Record, fields: &[&'a str]) -> Option<&'a str> {
    fields
        .iter()
        .copied()
        .find(|field| !record.get(*field).is_some_and(is_truthy))
}

fn first_absent<'a>(record: &Record, keys: &[&'a str]) -> Option<&'a str> {
    keys.iter().copied().find(|key| !record.contains_key(*key))
}
