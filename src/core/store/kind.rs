//! Track kinds and the field schema each one carries.
//!
//! Ranking and defaulting logic only ever consults these tables, so adding a
//! kind means adding a descriptor here and nothing else.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Discovery,
    Market,
    Sentiment,
    Technical,
    Risk,
    Research,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldDefault {
    Number(f64),
    Text(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub default: FieldDefault,
    /// Inclusive clamp applied to numeric values.
    pub range: Option<(f64, f64)>,
}

impl FieldSpec {
    const fn number(name: &'static str, default: f64, range: Option<(f64, f64)>) -> Self {
        Self {
            name,
            default: FieldDefault::Number(default),
            range,
        }
    }

    const fn text(name: &'static str, default: &'static str) -> Self {
        Self {
            name,
            default: FieldDefault::Text(default),
            range: None,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self.default {
            FieldDefault::Number(_) => FieldType::Number,
            FieldDefault::Text(_) => FieldType::Text,
        }
    }

    fn default_value(&self) -> FieldValue {
        match self.default {
            FieldDefault::Number(n) => FieldValue::Number(n),
            FieldDefault::Text(s) => FieldValue::Text(s.to_string()),
        }
    }

    /// Coerce a raw producer value into this field, falling back to the default
    /// when the value has the wrong shape.
    fn coerce(&self, raw: Option<&Value>) -> FieldValue {
        match (self.field_type(), raw) {
            (FieldType::Number, Some(v)) => {
                let parsed = match v {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
                    _ => None,
                };
                match parsed.filter(|n| n.is_finite()) {
                    Some(n) => {
                        let n = match self.range {
                            Some((lo, hi)) => n.clamp(lo, hi),
                            None => n,
                        };
                        FieldValue::Number(n)
                    }
                    None => self.default_value(),
                }
            }
            (FieldType::Text, Some(Value::String(s))) => FieldValue::Text(s.clone()),
            (FieldType::Text, Some(Value::Number(n))) => FieldValue::Text(n.to_string()),
            (FieldType::Text, Some(Value::Bool(b))) => FieldValue::Text(b.to_string()),
            _ => self.default_value(),
        }
    }
}

#[derive(Debug)]
pub struct KindDescriptor {
    pub fields: &'static [FieldSpec],
    /// Field whose value stands in for "confidence" when tracks are compared.
    pub ranking_field: &'static str,
}

const UNIT: Option<(f64, f64)> = Some((0.0, 1.0));

static DISCOVERY: KindDescriptor = KindDescriptor {
    fields: &[FieldSpec::number("confidence", 0.0, UNIT)],
    ranking_field: "confidence",
};

static MARKET: KindDescriptor = KindDescriptor {
    fields: &[
        FieldSpec::number("confidence", 0.0, UNIT),
        FieldSpec::text("market_regime", ""),
    ],
    ranking_field: "confidence",
};

static SENTIMENT: KindDescriptor = KindDescriptor {
    fields: &[
        FieldSpec::number("sentiment_score", 0.0, Some((-1.0, 1.0))),
        FieldSpec::number("confidence", 0.0, UNIT),
        FieldSpec::text("source", ""),
    ],
    ranking_field: "confidence",
};

static TECHNICAL: KindDescriptor = KindDescriptor {
    fields: &[
        FieldSpec::number("signal_strength", 0.0, UNIT),
        FieldSpec::text("indicator", ""),
    ],
    ranking_field: "signal_strength",
};

static RISK: KindDescriptor = KindDescriptor {
    fields: &[
        FieldSpec::number("risk_score", 0.0, None),
        FieldSpec::text("risk_level", "unknown"),
    ],
    ranking_field: "risk_score",
};

static RESEARCH: KindDescriptor = KindDescriptor {
    fields: &[
        FieldSpec::number("confidence", 0.0, UNIT),
        FieldSpec::text("topic", ""),
    ],
    ranking_field: "confidence",
};

impl TrackKind {
    #[cfg(test)]
    pub const ALL: [TrackKind; 6] = [
        TrackKind::Discovery,
        TrackKind::Market,
        TrackKind::Sentiment,
        TrackKind::Technical,
        TrackKind::Risk,
        TrackKind::Research,
    ];

    pub fn descriptor(self) -> &'static KindDescriptor {
        match self {
            TrackKind::Discovery => &DISCOVERY,
            TrackKind::Market => &MARKET,
            TrackKind::Sentiment => &SENTIMENT,
            TrackKind::Technical => &TECHNICAL,
            TrackKind::Risk => &RISK,
            TrackKind::Research => &RESEARCH,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TrackKind::Discovery => "discovery",
            TrackKind::Market => "market",
            TrackKind::Sentiment => "sentiment",
            TrackKind::Technical => "technical",
            TrackKind::Risk => "risk",
            TrackKind::Research => "research",
        }
    }

    pub fn field(self, name: &str) -> Option<&'static FieldSpec> {
        self.descriptor().fields.iter().find(|f| f.name == name)
    }

    pub fn ranking_field(self) -> &'static str {
        self.descriptor().ranking_field
    }

    pub fn has_numeric_field(self, name: &str) -> bool {
        self.field(name)
            .is_some_and(|f| f.field_type() == FieldType::Number)
    }

    /// Split raw producer fields into the typed schema fields of this kind and
    /// whatever is left over. Missing or malformed schema fields get defaults.
    pub fn normalize_fields(
        self,
        raw: &Map<String, Value>,
    ) -> (BTreeMap<String, FieldValue>, Map<String, Value>) {
        let descriptor = self.descriptor();
        let mut typed = BTreeMap::new();
        for spec in descriptor.fields {
            typed.insert(spec.name.to_string(), spec.coerce(raw.get(spec.name)));
        }
        let extra = raw
            .iter()
            .filter(|(k, _)| self.field(k).is_none())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        (typed, extra)
    }
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Number(f64),
    Text(String),
}

impl FieldValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn raw(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn every_ranking_field_is_numeric() {
        for kind in TrackKind::ALL {
            assert!(
                kind.has_numeric_field(kind.ranking_field()),
                "{kind} ranks by a non-numeric field"
            );
        }
    }

    #[test]
    fn kind_names_roundtrip() {
        for kind in TrackKind::ALL {
            let parsed: TrackKind = serde_json::from_value(json!(kind.as_str())).unwrap();
            assert_eq!(parsed, kind);
        }
        assert!(serde_json::from_value::<TrackKind>(json!("weather")).is_err());
    }

    #[test]
    fn missing_fields_get_kind_defaults() {
        let (typed, extra) = TrackKind::Risk.normalize_fields(&Map::new());
        assert_eq!(typed["risk_score"], FieldValue::Number(0.0));
        assert_eq!(typed["risk_level"], FieldValue::Text("unknown".into()));
        assert!(extra.is_empty());
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let (typed, _) = TrackKind::Discovery.normalize_fields(&raw(json!({"confidence": 1.7})));
        assert_eq!(typed["confidence"].as_f64(), Some(1.0));
        let (typed, _) = TrackKind::Discovery.normalize_fields(&raw(json!({"confidence": -3})));
        assert_eq!(typed["confidence"].as_f64(), Some(0.0));
    }

    #[test]
    fn malformed_values_fall_back_instead_of_failing() {
        let (typed, _) = TrackKind::Sentiment.normalize_fields(&raw(json!({
            "confidence": "0.65",
            "sentiment_score": {"nested": true},
            "source": 42
        })));
        assert_eq!(typed["confidence"].as_f64(), Some(0.65));
        assert_eq!(typed["sentiment_score"].as_f64(), Some(0.0));
        assert_eq!(typed["source"], FieldValue::Text("42".into()));
    }

    #[test]
    fn unknown_fields_are_returned_as_extras() {
        let (typed, extra) = TrackKind::Technical.normalize_fields(&raw(json!({
            "signal_strength": 0.4,
            "rsi": 71.2
        })));
        assert_eq!(typed.len(), 2);
        assert_eq!(extra.get("rsi"), Some(&json!(71.2)));
    }
}
