//! Value types: tabular cells and snapshot parameters.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

const CLASS_TAG: &str = "$class";
const ENUM_TAG: &str = "$enum";
const FUNCTION_TAG: &str = "$function";

/// A single tabular cell: float, int, bool or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Text(String),
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Float(v) => write!(f, "{}", format_float(*v)),
            MetricValue::Int(v) => write!(f, "{v}"),
            MetricValue::Bool(v) => write!(f, "{v}"),
            MetricValue::Text(v) => f.write_str(v),
        }
    }
}

/// Shortest representation that parses back to the same `f64`.
pub(crate) fn format_float(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        let s = if v > 0.0 { "inf" } else { "-inf" };
        s.to_string()
    } else {
        format!("{v:?}")
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}
impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Float(v as f64)
    }
}
impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}
impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Int(v as i64)
    }
}
impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Int(v as i64)
    }
}
impl From<usize> for MetricValue {
    fn from(v: usize) -> Self {
        MetricValue::Int(v as i64)
    }
}
impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Bool(v)
    }
}
impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}
impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

/// Configuration mapping describing one experiment run.
pub type Variant = BTreeMap<String, ParamValue>;

/// Anything that can be written to a snapshot or a variant file.
///
/// The last three variants stand in for values that have no data
/// representation of their own: they carry a fully-qualified name and render
/// as `{"$class": ..}`, `{"$enum": ..}` and `{"$function": ..}` in structured
/// text. The derived serde representation is externally tagged, which is what
/// the binary format stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Seq(Vec<ParamValue>),
    Map(BTreeMap<String, ParamValue>),
    TypeRef(String),
    EnumRef(String),
    CallableRef(String),
}

impl ParamValue {
    /// Reference to the type `T` by its Rust path.
    pub fn type_of<T: ?Sized>() -> Self {
        ParamValue::TypeRef(std::any::type_name::<T>().to_string())
    }

    /// Reference to a function or closure by the path of its type.
    pub fn callable<F>(_f: &F) -> Self {
        ParamValue::CallableRef(std::any::type_name::<F>().to_string())
    }

    /// Reference to an enum value, named `<enum path>.<variant>`.
    pub fn enum_ref<E: fmt::Debug>(value: &E) -> Self {
        ParamValue::EnumRef(format!("{}.{:?}", std::any::type_name::<E>(), value))
    }

    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<ParamValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        ParamValue::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Render as JSON. Defined for every value: references become tag
    /// objects and non-finite floats become their string form.
    pub fn to_json(&self) -> Value {
        match self {
            ParamValue::Null => Value::Null,
            ParamValue::Bool(b) => Value::Bool(*b),
            ParamValue::Int(i) => Value::Number((*i).into()),
            ParamValue::Float(f) => Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_float(*f))),
            ParamValue::Str(s) => Value::String(s.clone()),
            ParamValue::Seq(items) => Value::Array(items.iter().map(ParamValue::to_json).collect()),
            ParamValue::Map(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ParamValue::TypeRef(name) => tagged(CLASS_TAG, name),
            ParamValue::EnumRef(name) => tagged(ENUM_TAG, name),
            ParamValue::CallableRef(name) => tagged(FUNCTION_TAG, name),
        }
    }

    /// Inverse of [`ParamValue::to_json`]; single-key tag objects decode back
    /// into references.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Null => ParamValue::Null,
            Value::Bool(b) => ParamValue::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ParamValue::Int(i),
                None => ParamValue::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => ParamValue::Str(s),
            Value::Array(items) => {
                ParamValue::Seq(items.into_iter().map(ParamValue::from_json).collect())
            }
            Value::Object(obj) => match untag(&obj) {
                Some(reference) => reference,
                None => ParamValue::Map(
                    obj.into_iter()
                        .map(|(k, v)| (k, ParamValue::from_json(v)))
                        .collect(),
                ),
            },
        }
    }
}

fn tagged(tag: &str, name: &str) -> Value {
    let mut obj = Map::new();
    obj.insert(tag.to_string(), Value::String(name.to_string()));
    Value::Object(obj)
}

fn untag(obj: &Map<String, Value>) -> Option<ParamValue> {
    if obj.len() != 1 {
        return None;
    }
    let (tag, name) = obj.iter().next()?;
    let name = name.as_str()?.to_string();
    match tag.as_str() {
        CLASS_TAG => Some(ParamValue::TypeRef(name)),
        ENUM_TAG => Some(ParamValue::EnumRef(name)),
        FUNCTION_TAG => Some(ParamValue::CallableRef(name)),
        _ => None,
    }
}

/// Render a variant as a JSON object with sorted keys.
pub fn variant_to_json(variant: &Variant) -> Value {
    Value::Object(
        variant
            .iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect(),
    )
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => f.write_str(s),
            ParamValue::Float(v) => f.write_str(&format_float(*v)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}
impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}
impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v as i64)
    }
}
impl From<u32> for ParamValue {
    fn from(v: u32) -> Self {
        ParamValue::Int(v as i64)
    }
}
impl From<u64> for ParamValue {
    fn from(v: u64) -> Self {
        i64::try_from(v)
            .map(ParamValue::Int)
            .unwrap_or(ParamValue::Float(v as f64))
    }
}
impl From<usize> for ParamValue {
    fn from(v: usize) -> Self {
        ParamValue::from(v as u64)
    }
}
impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}
impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v as f64)
    }
}
impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}
impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}
impl<T: Into<ParamValue>> From<Vec<T>> for ParamValue {
    fn from(v: Vec<T>) -> Self {
        ParamValue::Seq(v.into_iter().map(Into::into).collect())
    }
}
impl<T: Into<ParamValue>> From<Option<T>> for ParamValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(ParamValue::Null)
    }
}
impl<T: Into<ParamValue>> From<BTreeMap<String, T>> for ParamValue {
    fn from(v: BTreeMap<String, T>) -> Self {
        ParamValue::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}
impl From<MetricValue> for ParamValue {
    fn from(v: MetricValue) -> Self {
        match v {
            MetricValue::Float(f) => ParamValue::Float(f),
            MetricValue::Int(i) => ParamValue::Int(i),
            MetricValue::Bool(b) => ParamValue::Bool(b),
            MetricValue::Text(s) => ParamValue::Str(s),
        }
    }
}

/// Serde adapter storing an optional [`Variant`] as plain data, so config
/// files can write `batch_size: 5` instead of the tagged form.
pub mod plain_variant {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use serde_json::Value;

    use super::{variant_to_json, ParamValue, Variant};

    pub fn serialize<S: Serializer>(variant: &Option<Variant>, s: S) -> Result<S::Ok, S::Error> {
        match variant {
            Some(v) => variant_to_json(v).serialize(s),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Variant>, D::Error> {
        match Option::<Value>::deserialize(d)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Object(obj)) => Ok(Some(
                obj.into_iter()
                    .map(|(k, v)| (k, ParamValue::from_json(v)))
                    .collect(),
            )),
            Some(other) => Err(D::Error::custom(format!(
                "variant must be a mapping, got {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn learning_rate_schedule(step: u64) -> f64 {
        1.0 / (step as f64 + 1.0)
    }

    #[derive(Debug)]
    enum Optimizer {
        Adam,
    }

    #[test]
    fn float_formatting_round_trips() {
        for v in [0.1, 1.0 / 3.0, 1e-300, 123456789.125, -0.0] {
            let s = MetricValue::Float(v).to_string();
            assert_eq!(s.parse::<f64>().unwrap(), v);
        }
        assert_eq!(MetricValue::Float(f64::NAN).to_string(), "NaN");
        assert_eq!(MetricValue::Float(f64::NEG_INFINITY).to_string(), "-inf");
    }

    #[test]
    fn references_render_as_tags() {
        let v = ParamValue::map([
            ("schedule", ParamValue::callable(&learning_rate_schedule)),
            ("optimizer", ParamValue::enum_ref(&Optimizer::Adam)),
            ("dtype", ParamValue::type_of::<f32>()),
        ]);
        let json = v.to_json();
        assert!(json["schedule"]["$function"]
            .as_str()
            .unwrap()
            .ends_with("learning_rate_schedule"));
        assert!(json["optimizer"]["$enum"].as_str().unwrap().ends_with("Optimizer.Adam"));
        assert_eq!(json["dtype"]["$class"], "f32");
        assert_eq!(ParamValue::from_json(json), v);
    }

    #[test]
    fn non_finite_floats_become_strings() {
        let json = ParamValue::from(vec![f64::NAN, f64::INFINITY, 2.5]).to_json();
        assert_eq!(json, serde_json::json!(["NaN", "inf", 2.5]));
    }

    #[test]
    fn display_matches_json_for_containers() {
        let v = ParamValue::map([("a", 1), ("b", 2)]);
        assert_eq!(v.to_string(), r#"{"a":1,"b":2}"#);
        assert_eq!(ParamValue::from("text").to_string(), "text");
    }
}
