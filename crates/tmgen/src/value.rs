//! printable values
//!
//! Globals and `eval` results are printed as yaml or json. [Value] keeps object keys in evaluation
//! order and tells integers apart from decimals, so `1` is never printed as `1.0`.
//!
//! The output model has the following data types
//! - null
//! - boolean (true/false)
//! - integer (signed, i64)
//! - decimal (f64, also used for integers that do not fit an i64)
//! - string (utf-8)
//! - array ("list" of values)
//! - object (order-preserving "map", where the key is of type string)
use indexmap::IndexMap;
use serde::{Serialize, Serializer};

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Decimal(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Object from evaluated entries, e.g. the globals of a stack
    pub fn object<K: Into<String>>(entries: impl IntoIterator<Item = (K, hcl::Value)>) -> Self {
        Value::Object(
            entries
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }

    fn number(number: &hcl::Number) -> Self {
        number
            .as_i64()
            .map(Value::Integer)
            .or_else(|| number.as_f64().map(Value::Decimal))
            .unwrap_or(Value::Null)
    }
}

impl From<hcl::Value> for Value {
    fn from(value: hcl::Value) -> Self {
        match value {
            hcl::Value::Null => Value::Null,
            hcl::Value::Bool(boolean) => Value::Boolean(boolean),
            hcl::Value::Number(number) => Value::number(&number),
            hcl::Value::String(string) => Value::String(string),
            hcl::Value::Array(values) => Value::Array(values.into_iter().map(Value::from).collect()),
            hcl::Value::Object(object) => Value::object(object),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(boolean) => serializer.serialize_bool(*boolean),
            Value::Integer(integer) => serializer.serialize_i64(*integer),
            Value::Decimal(decimal) => serializer.serialize_f64(*decimal),
            Value::String(string) => serializer.serialize_str(string),
            Value::Array(values) => serializer.collect_seq(values),
            Value::Object(object) => serializer.collect_map(object),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn globals_as_json() {
        let mut globals = hcl::value::Map::new();
        globals.insert("name".to_string(), hcl::Value::from("stack"));
        globals.insert("count".to_string(), hcl::Value::Number(hcl::Number::from(2u64)));
        globals.insert("nothing".to_string(), hcl::Value::Null);
        globals.insert(
            "tags".to_string(),
            hcl::Value::Array(vec![hcl::Value::Bool(true)]),
        );

        assert_eq!(
            serde_json::to_string(&Value::object(globals)).unwrap(),
            r#"{"name":"stack","count":2,"nothing":null,"tags":[true]}"#
        );
    }

    #[test]
    fn globals_as_yaml() {
        let mut globals = hcl::value::Map::new();
        globals.insert("env".to_string(), hcl::Value::from("prod"));
        globals.insert("ratio".to_string(), hcl::Value::Number(hcl::Number::from_f64(0.5).unwrap()));

        assert_eq!(
            serde_yaml::to_string(&Value::object(globals)).unwrap(),
            "env: prod\nratio: 0.5\n"
        );
    }

    #[test]
    fn numbers() {
        assert_eq!(Value::number(&hcl::Number::from(7u64)), Value::Integer(7));
        assert_eq!(
            Value::number(&hcl::Number::from(u64::MAX)),
            Value::Decimal(u64::MAX as f64)
        );
    }
}
