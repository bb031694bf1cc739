use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::Write as _;
use std::str::FromStr;

use crate::error::TypeError;

/// Type tag of an item field.
///
/// The discriminants are the integer tags used by the pool producer, so the
/// schema descriptor and the per-field `"type"` entries of a pool line can be
/// read as either integers or names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FieldType {
    /// Scalar 64-bit signed integer
    Int64 = 0,
    /// Scalar floating point number
    Float32 = 1,
    /// Scalar UTF-8 string
    String = 2,
    /// Ordered list of 64-bit signed integers
    Int64List = 3,
    /// Ordered list of floating point numbers
    Float32List = 4,
    /// Ordered list of strings
    StringList = 5,
}

impl FieldType {
    /// All field types in tag order
    pub const ALL: [FieldType; 6] = [
        FieldType::Int64,
        FieldType::Float32,
        FieldType::String,
        FieldType::Int64List,
        FieldType::Float32List,
        FieldType::StringList,
    ];

    /// Integer wire tag
    pub const fn tag(self) -> u8 {
        self as u8
    }

    /// Resolve an integer wire tag
    pub fn from_tag(tag: i64) -> Result<Self, TypeError> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| i64::from(t.tag()) == tag)
            .ok_or_else(|| TypeError::UnknownFieldType { tag: tag.to_string() })
    }

    /// Get the type name as a string
    pub const fn type_name(self) -> &'static str {
        match self {
            FieldType::Int64 => "Int64",
            FieldType::Float32 => "Float32",
            FieldType::String => "String",
            FieldType::Int64List => "Int64List",
            FieldType::Float32List => "Float32List",
            FieldType::StringList => "StringList",
        }
    }

    /// Whether values of this type are ordered lists of scalars
    pub const fn is_list(self) -> bool {
        matches!(self, FieldType::Int64List | FieldType::Float32List | FieldType::StringList)
    }

    /// Whether values of this type (or its elements) are numeric
    pub const fn is_numeric(self) -> bool {
        !matches!(self, FieldType::String | FieldType::StringList)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

impl FromStr for FieldType {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(tag) = normalized.parse::<i64>() {
            return Self::from_tag(tag);
        }
        match normalized.as_str() {
            "int64" | "int64type" => Ok(FieldType::Int64),
            "float32" | "float32type" | "float" => Ok(FieldType::Float32),
            "string" | "stringtype" => Ok(FieldType::String),
            "int64list" | "int64s" | "int64stype" => Ok(FieldType::Int64List),
            "float32list" | "float32s" | "float32stype" | "floats" => Ok(FieldType::Float32List),
            "stringlist" | "strings" | "stringstype" => Ok(FieldType::StringList),
            _ => Err(TypeError::UnknownFieldType { tag: s.to_string() }),
        }
    }
}

impl Serialize for FieldType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.tag())
    }
}

impl<'de> Deserialize<'de> for FieldType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawTag {
            Tag(i64),
            Name(String),
        }

        match RawTag::deserialize(deserializer)? {
            RawTag::Tag(tag) => FieldType::from_tag(tag),
            RawTag::Name(name) => name.parse(),
        }
        .map_err(serde::de::Error::custom)
    }
}

/// A typed field value, one variant per `FieldType`.
///
/// `Float32` values are carried at `f64` precision exactly as parsed so that
/// comparisons behave like the double-precision comparisons of the producer.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// Scalar integer
    Int64(i64),
    /// Scalar float
    Float32(f64),
    /// Scalar string
    String(String),
    /// List of integers
    Int64List(Vec<i64>),
    /// List of floats
    Float32List(Vec<f64>),
    /// List of strings
    StringList(Vec<String>),
}

impl FieldValue {
    /// The `FieldType` this value inhabits
    pub const fn field_type(&self) -> FieldType {
        match self {
            FieldValue::Int64(_) => FieldType::Int64,
            FieldValue::Float32(_) => FieldType::Float32,
            FieldValue::String(_) => FieldType::String,
            FieldValue::Int64List(_) => FieldType::Int64List,
            FieldValue::Float32List(_) => FieldType::Float32List,
            FieldValue::StringList(_) => FieldType::StringList,
        }
    }

    /// Decode a JSON value according to a declared field type.
    ///
    /// Integers must be JSON integers; floats accept any JSON number.
    pub fn from_json(field_type: FieldType, value: &serde_json::Value) -> Result<Self, TypeError> {
        let invalid = || TypeError::InvalidValue {
            expected: field_type,
            found: describe_json(value),
        };

        match field_type {
            FieldType::Int64 => value.as_i64().map(FieldValue::Int64).ok_or_else(invalid),
            FieldType::Float32 => value.as_f64().map(FieldValue::Float32).ok_or_else(invalid),
            FieldType::String => {
                value.as_str().map(|s| FieldValue::String(s.to_string())).ok_or_else(invalid)
            }
            FieldType::Int64List => value
                .as_array()
                .and_then(|arr| {
                    arr.iter().map(serde_json::Value::as_i64).collect::<Option<Vec<_>>>()
                })
                .map(FieldValue::Int64List)
                .ok_or_else(invalid),
            FieldType::Float32List => value
                .as_array()
                .and_then(|arr| {
                    arr.iter().map(serde_json::Value::as_f64).collect::<Option<Vec<_>>>()
                })
                .map(FieldValue::Float32List)
                .ok_or_else(invalid),
            FieldType::StringList => value
                .as_array()
                .and_then(|arr| {
                    arr.iter().map(|v| v.as_str().map(str::to_string)).collect::<Option<Vec<_>>>()
                })
                .map(FieldValue::StringList)
                .ok_or_else(invalid),
        }
    }

    /// Scalar numeric view, `None` for strings and lists
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int64(i) => Some(*i as f64),
            FieldValue::Float32(f) => Some(*f),
            _ => None,
        }
    }

    /// Render the value as one string, joining list elements with `,` in list order.
    ///
    /// Numbers use the same textual form as the score files.
    pub fn flatten(&self) -> String {
        match self {
            FieldValue::Int64(i) => i.to_string(),
            FieldValue::Float32(f) => format_float(*f),
            FieldValue::String(s) => s.clone(),
            FieldValue::Int64List(list) => {
                list.iter().map(i64::to_string).collect::<Vec<_>>().join(",")
            }
            FieldValue::Float32List(list) => {
                list.iter().map(|f| format_float(*f)).collect::<Vec<_>>().join(",")
            }
            FieldValue::StringList(list) => list.join(","),
        }
    }

    /// Whether this value equals (scalar) or contains (list) an indexed value.
    ///
    /// Float values never match: they are not indexable.
    pub fn matches(&self, key: &IndexValue) -> bool {
        match (self, key) {
            (FieldValue::Int64(v), IndexValue::Int(k)) => v == k,
            (FieldValue::String(v), IndexValue::Str(k)) => v == k,
            (FieldValue::Int64List(list), IndexValue::Int(k)) => list.contains(k),
            (FieldValue::StringList(list), IndexValue::Str(k)) => list.iter().any(|v| v == k),
            _ => false,
        }
    }
}

fn describe_json(value: &serde_json::Value) -> String {
    let rendered = value.to_string();
    if rendered.len() > 32 {
        let mut cut = 32;
        while !rendered.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}...", &rendered[..cut])
    } else {
        rendered
    }
}

/// Characters that delimit keys and key components in index files; a string
/// containing one cannot be written as a key.
pub const KEY_RESERVED: [char; 4] = ['\t', '\n', '\r', '|'];

/// A value usable as a posting-list key.
///
/// Only integers and strings are indexable; ordering is numeric for integers and
/// byte-wise for strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum IndexValue {
    /// Integer key
    Int(i64),
    /// String key
    Str(String),
}

impl fmt::Display for IndexValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexValue::Int(i) => write!(f, "{}", i),
            IndexValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<&str> for IndexValue {
    fn from(value: &str) -> Self {
        IndexValue::Str(value.to_string())
    }
}

impl From<i64> for IndexValue {
    fn from(value: i64) -> Self {
        IndexValue::Int(value)
    }
}

/// Format a float the way the pool producer prints floats.
///
/// Shortest round-trip digits; integral values keep a trailing `.0`; scientific
/// notation with a signed two-digit exponent when the decimal exponent is below
/// -4 or at least 16.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let scientific = format!("{:e}", value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let Ok(exponent) = exponent.parse::<i32>() else {
        return scientific;
    };
    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa),
    };
    let digits: String = mantissa.chars().filter(|c| *c != '.').collect();

    let mut out = String::with_capacity(digits.len() + 8);
    if negative {
        out.push('-');
    }

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let point = exponent as usize + 1;
            if digits.len() <= point {
                out.push_str(&digits);
                out.extend(std::iter::repeat_n('0', point - digits.len()));
                out.push_str(".0");
            } else {
                out.push_str(&digits[..point]);
                out.push('.');
                out.push_str(&digits[point..]);
            }
        } else {
            out.push_str("0.");
            out.extend(std::iter::repeat_n('0', (-exponent - 1) as usize));
            out.push_str(&digits);
        }
    } else {
        out.push_str(&digits[..1]);
        if digits.len() > 1 {
            out.push('.');
            out.push_str(&digits[1..]);
        }
        let sign = if exponent < 0 { '-' } else { '+' };
        let _ = write!(out, "e{}{:02}", sign, exponent.abs());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_type_tags_round_trip() {
        for field_type in FieldType::ALL {
            assert_eq!(FieldType::from_tag(i64::from(field_type.tag())).unwrap(), field_type);
        }
        assert_eq!(FieldType::StringList.tag(), 5);
        assert!(FieldType::from_tag(6).is_err());
        assert!(FieldType::from_tag(-1).is_err());
    }

    #[test]
    fn test_field_type_deserializes_from_tag_or_name() {
        let from_tag: FieldType = serde_json::from_value(json!(2)).unwrap();
        assert_eq!(from_tag, FieldType::String);

        let from_name: FieldType = serde_json::from_value(json!("Strings")).unwrap();
        assert_eq!(from_name, FieldType::StringList);

        let from_long_name: FieldType = serde_json::from_value(json!("Int64List")).unwrap();
        assert_eq!(from_long_name, FieldType::Int64List);

        let unknown = serde_json::from_value::<FieldType>(json!("decimal"));
        assert!(unknown.is_err());
    }

    #[test]
    fn test_field_type_serializes_as_tag() {
        assert_eq!(serde_json::to_string(&FieldType::Float32).unwrap(), "1");
    }

    #[test]
    fn test_from_json_checks_shape() {
        assert_eq!(
            FieldValue::from_json(FieldType::Int64, &json!(3)).unwrap(),
            FieldValue::Int64(3)
        );
        assert_eq!(
            FieldValue::from_json(FieldType::Float32, &json!(1)).unwrap(),
            FieldValue::Float32(1.0)
        );
        assert_eq!(
            FieldValue::from_json(FieldType::StringList, &json!(["a", "b"])).unwrap(),
            FieldValue::StringList(vec!["a".into(), "b".into()])
        );

        assert!(FieldValue::from_json(FieldType::Int64, &json!(1.5)).is_err());
        assert!(FieldValue::from_json(FieldType::String, &json!(1)).is_err());
        assert!(FieldValue::from_json(FieldType::StringList, &json!(["a", 1])).is_err());
        assert!(FieldValue::from_json(FieldType::Int64List, &json!("1,2")).is_err());
    }

    #[test]
    fn test_flatten_joins_list_in_order() {
        let value = FieldValue::StringList(vec!["cat22".into(), "cat21".into()]);
        assert_eq!(value.flatten(), "cat22,cat21");

        let value = FieldValue::Float32List(vec![0.5, 2.0]);
        assert_eq!(value.flatten(), "0.5,2.0");

        assert_eq!(FieldValue::Int64(-7).flatten(), "-7");
    }

    #[test]
    fn test_matches_scalar_and_list() {
        let scalar = FieldValue::String("en".into());
        assert!(scalar.matches(&IndexValue::from("en")));
        assert!(!scalar.matches(&IndexValue::from("fr")));

        let list = FieldValue::StringList(vec!["x".into(), "y".into()]);
        assert!(list.matches(&IndexValue::from("y")));
        assert!(!list.matches(&IndexValue::from("x,y")));

        assert!(FieldValue::Int64(2).matches(&IndexValue::Int(2)));
        assert!(!FieldValue::Int64(2).matches(&IndexValue::from("2")));
        assert!(!FieldValue::Float32(2.0).matches(&IndexValue::Int(2)));
    }

    #[test]
    fn test_format_float_matches_producer_repr() {
        assert_eq!(format_float(0.5), "0.5");
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(0.909), "0.909");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(0.00001), "1e-05");
        assert_eq!(format_float(0.000015), "1.5e-05");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(123456.789), "123456.789");
        assert_eq!(format_float(-2.5), "-2.5");
        assert_eq!(format_float(0.0), "0.0");
    }

    #[test]
    fn test_index_value_ordering() {
        let mut values = vec![IndexValue::Int(10), IndexValue::Int(2), IndexValue::Int(-1)];
        values.sort();
        assert_eq!(values, vec![IndexValue::Int(-1), IndexValue::Int(2), IndexValue::Int(10)]);

        assert!(IndexValue::from("cat11") < IndexValue::from("cat2"));
        assert_eq!(IndexValue::Int(5).to_string(), "5");
    }
}
