use std::fmt::{self, Display};

use serde::Serialize;

///
/// One scalar from a control deck: integer, float, Fortran boolean, or a
/// string that survived conversion untouched.
///
/// Shell placeholders (`${NSTEPS}`, `$(date)`) stay `Text` byte-for-byte.
/// The engine expands them after the shell does; to us they are opaque.
///
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
}

impl ParamValue {
    /// Convert a raw deck token, trimming quotes and trailing commas.
    ///
    /// Ladder: placeholder string, `.true.`/`.false.`, integer, float with
    /// `D`-exponent substitution, raw text. Non-finite floats fall through
    /// to text so a corrupt `dt=NaN` never poisons arithmetic downstream.
    pub fn from_token(raw: &str) -> Self {
        let val = raw
            .trim()
            .trim_matches(',')
            .trim_matches('"')
            .trim_matches('\'');

        if val.is_empty() {
            return ParamValue::Text(String::new());
        }
        if val.contains('$') {
            return ParamValue::Text(val.to_string());
        }
        match val.to_ascii_lowercase().as_str() {
            ".true." => return ParamValue::Bool(true),
            ".false." => return ParamValue::Bool(false),
            _ => {}
        }
        if let Ok(i) = val.parse::<i64>() {
            return ParamValue::Int(i);
        }
        let normalized = val.replace(['d', 'D'], "e");
        if let Ok(f) = normalized.parse::<f64>() {
            if f.is_finite() {
                return ParamValue::Float(f);
            }
        }
        ParamValue::Text(val.to_string())
    }

    /// Integer view; floats must be whole, placeholders are opaque.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            ParamValue::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            ParamValue::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Int(i) => Some(*i as f64),
            ParamValue::Float(f) => Some(*f),
            ParamValue::Bool(b) => Some(f64::from(u8::from(*b))),
            ParamValue::Text(_) => None,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ParamValue::Text(s) if s.contains('$'))
    }
}

impl Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{}", i),
            ParamValue::Float(x) => write!(f, "{}", x),
            ParamValue::Bool(b) => write!(f, "{}", b),
            ParamValue::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case("5000000", ParamValue::Int(5_000_000))]
    #[case("0.004", ParamValue::Float(0.004))]
    #[case("1.0d-5", ParamValue::Float(1.0e-5))]
    #[case("2.5D2", ParamValue::Float(250.0))]
    #[case(".true.", ParamValue::Bool(true))]
    #[case(".FALSE.", ParamValue::Bool(false))]
    #[case("'restrt'", ParamValue::Text("restrt".to_string()))]
    #[case("300.0,", ParamValue::Float(300.0))]
    fn token_conversion(#[case] raw: &str, #[case] expected: ParamValue) {
        assert_eq!(ParamValue::from_token(raw), expected);
    }

    #[rstest]
    #[case("${NSTEPS}")]
    #[case("$(cat steps.txt)")]
    #[case("${TEMP}K")]
    fn placeholders_survive_byte_for_byte(#[case] raw: &str) {
        let v = ParamValue::from_token(raw);
        assert_eq!(v, ParamValue::Text(raw.to_string()));
        assert!(v.is_placeholder());
        assert_eq!(v.as_int(), None);
        assert_eq!(v.as_float(), None);
        // Round-trip through Display must not alter the token.
        assert_eq!(v.to_string(), raw);
    }

    #[test]
    fn non_finite_floats_become_text() {
        assert_eq!(
            ParamValue::from_token("NaN"),
            ParamValue::Text("NaN".to_string())
        );
        assert_eq!(ParamValue::from_token("NaN").as_float(), None);
    }

    #[test]
    fn whole_floats_read_back_as_int() {
        assert_eq!(ParamValue::Float(250000.0).as_int(), Some(250000));
        assert_eq!(ParamValue::Float(0.5).as_int(), None);
    }
}
