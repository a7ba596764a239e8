//! JSON pointer metric decoder
//!
//! Reads the recent and prior figures from two RFC 6901 pointers. Values may
//! be JSON numbers or numeric strings (several market-data APIs quote
//! volumes as strings).

use serde_json::Value;

use crate::domain::WindowMetrics;
use crate::ports::upstream::{DecodeError, MetricDecoder};

#[derive(Debug, Clone, PartialEq)]
pub struct JsonPointerDecoder {
    recent_pointer: String,
    prior_pointer: String,
}

impl JsonPointerDecoder {
    pub fn new(recent_pointer: impl Into<String>, prior_pointer: impl Into<String>) -> Self {
        Self {
            recent_pointer: recent_pointer.into(),
            prior_pointer: prior_pointer.into(),
        }
    }

    fn number_at(doc: &Value, pointer: &str) -> Result<f64, DecodeError> {
        let value = doc
            .pointer(pointer)
            .ok_or_else(|| DecodeError::MissingField(pointer.to_string()))?;

        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        number
            .filter(|n| n.is_finite())
            .ok_or_else(|| DecodeError::NotNumeric(pointer.to_string()))
    }
}

impl MetricDecoder for JsonPointerDecoder {
    fn decode(&self, body: &str) -> Result<WindowMetrics, DecodeError> {
        let doc: Value =
            serde_json::from_str(body).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;

        let recent = Self::number_at(&doc, &self.recent_pointer)?;
        let prior = Self::number_at(&doc, &self.prior_pointer)?;
        Ok(WindowMetrics::new(recent, prior))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder() -> JsonPointerDecoder {
        JsonPointerDecoder::new(
            "/data/attributes/volume_usd/h1",
            "/data/attributes/volume_usd/h24",
        )
    }

    #[test]
    fn test_decodes_numbers_and_strings() {
        let body = r#"{"data":{"attributes":{"volume_usd":{"h1":"1000.5","h24":400}}}}"#;
        let metrics = decoder().decode(body).unwrap();
        assert_eq!(metrics, WindowMetrics::new(1000.5, 400.0));
    }

    #[test]
    fn test_missing_field() {
        let body = r#"{"data":{"attributes":{"volume_usd":{"h1":"10"}}}}"#;
        assert_eq!(
            decoder().decode(body),
            Err(DecodeError::MissingField("/data/attributes/volume_usd/h24".into()))
        );
    }

    #[test]
    fn test_non_numeric_and_invalid_json() {
        let body = r#"{"data":{"attributes":{"volume_usd":{"h1":"n/a","h24":"5"}}}}"#;
        assert!(matches!(decoder().decode(body), Err(DecodeError::NotNumeric(_))));
        assert!(matches!(decoder().decode("<html>"), Err(DecodeError::InvalidJson(_))));
    }
}
