//! XSD-subset typed-value validator

use chrono::{NaiveDate, NaiveDateTime};
use tracing::trace;

use crate::domain::{QName, Value};
use crate::infrastructure::traits::{TypedValueValidator, Validated, Validity};

/// Types raw text for the simple types the resolution engine needs.
///
/// Type names may be given with or without an `xs:` prefix.
#[derive(Debug, Default)]
pub struct XsdValidator;

impl XsdValidator {
    fn parse(base: &str, text: &str) -> Option<Result<(Validity, Value), ()>> {
        let trimmed = text.trim();
        let typed = match base {
            "decimal" | "float" | "double" => trimmed
                .parse::<f64>()
                .map(|d| (Validity::Valid, Value::Decimal(d)))
                .map_err(|_| ()),
            "integer" | "int" | "long" | "short" | "nonNegativeInteger" | "positiveInteger" => trimmed
                .parse::<i64>()
                .map(|i| (Validity::Valid, Value::Integer(i)))
                .map_err(|_| ()),
            "boolean" => match trimmed {
                "true" | "1" => Ok((Validity::Valid, Value::Boolean(true))),
                "false" | "0" => Ok((Validity::Valid, Value::Boolean(false))),
                _ => Err(()),
            },
            "QName" => QName::parse(trimmed)
                .map(|q| (Validity::Valid, Value::QName(q)))
                .map_err(|_| ()),
            "ID" => {
                if trimmed.is_empty() || trimmed.contains(char::is_whitespace) {
                    Err(())
                } else {
                    Ok((Validity::ValidId, Value::text(trimmed)))
                }
            }
            "token" | "normalizedString" | "language" | "Name" | "NCName" | "anyURI" => {
                Ok((Validity::Valid, Value::text(trimmed)))
            }
            "string" => Ok((Validity::Valid, Value::text(text))),
            "date" => NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| (Validity::Valid, Value::DateTime(dt)))
                .ok_or(()),
            "dateTime" => NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S")
                .map(|dt| (Validity::Valid, Value::DateTime(dt)))
                .map_err(|_| ()),
            _ => return None,
        };
        Some(typed)
    }
}

impl TypedValueValidator for XsdValidator {
    fn validate(&self, type_name: &str, text: &str) -> Validated {
        let base = type_name.rsplit(':').next().unwrap_or(type_name);
        let (state, value) = match Self::parse(base, text) {
            None => (Validity::Unknown, Some(Value::text(text))),
            Some(Ok((state, value))) => (state, Some(value)),
            Some(Err(())) => (Validity::Invalid, None),
        };
        trace!("validate {}: {:?}", type_name, state);
        Validated {
            state,
            value,
            source: text.to_string(),
        }
    }
}
