//! Aspect model: the coordinate kinds a table cell is positioned on.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::error::DomainError;

/// Prefixed name identifying a concept, dimension or member.
///
/// Namespace resolution belongs to the document parser; two names are equal
/// when prefix and local name are equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct QName {
    pub prefix: Option<String>,
    pub local_name: String,
}

impl QName {
    pub fn new(prefix: Option<&str>, local_name: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_string),
            local_name: local_name.to_string(),
        }
    }

    /// Parse `pfx:local` or `local`.
    pub fn parse(text: &str) -> Result<Self, DomainError> {
        let text = text.trim();
        let (prefix, local) = match text.split_once(':') {
            Some((p, l)) => (Some(p), l),
            None => (None, text),
        };
        let valid = |s: &str| {
            !s.is_empty()
                && s.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_')
                && s.chars().all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        };
        if !valid(local) || prefix.is_some_and(|p| !valid(p)) {
            return Err(DomainError::InvalidName(text.to_string()));
        }
        Ok(Self::new(prefix, local))
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.prefix {
            Some(p) => write!(f, "{}:{}", p, self.local_name),
            None => write!(f, "{}", self.local_name),
        }
    }
}

impl FromStr for QName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for QName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<QName> for String {
    fn from(value: QName) -> Self {
        value.to_string()
    }
}

/// A coordinate kind. Dimension identifiers act as their own aspect key.
///
/// `Dimensions` is set-valued and accumulates by union down the structural
/// tree; every other aspect is resolved by override.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Aspect {
    Location,
    Concept,
    EntityIdentifier,
    Period,
    PeriodType,
    Instant,
    Start,
    End,
    InstantEnd,
    Unit,
    Dimensions,
    OmitDimensions,
    Dimension(QName),
}

impl Aspect {
    pub fn is_dimension(&self) -> bool {
        matches!(self, Aspect::Dimension(_))
    }

    pub fn dimension(&self) -> Option<&QName> {
        match self {
            Aspect::Dimension(q) => Some(q),
            _ => None,
        }
    }

    /// Aspects whose value names a concept or dimension member.
    pub fn is_concept_like(&self) -> bool {
        matches!(self, Aspect::Concept | Aspect::Dimension(_))
    }

    /// Resolve a selection node's `coveredAspect` token; anything that is not
    /// a reserved token must be a dimension name.
    pub fn from_covered_token(token: &str) -> Result<Self, DomainError> {
        Ok(match token.trim() {
            "concept" => Aspect::Concept,
            "entity-identifier" => Aspect::EntityIdentifier,
            "period-start" => Aspect::Start,
            "period-end" => Aspect::End,
            "period-instant" => Aspect::Instant,
            "period-instant-end" => Aspect::InstantEnd,
            "unit" => Aspect::Unit,
            other => Aspect::Dimension(QName::parse(other)?),
        })
    }

    /// Aspect named by an aspect node's aspect element (`conceptAspect`, ...).
    pub fn from_aspect_element(element: &str, dimension: Option<&str>) -> Result<Self, DomainError> {
        match element {
            "conceptAspect" => Ok(Aspect::Concept),
            "unitAspect" => Ok(Aspect::Unit),
            "entityIdentifierAspect" => Ok(Aspect::EntityIdentifier),
            "periodAspect" => Ok(Aspect::Period),
            "dimensionAspect" => {
                let dim = dimension.ok_or_else(|| DomainError::InvalidName(element.to_string()))?;
                Ok(Aspect::Dimension(QName::parse(dim)?))
            }
            other => Err(DomainError::InvalidName(other.to_string())),
        }
    }
}

impl fmt::Display for Aspect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aspect::Location => write!(f, "location"),
            Aspect::Concept => write!(f, "concept"),
            Aspect::EntityIdentifier => write!(f, "entity-identifier"),
            Aspect::Period => write!(f, "period"),
            Aspect::PeriodType => write!(f, "period-type"),
            Aspect::Instant => write!(f, "period-instant"),
            Aspect::Start => write!(f, "period-start"),
            Aspect::End => write!(f, "period-end"),
            Aspect::InstantEnd => write!(f, "period-instant-end"),
            Aspect::Unit => write!(f, "unit"),
            Aspect::Dimensions => write!(f, "dimensions"),
            Aspect::OmitDimensions => write!(f, "omit-dimensions"),
            Aspect::Dimension(q) => write!(f, "{}", q),
        }
    }
}

impl FromStr for Aspect {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "location" => Ok(Aspect::Location),
            "period" => Ok(Aspect::Period),
            "period-type" => Ok(Aspect::PeriodType),
            "dimensions" => Ok(Aspect::Dimensions),
            "omit-dimensions" => Ok(Aspect::OmitDimensions),
            other => Aspect::from_covered_token(other),
        }
    }
}

impl Serialize for Aspect {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Aspect {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("concept", Aspect::Concept)]
    #[case("entity-identifier", Aspect::EntityIdentifier)]
    #[case("period-instant-end", Aspect::InstantEnd)]
    #[case("unit", Aspect::Unit)]
    #[case("eg:Region", Aspect::Dimension(QName::new(Some("eg"), "Region")))]
    fn test_covered_token(#[case] token: &str, #[case] expected: Aspect) {
        assert_eq!(Aspect::from_covered_token(token).unwrap(), expected);
    }

    #[test]
    fn test_qname_parse_and_display() {
        let q = QName::parse("us-gaap:Revenue").unwrap();
        assert_eq!(q.prefix.as_deref(), Some("us-gaap"));
        assert_eq!(q.to_string(), "us-gaap:Revenue");
        assert!(QName::parse("1bad").is_err());
        assert!(QName::parse("").is_err());
    }

    #[test]
    fn test_aspect_display_roundtrip_for_reserved_names() {
        for a in [Aspect::Location, Aspect::Dimensions, Aspect::OmitDimensions, Aspect::Start] {
            assert_eq!(a.to_string().parse::<Aspect>().unwrap(), a);
        }
    }
}
