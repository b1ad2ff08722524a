//! Human-readable sequential document numbers.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Which counter a folio is drawn from. Each kind has its own sequence per
/// organization.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolioKind {
    Agreement,
    Liquidation,
}

impl FolioKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            FolioKind::Agreement => "CON",
            FolioKind::Liquidation => "LIQ",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FolioKind::Agreement => "agreement",
            FolioKind::Liquidation => "liquidation",
        }
    }
}

/// A folio such as `LIQ-000042`. Ordered by kind, then sequence number.
/// Serialized as its display string.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Folio {
    kind: FolioKind,
    sequence: u64,
}

impl Folio {
    pub fn new(kind: FolioKind, sequence: u64) -> Self {
        Self { kind, sequence }
    }

    pub fn kind(&self) -> FolioKind {
        self.kind
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl core::fmt::Display for Folio {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}-{:06}", self.kind.prefix(), self.sequence)
    }
}

impl core::str::FromStr for Folio {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (prefix, number) = s
            .split_once('-')
            .ok_or_else(|| DomainError::invalid_id(format!("malformed folio '{s}'")))?;
        let kind = [FolioKind::Agreement, FolioKind::Liquidation]
            .into_iter()
            .find(|k| k.prefix() == prefix)
            .ok_or_else(|| DomainError::invalid_id(format!("unknown folio prefix '{prefix}'")))?;
        let sequence = number
            .parse::<u64>()
            .map_err(|_| DomainError::invalid_id(format!("malformed folio '{s}'")))?;
        Ok(Folio::new(kind, sequence))
    }
}

impl TryFrom<String> for Folio {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Folio> for String {
    fn from(value: Folio) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_with_prefix_and_padding() {
        assert_eq!(Folio::new(FolioKind::Liquidation, 42).to_string(), "LIQ-000042");
        assert_eq!(Folio::new(FolioKind::Agreement, 1).to_string(), "CON-000001");
    }

    #[test]
    fn serializes_as_its_display_string() {
        let folio = Folio::new(FolioKind::Liquidation, 7);
        let json = serde_json::to_value(folio).unwrap();
        assert_eq!(json, serde_json::json!("LIQ-000007"));
        assert_eq!(serde_json::from_value::<Folio>(json).unwrap(), folio);
        assert!("XYZ-000001".parse::<Folio>().is_err());
    }
}
