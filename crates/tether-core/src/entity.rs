//! CRM entity kinds and their table mapping.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The four primary CRM record kinds.
///
/// Tools that dispatch generically (note creation, generic updates) are keyed
/// by this enum; everything else addresses tables directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Contact,
    Company,
    Deal,
    Lead,
}

impl EntityKind {
    /// The backing table for this kind.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contacts",
            EntityKind::Company => "companies",
            EntityKind::Deal => "deals",
            EntityKind::Lead => "leads",
        }
    }

    /// The column on the notes table that links a note to this kind.
    pub fn note_link_column(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact_id",
            EntityKind::Company => "company_id",
            EntityKind::Deal => "deal_id",
            EntityKind::Lead => "lead_id",
        }
    }

    /// Singular label for summaries ("contact", "deal", ...).
    pub fn label(&self) -> &'static str {
        match self {
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
            EntityKind::Deal => "deal",
            EntityKind::Lead => "lead",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "contact" => Ok(EntityKind::Contact),
            "company" => Ok(EntityKind::Company),
            "deal" => Ok(EntityKind::Deal),
            "lead" => Ok(EntityKind::Lead),
            other => Err(format!("unknown entity type: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_mapping() {
        assert_eq!(EntityKind::Contact.table(), "contacts");
        assert_eq!(EntityKind::Deal.note_link_column(), "deal_id");
    }

    #[test]
    fn parses_lowercase_names() {
        assert_eq!("lead".parse::<EntityKind>().unwrap(), EntityKind::Lead);
        assert!("opportunity".parse::<EntityKind>().is_err());
    }

    #[test]
    fn serde_roundtrip_is_lowercase() {
        let json = serde_json::to_string(&EntityKind::Company).unwrap();
        assert_eq!(json, "\"company\"");
        let back: EntityKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EntityKind::Company);
    }
}
