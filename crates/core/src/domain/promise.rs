use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::contact::ContactId;
use crate::errors::DomainError;

/// Stage slug the business treats as "this promise is won", whatever its order.
pub const APPROVED_STAGE_SLUG: &str = "approved";

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromiseId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StaffId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub tenant_id: TenantId,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PipelineStageId(pub String);

#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Referrer {
    Contact(ContactId),
    StaffMember(StaffId),
    #[default]
    None,
}

impl Referrer {
    /// Parses the stored `(referrer_type, referrer_id)` column pair.
    pub fn from_parts(
        referrer_type: Option<&str>,
        referrer_id: Option<&str>,
    ) -> Result<Self, DomainError> {
        let id = referrer_id.map(str::trim).filter(|id| !id.is_empty());
        let kind = referrer_type.map(|kind| kind.trim().to_ascii_lowercase());

        match (kind.as_deref(), id) {
            (None | Some(""), _) | (_, None) => Ok(Self::None),
            (Some("contact"), Some(id)) => Ok(Self::Contact(ContactId(id.to_string()))),
            (Some("staff"), Some(id)) => Ok(Self::StaffMember(StaffId(id.to_string()))),
            (Some(other), Some(_)) => {
                Err(DomainError::invalid_input(format!("unknown referrer_type `{other}`")))
            }
        }
    }

    pub fn type_tag(&self) -> Option<&'static str> {
        match self {
            Self::Contact(_) => Some("contact"),
            Self::StaffMember(_) => Some("staff"),
            Self::None => None,
        }
    }

    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Contact(id) => Some(&id.0),
            Self::StaffMember(id) => Some(&id.0),
            Self::None => None,
        }
    }
}

pub trait ReferrerDirectory {
    fn resolve_referrer_name(&self, referrer: &Referrer) -> Option<String>;
}

#[derive(Clone, Debug, Default)]
pub struct InMemoryReferrerDirectory {
    contacts: HashMap<ContactId, String>,
    staff: HashMap<StaffId, String>,
}

impl InMemoryReferrerDirectory {
    pub fn with_contact(mut self, id: ContactId, name: impl Into<String>) -> Self {
        self.contacts.insert(id, name.into());
        self
    }

    pub fn with_staff(mut self, id: StaffId, name: impl Into<String>) -> Self {
        self.staff.insert(id, name.into());
        self
    }

    /// Directory holding at most the one name a single promise needs.
    pub fn for_referrer(referrer: &Referrer, name: Option<String>) -> Self {
        let directory = Self::default();
        match (referrer, name) {
            (Referrer::Contact(id), Some(name)) => directory.with_contact(id.clone(), name),
            (Referrer::StaffMember(id), Some(name)) => directory.with_staff(id.clone(), name),
            _ => directory,
        }
    }
}

impl ReferrerDirectory for InMemoryReferrerDirectory {
    fn resolve_referrer_name(&self, referrer: &Referrer) -> Option<String> {
        match referrer {
            Referrer::Contact(id) => self.contacts.get(id).cloned(),
            Referrer::StaffMember(id) => self.staff.get(id).cloned(),
            Referrer::None => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    Commercial,
    Support,
}

impl PipelineKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commercial => "commercial",
            Self::Support => "support",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "commercial" => Some(Self::Commercial),
            "support" => Some(Self::Support),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub id: PipelineStageId,
    pub pipeline: PipelineKind,
    pub slug: String,
    pub name: String,
    pub order: i32,
    pub active: bool,
}

impl PipelineStage {
    pub fn is_approved_sentinel(&self) -> bool {
        self.slug == APPROVED_STAGE_SLUG
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Promise {
    pub id: PromiseId,
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub event_type: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_date_confirmed: bool,
    pub event_name: Option<String>,
    pub event_location: Option<String>,
    pub event_duration: Option<String>,
    pub pipeline_stage_id: Option<PipelineStageId>,
    pub referrer: Referrer,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::domain::contact::ContactId;

    use super::{InMemoryReferrerDirectory, Referrer, ReferrerDirectory, StaffId};

    #[test]
    fn referrer_tag_is_parsed_once_into_variant() {
        let contact = Referrer::from_parts(Some("contact"), Some("C-1")).expect("contact");
        assert_eq!(contact, Referrer::Contact(ContactId("C-1".to_string())));

        let staff = Referrer::from_parts(Some("STAFF"), Some("S-9")).expect("staff");
        assert_eq!(staff, Referrer::StaffMember(StaffId("S-9".to_string())));

        assert_eq!(Referrer::from_parts(None, Some("C-1")).expect("none"), Referrer::None);
        assert_eq!(Referrer::from_parts(Some("contact"), None).expect("none"), Referrer::None);
        assert!(Referrer::from_parts(Some("vendor"), Some("V-1")).is_err());
    }

    #[test]
    fn referrer_round_trips_through_column_pair() {
        let staff = Referrer::StaffMember(StaffId("S-2".to_string()));
        let parsed = Referrer::from_parts(staff.type_tag(), staff.id()).expect("parse");
        assert_eq!(parsed, staff);
    }

    #[test]
    fn directory_resolves_contact_and_staff_separately() {
        let directory = InMemoryReferrerDirectory::default()
            .with_contact(ContactId("X".to_string()), "Ana Ruiz")
            .with_staff(StaffId("X".to_string()), "Luis Mora");

        assert_eq!(
            directory.resolve_referrer_name(&Referrer::Contact(ContactId("X".to_string()))),
            Some("Ana Ruiz".to_string())
        );
        assert_eq!(
            directory.resolve_referrer_name(&Referrer::StaffMember(StaffId("X".to_string()))),
            Some("Luis Mora".to_string())
        );
        assert_eq!(directory.resolve_referrer_name(&Referrer::None), None);
    }
}
