use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::condition::ConditionId;
use crate::domain::promise::{PromiseId, TenantId};
use crate::domain::service::{ServiceId, UtilityKind};
use crate::errors::DomainError;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuoteId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineItemId(pub String);

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Pending,
    Negotiation,
    Closing,
    Approved,
    Authorized,
    ContractGenerated,
    ContractSigned,
    Rejected,
    Cancelled,
}

impl QuoteStatus {
    pub const AUTHORIZED_FAMILY: [Self; 4] =
        [Self::Approved, Self::Authorized, Self::ContractGenerated, Self::ContractSigned];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Negotiation => "negotiation",
            Self::Closing => "closing",
            Self::Approved => "approved",
            Self::Authorized => "authorized",
            Self::ContractGenerated => "contract_generated",
            Self::ContractSigned => "contract_signed",
            Self::Rejected => "rejected",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "negotiation" => Some(Self::Negotiation),
            "closing" => Some(Self::Closing),
            "approved" => Some(Self::Approved),
            "authorized" => Some(Self::Authorized),
            "contract_generated" => Some(Self::ContractGenerated),
            "contract_signed" => Some(Self::ContractSigned),
            "rejected" => Some(Self::Rejected),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Statuses that make a quote eligible to become (or already be) a booked event.
    pub fn is_authorized_family(&self) -> bool {
        Self::AUTHORIZED_FAMILY.contains(self)
    }

    fn family_rank(&self) -> Option<u8> {
        match self {
            Self::Approved => Some(0),
            Self::Authorized => Some(1),
            Self::ContractGenerated => Some(2),
            Self::ContractSigned => Some(3),
            _ => None,
        }
    }
}

/// Values captured when the quote is closed into a contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingTerms {
    pub closing_price: Option<Decimal>,
    pub courtesy_total: Decimal,
    pub bonus: Decimal,
    pub total_payable: Decimal,
    pub advance: Decimal,
    pub deferred: Decimal,
    pub closed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: QuoteId,
    pub tenant_id: TenantId,
    pub promise_id: PromiseId,
    pub name: String,
    pub status: QuoteStatus,
    pub list_price: Decimal,
    pub negotiated_price: Option<Decimal>,
    pub condition_id: Option<ConditionId>,
    pub archived: bool,
    pub event_id: Option<EventId>,
    pub snapshot_checksum: Option<String>,
    pub closing: Option<ClosingTerms>,
    pub created_at: DateTime<Utc>,
}

impl Quote {
    /// Archived and cancelled quotes take no part in the promise lifecycle.
    pub fn is_live(&self) -> bool {
        !self.archived && self.status != QuoteStatus::Cancelled
    }

    /// A live authorized-family quote with its event linked.
    pub fn is_booked(&self) -> bool {
        self.is_live() && self.status.is_authorized_family() && self.event_id.is_some()
    }

    pub fn can_transition_to(&self, next: QuoteStatus) -> bool {
        use QuoteStatus::*;

        if self.event_id.is_some() {
            return match (self.status.family_rank(), next.family_rank()) {
                (Some(current), Some(target)) => target > current,
                _ => false,
            };
        }

        matches!(
            (self.status, next),
            (Pending, Negotiation)
                | (Pending, Closing)
                | (Pending, Approved)
                | (Negotiation, Pending)
                | (Negotiation, Closing)
                | (Negotiation, Approved)
                | (Closing, Negotiation)
                | (Closing, Approved)
                | (Closing, Authorized)
                | (Approved, Closing)
                | (Approved, Authorized)
                | (Approved, ContractGenerated)
                | (Authorized, ContractGenerated)
                | (Authorized, ContractSigned)
                | (ContractGenerated, ContractSigned)
                | (Pending | Negotiation | Closing | Approved, Rejected)
                | (Rejected, Negotiation)
                | (
                    Pending | Negotiation | Closing | Approved | Authorized | ContractGenerated
                        | ContractSigned | Rejected,
                    Cancelled
                )
        )
    }

    pub fn transition_to(&mut self, next: QuoteStatus) -> Result<(), DomainError> {
        if self.can_transition_to(next) {
            self.status = next;
            return Ok(());
        }

        Err(DomainError::InvalidQuoteTransition { from: self.status, to: next })
    }

    /// Links the booked event. Happens once, and only for authorized-family quotes.
    pub fn link_event(&mut self, event_id: EventId) -> Result<(), DomainError> {
        if let Some(existing) = &self.event_id {
            return Err(DomainError::EventAlreadyLinked { existing: existing.clone() });
        }
        if !self.status.is_authorized_family() {
            return Err(DomainError::InvariantViolation(format!(
                "quote {} cannot link an event while {}",
                self.id.0,
                self.status.as_str()
            )));
        }

        self.event_id = Some(event_id);
        Ok(())
    }
}

/// A persisted line item. Rows written before freezing existed carry `None`
/// in the frozen columns.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteLineItem {
    pub id: LineItemId,
    pub quote_id: QuoteId,
    pub service_id: ServiceId,
    pub name: Option<String>,
    pub unit_price: Option<Decimal>,
    pub cost: Option<Decimal>,
    pub expense: Option<Decimal>,
    pub utility_kind: Option<UtilityKind>,
    pub quantity: i32,
    pub subtotal: Option<Decimal>,
    pub position: i32,
}

impl QuoteLineItem {
    pub fn has_frozen_values(&self) -> bool {
        self.name.as_deref().is_some_and(|name| !name.trim().is_empty())
            && self.unit_price.is_some()
    }
}
