use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::contact::ContactId;
use crate::domain::promise::{PromiseId, Referrer, TenantId};
use crate::domain::quote::QuoteId;

/// Derived lifecycle state of a promise. The quote id travels inside the
/// variant, so a state can never point at the wrong kind of quote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "quote_id", rename_all = "snake_case")]
pub enum PromiseState {
    Pending,
    Closing(QuoteId),
    Authorized(QuoteId),
}

impl PromiseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Closing(_) => "closing",
            Self::Authorized(_) => "authorized",
        }
    }

    pub fn closing_quote_id(&self) -> Option<&QuoteId> {
        match self {
            Self::Closing(id) => Some(id),
            _ => None,
        }
    }

    pub fn authorized_quote_id(&self) -> Option<&QuoteId> {
        match self {
            Self::Authorized(id) => Some(id),
            _ => None,
        }
    }

    pub fn active_quote_id(&self) -> Option<&QuoteId> {
        match self {
            Self::Closing(id) | Self::Authorized(id) => Some(id),
            Self::Pending => None,
        }
    }
}

/// Which rule produced the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolvedBy {
    AuthorizedWithEvent,
    ApprovedStage,
    ClosingQuote,
    AuthorizedAwaitingEvent,
    NoActiveNegotiation,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseSnapshot {
    pub promise_id: PromiseId,
    pub tenant_id: TenantId,
    pub contact_id: ContactId,
    pub contact_name: String,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub event_type: Option<String>,
    pub event_name: Option<String>,
    pub event_location: Option<String>,
    pub event_duration: Option<String>,
    pub event_date: Option<NaiveDate>,
    pub event_date_confirmed: bool,
    pub stage_slug: Option<String>,
    pub stage_name: Option<String>,
    pub referrer: Referrer,
    pub referrer_name: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromiseStateView {
    pub state: PromiseState,
    pub resolved_by: ResolvedBy,
    pub snapshot: PromiseSnapshot,
}

impl PromiseStateView {
    pub fn closing_quote_id(&self) -> Option<&QuoteId> {
        self.state.closing_quote_id()
    }

    pub fn authorized_quote_id(&self) -> Option<&QuoteId> {
        self.state.authorized_quote_id()
    }
}
