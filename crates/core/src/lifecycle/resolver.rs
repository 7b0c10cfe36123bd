use serde::{Deserialize, Serialize};

use crate::domain::contact::Contact;
use crate::domain::promise::{PipelineStage, Promise, ReferrerDirectory};
use crate::domain::quote::{Quote, QuoteId, QuoteStatus};
use crate::lifecycle::states::{PromiseSnapshot, PromiseState, PromiseStateView, ResolvedBy};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub state: PromiseState,
    pub resolved_by: ResolvedBy,
}

struct StateRule {
    resolved_by: ResolvedBy,
    applies: fn(Option<&PipelineStage>) -> bool,
    matches: fn(&Quote) -> bool,
    state: fn(QuoteId) -> PromiseState,
}

/// Evaluated top to bottom; the first rule with a matching quote wins, and
/// inside a rule the first matching quote in iteration order wins.
const RULES: [StateRule; 4] = [
    StateRule {
        resolved_by: ResolvedBy::AuthorizedWithEvent,
        applies: |_| true,
        matches: |quote| quote.status.is_authorized_family() && quote.event_id.is_some(),
        state: PromiseState::Authorized,
    },
    StateRule {
        resolved_by: ResolvedBy::ApprovedStage,
        applies: |stage| stage.is_some_and(PipelineStage::is_approved_sentinel),
        matches: |quote| quote.status.is_authorized_family(),
        state: PromiseState::Authorized,
    },
    StateRule {
        resolved_by: ResolvedBy::ClosingQuote,
        applies: |_| true,
        matches: |quote| quote.status == QuoteStatus::Closing,
        state: PromiseState::Closing,
    },
    StateRule {
        resolved_by: ResolvedBy::AuthorizedAwaitingEvent,
        applies: |_| true,
        matches: |quote| quote.status.is_authorized_family() && quote.event_id.is_none(),
        state: PromiseState::Closing,
    },
];

/// Derives the promise state from its stage and quotes. Archived and cancelled
/// quotes are ignored. Recomputed on every read; never store the result.
pub fn resolve_state(stage: Option<&PipelineStage>, quotes: &[Quote]) -> Resolution {
    for rule in RULES.iter().filter(|rule| (rule.applies)(stage)) {
        let matched =
            quotes.iter().filter(|quote| quote.is_live()).find(|quote| (rule.matches)(quote));
        if let Some(quote) = matched {
            return Resolution {
                state: (rule.state)(quote.id.clone()),
                resolved_by: rule.resolved_by,
            };
        }
    }

    Resolution { state: PromiseState::Pending, resolved_by: ResolvedBy::NoActiveNegotiation }
}

pub fn resolve_promise<D>(
    promise: &Promise,
    contact: &Contact,
    stage: Option<&PipelineStage>,
    quotes: &[Quote],
    referrers: &D,
) -> PromiseStateView
where
    D: ReferrerDirectory + ?Sized,
{
    let resolution = resolve_state(stage, quotes);

    PromiseStateView {
        state: resolution.state,
        resolved_by: resolution.resolved_by,
        snapshot: PromiseSnapshot {
            promise_id: promise.id.clone(),
            tenant_id: promise.tenant_id.clone(),
            contact_id: contact.id.clone(),
            contact_name: contact.name.clone(),
            contact_phone: contact.phone.clone(),
            contact_email: contact.email.clone(),
            event_type: promise.event_type.clone(),
            event_name: promise.event_name.clone(),
            event_location: promise.event_location.clone(),
            event_duration: promise.event_duration.clone(),
            event_date: promise.event_date,
            event_date_confirmed: promise.event_date_confirmed,
            stage_slug: stage.map(|stage| stage.slug.clone()),
            stage_name: stage.map(|stage| stage.name.clone()),
            referrer: promise.referrer.clone(),
            referrer_name: referrers.resolve_referrer_name(&promise.referrer),
        },
    }
}
