use std::path::Path;

use atelier_core::cpq::{calculate_pricing, BillableEntry, SalePriceMode};
use atelier_core::domain::pricing_config::PricingConfiguration;
use atelier_core::errors::ApplicationError;
use serde::Deserialize;
use tracing::debug;

use crate::commands::{read_input, CommandResult};

/// `price --input` document: a pricing configuration and the entries to price.
#[derive(Debug, Deserialize)]
pub struct PriceInput {
    pub config: PricingConfiguration,
    pub entries: Vec<BillableEntry>,
    #[serde(default)]
    pub mode: SalePriceMode,
}

pub fn run(input: &Path) -> CommandResult {
    let input: PriceInput = match read_input("price", input) {
        Ok(input) => input,
        Err(failure) => return failure,
    };

    match calculate_pricing(&input.entries, &input.config, input.mode) {
        Ok(summary) => {
            debug!(
                event_name = "cli.price.calculated",
                entries = input.entries.len(),
                sale_price = %summary.sale_price,
                "pricing calculated"
            );
            let message = format!(
                "priced {} entries: sale price {}",
                input.entries.len(),
                summary.sale_price
            );
            CommandResult::success_with_data("price", message, &summary)
        }
        Err(error) => CommandResult::application_failure("price", ApplicationError::from(error)),
    }
}
