use std::path::Path;

use atelier_core::errors::ApplicationError;
use atelier_core::payment::{resolve_payment, validate_payment_input, PaymentInput};

use crate::commands::{load_config, read_input, CommandResult};

pub fn run(input: &Path) -> CommandResult {
    let config = match load_config("payment") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let input: PaymentInput = match read_input("payment", input) {
        Ok(input) => input,
        Err(failure) => return failure,
    };

    if let Err(error) = validate_payment_input(&input) {
        return CommandResult::application_failure("payment", ApplicationError::from(error));
    }

    let breakdown = resolve_payment(&input, &config.payments.deferred_policy());
    let message = format!(
        "total {} ({} advance, {} deferred)",
        breakdown.total_display(),
        breakdown.advance,
        breakdown.deferred
    );
    CommandResult::success_with_data("payment", message, &breakdown)
}
