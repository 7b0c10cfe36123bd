use atelier_core::domain::promise::PromiseId;
use atelier_db::{connect_with_config, migrations, QuotingService};

use crate::commands::{load_config, runtime, CommandResult};

enum Failure {
    Setup(&'static str, String, u8),
    Application(atelier_core::errors::ApplicationError),
}

pub fn run(promise_id: &str) -> CommandResult {
    let config = match load_config("promise-state") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let runtime = match runtime("promise-state") {
        Ok(runtime) => runtime,
        Err(failure) => return failure,
    };

    let promise_id = PromiseId(promise_id.trim().to_string());
    let result = runtime.block_on(async {
        let pool = connect_with_config(&config.database)
            .await
            .map_err(|error| Failure::Setup("db_connectivity", error.to_string(), 4))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| Failure::Setup("migration", error.to_string(), 5))?;

        let service = QuotingService::from_config(pool.clone(), &config);
        let view = service.promise_state(&promise_id).await.map_err(Failure::Application);
        pool.close().await;
        view
    });

    match result {
        Ok(view) => {
            let message = format!("promise {} is {}", promise_id.0, view.state.as_str());
            CommandResult::success_with_data("promise-state", message, &view)
        }
        Err(Failure::Setup(error_class, message, exit_code)) => {
            CommandResult::failure("promise-state", error_class, message, exit_code)
        }
        Err(Failure::Application(error)) => {
            CommandResult::application_failure("promise-state", error)
        }
    }
}
