use freightdesk_db::migrations::MIGRATOR;

use crate::commands::{load_config, open_database, runtime, CommandResult, Failure};

pub fn run() -> CommandResult {
    let config = match load_config("migrate") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("migrate") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let pool = open_database(&config).await?;
        pool.close().await;
        Ok::<(), Failure>(())
    });

    match result {
        Ok(()) => {
            let latest = MIGRATOR.iter().map(|migration| migration.version).max().unwrap_or(0);
            CommandResult::success("migrate", format!("schema is at version {latest}"))
        }
        Err(failure) => CommandResult::from_failure("migrate", failure),
    }
}
