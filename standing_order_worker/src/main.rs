use std::process::ExitCode;

use clap::Parser;
use dotenvy::dotenv;
use log::*;
use standing_order_worker::{
    cli::{Arguments, Command},
    config::WorkerConfig,
    connect,
    errors::WorkerError,
    notifications::create_mail_handlers,
    placement_worker::{place_order_cycle, start_placement_worker},
};

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    env_logger::init();
    let args = Arguments::parse();
    let config = WorkerConfig::from_env_or_default();
    match run(args.command, config).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e}");
            ExitCode::FAILURE
        },
    }
}

async fn run(command: Command, config: WorkerConfig) -> Result<(), WorkerError> {
    let db = connect(&config).await?;
    let handlers = create_mail_handlers(config.event_buffer_size);
    let producers = handlers.producers();
    let mail_tasks = handlers.start_handlers();
    match command.order_cycle() {
        Some(order_cycle) => {
            let result = place_order_cycle(db.clone(), producers, order_cycle).await;
            // The producers are gone once the job is done, so the mail hooks finish their queues and exit.
            for task in mail_tasks {
                if let Err(e) = task.await {
                    error!("📧️ A mail hook stopped unexpectedly. {e}");
                }
            }
            db.close().await;
            let summary = result?;
            println!("{summary}");
            summary.skipped.iter().for_each(|s| println!("  skipped {} ({}): {}", s.number, s.order_id, s.reason));
        },
        None => {
            info!("🚀️ Watching for order cycles to place");
            let worker = start_placement_worker(db, producers, config.poll_interval);
            if let Err(e) = worker.await {
                error!("🕰️ The placement worker stopped unexpectedly. {e}");
            }
        },
    }
    Ok(())
}
