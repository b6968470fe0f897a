mod cli;
mod client;
mod controller;
mod error;
mod local_store;
mod metadata;
mod server;
mod storage;
mod types;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{Cli, ClientAction, Command};
use crate::client::ApiClient;
use crate::controller::{Controller, LocalTracker, Tracker};
use crate::local_store::KvStore;
use crate::server::AppState;
use crate::storage::default_data_dir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
            tracing::info!(data_dir = %data_dir.display(), "starting {}", metadata::PKG_NAME);
            let state = Arc::new(AppState::new(&data_dir));
            server::serve(state, args.port).await?;
        }
        Command::Client(args) => {
            let data_dir = args.data_dir.unwrap_or_else(default_data_dir);
            let kv = Arc::new(KvStore::new(&data_dir));
            match args.server {
                Some(url) => {
                    let controller = Controller::new(ApiClient::new(&url), kv)?;
                    run_client(controller, args.action)?;
                }
                None => {
                    let controller = Controller::new(LocalTracker::new(kv.clone()), kv)?;
                    run_client(controller, args.action)?;
                }
            }
        }
        Command::Version => {
            println!("{} {}", metadata::PKG_NAME, metadata::PKG_VERSION);
        }
    }

    Ok(())
}

fn run_client<T: Tracker>(
    mut controller: Controller<T>,
    action: ClientAction,
) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ClientAction::List => {}
        ClientAction::AddHabit { title, goal } => controller.add_habit(&title, goal)?,
        ClientAction::ToggleHabit { id } => controller.toggle_habit(&id)?,
        ClientAction::DeleteHabit { id } => controller.delete_habit(&id)?,
        ClientAction::AddTask { title, time } => controller.add_task(&title, &time)?,
        ClientAction::ToggleTask { id } => controller.toggle_task(&id)?,
        ClientAction::DeleteTask { id } => controller.delete_task(&id)?,
        ClientAction::ToggleTheme => {
            let theme = controller.toggle_theme()?;
            println!("theme: {theme}");
            return Ok(());
        }
    }
    print!("{}", controller.render());
    Ok(())
}
