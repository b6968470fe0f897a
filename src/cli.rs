use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::metadata::{PKG_DESCRIPTION, PKG_NAME, PKG_VERSION};

#[derive(Parser, Debug, Clone)]
#[command(name = PKG_NAME)]
#[command(version = PKG_VERSION)]
#[command(about = PKG_DESCRIPTION, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Start the HTTP server
    Serve(ServeArgs),
    /// Run tracker actions from the terminal
    Client(ClientArgs),
    /// Print version information
    Version,
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// Port to bind; falls back to the next port when busy
    #[arg(long, env = "PORT", default_value_t = 3000)]
    pub port: u16,

    /// Directory holding habits.json and tasks.json
    #[arg(long, env = "HABIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Server base URL; when omitted, records live in the local store
    #[arg(long, env = "HABIT_SERVER_URL")]
    pub server: Option<String>,

    /// Directory holding the local store and the persisted user id
    #[arg(long, env = "HABIT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub action: ClientAction,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ClientAction {
    /// Show both lists
    List,
    /// Add a habit with a weekly goal
    AddHabit {
        title: String,
        #[arg(default_value_t = 7)]
        goal: u32,
    },
    /// Mark a habit done today, or undo today's mark
    ToggleHabit { id: String },
    /// Delete a habit
    DeleteHabit { id: String },
    /// Add a task scheduled at HH:MM
    AddTask { title: String, time: String },
    /// Flip a task's completion flag
    ToggleTask { id: String },
    /// Delete a task
    DeleteTask { id: String },
    /// Flip the stored theme preference
    ToggleTheme,
}
