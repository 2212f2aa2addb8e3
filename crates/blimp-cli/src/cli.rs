//! CLI argument definitions for Blimp.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Blimp -- turn plain-language requests into cross-app workflows.
#[derive(Parser)]
#[command(
    name = "blimp",
    version,
    about = "Blimp -- workflow resolution and execution",
    long_about = "Resolves natural-language requests to workflow templates and runs them \
                  against the apps a user has connected."
)]
pub struct Cli {
    /// Configuration file (defaults to config/default.toml when present).
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,

    /// User the command acts for.
    #[arg(long, short, global = true, default_value = "local")]
    pub user: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Resolve a request to an existing or new workflow.
    Resolve {
        /// The request, e.g. "send my unread emails to my calendar".
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,

        /// Extra context as a JSON object.
        #[arg(long)]
        context: Option<String>,

        /// Create a workflow owned by the user instead of a shared template.
        #[arg(long)]
        personal: bool,
    },

    /// Execute a workflow.
    Execute {
        workflow_id: String,

        /// Handler parameters as a JSON object.
        #[arg(long, short)]
        params: Option<String>,
    },

    /// List the workflows visible to the user.
    Workflows,

    /// List the user's connected apps.
    Apps,

    /// Store a credential and mark its app connected.
    Connect {
        /// Credential as tagged JSON, e.g. '{"app":"slack","bot_token":"xoxb-..."}'.
        credential: String,

        /// Free-form metadata (account email, scopes) as JSON.
        #[arg(long)]
        metadata: Option<String>,
    },

    /// Remove an app's credential and connection.
    Disconnect {
        /// App id, e.g. `gmail`, `slack`, `github`.
        app: String,
    },

    /// Show one execution record.
    Execution { execution_id: String },

    /// Show the user's most recent executions.
    History {
        #[arg(long, short, default_value_t = 20)]
        limit: usize,
    },

    /// Load shared workflow templates from a JSON file.
    Seed { file: PathBuf },

    /// Print a fresh base64 vault key.
    Keygen,
}
