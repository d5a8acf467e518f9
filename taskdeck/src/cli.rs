//! Subcommands of the `taskdeck` binary.
//!
//! Global flags live on [`crate::config::CliArgs`]; this module only holds
//! what each subcommand takes.

use clap::{Args, Subcommand};
use taskdeck_proto::collaborator::DEFAULT_ROLE;
use taskdeck_proto::ids::{TagId, TaskId, UserId};
use taskdeck_proto::task::TaskStatus;

/// Top-level subcommand.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Probe the backend once and report whether it is reachable.
    Health,

    /// Create an account. Does not sign in.
    Signup {
        /// Username for the new account.
        #[arg(long)]
        username: String,
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Sign in and store the session token.
    Signin {
        /// Account email.
        #[arg(long)]
        email: String,
        /// Account password.
        #[arg(long, env = "TASKDECK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Forget the stored session.
    Logout,

    /// Show whether a session is stored.
    Session,

    /// Work with your tasks.
    #[command(subcommand)]
    Tasks(TaskCommand),

    /// List tags.
    Tags,

    /// Manage who a task is shared with.
    #[command(subcommand)]
    Collab(CollabCommand),
}

impl Command {
    /// Whether the command talks to the backend and therefore needs the
    /// bootstrap (config validation, health gate) first.
    #[must_use]
    pub const fn needs_backend(&self) -> bool {
        !matches!(self, Self::Logout | Self::Session)
    }
}

/// `tasks` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum TaskCommand {
    /// List your own tasks.
    List {
        /// Only tasks with this status.
        #[arg(long, value_parser = parse_status)]
        status: Option<TaskStatus>,
    },

    /// List tasks others shared with you.
    Shared,

    /// Count your tasks by status.
    Stats,

    /// Create a task.
    Create(CreateArgs),

    /// Change fields of a task. Only the given fields are sent.
    Update(UpdateArgs),

    /// Delete a task.
    Delete {
        /// Task to delete.
        id: TaskId,
    },
}

/// Arguments of `tasks create`.
#[derive(Debug, Clone, Args)]
pub struct CreateArgs {
    /// Title, 2 to 40 characters.
    #[arg(long)]
    pub title: String,
    /// Content, 5 to 600 characters.
    #[arg(long)]
    pub content: String,
    /// Tag id (see `taskdeck tags`).
    #[arg(long, value_parser = parse_tag)]
    pub tag: TagId,
    /// Initial status.
    #[arg(long, value_parser = parse_status, default_value = "PENDING")]
    pub status: TaskStatus,
}

/// Arguments of `tasks update`.
#[derive(Debug, Clone, Args)]
pub struct UpdateArgs {
    /// Task to update.
    pub id: TaskId,
    /// New title.
    #[arg(long)]
    pub title: Option<String>,
    /// New content.
    #[arg(long)]
    pub content: Option<String>,
    /// New tag id.
    #[arg(long, value_parser = parse_tag)]
    pub tag: Option<TagId>,
    /// New status.
    #[arg(long, value_parser = parse_status)]
    pub status: Option<TaskStatus>,
}

/// `collab` subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum CollabCommand {
    /// List collaborators of a task.
    List {
        /// Task whose collaborators to list.
        task: TaskId,
    },

    /// Share a task with one or more users by email.
    Add {
        /// Task to share.
        task: TaskId,
        /// Emails to add.
        #[arg(required = true, num_args = 1..)]
        emails: Vec<String>,
        /// Role to give them.
        #[arg(long, default_value = DEFAULT_ROLE)]
        role: String,
    },

    /// Remove a collaborator from a task.
    Remove {
        /// Task to change.
        task: TaskId,
        /// User to remove.
        user: UserId,
    },
}

/// Accepts any spelling the backend has used (`in_progress`, `TaskStatus.COMPLETED`).
fn parse_status(raw: &str) -> Result<TaskStatus, String> {
    raw.parse().map_err(|e| format!("{e}"))
}

fn parse_tag(raw: &str) -> Result<TagId, String> {
    raw.trim()
        .parse::<i64>()
        .map(TagId::new)
        .map_err(|_| format!("tag id must be a number, got {raw:?}"))
}
