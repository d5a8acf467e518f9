//! `taskdeck`: terminal client for the Taskdeck task service.
//!
//! Configuration via CLI flags, environment variables, or config file
//! (`~/.config/taskdeck/config.toml`).
//!
//! ```bash
//! export TASKDECK_API_URL=https://tasks.example.com/api/v1
//! taskdeck signin --email a@b.com --password secret1A
//! taskdeck tasks create --title "Write docs" --content "Cover the CLI" --tag 1
//! taskdeck tasks list
//! ```
//!
//! Exit codes: 0 success, 1 operation failed, 2 configuration error,
//! 3 backend unavailable (including a timeout or outage mid-command, which
//! is worth retrying).

use std::io::{BufRead, IsTerminal, Write};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser};
use tracing_appender::non_blocking::WorkerGuard;

use taskdeck::api::ApiError;
use taskdeck::app::{App, Bootstrap, Notice};
use taskdeck::cache::{ShareReport, Synced};
use taskdeck::cli::{CollabCommand, Command, CreateArgs, TaskCommand, UpdateArgs};
use taskdeck::config::{CliArgs, ClientConfig};
use taskdeck::session::{FileStorage, MemoryStorage, SessionStorage, SessionStore};
use taskdeck_proto::auth::{CreateAccount, SignIn};
use taskdeck_proto::collaborator::AddCollaborator;
use taskdeck_proto::task::{NewTask, TaskStatus, TaskUpdate};

const EXIT_FAILURE: u8 = 1;
const EXIT_CONFIG: u8 = 2;
const EXIT_UNHEALTHY: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = CliArgs::parse();

    // Logs go to a file; stdout carries command output.
    let _log_guard = init_logging(&cli.log_level, cli.log_file.as_deref());

    let config = match ClientConfig::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", Notice::error(e.to_string()));
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let Some(command) = cli.command else {
        // `arg_required_else_help` keeps clap from getting here.
        let _ = CliArgs::command().print_help();
        return ExitCode::from(EXIT_FAILURE);
    };

    tracing::info!("taskdeck starting");
    let code = run(command, &config).await;
    tracing::info!(code, "taskdeck exiting");
    ExitCode::from(code)
}

/// Initialize file-based logging.
///
/// Returns a [`WorkerGuard`] that must be held until shutdown to ensure all
/// buffered log entries are flushed.
fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("taskdeck.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}

fn session_storage(config: &ClientConfig) -> Arc<dyn SessionStorage> {
    if let Some(path) = config.session_path() {
        Arc::new(FileStorage::new(path))
    } else {
        tracing::warn!("no data directory; the session will not survive this process");
        Arc::new(MemoryStorage::new())
    }
}

async fn run(command: Command, config: &ClientConfig) -> u8 {
    let storage = session_storage(config);

    if !command.needs_backend() {
        return run_local(&command, &SessionStore::load(storage));
    }

    let api_config = match config.api_config() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", Notice::from_error(&ApiError::from(e)));
            return EXIT_CONFIG;
        }
    };

    let mut outcome = App::bootstrap(api_config, storage).await;
    let app = loop {
        match outcome {
            Ok(Bootstrap::Ready(app)) => break app,
            Ok(Bootstrap::Unavailable(unavailable)) => {
                eprintln!("{}", unavailable.notice());
                if !confirm_retry().await {
                    return EXIT_UNHEALTHY;
                }
                outcome = unavailable.retry().await;
            }
            Err(e) => {
                eprintln!("{}", Notice::from_error(&e));
                return failure_code(&e);
            }
        }
    };

    match dispatch(command, &app).await {
        Ok(notices) => {
            let mut code = 0;
            for notice in &notices {
                if notice.is_error() {
                    eprintln!("{notice}");
                    code = EXIT_FAILURE;
                } else {
                    println!("{notice}");
                }
            }
            code
        }
        Err(e) => {
            let notice = Notice::from_error(&e);
            if notice.is_error() {
                eprintln!("{notice}");
                failure_code(&e)
            } else {
                println!("{notice}");
                0
            }
        }
    }
}

/// Exit code for a failed command.
fn failure_code(err: &ApiError) -> u8 {
    if err.is_transient() {
        tracing::warn!(error = %err, "backend unavailable mid-command");
        EXIT_UNHEALTHY
    } else {
        EXIT_FAILURE
    }
}

/// Commands that only touch the stored session.
fn run_local(command: &Command, session: &SessionStore) -> u8 {
    match command {
        Command::Logout => {
            session.logout();
            println!("{}", Notice::success("Signed out"));
        }
        _ => {
            if session.is_logged_in() {
                println!("Signed in");
            } else {
                println!("Not signed in");
            }
        }
    }
    0
}

/// Asks whether to run the bootstrap again. Only when stdin is a terminal.
async fn confirm_retry() -> bool {
    if !std::io::stdin().is_terminal() {
        return false;
    }
    tokio::task::spawn_blocking(|| {
        eprint!("Retry connection? [y/N] ");
        let _ = std::io::stderr().flush();
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line).is_ok()
            && matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    })
    .await
    .unwrap_or(false)
}

async fn dispatch(command: Command, app: &App) -> Result<Vec<Notice>, ApiError> {
    match command {
        Command::Health => Ok(vec![Notice::success(format!(
            "Backend healthy at {}",
            app.api().base_url()
        ))]),
        Command::Signup {
            username,
            email,
            password,
        } => {
            let notice = app
                .sign_up(&CreateAccount {
                    username,
                    email,
                    password,
                })
                .await?;
            Ok(vec![notice])
        }
        Command::Signin { email, password } => {
            app.sign_in(&SignIn { email, password }).await?;
            Ok(vec![Notice::success("Signed in")])
        }
        Command::Logout | Command::Session => Ok(Vec::new()),
        Command::Tasks(cmd) => tasks(cmd, app).await,
        Command::Tags => {
            app.tags.refresh().await?;
            for tag in app.tags.tags() {
                println!("{}\t{}", tag.id, tag.name);
            }
            Ok(Vec::new())
        }
        Command::Collab(cmd) => collab(cmd, app).await,
    }
}

async fn tasks(cmd: TaskCommand, app: &App) -> Result<Vec<Notice>, ApiError> {
    match cmd {
        TaskCommand::List { status } => {
            let load = app.load_dashboard().await;
            load.tasks?;
            print_tasks(app, status);
            // Tag names are cosmetic here; ids are printed instead.
            Ok(load
                .tags
                .err()
                .map(|e| Notice::info(format!("Tag names unavailable: {e}")))
                .into_iter()
                .collect())
        }
        TaskCommand::Shared => {
            let (shared, _) =
                futures_util::future::join(app.shared.refresh(), app.tags.refresh()).await;
            shared?;
            let tasks = app.shared.tasks();
            if tasks.is_empty() {
                println!("Nothing is shared with you yet");
            }
            for shared in tasks {
                let task = &shared.task;
                println!(
                    "{}\t[{}]\t{}\t{}\t({})",
                    task.id,
                    task.status.label(),
                    task.title,
                    tag_label(app, task),
                    shared.role.as_deref().unwrap_or("collaborator"),
                );
            }
            Ok(Vec::new())
        }
        TaskCommand::Stats => {
            app.tasks.refresh().await?;
            let stats = app.tasks.stats();
            println!("Pending:     {}", stats.pending);
            println!("In progress: {}", stats.in_progress);
            println!("Completed:   {}", stats.completed);
            println!("Total:       {}", stats.total());
            Ok(Vec::new())
        }
        TaskCommand::Create(CreateArgs {
            title,
            content,
            tag,
            status,
        }) => {
            let synced = app
                .tasks
                .create(&NewTask {
                    title,
                    content,
                    tag_id: tag,
                    status,
                })
                .await?;
            Ok(mutation_notices("Task created", synced))
        }
        TaskCommand::Update(UpdateArgs {
            id,
            title,
            content,
            tag,
            status,
        }) => {
            let update = TaskUpdate {
                title,
                content,
                tag_id: tag,
                status,
            };
            let synced = app.tasks.update(&id, &update).await?;
            Ok(mutation_notices("Task updated", synced))
        }
        TaskCommand::Delete { id } => {
            let synced = app.tasks.delete(&id).await?;
            Ok(mutation_notices("Task deleted", synced))
        }
    }
}

async fn collab(cmd: CollabCommand, app: &App) -> Result<Vec<Notice>, ApiError> {
    match cmd {
        CollabCommand::List { task } => {
            app.collaborators.refresh(&task).await?;
            let collaborators = app.collaborators.collaborators(&task);
            if collaborators.is_empty() {
                println!("No collaborators yet");
            }
            for c in collaborators {
                println!("{}\t{}", c.display_name(), c.role);
            }
            Ok(Vec::new())
        }
        CollabCommand::Add { task, emails, role } => {
            if let [email] = emails.as_slice() {
                let request = AddCollaborator {
                    email: email.clone(),
                    role,
                };
                let synced = app.collaborators.add(&task, &request).await?;
                return Ok(mutation_notices(&format!("Shared with {email}"), synced));
            }
            let report = app.collaborators.share_many(&task, emails, &role).await?;
            Ok(share_notices(report))
        }
        CollabCommand::Remove { task, user } => {
            let synced = app.collaborators.remove(&task, &user).await?;
            Ok(mutation_notices("Collaborator removed", synced))
        }
    }
}

fn print_tasks(app: &App, status: Option<TaskStatus>) {
    let tasks: Vec<_> = app
        .tasks
        .tasks()
        .into_iter()
        .filter(|t| status.is_none_or(|s| t.status == s))
        .collect();
    if tasks.is_empty() {
        println!("No tasks");
    }
    for task in tasks {
        println!(
            "{}\t[{}]\t{}\t{}",
            task.id,
            task.status.label(),
            task.title,
            tag_label(app, &task)
        );
    }
}

fn tag_label(app: &App, task: &taskdeck_proto::task::Task) -> String {
    task.primary_tag()
        .map_or_else(|| "-".to_string(), |tag| app.tags.label(tag))
}

fn mutation_notices(done: &str, synced: Synced) -> Vec<Notice> {
    match synced {
        Synced::Fresh => vec![Notice::success(done)],
        Synced::Stale(e) => vec![
            Notice::success(done),
            Notice::info(format!("The list could not be refreshed: {e}")),
        ],
    }
}

fn share_notices(report: ShareReport) -> Vec<Notice> {
    let mut notices = Vec::new();
    if !report.added.is_empty() {
        notices.push(Notice::success(format!(
            "Shared with {}",
            report.added.join(", ")
        )));
    }
    for failure in &report.failed {
        let mut notice = Notice::from_error(&failure.error);
        notice.message = format!("{}: {}", failure.email, notice.message);
        notices.push(notice);
    }
    if let Some(Synced::Stale(e)) = &report.synced {
        notices.push(Notice::info(format!("The list could not be refreshed: {e}")));
    }
    notices
}
