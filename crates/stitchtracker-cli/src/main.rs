//! stitch - a command-line client for the knitting and crochet project tracker.
//!
//! Sign in once with `stitch login`; the session is persisted and renewed
//! transparently by the core library.

use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use stitchtracker_core::backup::{Backup, BackupLocal};
use stitchtracker_core::models::{tag_names, ProjectFilter, ProjectKind};
use stitchtracker_core::shelf::{ShelfLayout, SLOT_CAPACITY, SLOT_IDS};
use stitchtracker_core::utils::{
    calendar_grid, counts_by_date, intensity, month_labels, WeekStart, MAX_CALENDAR_WEEKS,
};
use stitchtracker_core::{ApiClient, ApiError, Config, SessionManager};

/// Default number of weeks shown by `stitch activity`
const DEFAULT_ACTIVITY_WEEKS: u16 = 26;

/// Calendar shades, indexed by intensity bucket
const SHADES: [char; 5] = ['·', '░', '▒', '▓', '█'];

#[derive(Parser)]
#[command(name = "stitch")]
#[command(about = "Track knitting and crochet projects, yarn and progress")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in with username and password
    Login {
        /// Username (defaults to the last one used)
        username: Option<String>,
    },

    /// Create an account and sign in
    Signup {
        username: String,
        email: String,
    },

    /// Sign out and forget stored tokens
    Logout,

    /// Show session state
    Status,

    /// Show the signed-in account
    Whoami,

    /// Install a token pair obtained from a federated login
    SetTokens {
        access: String,
        refresh: String,
    },

    /// List projects
    Projects {
        /// Case-insensitive name search
        #[arg(short, long)]
        search: Option<String>,

        /// knit or crochet
        #[arg(short, long)]
        kind: Option<ProjectKind>,

        /// Only projects with this tag
        #[arg(short, long)]
        tag: Option<String>,
    },

    /// List the yarn stash
    Yarn,

    /// List tags
    Tags {
        /// Filter tags by name
        search: Option<String>,
    },

    /// Show a calendar of progress updates
    Activity {
        /// Number of weeks to show (1-520)
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_ACTIVITY_WEEKS,
            value_parser = clap::value_parser!(u16).range(1..=MAX_CALENDAR_WEEKS as i64)
        )]
        weeks: u16,

        /// Start weeks on Monday instead of Sunday
        #[arg(long)]
        monday: bool,
    },

    /// Arrange yarn on the stash shelf
    Shelf {
        #[command(subcommand)]
        action: Option<ShelfAction>,
    },

    /// Export all data to a JSON file
    Backup {
        /// Output file
        path: PathBuf,
    },

    /// Restore local-only state (the shelf layout) from a backup file
    RestoreLocal {
        /// Backup file
        path: PathBuf,
    },

    /// Change the account password
    ChangePassword,
}

#[derive(Subcommand)]
enum ShelfAction {
    /// Show every slot and the tray
    Show,

    /// Put a yarn on a slot
    Add {
        #[arg(value_parser = parse_slot)]
        slot: String,
        yarn: i64,
    },

    /// Move a yarn between slots
    Move {
        #[arg(value_parser = parse_slot)]
        from: String,
        #[arg(value_parser = parse_slot)]
        to: String,
        yarn: i64,
    },

    /// Take a yarn off a slot
    Remove {
        #[arg(value_parser = parse_slot)]
        slot: String,
        yarn: i64,
    },

    /// Empty a slot
    Clear {
        #[arg(value_parser = parse_slot)]
        slot: String,
    },
}

fn parse_slot(value: &str) -> std::result::Result<String, String> {
    let slot = value.to_ascii_uppercase();
    if ShelfLayout::is_slot(&slot) {
        Ok(slot)
    } else {
        Err(format!("expected one of {}", SLOT_IDS.join(", ")))
    }
}

/// Initialize the tracing subscriber for logging.
/// The returned guard must live until exit so file logs are flushed.
fn init_tracing(config: &Config, verbose: bool) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (file_layer, guard) = match config.log_file {
        Some(ref path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .context("Log file path has no file name")?;
            let appender = tracing_appender::rolling::daily(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .init();

    Ok(guard)
}

/// Turn an API error into something actionable at the terminal.
fn explain(err: ApiError) -> anyhow::Error {
    match err {
        ApiError::Auth(_) => {
            anyhow::anyhow!("{}\nYour session has ended. Run `stitch login` to sign in again.", err)
        }
        ApiError::Transport(_) => {
            anyhow::anyhow!("{}\nCheck that the server is reachable and try again.", err)
        }
        other => other.into(),
    }
}

fn load_config(path: Option<&Path>) -> Result<(Config, PathBuf)> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => Config::config_path()?,
    };
    let mut config = Config::load_from(&path)?;
    config.apply_env_overrides();
    Ok((config, path))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let (mut config, config_path) = load_config(cli.config.as_deref())?;
    let _guard = init_tracing(&config, cli.verbose)?;
    info!(api_base = %config.api_base, "stitch starting");

    let session = config.build_session()?;
    let client = ApiClient::new(session.clone());

    match cli.command {
        Commands::Login { username } => {
            let username = match username.or_else(|| config.last_username.clone()) {
                Some(username) => username,
                None => prompt("Username: ")?,
            };
            let password = rpassword::prompt_password("Password: ")?;
            session.login(&username, &password).await.map_err(explain)?;

            config.last_username = Some(username.clone());
            config.save_to(&config_path)?;
            println!("Signed in as {}", username);
        }
        Commands::Signup { username, email } => {
            let password = rpassword::prompt_password("Choose a password: ")?;
            let confirm = rpassword::prompt_password("Confirm password: ")?;
            if password != confirm {
                anyhow::bail!("Passwords do not match");
            }
            let user = session
                .register(&username, &email, &password)
                .await
                .map_err(explain)?;

            config.last_username = Some(user.username.clone());
            config.save_to(&config_path)?;
            println!("Welcome, {}! You are signed in.", user.username);
        }
        Commands::Logout => {
            session.logout();
            println!("Signed out");
        }
        Commands::Status => print_status(&session),
        Commands::Whoami => {
            let user = client.current_user().await.map_err(explain)?;
            println!("{} <{}> ({})", user.username, user.email, user.role());
        }
        Commands::SetTokens { access, refresh } => {
            session.set_credentials(access, refresh);
            if !session.is_authenticated() {
                anyhow::bail!("Both tokens must be non-empty");
            }
            println!("Tokens stored");
        }
        Commands::Projects { search, kind, tag } => {
            let filter = ProjectFilter {
                query: search.unwrap_or_default(),
                kind,
                tag,
            };
            let projects = client.list_projects().await.map_err(explain)?;
            let matching = filter.apply(&projects);
            if matching.is_empty() {
                println!("No projects found");
            }
            for project in matching {
                let tags: Vec<&str> = project.tags.iter().map(|t| t.name.as_str()).collect();
                let started = project
                    .start_date
                    .map(|d| d.format("%b %d, %Y").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{:>5}  {:<32} {:<9} started {:<13} {}",
                    project.id,
                    project.name,
                    project.kind.to_string(),
                    started,
                    tags.join(", ")
                );
            }
        }
        Commands::Yarn => {
            let yarn = client.list_yarn().await.map_err(explain)?;
            if yarn.is_empty() {
                println!("Your stash is empty");
            }
            for y in yarn {
                let skeins = y
                    .quantity_owned_skeins
                    .map(|q| format!("{:.2} skeins", q))
                    .unwrap_or_else(|| "-".to_string());
                println!("{:>5}  {:<48} {}", y.id, y.display_name(), skeins);
            }
        }
        Commands::Tags { search } => {
            let tags = client
                .list_tags(search.as_deref().unwrap_or_default())
                .await
                .map_err(explain)?;
            for name in tag_names(&tags) {
                let count = tags
                    .iter()
                    .find(|t| t.name == name)
                    .and_then(|t| t.project_count)
                    .unwrap_or(0);
                println!("{:<24} {}", name, count);
            }
        }
        Commands::Activity { weeks, monday } => {
            let progress = client.list_all_progress(None, None).await.map_err(explain)?;
            let week_start = if monday { WeekStart::Monday } else { WeekStart::Sunday };
            print_activity(&progress, usize::from(weeks), week_start);
        }
        Commands::Shelf { action } => {
            let shelf_path = config.shelf_path()?;
            let mut layout = ShelfLayout::load(&shelf_path);
            let changed = match action.unwrap_or(ShelfAction::Show) {
                ShelfAction::Show => {
                    let yarn = client.list_yarn().await.map_err(explain)?;
                    print_shelf(&layout, &yarn);
                    false
                }
                ShelfAction::Add { slot, yarn } => {
                    if !layout.add(&slot, yarn) {
                        anyhow::bail!(
                            "{} is full or already holds yarn {} (max {} per slot)",
                            slot,
                            yarn,
                            SLOT_CAPACITY
                        );
                    }
                    true
                }
                ShelfAction::Move { from, to, yarn } => {
                    if !layout.move_yarn(&from, &to, yarn) {
                        println!("{} has no room; yarn {} went back to the tray", to, yarn);
                    }
                    true
                }
                ShelfAction::Remove { slot, yarn } => layout.clear_ball(&slot, yarn),
                ShelfAction::Clear { slot } => {
                    layout.clear_all(&slot);
                    true
                }
            };
            if changed {
                layout.save(&shelf_path)?;
            }
        }
        Commands::Backup { path } => {
            let local = BackupLocal {
                shelf_layout: Some(ShelfLayout::load(&config.shelf_path()?)),
            };
            let backup = Backup::collect(&client, local).await.map_err(explain)?;
            backup.save(&path)?;
            println!("Saved {} to {}", backup.summary(), path.display());
        }
        Commands::RestoreLocal { path } => {
            let backup = Backup::load(&path)?;
            if backup.restore_local(&config.shelf_path()?)? {
                println!("Shelf layout restored");
            } else {
                println!("Backup has no local state to restore");
            }
        }
        Commands::ChangePassword => {
            let old = rpassword::prompt_password("Current password: ")?;
            let new = rpassword::prompt_password("New password: ")?;
            client.change_password(&old, &new).await.map_err(explain)?;
            println!("Password changed");
        }
    }

    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    use std::io::Write;

    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        anyhow::bail!("No value entered");
    }
    Ok(value)
}

fn print_status(session: &SessionManager) {
    let status = session.status();
    if !status.authenticated {
        println!("Not signed in");
        return;
    }
    println!("Signed in");
    match status.access_expires_at {
        Some(expiry) => println!(
            "Access token expires {}",
            expiry.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
        ),
        None => println!("Access token expiry unknown"),
    }
    if status.renewal_scheduled {
        println!("Automatic renewal scheduled");
    }
}

fn print_shelf(layout: &ShelfLayout, yarn: &[stitchtracker_core::models::Yarn]) {
    for slot in SLOT_IDS {
        let names: Vec<String> = layout
            .slot(slot)
            .iter()
            .map(|id| match yarn.iter().find(|y| y.id == *id) {
                Some(y) => y.display_name(),
                None => format!("#{}", id),
            })
            .collect();
        println!("{} [{}/{}] {}", slot, names.len(), SLOT_CAPACITY, names.join(", "));
    }

    let tray = layout.tray(yarn);
    if !tray.is_empty() {
        println!();
        println!("Tray:");
        for y in tray {
            println!("{:>5}  {}", y.id, y.display_name());
        }
    }
}

fn print_activity(
    progress: &[stitchtracker_core::models::Progress],
    weeks: usize,
    week_start: WeekStart,
) {
    let counts = counts_by_date(progress);
    let today = Local::now().date_naive();
    let grid = calendar_grid(&counts, today, weeks, week_start);
    let labels = month_labels(&grid);

    let mut header = String::from("    ");
    let mut idx = 0;
    while idx < grid.len() {
        match labels.get(&idx) {
            Some(label) => {
                header.push_str(label);
                idx += label.len();
            }
            None => {
                header.push(' ');
                idx += 1;
            }
        }
    }
    println!("{}", header.trim_end());

    let day_names = match week_start {
        WeekStart::Sunday => ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"],
        WeekStart::Monday => ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"],
    };
    for (row, name) in day_names.iter().enumerate() {
        let cells: String = grid
            .iter()
            .map(|column| {
                let day = column[row];
                if day.date > today {
                    ' '
                } else {
                    SHADES[usize::from(intensity(day.count))]
                }
            })
            .collect();
        println!("{} {}", name, cells);
    }

    let total: u32 = grid.iter().flatten().map(|d| d.count).sum();
    println!("{} progress updates in the last {} weeks", total, weeks);
}
