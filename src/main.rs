use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::rc::Rc;
use tracing_subscriber::EnvFilter;

use applytrack::auth::{AuthProvider, LocalAuth};
use applytrack::board::{BoardFilter, ColumnSort, SortKey, SortOrder};
use applytrack::db::Database;
use applytrack::drag::{DragController, DragEvent, DropDecision, DropLocation, REJECTION_REASONS};
use applytrack::export::export_filename;
use applytrack::models::{
    parse_optional_date, parse_optional_time, Application, ApplicationDraft, ApplicationStatus,
};
use applytrack::{tui, Tracker};

type LocalTracker = Tracker<Rc<Database>, LocalAuth>;

#[derive(Parser)]
#[command(name = "applytrack")]
#[command(about = "Track job applications on a Kanban board")]
struct Cli {
    /// Database file (defaults to $APPLYTRACK_DB, then the platform data directory)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Sign in as a user (creates the profile on first use)
    Login {
        email: String,

        /// Display name
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Sign out
    Logout,

    /// Show the signed-in user
    Whoami,

    /// Add an application
    Add {
        #[command(flatten)]
        fields: FieldArgs,
    },

    /// Edit an application (only the given fields change)
    Edit {
        /// Application ID or unique prefix
        id: String,

        #[command(flatten)]
        fields: FieldArgs,
    },

    /// List applications
    List {
        #[command(flatten)]
        filter: FilterArgs,

        /// Only show this status
        #[arg(long)]
        status: Option<ApplicationStatus>,

        /// Sort by column (company, title, status, location, applied, created)
        #[arg(long)]
        by: Option<SortKey>,

        /// Ascending column sort (default descending)
        #[arg(long, requires = "by")]
        asc: bool,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Show application details and notes
    Show {
        /// Application ID or unique prefix
        id: String,
    },

    /// Move an application to another column
    Move {
        /// Application ID or unique prefix
        id: String,

        /// Target status (wishlist, applied, interviewing, offer, rejected)
        status: ApplicationStatus,

        /// Rejection category, by name or number from `applytrack reasons`
        #[arg(short, long)]
        reason: Option<String>,

        /// Optional rejection details
        #[arg(short, long, default_value = "")]
        detail: String,
    },

    /// Delete an application and its notes
    Delete {
        /// Application ID or unique prefix
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Manage notes
    Note {
        #[command(subcommand)]
        command: NoteCommands,
    },

    /// Export applications as CSV
    Export {
        #[command(flatten)]
        filter: FilterArgs,

        /// Output path (defaults to applications-YYYY-MM-DD.csv)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List rejection categories
    Reasons,

    /// Open the interactive board
    Board,
}

#[derive(Subcommand)]
enum NoteCommands {
    /// Add a note to an application
    Add {
        /// Application ID or unique prefix
        id: String,
        content: String,
    },

    /// List notes of an application
    List {
        /// Application ID or unique prefix
        id: String,
    },

    /// Delete a note
    Delete {
        /// Application ID or unique prefix
        id: String,
        note_id: String,
    },
}

#[derive(Args)]
struct FieldArgs {
    /// Company name
    #[arg(short, long)]
    company: Option<String>,

    /// Job title
    #[arg(short, long)]
    title: Option<String>,

    /// Status (wishlist, applied, interviewing, offer, rejected)
    #[arg(short, long)]
    status: Option<ApplicationStatus>,

    /// Job posting URL
    #[arg(long)]
    url: Option<String>,

    /// Location
    #[arg(short, long)]
    location: Option<String>,

    /// Applied date (YYYY-MM-DD, defaults to today for new applications)
    #[arg(short, long)]
    applied: Option<NaiveDate>,

    /// Comma-separated tags
    #[arg(long)]
    tags: Option<String>,

    /// Rejection reason
    #[arg(long)]
    reason: Option<String>,

    /// Interview date (YYYY-MM-DD, empty to clear)
    #[arg(long)]
    interview_date: Option<String>,

    /// Interview time (HH:MM, empty to clear)
    #[arg(long)]
    interview_time: Option<String>,
}

impl FieldArgs {
    fn apply_to(self, draft: &mut ApplicationDraft) -> applytrack::Result<()> {
        if let Some(company) = self.company {
            draft.company_name = company;
        }
        if let Some(title) = self.title {
            draft.job_title = title;
        }
        if let Some(status) = self.status {
            draft.status = status;
        }
        if let Some(url) = self.url {
            draft.job_url = Some(url);
        }
        if let Some(location) = self.location {
            draft.location = Some(location);
        }
        if let Some(applied) = self.applied {
            draft.applied_date = Some(applied);
        }
        if let Some(tags) = self.tags {
            draft.tags_input = tags;
        }
        if let Some(reason) = self.reason {
            draft.rejection_reason = Some(reason);
        }
        if let Some(date) = self.interview_date {
            draft.interview_date = parse_optional_date(&date)?;
        }
        if let Some(time) = self.interview_time {
            draft.interview_time = parse_optional_time(&time)?;
        }
        Ok(())
    }
}

#[derive(Args)]
struct FilterArgs {
    /// Only this company
    #[arg(long)]
    company: Option<String>,

    /// Only this location
    #[arg(long)]
    location: Option<String>,

    /// newest or oldest
    #[arg(long, default_value = "newest")]
    sort: SortOrder,
}

impl From<FilterArgs> for BoardFilter {
    fn from(args: FilterArgs) -> Self {
        BoardFilter {
            company: args.company.unwrap_or_default(),
            location: args.location.unwrap_or_default(),
            sort_order: args.sort,
        }
    }
}

fn init_logging(verbose: bool, interactive: bool) {
    let default = if verbose {
        "debug"
    } else if interactive {
        // stderr output would tear the alternate screen
        "off"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Board));

    let db = Rc::new(Database::open_at(&Database::resolve_path(cli.db))?);
    if !matches!(cli.command, Commands::Init) {
        db.ensure_initialized()?;
    }

    let auth = LocalAuth::new(Rc::clone(&db));
    let mut tracker = Tracker::new(Rc::clone(&db), auth);

    match cli.command {
        Commands::Init => {
            db.init()?;
            println!("Database initialized at {}", db.path().display());
        }

        Commands::Login { email, name } => {
            let identity = tracker.auth().sign_in(&email, name.as_deref())?;
            println!("Signed in as {}", identity.email);
        }

        Commands::Logout => {
            tracker.auth().sign_out()?;
            println!("Signed out.");
        }

        Commands::Whoami => match tracker.auth().get_session()? {
            Some(session) => {
                let profile = db.get_profile(&session.identity.user_id)?;
                match profile.and_then(|p| p.full_name) {
                    Some(name) => println!("{} <{}>", name, session.identity.email),
                    None => println!("{}", session.identity.email),
                }
                println!("Signed in since {}", session.created_at);
            }
            None => println!("Not signed in."),
        },

        Commands::Add { fields } => {
            let mut draft = ApplicationDraft {
                applied_date: Some(chrono::Local::now().date_naive()),
                ..Default::default()
            };
            fields.apply_to(&mut draft)?;
            let app = tracker.create_application(&draft)?;
            println!("Added application #{}", short_id(&app.id));
        }

        Commands::Edit { id, fields } => {
            let app = tracker.resolve_application(&id)?;
            let mut draft = ApplicationDraft::from(&app);
            fields.apply_to(&mut draft)?;
            tracker.update_application(&app.id, &draft)?;
            println!("Updated application #{}", short_id(&app.id));
        }

        Commands::List {
            filter,
            status,
            by,
            asc,
            json,
        } => {
            let column = by.map(|key| ColumnSort {
                key,
                ascending: asc,
            });
            let mut apps = tracker.list(&BoardFilter::from(filter), column)?;
            if let Some(status) = status {
                apps.retain(|app| app.status == status);
            }

            if json {
                println!("{}", serde_json::to_string_pretty(&apps)?);
            } else if apps.is_empty() {
                println!("No applications found.");
            } else {
                print_table(&apps);
            }
        }

        Commands::Show { id } => {
            let app = tracker.resolve_application(&id)?;
            print_application(&app);
            let notes = tracker.notes(&app.id)?;
            if !notes.is_empty() {
                println!("\n--- Notes ({}) ---", notes.len());
                for note in notes {
                    println!("[{}] {}", short_id(&note.id), note.created_at);
                    println!("{}\n", textwrap::indent(&textwrap::fill(&note.content, 76), "  "));
                }
            }
        }

        Commands::Move {
            id,
            status,
            reason,
            detail,
        } => {
            let app = tracker.resolve_application(&id)?;
            move_application(&mut tracker, &app, status, reason.as_deref(), &detail)?;
        }

        Commands::Delete { id, yes } => {
            let app = tracker.resolve_application(&id)?;
            let label = format!("{} - {}", app.company_name, app.job_title);
            if !yes && !confirm(&format!("Delete '{}' and its notes?", label))? {
                println!("Kept.");
                return Ok(());
            }
            tracker.delete_application(&app.id)?;
            println!("Deleted '{}'.", label);
        }

        Commands::Note { command } => match command {
            NoteCommands::Add { id, content } => {
                let app = tracker.resolve_application(&id)?;
                let note = tracker.add_note(&app.id, &content)?;
                println!("Added note #{} to {}", short_id(&note.id), app.company_name);
            }
            NoteCommands::List { id } => {
                let app = tracker.resolve_application(&id)?;
                let notes = tracker.notes(&app.id)?;
                if notes.is_empty() {
                    println!("No notes for {}.", app.company_name);
                }
                for note in notes {
                    println!("{:<10} {:<28} {}", short_id(&note.id), note.created_at, truncate(&note.content, 60));
                }
            }
            NoteCommands::Delete { id, note_id } => {
                let app = tracker.resolve_application(&id)?;
                let note_id = resolve_note_id(&mut tracker, &app.id, &note_id)?;
                tracker.delete_note(&app.id, &note_id)?;
                println!("Deleted note #{}.", short_id(&note_id));
            }
        },

        Commands::Export { filter, output } => {
            let csv = tracker.export_csv(&BoardFilter::from(filter), None)?;
            let path = output
                .unwrap_or_else(|| PathBuf::from(export_filename(chrono::Local::now().date_naive())));
            std::fs::write(&path, csv)
                .with_context(|| format!("Failed to write to {}", path.display()))?;
            println!("Exported to {}", path.display());
        }

        Commands::Reasons => {
            for (i, reason) in REJECTION_REASONS.iter().enumerate() {
                println!("{:>2}. {}", i + 1, reason);
            }
        }

        Commands::Board => {
            tracker.current_user()?;
            tui::run_board(&mut tracker)?;
        }
    }

    Ok(())
}

/// Runs a move through the same drag controller the board uses.
fn move_application(
    tracker: &mut LocalTracker,
    app: &Application,
    status: ApplicationStatus,
    reason: Option<&str>,
    detail: &str,
) -> Result<()> {
    let mut dnd = DragController::new();
    let drop = DragEvent::Drop {
        id: app.id.clone(),
        source: DropLocation {
            column: app.status,
            index: 0,
        },
        destination: Some(DropLocation {
            column: status,
            index: 0,
        }),
    };

    match tracker.handle_drag(&mut dnd, drop)? {
        DropDecision::Ignore => println!("Already in {}.", status.column().title),
        DropDecision::Mutate(change) => {
            println!("Moved {} to {}.", app.company_name, change.status.column().title)
        }
        DropDecision::AwaitReason { .. } => {
            let Some(reason) = reason else {
                dnd.cancel_rejection();
                bail!("Moving to Rejected needs --reason (see 'applytrack reasons')");
            };
            let category = resolve_reason(reason)?;
            tracker.confirm_rejection(&mut dnd, &category, detail)?;
            println!("Marked {} as rejected.", app.company_name);
        }
    }
    Ok(())
}

/// Accepts a 1-based index into the canonical list or free text.
fn resolve_reason(reason: &str) -> Result<String> {
    if let Ok(n) = reason.trim().parse::<usize>() {
        return REJECTION_REASONS
            .get(n.wrapping_sub(1))
            .map(|r| r.to_string())
            .ok_or_else(|| anyhow!("Reason number must be 1-{}", REJECTION_REASONS.len()));
    }
    Ok(reason.to_string())
}

fn resolve_note_id(tracker: &mut LocalTracker, application_id: &str, needle: &str) -> Result<String> {
    let notes = tracker.notes(application_id)?;
    let matches: Vec<&str> = notes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| *id == needle || id.starts_with(needle))
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.to_string()),
        [] => Err(anyhow!("Note #{} not found", needle)),
        _ => Err(anyhow!("Note prefix '{}' is ambiguous", needle)),
    }
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn print_table(apps: &[Application]) {
    println!(
        "{:<10} {:<13} {:<22} {:<26} {:<16} {:<10}",
        "ID", "STATUS", "COMPANY", "TITLE", "LOCATION", "APPLIED"
    );
    println!("{}", "-".repeat(102));
    for app in apps {
        println!(
            "{:<10} {:<13} {:<22} {:<26} {:<16} {:<10}",
            short_id(&app.id),
            app.status,
            truncate(&app.company_name, 20),
            truncate(&app.job_title, 24),
            truncate(app.location.as_deref().unwrap_or("-"), 14),
            app.applied_date.map(|d| d.to_string()).unwrap_or_else(|| "-".to_string()),
        );
    }
}

fn print_application(app: &Application) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company_name);
    println!("Title: {}", app.job_title);
    println!("Status: {}", app.status.column().title);
    if let Some(location) = &app.location {
        println!("Location: {}", location);
    }
    if let Some(date) = app.applied_date {
        println!("Applied: {}", date);
    }
    if let Some(url) = &app.job_url {
        println!("URL: {}", url);
    }
    if let Some(slot) = app.interview_slot() {
        println!("Interview: {}", slot);
    }
    if !app.tags.is_empty() {
        println!("Tags: {}", app.tags.join(", "));
    }
    if let Some(reason) = &app.rejection_reason {
        println!("Rejection reason: {}", reason);
    }
    println!("Created: {}", app.created_at);
    println!("Updated: {}", app.last_updated);
}

fn short_id(id: &str) -> &str {
    id.get(..8).unwrap_or(id)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
