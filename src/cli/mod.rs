//! Command-line interface for ticketdesk.
//!
//! Provides commands for previewing and running staged deletions, resuming
//! interrupted sessions, ingesting a mailbox export, and editing tickets
//! with change history.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::adapters::{EventSource, JsonlMailbox};
use crate::config::{self, ResolvedConfig};
use crate::core::{
    add_comment, build_plan, build_plan_with_key, history, update_field, AuditLogger, DeletionPlan,
    DeletionSession, SessionStatus, SessionStore, StepDecision, StepOutcome, TicketField,
};
use crate::domain::EntityType;
use crate::ingest::Ingestor;
use crate::store::Database;

/// ticketdesk - data consistency tools for the ticket desk database
#[derive(Parser, Debug)]
#[command(name = "ticketdesk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create the database and state directories
    Init,

    /// Show the deletion plan for an entity without changing anything
    Plan {
        /// Entity type (ticket, employee, customer, category, status, role, or a table name)
        entity: String,

        /// Entity id
        id: i64,

        /// Print the plan as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete an entity step by step
    Delete {
        /// Entity type (ticket, employee, customer, category, status, role, or a table name)
        entity: String,

        /// Entity id
        id: i64,

        /// Confirm the plan and every step without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// Continue an interrupted deletion
    Resume {
        /// Session ID (UUID)
        session_id: String,

        /// Confirm every remaining step without prompting
        #[arg(short, long)]
        yes: bool,
    },

    /// List saved deletion sessions
    Sessions,

    /// Create tickets from a mailbox export
    Ingest {
        /// JSONL mailbox file (defaults to paths.mailbox from the config)
        #[arg(short, long, env = "TICKETDESK_MAILBOX")]
        mailbox: Option<PathBuf>,

        /// Maximum number of recent messages to read
        #[arg(short, long)]
        limit: Option<usize>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the change history of a ticket
    History {
        /// Ticket id
        ticket_id: i64,
    },

    /// Change one ticket field and record it in the history
    Set {
        /// Ticket id
        ticket_id: i64,

        /// Field (title, description, priority, status, customer, employee, category)
        field: TicketField,

        /// New value (ids for status, customer, employee and category; empty clears)
        value: String,

        /// Employee id making the change
        #[arg(long)]
        actor: i64,
    },

    /// Add a comment to a ticket and record it in the history
    Comment {
        /// Ticket id
        ticket_id: i64,

        /// Comment text
        body: String,

        /// Employee id writing the comment
        #[arg(long)]
        actor: i64,
    },

    /// Show resolved configuration (debug)
    Config,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Init => init(),
            Commands::Plan { entity, id, json } => show_plan(&entity, id, json),
            Commands::Delete { entity, id, yes } => delete_entity(&entity, id, yes),
            Commands::Resume { session_id, yes } => resume_session(&session_id, yes),
            Commands::Sessions => list_sessions(),
            Commands::Ingest {
                mailbox,
                limit,
                json,
            } => ingest_mailbox(mailbox, limit, json),
            Commands::History { ticket_id } => show_history(ticket_id),
            Commands::Set {
                ticket_id,
                field,
                value,
                actor,
            } => set_field(ticket_id, field, &value, actor),
            Commands::Comment {
                ticket_id,
                body,
                actor,
            } => comment_on(ticket_id, &body, actor),
            Commands::Config => show_config(),
        }
    }
}

fn open_database(cfg: &ResolvedConfig) -> Result<Database> {
    Database::open(&cfg.database, &cfg.store)
        .with_context(|| format!("Failed to open database: {}", cfg.database.display()))
}

fn open_sessions(cfg: &ResolvedConfig) -> Result<SessionStore> {
    let dir = cfg.sessions_dir();
    SessionStore::open(&dir)
        .with_context(|| format!("Failed to open sessions directory: {}", dir.display()))
}

/// Create the database and sessions directory
fn init() -> Result<()> {
    let cfg = config::config()?;
    open_database(cfg)?;
    open_sessions(cfg)?;

    println!("Database:  {}", cfg.database.display());
    println!("Sessions:  {}", cfg.sessions_dir().display());
    Ok(())
}

/// Build a plan, resolving the key column of unknown tables from the schema
fn plan_for(db: &Database, entity: &EntityType, id: i64) -> Result<DeletionPlan> {
    if entity.is_known() {
        return Ok(build_plan(entity, id)?);
    }

    let key = db
        .primary_key_column(entity.relation())?
        .with_context(|| format!("Table '{}' does not exist", entity.relation()))?;
    Ok(build_plan_with_key(entity, id, &key)?)
}

fn print_plan(db: &Database, plan: &DeletionPlan) -> Result<()> {
    println!(
        "Deletion plan for {} {} ({} steps):",
        plan.entity_type(),
        plan.entity_id(),
        plan.len()
    );
    println!(
        "  {:<3} {:<20} {:<7} {:<18} {:<14} {:>5}",
        "#", "STEP", "KIND", "RELATION", "WHERE", "ROWS"
    );
    println!("  {}", "-".repeat(72));

    for (index, step) in plan.steps().iter().enumerate() {
        let rows = db.count_where(&step.relation, &step.predicate.column, step.predicate.value)?;
        println!(
            "  {:<3} {:<20} {:<7} {:<18} {:<14} {:>5}",
            index + 1,
            step.name,
            step.kind.to_string(),
            step.relation,
            format!("{} = {}", step.predicate.column, step.predicate.value),
            rows
        );
    }
    Ok(())
}

/// Preview a deletion plan
fn show_plan(entity: &str, id: i64, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let db = open_database(cfg)?;
    let plan = plan_for(&db, &EntityType::parse(entity), id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        print_plan(&db, &plan)?;
    }
    Ok(())
}

/// Start a new staged deletion
fn delete_entity(entity: &str, id: i64, assume_yes: bool) -> Result<()> {
    let cfg = config::config()?;
    let mut db = open_database(cfg)?;
    let store = open_sessions(cfg)?;

    let mut session = DeletionSession::start(&db, EntityType::parse(entity), id)?;
    store.save(&session)?;
    eprintln!("[Session {}]", session.id());

    drive(&mut db, &store, &mut session, assume_yes)
}

/// Resume a saved deletion session
fn resume_session(session_id: &str, assume_yes: bool) -> Result<()> {
    let id = Uuid::parse_str(session_id)
        .with_context(|| format!("Invalid session ID: {}", session_id))?;

    let cfg = config::config()?;
    let mut db = open_database(cfg)?;
    let store = open_sessions(cfg)?;
    let mut session = store.load(id)?;

    let progress = session.progress();
    eprintln!(
        "[Session {} resumed: {} {} at step {}/{}]",
        session.id(),
        session.entity_type(),
        session.entity_id(),
        progress.cursor + 1,
        progress.total
    );
    if let Some(error) = session.last_error() {
        eprintln!("  last error: {error}");
    }

    drive(&mut db, &store, &mut session, assume_yes)
}

enum StepAction {
    Confirm,
    Skip,
    Abort,
}

/// Walk a session through confirmation and its remaining steps, saving
/// after every transition.
fn drive(
    db: &mut Database,
    store: &SessionStore,
    session: &mut DeletionSession,
    assume_yes: bool,
) -> Result<()> {
    if session.status() == SessionStatus::Confirming {
        if let Some(plan) = session.plan() {
            print_plan(db, plan)?;
        }

        let approve = assume_yes
            || prompt_yes_no(&format!(
                "Delete {} {} and its dependents?",
                session.entity_type(),
                session.entity_id()
            ))?;
        session.confirm(db, approve)?;

        if !approve {
            store.remove(session.id())?;
            println!("Cancelled; nothing was changed.");
            return Ok(());
        }
        store.save(session)?;
    }

    while let Some(step) = session.next_step().cloned() {
        let progress = session.progress();
        println!("[{}/{}] {}", progress.cursor + 1, progress.total, step);

        let action = if assume_yes {
            StepAction::Confirm
        } else {
            prompt_step_action()?
        };
        let decision = match action {
            StepAction::Confirm => StepDecision::Confirm,
            StepAction::Skip => StepDecision::Skip,
            StepAction::Abort => {
                session.abort()?;
                store.save(session)?;
                println!(
                    "Aborted after {} of {} steps; completed steps remain in effect.",
                    progress.cursor, progress.total
                );
                return Ok(());
            }
        };

        match session.run_step(db, decision) {
            Ok(result) => match result.outcome {
                StepOutcome::Executed { rows_affected } => {
                    println!("  done ({rows_affected} row(s))");
                }
                StepOutcome::Skipped => println!("  skipped"),
            },
            Err(err) => {
                store.save(session)?;
                eprintln!("  failed [{}]: {}", err.class(), err);
                if assume_yes {
                    anyhow::bail!(
                        "Step '{}' failed; fix the cause and run `ticketdesk resume {}`",
                        step.name,
                        session.id()
                    );
                }
                continue;
            }
        }
        store.save(session)?;
    }

    if session.status() == SessionStatus::Done {
        println!(
            "Deleted {} {}.",
            session.entity_type(),
            session.entity_id()
        );
    }
    Ok(())
}

fn read_answer(question: &str) -> Result<Option<String>> {
    print!("{question} ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut line = String::new();
    let read = io::stdin()
        .read_line(&mut line)
        .context("Failed to read from stdin")?;
    if read == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_ascii_lowercase()))
}

fn prompt_yes_no(question: &str) -> Result<bool> {
    let answer = read_answer(&format!("{question} [y/N]"))?;
    Ok(matches!(answer.as_deref(), Some("y" | "yes")))
}

/// End of input counts as abort
fn prompt_step_action() -> Result<StepAction> {
    loop {
        match read_answer("  [c]onfirm, [s]kip or [a]bort?")?.as_deref() {
            Some("c" | "confirm" | "y" | "yes") => return Ok(StepAction::Confirm),
            Some("s" | "skip") => return Ok(StepAction::Skip),
            Some("a" | "abort") | None => return Ok(StepAction::Abort),
            Some(_) => continue,
        }
    }
}

/// List saved sessions
fn list_sessions() -> Result<()> {
    let cfg = config::config()?;
    let store = open_sessions(cfg)?;
    let sessions = store.list()?;

    if sessions.is_empty() {
        println!("No open sessions");
        return Ok(());
    }

    println!(
        "{:<38} {:<20} {:<12} {:<8} {}",
        "SESSION ID", "TARGET", "STATUS", "STEP", "UPDATED"
    );
    println!("{}", "-".repeat(100));

    for session in sessions {
        let progress = session.progress();
        println!(
            "{:<38} {:<20} {:<12} {:<8} {}",
            session.id(),
            format!("{} {}", session.entity_type(), session.entity_id()),
            session.status().to_string(),
            format!("{}/{}", progress.cursor, progress.total),
            session.updated_at().format("%Y-%m-%d %H:%M:%S")
        );
    }

    Ok(())
}

/// Ingest the configured mailbox export
fn ingest_mailbox(mailbox: Option<PathBuf>, limit: Option<usize>, json: bool) -> Result<()> {
    let cfg = config::config()?;
    let path = mailbox
        .or_else(|| cfg.mailbox.clone())
        .context("No mailbox given. Use --mailbox <file> or set paths.mailbox in the config")?;

    let mut db = open_database(cfg)?;
    let mut source =
        JsonlMailbox::new(&path).with_limit(limit.unwrap_or(cfg.ingest.fetch_limit));
    let ingestor = Ingestor::new(cfg.ingest.defaults());

    let report = ingestor
        .poll(&mut db, &mut source)
        .with_context(|| format!("Failed to ingest from {} ({})", path.display(), source.name()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "created: {}  skipped: {}  failed: {}",
        report.created, report.skipped, report.failed
    );
    for ticket in &report.tickets {
        println!("  + ticket {} from {}", ticket.ticket_id, ticket.external_id);
    }
    for failure in &report.failures {
        println!("  ! {} [{}]: {}", failure.external_id, failure.class, failure.error);
    }
    Ok(())
}

/// Print a ticket's change history
fn show_history(ticket_id: i64) -> Result<()> {
    let cfg = config::config()?;
    let db = open_database(cfg)?;
    let entries = history(&db, ticket_id)?;

    if entries.is_empty() {
        println!("No history for ticket {ticket_id}");
        return Ok(());
    }

    for entry in entries {
        let actor = entry
            .actor_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}  {:<12} {:?} -> {:?}  (by {})",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.field_name,
            entry.old_value,
            entry.new_value,
            actor
        );
    }
    Ok(())
}

/// Edit one ticket field with change history
fn set_field(ticket_id: i64, field: TicketField, value: &str, actor: i64) -> Result<()> {
    let cfg = config::config()?;
    let mut db = open_database(cfg)?;
    let logger = AuditLogger::new(cfg.audit.clone());

    match update_field(&mut db, &logger, ticket_id, field, value, actor)? {
        Some(entry) => println!(
            "Ticket {}: {} changed (history #{})",
            ticket_id, entry.field_name, entry.id
        ),
        None => println!("Ticket {}: {} unchanged", ticket_id, field),
    }
    Ok(())
}

fn comment_on(ticket_id: i64, body: &str, actor: i64) -> Result<()> {
    let cfg = config::config()?;
    let mut db = open_database(cfg)?;
    let logger = AuditLogger::new(cfg.audit.clone());

    let entry = add_comment(&mut db, &logger, ticket_id, body, actor)?;
    println!("Ticket {}: comment added (history #{})", ticket_id, entry.id);
    Ok(())
}

/// Show resolved configuration
fn show_config() -> Result<()> {
    let cfg = config::config()?;

    println!("ticketdesk configuration");
    println!();
    println!(
        "Config file: {}",
        cfg.config_file
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none - using defaults)".to_string())
    );
    println!();
    println!("Paths:");
    println!("  Home:      {}", cfg.home.display());
    println!("  Database:  {}", cfg.database.display());
    println!("  Sessions:  {}", cfg.sessions_dir().display());
    println!(
        "  Mailbox:   {}",
        cfg.mailbox
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(not set)".to_string())
    );
    println!();
    println!("Store:");
    println!("  Busy timeout:  {}ms", cfg.store.busy_timeout_ms);
    println!();
    println!("Audit retry:");
    println!("  Max attempts:  {}", cfg.audit.max_attempts);
    println!("  Backoff:       {}ms", cfg.audit.backoff_ms);
    println!();
    println!("Ingest:");
    println!(
        "  Priority:      {}",
        cfg.ingest.default_priority.as_deref().unwrap_or("-")
    );
    println!("  Status id:     {}", display_id(cfg.ingest.default_status_id));
    println!("  Category id:   {}", display_id(cfg.ingest.default_category_id));
    println!("  Assignee id:   {}", display_id(cfg.ingest.default_assignee_id));
    println!("  Fetch limit:   {}", cfg.ingest.fetch_limit);

    Ok(())
}

fn display_id(id: Option<i64>) -> String {
    id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string())
}
