// 22POULTRY - Operator CLI
// Database setup, user/token management and loan application reports.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs::File;
use std::path::{Path, PathBuf};

use poultry22::logging::init_tracing;
use poultry22::policy::PolicySet;
use poultry22::session::{find_user_by_email, session_for_user, set_admin_flag, set_user_role};
use poultry22::workflow::{list_applications, write_csv};
use poultry22::{apply_policies, create_user, issue_token, open_database, LoanStatus, Role, Session, Settings};

#[derive(Debug, Parser)]
#[command(name = "poultry22", version, about = "22POULTRY operator tools")]
struct Cli {
    #[command(flatten)]
    settings: Settings,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create the schema and apply row-level policies if none are stored
    Init,

    /// Create a user and print a bearer token for them
    AddUser {
        #[arg(long)]
        email: String,
        /// Role stored in the user's metadata; omitted means no role yet
        #[arg(long)]
        role: Option<Role>,
        /// Also grant the admin flag
        #[arg(long)]
        admin: bool,
    },

    /// Print a fresh bearer token for an existing user
    IssueToken {
        #[arg(long)]
        email: String,
    },

    /// Change a user's role
    SetRole {
        #[arg(long)]
        email: String,
        #[arg(long)]
        role: Role,
    },

    /// Re-apply the row-level policies
    ApplyPolicies,

    /// List the loan applications visible to a user
    Applications {
        /// Email of the user to act as
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        status: Option<LoanStatus>,
    },

    /// Write the loan applications visible to a user as CSV
    ExportApplications {
        path: PathBuf,
        #[arg(long = "as")]
        as_user: String,
        #[arg(long)]
        status: Option<LoanStatus>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.settings.log_json);

    let conn = open_database(&cli.settings.db_path)?;

    match cli.command {
        Command::Init => run_init(&conn, &cli.settings),
        Command::AddUser { email, role, admin } => {
            run_add_user(&conn, &email, role.unwrap_or_default(), admin)
        }
        Command::IssueToken { email } => {
            let session = session_by_email(&conn, &email)?;
            println!("{}", issue_token(&conn, &session.user_id)?);
            Ok(())
        }
        Command::SetRole { email, role } => {
            let session = session_by_email(&conn, &email)?;
            set_user_role(&conn, &session.user_id, role)?;
            println!("✓ {} is now {}", email, role_label(role));
            Ok(())
        }
        Command::ApplyPolicies => {
            let applied = apply_policies(&conn)?;
            println!("✓ Row-level policies applied to {} tables", applied);
            Ok(())
        }
        Command::Applications { as_user, status } => run_applications(&conn, &as_user, status),
        Command::ExportApplications {
            path,
            as_user,
            status,
        } => run_export(&conn, &as_user, status, &path),
    }
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::Unassigned => "(no role)",
        other => other.as_str(),
    }
}

fn session_by_email(conn: &Connection, email: &str) -> Result<Session> {
    let Some(user) = find_user_by_email(conn, email)? else {
        bail!("No user with email {}", email);
    };
    session_for_user(conn, &user.id)?.with_context(|| format!("User {} disappeared", email))
}

fn run_init(conn: &Connection, settings: &Settings) -> Result<()> {
    println!("🐔 22POULTRY - Database Setup");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✓ Schema ready at {}", settings.db_path.display());

    if PolicySet::load(conn)?.is_empty() {
        let applied = apply_policies(conn)?;
        println!("✓ Row-level policies applied to {} tables", applied);
    } else {
        println!("✓ Row-level policies already stored");
    }

    std::fs::create_dir_all(&settings.storage_root).with_context(|| {
        format!("Failed to create storage root {}", settings.storage_root.display())
    })?;
    println!("✓ Storage root at {}", settings.storage_root.display());
    Ok(())
}

fn run_add_user(conn: &Connection, email: &str, role: Role, admin: bool) -> Result<()> {
    let user = create_user(conn, email, role)?;
    if admin {
        set_admin_flag(conn, &user.id, true)?;
    }
    let token = issue_token(conn, &user.id)?;

    println!("✓ Created {} ({})", user.email, role_label(role));
    if admin {
        println!("✓ Admin flag granted");
    }
    println!("  id:    {}", user.id);
    println!("  token: {}", token);
    Ok(())
}

fn run_applications(conn: &Connection, as_user: &str, status: Option<LoanStatus>) -> Result<()> {
    let session = session_by_email(conn, as_user)?;
    let apps = list_applications(conn, &session, status)?;

    println!("📋 {} loan applications", apps.len());
    for app in &apps {
        println!(
            "  {}  {:<9}  ₹{:>12.2}  {:<20}  {}",
            app.created_at.format("%Y-%m-%d"),
            app.status.as_str(),
            app.amount,
            app.farm_type,
            app.purpose
        );
    }
    Ok(())
}

fn run_export(
    conn: &Connection,
    as_user: &str,
    status: Option<LoanStatus>,
    path: &Path,
) -> Result<()> {
    let session = session_by_email(conn, as_user)?;
    let apps = list_applications(conn, &session, status)?;

    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    let written = write_csv(&apps, file)?;
    println!("✓ Exported {} applications to {}", written, path.display());
    Ok(())
}
