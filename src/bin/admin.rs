//! Ebookchi Admin CLI
//!
//! Administration tool for the auth database.
//!
//! # Usage
//!
//! ```bash
//! ebookchi-admin user add ada@example.com --name Ada
//! ebookchi-admin user list
//! ebookchi-admin user set-role ada@example.com author
//! ebookchi-admin tokens purge
//! ```

use clap::{Args, Parser, Subcommand};
use ebookchi_auth::auth::TokenCodec;
use ebookchi_auth::config::Config;
use ebookchi_auth::db::{init_db, TokenStore, UserRepository};
use ebookchi_auth::models::UserRole;
use ebookchi_auth::validation::{FieldErrors, GenerateLinkRequest, UpdateProfileRequest};
use sqlx::SqlitePool;
use std::path::PathBuf;

// ============================================================================
// CLI Structure
// ============================================================================

#[derive(Parser)]
#[command(name = "ebookchi-admin")]
#[command(version)]
#[command(about = "Ebookchi auth administration tool")]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User(UserCommand),
    /// Manage verification tokens
    Tokens(TokensCommand),
}

#[derive(Args)]
struct UserCommand {
    #[command(subcommand)]
    command: UserSubcommand,
}

#[derive(Subcommand)]
enum UserSubcommand {
    /// Add a user (no-op if the email is already registered)
    Add {
        /// User's email address
        email: String,
        /// User's display name
        #[arg(long, short)]
        name: Option<String>,
    },
    /// List all users
    List,
    /// Change a user's role
    SetRole {
        /// User's email address
        email: String,
        /// New role: standard, admin or author
        role: UserRole,
    },
}

#[derive(Args)]
struct TokensCommand {
    #[command(subcommand)]
    command: TokensSubcommand,
}

#[derive(Subcommand)]
enum TokensSubcommand {
    /// Delete expired verification tokens
    Purge,
}

// ============================================================================
// Commands
// ============================================================================

fn describe(errors: FieldErrors) -> String {
    errors.into_values().flatten().collect::<Vec<_>>().join(", ")
}

async fn add_user(
    pool: SqlitePool,
    email: String,
    name: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let email = GenerateLinkRequest::new(email)
        .validate()
        .map_err(describe)?;
    let name = name
        .map(|n| UpdateProfileRequest::new(n).validate())
        .transpose()
        .map_err(describe)?;

    let users = UserRepository::new(pool);
    let (mut user, created) = users.find_or_create(&email).await?;

    if let Some(n) = &name {
        if let Some(updated) = users.update_profile(user.id, n).await? {
            user = updated;
        }
    }

    if created {
        println!("Added user: {}", user.email);
    } else {
        println!("User already exists: {}", user.email);
    }
    println!("  ID: {}", user.id);
    println!("  Role: {}", user.role);
    if let Some(n) = &user.name {
        println!("  Name: {}", n);
    }

    Ok(())
}

async fn list_users(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let users = UserRepository::new(pool).list().await?;

    if users.is_empty() {
        println!("No users registered.");
        return Ok(());
    }

    println!(
        "{:<38} {:<36} {:<10} {:<10}",
        "ID", "EMAIL", "ROLE", "SIGNED UP"
    );
    println!("{}", "-".repeat(96));

    for user in &users {
        println!(
            "{:<38} {:<36} {:<10} {:<10}",
            user.id,
            user.email,
            user.role,
            if user.signed_up { "yes" } else { "no" }
        );
    }

    println!();
    println!("Total: {} user(s)", users.len());

    Ok(())
}

async fn set_role(
    pool: SqlitePool,
    email: String,
    role: UserRole,
) -> Result<(), Box<dyn std::error::Error>> {
    let email = email.trim().to_lowercase();
    match UserRepository::new(pool).set_role(&email, role).await? {
        Some(user) => println!("{} is now {}", user.email, user.role),
        None => {
            eprintln!("Error: User '{}' not found", email);
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn purge_tokens(pool: SqlitePool) -> Result<(), Box<dyn std::error::Error>> {
    let purged = TokenStore::new(pool, TokenCodec::new())
        .purge_expired()
        .await?;
    println!("Removed {} expired token(s)", purged);
    Ok(())
}

// ============================================================================
// Main
// ============================================================================

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(cli.config)?;
    let pool = init_db(&config.database_path).await?;

    match cli.command {
        Commands::User(user_cmd) => match user_cmd.command {
            UserSubcommand::Add { email, name } => add_user(pool, email, name).await,
            UserSubcommand::List => list_users(pool).await,
            UserSubcommand::SetRole { email, role } => set_role(pool, email, role).await,
        },
        Commands::Tokens(tokens_cmd) => match tokens_cmd.command {
            TokensSubcommand::Purge => purge_tokens(pool).await,
        },
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
