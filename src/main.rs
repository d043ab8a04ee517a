//! Frith CLI entry point

mod cli;

use crate::cli::{BanCommands, BanTarget, Cli, Commands, GroupCommands};
use anyhow::{Context, Result};
use clap::Parser;
use frith::auth::{BanKind, BanSubject};
use frith::nostr::Filter;
use frith::storage::{EventStore, PostgresConfig, PostgresStore};
use frith::{PolicyGate, RelayConfig};
use futures::StreamExt;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let db_config = match &cli.database_url {
        Some(url) => PostgresConfig::from_url(url).context("Invalid DATABASE_URL")?,
        None => PostgresConfig::from_env().context("DATABASE_URL not set")?,
    };

    match cli.command {
        Commands::Init => init(db_config).await,
        Commands::Ban { command } => ban(db_config, command).await,
        Commands::Group { command } => group(db_config, command).await,
        Commands::Invite { issuer } => invite(db_config, issuer).await,
        Commands::Migrate => migrate(db_config).await,
        Commands::Export => export(db_config).await,
    }
}

async fn open_gate(db_config: PostgresConfig) -> Result<PolicyGate> {
    let config = RelayConfig::from_env().context("Invalid relay configuration")?;
    let store = Arc::new(
        PostgresStore::new(db_config)
            .await
            .context("Failed to connect to database")?,
    );

    info!(relay = %config.relay_url, pubkey = %config.signer.public_key(), "Relay configuration loaded");

    PolicyGate::builder(config, store.clone(), store)
        .build()
        .context("Failed to set up access backend")
}

async fn init(db_config: PostgresConfig) -> Result<()> {
    let _store = PostgresStore::new(db_config).await?;
    println!("Database schema initialized successfully");
    Ok(())
}

async fn ban(db_config: PostgresConfig, command: BanCommands) -> Result<()> {
    let gate = open_gate(db_config).await?;
    let bans = gate.bans();

    match command {
        BanCommands::Pubkey { subject, reason } => {
            bans.ban(&BanSubject::PubKey(subject.clone()), &reason).await?;
            println!("Banned pubkey {}", subject);
        }
        BanCommands::Event { subject, reason } => {
            bans.ban(&BanSubject::Event(subject.clone()), &reason).await?;
            println!("Banned event {}", subject);
        }
        BanCommands::Remove { target, subject } => {
            let subject = match target {
                BanTarget::Pubkey => BanSubject::PubKey(subject),
                BanTarget::Event => BanSubject::Event(subject),
            };
            bans.unban(&subject).await?;
            println!("Lifted ban on {}", subject);
        }
        BanCommands::List => {
            for kind in [BanKind::PubKey, BanKind::Event] {
                let entries = bans.list(kind).await?;

                println!("Banned {}s:", kind);
                if entries.is_empty() {
                    println!("  (none)");
                }
                for entry in entries {
                    if entry.reason.is_empty() {
                        println!("  {}", entry.subject);
                    } else {
                        println!("  {} ({})", entry.subject, entry.reason);
                    }
                }
            }
        }
    }

    Ok(())
}

async fn group(db_config: PostgresConfig, command: GroupCommands) -> Result<()> {
    let gate = open_gate(db_config).await?;
    let groups = gate.groups();

    match command {
        GroupCommands::List => {
            let all = groups.list_groups().await?;
            if all.is_empty() {
                println!("(no groups)");
            }
            for group in all {
                println!("{}\t{}", group.id, group.name);
            }
        }
        GroupCommands::Show { id } => {
            let group = groups
                .project(&id)
                .await?
                .with_context(|| format!("Unknown group: {}", id))?;

            println!("{}", serde_json::to_string_pretty(&group)?);
        }
        GroupCommands::Members { id } => {
            let members = groups.members(&id).await?;

            println!("Group: {}", id);
            println!("Members:");
            if members.is_empty() {
                println!("  (none)");
            }
            for member in members {
                println!("  {}", member);
            }
        }
    }

    Ok(())
}

async fn invite(db_config: PostgresConfig, issuer: String) -> Result<()> {
    let gate = open_gate(db_config).await?;
    let code = gate.claims().generate_invite(&issuer).await?;

    println!("{}", code);
    Ok(())
}

async fn migrate(db_config: PostgresConfig) -> Result<()> {
    let gate = open_gate(db_config).await?;
    let report = gate.migrate_legacy_groups().await?;

    for id in &report.created {
        println!("Created group {}", id);
    }
    for id in &report.failed {
        println!("Failed to migrate group {}", id);
    }
    println!("Migrated {} group(s)", report.created.len());

    Ok(())
}

async fn export(db_config: PostgresConfig) -> Result<()> {
    let store = PostgresStore::new(db_config).await?;
    let mut events = store.query(&Filter::new()).await?;

    while let Some(event) = events.next().await {
        println!("{}", serde_json::to_string(&event)?);
    }

    Ok(())
}
