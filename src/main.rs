use clap::Parser;
use pg_subscriber::postgres::{ChangeEvent, WalFrame};
use pg_subscriber::{Config, Result, Subscriber};
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

#[derive(Parser, Debug)]
#[command(name = "pg-subscriber")]
#[command(about = "PostgreSQL logical replication subscriber", long_about = None)]
#[command(version)]
struct Args {
    #[arg(short, long, help = "Enable JSON output for logs")]
    json_logs: bool,

    #[arg(short, long, help = "Verbose logging")]
    verbose: bool,

    #[arg(long, help = "Create the replication slot before streaming")]
    create_slot: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.json_logs, args.verbose);

    info!("Starting pg-subscriber v{}", env!("CARGO_PKG_VERSION"));
    info!("Loading configuration from environment variables");

    let config = match Config::from_env() {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            eprintln!("\nRequired environment variables:");
            eprintln!("  PG_DATABASE      - PostgreSQL database name");
            eprintln!("  PG_USERNAME      - PostgreSQL username");
            eprintln!("  PG_PASSWORD      - PostgreSQL password");
            eprintln!("\nSee .envrc.example for all available options");
            std::process::exit(1);
        }
    };

    info!(
        postgres_host = %config.postgres.host,
        postgres_port = %config.postgres.port,
        postgres_database = %config.postgres.database,
        postgres_publication = %config.postgres.publication,
        postgres_slot = %config.postgres.slot_name,
        start_lsn = %config.replication.start_lsn,
        "Configuration summary"
    );

    let mut subscriber = Subscriber::connect(&config).await?;

    let system = subscriber.identify_system().await?;
    info!(
        system_id = %system.system_id,
        timeline = system.timeline,
        xlogpos = %system.xlogpos,
        "Connected to primary"
    );

    if args.create_slot {
        subscriber.create_slot().await?;
    }

    subscriber.start().await?;
    info!("Streaming changes; press Ctrl-C to stop");

    let mut confirmed = config.replication.start_lsn;
    let mut status_interval =
        tokio::time::interval(Duration::from_secs(config.replication.status_interval_secs));
    status_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = status_interval.tick() => {
                subscriber.acknowledge(confirmed).await?;
            }
            event = subscriber.next_event() => {
                match event? {
                    None => {
                        info!("Replication stream ended");
                        break;
                    }
                    Some(WalFrame::Keepalive { current_lsn, should_respond, .. }) => {
                        if should_respond {
                            info!(%current_lsn, "Keepalive requested a reply");
                            subscriber.acknowledge(confirmed).await?;
                        }
                    }
                    Some(WalFrame::WalData { change, .. }) => {
                        if let ChangeEvent::Commit { end_lsn, .. } = &change {
                            confirmed = *end_lsn;
                            subscriber.acknowledge(confirmed).await?;
                        } else {
                            log_change(&change);
                        }
                    }
                }
            }
        }
    }

    subscriber.close().await?;
    info!(%confirmed, "Shutdown complete");
    Ok(())
}

fn log_change(change: &ChangeEvent) {
    match change {
        ChangeEvent::Begin { commit_lsn, xid, .. } => {
            info!(%commit_lsn, xid, "BEGIN");
        }
        ChangeEvent::Relation(relation) => {
            info!(
                oid = relation.id,
                identity = %relation.replica_identity,
                "RELATION {}.{}",
                relation.schema,
                relation.name
            );
        }
        ChangeEvent::Insert { relation, new } => {
            info!(new = ?new, "INSERT {}.{}", relation.schema, relation.name);
        }
        ChangeEvent::Update {
            relation,
            key,
            old,
            new,
        } => {
            info!(
                key = ?key,
                old = ?old,
                new = ?new,
                "UPDATE {}.{}",
                relation.schema,
                relation.name
            );
        }
        ChangeEvent::Delete { relation, key, old } => {
            info!(
                key = ?key,
                old = ?old,
                "DELETE {}.{}",
                relation.schema,
                relation.name
            );
        }
        ChangeEvent::Truncate {
            relations,
            cascade,
            restart_identity,
        } => {
            let tables: Vec<String> = relations
                .iter()
                .map(|r| format!("{}.{}", r.schema, r.name))
                .collect();
            info!(?tables, cascade, restart_identity, "TRUNCATE");
        }
        ChangeEvent::Message {
            prefix,
            content,
            transactional,
            ..
        } => {
            info!(
                %prefix,
                bytes = content.len(),
                transactional,
                "MESSAGE"
            );
        }
        other => {
            info!(kind = other.kind(), "{:?}", other);
        }
    }
}

fn init_logging(json: bool, verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("pg_subscriber=debug,info")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("pg_subscriber=info,warn"))
    };

    let fmt_layer = if json {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(false)
            .with_span_list(false)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}
