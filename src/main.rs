use anyhow::{Context, Result};
use cattery::db::{migrate, Db};
use cattery::error::CatteryError;
use cattery::http::HttpServer;
use cattery::{Cattery, Config};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;

    // RUST_LOG wins over cattery.log_level
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or("RUST_LOG", config.cattery.log_level.as_str()),
    )
    .init();

    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("verify");

    match command {
        "serve" => run_http_server(config).await?,
        "verify" => run_schema_verification(config).await?,
        other => anyhow::bail!("Unknown command '{}'. Usage: cattery [serve|verify]", other),
    }

    Ok(())
}

async fn init_db(config: &Config) -> Result<Db> {
    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir())
        .await
        .with_context(|| format!("Failed to migrate {}", config.db_path().display()))?;
    log::info!("Database initialized: {}", config.db_path().display());
    Ok(db)
}

/// Run the public + admin HTTP API
async fn run_http_server(config: Config) -> Result<()> {
    log::info!("Starting Cattery HTTP server v{}", env!("CARGO_PKG_VERSION"));

    let db = init_db(&config).await?;
    let cattery = Cattery::new(db, config.pedigree.clone());

    let dangling = cattery.find_dangling().await?;
    if !dangling.is_empty() {
        log::warn!(
            "Found {} dangling edges and {} orphaned saved trees; run `sweep` to remove them",
            dangling.edges.len(),
            dangling.snapshots.len()
        );
    }

    let server = HttpServer::new(cattery, &config.http_server)?;
    server.run(config.http_server.port).await?;
    Ok(())
}

/// Migrate, then check that the schema is complete and healthy
async fn run_schema_verification(config: Config) -> Result<()> {
    log::info!("Starting Cattery v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Database path: {}", config.db_path().display());
    log::info!("Max pedigree generations: {}", config.pedigree.max_generations);

    let db = init_db(&config).await?;

    db.with_connection(|conn| {
        let missing = migrate::missing_tables(conn)?;
        for table in &missing {
            log::error!("Missing table: {}", table);
        }
        if !missing.is_empty() {
            return Err(CatteryError::Config("Not all required tables exist".to_string()));
        }

        let applied = migrate::applied_migrations(conn)?;
        if let Some(latest) = applied.last() {
            log::info!("✓ Schema version {} ({})", latest.version, latest.name);
        }

        let journal_mode: String = conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))?;
        if journal_mode.to_uppercase() != "WAL" {
            return Err(CatteryError::Config(format!("Journal mode is not WAL: {}", journal_mode)));
        }
        log::debug!("✓ Journal mode: WAL");

        let integrity: String = conn.query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if integrity != "ok" {
            return Err(CatteryError::Config(format!("Database integrity check failed: {}", integrity)));
        }
        log::info!("✓ Database integrity: OK");

        Ok(())
    })
    .await?;

    log::info!("✓ Database schema verification complete");
    Ok(())
}
