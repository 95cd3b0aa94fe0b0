use anyhow::Result;
use clap::Parser;
use cattery::db::Db;
use cattery::service::Cattery;
use cattery::Config;

#[derive(Parser, Debug)]
#[command(name = "sweep")]
#[command(about = "Remove parentage edges and saved trees that point at deleted cats")]
struct Args {
    /// Report what would be removed without changing anything
    #[arg(short = 'n', long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "info")).init();

    let args = Args::parse();
    let config = Config::load()?;
    log::info!("Database path: {}", config.db_path().display());

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir()).await?;
    let cattery = Cattery::new(db, config.pedigree.clone());

    let report = if args.dry_run {
        cattery.find_dangling().await?
    } else {
        cattery.sweep().await?
    };

    let verb = if args.dry_run { "Would remove" } else { "Removed" };
    for edge in &report.edges {
        println!(
            "{} edge {}: {} is {} of {}",
            verb, edge.edge_id, edge.parent_id, edge.kind, edge.child_id
        );
    }
    for root in &report.snapshots {
        println!("{} saved tree rooted at {}", verb, root);
    }
    println!(
        "{} {} dangling edges and {} orphaned saved trees",
        verb,
        report.edges.len(),
        report.snapshots.len()
    );

    Ok(())
}
