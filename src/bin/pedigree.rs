use anyhow::{Context, Result};
use clap::Parser;
use cattery::db::Db;
use cattery::pedigree::PedigreeTreeView;
use cattery::service::{Cattery, SaveTreeRequest};
use cattery::Config;

#[derive(Parser, Debug)]
#[command(name = "pedigree")]
#[command(about = "Print the pedigree tree of a cat, optionally saving it")]
struct Args {
    /// Root cat id
    cat_id: String,

    /// Generations to include (defaults to pedigree.max_generations)
    #[arg(short, long)]
    generations: Option<usize>,

    /// Print the tree as JSON
    #[arg(long)]
    json: bool,

    /// Store the tree as the saved pedigree of the cat
    #[arg(long)]
    save: bool,

    /// Name for the saved tree
    #[arg(long, requires = "save")]
    name: Option<String>,
}

fn print_tree(view: &PedigreeTreeView) {
    println!("{} ({} generations)", view.name, view.generations);
    for node in &view.nodes {
        let indent = "  ".repeat(node.generation);
        println!(
            "{}{} [{}] born {} at ({:.0}, {:.0})",
            indent, node.cat.name, node.cat.gender, node.cat.birth_date, node.position.x, node.position.y
        );
    }
    println!("{} connections", view.connections.len());
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("RUST_LOG", "warn")).init();

    let args = Args::parse();
    let config = Config::load()?;

    let db = Db::new(config.db_path());
    db.migrate(config.migrations_dir()).await?;
    let cattery = Cattery::new(db, config.pedigree.clone());

    let view = if args.save {
        let request = SaveTreeRequest {
            name: args.name,
            description: None,
            generations: args.generations,
        };
        let saved = cattery
            .save_pedigree(&args.cat_id, request)
            .await
            .with_context(|| format!("Failed to save pedigree of {}", args.cat_id))?;
        log::info!("Saved pedigree tree '{}' at {}", saved.name, saved.saved_at);
        saved.tree
    } else {
        cattery
            .pedigree(&args.cat_id, args.generations)
            .await
            .with_context(|| format!("Failed to build pedigree of {}", args.cat_id))?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&view)?);
    } else {
        print_tree(&view);
    }

    Ok(())
}
