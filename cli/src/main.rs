mod commands;
mod config;
mod remote;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;
use std::process;

use crate::commands::{
    App, BrewAddArgs, BrewEditArgs, cmd_brew_add, cmd_brew_delete, cmd_brew_edit,
    cmd_brew_favorite, cmd_brew_list, cmd_dial_in, cmd_leaderboard, cmd_level, cmd_login,
    cmd_logout, cmd_recipe_add, cmd_recipe_delete, cmd_recipe_edit, cmd_recipe_list,
    cmd_shop_add, cmd_shop_delete, cmd_shop_edit, cmd_shop_list, cmd_status, cmd_yield,
};
use crate::config::Config;
use crate::remote::{CloudStore, HttpDocumentStore};
use crema_core::brewing::TestShot;
use crema_core::db::Database;
use crema_core::leaderboard::{DEFAULT_LIMIT, MAX_LIMIT};

#[derive(Parser)]
#[command(
    name = "crema",
    version,
    about = "A coffee brewing companion: brews, recipes, shops and your barista level",
    long_about = "\n
   ___ _ __ ___ _ __ ___   __ _
  / __| '__/ _ \\ '_ ` _ \\ / _` |
 | (__| | |  __/ | | | | | (_| |
  \\___|_|  \\___|_| |_| |_|\\__,_|
      pull better shots.
"
)]
struct Cli {
    /// Data directory (default: platform data dir)
    #[arg(long, global = true, env = "CREMA_DATA_DIR", value_name = "PATH")]
    data_dir: Option<PathBuf>,
    /// URL of a `crema serve` instance holding user accounts
    #[arg(long, global = true, env = "CREMA_REMOTE", value_name = "URL")]
    remote: Option<String>,
    /// API key for --remote
    #[arg(long, global = true, env = "CREMA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in; guest data on this device moves to an empty account
    Login {
        /// Account id
        uid: String,
        /// Email address
        #[arg(long)]
        email: Option<String>,
        /// Display name (default: the part of the email before '@')
        #[arg(long)]
        name: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Sign out and go back to this device's guest data
    Logout {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show who is signed in and where data is stored
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log and manage espresso brews
    Brew {
        #[command(subcommand)]
        command: BrewCommands,
    },
    /// Manage drink recipes
    Recipe {
        #[command(subcommand)]
        command: RecipeCommands,
    },
    /// Manage coffee shops
    Shop {
        #[command(subcommand)]
        command: ShopCommands,
    },
    /// Show your points and barista level
    Level {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the top baristas by points
    Leaderboard {
        /// Number of entries
        #[arg(
            short,
            long,
            default_value_t = DEFAULT_LIMIT,
            value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..=MAX_LIMIT as u64)
        )]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Calculate the target beverage weight
    Yield {
        /// Dose in grams
        dose: f64,
        /// Brew ratio (e.g. 2 for 1:2)
        ratio: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Suggest a grind setting from two test shots
    DialIn {
        /// Target shot time in seconds
        #[arg(long)]
        target: f64,
        /// Grind setting of the first test shot
        #[arg(long)]
        g1: f64,
        /// Shot time of the first test shot in seconds
        #[arg(long)]
        t1: f64,
        /// Grind setting of the second test shot
        #[arg(long)]
        g2: f64,
        /// Shot time of the second test shot in seconds
        #[arg(long)]
        t2: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Serve user accounts over HTTP for other devices
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum BrewCommands {
    /// Log a new brew
    Add {
        #[command(flatten)]
        args: BrewAddArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List brews, newest first
    List {
        /// Only favorites
        #[arg(short, long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a brew
    Edit {
        #[command(flatten)]
        args: BrewEditArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a brew
    Delete {
        /// Brew id (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Star or unstar a brew
    Favorite {
        /// Brew id (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// Save a drink recipe
    Add {
        /// Drink name
        name: String,
        /// Recipe text
        #[arg(short, long, default_value = "")]
        recipe: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a recipe
    Edit {
        /// Recipe id (or a unique prefix)
        id: String,
        /// New drink name
        #[arg(long)]
        name: Option<String>,
        /// New recipe text
        #[arg(short, long)]
        recipe: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recipe
    Delete {
        /// Recipe id (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ShopCommands {
    /// Save a coffee shop
    Add {
        /// Shop name
        name: String,
        /// "lat,lng" for a map pin, or a street address
        #[arg(short, long, default_value = "")]
        location: String,
        /// Rating from 1 to 5 (default: 5)
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
        /// Notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List shops
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Change a shop
    Edit {
        /// Shop id (or a unique prefix)
        id: String,
        /// New name
        #[arg(long)]
        name: Option<String>,
        /// New location: "lat,lng" or a street address
        #[arg(short, long)]
        location: Option<String>,
        /// New rating from 1 to 5
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,
        /// New notes (empty to clear)
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a shop
    Delete {
        /// Shop id (or a unique prefix)
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// Open both stores and replay the persisted sign-in, the way an app's auth
/// observer reports the remembered user at startup.
async fn open_app(config: &Config, remote: Option<&str>, api_key: Option<String>) -> Result<App> {
    let local = Database::open(&config.device_db_path)?;
    let cloud = match remote {
        Some(url) => CloudStore::Http(HttpDocumentStore::new(url, api_key)?),
        None => CloudStore::Local(Database::open(&config.cloud_db_path)?),
    };

    let mut app = App::new(local, cloud);
    let session = config.load_session()?;
    debug!(
        "Replaying session for {}",
        session.as_ref().map_or("guest", |i| i.uid.as_str())
    );
    app.handle_auth_change(session).await?;
    Ok(app)
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.data_dir)?;

    // Commands that never touch user data
    let command = match cli.command {
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                Some(config.load_or_create_api_key()?.0)
            };
            let db = Database::open(&config.cloud_db_path)?;
            return server::start_server(db, port, &bind, api_key).await;
        }
        Commands::Yield { dose, ratio, json } => return cmd_yield(dose, ratio, json),
        Commands::DialIn {
            target,
            g1,
            t1,
            g2,
            t2,
            json,
        } => {
            let first = TestShot {
                grind: g1,
                seconds: t1,
            };
            let second = TestShot {
                grind: g2,
                seconds: t2,
            };
            return cmd_dial_in(target, first, second, json);
        }
        command => command,
    };

    let mut app = open_app(&config, cli.remote.as_deref(), cli.api_key).await?;

    match command {
        Commands::Login {
            uid,
            email,
            name,
            json,
        } => cmd_login(&mut app, &config, &uid, email, name, json).await,
        Commands::Logout { json } => cmd_logout(&mut app, &config, json).await,
        Commands::Status { json } => cmd_status(&app, json),
        Commands::Level { json } => cmd_level(&app, json),
        Commands::Leaderboard { limit, json } => cmd_leaderboard(&app, limit, json).await,
        Commands::Brew { command } => match command {
            BrewCommands::Add { args, json } => cmd_brew_add(&mut app, args, json).await,
            BrewCommands::List { favorites, json } => cmd_brew_list(&app, favorites, json),
            BrewCommands::Edit { args, json } => cmd_brew_edit(&mut app, args, json).await,
            BrewCommands::Delete { id, json } => cmd_brew_delete(&mut app, &id, json).await,
            BrewCommands::Favorite { id, json } => cmd_brew_favorite(&mut app, &id, json).await,
        },
        Commands::Recipe { command } => match command {
            RecipeCommands::Add { name, recipe, json } => {
                cmd_recipe_add(&mut app, &name, &recipe, json).await
            }
            RecipeCommands::List { json } => cmd_recipe_list(&app, json),
            RecipeCommands::Edit {
                id,
                name,
                recipe,
                json,
            } => cmd_recipe_edit(&mut app, &id, name, recipe, json).await,
            RecipeCommands::Delete { id, json } => cmd_recipe_delete(&mut app, &id, json).await,
        },
        Commands::Shop { command } => match command {
            ShopCommands::Add {
                name,
                location,
                rating,
                notes,
                json,
            } => cmd_shop_add(&mut app, &name, &location, rating, notes, json).await,
            ShopCommands::List { json } => cmd_shop_list(&app, json),
            ShopCommands::Edit {
                id,
                name,
                location,
                rating,
                notes,
                json,
            } => cmd_shop_edit(&mut app, &id, name, location, rating, notes, json).await,
            ShopCommands::Delete { id, json } => cmd_shop_delete(&mut app, &id, json).await,
        },
        Commands::Serve { .. } | Commands::Yield { .. } | Commands::DialIn { .. } => Ok(()),
    }
}
