//! Shopsession CLI - drive the cart, session, and checkout from a terminal.
//!
//! # Usage
//!
//! ```bash
//! # Put two units of product 12 in the cart
//! shop cart add 12 "Lavender Soap" 8.50
//! shop cart set 12 2
//! shop cart address "1 Main St, Springfield"
//!
//! # Sign in (password is read from stdin)
//! shop login -e ada@example.com
//!
//! # Pay with a saved card
//! shop payment-methods list
//! shop checkout --payment-method pm_1Q2w3E
//! ```
//!
//! State (cart and tokens) lives in `SHOP_STATE_DIR`; see
//! [`shopsession_client::config`] for the environment variables.

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};
use sentry::integrations::tracing as sentry_tracing;
use shopsession_client::ClientConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod app;
mod commands;

use app::App;
use commands::CliError;

#[derive(Parser)]
#[command(name = "shop")]
#[command(author, version, about = "Shopsession cart and checkout")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect or edit the cart
    Cart {
        #[command(subcommand)]
        action: commands::cart::CartCommand,
    },
    /// Sign in with email and password
    Login {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
    /// Sign out and forget stored tokens
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Create an account
    Register(commands::account::RegisterArgs),
    /// List or cancel orders
    Orders {
        #[command(subcommand)]
        action: commands::orders::OrdersCommand,
    },
    /// Manage saved payment methods
    PaymentMethods {
        #[command(subcommand)]
        action: commands::payments::PaymentMethodsCommand,
    },
    /// Place an order for the cart and pay for it
    Checkout(commands::checkout::CheckoutArgs),
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &ClientConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            send_default_pii: false,
            ..Default::default()
        },
    ));

    Some(guard)
}

/// ERROR/WARN become Sentry events, INFO/DEBUG become breadcrumbs.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopsession_client=info,shopsession_cli=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match ClientConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            init_tracing();
            tracing::error!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    let _sentry_guard = init_sentry(&config);
    init_tracing();

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: ClientConfig) -> Result<(), CliError> {
    let app = App::open(config).await?;

    match cli.command {
        Commands::Cart { action } => commands::cart::run(&app, action)?,
        Commands::Login { email } => commands::account::login(&app, &email).await?,
        Commands::Logout => commands::account::logout(&app),
        Commands::Whoami => commands::account::whoami(&app).await?,
        Commands::Register(args) => commands::account::register(&app, args).await?,
        Commands::Orders { action } => commands::orders::run(&app, action).await?,
        Commands::PaymentMethods { action } => commands::payments::run(&app, action).await?,
        Commands::Checkout(args) => commands::checkout::run(&app, args).await?,
    }
    Ok(())
}
