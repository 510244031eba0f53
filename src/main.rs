//! Puzzle Template CLI
//!
//! Usage:
//!   puzzle-template [OPTIONS] check
//!   puzzle-template [OPTIONS] render <NAME> [DATA]
//!
//! Options:
//!   -c, --config <FILE>        Configuration file (TOML format)
//!   -t, --templates <DIR>      Single template directory
//!       --components <DIR>     Shared components directory
//!       --views <DIR>          Page views directory
//!       --locales <DIR>        Directory of messages_<lang>.properties files
//!       --languages <LIST>     Comma separated languages, default first
//!       --date-format <FMT>    Source format of the date function
//!   -h, --help                 Print help

use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use puzzle_template::config::{parse_languages, LocaleSettings, TemplateSettings};
use puzzle_template::{RenderRequest, ServerConfig, Settings, TemplateService};

#[derive(Parser)]
#[command(name = "puzzle-template")]
#[command(about = "Server-side HTML template rendering", version)]
struct Cli {
    /// Configuration file (TOML format)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding every template
    #[arg(short, long, global = true, env = "TEMPLATES_PATH")]
    templates: Option<PathBuf>,

    /// Directory of shared components
    #[arg(long, global = true, env = "COMPONENTS_PATH")]
    components: Option<PathBuf>,

    /// Directory of page views
    #[arg(long, global = true, env = "VIEWS_PATH")]
    views: Option<PathBuf>,

    /// Directory of messages_<lang>.properties files
    #[arg(long, global = true, env = "LOCALES_PATH")]
    locales: Option<PathBuf>,

    /// Comma separated languages to load; the first is the default
    #[arg(long, global = true, env = "AVAILABLE_LOCALES")]
    languages: Option<String>,

    /// Source format of the date function (strftime syntax)
    #[arg(long, global = true, env = "DATE_FORMAT")]
    date_format: Option<String>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load every template and list the registered names
    Check,

    /// Render one template to stdout
    Render {
        /// Template name, e.g. forum/view
        name: String,

        /// JSON data file (reads from stdin if not provided)
        data: Option<PathBuf>,
    },
}

impl Cli {
    /// Settings given on the command line or through the environment
    fn overrides(&self) -> Settings {
        Settings {
            date_format: self.date_format.clone(),
            templates: TemplateSettings {
                path: self.templates.clone(),
                components: self.components.clone(),
                views: self.views.clone(),
            },
            locales: LocaleSettings {
                path: self.locales.clone(),
                languages: self.languages.as_deref().map(parse_languages),
            },
            ..Default::default()
        }
    }

    fn server_config(&self) -> Result<ServerConfig, String> {
        let file = match &self.config {
            Some(path) => Settings::from_file(path)
                .map_err(|e| format!("Error loading config '{}': {}", path.display(), e))?,
            None => Settings::default(),
        };
        file.merge(self.overrides())
            .into_config()
            .map_err(|e| format!("Error: {}", e))
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_target(false)
                .with_filter(filter),
        )
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    let config = match cli.server_config() {
        Ok(config) => config,
        Err(message) => {
            eprintln!("{}", message);
            process::exit(1);
        }
    };

    let service = match TemplateService::start(&config) {
        Ok(service) => service,
        Err(e) => {
            eprintln!("Error: {}", e.report());
            process::exit(1);
        }
    };

    match &cli.command {
        Command::Check => {
            for name in service.engine().templates().names() {
                println!("{}", name);
            }
        }
        Command::Render { name, data } => {
            let data = match read_data(data.as_ref()) {
                Ok(data) => data,
                Err(e) => {
                    eprintln!("Error reading data: {}", e);
                    process::exit(1);
                }
            };
            let rendered = match service.render(&RenderRequest::new(name.as_str(), data)) {
                Ok(rendered) => rendered,
                Err(e) => {
                    eprintln!("Error: {}", e);
                    process::exit(1);
                }
            };
            if let Err(e) = io::stdout().write_all(&rendered.content) {
                eprintln!("Error writing output: {}", e);
                process::exit(1);
            }
        }
    }
}

fn read_data(path: Option<&PathBuf>) -> io::Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path),
        None => {
            let mut buffer = Vec::new();
            io::stdin().read_to_end(&mut buffer)?;
            Ok(buffer)
        }
    }
}
