// CLI module - command-line argument parsing and handlers
//
// Provides subcommands for configuration management:
// - config --show: Display effective configuration (secrets masked)
// - config --path: Show config file path
// - config --init: Write a commented default config file if none exists

use crate::config::{Config, VERSION};
use clap::{Parser, Subcommand};

/// relayapi - credential-injecting relay for LLM provider APIs
#[derive(Parser)]
#[command(name = "relayapi")]
#[command(version = VERSION)]
#[command(about = "Credential-injecting relay for LLM provider APIs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage configuration
    Config {
        /// Show effective configuration
        #[arg(long)]
        show: bool,

        /// Show config file path
        #[arg(long)]
        path: bool,

        /// Write a default config file if none exists
        #[arg(long)]
        init: bool,
    },
}

/// Handle CLI commands. Returns true if a command was handled (exit after).
pub fn handle_cli() -> bool {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Config { show, path, init }) => {
            if path {
                handle_config_path();
            } else if show {
                handle_config_show();
            } else if init {
                handle_config_init();
            } else {
                // No flag provided, show help
                println!("Usage: relayapi config [--show|--path|--init]");
                println!();
                println!("Options:");
                println!("  --show    Display effective configuration (secrets masked)");
                println!("  --path    Show config file path");
                println!("  --init    Write a default config file if none exists");
            }
            true
        }
        None => false, // No subcommand, run normal relay
    }
}

fn handle_config_path() {
    match Config::config_path() {
        Some(path) => println!("{}", path.display()),
        None => {
            eprintln!("Error: Could not determine config path");
            std::process::exit(1);
        }
    }
}

fn handle_config_show() {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };

    println!("# Effective configuration (env > file > defaults)");
    println!();
    print!("{}", config.to_toml());

    let warnings = config.clients.validate();
    if !warnings.is_empty() {
        println!();
        for warning in warnings {
            println!("# Warning: {}", warning);
        }
    }

    // Show source info
    println!();
    if let Some(path) = Config::config_path() {
        if path.exists() {
            println!("# Source: {}", path.display());
        } else {
            println!("# Source: defaults (no config file)");
        }
    }
}

fn handle_config_init() {
    let Some(path) = Config::config_path() else {
        eprintln!("Error: Could not determine config path");
        std::process::exit(1);
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return;
    }

    // Create parent directory
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Error creating directory: {}", e);
            std::process::exit(1);
        }
    }

    // Write the default config (using Config's single source of truth)
    if let Err(e) = std::fs::write(&path, Config::default().to_toml()) {
        eprintln!("Error writing config: {}", e);
        std::process::exit(1);
    }

    println!("Created config file: {}", path.display());
}
