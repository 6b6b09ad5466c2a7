//! FIP Panel Control Tool
//!
//! CLI for controlling the FIP panel daemon via D-Bus.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fip_panel_client::{BusType, PanelClient};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum CliBusType {
    /// Try session bus first, fall back to system bus
    #[default]
    Auto,
    /// Use session bus (for user services)
    Session,
    /// Use system bus (for system services)
    System,
}

impl From<CliBusType> for BusType {
    fn from(bus: CliBusType) -> Self {
        match bus {
            CliBusType::Auto => BusType::Auto,
            CliBusType::Session => BusType::Session,
            CliBusType::System => BusType::System,
        }
    }
}

#[derive(Parser)]
#[command(name = "fippanelctl")]
#[command(about = "Control tool for the FIP panel daemon")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// D-Bus bus type to use
    #[arg(long, default_value = "auto", value_enum)]
    bus: CliBusType,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Page commands
    Pages {
        #[command(subcommand)]
        action: PageCommands,
    },
    /// Button binding commands
    Bindings {
        #[command(subcommand)]
        action: BindingCommands,
    },
    /// Telemetry commands
    Telemetry {
        #[command(subcommand)]
        action: TelemetryCommands,
    },
    /// Daemon control commands
    Daemon {
        #[command(subcommand)]
        action: DaemonCommands,
    },
}

#[derive(Subcommand)]
enum PageCommands {
    /// List tracked pages
    List,
    /// Add a page
    Add {
        /// Page number
        page: u32,
        /// Make the new page active
        #[arg(long)]
        active: bool,
    },
    /// Remove a page
    Remove {
        /// Page number
        page: u32,
    },
}

#[derive(Subcommand)]
enum BindingCommands {
    /// Print the settings records
    Export {
        /// Write records to a file instead of stdout
        #[arg(short, long)]
        output: Option<String>,
    },
    /// Replace all bindings with the records in a file
    Import {
        /// Settings file, one record per line
        file: String,
    },
    /// Clear bindings for one button, or all bindings
    Clear {
        /// Button name, e.g. SOFTBUTTON_1 or SOFTBUTTON_1_P2 (omit for all)
        button: Option<String>,
    },
    /// Bind a keystroke sequence
    SetKey {
        /// Button name
        button: String,
        /// Sequence, e.g. "A:Press@0ms,A:Release@50ms"
        sequence: String,
        /// Edge: on or off
        #[arg(long, default_value = "on")]
        edge: String,
        /// Free-form note stored with the binding
        #[arg(long, default_value = "")]
        info: String,
    },
    /// Bind protocol commands
    SetProtocol {
        /// Button name
        button: String,
        /// Commands, e.g. "CONTROL 1"
        #[arg(required = true)]
        commands: Vec<String>,
        /// Edge: on or off
        #[arg(long, default_value = "on")]
        edge: String,
        /// Free-form description stored with the binding
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Save bindings to the daemon's profile store
    Save,
}

#[derive(Subcommand)]
enum TelemetryCommands {
    /// Push a value for an address
    Push {
        /// Address, decimal or 0x-prefixed hex
        address: String,
        /// Value, decimal or 0x-prefixed hex
        value: String,
    },
}

#[derive(Subcommand)]
enum DaemonCommands {
    /// Show daemon status
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Shutdown the daemon
    Quit,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Connect to daemon
    let client = PanelClient::connect_with_bus(cli.bus.into())
        .await
        .context("Failed to connect to daemon. Is fippaneld running?")?;

    match cli.command {
        Commands::Pages { action } => handle_pages(action, &client).await,
        Commands::Bindings { action } => handle_bindings(action, &client).await,
        Commands::Telemetry { action } => handle_telemetry(action, &client).await,
        Commands::Daemon { action } => handle_daemon(action, &client).await,
    }
}

async fn handle_pages(action: PageCommands, client: &PanelClient) -> Result<()> {
    match action {
        PageCommands::List => {
            let pages = client.list_pages().await?;
            if pages.is_empty() {
                println!("No pages");
            } else {
                println!("Pages:");
                for page in pages {
                    println!("  {}", page);
                }
            }
        }
        PageCommands::Add { page, active } => {
            if client.add_page(page, active).await? {
                println!("Page {} added", page);
            } else {
                println!("Page {} already exists", page);
            }
        }
        PageCommands::Remove { page } => {
            if client.remove_page(page).await? {
                println!("Page {} removed", page);
            } else {
                println!("Page {} is not tracked", page);
            }
        }
    }

    Ok(())
}

async fn handle_bindings(action: BindingCommands, client: &PanelClient) -> Result<()> {
    match action {
        BindingCommands::Export { output } => {
            let records = client.export_settings().await?;
            match output {
                Some(path) => {
                    let mut content = records.join("\n");
                    content.push('\n');
                    std::fs::write(&path, content)
                        .with_context(|| format!("Failed to write {}", path))?;
                    println!("Exported {} record(s) to {}", records.len(), path);
                }
                None => {
                    for record in records {
                        println!("{}", record);
                    }
                }
            }
        }
        BindingCommands::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("Failed to read {}", file))?;
            let records = content.lines().map(str::to_string).collect();
            let summary = client.import_settings(records).await?;
            println!(
                "Imported {} key binding(s) and {} protocol binding(s)",
                summary.key_bindings, summary.protocol_bindings
            );
            for issue in summary.issues {
                eprintln!("  skipped {}", issue);
            }
        }
        BindingCommands::Clear { button } => {
            client.clear_bindings(button.as_deref()).await?;
            match button {
                Some(button) => println!("Bindings cleared for {}", button),
                None => println!("All bindings cleared"),
            }
        }
        BindingCommands::SetKey {
            button,
            sequence,
            edge,
            info,
        } => {
            client
                .set_key_binding(&button, &edge, &sequence, &info)
                .await?;
            println!("Key binding set for {} ({})", button, edge);
        }
        BindingCommands::SetProtocol {
            button,
            commands,
            edge,
            description,
        } => {
            let count = commands.len();
            client
                .set_protocol_binding(&button, &edge, commands, &description)
                .await?;
            println!(
                "Protocol binding with {} command(s) set for {} ({})",
                count, button, edge
            );
        }
        BindingCommands::Save => {
            let count = client.save_profile().await?;
            println!("Saved {} record(s)", count);
        }
    }

    Ok(())
}

fn parse_number(s: &str) -> Result<u32> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse(),
    };
    parsed.with_context(|| format!("Invalid number: {}", s))
}

async fn handle_telemetry(action: TelemetryCommands, client: &PanelClient) -> Result<()> {
    match action {
        TelemetryCommands::Push { address, value } => {
            let address = parse_number(&address)?;
            let value = parse_number(&value)?;
            client.push_telemetry(address, value).await?;
            println!("Telemetry 0x{:04X} = {}", address, value);
        }
    }

    Ok(())
}

async fn handle_daemon(action: DaemonCommands, client: &PanelClient) -> Result<()> {
    match action {
        DaemonCommands::Status { json } => {
            let status = client.status().await?;
            if json {
                let value = serde_json::json!({
                    "instance": status.instance,
                    "state": status.state,
                    "active_page": status.active_page,
                    "dirty": status.dirty,
                });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                println!("Daemon: running");
                println!("  Instance: {}", status.instance);
                println!("  State: {}", status.state);
                match status.active_page {
                    Some(page) => println!("  Active page: {}", page),
                    None => println!("  Active page: none"),
                }
                println!("  Unsaved bindings: {}", if status.dirty { "yes" } else { "no" });
            }
        }
        DaemonCommands::Quit => {
            client.quit().await?;
            println!("Shutdown request sent to daemon");
        }
    }

    Ok(())
}
