//! drover operator CLI
//!
//! Talks to a running coordinator over its operator HTTP API.

mod api;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};

use api::ApiClient;
use output::{format_agents, format_commands, print_error, print_success};

#[derive(Parser)]
#[command(name = "drover")]
#[command(author, version, about = "Remote command execution manager")]
#[command(propagate_version = true)]
struct Cli {
    /// Coordinator base URL
    #[arg(short, long, global = true, default_value = "http://localhost:8080")]
    server: String,

    /// Operator API key
    #[arg(short = 'k', long, global = true, env = "DROVER_OPERATOR_KEY", default_value = "")]
    operator_key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List registered agents
    /// Alias: ls
    #[command(name = "list-clients", alias = "ls")]
    ListClients,

    /// Send a command to an agent
    Send {
        /// Target agent ID
        client_id: String,
        /// Shell command to run
        command: String,
    },

    /// Show an agent's command history
    #[command(name = "get-commands", alias = "history")]
    GetCommands {
        /// Target agent ID
        client_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let client = ApiClient::new(&cli.server, &cli.operator_key);

    match cli.command {
        Commands::ListClients => {
            let agents = client.list_clients().await?;
            println!("{}", format_agents(&agents));
        }
        Commands::Send { client_id, command } => {
            let record = client.send_command(&client_id, &command).await?;
            print_success(&format!(
                "Command {} accepted ({})",
                record.id, record.status
            ));
        }
        Commands::GetCommands { client_id } => {
            let commands = client.get_commands(&client_id).await?;
            println!("{}", format_commands(&commands));
        }
    }

    Ok(())
}
