//! Terminal output formatting

use tabled::{
    settings::{Style, Width},
    Table, Tabled,
};

use drover_core::time::current_time_secs;
use drover_core::{AgentRecord, CommandRecord};

/// Format the agent list as an ASCII table
pub fn format_agents(agents: &[AgentRecord]) -> String {
    if agents.is_empty() {
        return "No registered agents".to_string();
    }

    #[derive(Tabled)]
    struct AgentRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "HOSTNAME")]
        hostname: String,
        #[tabled(rename = "IP")]
        ip: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "LAST SEEN")]
        last_seen: String,
    }

    let rows: Vec<AgentRow> = agents
        .iter()
        .map(|a| AgentRow {
            id: truncate(a.id.as_str(), 12),
            hostname: a.hostname.clone(),
            ip: a.ip.clone(),
            status: a.status.to_string(),
            last_seen: format_ago(a.last_seen),
        })
        .collect();

    Table::new(rows).with(Style::rounded()).to_string()
}

/// Format a command history as an ASCII table
pub fn format_commands(commands: &[CommandRecord]) -> String {
    if commands.is_empty() {
        return "No commands".to_string();
    }

    #[derive(Tabled)]
    struct CommandRow {
        #[tabled(rename = "ID")]
        id: String,
        #[tabled(rename = "COMMAND")]
        command: String,
        #[tabled(rename = "STATUS")]
        status: String,
        #[tabled(rename = "SUBMITTED")]
        submitted: String,
        #[tabled(rename = "OUTPUT")]
        output: String,
    }

    let rows: Vec<CommandRow> = commands
        .iter()
        .map(|c| CommandRow {
            id: truncate(c.id.as_str(), 12),
            command: truncate(&c.command, 32),
            status: c.status.to_string(),
            submitted: format_ago(c.created_at),
            output: summarize_output(c),
        })
        .collect();

    Table::new(rows)
        .with(Style::rounded())
        .with(Width::wrap(120))
        .to_string()
}

fn summarize_output(record: &CommandRecord) -> String {
    if let Some(error) = &record.error {
        return truncate(error, 40);
    }
    match &record.result {
        Some(result) => truncate(result.trim(), 40),
        None => "-".to_string(),
    }
}

/// Format a Unix timestamp as time elapsed
fn format_ago(timestamp: u64) -> String {
    let secs = current_time_secs().saturating_sub(timestamp);
    if secs < 60 {
        format!("{}s ago", secs)
    } else if secs < 3600 {
        format!("{}m ago", secs / 60)
    } else if secs < 86400 {
        format!("{}h ago", secs / 3600)
    } else {
        format!("{}d ago", secs / 86400)
    }
}

/// Truncate a string with ellipsis if too long
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

/// Print a success message in green with a checkmark prefix
pub fn print_success(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stdout = std::io::stdout();
    let _ = crossterm::execute!(
        stdout,
        SetForegroundColor(Color::Green),
        Print("✓ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}

/// Print an error message in red with an X prefix
pub fn print_error(msg: &str) {
    use crossterm::style::{Color, Print, ResetColor, SetForegroundColor};

    let mut stderr = std::io::stderr();
    let _ = crossterm::execute!(
        stderr,
        SetForegroundColor(Color::Red),
        Print("✗ "),
        ResetColor,
        Print(msg),
        Print("\n")
    );
}
