//! Command-line surface for a collaborating participant.

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "SVSmate", about = "Real-time document collaboration client")]
pub struct Cli {
    /// Connect directly to this address instead of discovering a server.
    #[arg(long, value_name = "HOST:PORT")]
    pub connect: Option<String>,

    /// UDP port to probe when discovering a server.
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// Discovery wall-clock timeout, in seconds.
    #[arg(long)]
    pub discovery_timeout_secs: Option<u64>,

    /// Emit debug-level logs in addition to info.
    #[arg(short, long)]
    pub verbose: bool,
}

/// A parsed stdin console line, mirroring the server's interactive
/// command surface.
#[derive(Debug, PartialEq, Eq)]
pub enum StdinCommand {
    Open { file_id: String },
    Request { file_id: String },
    Roster,
    List,
    Quit,
    Unknown(String),
}

pub fn parse_stdin_line(line: &str) -> Option<StdinCommand> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let cmd = parts.next().unwrap_or_default();
    let rest = parts.next().unwrap_or_default().trim();

    Some(match cmd {
        "open" if !rest.is_empty() => StdinCommand::Open { file_id: rest.to_string() },
        "request" if !rest.is_empty() => StdinCommand::Request { file_id: rest.to_string() },
        "roster" => StdinCommand::Roster,
        "list" => StdinCommand::List,
        "quit" | "exit" => StdinCommand::Quit,
        _ => StdinCommand::Unknown(line.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_with_file_id() {
        assert_eq!(
            parse_stdin_line("open f1"),
            Some(StdinCommand::Open { file_id: "f1".to_string() })
        );
    }

    #[test]
    fn blank_line_parses_to_none() {
        assert_eq!(parse_stdin_line(""), None);
    }
}
