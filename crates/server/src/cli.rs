//! Command-line surface for the hosting participant. Startup is a flag
//! set; `share`/`unshare` are issued once the server is running, as
//! plain-text lines on stdin (the same "read commands from stdin while
//! serving" shape as the prototype's editor handshake).

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "SVSmate", about = "Real-time document collaboration server")]
pub struct Cli {
    /// Display name advertised to discovery probes and the client roster.
    #[arg(long, default_value = "H-SVSmate")]
    pub name: String,

    /// TCP port the session transport listens on.
    #[arg(long)]
    pub tcp_port: Option<u16>,

    /// UDP port the discovery responder listens on.
    #[arg(long)]
    pub udp_port: Option<u16>,

    /// Emit debug-level logs in addition to info.
    #[arg(short, long)]
    pub verbose: bool,
}

/// A parsed stdin console line.
#[derive(Debug, PartialEq, Eq)]
pub enum StdinCommand {
    Share { path: String },
    Unshare { file_id: String },
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
        "share" if !rest.is_empty() => StdinCommand::Share { path: rest.to_string() },
        "unshare" if !rest.is_empty() => StdinCommand::Unshare { file_id: rest.to_string() },
        "list" => StdinCommand::List,
        "quit" | "exit" => StdinCommand::Quit,
        _ => StdinCommand::Unknown(line.to_string()),
    })
}
