use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use svsmate_core::config::Config;
use svsmate_core::editor::FsEditor;
use svsmate_core::{discovery, logging};
use tokio::io::{AsyncBufReadExt, BufReader};

use svsmate_client::cli::{self, Cli, StdinCommand};
use svsmate_client::state::Client;
use svsmate_client::transport;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = Config::default().with_env_overrides();
    let udp_port = cli.udp_port.unwrap_or(config.udp_port);
    let discovery_timeout = cli
        .discovery_timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(config.discovery_timeout);

    let editor: Arc<dyn svsmate_core::editor::EditorCollaborator> = Arc::new(FsEditor);
    let client = Arc::new(Client::new(editor.clone(), config.pending_queue_cap));

    let addr = match resolve_server_addr(&cli, &editor, udp_port, discovery_timeout).await {
        Some(addr) => addr,
        None => {
            tracing::error!("no server found, exiting");
            std::process::exit(1);
        }
    };

    let session_client = client.clone();
    let write_queue_cap = config.write_queue_cap;
    let session = tokio::spawn(async move {
        if let Err(e) = transport::connect(session_client, addr, write_queue_cap).await {
            tracing::error!(error = %e, "session ended with error");
        }
    });

    let mut error_rx = client
        .take_error_receiver()
        .expect("error receiver already taken");
    tokio::spawn(async move {
        while let Some(err) = error_rx.recv().await {
            tracing::error!(error = %err, "error event");
        }
    });

    run_console(client).await;
    session.abort();
}

async fn resolve_server_addr(
    cli: &Cli,
    editor: &Arc<dyn svsmate_core::editor::EditorCollaborator>,
    udp_port: u16,
    discovery_timeout: Duration,
) -> Option<SocketAddr> {
    if let Some(explicit) = &cli.connect {
        return explicit.parse().ok();
    }

    let client_name = editor.hostname();
    tracing::info!(%client_name, "discovering server");
    let servers = discovery::discover_servers(udp_port, &client_name, discovery_timeout)
        .await
        .ok()?;
    let server = servers.into_iter().next()?;
    tracing::info!(name = %server.name, ip = %server.ip, tcp_port = server.tcp_port, "server found");
    Some(SocketAddr::new(server.ip, server.tcp_port))
}

/// Reads `open`/`request`/`roster`/`list`/`quit` lines from stdin.
async fn run_console(client: Arc<Client>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "stdin read error");
                break;
            }
        };

        match cli::parse_stdin_line(&line) {
            Some(StdinCommand::Open { file_id }) => match client.open_shared_file(&file_id) {
                Ok(path) => println!("opened {file_id} at {}", path.display()),
                Err(e) => println!("error: {e}"),
            },
            Some(StdinCommand::Request { file_id }) => {
                client.request_document(&file_id);
            }
            Some(StdinCommand::Roster) => {
                for entry in client.roster() {
                    println!("{}  {}", entry.id, entry.name);
                }
            }
            Some(StdinCommand::List) => {
                for meta in client.registry.all_metadata() {
                    println!("{}  {}  owner={}", meta.file_id, meta.name, meta.owner_id);
                }
            }
            Some(StdinCommand::Quit) => break,
            Some(StdinCommand::Unknown(line)) => println!("unrecognized command: {line}"),
            None => {}
        }
    }
}
