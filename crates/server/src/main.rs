use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use svsmate_core::config::Config;
use svsmate_core::editor::FsEditor;
use svsmate_core::{discovery, logging};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::UdpSocket;

use svsmate_server::cli::{self, Cli, StdinCommand};
use svsmate_server::state::Server;
use svsmate_server::transport;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut config = Config::default().with_env_overrides();
    if let Some(port) = cli.tcp_port {
        config.tcp_port = port;
    }
    if let Some(port) = cli.udp_port {
        config.udp_port = port;
    }

    let server = Arc::new(Server::new(cli.name.clone(), Arc::new(FsEditor), config.pending_queue_cap));

    let udp_socket = match UdpSocket::bind(("0.0.0.0", config.udp_port)).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error = %e, "failed to bind discovery socket");
            std::process::exit(1);
        }
    };
    let responder_server = server.clone();
    let responder_name = cli.name.clone();
    let udp_port = config.udp_port;
    let tcp_port = config.tcp_port;
    tokio::spawn(async move {
        discovery::run_responder(udp_socket, responder_name, tcp_port, udp_port, move || {
            responder_server.client_count()
        })
        .await;
    });

    let transport_server = server.clone();
    let tcp_addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.tcp_port));
    let write_queue_cap = config.write_queue_cap;
    tokio::spawn(async move {
        if let Err(e) = transport::run(transport_server, tcp_addr, write_queue_cap).await {
            tracing::error!(error = %e, "transport loop exited");
            std::process::exit(1);
        }
    });

    let mut error_rx = server
        .take_error_receiver()
        .expect("error receiver already taken");
    tokio::spawn(async move {
        while let Some(err) = error_rx.recv().await {
            tracing::error!(error = %err, "error event");
        }
    });

    tracing::info!(name = %cli.name, tcp_port, udp_port, "SVSmate server started");
    run_console(server).await;
}

/// Reads `share`/`unshare`/`list`/`quit` lines from stdin until EOF or
/// `quit`, driving the owner-side operations a connected client cannot
/// issue itself.
async fn run_console(server: Arc<Server>) {
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
            Some(StdinCommand::Share { path }) => match server.share_file(PathBuf::from(&path)) {
                Ok(file_id) => println!("shared {path} as {file_id}"),
                Err(e) => println!("error: {e}"),
            },
            Some(StdinCommand::Unshare { file_id }) => {
                server.unshare_file(&file_id);
                println!("unshared {file_id}");
            }
            Some(StdinCommand::List) => {
                for meta in server.registry.all_metadata() {
                    println!("{}  {}  owner={}", meta.file_id, meta.name, meta.owner_id);
                }
            }
            Some(StdinCommand::Quit) => break,
            Some(StdinCommand::Unknown(line)) => println!("unrecognized command: {line}"),
            None => {}
        }
    }
}
