//! End-to-end scenarios pairing a real `svsmate_client::state::Client`
//! against a real `svsmate_server::state::Server` over loopback TCP.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use svsmate_client::state::Client;
use svsmate_client::transport as client_transport;
use svsmate_core::editor::FsEditor;
use svsmate_server::state::Server;
use svsmate_server::transport as server_transport;

async fn spawn_server(name: &str) -> (Arc<Server>, std::net::SocketAddr) {
    let server = Arc::new(Server::new(name, Arc::new(FsEditor), 256));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let run_server = server.clone();
    tokio::spawn(async move {
        let _ = server_transport::run(run_server, addr, 256).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    (server, addr)
}

async fn spawn_client(addr: std::net::SocketAddr) -> Arc<Client> {
    let client = Arc::new(Client::new(Arc::new(FsEditor), 256));
    let session_client = client.clone();
    tokio::spawn(async move {
        let _ = client_transport::connect(session_client, addr, 256).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    client
}

#[tokio::test]
async fn s1_client_connects_and_sees_empty_roster() {
    let (_server, addr) = spawn_server("H-SVSmate").await;
    let client = spawn_client(addr).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.registry.all_metadata().is_empty());
}

#[tokio::test]
async fn s2_client_sees_shared_document_content() {
    let (server, addr) = spawn_server("H-SVSmate").await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "hello").unwrap();

    let client = spawn_client(addr).await;
    let file_id = server.share_file(file.path().to_path_buf()).unwrap();

    wait_until(|| client.registry.text(&file_id).map(|t| t == "hello").unwrap_or(false)).await;
}

#[tokio::test]
async fn s3_bidirectional_edits_converge() {
    let (server, addr) = spawn_server("H-SVSmate").await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "hello").unwrap();
    let path = file.path().to_path_buf();

    let client = spawn_client(addr).await;
    let file_id = server.share_file(path.clone()).unwrap();
    wait_until(|| client.registry.text(&file_id).map(|t| t == "hello").unwrap_or(false)).await;

    // Client appends " world" at offset 5.
    client.handle_local_edit(&file_id, 5, 0, " world").unwrap();
    wait_until(|| server.registry.text(&file_id).map(|t| t == "hello world").unwrap_or(false)).await;

    // Server prepends "Say: " after observing the client's edit.
    server.handle_local_edit(&file_id, 0, 0, "Say: ").unwrap();
    wait_until(|| client.registry.text(&file_id).map(|t| t == "Say: hello world").unwrap_or(false)).await;

    assert_eq!(server.registry.text(&file_id).unwrap(), "Say: hello world");
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "Say: hello world");
}

#[tokio::test]
async fn s4_concurrent_insertions_converge() {
    let (server, addr) = spawn_server("H-SVSmate").await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "ab").unwrap();

    let client = spawn_client(addr).await;
    let file_id = server.share_file(file.path().to_path_buf()).unwrap();
    wait_until(|| client.registry.text(&file_id).map(|t| t == "ab").unwrap_or(false)).await;

    client.handle_local_edit(&file_id, 1, 0, "X").unwrap();
    server.handle_local_edit(&file_id, 1, 0, "Y").unwrap();

    wait_until(|| {
        let s = server.registry.text(&file_id).unwrap_or_default();
        let c = client.registry.text(&file_id).unwrap_or_default();
        !s.is_empty() && s == c && s.contains('X') && s.contains('Y')
    })
    .await;

    let final_text = server.registry.text(&file_id).unwrap();
    assert_eq!(final_text, client.registry.text(&file_id).unwrap());
    assert!(final_text.contains('X') && final_text.contains('Y'));
}

#[tokio::test]
async fn s5_late_joiner_matches_server_text() {
    let (server, addr) = spawn_server("H-SVSmate").await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "draft").unwrap();
    let file_id = server.share_file(file.path().to_path_buf()).unwrap();
    server.handle_local_edit(&file_id, 5, 0, " two").unwrap();

    let client = spawn_client(addr).await;
    wait_until(|| client.registry.text(&file_id).map(|t| t == "draft two").unwrap_or(false)).await;
}

#[tokio::test]
async fn s6_disconnect_clears_client_documents() {
    let (server, addr) = spawn_server("H-SVSmate").await;
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "hello").unwrap();
    let file_id = server.share_file(file.path().to_path_buf()).unwrap();

    let client = spawn_client(addr).await;
    wait_until(|| client.registry.text(&file_id).map(|t| t == "hello").unwrap_or(false)).await;

    client.clear();
    assert!(client.registry.all_metadata().is_empty());
    // The owner's document is unaffected by a peer clearing its cache.
    assert_eq!(server.registry.text(&file_id).unwrap(), "hello");
}

/// Polls `predicate` until it returns `true` or a fixed timeout elapses.
async fn wait_until(mut predicate: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if predicate() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition did not become true within the timeout");
}
