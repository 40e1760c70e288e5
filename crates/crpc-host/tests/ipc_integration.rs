//! IPC integration tests
//!
//! Runs the IPC server on an ephemeral loopback port and talks to it with
//! the real client and with raw sockets.

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crpc_core::ipc::MAX_RESPONSE_LEN;
use crpc_core::{IpcCommand, IpcError, IpcResponse, Profile, ProfileStore};
use crpc_host::ipc::{IpcClient, IpcServer};
use crpc_host::SharedState;

use common::{fixture, APP_ID};

struct RunningServer {
    port: u16,
    shutdown: CancellationToken,
    handle: JoinHandle<()>,
}

async fn start_server(state: &SharedState, read_timeout: Duration) -> RunningServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let shutdown = CancellationToken::new();

    let server =
        IpcServer::new(Arc::clone(state), shutdown.clone()).with_read_timeout(read_timeout);
    let handle = tokio::spawn(async move {
        server.run(listener).await.unwrap();
    });

    RunningServer {
        port,
        shutdown,
        handle,
    }
}

fn client(port: u16) -> IpcClient {
    IpcClient::new(port).with_timeouts(Duration::from_secs(2), Duration::from_secs(5))
}

/// Send a raw line and return the raw response line
async fn raw_exchange(port: u16, line: &[u8]) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(line).await.unwrap();
    stream.flush().await.unwrap();

    let mut reader = BufReader::new(stream);
    let mut response = String::new();
    reader.read_line(&mut response).await.unwrap();
    response
}

#[tokio::test]
async fn test_ping_pong() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let response = client(server.port).send(&IpcCommand::Ping).await.unwrap();
    assert_eq!(response, IpcResponse::ok("pong"));

    server.handle.abort();
}

#[tokio::test]
async fn test_connect_then_status_then_disconnect() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;
    let client = client(server.port);

    let response = client
        .send(&IpcCommand::Connect {
            profile: Some("Gaming".to_string()),
        })
        .await
        .unwrap();
    assert_eq!(response, IpcResponse::ok("connected Gaming"));

    {
        let recorded = fx.recorded.lock();
        assert_eq!(recorded.connects, vec![APP_ID.to_string()]);
        assert_eq!(recorded.activities.len(), 1);
        assert_eq!(recorded.activities[0].details.as_deref(), Some("Ranked"));
        assert_eq!(recorded.activities[0].state.as_deref(), Some("In queue"));
    }

    let status = client.send(&IpcCommand::Status).await.unwrap();
    assert_eq!(
        status,
        IpcResponse::ok(format!("connected Gaming (pid {})", std::process::id()))
    );

    for _ in 0..2 {
        let response = client.send(&IpcCommand::Disconnect).await.unwrap();
        assert_eq!(response, IpcResponse::ok("disconnected"));
    }
    assert_eq!(fx.recorded.lock().closes, 1);

    server.handle.abort();
}

#[tokio::test]
async fn test_switching_profiles_changes_application() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;
    let client = client(server.port);

    for name in ["Gaming", "Late Night Coding"] {
        let response = client
            .send(&IpcCommand::Connect {
                profile: Some(name.to_string()),
            })
            .await
            .unwrap();
        assert_eq!(response, IpcResponse::ok(format!("connected {}", name)));
    }

    let recorded = fx.recorded.lock();
    assert_eq!(recorded.connects.len(), 2);
    assert_eq!(recorded.activities.len(), 2);

    server.handle.abort();
}

#[tokio::test]
async fn test_list_profiles_sees_new_files() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;
    let client = client(server.port);

    let response = client.send(&IpcCommand::ListProfiles).await.unwrap();
    assert_eq!(
        response,
        IpcResponse::Profiles {
            names: vec!["Gaming".to_string(), "Late Night Coding".to_string()]
        }
    );

    // Written by another process while the server runs
    ProfileStore::open(fx.paths.profiles_dir())
        .unwrap()
        .create(Profile::new("Afk"))
        .unwrap();

    let response = client.send(&IpcCommand::ListProfiles).await.unwrap();
    assert_eq!(
        response,
        IpcResponse::Profiles {
            names: vec![
                "Afk".to_string(),
                "Gaming".to_string(),
                "Late Night Coding".to_string()
            ]
        }
    );

    server.handle.abort();
}

#[tokio::test]
async fn test_list_profiles_returns_every_name_in_a_large_store() {
    let fx = fixture();
    let store = ProfileStore::open(fx.paths.profiles_dir()).unwrap();
    for n in 0..300 {
        store
            .create(Profile::new(format!("Profile number {:04}", n)))
            .unwrap();
    }
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let response = client(server.port)
        .send(&IpcCommand::ListProfiles)
        .await
        .unwrap();
    let IpcResponse::Profiles { names } = response else {
        panic!("unexpected response: {:?}", response);
    };
    assert_eq!(names.len(), 302);
    assert!(names.contains(&"Profile number 0000".to_string()));
    assert!(names.contains(&"Profile number 0299".to_string()));
    assert_eq!(names, store.list().unwrap());

    server.handle.abort();
}

#[tokio::test]
async fn test_unknown_profile_is_an_error() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let response = client(server.port)
        .send(&IpcCommand::Connect {
            profile: Some("Nope".to_string()),
        })
        .await
        .unwrap();
    match response {
        IpcResponse::Error { message } => assert!(message.contains("not found")),
        other => panic!("Expected Error response, got {:?}", other),
    }

    server.handle.abort();
}

#[tokio::test]
async fn test_malformed_lines_get_error_and_server_survives() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let response = raw_exchange(server.port, b"reboot now\n").await;
    assert!(response.starts_with("ERROR: Unknown command"), "{}", response);

    let response = raw_exchange(server.port, b"\n").await;
    assert!(response.starts_with("ERROR: Malformed command"), "{}", response);

    let response = raw_exchange(server.port, b"\xff\xfe\n").await;
    assert!(response.starts_with("ERROR:"), "{}", response);

    let long = format!("connect {}\n", "x".repeat(5000));
    let response = raw_exchange(server.port, long.as_bytes()).await;
    assert!(response.contains("too long"), "{}", response);

    // Verb matching is case-insensitive on the wire
    let response = raw_exchange(server.port, b"PING\n").await;
    assert_eq!(response, "OK: pong\n");

    server.handle.abort();
}

#[tokio::test]
async fn test_silent_client_times_out_without_blocking_others() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_millis(200)).await;

    // Connects but never sends a command
    let silent = TcpStream::connect(("127.0.0.1", server.port)).await.unwrap();

    let response = client(server.port).send(&IpcCommand::Ping).await.unwrap();
    assert_eq!(response, IpcResponse::ok("pong"));

    let mut reader = BufReader::new(silent);
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    assert_eq!(line, "ERROR: timed out waiting for command\n");

    server.handle.abort();
}

#[tokio::test]
async fn test_concurrent_clients_are_served_one_at_a_time() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let port = server.port;
        handles.push(tokio::spawn(async move {
            client(port).send(&IpcCommand::Ping).await.unwrap()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), IpcResponse::ok("pong"));
    }

    server.handle.abort();
}

#[tokio::test]
async fn test_quit_stops_server_and_frees_port() {
    let fx = fixture();
    let server = start_server(&fx.state, Duration::from_secs(2)).await;

    let response = client(server.port).send(&IpcCommand::Quit).await.unwrap();
    assert_eq!(response, IpcResponse::ok("quitting"));
    assert!(server.shutdown.is_cancelled());

    tokio::time::timeout(Duration::from_secs(5), server.handle)
        .await
        .expect("server did not stop")
        .unwrap();

    let err = client(server.port).send(&IpcCommand::Ping).await.unwrap_err();
    assert!(err.is_refused(), "{:?}", err);
    TcpListener::bind(("127.0.0.1", server.port)).await.unwrap();
}

#[tokio::test]
async fn test_client_times_out_on_silent_server() {
    // Accepts but never answers
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _guard = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let err = IpcClient::new(port)
        .with_timeouts(Duration::from_secs(1), Duration::from_millis(200))
        .send(&IpcCommand::Ping)
        .await
        .unwrap_err();
    assert!(matches!(err, IpcError::Timeout { .. }), "{:?}", err);
}

#[tokio::test]
async fn test_client_rejects_oversized_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _guard = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut body = b"PROFILES: ".to_vec();
        body.resize(MAX_RESPONSE_LEN + 16, b'x');
        let _ = stream.write_all(&body).await;
        tokio::time::sleep(Duration::from_secs(30)).await;
    });

    let err = client(port).send(&IpcCommand::ListProfiles).await.unwrap_err();
    assert!(
        matches!(&err, IpcError::InvalidResponse(reason) if reason == "response too long"),
        "{:?}",
        err
    );
}

#[tokio::test]
async fn test_client_rejects_truncated_response() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let _guard = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut stream = BufReader::new(stream);
        let mut command = String::new();
        stream.read_line(&mut command).await.unwrap();
        stream
            .get_mut()
            .write_all(b"PROFILES: Gaming\tLate Ni")
            .await
            .unwrap();
        stream.get_mut().shutdown().await.unwrap();
    });

    let err = client(port).send(&IpcCommand::ListProfiles).await.unwrap_err();
    assert!(matches!(err, IpcError::InvalidResponse(_)), "{:?}", err);
}
