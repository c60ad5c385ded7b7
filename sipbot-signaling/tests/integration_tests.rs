use sipbot_signaling::{
    CommandSink, ControlChannel, ControlEndpoint, EventKind, EventMonitor, SignalingProcess,
};
use std::path::Path;
use std::time::Duration;
use tempfile::tempdir;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, UnixListener};

async fn read_lines<R>(reader: R, count: usize) -> Vec<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut lines = Vec::new();
    for _ in 0..count {
        let mut line = String::new();
        let read = tokio::time::timeout(Duration::from_secs(2), reader.read_line(&mut line))
            .await
            .expect("timed out waiting for command")
            .unwrap();
        if read == 0 {
            break;
        }
        lines.push(line.trim_end().to_string());
    }
    lines
}

#[tokio::test]
async fn test_commands_over_unix_socket() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("baresip.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let channel = ControlChannel::new(ControlEndpoint::Unix(socket_path.clone()));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        read_lines(stream, 3).await
    });

    channel.accept_call().await;
    channel.play_file(Path::new("/tmp/response.wav")).await;
    assert!(channel.is_connected().await);

    let lines = server.await.unwrap();
    assert_eq!(lines, vec!["/accept", "/ausrc_mute", "/auplay /tmp/response.wav"]);
}

#[tokio::test]
async fn test_connection_is_reused() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("reuse.sock");
    let listener = UnixListener::bind(&socket_path).unwrap();

    let channel = ControlChannel::new(ControlEndpoint::Unix(socket_path.clone()));

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let lines = read_lines(stream, 2).await;
        // A second connection would show up here
        let second = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
        (lines, second.is_err())
    });

    channel.send("/ausrc_mute").await;
    channel.send("/accept").await;

    let (lines, no_second_connection) = server.await.unwrap();
    assert_eq!(lines, vec!["/ausrc_mute", "/accept"]);
    assert!(no_second_connection, "channel should keep one connection open");
}

#[tokio::test]
async fn test_commands_over_tcp() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let endpoint: ControlEndpoint = format!("tcp:{}", addr).parse().unwrap();
    let channel = ControlChannel::new(endpoint);

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        read_lines(stream, 1).await
    });

    channel.accept_call().await;
    assert_eq!(server.await.unwrap(), vec!["/accept"]);
}

#[tokio::test]
async fn test_late_listener_is_picked_up() {
    let temp_dir = tempdir().unwrap();
    let socket_path = temp_dir.path().join("late.sock");
    let channel = ControlChannel::new(ControlEndpoint::Unix(socket_path.clone()));

    // Nobody listening yet: swallowed
    channel.accept_call().await;
    assert!(!channel.is_connected().await);

    let listener = UnixListener::bind(&socket_path).unwrap();
    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        read_lines(stream, 1).await
    });

    channel.accept_call().await;
    assert_eq!(server.await.unwrap(), vec!["/accept"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_process_stdout_feeds_monitor() {
    let temp_dir = tempdir().unwrap();

    // `echo` stands in for baresip: it prints its arguments and exits
    let args = vec!["incoming".to_string(), "call".to_string(), "from".to_string(), "Carol".to_string()];
    let (process, stdout) = SignalingProcess::spawn(
        "echo",
        &args,
        temp_dir.path(),
        &ControlEndpoint::Unix(temp_dir.path().join("ctrl.sock")),
    )
    .unwrap();

    let (monitor, mut events) = EventMonitor::spawn(stdout);

    let first = events.recv().await.unwrap();
    assert_eq!(first.kind, EventKind::IncomingCall);
    assert_eq!(first.caller(), Some("Carol"));
    assert_eq!(events.recv().await.unwrap().kind, EventKind::StreamClosed);

    assert_eq!(monitor.await.unwrap().incoming_calls, 1);
    process.shutdown().await.unwrap();
}
