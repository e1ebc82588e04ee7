//! End-to-end runs against a scripted local websocket peer.

use std::{future::Future, time::Duration};

use futures::{SinkExt, StreamExt};
use online_python_core::{InputFile, RunRequest};
use online_python_session::{
    Console, FAILURE_EXIT_CODE, RelayConfig, RelayError, Termination, start,
};
use tokio::{
    io::{AsyncWriteExt, BufReader},
    net::{TcpListener, TcpStream},
};
use tokio_tungstenite::{WebSocketStream, accept_async, tungstenite::Message};

type ServerStream = WebSocketStream<TcpStream>;

const OPEN: &str = r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#;
const FAST_PING_OPEN: &str =
    r#"0{"sid":"abc","upgrades":[],"pingInterval":50,"pingTimeout":5000}"#;

async fn serve_once<F, Fut>(script: F) -> String
where
    F: FnOnce(ServerStream) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (tcp, _) = listener.accept().await.unwrap();
        let ws = accept_async(tcp).await.unwrap();
        script(ws).await;
    });
    format!("ws://{addr}/socket.io/?EIO=3&transport=websocket")
}

async fn next_text(ws: &mut ServerStream) -> String {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => {}
            other => panic!("Unexpected message: {other:?}"),
        }
    }
}

/// Next event frame, counting the client pings that arrive before it.
async fn next_event(ws: &mut ServerStream) -> (String, usize) {
    let mut pings = 0;
    loop {
        let text = next_text(ws).await;
        if text == "2" {
            pings += 1;
        } else {
            return (text, pings);
        }
    }
}

async fn handshake(ws: &mut ServerStream) -> String {
    ws.send(Message::text(OPEN)).await.unwrap();
    ws.send(Message::text("40")).await.unwrap();
    next_text(ws).await
}

async fn output(ws: &mut ServerStream, kind: &str, data: &str) {
    ws.send(Message::text(format!(
        r#"451-["{kind}",{{"_placeholder":true,"num":0}}]"#
    )))
    .await
    .unwrap();
    ws.send(Message::binary(data.as_bytes().to_vec()))
        .await
        .unwrap();
}

async fn exit(ws: &mut ServerStream, code: i32) {
    ws.send(Message::text(format!(
        r#"42["exit","Process exited - Return Code: {code}",{code}]"#
    )))
    .await
    .unwrap();
    let _ = ws.next().await;
}

fn request() -> RunRequest {
    RunRequest::new(
        vec![
            InputFile::new("main.py", "name = input()\nprint('Hello', name)\n"),
            InputFile::new("util.py", "X = 1\n"),
        ],
        vec!["loud".into()],
    )
    .unwrap()
}

#[tokio::test]
async fn interactive_run_with_traffic_log() {
    let url = serve_once(|mut ws| async move {
        let code = handshake(&mut ws).await;
        assert!(code.starts_with(r#"42["code",[{"code":"#));
        assert!(code.contains(r#""file_name":"main.py""#));
        assert!(code.ends_with(r#""loud","main.py"]"#));

        output(&mut ws, "input", "").await;
        assert_eq!(next_text(&mut ws).await, r#"42["message","Ada"]"#);
        output(&mut ws, "output", "Hello Ada").await;
        exit(&mut ws, 0).await;
    })
    .await;

    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("traffic.log");
    let config = RelayConfig::default()
        .with_url(url)
        .with_log_path(Some(log_path.clone()));
    let mut console = Console::new(&b"Ada\n"[..], Vec::new(), Vec::new());

    let termination = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap();
    assert_eq!(termination, Termination::Exited { code: Some(0) });

    let (_, stdout, _) = console.into_parts();
    assert_eq!(String::from_utf8(stdout).unwrap(), "Hello Ada\n");

    let log = std::fs::read_to_string(&log_path).unwrap();
    let position = |needle: &str| {
        log.find(needle)
            .unwrap_or_else(|| panic!("{needle:?} missing from log:\n{log}"))
    };
    let code = position(r#">> "42[\"code\""#);
    let stdin = position(r#">> "42[\"message\",\"Ada\"]""#);
    let hello = position(r#"<< "Hello Ada""#);
    let exit = position(r#"<< "42[\"exit\""#);
    assert!(code < stdin && stdin < hello && hello < exit);
}

#[tokio::test]
async fn remote_failure_code_is_passed_through() {
    let url = serve_once(|mut ws| async move {
        handshake(&mut ws).await;
        output(&mut ws, "err", "Traceback (most recent call last):").await;
        exit(&mut ws, 2).await;
    })
    .await;

    let config = RelayConfig::default().with_url(url);
    let mut console = Console::new(&b""[..], Vec::new(), Vec::new());
    let termination = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination.exit_code(), 2);
    let (_, stdout, stderr) = console.into_parts();
    assert!(stdout.is_empty());
    assert_eq!(
        String::from_utf8(stderr).unwrap(),
        "Traceback (most recent call last):\n"
    );
}

#[tokio::test]
async fn dropped_connection_is_a_failure() {
    let url = serve_once(|mut ws| async move {
        handshake(&mut ws).await;
        output(&mut ws, "output", "partial").await;
    })
    .await;

    let config = RelayConfig::default().with_url(url);
    let mut console = Console::new(&b""[..], Vec::new(), Vec::new());
    let termination = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination, Termination::Disconnected);
    assert_eq!(termination.exit_code(), FAILURE_EXIT_CODE);
}

#[tokio::test]
async fn unreachable_endpoint_is_a_connection_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = RelayConfig::default().with_url(format!("ws://{addr}/"));
    let mut console = Console::new(&b""[..], Vec::new(), Vec::new());
    let err = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap_err();
    assert!(matches!(err, RelayError::Transport(_)));
}

#[tokio::test]
async fn heartbeat_continues_while_waiting_for_local_input() {
    let url = serve_once(|mut ws| async move {
        ws.send(Message::text(FAST_PING_OPEN)).await.unwrap();
        ws.send(Message::text("40")).await.unwrap();
        let (code, _) = next_event(&mut ws).await;
        assert!(code.starts_with(r#"42["code""#));

        output(&mut ws, "input", "").await;
        let (line, pings) = next_event(&mut ws).await;
        assert_eq!(line, r#"42["message","Ada"]"#);
        assert!(pings >= 3, "only {pings} pings while waiting for input");
        exit(&mut ws, 0).await;
    })
    .await;

    let (mut typist, stdin) = tokio::io::duplex(64);
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(400)).await;
        typist.write_all(b"Ada\n").await.unwrap();
    });

    let config = RelayConfig::default().with_url(url);
    let mut console = Console::new(BufReader::new(stdin), Vec::new(), Vec::new());
    let termination = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap();
    assert_eq!(termination, Termination::Exited { code: Some(0) });
}

#[tokio::test]
async fn input_typed_before_the_request_is_forwarded() {
    let url = serve_once(|mut ws| async move {
        handshake(&mut ws).await;
        output(&mut ws, "output", "Name?").await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        output(&mut ws, "input", "").await;
        assert_eq!(next_text(&mut ws).await, r#"42["message","Grace"]"#);
        output(&mut ws, "output", "Hello Grace").await;
        exit(&mut ws, 0).await;
    })
    .await;

    let config = RelayConfig::default().with_url(url);
    let mut console = Console::new(&b"Grace\n"[..], Vec::new(), Vec::new());
    let termination = start(&request(), &config, &mut console, std::future::pending())
        .await
        .unwrap();

    assert_eq!(termination.exit_code(), 0);
    let (_, stdout, _) = console.into_parts();
    assert_eq!(String::from_utf8(stdout).unwrap(), "Name?\nHello Grace\n");
}
