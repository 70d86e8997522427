//! Drives the client against an in-process WebSocket server speaking the
//! same message shapes as the hosted service.

use assemblyai_realtime::types::ServerMessage;
use assemblyai_realtime::{Config, connect};
use secrecy::SecretString;
use std::net::TcpListener;
use std::time::Duration;
use tokio_tungstenite::tungstenite::{self, Message};

fn spawn_server() -> (String, std::thread::JoinHandle<(usize, Option<String>)>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut auth = None;
        let mut socket = tungstenite::accept_hdr(
            stream,
            |request: &tungstenite::handshake::server::Request,
             response: tungstenite::handshake::server::Response| {
                auth = request
                    .headers()
                    .get("Authorization")
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                Ok(response)
            },
        )
        .unwrap();

        socket
            .send(Message::Text(r#"{"type":"Begin","id":"s1"}"#.to_string()))
            .unwrap();

        let mut frames = 0;
        loop {
            match socket.read() {
                Ok(Message::Binary(_)) => {
                    frames += 1;
                    if frames == 2 {
                        socket
                            .send(Message::Text(
                                r#"{"type":"Turn","turn_order":0,"end_of_turn":true,"turn_is_formatted":true,"transcript":"Hi."}"#
                                    .to_string(),
                            ))
                            .unwrap();
                    }
                }
                Ok(Message::Text(text)) if text.contains("Terminate") => {
                    socket
                        .send(Message::Text(
                            r#"{"type":"Termination","audio_duration_seconds":0.3}"#.to_string(),
                        ))
                        .unwrap();
                    let _ = socket.close(None);
                    let _ = socket.flush();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
        (frames, auth)
    });
    (format!("ws://{addr}"), handle)
}

#[test]
fn streams_audio_and_collects_messages_until_termination() {
    let (url, server) = spawn_server();
    let config = Config::builder()
        .with_base_url(&url)
        .with_api_key(SecretString::from("test-token".to_string()))
        .with_poll_interval(Duration::from_millis(20))
        .build();

    let mut client = connect(&config).unwrap();
    let audio = vec![vec![0u8; 320]; 3];
    let mut received = Vec::new();
    client
        .stream(audio, |message| {
            received.push(message);
            true
        })
        .unwrap();

    let (frames, auth) = server.join().unwrap();
    assert_eq!(frames, 3);
    assert_eq!(auth.as_deref(), Some("test-token"));

    assert!(matches!(received.first(), Some(ServerMessage::Begin(_))));
    assert!(received.iter().any(|m| matches!(
        m,
        ServerMessage::Turn(turn) if turn.transcript == "Hi." && turn.end_of_turn
    )));
    assert!(matches!(received.last(), Some(ServerMessage::Termination(_))));
}
