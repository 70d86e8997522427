use crate::config::Config;
use crate::types::{ClientMessage, ServerMessage};
use anyhow::{Context, Result, anyhow};
use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tokio_tungstenite::tungstenite::stream::MaybeTlsStream;
use tokio_tungstenite::tungstenite::{self, Message, WebSocket};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

/// Blocking client for the v3 streaming endpoint.
///
/// Designed to run on its own thread: it pulls audio from an iterator,
/// pushes every frame upstream and hands server messages to a callback in
/// the order they arrive.
pub struct Client {
    socket: Socket,
    poll_interval: Duration,
    termination_timeout: Duration,
}

/// Opens the streaming connection.
pub fn connect(config: &Config) -> Result<Client> {
    let request = config.request()?;
    let (socket, _) =
        tungstenite::connect(request).context("Failed to connect to the streaming service")?;
    tracing::info!("Connected to the streaming recognition service.");
    Ok(Client {
        socket,
        poll_interval: config.poll_interval(),
        termination_timeout: config.termination_timeout(),
    })
}

fn set_read_timeout(socket: &Socket, timeout: Duration) -> std::io::Result<()> {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => stream.set_read_timeout(Some(timeout)),
        #[cfg(feature = "native-tls")]
        MaybeTlsStream::NativeTls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        #[cfg(feature = "rustls")]
        MaybeTlsStream::Rustls(stream) => stream.get_ref().set_read_timeout(Some(timeout)),
        _ => Ok(()),
    }
}

fn is_timeout(error: &tungstenite::Error) -> bool {
    matches!(
        error,
        tungstenite::Error::Io(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
    )
}

enum Poll {
    Idle,
    Stop,
    Closed,
}

impl Client {
    /// Streams `audio` until it ends or `on_message` returns `false`, then
    /// asks the server to terminate and waits for its final messages.
    pub fn stream<I, F>(&mut self, audio: I, mut on_message: F) -> Result<()>
    where
        I: IntoIterator<Item = Vec<u8>>,
        F: FnMut(ServerMessage) -> bool,
    {
        set_read_timeout(&self.socket, self.poll_interval)
            .context("Failed to configure socket timeout")?;

        let mut frames = 0usize;
        for frame in audio {
            self.socket
                .send(Message::Binary(frame))
                .context("Failed to send audio frame")?;
            frames += 1;
            match self.drain(&mut on_message)? {
                Poll::Idle => {}
                Poll::Stop => break,
                Poll::Closed => {
                    tracing::info!("Streaming connection closed by server.");
                    return Ok(());
                }
            }
        }
        tracing::debug!("audio source finished after {} frames", frames);

        self.terminate(&mut on_message)
    }

    /// Delivers every message already waiting on the socket.
    fn drain<F>(&mut self, on_message: &mut F) -> Result<Poll>
    where
        F: FnMut(ServerMessage) -> bool,
    {
        loop {
            match self.socket.read() {
                Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                    Ok(message) => {
                        if !on_message(message) {
                            return Ok(Poll::Stop);
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring server message: {:#}", e),
                },
                Ok(Message::Close(_)) => return Ok(Poll::Closed),
                Ok(_) => {}
                Err(e) if is_timeout(&e) => return Ok(Poll::Idle),
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return Ok(Poll::Closed);
                }
                Err(e) => return Err(anyhow!(e).context("Failed to read from streaming service")),
            }
        }
    }

    fn terminate<F>(&mut self, on_message: &mut F) -> Result<()>
    where
        F: FnMut(ServerMessage) -> bool,
    {
        let terminate = serde_json::to_string(&ClientMessage::Terminate)?;
        if let Err(e) = self.socket.send(Message::Text(terminate)) {
            tracing::debug!("Could not send terminate message: {}", e);
            return Ok(());
        }

        let deadline = Instant::now() + self.termination_timeout;
        while Instant::now() < deadline {
            match self.socket.read() {
                Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                    Ok(ServerMessage::Termination(t)) => {
                        tracing::info!(
                            "Streaming session terminated after {:.1}s of audio.",
                            t.audio_duration_seconds
                        );
                        on_message(ServerMessage::Termination(t));
                        break;
                    }
                    Ok(message) => {
                        on_message(message);
                    }
                    Err(e) => tracing::warn!("Ignoring server message: {:#}", e),
                },
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) if is_timeout(&e) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    break;
                }
                Err(e) => return Err(anyhow!(e).context("Failed while awaiting termination")),
            }
        }

        let _ = self.socket.close(None);
        Ok(())
    }
}
