//! WebSocket transport.
//!
//! The host binds a TCP listener and accepts upgrades on
//! `/ws/<hostPeerId>?peer=<guestPeerId>`; a guest dials the URL derived from
//! an invite. Either way each open socket becomes a [`PeerLink`] (the
//! outbound half) plus a pump task that reports frames as
//! [`TransportEvent`]s.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use crate::error::{ChatError, Result};
use crate::invite::Invite;
use crate::message::PeerId;
use crate::protocol::Payload;

#[derive(Debug)]
pub enum TransportEvent {
    Opened { link: PeerLink },
    Data { peer_id: PeerId, payload: Payload },
    Closed { peer_id: PeerId },
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Outbound half of one open connection. Dropping every clone closes the
/// socket.
#[derive(Debug, Clone)]
pub struct PeerLink {
    peer_id: PeerId,
    tx: mpsc::UnboundedSender<Payload>,
}

impl PeerLink {
    pub fn new(peer_id: impl Into<PeerId>, tx: mpsc::UnboundedSender<Payload>) -> Self {
        PeerLink {
            peer_id: peer_id.into(),
            tx,
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    /// The pump behind this link has exited.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Queue a payload. `false` once the connection is gone.
    pub fn send(&self, payload: Payload) -> bool {
        self.tx.send(payload).is_ok()
    }
}

/// A running host listener. Dropping it stops accepting new guests;
/// established connections live on until their links are dropped.
#[derive(Debug)]
pub struct Listener {
    addr: SocketAddr,
    task: JoinHandle<()>,
}

impl Listener {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Bind `bind` and accept guests for `host_id`.
pub async fn listen(bind: &str, host_id: PeerId, events: EventSender) -> Result<Listener> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|e| ChatError::Transport(format!("cannot bind {}: {}", bind, e)))?;
    let addr = listener.local_addr()?;
    info!(%addr, host_id = %host_id, "room listening");

    let task = tokio::spawn(async move {
        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };
            let host_id = host_id.clone();
            let events = events.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &host_id, events).await {
                    debug!(%remote, error = %e, "connection ended with error");
                }
            });
        }
    });

    Ok(Listener { addr, task })
}

async fn handle_connection(mut stream: TcpStream, host_id: &str, events: EventSender) -> Result<()> {
    // Peek at the request line to route before handing the socket to tungstenite.
    let mut peek_buf = [0u8; 1024];
    let peek_n = stream.peek(&mut peek_buf).await.unwrap_or(0);
    let peek_str = String::from_utf8_lossy(&peek_buf[..peek_n]);
    let path = peek_str
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or("/")
        .to_string();

    let is_upgrade = peek_str.to_ascii_lowercase().contains("upgrade: websocket");
    let Some((room_id, guest_id)) = parse_ws_path(&path).filter(|_| is_upgrade) else {
        let body = "WhisperLink relay: connect with a WebSocket client.\n";
        let response = format!(
            "HTTP/1.1 426 Upgrade Required\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        );
        stream.write_all(response.as_bytes()).await?;
        return Ok(());
    };

    let mut ws = tokio_tungstenite::accept_async(stream).await?;

    if room_id != host_id {
        warn!(requested = %room_id, "rejecting guest for unknown room");
        let reject = Payload::Error {
            message: ChatError::PeerUnavailable(room_id).to_string(),
        };
        ws.send(WsMessage::Text(reject.encode()?)).await?;
        ws.close(None).await?;
        return Ok(());
    }

    let peer_id = guest_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    info!(peer_id = %peer_id, "guest connected");
    run_link(ws, peer_id, events).await;
    Ok(())
}

/// Dial the host named by `invite` as `guest_id`.
pub async fn dial(invite: &Invite, guest_id: &str, events: EventSender) -> Result<JoinHandle<()>> {
    let url = invite.dial_url(guest_id);
    debug!(%url, "dialing host");
    let (ws, _) = tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
        .await
        .map_err(|_| ChatError::PeerUnavailable(format!("{} (timed out)", invite.host_id)))?
        .map_err(|e| ChatError::PeerUnavailable(format!("{} ({})", invite.host_id, e)))?;
    let host_id = invite.host_id.clone();
    Ok(tokio::spawn(run_link(ws, host_id, events)))
}

async fn run_link<S>(ws: WebSocketStream<S>, peer_id: PeerId, events: EventSender)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (tx, rx) = mpsc::unbounded_channel();
    if events
        .send(TransportEvent::Opened {
            link: PeerLink::new(peer_id.clone(), tx),
        })
        .is_err()
    {
        return;
    }
    pump(ws, &peer_id, rx, &events).await;
    let _ = events.send(TransportEvent::Closed { peer_id });
}

/// Couple a socket to its outbound queue until either side goes away.
async fn pump<S>(
    ws: WebSocketStream<S>,
    peer_id: &str,
    mut outbound: mpsc::UnboundedReceiver<Payload>,
    events: &EventSender,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = stream.next() => {
                match frame {
                    Some(Ok(WsMessage::Text(text))) => match Payload::decode(&text) {
                        Ok(payload) => {
                            let event = TransportEvent::Data {
                                peer_id: peer_id.to_string(),
                                payload,
                            };
                            if events.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => debug!(peer_id, error = %e, "ignoring malformed frame"),
                    },
                    Some(Ok(WsMessage::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(peer_id, error = %e, "socket error");
                        break;
                    }
                }
            }
            out = outbound.recv() => {
                match out {
                    Some(payload) => {
                        let text = match payload.encode() {
                            Ok(t) => t,
                            Err(e) => {
                                warn!(peer_id, error = %e, "cannot encode payload");
                                continue;
                            }
                        };
                        if sink.send(WsMessage::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        let _ = sink.send(WsMessage::Close(None)).await;
                        break;
                    }
                }
            }
        }
    }
}

/// Split `/ws/<room>?peer=<guest>` into its room id and optional guest id.
pub fn parse_ws_path(path: &str) -> Option<(String, Option<String>)> {
    let rest = path.strip_prefix("/ws/")?;
    let (room, query) = match rest.split_once('?') {
        Some((r, q)) => (r, q),
        None => (rest, ""),
    };
    let room = room.trim_end_matches('/');
    if room.is_empty() {
        return None;
    }
    let guest = url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == "peer")
        .map(|(_, v)| v.into_owned())
        .filter(|p| !p.is_empty());
    Some((room.to_string(), guest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ws_path_with_peer() {
        assert_eq!(
            parse_ws_path("/ws/abc-123?peer=g1"),
            Some(("abc-123".to_string(), Some("g1".to_string())))
        );
    }

    #[test]
    fn test_parse_ws_path_without_query() {
        assert_eq!(parse_ws_path("/ws/abc"), Some(("abc".to_string(), None)));
    }

    #[test]
    fn test_parse_ws_path_rejects_other_paths() {
        assert!(parse_ws_path("/").is_none());
        assert!(parse_ws_path("/ws/").is_none());
        assert!(parse_ws_path("/rooms/abc").is_none());
    }

    #[test]
    fn test_link_send_after_receiver_dropped() {
        let (tx, rx) = mpsc::unbounded_channel();
        let link = PeerLink::new("p", tx);
        assert!(link.send(Payload::Typing { username: None }));
        drop(rx);
        assert!(!link.send(Payload::Typing { username: None }));
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportEvent>) -> TransportEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_guest_reaches_host_and_exchanges_payloads() {
        let (host_tx, mut host_rx) = mpsc::unbounded_channel();
        let listener = listen("127.0.0.1:0", "room1".into(), host_tx).await.unwrap();
        let invite = Invite {
            ws_url: format!("ws://{}/ws/room1", listener.local_addr()),
            host_id: "room1".into(),
        };

        let (guest_tx, mut guest_rx) = mpsc::unbounded_channel();
        dial(&invite, "guest1", guest_tx).await.unwrap();

        let host_link = match next_event(&mut host_rx).await {
            TransportEvent::Opened { link } => link,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(host_link.peer_id(), "guest1");
        let guest_link = match next_event(&mut guest_rx).await {
            TransportEvent::Opened { link } => link,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(guest_link.peer_id(), "room1");

        assert!(guest_link.send(Payload::message("hello", "Sara")));
        match next_event(&mut host_rx).await {
            TransportEvent::Data { peer_id, payload } => {
                assert_eq!(peer_id, "guest1");
                assert_eq!(payload, Payload::message("hello", "Sara"));
            }
            other => panic!("unexpected {:?}", other),
        }

        drop(guest_link);
        match next_event(&mut host_rx).await {
            TransportEvent::Closed { peer_id } => assert_eq!(peer_id, "guest1"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unknown_room_gets_error_then_close() {
        let (host_tx, _host_rx) = mpsc::unbounded_channel();
        let listener = listen("127.0.0.1:0", "real".into(), host_tx).await.unwrap();
        let invite = Invite {
            ws_url: format!("ws://{}/ws/fake", listener.local_addr()),
            host_id: "fake".into(),
        };
        let (guest_tx, mut guest_rx) = mpsc::unbounded_channel();
        dial(&invite, "g", guest_tx).await.unwrap();

        assert!(matches!(next_event(&mut guest_rx).await, TransportEvent::Opened { .. }));
        match next_event(&mut guest_rx).await {
            TransportEvent::Data {
                payload: Payload::Error { message },
                ..
            } => assert!(message.contains("room not found")),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(next_event(&mut guest_rx).await, TransportEvent::Closed { .. }));
    }

    #[tokio::test]
    async fn test_dial_refused_is_peer_unavailable() {
        // bind then drop to get a port nobody listens on
        let port = {
            let l = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            l.local_addr().unwrap().port()
        };
        let invite = Invite {
            ws_url: format!("ws://127.0.0.1:{}/ws/x", port),
            host_id: "x".into(),
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = dial(&invite, "g", tx).await.unwrap_err();
        assert!(matches!(err, ChatError::PeerUnavailable(_)));
        assert!(err.is_transport());
    }
}
