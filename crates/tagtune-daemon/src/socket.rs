use crate::core::DaemonEvent;
use crate::BroadcastMessage;
use std::sync::Arc;
use tagtune_proto::protocol::{Broadcast, Command, Message, PROTOCOL_VERSION};
use tagtune_proto::state::StateManager;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

pub async fn bind(bind_address: &str, port: u16) -> anyhow::Result<TcpListener> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr).await?;
    info!("TCP server listening at {}", listener.local_addr()?);
    Ok(listener)
}

pub fn start_server(
    listener: TcpListener,
    state_manager: Arc<StateManager>,
    event_tx: mpsc::Sender<DaemonEvent>,
    broadcast_tx: broadcast::Sender<BroadcastMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut client_id = 0usize;

        loop {
            match listener.accept().await {
                Ok((stream, peer)) => {
                    client_id += 1;
                    let id = client_id;
                    info!("Client {} connected from {}", id, peer);

                    let sm = state_manager.clone();
                    let evt_tx = event_tx.clone();
                    let bcast_rx = broadcast_tx.subscribe();

                    tokio::spawn(async move {
                        handle_client(stream, sm, id, evt_tx, bcast_rx).await;
                        info!("Client {} disconnected", id);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    })
}

/// Largest command frame a client may send.
const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Outcome of feeding bytes from a client into the frame buffer.
enum Inbound {
    Commands(Vec<Command>),
    Closed,
}

/// Split complete frames off the front of `buf`.  Frames that do not parse
/// as a command are dropped; an oversized length header is an error.
fn take_commands(buf: &mut Vec<u8>) -> anyhow::Result<Vec<Command>> {
    let mut commands = Vec::new();
    while buf.len() >= 4 {
        let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if len > MAX_FRAME_LEN {
            anyhow::bail!("frame of {} bytes exceeds {} byte limit", len, MAX_FRAME_LEN);
        }
        if buf.len() < 4 + len {
            break;
        }
        match Message::decode(buf) {
            Ok((Message::Command(cmd), _)) => commands.push(cmd),
            Ok((msg, _)) => debug!("ignoring non-command frame: {:?}", msg),
            Err(e) => warn!("dropping malformed frame: {}", e),
        }
        buf.drain(..4 + len);
    }
    Ok(commands)
}

async fn read_commands(
    read_half: &mut OwnedReadHalf,
    buf: &mut Vec<u8>,
    client_id: usize,
) -> Inbound {
    let mut tmp = [0u8; 4096];
    match read_half.read(&mut tmp).await {
        Ok(0) => {
            info!("Client {} closed connection", client_id);
            Inbound::Closed
        }
        Ok(n) => {
            buf.extend_from_slice(&tmp[..n]);
            match take_commands(buf) {
                Ok(commands) => Inbound::Commands(commands),
                Err(e) => {
                    warn!("Client {}: {}, closing", client_id, e);
                    Inbound::Closed
                }
            }
        }
        Err(e) => {
            error!("Read error from client {}: {}", client_id, e);
            Inbound::Closed
        }
    }
}

async fn send(write_half: &mut OwnedWriteHalf, msg: Broadcast) -> anyhow::Result<()> {
    let encoded = Message::Broadcast(msg).encode()?;
    write_half.write_all(&encoded).await?;
    Ok(())
}

async fn state_frame(state_manager: &StateManager) -> Broadcast {
    Broadcast::State {
        data: state_manager.get_state().await,
    }
}

async fn handle_client(
    stream: TcpStream,
    state_manager: Arc<StateManager>,
    client_id: usize,
    event_tx: mpsc::Sender<DaemonEvent>,
    mut broadcast_rx: broadcast::Receiver<BroadcastMessage>,
) {
    let (mut read_half, mut write_half) = stream.into_split();
    let mut read_buf: Vec<u8> = Vec::new();

    let hello = Broadcast::Hello {
        protocol_version: PROTOCOL_VERSION,
        state: state_manager.get_state().await,
    };
    if send(&mut write_half, hello).await.is_err() {
        return;
    }

    loop {
        let outgoing = tokio::select! {
            inbound = read_commands(&mut read_half, &mut read_buf, client_id) => {
                let Inbound::Commands(commands) = inbound else {
                    break;
                };
                if commands.is_empty() {
                    continue;
                }
                for cmd in commands {
                    info!("Client {} sent command: {:?}", client_id, cmd);
                    if event_tx.send(DaemonEvent::ClientCommand(cmd)).await.is_err() {
                        warn!("DaemonEvent channel closed");
                        return;
                    }
                }
                state_frame(&state_manager).await
            }

            msg = broadcast_rx.recv() => match msg {
                Ok(BroadcastMessage::StateUpdated) => state_frame(&state_manager).await,
                Ok(BroadcastMessage::Log(message)) => Broadcast::Log { message },
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Client {} missed {} broadcast messages", client_id, n);
                    state_frame(&state_manager).await
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        };

        if send(&mut write_half, outgoing).await.is_err() {
            break;
        }
    }
}
