//! A tiny rcon console that speaks just enough of the protocol to test
//! deliveries against, without a game server.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use log::{debug, error, info};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::JoinHandle,
    time::sleep,
};

use crate::{
    error::RconError,
    packet::{self, Direction, FrameReader, Packet, PacketType},
};

/// How the console answers.
#[derive(Debug, Clone, Default)]
pub struct Behavior {
    /// `None` accepts any password.
    pub password: Option<String>,
    /// Send an empty response value as soon as a client connects.
    pub greeting: bool,
    /// Answer the first packet with a frame that claims more bytes than it
    /// carries, then hang up.
    pub malformed_reply: bool,
    /// Never acknowledge commands.
    pub silent: bool,
    /// Answer logins with the empty response value only, never the auth
    /// response.
    pub omit_auth_response: bool,
    /// Pause between the response value and the auth response.
    pub auth_delay: Option<Duration>,
}

/// A packet the console received, with the connection it came in on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Received {
    pub peer: SocketAddr,
    pub packet: Packet,
}

pub struct Server {
    addr: SocketAddr,
    received: Arc<Mutex<Vec<Received>>>,
    handle: JoinHandle<()>,
}

impl Server {
    pub async fn start(addr: &str, behavior: Behavior) -> Result<Self, RconError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(RconError::BindError)?;
        let addr = listener.local_addr().map_err(RconError::BindError)?;
        let received = Arc::new(Mutex::new(Vec::new()));

        let journal = Arc::clone(&received);
        let handle: JoinHandle<()> = tokio::spawn(async move {
            info!("rcon console listening on {}", addr);
            loop {
                match listener.accept().await {
                    Ok((stream, peer)) => {
                        let behavior = behavior.clone();
                        let journal = Arc::clone(&journal);
                        tokio::spawn(async move {
                            if let Err(err) = Server::process(stream, peer, behavior, journal).await {
                                error!("connection from {} failed: {}", peer, err);
                            }
                        });
                    }
                    Err(e) => error!("{:?}", e),
                }
            }
        });

        Ok(Server {
            addr,
            received,
            handle,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Everything received so far, in arrival order.
    pub fn received(&self) -> Vec<Received> {
        self.received
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Resolves when the accept loop stops, which only happens on shutdown.
    pub async fn wait(&mut self) {
        if let Err(e) = (&mut self.handle).await {
            error!("rcon console stopped: {:?}", e);
        }
    }

    async fn process(
        mut stream: TcpStream,
        peer: SocketAddr,
        behavior: Behavior,
        journal: Arc<Mutex<Vec<Received>>>,
    ) -> Result<(), RconError> {
        debug!("accept from {:?}", peer);

        if behavior.greeting {
            packet::write_packet(&mut stream, &Packet::new(0, PacketType::Response, "")).await?;
        }

        let mut inbound = FrameReader::new(Direction::Serverbound);
        let mut denied = false;
        while let Some(request) = inbound.next(&mut stream).await? {
            info!("receive from {}: {:?}", peer, request.body());
            journal
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(Received {
                    peer,
                    packet: request.clone(),
                });

            if behavior.malformed_reply {
                let mut frame = Vec::new();
                frame.extend_from_slice(&100i32.to_le_bytes());
                frame.extend_from_slice(&request.id().to_le_bytes());
                frame.extend_from_slice(&PacketType::Response.to_le_bytes());
                stream.write_all(&frame).await.map_err(RconError::SendError)?;
                stream.shutdown().await.map_err(RconError::SendError)?;
                return Ok(());
            }

            match request.packet_type() {
                PacketType::Auth => {
                    let accepted = behavior
                        .password
                        .as_deref()
                        .map_or(true, |expected| expected == request.body());
                    let id = if accepted { request.id() } else { -1 };

                    // same order as a Source server: empty value, then the verdict
                    let value = Packet::new(request.id(), PacketType::Response, "");
                    packet::write_packet(&mut stream, &value).await?;
                    if behavior.omit_auth_response {
                        continue;
                    }
                    if let Some(delay) = behavior.auth_delay {
                        sleep(delay).await;
                    }
                    let verdict = Packet::new(id, PacketType::AuthResponse, "");
                    packet::write_packet(&mut stream, &verdict).await?;
                    // a denied client is read until it hangs up, its commands go unanswered
                    denied = !accepted;
                }
                PacketType::Exec if !behavior.silent && !denied => {
                    let ack = Packet::new(request.id(), PacketType::Response, "");
                    packet::write_packet(&mut stream, &ack).await?;
                }
                _ => {}
            }
        }

        debug!("{} hung up", peer);
        Ok(())
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
