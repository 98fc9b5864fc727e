use std::io;
use std::time::Duration;

use crate::{
    config::Target,
    error::RconError,
    packet::{self, Direction, FrameReader, Packet, PacketType, MAX_BODY_SIZE},
};
use log::{debug, info, trace};
use tokio::{
    net::TcpStream,
    time::{timeout, timeout_at, Instant},
};

/// Request id used for every packet we send. Servers echo it back, and answer
/// a failed login with `-1` instead.
pub const REQUEST_ID: i32 = 0;

/// Source servers answer a login with an empty response value followed by the
/// actual auth response. This is how long we give the second packet to show
/// up before taking the first one as the answer.
pub const AUTH_SETTLE: Duration = Duration::from_millis(250);

/// When to send the login packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthTrigger {
    /// Log in as soon as the connection is open.
    #[default]
    Immediate,
    /// Wait for the server to send something first. Some hosted consoles
    /// greet the client before they accept a login.
    AwaitGreeting,
}

/// Timeouts and handshake behaviour for a [Client].
#[derive(Debug, Clone)]
pub struct DeliveryOptions {
    pub connect_timeout: Duration,
    /// Upper bound for the greeting (if any) and the login round trip.
    pub auth_timeout: Duration,
    /// How long to keep the socket open after sending the command. An early
    /// acknowledgement from the server cuts this short.
    pub grace_period: Duration,
    pub auth_trigger: AuthTrigger,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        DeliveryOptions {
            connect_timeout: Duration::from_secs(5),
            auth_timeout: Duration::from_secs(5),
            grace_period: Duration::from_secs(1),
            auth_trigger: AuthTrigger::Immediate,
        }
    }
}

/// Asynchronous rcon client for kit deliveries. Every call to `deliver()`
/// opens its own connection, logs in, runs exactly one command and hangs up,
/// so a single client can be shared between concurrent deliveries.
///
/// ## Example
/// ```no_run
/// use kitcon::client::Client;
/// use std::error::Error;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn Error>> {
///     let client = Client::default();
///     client
///         .deliver("127.0.0.1", 28016, "<put rcon password here>", "PlayerOne", "give wood 10000")
///         .await?;
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct Client {
    options: DeliveryOptions,
}

/// Build the console line sent for a delivery: an in-game announcement
/// chained with the actual command.
pub fn announce_command(destination: &str, command: &str) -> String {
    format!("say \"Delivering kit to {}\"; {}", destination, command)
}

/// Shorthand for [Client::deliver] with default options.
pub async fn deliver(
    host: &str,
    port: u16,
    password: &str,
    destination: &str,
    command: &str,
) -> Result<(), RconError> {
    Client::default()
        .deliver(host, port, password, destination, command)
        .await
}

impl Client {
    pub fn new(options: DeliveryOptions) -> Self {
        Client { options }
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    pub async fn deliver_to(
        &self,
        target: &Target,
        destination: &str,
        command: &str,
    ) -> Result<(), RconError> {
        self.deliver(&target.host, target.port, &target.password, destination, command)
            .await
    }

    /// Connect to `host:port`, log in with `password` and run `command` for
    /// `destination`. Resolves once the server acknowledged the command or the
    /// grace period ran out, whichever comes first.
    pub async fn deliver(
        &self,
        host: &str,
        port: u16,
        password: &str,
        destination: &str,
        command: &str,
    ) -> Result<(), RconError> {
        let full_command = announce_command(destination, command);
        // refuse before connecting so nothing hits the wire
        for body in [password, full_command.as_str()] {
            if body.len() > MAX_BODY_SIZE {
                return Err(RconError::OversizedPacket(body.len()));
            }
        }

        let stream = timeout(
            self.options.connect_timeout,
            TcpStream::connect((host, port)),
        )
        .await?
        .map_err(RconError::UnreachableHost)?;

        trace!("opened tcp stream to {}:{}, attempting auth", host, port);

        Session::new(stream, &self.options, full_command)
            .run(password)
            .await?;

        info!("delivered kit to {} via {}:{}", destination, host, port);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Authenticating,
    Executing,
    Draining,
    Closed,
}

/// One connection, one login, one command. Dropping the session closes the
/// socket, which covers every error path.
struct Session<'a> {
    stream: TcpStream,
    inbound: FrameReader,
    options: &'a DeliveryOptions,
    state: State,
    authenticated: bool,
    pending_command: Option<String>,
}

impl<'a> Session<'a> {
    fn new(stream: TcpStream, options: &'a DeliveryOptions, command: String) -> Self {
        Session {
            stream,
            inbound: FrameReader::new(Direction::Clientbound),
            options,
            state: State::Authenticating,
            authenticated: false,
            pending_command: Some(command),
        }
    }

    async fn run(mut self, password: &str) -> Result<(), RconError> {
        while self.state != State::Closed {
            let next = match self.state {
                State::Authenticating => {
                    self.authenticate(password).await?;
                    State::Executing
                }
                State::Executing => {
                    self.execute().await?;
                    State::Draining
                }
                State::Draining => {
                    self.drain().await?;
                    State::Closed
                }
                State::Closed => State::Closed,
            };
            trace!("session {:?} -> {:?}", self.state, next);
            self.state = next;
        }
        Ok(())
    }

    // cancel safe, so timing out a read leaves the stream usable
    async fn read(&mut self) -> Result<Option<Packet>, RconError> {
        self.inbound.next(&mut self.stream).await
    }

    async fn authenticate(&mut self, password: &str) -> Result<(), RconError> {
        let deadline = Instant::now() + self.options.auth_timeout;

        if self.options.auth_trigger == AuthTrigger::AwaitGreeting {
            trace!("waiting for the server to speak first");
            let greeting = timeout_at(deadline, self.read())
                .await??
                .ok_or_else(|| closed("before greeting"))?;
            trace!("received greeting (id {})", greeting.id());
        }

        let auth_packet = Packet::new(REQUEST_ID, PacketType::Auth, password);
        trace!("sending auth packet to server");
        packet::write_packet(&mut self.stream, &auth_packet).await?;

        let ack = timeout_at(deadline, self.read())
            .await??
            .ok_or_else(|| closed("during authentication"))?;
        check_auth_id(&ack)?;

        match ack.packet_type() {
            PacketType::AuthResponse => {}
            PacketType::Response => {
                trace!("got response value, waiting for the auth response");
                let settle = deadline.min(Instant::now() + AUTH_SETTLE);
                match timeout_at(settle, self.read()).await {
                    Ok(Ok(Some(response))) => check_auth_id(&response)?,
                    Ok(Ok(None)) => return Err(closed("during authentication")),
                    Ok(Err(err)) => return Err(err),
                    Err(_) => trace!("no auth response followed, taking the response value"),
                }
            }
            other => return Err(RconError::UnknownPacketType(other.code())),
        }

        debug!("auth complete");
        self.authenticated = true;
        Ok(())
    }

    async fn execute(&mut self) -> Result<(), RconError> {
        if !self.authenticated {
            return Err(RconError::AuthenticationError);
        }
        let Some(command) = self.pending_command.take() else {
            return Ok(());
        };

        trace!("sending command packet to server");
        let command_packet = Packet::new(REQUEST_ID, PacketType::Exec, &command);
        packet::write_packet(&mut self.stream, &command_packet).await
    }

    async fn drain(&mut self) -> Result<(), RconError> {
        let deadline = Instant::now() + self.options.grace_period;
        loop {
            match timeout_at(deadline, self.read()).await {
                Ok(Ok(Some(response))) => {
                    if response.id() == -1 {
                        return Err(RconError::AuthenticationError);
                    }
                    // the verdict can trail a response value taken as the login answer
                    if response.packet_type() == PacketType::AuthResponse {
                        check_auth_id(&response)?;
                        trace!("late auth response accepted, still waiting for the command");
                        continue;
                    }
                    trace!("server acknowledged command (id {})", response.id());
                    return Ok(());
                }
                Ok(Ok(None)) => {
                    trace!("server closed the connection after the command");
                    return Ok(());
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => {
                    trace!("grace period elapsed without acknowledgement");
                    return Ok(());
                }
            }
        }
    }
}

fn check_auth_id(packet: &Packet) -> Result<(), RconError> {
    match packet.id() {
        -1 => Err(RconError::AuthenticationError),
        REQUEST_ID => Ok(()),
        actual => Err(RconError::UnexpectedResponseId {
            expected: REQUEST_ID,
            actual,
        }),
    }
}

fn closed(when: &str) -> RconError {
    RconError::ReceiveError(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("connection closed {}", when),
    ))
}
