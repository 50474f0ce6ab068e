//! Connection lifecycle: connect with retries, the command queue, and close.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::error::{ConnectionError, Error, Result};
use crate::protocol::{Command, Payload, TERMINAL_TOKEN};
use crate::session::{PendingCommand, Reply, Session};
use crate::utils::buffer::LineBuffer;
use crate::utils::io::write_all;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// TCP connect and session-start inactivity limit
    pub connect_timeout: Duration,
    /// Socket closes after this long without traffic once connected
    pub idle_timeout: Duration,
    pub max_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(5),
            max_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State the session task and the connection handle both see
#[derive(Debug)]
pub struct Shared {
    state: Mutex<ConnectionState>,
    last_error: Mutex<Option<Error>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(ConnectionState::Disconnected),
            last_error: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *lock(&self.state)
    }

    pub fn set_state(&self, state: ConnectionState) {
        *lock(&self.state) = state;
    }

    pub fn set_last_error(&self, error: Error) {
        *lock(&self.last_error) = Some(error);
    }

    fn last_error(&self) -> Option<Error> {
        lock(&self.last_error).clone()
    }
}

/// Puts the state back to `Disconnected` unless a session took over,
/// including when the `connect` future is dropped mid-attempt.
struct ConnectAttempt<'a> {
    shared: &'a Shared,
    armed: bool,
}

impl ConnectAttempt<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.set_state(ConnectionState::Disconnected);
        }
    }
}

struct SessionHandle {
    queue: mpsc::UnboundedSender<PendingCommand>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// One control connection to one printer.
pub struct ProtocolConnection {
    id: Uuid,
    addr: String,
    options: ConnectOptions,
    shared: Arc<Shared>,
    handle: Mutex<Option<SessionHandle>>,
}

impl ProtocolConnection {
    pub fn new(addr: impl Into<String>, options: ConnectOptions) -> Self {
        Self {
            id: Uuid::new_v4(),
            addr: addr.into(),
            options,
            shared: Arc::new(Shared::new()),
            handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Connects, retrying up to `max_attempts` times. The state stays
    /// `Connecting` across the retry window so concurrent attempts are refused.
    pub async fn connect(&self) -> Result<()> {
        {
            let mut state = lock(&self.shared.state);
            match *state {
                ConnectionState::Connecting => return Err(ConnectionError::AlreadyConnecting.into()),
                ConnectionState::Connected => return Err(ConnectionError::AlreadyConnected.into()),
                ConnectionState::Disconnected => *state = ConnectionState::Connecting,
            }
        }
        let mut attempt_guard = ConnectAttempt {
            shared: &self.shared,
            armed: true,
        };

        let attempts = self.options.max_attempts.max(1);
        let mut last_error = Error::Connection(ConnectionError::NotConnected);

        for attempt in 1..=attempts {
            match self.open().await {
                Ok((reader, writer, lines)) => {
                    attempt_guard.disarm();
                    self.start_session(reader, writer, lines);
                    info!("Connected to {} (session {})", self.addr, self.id);
                    return Ok(());
                }
                Err(e) if !e.is_retryable() => {
                    last_error = e;
                    break;
                }
                Err(e) => {
                    warn!("Connect attempt {}/{} to {} failed: {}", attempt, attempts, self.addr, e);
                    last_error = e;
                    if attempt < attempts {
                        tokio::time::sleep(self.options.retry_delay).await;
                    }
                }
            }
        }

        error!("Giving up on {}: {}", self.addr, last_error);
        drop(attempt_guard);
        Err(last_error)
    }

    /// TCP connect plus session start; returns once the printer answered `ok`.
    async fn open(&self) -> Result<(OwnedReadHalf, OwnedWriteHalf, LineBuffer)> {
        let limit = self.options.connect_timeout;
        let stream = timeout(limit, TcpStream::connect(&self.addr))
            .await
            .map_err(|_| Error::Connection(ConnectionError::TimedOut))??;
        stream.set_nodelay(true)?;

        let (mut reader, mut writer) = stream.into_split();
        write_all(&mut writer, &Command::SessionStart.to_wire()).await?;

        let mut lines = LineBuffer::new(4096);
        let mut buf = [0u8; 1024];
        loop {
            let n = timeout(limit, reader.read(&mut buf))
                .await
                .map_err(|_| Error::Connection(ConnectionError::TimedOut))??;
            if n == 0 {
                return Err(Error::closed("printer closed the connection during session start"));
            }
            lines.extend(&buf[..n]);

            while let Some(line) = lines
                .pop_line()
                .or_else(|| lines.take_partial_with(TERMINAL_TOKEN))
            {
                if line.contains(TERMINAL_TOKEN) {
                    return Ok((reader, writer, lines));
                }
                debug!("Session start: {}", line);
            }
        }
    }

    fn start_session(&self, reader: OwnedReadHalf, writer: OwnedWriteHalf, lines: LineBuffer) {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let peer = reader
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.addr.clone());

        let session = Session::new(
            reader,
            writer,
            lines,
            queue_rx,
            shutdown_rx,
            self.options.idle_timeout,
            Arc::clone(&self.shared),
        );
        let span = info_span!("session", id = %self.id, peer = %peer);

        // Connected must be visible before the task can flip it back.
        let mut slot = lock(&self.handle);
        *lock(&self.shared.last_error) = None;
        self.shared.set_state(ConnectionState::Connected);
        let task = tokio::spawn(session.run().instrument(span));
        *slot = Some(SessionHandle {
            queue: queue_tx,
            shutdown: Some(shutdown_tx),
            task,
        });
    }

    /// Queues one request; the returned `Reply` resolves with its output lines.
    pub fn enqueue(&self, payload: impl Into<Payload>) -> Reply {
        let slot = lock(&self.handle);
        self.submit(slot.as_ref(), payload.into())
    }

    /// Queues several requests back to back; no other caller's request can
    /// land between them.
    pub fn enqueue_all<I>(&self, payloads: I) -> Vec<Reply>
    where
        I: IntoIterator<Item = Payload>,
    {
        let slot = lock(&self.handle);
        payloads
            .into_iter()
            .map(|payload| self.submit(slot.as_ref(), payload))
            .collect()
    }

    fn submit(&self, handle: Option<&SessionHandle>, payload: Payload) -> Reply {
        let (command, reply) = PendingCommand::new(payload);
        let rejected = match handle {
            Some(h) => match h.queue.send(command) {
                Ok(()) => return reply,
                Err(mpsc::error::SendError(command)) => command,
            },
            None => command,
        };

        let err = self
            .shared
            .last_error()
            .unwrap_or(Error::Connection(ConnectionError::NotConnected));
        debug!("Rejecting {}: {}", rejected.payload.describe(), err);
        rejected.resolve(Err(err));
        reply
    }

    /// One command, one reply.
    pub async fn send(&self, command: Command) -> Result<Vec<String>> {
        self.enqueue(command).wait().await
    }

    /// Drops the socket without talking to the printer. Queued requests fail.
    pub async fn abort(&self) {
        let handle = lock(&self.handle).take();
        if let Some(mut h) = handle {
            if let Some(shutdown) = h.shutdown.take() {
                let _ = shutdown.send(());
            }
            drop(h.queue);
            if let Err(e) = h.task.await {
                error!("Session task for {} failed: {}", self.addr, e);
            }
        }
    }

    /// Releases control, then closes the socket either way.
    pub async fn close(&self) -> Result<()> {
        let released = self.release().await;
        if let Err(e) = &released {
            warn!("Release before close failed: {}", e);
        }
        self.abort().await;
        info!("Closed connection to {}", self.addr);
        released.map(|_| ())
    }
}

