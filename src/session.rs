use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::connection::{ConnectionState, Shared};
use crate::error::{ConnectionError, Error, Result};
use crate::protocol::{Payload, TERMINAL_TOKEN};
use crate::utils::buffer::LineBuffer;
use crate::utils::io::write_all;

/// A request waiting in the queue or on the wire
#[derive(Debug)]
pub struct PendingCommand {
    pub payload: Payload,
    reply: oneshot::Sender<Result<Vec<String>>>,
}

impl PendingCommand {
    pub fn new(payload: Payload) -> (Self, Reply) {
        let (tx, rx) = oneshot::channel();
        (Self { payload, reply: tx }, Reply(rx))
    }

    pub fn resolve(self, result: Result<Vec<String>>) {
        // The caller may have stopped waiting; nothing to do then.
        let _ = self.reply.send(result);
    }
}

/// Resolves once the device answered (or the session failed) for one request.
#[derive(Debug)]
pub struct Reply(oneshot::Receiver<Result<Vec<String>>>);

impl Reply {
    pub async fn wait(self) -> Result<Vec<String>> {
        match self.0.await {
            Ok(result) => result,
            Err(_) => Err(Error::closed("session ended without a reply")),
        }
    }
}

/// The single command on the wire plus the reply lines seen so far
struct InFlight {
    command: PendingCommand,
    lines: Vec<String>,
}

impl InFlight {
    fn finish(self) {
        debug!(
            "{} -> {} line(s)",
            self.command.payload.describe(),
            self.lines.len()
        );
        self.command.resolve(Ok(self.lines));
    }
}

/// Owns the socket for one connection and feeds it from the command queue,
/// one request at a time.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    lines: LineBuffer,
    queue: mpsc::UnboundedReceiver<PendingCommand>,
    shutdown: oneshot::Receiver<()>,
    idle_timeout: Duration,
    shared: Arc<Shared>,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        lines: LineBuffer,
        queue: mpsc::UnboundedReceiver<PendingCommand>,
        shutdown: oneshot::Receiver<()>,
        idle_timeout: Duration,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            reader,
            writer,
            lines,
            queue,
            shutdown,
            idle_timeout,
            shared,
        }
    }

    pub async fn run(mut self) {
        let mut in_flight: Option<InFlight> = None;
        let mut read_buf = vec![0u8; 8192];
        let idle = tokio::time::sleep(self.idle_timeout);
        tokio::pin!(idle);

        // Output that arrived together with the session-start reply
        self.dispatch_lines(&mut in_flight);

        let error = loop {
            tokio::select! {
                biased;

                _ = &mut self.shutdown => {
                    break Error::closed("closed by caller");
                }

                next = self.queue.recv(), if in_flight.is_none() => {
                    let Some(command) = next else {
                        break Error::closed("connection handle dropped");
                    };
                    trace!("Sending {}", command.payload.describe());

                    if let Err(e) = write_all(&mut self.writer, &command.payload.to_wire()).await {
                        let err = match &command.payload {
                            Payload::Block(frame) => {
                                Error::Transfer(format!("block {} not sent: {}", frame.index, e))
                            }
                            Payload::Text(_) => Error::from(e),
                        };
                        command.resolve(Err(err.clone()));
                        break err;
                    }
                    idle.as_mut().reset(Instant::now() + self.idle_timeout);
                    in_flight = Some(InFlight { command, lines: Vec::new() });
                }

                read = self.reader.read(&mut read_buf) => {
                    match read {
                        Ok(0) => break Error::closed("connection closed by printer"),
                        Ok(n) => {
                            idle.as_mut().reset(Instant::now() + self.idle_timeout);
                            self.lines.extend(&read_buf[..n]);
                            self.dispatch_lines(&mut in_flight);
                        }
                        Err(e) => break Error::from(e),
                    }
                }

                _ = &mut idle => {
                    warn!("No traffic for {:?}, closing", self.idle_timeout);
                    break Error::Connection(ConnectionError::TimedOut);
                }
            }
        };

        self.fail_pending(error, in_flight).await;
    }

    fn dispatch_lines(&mut self, in_flight: &mut Option<InFlight>) {
        while let Some(line) = self
            .lines
            .pop_line()
            .or_else(|| self.lines.take_partial_with(TERMINAL_TOKEN))
        {
            handle_line(line, in_flight);
        }
    }

    /// Fails the in-flight command and drains the queue without touching the socket.
    async fn fail_pending(mut self, error: Error, in_flight: Option<InFlight>) {
        info!("Session ended: {}", error);
        self.shared.set_last_error(error.clone());

        if let Some(current) = in_flight {
            warn!("Failing in-flight {}", current.command.payload.describe());
            current.command.resolve(Err(error.clone()));
        }

        self.queue.close();
        let mut drained = 0usize;
        while let Some(command) = self.queue.recv().await {
            command.resolve(Err(error.clone()));
            drained += 1;
        }
        if drained > 0 {
            warn!("Failed {} queued command(s) after disconnect", drained);
        }

        let _ = self.writer.shutdown().await;
        self.shared.set_state(ConnectionState::Disconnected);
    }
}

fn handle_line(line: String, in_flight: &mut Option<InFlight>) {
    match line.find(TERMINAL_TOKEN) {
        Some(pos) => match in_flight.take() {
            Some(mut current) => {
                let before = line[..pos].trim();
                if !before.is_empty() {
                    current.lines.push(before.to_string());
                }
                current.finish();
            }
            None => warn!("Reply with no matching request: {:?}", line),
        },
        None => {
            if line.trim().is_empty() {
                return;
            }
            match in_flight {
                Some(current) => current.lines.push(line),
                None => trace!("Unsolicited output: {:?}", line),
            }
        }
    }
}
