//! Client session actor.
//!
//! Each accepted connection runs two loops:
//!
//! ```text
//!  socket ──► reader loop ──lines──► executor loop ──replies──► socket
//!                 │                        │
//!                 └── EOF / error ──► cancels blocking waits
//! ```
//!
//! The reader never blocks on the executor: it keeps consuming the socket
//! while the executor is blocked in a `WaitFor`, so a client that hangs up
//! mid-wait cancels the wait at once instead of leaving it registered until
//! the timeout. A client that queues more than `MAX_PENDING_COMMANDS` lines
//! gets an error and the rest of its input is discarded until it hangs up.
//!
//! Every reply write races the stop token, so a client that never reads
//! cannot hold up server shutdown.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, watch};
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use open8055_core::{Error, Result, constants::MAX_PENDING_COMMANDS};
use open8055_protocol::{LineCodec, Reply};

use crate::interpreter::{Action, Interpreter};

type ReplySink = FramedWrite<OwnedWriteHalf, LineCodec>;

/// Unique id of a client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Short form is enough to tell sessions apart in logs
        let full = self.0.simple().to_string();
        f.write_str(&full[..8])
    }
}

/// Run state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionMode {
    Run,
    /// Asked to stop; blocking operations are being cancelled.
    Stop,
    /// Both loops have ended; the session can be reaped.
    Stopped,
}

/// State a session publishes for the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub mode: SessionMode,
    pub username: Option<String>,
}

/// Snapshot of one session for monitoring.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub id: SessionId,
    pub peer: SocketAddr,
    pub username: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub mode: SessionMode,
}

/// One client connection.
pub struct Session {
    id: SessionId,
    peer: SocketAddr,
    stream: TcpStream,
    interpreter: Interpreter,
    stop: CancellationToken,
    status: watch::Sender<SessionStatus>,
}

impl Session {
    /// Wrap an accepted stream.
    ///
    /// `stop` ends the session; the returned receiver follows its mode and
    /// login name.
    pub fn new(
        stream: TcpStream,
        peer: SocketAddr,
        interpreter: Interpreter,
        stop: CancellationToken,
    ) -> (Self, watch::Receiver<SessionStatus>) {
        let (status, status_rx) = watch::channel(SessionStatus {
            mode: SessionMode::Run,
            username: None,
        });

        let session = Self {
            id: SessionId::new(),
            peer,
            stream,
            interpreter,
            stop,
            status,
        };
        (session, status_rx)
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Serve the client until it closes, misbehaves or the session is
    /// stopped.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if writing a reply fails.
    pub async fn run(self) -> Result<()> {
        let Self {
            id,
            peer,
            stream,
            interpreter,
            stop,
            status,
        } = self;

        info!(session_id = %id, %peer, "session started");

        let (read_half, write_half) = stream.into_split();
        let mut replies = FramedWrite::new(write_half, LineCodec::new());
        // One slot beyond the limit carries the overflow error
        let (line_tx, mut line_rx) = mpsc::channel(MAX_PENDING_COMMANDS + 1);

        // Fires on stop or when the client goes away
        let hangup = stop.child_token();
        let reader = tokio::spawn(read_lines(
            FramedRead::new(read_half, LineCodec::new()),
            line_tx,
            hangup.clone(),
        ));

        let mut ctx = interpreter.new_session();
        let result = async {
            loop {
                let next = tokio::select! {
                    biased;
                    _ = stop.cancelled() => break,
                    next = line_rx.recv() => next,
                };

                let line = match next {
                    Some(Ok(line)) => line,
                    Some(Err(e)) => {
                        warn!(session_id = %id, error = %e, "protocol error");
                        if !matches!(e, Error::Io(_))
                            && !write_reply(&mut replies, Reply::from(&e), &stop).await?
                        {
                            break;
                        }
                        if e.is_fatal_to_session() {
                            break;
                        }
                        continue;
                    }
                    None => break,
                };

                debug!(session_id = %id, command = %line, "executing");
                match interpreter.execute_line(&mut ctx, &line, &hangup).await {
                    Action::Reply(reply) => {
                        if !write_reply(&mut replies, reply, &stop).await? {
                            break;
                        }
                    }
                    Action::Close(reply) => {
                        write_reply(&mut replies, reply, &stop).await?;
                        break;
                    }
                    Action::Cancelled => break,
                }

                status.send_if_modified(|s| {
                    let login = ctx.username();
                    if s.username.as_deref() == login {
                        return false;
                    }
                    s.username = login.map(String::from);
                    true
                });
            }
            Ok::<_, Error>(())
        }
        .await;

        status.send_modify(|s| s.mode = SessionMode::Stop);
        hangup.cancel();
        if let Err(e) = reader.await {
            warn!(session_id = %id, error = %e, "session reader failed");
        }

        status.send_modify(|s| s.mode = SessionMode::Stopped);
        info!(session_id = %id, %peer, "session stopped");
        result
    }
}

/// Write one reply. Returns `false` if the session was stopped before the
/// client accepted it.
async fn write_reply(replies: &mut ReplySink, reply: Reply, stop: &CancellationToken) -> Result<bool> {
    tokio::select! {
        biased;
        _ = stop.cancelled() => Ok(false),
        sent = replies.send(reply) => sent.map(|()| true),
    }
}

/// Forward complete lines to the executor until EOF, a protocol error or
/// `hangup`. Cancels `hangup` once the client is gone.
async fn read_lines(
    mut lines: FramedRead<OwnedReadHalf, LineCodec>,
    line_tx: mpsc::Sender<Result<String>>,
    hangup: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = hangup.cancelled() => return,
            item = lines.next() => item,
        };

        match item {
            Some(Ok(line)) if line_tx.capacity() > 1 => {
                // Sole sender and a free slot, so only a closed channel fails
                if line_tx.try_send(Ok(line)).is_err() {
                    return;
                }
            }
            Some(Ok(_)) => {
                let _ = line_tx.try_send(Err(Error::TooManyPending {
                    limit: MAX_PENDING_COMMANDS,
                }));
                break;
            }
            Some(Err(e)) => {
                let _ = line_tx.try_send(Err(e));
                break;
            }
            None => {
                // Client closed its side; interrupt a wait in progress
                hangup.cancel();
                return;
            }
        }
    }

    discard_until_hangup(lines.into_inner(), &hangup).await;
    hangup.cancel();
}

/// Throw away further input so the client closing its side is still
/// noticed while the executor works off what was queued.
async fn discard_until_hangup(mut read_half: OwnedReadHalf, hangup: &CancellationToken) {
    let mut scratch = [0u8; 512];
    loop {
        tokio::select! {
            _ = hangup.cancelled() => return,
            read = read_half.read(&mut scratch) => match read {
                Ok(0) | Err(_) => return,
                Ok(n) => trace!(bytes = n, "discarding input of a closing session"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display() {
        let id = SessionId::new();
        assert_eq!(id.to_string().len(), 8);
        assert_ne!(SessionId::new(), id);
    }
}
