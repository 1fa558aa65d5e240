//! Bookkeeping of live client sessions.
//!
//! The registry owns the task of every session. Sessions end on their own
//! (EOF, `Close`, protocol error); [`SessionRegistry::reap`] collects the
//! finished ones. [`SessionRegistry::shutdown`] asks every session to stop
//! and waits for all of them.

use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use open8055_core::Result;

use crate::interpreter::Interpreter;
use crate::session::{Session, SessionId, SessionInfo, SessionMode, SessionStatus};

/// How a session task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskTermination {
    /// Client left or the session was stopped.
    Success,
    /// Writing to the client failed.
    Error,
    /// Task was aborted.
    Cancelled,
    /// Task panicked.
    Panic,
}

fn classify_task_result(result: std::result::Result<Result<()>, JoinError>) -> TaskTermination {
    match result {
        Ok(Ok(())) => TaskTermination::Success,
        Ok(Err(_)) => TaskTermination::Error,
        Err(e) if e.is_cancelled() => TaskTermination::Cancelled,
        Err(_) => TaskTermination::Panic,
    }
}

#[derive(Debug)]
struct SessionEntry {
    peer: SocketAddr,
    connected_at: DateTime<Utc>,
    status: watch::Receiver<SessionStatus>,
    stop: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl SessionEntry {
    fn mode(&self) -> SessionMode {
        let reported = self.status.borrow().mode;
        match reported {
            SessionMode::Run if self.stop.is_cancelled() => SessionMode::Stop,
            _ if self.task.is_finished() => SessionMode::Stopped,
            mode => mode,
        }
    }
}

/// Live sessions keyed by id.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, SessionEntry>,
    shutdown: CancellationToken,
}

impl SessionRegistry {
    /// Sessions spawned by this registry stop when `shutdown` fires.
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            sessions: HashMap::new(),
            shutdown,
        }
    }

    /// Start a session for an accepted connection.
    pub fn spawn(&mut self, stream: TcpStream, peer: SocketAddr, interpreter: Interpreter) -> SessionId {
        let stop = self.shutdown.child_token();
        let (session, status) = Session::new(stream, peer, interpreter, stop.clone());
        let id = session.id();
        let task = tokio::spawn(session.run());

        self.sessions.insert(
            id,
            SessionEntry {
                peer,
                connected_at: Utc::now(),
                status,
                stop,
                task,
            },
        );
        debug!(session_id = %id, %peer, total = self.sessions.len(), "session registered");
        id
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Ask one session to stop. Returns `false` for an unknown id.
    pub fn stop(&self, id: SessionId) -> bool {
        match self.sessions.get(&id) {
            Some(entry) => {
                entry.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove stopped sessions and join their tasks. Returns how many were
    /// removed.
    pub async fn reap(&mut self) -> usize {
        let finished: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|(_, entry)| entry.task.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in &finished {
            if let Some(entry) = self.sessions.remove(id) {
                log_termination(*id, entry.peer, entry.task.await);
            }
        }

        if !finished.is_empty() {
            debug!(reaped = finished.len(), remaining = self.sessions.len(), "sessions reaped");
        }
        finished.len()
    }

    /// Snapshots of every registered session.
    pub fn sessions(&self) -> Vec<SessionInfo> {
        self.sessions
            .iter()
            .map(|(id, entry)| SessionInfo {
                id: *id,
                peer: entry.peer,
                username: entry.status.borrow().username.clone(),
                connected_at: entry.connected_at,
                mode: entry.mode(),
            })
            .collect()
    }

    /// Stop every session and wait until all of them have ended.
    pub async fn shutdown(&mut self) {
        info!(sessions = self.sessions.len(), "stopping all sessions");
        for entry in self.sessions.values() {
            entry.stop.cancel();
        }

        let mut failures = 0usize;
        for (id, entry) in self.sessions.drain() {
            if log_termination(id, entry.peer, entry.task.await) == TaskTermination::Panic {
                failures += 1;
            }
        }

        if failures > 0 {
            warn!(failures, "sessions panicked during shutdown");
        }
    }
}

fn log_termination(
    id: SessionId,
    peer: SocketAddr,
    result: std::result::Result<Result<()>, JoinError>,
) -> TaskTermination {
    let error = match &result {
        Ok(Err(e)) => Some(e.to_string()),
        Err(e) => Some(e.to_string()),
        Ok(Ok(())) => None,
    };

    let termination = classify_task_result(result);
    match termination {
        TaskTermination::Success | TaskTermination::Cancelled => {
            debug!(session_id = %id, %peer, ?termination, "session ended");
        }
        TaskTermination::Error => {
            warn!(session_id = %id, %peer, error = error.as_deref(), "session ended with error");
        }
        TaskTermination::Panic => {
            error!(session_id = %id, %peer, error = error.as_deref(), "session panicked");
        }
    }
    termination
}

#[cfg(test)]
mod tests {
    use super::*;
    use open8055_core::Error;

    #[tokio::test]
    async fn test_classify_task_result() {
        assert_eq!(classify_task_result(Ok(Ok(()))), TaskTermination::Success);
        assert_eq!(
            classify_task_result(Ok(Err(Error::Cancelled))),
            TaskTermination::Error
        );

        let aborted = tokio::spawn(std::future::pending::<Result<()>>());
        aborted.abort();
        assert_eq!(classify_task_result(aborted.await), TaskTermination::Cancelled);

        let panicked = tokio::spawn(async {
            if true {
                panic!("boom");
            }
            Ok::<(), Error>(())
        });
        let result: std::result::Result<Result<()>, JoinError> = panicked.await;
        assert_eq!(classify_task_result(result), TaskTermination::Panic);
    }

    #[tokio::test]
    async fn test_empty_registry() {
        let mut registry = SessionRegistry::new(CancellationToken::new());
        assert!(registry.is_empty());
        assert_eq!(registry.reap().await, 0);
        assert!(!registry.stop(SessionId::new()));
        registry.shutdown().await;
    }
}
