//! Async driver for a `TransmitSession`
//!
//! One task owns the session and serialises operator commands with replay
//! notices, so the session itself needs no locking. Joining a finished replay
//! thread runs on the blocking pool.

use super::{SessionSnapshot, TransmitSession};
use crate::config::{GnssBand, JammerType, TxGain};
use crate::error::{Error, Result};
use crate::replay::{ReplayNotice, ReplayReport};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

/// Requests to the session task
#[derive(Debug)]
pub enum SessionCommand {
    Start,
    Stop,
    Toggle,
    SetGain(TxGain),
    SelectBand(GnssBand),
    SelectJammer(JammerType),
    SetLoop(bool),
    Status(oneshot::Sender<SessionSnapshot>),
    Shutdown,
}

/// Cloneable sender side for the session task
#[derive(Debug, Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionHandle {
    pub async fn send(&self, command: SessionCommand) -> Result<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| Error::InvalidState("Session task has exited".to_string()))
    }

    pub async fn status(&self) -> Result<SessionSnapshot> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(SessionCommand::Status(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| Error::InvalidState("Session task dropped status request".to_string()))
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(SessionCommand::Shutdown).await
    }
}

/// Spawn the session task
///
/// **Returns:** command handle and the join handle yielding the stopped session
pub fn run_session(
    session: TransmitSession,
    notices: mpsc::UnboundedReceiver<ReplayNotice>,
) -> (SessionHandle, tokio::task::JoinHandle<TransmitSession>) {
    let (tx, rx) = mpsc::channel(32);
    let task = tokio::spawn(session_loop(session, notices, rx));
    (SessionHandle { tx }, task)
}

async fn session_loop(
    mut session: TransmitSession,
    mut notices: mpsc::UnboundedReceiver<ReplayNotice>,
    mut commands: mpsc::Receiver<SessionCommand>,
) -> TransmitSession {
    info!("Session {} ready", session.id());

    loop {
        tokio::select! {
            Some(notice) = notices.recv() => handle_notice(&mut session, notice).await,
            command = commands.recv() => {
                match command {
                    Some(SessionCommand::Shutdown) | None => break,
                    Some(command) => apply(&mut session, command),
                }
            }
        }
    }

    session.stop();
    info!("Session {} finished", session.id());
    session
}

/// Join the completed replay thread on the blocking pool, then loop or stop
async fn handle_notice(session: &mut TransmitSession, notice: ReplayNotice) {
    let Some(replay) = session.take_completed(notice) else {
        return;
    };

    let generation = notice.generation;
    let report = match tokio::task::spawn_blocking(move || replay.finish()).await {
        Ok(report) => report,
        Err(e) => {
            warn!("Joining replay thread {} failed: {}", generation, e);
            ReplayReport::lost(generation)
        }
    };

    if let Err(e) = session.apply_report(notice.notice, report) {
        warn!("Handling {} failed: {}", notice.notice, e);
    }
}

fn apply(session: &mut TransmitSession, command: SessionCommand) {
    debug!("Session command: {:?}", command);
    let result = match command {
        SessionCommand::Start => session.start(),
        SessionCommand::Stop => {
            session.stop();
            Ok(())
        }
        SessionCommand::Toggle => session.toggle(),
        SessionCommand::SetGain(gain) => session.set_gain(gain),
        SessionCommand::SelectBand(band) => {
            session.select_band(band);
            Ok(())
        }
        SessionCommand::SelectJammer(jammer) => {
            session.select_jammer(jammer);
            Ok(())
        }
        SessionCommand::SetLoop(enabled) => {
            session.set_loop(enabled);
            Ok(())
        }
        SessionCommand::Status(reply) => {
            let _ = reply.send(session.snapshot());
            Ok(())
        }
        // Handled by the loop
        SessionCommand::Shutdown => Ok(()),
    };

    if let Err(e) = result {
        warn!("Session command failed: {}", e);
    }
}
