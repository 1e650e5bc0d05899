//! Command dispatch and result routing
//!
//! The dispatcher owns the command lifecycle on the coordinator side:
//! persist on submission, hand off to a live session when one exists,
//! apply results as they arrive, and fail commands whose results never
//! come back.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use drover_core::error::{DroverError, SessionError};
use drover_core::store::CommandStore;
use drover_core::time::current_time_secs;
use drover_core::{ClientId, CommandId, CommandRecord, CommandStatus};
use drover_protocol::{Envelope, ResultStatus};

use crate::registry::{SessionHandle, SessionRegistry};

/// Routes commands to sessions and results back onto command records
pub struct Dispatcher {
    commands: Arc<dyn CommandStore>,
    registry: Arc<SessionRegistry>,
}

impl Dispatcher {
    pub fn new(commands: Arc<dyn CommandStore>, registry: Arc<SessionRegistry>) -> Self {
        Self { commands, registry }
    }

    /// Submit a command for a client. The command is persisted as pending
    /// first, then handed to the live session if one exists. Offline
    /// clients simply accumulate a backlog that [`flush_pending`] drains
    /// when they come back.
    ///
    /// [`flush_pending`]: Dispatcher::flush_pending
    pub async fn submit(
        &self,
        client_id: ClientId,
        command: String,
    ) -> Result<CommandRecord, DroverError> {
        let record = CommandRecord::new(client_id.clone(), command);
        self.commands.insert_command(record.clone()).await?;
        info!(command_id = %record.id, client_id = %client_id, "command accepted");

        if let Some(session) = self.registry.get(&client_id) {
            if let Err(e) = self.hand_off(&record, &session).await {
                debug!(command_id = %record.id, error = %e, "handoff failed, command stays pending");
            }
        }

        // Re-read so the caller sees the post-handoff status
        let current = self.commands.command(&record.id).await?.unwrap_or(record);
        Ok(current)
    }

    /// Push one command onto a session and mark it executing. The push
    /// happens first; if the session turns out to be dead the command is
    /// left pending for the next session.
    async fn hand_off(
        &self,
        record: &CommandRecord,
        session: &SessionHandle,
    ) -> Result<(), DroverError> {
        session.try_dispatch(Envelope::Dispatch {
            id: record.id.as_str().to_string(),
            command: record.command.clone(),
        })?;
        if self
            .commands
            .mark_executing(&record.id, current_time_secs())
            .await?
        {
            debug!(command_id = %record.id, "command dispatched");
        }
        Ok(())
    }

    /// Apply a result reported by an agent. Results for commands that are
    /// not currently executing are logged and discarded; a command never
    /// moves backward and the first result wins.
    pub async fn on_result(
        &self,
        client_id: &ClientId,
        command_id: &str,
        status: ResultStatus,
        result: String,
        error: Option<String>,
    ) -> Result<(), DroverError> {
        let id = CommandId::new(command_id);

        // A result must come from the client the command targets
        match self.commands.command(&id).await? {
            Some(record) if &record.client_id == client_id => {}
            Some(record) => {
                warn!(
                    command_id = %id,
                    reporter = %client_id,
                    target = %record.client_id,
                    "result from wrong client discarded"
                );
                return Ok(());
            }
            None => {
                warn!(command_id = %id, client_id = %client_id, "result for unknown command discarded");
                return Ok(());
            }
        }

        let terminal = match status {
            ResultStatus::Success => CommandStatus::Completed,
            ResultStatus::Error => CommandStatus::Failed,
        };
        let applied = self
            .commands
            .complete_command(&id, terminal, result, error)
            .await?;
        if applied {
            info!(command_id = %id, status = %terminal, "command finished");
        } else {
            warn!(command_id = %id, "duplicate or stale result discarded");
        }
        Ok(())
    }

    /// Command history for a client, in submission order
    pub async fn history(&self, client_id: &ClientId) -> Result<Vec<CommandRecord>, DroverError> {
        Ok(self.commands.list_for_client(client_id).await?)
    }

    /// Drain a client's pending backlog onto a freshly registered session,
    /// oldest first. Stops at the first dead-session error; a full queue
    /// leaves the remainder pending.
    pub async fn flush_pending(&self, client_id: &ClientId) -> Result<usize, DroverError> {
        let backlog = self.commands.pending_for_client(client_id).await?;
        let mut flushed = 0;
        for record in backlog {
            let Some(session) = self.registry.get(client_id) else {
                break;
            };
            match self.hand_off(&record, &session).await {
                Ok(()) => flushed += 1,
                Err(DroverError::Session(SessionError::QueueFull)) => {
                    debug!(client_id = %client_id, "outbound queue full, backlog flush paused");
                    break;
                }
                Err(e) => {
                    debug!(client_id = %client_id, error = %e, "backlog flush stopped");
                    break;
                }
            }
        }
        if flushed > 0 {
            info!(client_id = %client_id, count = flushed, "pending backlog flushed");
        }
        Ok(flushed)
    }

    /// Fail executing commands dispatched more than `timeout` ago. Covers
    /// agents that died mid-execution and never reported back.
    pub async fn expire_stale(&self, timeout: Duration) -> Result<usize, DroverError> {
        let cutoff = current_time_secs().saturating_sub(timeout.as_secs());
        let stale = self.commands.executing_older_than(cutoff).await?;
        let mut expired = 0;
        for record in stale {
            let applied = self
                .commands
                .complete_command(
                    &record.id,
                    CommandStatus::Failed,
                    String::new(),
                    Some("command timed out awaiting result".to_string()),
                )
                .await?;
            if applied {
                warn!(command_id = %record.id, client_id = %record.client_id, "command expired");
                expired += 1;
            }
        }
        Ok(expired)
    }

    /// Periodic expiry sweep, runs until the token is cancelled
    pub async fn run_expiry_sweep(
        self: Arc<Self>,
        interval: Duration,
        timeout: Duration,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.expire_stale(timeout).await {
                        warn!(error = %e, "command expiry sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("command expiry sweep stopped");
                    return;
                }
            }
        }
    }
}
