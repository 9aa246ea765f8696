//! Coordinator process
//!
//! Process 0 drives the run: it waits for every worker's STARTED, issues
//! transfers one at a time (each completes with the destination's ACK),
//! multicasts STOP, waits for every DONE and finally assembles the global
//! snapshot from the balance histories the workers ship.
//!
//! # State machine
//!
//! ```text
//! AwaitStart -> Issuing -> AwaitDone -> Collecting -> Finished
//! ```
//!
//! Calling an operation out of order is an [`SimulationError::InvalidState`].
//! The mutex workload leaves `Issuing` through `skip_stop` instead of STOP.

use crate::core::clock::ClockDiscipline;
use crate::core::{Balance, LocalId};
use crate::models::{BalanceHistory, Event, Message, MessageType, ProtocolError, TransferOrder};
use crate::orchestrator::engine::{ProcessReport, SimulationError};
use crate::orchestrator::snapshot::GlobalSnapshot;
use crate::protocol::ProcessContext;
use crate::transport::Transport;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use uuid::Uuid;

/// Stage of the coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    AwaitStart,
    Issuing,
    AwaitDone,
    Collecting,
    Finished,
}

impl CoordinatorState {
    pub fn name(self) -> &'static str {
        match self {
            CoordinatorState::AwaitStart => "awaiting STARTED",
            CoordinatorState::Issuing => "issuing transfers",
            CoordinatorState::AwaitDone => "awaiting DONE",
            CoordinatorState::Collecting => "collecting histories",
            CoordinatorState::Finished => "finished",
        }
    }
}

pub struct Coordinator<T: Transport> {
    ctx: ProcessContext<T>,
    state: CoordinatorState,
    issued: Vec<TransferOrder>,
    histories: BTreeMap<LocalId, BalanceHistory>,
}

impl<T: Transport> Coordinator<T> {
    pub fn new(transport: T, discipline: ClockDiscipline) -> Self {
        Self {
            ctx: ProcessContext::new(transport, discipline),
            state: CoordinatorState::AwaitStart,
            issued: Vec::new(),
            histories: BTreeMap::new(),
        }
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Orders completed so far, in issue order
    pub fn issued(&self) -> &[TransferOrder] {
        &self.issued
    }

    fn require_state(
        &self,
        state: CoordinatorState,
        operation: &'static str,
    ) -> Result<(), SimulationError> {
        if self.state == state {
            Ok(())
        } else {
            Err(SimulationError::InvalidState {
                operation,
                state: self.state.name(),
            })
        }
    }

    fn workers(&self) -> BTreeSet<LocalId> {
        self.ctx.worker_peers().collect()
    }

    pub fn await_start(&mut self) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::AwaitStart, "await STARTED")?;
        self.ctx.await_all(MessageType::Started)?;
        let time = self.ctx.now();
        let id = self.ctx.id();
        self.ctx.log(Event::ReceivedAllStarted { time, id });
        self.state = CoordinatorState::Issuing;
        Ok(())
    }

    /// Send a TRANSFER to `src` and block until `dst` acknowledges it
    pub fn issue_transfer(
        &mut self,
        src: LocalId,
        dst: LocalId,
        amount: Balance,
    ) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::Issuing, "issue a transfer")?;
        let order = TransferOrder::new(src, dst, amount);
        let time = self.ctx.tick();
        self.ctx.send(src, &Message::transfer(time, order))?;
        debug!(time, %order, "transfer issued");

        self.ctx.gather(MessageType::Ack, &BTreeSet::from([dst]))?;
        let time = self.ctx.now();
        self.ctx.log(Event::TransferAcked {
            time,
            src,
            dst,
            amount,
        });
        self.issued.push(order);
        Ok(())
    }

    /// Multicast STOP; only valid while issuing
    pub fn stop(&mut self) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::Issuing, "send STOP")?;
        let time = self.ctx.tick();
        self.ctx.multicast(&Message::stop(time))?;
        self.ctx.log(Event::StopSent { time });
        self.state = CoordinatorState::AwaitDone;
        Ok(())
    }

    /// Leave `Issuing` without STOP, for workloads whose workers finish on
    /// their own
    pub fn skip_stop(&mut self) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::Issuing, "skip STOP")?;
        debug!("workers finish without STOP");
        self.state = CoordinatorState::AwaitDone;
        Ok(())
    }

    /// Wait for every worker's DONE
    pub fn await_done(&mut self) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::AwaitDone, "await DONE")?;
        self.ctx.await_all(MessageType::Done)?;
        let time = self.ctx.now();
        let id = self.ctx.id();
        self.ctx.log(Event::ReceivedAllDone { time, id });
        self.state = CoordinatorState::Collecting;
        Ok(())
    }

    /// Receive one BALANCE_HISTORY from every worker
    ///
    /// Each history must belong to its sender and be dense.
    pub fn collect_histories(&mut self) -> Result<(), SimulationError> {
        self.require_state(CoordinatorState::Collecting, "collect histories")?;
        let workers = self.workers();
        let received = self.ctx.gather(MessageType::BalanceHistory, &workers)?;

        for (src, message) in received {
            let history = message.into_history().ok_or(ProtocolError::MalformedPayload {
                message_type: MessageType::BalanceHistory,
                reason: "no history in payload".to_string(),
            })?;
            if history.owner() != src {
                return Err(ProtocolError::HistoryOwnerMismatch {
                    src,
                    owner: history.owner(),
                }
                .into());
            }
            history
                .validate()
                .map_err(|source| ProtocolError::InvalidHistory { src, source })?;
            debug!(src, ticks = history.len(), "history received");
            self.histories.insert(src, history);
        }

        self.state = CoordinatorState::Finished;
        Ok(())
    }

    /// Hand out the snapshot assembled from the collected histories
    pub fn finalize_snapshot(
        &mut self,
        run_id: Uuid,
        config_hash: &str,
    ) -> Result<GlobalSnapshot, SimulationError> {
        self.require_state(CoordinatorState::Finished, "finalize the snapshot")?;
        let snapshot = GlobalSnapshot::new(
            run_id,
            config_hash.to_string(),
            std::mem::take(&mut self.histories),
            self.issued.clone(),
        );
        info!(
            workers = snapshot.histories().len(),
            max_time = snapshot.max_time(),
            "snapshot assembled"
        );
        Ok(snapshot)
    }

    pub fn close(mut self) -> Result<ProcessReport, SimulationError> {
        let id = self.ctx.id();
        let events = self.ctx.close()?;
        Ok(ProcessReport {
            id,
            events: events.into_events(),
        })
    }
}
