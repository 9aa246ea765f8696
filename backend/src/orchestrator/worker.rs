//! Worker processes
//!
//! Every worker runs the same outer sequence:
//!
//! 1. **Init**: announce STARTED, wait for every other worker's STARTED
//! 2. **Running**: workload-specific work
//! 3. **Stopping**: announce DONE, wait for every other worker's DONE
//! 4. bank workers ship their balance history to the coordinator
//! 5. close the endpoint
//!
//! A DONE from a faster peer can arrive while this worker is still running;
//! it is deferred for the DONE barrier.

use crate::core::clock::ClockDiscipline;
use crate::core::{Balance, LocalId, PARENT_ID};
use crate::models::{Account, Event, Message, MessageType, ProtocolError, TransferOrder};
use crate::orchestrator::engine::{ProcessReport, SimulationError};
use crate::protocol::ProcessContext;
use crate::transport::Transport;
use tracing::debug;

/// Loop iterations per unit of worker id in the mutex workload
pub const ITERATIONS_PER_ID: usize = 5;

/// Lifecycle stage of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Init,
    Running,
    Stopping,
    Shipped,
    Closed,
}

fn start<T: Transport>(
    ctx: &mut ProcessContext<T>,
    balance: Balance,
) -> Result<(), SimulationError> {
    let id = ctx.id();
    ctx.announce(MessageType::Started, |time| Event::Started { time, id, balance })?;
    ctx.await_all(MessageType::Started)?;
    let time = ctx.now();
    ctx.log(Event::ReceivedAllStarted { time, id });
    Ok(())
}

fn finish<T: Transport>(
    ctx: &mut ProcessContext<T>,
    balance: Balance,
) -> Result<(), SimulationError> {
    let id = ctx.id();
    ctx.announce(MessageType::Done, |time| Event::Done { time, id, balance })?;
    ctx.await_all(MessageType::Done)?;
    let time = ctx.now();
    ctx.log(Event::ReceivedAllDone { time, id });
    Ok(())
}

fn unexpected(message: &Message, src: LocalId, state: &'static str) -> SimulationError {
    ProtocolError::Unexpected {
        message_type: message.message_type(),
        src,
        state,
    }
    .into()
}

/// DONEs from faster peers, set aside until the worker reaches its own DONE
/// barrier
///
/// They must stay out of the context inbox while running, since
/// `next_message` hands the inbox out first.
#[derive(Debug, Default)]
struct EarlyDone(Vec<(LocalId, Message)>);

impl EarlyDone {
    fn hold(&mut self, src: LocalId, message: Message) {
        debug!(src, "holding DONE received while running");
        self.0.push((src, message));
    }

    fn release<T: Transport>(self, ctx: &mut ProcessContext<T>) {
        for (src, message) in self.0 {
            ctx.defer(src, message);
        }
    }
}

/// Block until the coordinator's STOP
fn await_stop<T: Transport>(ctx: &mut ProcessContext<T>) -> Result<(), SimulationError> {
    let mut early = EarlyDone::default();
    loop {
        let (src, message) = ctx.next_message()?;
        match message.message_type() {
            MessageType::Stop if src == PARENT_ID => break,
            MessageType::Done => early.hold(src, message),
            _ => return Err(unexpected(&message, src, "running")),
        }
    }
    early.release(ctx);
    Ok(())
}

/// Barriers only: wait for STOP between STARTED and DONE
pub fn run_basic_worker<T: Transport>(
    transport: T,
    discipline: ClockDiscipline,
) -> Result<ProcessReport, SimulationError> {
    let mut ctx = ProcessContext::new(transport, discipline);
    start(&mut ctx, 0)?;
    await_stop(&mut ctx)?;
    finish(&mut ctx, 0)?;
    let id = ctx.id();
    let events = ctx.close()?;
    Ok(ProcessReport {
        id,
        events: events.into_events(),
    })
}

/// Run `ITERATIONS_PER_ID * id` iterations, each optionally inside the
/// critical section
pub fn run_mutex_worker<T: Transport>(
    transport: T,
    discipline: ClockDiscipline,
    use_mutex: bool,
) -> Result<ProcessReport, SimulationError> {
    let mut ctx = ProcessContext::new(transport, discipline);
    let id = ctx.id();
    start(&mut ctx, 0)?;

    let total = ITERATIONS_PER_ID * usize::from(id);
    for iteration in 1..=total {
        if use_mutex {
            ctx.request_cs()?;
        }
        let time = ctx.now();
        ctx.log(Event::LoopIteration {
            time,
            id,
            iteration,
            total,
        });
        if use_mutex {
            ctx.release_cs()?;
        }
    }

    finish(&mut ctx, 0)?;
    let events = ctx.close()?;
    Ok(ProcessReport {
        id,
        events: events.into_events(),
    })
}

/// Bank ledger worker
pub fn run_bank_worker<T: Transport>(
    transport: T,
    discipline: ClockDiscipline,
    opening_balance: Balance,
) -> Result<ProcessReport, SimulationError> {
    BankWorker::new(transport, discipline, opening_balance).run()
}

/// Worker holding one account of the ledger
pub struct BankWorker<T: Transport> {
    ctx: ProcessContext<T>,
    account: Account,
    state: WorkerState,
}

impl<T: Transport> BankWorker<T> {
    pub fn new(transport: T, discipline: ClockDiscipline, opening_balance: Balance) -> Self {
        let ctx = ProcessContext::new(transport, discipline);
        let account = Account::new(ctx.id(), opening_balance);
        Self {
            ctx,
            account,
            state: WorkerState::Init,
        }
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn account(&self) -> &Account {
        &self.account
    }

    pub fn run(mut self) -> Result<ProcessReport, SimulationError> {
        start(&mut self.ctx, self.account.balance())?;
        self.transition(WorkerState::Running);
        self.serve()?;

        self.transition(WorkerState::Stopping);
        self.account.seal(self.ctx.now());
        finish(&mut self.ctx, self.account.balance())?;
        self.ship_history()?;

        let id = self.ctx.id();
        let events = self.ctx.close()?;
        self.transition(WorkerState::Closed);
        Ok(ProcessReport {
            id,
            events: events.into_events(),
        })
    }

    fn transition(&mut self, next: WorkerState) {
        debug!(process = self.ctx.id(), from = ?self.state, to = ?next, "worker state");
        self.state = next;
    }

    /// Handle TRANSFERs until the coordinator's STOP
    fn serve(&mut self) -> Result<(), SimulationError> {
        let mut early = EarlyDone::default();
        loop {
            let (src, message) = self.ctx.next_message()?;
            self.account.catch_up(self.ctx.now());
            match message.message_type() {
                MessageType::Stop if src == PARENT_ID => break,
                MessageType::Transfer => self.on_transfer(src, message)?,
                MessageType::Done => early.hold(src, message),
                _ => return Err(unexpected(&message, src, "running")),
            }
        }
        early.release(&mut self.ctx);
        Ok(())
    }

    fn on_transfer(&mut self, src: LocalId, message: Message) -> Result<(), SimulationError> {
        let order: TransferOrder = match message.transfer_order() {
            Some(order) => *order,
            None => return Err(unexpected(&message, src, "decoding a transfer order")),
        };
        let me = self.ctx.id();

        if order.src == me && src == PARENT_ID {
            let time = self.ctx.tick();
            self.ctx.send(order.dst, &message.restamped(time))?;
            self.account.debit(order.amount)?;
            self.ctx.log(Event::TransferOut {
                time,
                src: me,
                dst: order.dst,
                amount: order.amount,
            });
            Ok(())
        } else if order.dst == me && src == order.src {
            let now = self.ctx.now();
            self.account
                .flag_pending_in(message.timestamp(), now, order.amount)?;
            let time = self.ctx.tick();
            self.ctx.send(PARENT_ID, &Message::ack(time))?;
            self.account.credit(order.amount)?;
            self.ctx.log(Event::TransferIn {
                time,
                src: order.src,
                dst: me,
                amount: order.amount,
            });
            Ok(())
        } else {
            Err(unexpected(&message, src, "routing a transfer"))
        }
    }

    fn ship_history(&mut self) -> Result<(), SimulationError> {
        let time = self.ctx.tick();
        let history = self.account.history().clone();
        debug!(
            process = self.ctx.id(),
            ticks = history.len(),
            "shipping balance history"
        );
        self.ctx
            .send(PARENT_ID, &Message::balance_history(time, history))?;
        self.transition(WorkerState::Shipped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Mesh;

    #[test]
    fn test_transfer_from_stranger_is_rejected() {
        let mut endpoints = Mesh::build(3);
        let worker_endpoint = endpoints.remove(1);
        let mut worker = BankWorker::new(worker_endpoint, ClockDiscipline::LocalOnly, 5);

        let message = Message::transfer(1, TransferOrder::new(2, 1, 3));
        assert!(worker.on_transfer(PARENT_ID, message).is_err());
        assert_eq!(worker.account().balance(), 5);
    }

    #[test]
    fn test_source_leg_relays_and_debits() {
        let mut endpoints = Mesh::build(3);
        let mut peer = endpoints.pop().unwrap();
        let worker_endpoint = endpoints.pop().unwrap();
        let mut worker = BankWorker::new(worker_endpoint, ClockDiscipline::LocalOnly, 10);

        let order = TransferOrder::new(1, 2, 4);
        worker
            .on_transfer(PARENT_ID, Message::transfer(1, order))
            .unwrap();
        assert_eq!(worker.account().balance(), 6);
        assert_eq!(worker.account().history().balance_at(0), Some(10));
        assert_eq!(worker.account().history().balance_at(1), None);

        let relayed = peer.receive_from(1).unwrap().unwrap();
        assert_eq!(relayed.transfer_order(), Some(&order));
        assert_eq!(relayed.timestamp(), 1);
    }

    // ========================================================================
    // DONE from a faster peer while running
    // ========================================================================

    fn done_from_peer() -> Message {
        Message::done(3, "3: process 2 has DONE with balance $0")
    }

    #[test]
    fn test_basic_worker_stops_with_done_waiting() {
        let mut endpoints = Mesh::build(3);
        let _peer = endpoints.pop().unwrap();
        let mut ctx = ProcessContext::new(endpoints.pop().unwrap(), ClockDiscipline::LocalOnly);
        let mut coordinator = endpoints.pop().unwrap();

        ctx.defer(2, done_from_peer());
        coordinator.send(1, &Message::stop(2)).unwrap();

        await_stop(&mut ctx).unwrap();
        assert_eq!(ctx.deferred_len(), 1);

        finish(&mut ctx, 0).unwrap();
        assert_eq!(ctx.deferred_len(), 0);
        assert_eq!(ctx.events().events_of_type("ReceivedAllDone").len(), 1);
    }

    #[test]
    fn test_bank_worker_stops_with_done_waiting() {
        let mut endpoints = Mesh::build(3);
        let _peer = endpoints.pop().unwrap();
        let mut worker =
            BankWorker::new(endpoints.pop().unwrap(), ClockDiscipline::LocalOnly, 10);
        let mut coordinator = endpoints.pop().unwrap();

        worker.ctx.defer(2, done_from_peer());
        coordinator.send(1, &Message::stop(2)).unwrap();

        worker.serve().unwrap();
        assert_eq!(worker.ctx.deferred_len(), 1);

        finish(&mut worker.ctx, worker.account.balance()).unwrap();
        assert_eq!(worker.ctx.deferred_len(), 0);
        assert_eq!(
            worker.ctx.events().events_of_type("ReceivedAllDone").len(),
            1
        );
    }

    #[test]
    fn test_done_arriving_over_the_channel_is_held() {
        let mut endpoints = Mesh::build(3);
        let mut peer = endpoints.pop().unwrap();
        let mut ctx = ProcessContext::new(endpoints.pop().unwrap(), ClockDiscipline::LocalOnly);
        let mut coordinator = endpoints.pop().unwrap();

        peer.send(1, &done_from_peer()).unwrap();
        coordinator.send(1, &Message::stop(2)).unwrap();

        await_stop(&mut ctx).unwrap();
        finish(&mut ctx, 0).unwrap();
        assert_eq!(ctx.deferred_len(), 0);
        assert_eq!(ctx.events().events_of_type("ReceivedAllDone").len(), 1);
    }

    #[test]
    fn test_transfer_tick_carries_new_balance() {
        let mut endpoints = Mesh::build(3);
        let mut peer = endpoints.pop().unwrap();
        let mut worker =
            BankWorker::new(endpoints.pop().unwrap(), ClockDiscipline::LocalOnly, 10);
        let mut coordinator = endpoints.pop().unwrap();

        worker.ctx.tick();
        let order = TransferOrder::new(1, 2, 4);
        coordinator.send(1, &Message::transfer(1, order)).unwrap();
        coordinator.send(1, &Message::stop(2)).unwrap();
        worker.serve().unwrap();

        assert_eq!(peer.receive_from(1).unwrap().unwrap().timestamp(), 2);
        let history = worker.account().history();
        assert_eq!(history.balance_at(0), Some(10));
        assert_eq!(history.balance_at(1), Some(6));
        assert_eq!(history.balance_at(2), None);
    }
}
