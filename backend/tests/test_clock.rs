//! Logical clock tests
//!
//! The clock moves only on local sends under the default discipline, and
//! merges received timestamps under the Lamport discipline.

use lamport_ledger_core::{ClockDiscipline, LamportClock, Mesh, Message, ProcessContext, Transport};

#[test]
fn test_clock_starts_at_zero() {
    let clock = LamportClock::new();
    assert_eq!(clock.current_time(), 0);
    assert_eq!(clock.discipline(), ClockDiscipline::LocalOnly);
}

#[test]
fn test_tick_is_strictly_increasing() {
    let mut clock = LamportClock::new();
    let stamps: Vec<_> = (0..5).map(|_| clock.tick()).collect();
    assert_eq!(stamps, vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_local_only_ignores_received_timestamps() {
    let mut clock = LamportClock::new();
    clock.tick();
    clock.observe(100);
    assert_eq!(clock.current_time(), 1);
    assert_eq!(clock.tick(), 2);
}

#[test]
fn test_lamport_merge_takes_maximum() {
    let mut clock = LamportClock::with_discipline(ClockDiscipline::Lamport);
    clock.observe(4);
    assert_eq!(clock.current_time(), 4);
    clock.observe(2);
    assert_eq!(clock.current_time(), 4);
    assert_eq!(clock.tick(), 5);
}

// ============================================================================
// Clock behaviour through a process context
// ============================================================================

#[test]
fn test_receiving_does_not_advance_local_only_context() {
    let mut endpoints = Mesh::build(2);
    let mut sender = endpoints.pop().unwrap();
    let mut ctx = ProcessContext::new(endpoints.pop().unwrap(), ClockDiscipline::LocalOnly);

    sender.send(0, &Message::ack(9)).unwrap();
    let (src, message) = ctx.next_message().unwrap();
    assert_eq!(src, 1);
    assert_eq!(message.timestamp(), 9);
    assert_eq!(ctx.now(), 0);
}

#[test]
fn test_receiving_merges_in_lamport_context() {
    let mut endpoints = Mesh::build(2);
    let mut sender = endpoints.pop().unwrap();
    let mut ctx = ProcessContext::new(endpoints.pop().unwrap(), ClockDiscipline::Lamport);

    sender.send(0, &Message::ack(9)).unwrap();
    ctx.next_message().unwrap();
    assert_eq!(ctx.now(), 9);
    assert_eq!(ctx.tick(), 10);
}
