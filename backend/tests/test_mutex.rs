//! Critical-section tests
//!
//! With the mutex enabled, every worker wraps each loop iteration in a
//! critical section. Entries and releases are stamped with merged Lamport
//! clocks, so a later holder's entry can never precede an earlier holder's
//! release.

use lamport_ledger_core::orchestrator::CriticalSection;
use lamport_ledger_core::{
    run_simulation, ClockDiscipline, Event, Mesh, Message, MessageType, ProcessContext,
    SimulationConfig, Transport, Workload,
};

fn mutex_run(workers: usize, use_mutex: bool) -> lamport_ledger_core::SimulationOutcome {
    let config = SimulationConfig::new(Workload::Mutex {
        workers,
        use_mutex,
    });
    run_simulation(&config).unwrap()
}

#[test]
fn test_critical_sections_do_not_overlap() {
    let outcome = mutex_run(3, true);
    let mut sections: Vec<CriticalSection> = outcome.critical_sections();
    assert_eq!(sections.len(), 5 + 10 + 15);

    sections.sort_by_key(|s| (s.entered, s.id));
    for pair in sections.windows(2) {
        assert!(
            pair[1].entered >= pair[0].released,
            "{:?} entered before {:?} released",
            pair[1],
            pair[0]
        );
    }
}

#[test]
fn test_each_worker_runs_its_iterations() {
    let outcome = mutex_run(3, true);
    for id in 1..=3u8 {
        let report = outcome.report(id).unwrap();
        let iterations: Vec<_> = report
            .events
            .iter()
            .filter_map(|e| match e {
                Event::LoopIteration {
                    iteration, total, ..
                } => Some((*iteration, *total)),
                _ => None,
            })
            .collect();
        let total = 5 * usize::from(id);
        assert_eq!(iterations.len(), total);
        assert_eq!(iterations.first(), Some(&(1, total)));
        assert_eq!(iterations.last(), Some(&(total, total)));
    }
}

#[test]
fn test_without_mutex_no_sections_are_taken() {
    let outcome = mutex_run(2, false);
    assert!(outcome.critical_sections().is_empty());

    let line = outcome
        .report(2)
        .unwrap()
        .events
        .iter()
        .find(|e| e.event_type() == "LoopIteration")
        .unwrap()
        .to_string();
    assert_eq!(line, "process 2 is doing 1 iteration out of 10");
}

#[test]
fn test_single_worker_still_needs_the_coordinator_reply() {
    let outcome = mutex_run(1, true);
    assert_eq!(outcome.critical_sections().len(), 5);
}

// ============================================================================
// Negotiation through a single context
// ============================================================================

#[test]
fn test_request_defers_other_traffic() {
    let mut endpoints = Mesh::build(2);
    let mut worker = ProcessContext::new(endpoints.remove(1), ClockDiscipline::Lamport);
    let mut coordinator = endpoints.remove(0);

    coordinator.send(1, &Message::done(4, "0 done")).unwrap();
    coordinator.send(1, &Message::cs_reply(5)).unwrap();

    worker.request_cs().unwrap();
    assert_eq!(worker.deferred_len(), 1);
    assert_eq!(worker.now(), 5);
    assert_eq!(worker.events().events_of_type("CsEntered").len(), 1);

    let request = coordinator.receive_from(1).unwrap().unwrap();
    assert_eq!(request.message_type(), MessageType::CsRequest);
    assert_eq!(request.timestamp(), 1);

    worker.release_cs().unwrap();
    let release = coordinator.receive_from(1).unwrap().unwrap();
    assert_eq!(release.message_type(), MessageType::CsRelease);
    assert_eq!(release.timestamp(), 6);
}

#[test]
fn test_release_without_holding_is_rejected() {
    let mut endpoints = Mesh::build(2);
    let mut worker = ProcessContext::new(endpoints.remove(1), ClockDiscipline::Lamport);
    assert!(worker.release_cs().is_err());
}

#[test]
fn test_unsolicited_reply_is_rejected() {
    let mut endpoints = Mesh::build(2);
    let mut worker = ProcessContext::new(endpoints.remove(1), ClockDiscipline::Lamport);
    endpoints[0].send(1, &Message::cs_reply(1)).unwrap();
    endpoints[0].send(1, &Message::stop(2)).unwrap();
    assert!(worker.next_message().is_err());
}
