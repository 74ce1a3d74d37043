use ems_telemetry::{metrics, record_history_dropped, record_poll_ok};

#[test]
fn counters_are_monotonic() {
    let before = metrics().snapshot();
    record_poll_ok();
    record_history_dropped(3);
    let after = metrics().snapshot();
    assert!(after.polls_ok >= before.polls_ok + 1);
    assert!(after.history_dropped >= before.history_dropped + 3);
}
