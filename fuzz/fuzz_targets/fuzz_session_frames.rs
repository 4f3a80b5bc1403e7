#![no_main]

use exquisite_client::{MemoryStore, Session, SessionConfig, TOTAL_SEGMENTS};
use libfuzzer_sys::fuzz_target;

// Newline-separated frames fed into an open session. Whatever arrives, the
// turn state must stay within range and never move backwards.
fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let mut session = Session::new(SessionConfig::default(), Box::new(MemoryStore::new()));
    if session.join("FUZZ").is_err() || session.begin_connect().is_err() || session.on_open().is_err() {
        return;
    }

    let mut last_segment = 0;
    for frame in text.lines() {
        let _ = session.on_message(frame);
        let snapshot = session.snapshot();
        assert!(snapshot.segment_index < TOTAL_SEGMENTS);
        assert!(snapshot.segment_index >= last_segment);
        last_segment = snapshot.segment_index;
        let _ = session.drain_events();
    }
});
