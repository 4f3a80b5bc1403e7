#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<exquisite_client::protocol::ServerMessage>(data);

    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(msg) = exquisite_client::protocol::ServerMessage::decode(s) {
            let push = msg.push();
            let _ = push.remote_turn(0);
            let _ = push.final_artworks();
        }
    }
});
