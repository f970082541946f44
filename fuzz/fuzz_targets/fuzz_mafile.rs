#![no_main]

use libfuzzer_sys::fuzz_target;
use vigil_core::mafile::MaFileRecord;

fuzz_target!(|data: &str| {
    // Record parsing and account validation must never panic, even on
    // arbitrary input. They may return errors, but should not crash.
    if let Ok(record) = serde_json::from_str::<MaFileRecord>(data) {
        let _ = record.into_account();
    }
});
