#![no_main]

use libfuzzer_sys::fuzz_target;
use shadowtrace::config::TraceConfig;
use shadowtrace::flatten::Reconstruction;
use shadowtrace::raw_log::RawLogReader;

fuzz_target!(|data: &[u8]| {
    // Decoding and replaying must return errors, never panic
    let Ok(reader) = RawLogReader::new(data) else {
        return;
    };
    let Ok(mut pass) = Reconstruction::new(&TraceConfig::default()) else {
        return;
    };
    for event in reader {
        match event {
            Ok(event) => {
                let _ = pass.observe(event);
            }
            Err(_) => break,
        }
    }
});
