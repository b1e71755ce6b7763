#![no_main]

use libfuzzer_sys::fuzz_target;
use motion_photo::{build_motion_photo_xmp, MotionMetadata, XmpFields};

fuzz_target!(|data: &[u8]| {
    // Field lookup on arbitrary text
    let text = String::from_utf8_lossy(data);
    let fields = XmpFields::parse(&text);
    let _ = fields.is_motion_photo();

    // Numbers from the input written out and read back
    if data.len() >= 24 {
        let word = |i: usize| u64::from_be_bytes(data[i..i + 8].try_into().unwrap_or_default());
        let meta = MotionMetadata {
            container_length: word(0),
            data_length: word(8),
            presentation_timestamp_us: word(16),
        };
        if let Ok(xml) = build_motion_photo_xmp(&meta) {
            let parsed = XmpFields::parse(&String::from_utf8_lossy(&xml));
            assert_eq!(parsed.motion_length, meta.container_length);
            assert_eq!(parsed.presentation_timestamp_us, meta.presentation_timestamp_us);
        }
    }
});
