#![no_main]

use libfuzzer_sys::fuzz_target;
use motion_photo::{extract_video, extract_xmp, find_eoi, probe, JpegSegments, Mp4BoxWalker};

fuzz_target!(|data: &[u8]| {
    // Every reader must return errors or None, never panic
    if let Ok(segments) = JpegSegments::new(data) {
        for segment in segments {
            if let Some(range) = segment.payload {
                assert!(range.end_offset() <= data.len());
            }
        }
    }

    if let Ok(eoi) = find_eoi(data) {
        assert!(eoi.end_offset() <= data.len());
    }
    let _ = extract_xmp(data);
    let _ = probe(data);
    if let Some(video) = extract_video(data) {
        assert!(video.len() <= data.len());
    }

    // Treat the same bytes as a video
    let walker = Mp4BoxWalker::new(data);
    for mp4_box in walker.boxes() {
        assert!(mp4_box.payload.end_offset() <= data.len());
    }
    let _ = walker.mdat_payload_length();
    let _ = walker.movie_duration_micros();
});
