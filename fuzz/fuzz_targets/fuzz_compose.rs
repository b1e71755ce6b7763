#![no_main]

use libfuzzer_sys::fuzz_target;
use motion_photo::compose;

fuzz_target!(|data: &[u8]| {
    // First byte picks the split between image and video
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = (split as usize * rest.len()) / 255;
    let (image, video) = rest.split_at(split);

    if let Ok(output) = compose(image, "image/jpeg", video) {
        // The video is always the tail of the output
        assert!(output.ends_with(video));
        assert!(output.len() > video.len());
    }
});
