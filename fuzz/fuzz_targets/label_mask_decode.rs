//! Fuzz target for decoding the segmenter's label mask TIFFs.
//!
//! Run with:
//!   cargo +nightly fuzz run label_mask_decode

#![no_main]

use libfuzzer_sys::fuzz_target;
use roiquant::segmentation::fuzz_decode_label_mask;

fuzz_target!(|data: &[u8]| {
    if data.len() > 4 * 1024 * 1024 {
        return;
    }

    let _ = fuzz_decode_label_mask(data);
});
