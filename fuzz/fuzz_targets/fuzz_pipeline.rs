//! Fuzz target for the whole capture-to-storage pipeline.
//!
//! The input is a sequence of length-prefixed Ethernet frames fed to one
//! pipeline, so fragment groups, TCP connections and calls accumulate
//! across frames.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sipscope_core::attribute::AttributeId;
use sipscope_core::config::{DissectorConfig, StorageConfig};
use sipscope_core::pcap::PacketRef;
use sipscope_core::pipeline::Pipeline;
use sipscope_core::storage::{CallQuery, Storage};
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    let Ok(storage) = Storage::new(StorageConfig {
        limit: 8,
        rotate: true,
        ..Default::default()
    }) else {
        return;
    };
    let storage = Arc::new(storage);
    let mut pipeline = Pipeline::new(DissectorConfig::default(), Arc::clone(&storage));

    let mut frame_number = 0;
    let mut rest = data;
    while let [hi, lo, tail @ ..] = rest {
        let len = (usize::from(*hi) << 8 | usize::from(*lo)).min(tail.len());
        let (frame, next) = tail.split_at(len);
        rest = next;

        frame_number += 1;
        let _ = pipeline.process(&PacketRef {
            frame_number,
            timestamp_us: frame_number as i64,
            captured_len: frame.len() as u32,
            original_len: frame.len() as u32,
            link_type: 1,
            data: frame,
        });
    }

    let query = CallQuery::new().sort_by(AttributeId::TotalDur, true);
    for call in storage.query(&query) {
        let call = call.read();
        for id in AttributeId::ALL {
            let _ = call.attribute(id);
        }
    }
});
