#![no_main]

use std::net::{IpAddr, Ipv4Addr};

use bytes::Bytes;
use ironwatch_log_pipeline::{Dispatched, ParserRouter, RawRecord};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let router = ParserRouter::with_defaults();
    let record = RawRecord::new(
        Bytes::copy_from_slice(data),
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
    );

    // 어떤 입력이든 엔트리 하나가 나오고 원문은 보존되어야 한다
    let dispatched = router.dispatch(&record);
    let raw = match &dispatched {
        Dispatched::Entry(entry) => &entry.raw,
        Dispatched::Rejected { entry, .. } => &entry.raw,
    };
    assert_eq!(raw.as_str(), String::from_utf8_lossy(data));
});
