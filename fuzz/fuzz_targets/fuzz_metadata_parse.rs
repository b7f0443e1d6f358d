#![no_main]

use combine_archive::MetadataGraph;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok((graph, _warnings)) = MetadataGraph::parse(data, |_| true) else {
        return;
    };

    // Whatever parsed must serialize to a document that parses again
    let serialized = graph.serialize();
    assert!(MetadataGraph::parse(&serialized, |_| true).is_ok());
});
