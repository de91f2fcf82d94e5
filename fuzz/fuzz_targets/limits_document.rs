#![no_main]

use libfuzzer_sys::fuzz_target;
use perfgate::benchmark::{BenchmarkMethod, BenchmarkSet};
use perfgate::limits::{targets_from_document, DocumentFormat, JsonFormat, ParseOptions, TomlFormat};
use perfgate::messages::MessageLog;
use perfgate::metrics::MetricCatalog;
use perfgate::target::TargetKey;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let benchmarks = BenchmarkSet {
        competition_id: "Bar".to_string(),
        methods: vec![
            BenchmarkMethod {
                key: TargetKey::new("Bar", "Slow"),
                is_baseline: true,
            },
            BenchmarkMethod {
                key: TargetKey::new("Bar", "Foo"),
                is_baseline: false,
            },
        ],
        limits_resource: None,
    };
    let catalog = MetricCatalog::standard();

    // Parsing and classification must never panic, whatever the document says
    for document in [JsonFormat.parse(input).ok(), TomlFormat.parse(input).ok()]
        .into_iter()
        .flatten()
    {
        let mut log = MessageLog::new();
        let _ = targets_from_document(
            Some(&document),
            &benchmarks,
            &catalog,
            &ParseOptions::default(),
            &mut log,
        );
    }
});
