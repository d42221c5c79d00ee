use std::io::Cursor;
use std::path::PathBuf;

use threadscope::analysis::StackAggregator;
use threadscope::domain::{StackAssertionError, StackKey};
use threadscope::recording::Recording;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

#[test]
fn test_two_record_stream_end_to_end() {
    let stream = "\
# mode: wall
TWorker-1;run:5 1
TWorker-1;run:5;step:9 2
";
    let recording = Recording::from_reader(Cursor::new(stream)).unwrap();
    let aggregator = StackAggregator::from_recording(&recording);

    let histogram = aggregator.histogram("Worker-1").unwrap();
    let exact: Vec<(&StackKey, i64)> = histogram
        .iter()
        .filter(|(key, _)| key.is_exact())
        .collect();
    assert_eq!(
        exact,
        vec![
            (&StackKey::exact_from([("run", 5)]), 1),
            (&StackKey::exact_from([("run", 5), ("step", 9)]), 2),
        ]
    );
    assert_eq!(histogram.get(&StackKey::collapsed_from(["run"])), Some(1));
    assert_eq!(histogram.get(&StackKey::collapsed_from(["run", "step"])), Some(2));

    assert_eq!(aggregator.total_metric(), 3);
    assert_eq!(aggregator.thread_count(), 1);
    assert_eq!(aggregator.sample_count(), 2);
}

#[test]
fn test_collapsed_fixture_groups_by_label() {
    let recording = Recording::from_path(fixture("simple_recording.txt")).unwrap();
    let aggregator = StackAggregator::from_recording(&recording);

    // The bare "140300" label resolves through the metadata header.
    let threads: Vec<_> = aggregator.threads().collect();
    assert_eq!(threads, vec!["MainThread", "Worker-1"]);

    let run_step = StackKey::exact_from([("run", 5), ("step", 9)]);
    assert_eq!(aggregator.query("Worker-1", &run_step), Some(300));
    let run = StackKey::collapsed_from(["run"]);
    assert_eq!(aggregator.query("Worker-1", &run), Some(100));
    let module_main = StackKey::collapsed_from(["<module>", "main"]);
    assert_eq!(aggregator.query("MainThread", &module_main), Some(600));
    let main_12 = StackKey::exact_from([("main", 12)]);
    assert_eq!(aggregator.query("MainThread", &main_12), Some(200));
}

#[test]
fn test_json_fixture_matches_collapsed_semantics() {
    let recording = Recording::from_path(fixture("simple_recording.jsonl")).unwrap();
    let aggregator = StackAggregator::from_recording(&recording);

    let threads: Vec<_> = aggregator.threads().collect();
    assert_eq!(threads, vec!["Worker-1", "MainThread"]);
    assert_eq!(aggregator.query("Worker-1", &StackKey::exact_from([("step", 9)])), Some(2));
    assert_eq!(aggregator.total_metric(), 6);
}

#[test]
fn test_assertion_messages_list_what_was_recorded() {
    let recording = Recording::from_path(fixture("simple_recording.txt")).unwrap();
    let aggregator = StackAggregator::from_recording(&recording);
    let stack = StackKey::exact_from([("_bootstrap", 1012), ("run", 5)]);

    let err = aggregator
        .assert_stack("Worker-9", &stack, |_| true)
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.starts_with("Expected thread Worker-9"), "{msg}");
    assert!(msg.contains("MainThread") && msg.contains("Worker-1"), "{msg}");

    let run = StackKey::exact_from([("run", 5)]);
    let err = aggregator
        .assert_stack("Worker-1", &run, |_| true)
        .unwrap_err();
    assert!(matches!(err, StackAssertionError::UnknownStack { .. }));
    assert!(err.to_string().contains("(_bootstrap:1012, run:5)"), "{err}");

    let err = aggregator
        .assert_stack("Worker-1", &stack, |v| v > 1000)
        .unwrap_err();
    assert_eq!(
        err,
        StackAssertionError::PredicateFailed {
            thread: "Worker-1".to_string(),
            stack: stack.clone(),
            value: 100,
        }
    );

    assert_eq!(aggregator.assert_stack("Worker-1", &stack, |v| v == 100), Ok(100));
}
