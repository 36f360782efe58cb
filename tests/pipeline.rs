use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rustyingest::extract::{Paragraph, ParagraphExtractor, ParagraphPolicy, SectionExtractor};
use rustyingest::pipeline::{Pipeline, PipelineError, PipelineSettings};
use rustyingest::source::{Enumerator, LocalDirectory, MemorySource, ObjectStore, ObjectStoreSettings};

fn settings(workers: usize) -> PipelineSettings {
    PipelineSettings {
        workers,
        ..PipelineSettings::default()
    }
}

/// Twenty items; item `n` holds `n % 4 + 1` paragraphs.
fn corpus() -> Vec<(String, String)> {
    (0..20)
        .map(|n| {
            let body = (0..n % 4 + 1)
                .map(|p| format!("item {n} paragraph {p}\nsecond line"))
                .collect::<Vec<_>>()
                .join("\n\n");
            (format!("doc-{n:02}.txt"), body)
        })
        .collect()
}

fn expected_units() -> usize {
    (0..20).map(|n| n % 4 + 1).sum()
}

async fn drain(pipeline: &Pipeline<MemorySource, ParagraphExtractor>, items: Vec<String>) -> Vec<Paragraph> {
    let mut run = pipeline.run(items);
    let mut units = Vec::new();
    while let Some(unit) = run.next().await {
        units.push(unit);
    }
    assert!(run.is_complete());
    units
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn unit_totals_do_not_depend_on_worker_count() {
    for workers in [1, 4, 20, 32] {
        let source = Arc::new(MemorySource::new(corpus()).with_piece_size(5));
        let items = source.list().await.expect("list");
        let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(workers))
            .expect("pipeline");

        let units = drain(&pipeline, items).await;
        assert_eq!(units.len(), expected_units(), "workers = {workers}");

        let mut per_item: HashMap<&str, usize> = HashMap::new();
        for unit in &units {
            *per_item.entry(unit.item.as_str()).or_default() += 1;
        }
        for n in 0..20 {
            assert_eq!(per_item[format!("doc-{n:02}.txt").as_str()], n % 4 + 1);
        }
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn every_item_is_fetched_exactly_once() {
    let source = Arc::new(MemorySource::new(corpus()));
    let items = source.list().await.expect("list");
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(6))
        .expect("pipeline");
    drain(&pipeline, items.clone()).await;

    let mut fetched = source.fetch_log();
    fetched.sort();
    assert_eq!(fetched, items);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_item_units_keep_document_order() {
    let source = Arc::new(MemorySource::new(corpus()).with_piece_size(3));
    let items = source.list().await.expect("list");
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(4))
        .expect("pipeline");
    let units = drain(&pipeline, items).await;

    let mut seen: HashMap<String, usize> = HashMap::new();
    for unit in units {
        let next = seen.entry(unit.item.clone()).or_default();
        let (_, rest) = unit.text.split_once(" paragraph ").expect("paragraph marker");
        let index: usize = rest.split_whitespace().next().expect("index").parse().expect("number");
        assert_eq!(index, *next, "out of order in {}", unit.item);
        *next += 1;
    }
}

#[tokio::test]
async fn single_worker_preserves_backlog_order() {
    let source = Arc::new(MemorySource::new([
        ("a.txt", "a1\n\na2"),
        ("b.txt", "b1"),
        ("c.txt", "c1\n\nc2\n\nc3"),
    ]));
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(1))
        .expect("pipeline");
    let items = vec!["c.txt".to_string(), "a.txt".to_string(), "b.txt".to_string()];
    let texts: Vec<String> = drain(&pipeline, items)
        .await
        .into_iter()
        .map(|unit| unit.text)
        .collect();
    assert_eq!(texts, vec!["c1", "c2", "c3", "a1", "a2", "b1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failing_item_is_skipped() {
    let source = Arc::new(
        MemorySource::new([
            ("1.txt", "one"),
            ("2.txt", "two"),
            ("3.txt", "three"),
            ("4.txt", "four"),
            ("5.txt", "five"),
        ])
        .failing("3.txt"),
    );
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(3))
        .expect("pipeline");
    let mut run = pipeline.run_from(source.as_ref()).await.expect("run");

    let mut texts = Vec::new();
    while let Some(unit) = run.next().await {
        texts.push(unit.text);
    }
    texts.sort();
    assert_eq!(texts, vec!["five", "four", "one", "two"]);

    let report = run.finish().await;
    assert_eq!(report.counts.items_claimed, 5);
    assert_eq!(report.counts.items_completed, 4);
    assert_eq!(report.counts.items_failed, 1);
    assert_eq!(report.counts.units_emitted, 4);
}

#[tokio::test]
async fn invalid_utf8_fails_only_that_item() {
    let source = Arc::new(MemorySource::new([
        ("bad.txt", vec![b'o', b'k', b'\n', b'\n', 0xff, 0xfe]),
        ("good.txt", b"fine".to_vec()),
    ]));
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(2))
        .expect("pipeline");
    let mut run = pipeline.run_from(source.as_ref()).await.expect("run");
    let mut texts = Vec::new();
    while let Some(unit) = run.next().await {
        texts.push(unit.text);
    }
    texts.sort();
    // Paragraphs completed before the bad bytes stay emitted.
    assert_eq!(texts, vec!["fine", "ok"]);
    assert_eq!(run.finish().await.counts.items_failed, 1);
}

#[tokio::test]
async fn empty_backlog_yields_nothing() {
    let source = Arc::new(MemorySource::new(Vec::<(String, String)>::new()));
    let pipeline = Pipeline::new(Arc::clone(&source), ParagraphExtractor::default(), settings(4))
        .expect("pipeline");
    let units: Vec<Paragraph> = pipeline.run(Vec::new()).into_stream().collect().await;
    assert!(units.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn bounded_buffer_with_slow_consumer_delivers_everything() {
    let source = Arc::new(MemorySource::new(corpus()));
    let items = source.list().await.expect("list");
    let pipeline = Pipeline::new(
        Arc::clone(&source),
        ParagraphExtractor::default(),
        PipelineSettings {
            workers: 4,
            buffer_capacity: Some(2),
            suffix: String::new(),
        },
    )
    .expect("pipeline");

    let mut run = pipeline.run(items);
    let mut count = 0;
    while let Some(_unit) = run.next().await {
        count += 1;
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    assert_eq!(count, expected_units());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn cancelling_ends_the_sequence() {
    let big: Vec<(String, String)> = (0..200)
        .map(|n| (format!("{n:03}.txt"), "p\n\n".repeat(50)))
        .collect();
    let source = Arc::new(MemorySource::new(big).with_piece_size(2));
    let items = source.list().await.expect("list");
    let pipeline = Pipeline::new(
        Arc::clone(&source),
        ParagraphExtractor::default(),
        PipelineSettings {
            workers: 4,
            buffer_capacity: Some(1),
            suffix: String::new(),
        },
    )
    .expect("pipeline");

    let mut run = pipeline.run(items);
    for _ in 0..10 {
        assert!(run.next().await.is_some());
    }
    run.cancel();

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        let mut rest = 0usize;
        while run.next().await.is_some() {
            rest += 1;
        }
        rest
    })
    .await
    .expect("sequence should end after cancel");
    assert!(drained < 200 * 50);

    let report = tokio::time::timeout(Duration::from_secs(5), run.finish())
        .await
        .expect("finish");
    assert!(report.counts.items_claimed < 200);
    assert_eq!(report.workers_panicked, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dropping_the_stream_stops_workers() {
    let big: Vec<(String, String)> = (0..100)
        .map(|n| (format!("{n:03}.txt"), "p\n\n".repeat(20)))
        .collect();
    let source = Arc::new(MemorySource::new(big));
    let items = source.list().await.expect("list");
    let pipeline = Pipeline::new(
        Arc::clone(&source),
        ParagraphExtractor::default(),
        PipelineSettings {
            workers: 2,
            buffer_capacity: Some(1),
            suffix: String::new(),
        },
    )
    .expect("pipeline");

    let first: Vec<Paragraph> = pipeline.run(items).into_stream().take(3).collect().await;
    assert_eq!(first.len(), 3);

    tokio::time::sleep(Duration::from_millis(50)).await;
    let fetched = source.fetch_log().len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.fetch_log().len(), fetched);
    assert!(fetched < 100);
}

#[tokio::test]
async fn listing_failure_is_reported_before_any_fetch() {
    let store = ObjectStore::new(ObjectStoreSettings::new("http://127.0.0.1:9", "missing"))
        .expect("client");
    let store = Arc::new(store);
    let pipeline = Pipeline::new(Arc::clone(&store), ParagraphExtractor::default(), settings(2))
        .expect("pipeline");
    let result = pipeline.run_from(store.as_ref()).await;
    assert!(matches!(result, Err(PipelineError::Listing(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn local_directory_markdown_sections_end_to_end() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(
        dir.path().join("guide.md"),
        "# Install\nRun the installer.\n\n```sh\nmake install\n```\n\n## Verify\nCheck the version.\n",
    )
    .expect("write guide");
    std::fs::write(dir.path().join("notes.md"), "# Notes\n- one\n- two\n").expect("write notes");
    std::fs::write(dir.path().join("ignored.txt"), "# Not markdown\n").expect("write txt");

    let source = Arc::new(LocalDirectory::new(dir.path()));
    let pipeline = Pipeline::new(
        Arc::clone(&source),
        SectionExtractor::new(),
        PipelineSettings {
            workers: 2,
            buffer_capacity: None,
            suffix: ".md".to_string(),
        },
    )
    .expect("pipeline");

    let mut sections: Vec<_> = pipeline
        .run_from(source.as_ref())
        .await
        .expect("run")
        .into_stream()
        .collect()
        .await;
    sections.sort_by(|a, b| a.heading.cmp(&b.heading));

    let headings: Vec<&str> = sections.iter().map(|s| s.heading.as_str()).collect();
    assert_eq!(headings, vec!["Install", "Notes", "Verify"]);
    assert_eq!(sections[0].code_blocks[0].language, "sh");
    assert_eq!(sections[0].code_blocks[0].value, "make install");
    assert_eq!(sections[1].body, "- one\n- two\n");
    assert_eq!(sections[2].level, 2);
}

#[tokio::test]
async fn local_directory_paragraphs_use_blank_line_policy() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("a.txt"), "first line\nsame paragraph\n   \nnext\n")
        .expect("write");

    let source = Arc::new(LocalDirectory::new(dir.path()));
    let pipeline = Pipeline::new(
        Arc::clone(&source),
        ParagraphExtractor::new(ParagraphPolicy::BlankLine),
        settings(1),
    )
    .expect("pipeline");
    let texts: Vec<String> = pipeline
        .run_from(source.as_ref())
        .await
        .expect("run")
        .into_stream()
        .map(|unit| unit.text)
        .collect()
        .await;
    assert_eq!(texts, vec!["first line same paragraph", "next"]);
}
