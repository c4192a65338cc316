use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use pinpress::batch::lock::CampaignLock;
use pinpress::batch::pipeline::{
    BatchOptions, BatchPipeline, BatchRunStatus, PauseSignal,
};
use pinpress::render::headless::RendererConfig;
use pinpress::store::kv::{KvStore, MemoryStore, UnavailableStore};
use pinpress::store::sink::MemorySink;
use pinpress::{Campaign, CampaignStatus, DataRow, FieldMapping, PinError, Template};

fn tiny_template(width: u32) -> Template {
    serde_json::from_value(json!({
        "width": width, "height": 16, "background": "#ffffff",
        "elements": [{
            "id": "box", "type": "shape",
            "x": 2.0, "y": 2.0, "width": 8.0, "height": 8.0,
            "shape": "rect", "fill": "#336699"
        }]
    }))
    .unwrap()
}

fn campaign(id: &str, rows: usize) -> Campaign {
    Campaign {
        id: id.into(),
        templates: vec![tiny_template(16)],
        rows: vec![DataRow::new(); rows],
        mapping: FieldMapping::new(),
        total: None,
        status: CampaignStatus::Pending,
    }
}

fn pipeline(store: Arc<dyn KvStore>, sink: Arc<MemorySink>, batch_size: usize) -> BatchPipeline {
    BatchPipeline::new(
        store,
        sink,
        RendererConfig::default(),
        BatchOptions {
            batch_size,
            inter_batch_delay: Duration::from_millis(1),
            lock_ttl: Duration::from_secs(60),
            rate_limit: None,
        },
    )
}

#[test]
fn campaign_completes_and_persists_every_row() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(store, sink.clone(), 4)
        .run(&campaign("c-ok", 11), &PauseSignal::new())
        .unwrap();

    assert_eq!(report.status, BatchRunStatus::Completed);
    assert_eq!(report.completed, 11);
    assert_eq!(report.failed, 0);
    assert!(report.errors.is_empty());

    let mut rows = sink.persisted_rows();
    rows.sort_unstable();
    assert_eq!(rows, (0..11).collect::<Vec<_>>());

    // Final persisted status is terminal.
    let (_, last_status) = *sink.progress.lock().unwrap().last().unwrap();
    assert_eq!(last_status, CampaignStatus::Completed);
}

#[test]
fn failing_rows_are_counted_and_reported_without_stopping_the_run() {
    // Round-robin over a good template and one whose canvas exceeds the
    // surface limit: every second row fails, the rest still render.
    let mut c = campaign("c-mixed", 6);
    c.templates = vec![tiny_template(16), tiny_template(70000)];

    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(store, sink.clone(), 3)
        .run(&c, &PauseSignal::new())
        .unwrap();

    assert_eq!(report.status, BatchRunStatus::Failed);
    assert_eq!(report.completed, 3);
    assert_eq!(report.failed, 3);
    assert_eq!(report.errors.len(), 3);
    assert!(report.errors.iter().all(|e| e.row_index % 2 == 1));

    // Partial success is a valid terminal state: every row was persisted,
    // failures as error records.
    assert_eq!(sink.persisted_rows().len(), 6);
}

#[test]
fn lock_contention_skips_without_side_effects() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());

    let held = CampaignLock::acquire(store.clone(), "c-locked", Duration::from_secs(60)).unwrap();
    let report = pipeline(store, sink.clone(), 2)
        .run(&campaign("c-locked", 4), &PauseSignal::new())
        .unwrap();

    assert_eq!(report.status, BatchRunStatus::Skipped);
    assert!(sink.persisted_rows().is_empty());
    assert!(sink.progress.lock().unwrap().is_empty());

    held.release();
    let report = pipeline(
        Arc::new(MemoryStore::new()),
        sink.clone(),
        2,
    )
    .run(&campaign("c-locked", 4), &PauseSignal::new())
    .unwrap();
    assert_eq!(report.status, BatchRunStatus::Completed);
}

#[test]
fn pause_persists_cursor_and_resume_skips_done_rows() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let pause = PauseSignal::new();

    // Paused before the run starts: the first batch check yields
    // immediately with nothing processed.
    pause.pause();
    let report = pipeline(store.clone(), sink.clone(), 4)
        .run(&campaign("c-pause", 10), &pause)
        .unwrap();
    assert_eq!(report.status, BatchRunStatus::Paused);
    assert!(sink.persisted_rows().is_empty());

    // Resume processes all ten rows exactly once.
    pause.resume();
    let report = pipeline(store.clone(), sink.clone(), 4)
        .run(&campaign("c-pause", 10), &pause)
        .unwrap();
    assert_eq!(report.status, BatchRunStatus::Completed);

    let mut rows = sink.persisted_rows();
    rows.sort_unstable();
    assert_eq!(rows, (0..10).collect::<Vec<_>>());
}

#[test]
fn resume_starts_from_the_persisted_cursor() {
    let store: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());

    // A previous partial run left the cursor at row 4.
    store
        .set("pin:campaign:c-resume:cursor", "4", None)
        .unwrap();

    let report = pipeline(store, sink.clone(), 4)
        .run(&campaign("c-resume", 10), &PauseSignal::new())
        .unwrap();

    // Only the unprocessed tail is rendered, never rows 0..4 again.
    let mut rows = sink.persisted_rows();
    rows.sort_unstable();
    assert_eq!(rows, (4..10).collect::<Vec<_>>());
    assert_eq!(report.status, BatchRunStatus::Completed);
}

#[test]
fn unavailable_store_fails_open_and_still_produces_pins() {
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(Arc::new(UnavailableStore), sink.clone(), 4)
        .run(&campaign("c-degraded", 5), &PauseSignal::new())
        .unwrap();

    assert_eq!(report.status, BatchRunStatus::Completed);
    assert_eq!(report.completed, 5);
    assert_eq!(sink.persisted_rows().len(), 5);
}

#[test]
fn invalid_campaign_is_config_failure_marked_failed() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let mut c = campaign("c-bad", 3);
    c.templates.clear();

    let err = pipeline(store, sink.clone(), 2)
        .run(&c, &PauseSignal::new())
        .unwrap_err();
    assert!(matches!(err, PinError::Config(_)));

    // The campaign itself was marked failed; nothing was rendered.
    let (_, status) = *sink.progress.lock().unwrap().last().unwrap();
    assert_eq!(status, CampaignStatus::Failed);
    assert!(sink.persisted_rows().is_empty());
}

#[test]
fn round_robin_distributes_templates_across_rows() {
    let mut c = campaign("c-rr", 4);
    let mut second = tiny_template(16);
    second.background = pinpress::ColorDef::rgba(0.0, 0.0, 0.0, 1.0);
    c.templates.push(second);

    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let report = pipeline(store, sink, 2)
        .run(&c, &PauseSignal::new())
        .unwrap();
    assert_eq!(report.status, BatchRunStatus::Completed);
    assert_eq!(report.completed, 4);
}
