//! End-to-end tests for the streaming side.
//!
//! TransportLog → MockStream → aggregators → join → MockSink, with the real
//! file checkpoint for the sink position.

use chrono::NaiveDate;
use integration_tests::{fixtures, setup::TestPipeline};
use pipeline_core::{ErrorClass, NormalizedRecord};
use std::time::Duration;
use tokio::sync::watch;

fn month(year: i32, month: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, 1).unwrap()
}

/// Two records in the same group, compensation on only one of them.
#[tokio::test]
async fn test_total_compensations() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        Some("Choking hazard"),
        Some("Refund"),
    ));
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0002",
        "Toys",
        (2023, 3, 20),
        Some("Sharp edges"),
        None,
    ));

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.consumed, 2);
    assert_eq!(report.rows_written, 1);

    let batches = pipeline.sink.batches();
    assert_eq!(batches.len(), 1);
    let row = &batches[0].rows[0];
    assert_eq!(row.product_category.as_deref(), Some("Toys"));
    assert_eq!(row.month, month(2023, 3));
    assert_eq!(row.total_recalls, 2);
    assert_eq!(row.total_compensations, 1);
    assert_eq!(row.monthly_recalls, Some(2));
}

/// Risk lengths 50 and 150 in one group.
#[tokio::test]
async fn test_risk_statistics() {
    let pipeline = TestPipeline::new(Vec::new());
    let short = fixtures::text_of_len(50);
    let long = fixtures::text_of_len(150);
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 1),
        Some(&short),
        None,
    ));
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0002",
        "Toys",
        (2023, 3, 31),
        Some(&long),
        None,
    ));

    pipeline.stream_worker(3).process_window().await.unwrap();

    let row = &pipeline.sink.batches()[0].rows[0];
    assert_eq!(row.total_recalls, 2);
    assert_eq!(row.total_high_risks, 1);
    assert_eq!(row.average_risk_length, Some(100.0));
    assert_eq!(row.max_distributors, Some(2));
    assert_eq!(row.min_distributors, Some(2));
    assert_eq!(row.monthly_high_risks, Some(1));
}

/// Batch offsets are stamped on the sink batch and checkpointed after it.
#[tokio::test]
async fn test_window_provenance_and_checkpoint() {
    let pipeline = TestPipeline::new(Vec::new());
    for n in 1..=3 {
        pipeline.log.append(&fixtures::normalized(
            &fixtures::reference_sheet(n),
            "Food",
            (2023, 5, 10),
            None,
            None,
        ));
    }

    pipeline.stream_worker(3).process_window().await.unwrap();

    let batch = &pipeline.sink.batches()[0];
    assert_eq!(batch.batch_start_offset, 0);
    assert_eq!(batch.batch_end_offset, 3);
    assert_eq!(pipeline.sink_offset().await, 3);

    // Nothing new: no write, checkpoint unchanged.
    let worker = pipeline.stream_worker(3);
    assert!(worker.process_window().await.unwrap().is_none());
    assert_eq!(pipeline.sink.batches().len(), 1);
    assert_eq!(pipeline.sink_offset().await, 3);
}

/// Rows come out ordered by month.
#[tokio::test]
async fn test_rows_ordered_by_month() {
    let pipeline = TestPipeline::new(Vec::new());
    for (n, m) in [(1, 6), (2, 2), (3, 4)] {
        pipeline.log.append(&fixtures::normalized(
            &fixtures::reference_sheet(n),
            "Toys",
            (2023, m, 1),
            None,
            None,
        ));
    }

    pipeline.stream_worker(3).process_window().await.unwrap();

    let months: Vec<NaiveDate> = pipeline.sink.batches()[0]
        .rows
        .iter()
        .map(|row| row.month)
        .collect();
    assert_eq!(months, vec![month(2023, 2), month(2023, 4), month(2023, 6)]);
}

/// Records from before the cutoff year never reach the sink, but their
/// offsets are still consumed.
#[tokio::test]
async fn test_cutoff_filter() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2022-11-0001",
        "Toys",
        (2022, 11, 5),
        None,
        None,
    ));

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.rows_written, 0);
    assert!(pipeline.sink.batches().is_empty());
    assert_eq!(pipeline.sink.attempts(), 0);
    assert_eq!(pipeline.sink_offset().await, 1);
}

/// Redelivered records with the same identity count once.
#[tokio::test]
async fn test_duplicates_collapsed() {
    let pipeline = TestPipeline::new(Vec::new());
    let record = fixtures::normalized("2023-03-0001", "Toys", (2023, 3, 2), None, None);
    pipeline.log.append(&record);
    pipeline.log.append(&record);

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.duplicates, 1);
    assert_eq!(pipeline.sink.batches()[0].rows[0].total_recalls, 1);
}

/// An undecodable message is dropped and consumption continues past it.
#[tokio::test]
async fn test_undecodable_message_dropped() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append_raw(b"{\"reference_sheet\": 42".to_vec());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.consumed, 1);
    assert_eq!(report.next_offset, 2);
    assert_eq!(pipeline.sink_offset().await, 2);
}

/// A record without a category has no trend match.
#[tokio::test]
async fn test_null_category_left_join() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&NormalizedRecord {
        product_category: None,
        ..fixtures::normalized("2023-03-0001", "unused", (2023, 3, 2), None, None)
    });

    pipeline.stream_worker(3).process_window().await.unwrap();

    let row = &pipeline.sink.batches()[0].rows[0];
    assert_eq!(row.product_category, None);
    assert_eq!(row.total_recalls, 1);
    assert_eq!(row.monthly_recalls, None);
    assert_eq!(row.monthly_high_risks, None);
}

/// Transient sink failures are retried within the window.
#[tokio::test]
async fn test_sink_retry_then_success() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));
    pipeline.sink.fail_next(2);

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.rows_written, 1);
    assert_eq!(pipeline.sink.attempts(), 3);
    assert_eq!(pipeline.sink_offset().await, 1);
}

/// Exhausted sink retries are fatal and leave the checkpoint untouched;
/// a restarted worker replays the same window.
#[tokio::test]
async fn test_sink_exhaustion_is_fatal() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));
    pipeline.sink.fail_next(10);

    let err = pipeline.stream_worker(2).process_window().await.unwrap_err();
    assert_eq!(err.class(), ErrorClass::Fatal);
    assert_eq!(err.code(), "SINK_002");
    assert_eq!(pipeline.sink.attempts(), 3);
    assert_eq!(pipeline.sink_offset().await, 0);

    pipeline.sink.fail_next(0);
    let report = pipeline.stream_worker(2).process_window().await.unwrap().unwrap();
    assert_eq!(report.start_offset, 0);
    assert_eq!(pipeline.sink.batches().len(), 1);
    assert_eq!(pipeline.sink_offset().await, 1);
}

/// The run loop halts on a fatal sink error instead of skipping the window.
#[tokio::test]
async fn test_run_halts_on_fatal_error() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));
    pipeline.sink.fail_next(100);

    let (_tx, rx) = watch::channel(false);
    let result = tokio::time::timeout(Duration::from_secs(5), pipeline.stream_worker(1).run(rx))
        .await
        .expect("worker did not halt");
    assert!(result.is_err());
    assert_eq!(pipeline.sink_offset().await, 0);
}

/// A restarted worker resumes after the last written window.
#[tokio::test]
async fn test_restart_resumes_from_sink_checkpoint() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));
    pipeline.stream_worker(3).process_window().await.unwrap();

    pipeline.log.append(&fixtures::normalized(
        "2023-04-0001",
        "Food",
        (2023, 4, 2),
        None,
        None,
    ));
    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.start_offset, 1);
    assert_eq!(report.consumed, 1);

    let batches = pipeline.sink.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[1].rows[0].product_category.as_deref(), Some("Food"));
}

/// Source → ingest → transport → stream → sink.
#[tokio::test]
async fn test_full_pipeline() {
    let pipeline = TestPipeline::new(fixtures::raw_records(10));
    pipeline.publisher.fail_on(fixtures::reference_sheet(5));

    pipeline.ingest_loop(10).run_once().await.unwrap();
    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.consumed, 9);

    let batches = pipeline.sink.batches();
    assert_eq!(batches.len(), 1);
    let row = &batches[0].rows[0];
    assert_eq!(row.product_category.as_deref(), Some("Toys"));
    assert_eq!(row.month, month(2023, 3));
    assert_eq!(row.total_recalls, 9);
    assert_eq!(row.total_compensations, 9);
    assert_eq!(row.total_high_risks, 0);
    assert_eq!(row.monthly_recalls, Some(9));
}

/// The running worker finishes pending windows and stops on shutdown.
#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));

    let worker = std::sync::Arc::new(pipeline.stream_worker(3));
    let (tx, rx) = watch::channel(false);
    let handle = {
        let worker = worker.clone();
        tokio::spawn(async move { worker.run(rx).await })
    };

    for _ in 0..200 {
        if !pipeline.sink.batches().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tx.send(true).unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop")
        .unwrap();
    assert!(result.is_ok());
    assert_eq!(pipeline.sink.batches().len(), 1);
    assert_eq!(pipeline.sink_offset().await, 1);
}

/// One group split across two fetches: the second window's row carries
/// the totals of both records.
#[tokio::test]
async fn test_group_spanning_fetches() {
    let pipeline = TestPipeline::new(Vec::new()).with_fetch_size(1);
    let short = fixtures::text_of_len(50);
    let long = fixtures::text_of_len(150);
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        Some(&short),
        Some("Refund"),
    ));
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0002",
        "Toys",
        (2023, 3, 20),
        Some(&long),
        None,
    ));

    let worker = pipeline.stream_worker(3);
    let first = worker.process_window().await.unwrap().unwrap();
    assert_eq!(first.consumed, 1);
    let second = worker.process_window().await.unwrap().unwrap();
    assert_eq!(second.consumed, 1);
    assert_eq!(second.accumulated, 2);

    let batches = pipeline.sink.batches();
    assert_eq!(batches.len(), 2);
    assert_eq!(batches[0].rows[0].total_recalls, 1);

    let row = &batches[1].rows[0];
    assert_eq!(row.total_recalls, 2);
    assert_eq!(row.total_high_risks, 1);
    assert_eq!(row.total_compensations, 1);
    assert_eq!(row.average_risk_length, Some(100.0));
    assert_eq!(row.monthly_recalls, Some(2));
    assert_eq!(row.monthly_high_risks, Some(1));
    assert_eq!(pipeline.sink.latest_rows(), vec![row.clone()]);
}

/// A record delivered again in a later fetch is not counted twice.
#[tokio::test]
async fn test_redelivery_in_later_fetch_counts_once() {
    let pipeline = TestPipeline::new(Vec::new()).with_fetch_size(1);
    let record = fixtures::normalized("2023-03-0001", "Toys", (2023, 3, 2), None, None);
    pipeline.log.append(&record);
    pipeline.log.append(&record);

    let worker = pipeline.stream_worker(3);
    worker.process_window().await.unwrap().unwrap();
    let second = worker.process_window().await.unwrap().unwrap();

    assert_eq!(second.duplicates, 1);
    assert_eq!(second.rows_written, 0);
    assert_eq!(pipeline.sink_offset().await, 2);

    let total: u64 = pipeline
        .sink
        .batches()
        .iter()
        .flat_map(|batch| &batch.rows)
        .map(|row| row.total_recalls)
        .sum();
    assert_eq!(total, 1);
    assert_eq!(pipeline.sink.latest_rows()[0].total_recalls, 1);
}

/// Running totals survive a restart between fetches.
#[tokio::test]
async fn test_restart_keeps_running_totals() {
    let pipeline = TestPipeline::new(Vec::new()).with_fetch_size(1);
    for n in 1..=2 {
        pipeline.log.append(&fixtures::normalized(
            &fixtures::reference_sheet(n),
            "Food",
            (2023, 5, 10),
            None,
            None,
        ));
    }

    pipeline.stream_worker(3).process_window().await.unwrap();
    assert_eq!(pipeline.sink_state().await.accumulated.len(), 1);

    let restarted = pipeline.stream_worker(3);
    let report = restarted.process_window().await.unwrap().unwrap();
    assert_eq!(report.start_offset, 1);
    assert_eq!(pipeline.sink.latest_rows()[0].total_recalls, 2);
    assert_eq!(pipeline.sink.high_water_reads(), 2);
}

/// A window written but never checkpointed is written again on restart
/// with the same totals, not added on top.
#[tokio::test]
async fn test_uncommitted_window_replayed() {
    let pipeline = TestPipeline::new(Vec::new());
    pipeline.log.append(&fixtures::normalized(
        "2023-03-0001",
        "Toys",
        (2023, 3, 2),
        None,
        None,
    ));

    // The sink holds the window; the checkpoint never recorded it.
    pipeline.stream_worker(3).process_window().await.unwrap();
    std::fs::remove_file(pipeline.sink_checkpoint_path()).unwrap();

    let report = pipeline.stream_worker(3).process_window().await.unwrap().unwrap();
    assert_eq!(report.start_offset, 0);
    assert_eq!(pipeline.sink.batches().len(), 2);
    assert_eq!(pipeline.sink_offset().await, 1);
    assert_eq!(pipeline.sink.latest_rows()[0].total_recalls, 1);
}

/// The same log read in fetches of three gives the totals of a single fetch.
#[tokio::test]
async fn test_full_pipeline_in_small_fetches() {
    let pipeline = TestPipeline::new(fixtures::raw_records(10)).with_fetch_size(3);
    pipeline.publisher.fail_on(fixtures::reference_sheet(5));

    pipeline.ingest_loop(10).run_once().await.unwrap();

    let worker = pipeline.stream_worker(3);
    let mut windows = 0;
    while worker.process_window().await.unwrap().is_some() {
        windows += 1;
    }
    assert_eq!(windows, 3);
    assert_eq!(pipeline.sink_offset().await, 9);

    let latest = pipeline.sink.latest_rows();
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].total_recalls, 9);
    assert_eq!(latest[0].total_compensations, 9);
    assert_eq!(latest[0].monthly_recalls, Some(9));
}
