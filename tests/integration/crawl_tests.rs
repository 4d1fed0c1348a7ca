//! Integration tests for the crawler
//!
//! Most tests drive the coordinator with a scripted in-memory renderer so
//! every page, failure and cancellation is deterministic. The last test runs
//! the full stack against a wiremock server.

use async_trait::async_trait;
use metallum_crawler::config::{parse_config, Config};
use metallum_crawler::crawler::{Coordinator, CrawlResult, FailureReason};
use metallum_crawler::render::{
    build_http_client, HttpSession, PageSnapshot, Renderer, SessionRenderer,
};
use metallum_crawler::sink::{
    CsvSink, ExistingRecords, RecordSink, SinkError, SinkResult, SinkRow, SqliteSink, CSV_HEADER,
};
use metallum_crawler::storage::{RunStatus, SqliteStorage, Storage};
use metallum_crawler::{CrawlerError, Partition, RenderError, RenderErrorKind, SessionError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

/// Builds a listing page with one row per band name
fn listing(names: &[&str]) -> String {
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr><td><a href="/bands/{0}">{0}</a></td><td>Sweden</td><td>Death Metal</td><td><span class="active">Active</span></td></tr>"#,
                name
            )
        })
        .collect();
    format!(
        r#"<html><body><table id="bandListAlpha"><thead><tr><th>Band</th></tr></thead><tbody>{}</tbody></table></body></html>"#,
        rows
    )
}

/// Pages and scripted failures shared by every renderer of a test
#[derive(Default)]
struct Script {
    /// Partition label to its pages, each a list of band names
    pages: HashMap<&'static str, Vec<Vec<&'static str>>>,

    /// Partition label to the error kind and number of failing loads
    load_failures: HashMap<&'static str, (RenderErrorKind, u32)>,

    /// Cancels this token when the given partition advances past page 1
    cancel_on_advance: Option<(&'static str, CancellationToken)>,
}

impl Script {
    fn with_pages(pages: &[(&'static str, Vec<Vec<&'static str>>)]) -> Self {
        Self {
            pages: pages.iter().cloned().collect(),
            ..Self::default()
        }
    }
}

/// Renderer that serves a `Script` and logs every call
struct ScriptedRenderer {
    script: Arc<Script>,
    failed_loads: HashMap<String, u32>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedRenderer {
    fn new(script: Arc<Script>, calls: Arc<Mutex<Vec<String>>>) -> Self {
        Self {
            script,
            failed_loads: HashMap::new(),
            calls,
        }
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn load_partition(&mut self, partition: &Partition) -> Result<PageSnapshot, RenderError> {
        self.log(format!("load {}", partition));

        if let Some((kind, times)) = self.script.load_failures.get(partition.label()) {
            let failed = self.failed_loads.entry(partition.label().to_string()).or_insert(0);
            if *failed < *times {
                *failed += 1;
                return Err(RenderError::new(*kind, "scripted failure", partition, 1));
            }
        }

        let pages = self.script.pages.get(partition.label()).ok_or_else(|| {
            RenderError::new(
                RenderErrorKind::StructuralMismatch,
                "unknown partition",
                partition,
                1,
            )
        })?;
        let first = pages.first().map(|names| listing(names)).unwrap_or_else(|| listing(&[]));
        Ok(PageSnapshot::new(partition.clone(), 1, first))
    }

    async fn advance_page(
        &mut self,
        current: &PageSnapshot,
    ) -> Result<Option<PageSnapshot>, RenderError> {
        self.log(format!("advance {} {}", current.partition, current.page_index));

        if let Some((label, token)) = &self.script.cancel_on_advance {
            if current.partition.label() == *label {
                token.cancel();
            }
        }

        let pages = &self.script.pages[current.partition.label()];
        Ok(pages.get(current.page_index as usize).map(|names| {
            PageSnapshot::new(current.partition.clone(), current.page_index + 1, listing(names))
        }))
    }

    async fn close(&mut self) -> Result<(), SessionError> {
        self.log("close".to_string());
        Ok(())
    }
}

/// Creates a test configuration over the given partitions
fn create_test_config(dir: &TempDir, partitions: &[&str], extra_output: &str) -> Config {
    let labels: Vec<String> = partitions.iter().map(|p| format!("\"{}\"", p)).collect();
    let db_path = dir.path().join("crawl.db");
    let toml = format!(
        r#"
[crawler]
base-url = "https://catalog.test/lists/"
partitions = [{labels}]
page-load-timeout-ms = 1000
politeness-delay-ms = 0
max-retries = 3
max-pages-per-partition = 50
poll-interval-ms = 10

[retry]
base-delay-ms = 1
multiplier = 1.0
max-delay-ms = 2
jitter = false

[user-agent]
crawler-name = "TestBot"
crawler-version = "1.0.0"
contact-url = "https://example.com/contact"
contact-email = "test@example.com"

[output]
database-path = "{db}"
{extra_output}
"#,
        labels = labels.join(", "),
        db = db_path.display(),
        extra_output = extra_output,
    );
    parse_config(&toml).unwrap()
}

async fn crawl(
    config: &Config,
    script: &Arc<Script>,
    resume: bool,
    cancel: CancellationToken,
) -> (CrawlResult, Vec<String>) {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let renderers: Vec<ScriptedRenderer> = (0..config.crawler.sessions)
        .map(|_| ScriptedRenderer::new(Arc::clone(script), Arc::clone(&calls)))
        .collect();

    let coordinator = Coordinator::new(config.clone(), "test-hash", resume, cancel).unwrap();
    let result = coordinator.run(renderers).await.unwrap();

    let calls = calls.lock().unwrap().clone();
    (result, calls)
}

fn count_calls(calls: &[String], call: &str) -> usize {
    calls.iter().filter(|c| c.as_str() == call).count()
}

fn stored_keys(config: &Config) -> Vec<String> {
    let mut sink = SqliteSink::open(Path::new(&config.output.database_path)).unwrap();
    let mut keys: Vec<String> = sink.load_existing().unwrap().keys.into_iter().collect();
    keys.sort();
    keys
}

fn abc_script() -> Script {
    Script::with_pages(&[
        ("A", vec![vec!["X", "Y", "Z"], vec!["X", "W", "V"]]),
        ("B", vec![vec!["Q"]]),
    ])
}

#[tokio::test]
async fn test_end_to_end_dedups_across_pages() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let script = Arc::new(abc_script());

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.total_records, 6);
    assert_eq!(result.new_records, 6);
    assert_eq!(result.duplicates, 1);
    assert_eq!(result.pages, 3);
    assert_eq!(result.count_for(&Partition::letter('A')), Some(5));
    assert_eq!(result.count_for(&Partition::letter('B')), Some(1));
    assert_eq!(
        result.per_partition_counts.iter().map(|(p, _)| p.label()).collect::<Vec<_>>(),
        vec!["A", "B"]
    );

    assert_eq!(stored_keys(&config), vec!["q", "v", "w", "x", "y", "z"]);
    assert_eq!(count_calls(&calls, "close"), 1);
}

#[tokio::test]
async fn test_pagination_stops_on_last_page() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["C"], "");
    let script = Arc::new(Script::with_pages(&[(
        "C",
        vec![vec!["C1"], vec!["C2"], vec!["C3"]],
    )]));

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(result.total_records, 3);
    assert_eq!(
        calls,
        vec!["load C", "advance C 1", "advance C 2", "advance C 3", "close"]
    );
}

#[tokio::test]
async fn test_retry_exhaustion_fails_partition() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let mut script = abc_script();
    script
        .load_failures
        .insert("A", (RenderErrorKind::Timeout, u32::MAX));
    let script = Arc::new(script);

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert_eq!(count_calls(&calls, "load A"), 3);
    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.partition, Partition::letter('A'));
    assert_eq!(failure.reason, FailureReason::Render(RenderErrorKind::Timeout));
    assert_eq!(failure.attempts, 3);

    // The next partition is unaffected
    assert_eq!(result.count_for(&Partition::letter('B')), Some(1));
    assert_eq!(result.total_records, 1);
    assert!(!result.is_success());
}

#[tokio::test]
async fn test_transient_failures_recover() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["B"], "");
    let mut script = abc_script();
    script
        .load_failures
        .insert("B", (RenderErrorKind::TransientNetwork, 2));
    let script = Arc::new(script);

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(count_calls(&calls, "load B"), 3);
    assert_eq!(result.total_records, 1);
}

#[tokio::test]
async fn test_structural_mismatch_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let mut script = abc_script();
    script
        .load_failures
        .insert("A", (RenderErrorKind::StructuralMismatch, u32::MAX));
    let script = Arc::new(script);

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert_eq!(count_calls(&calls, "load A"), 1);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(
        result.failures[0].reason,
        FailureReason::Render(RenderErrorKind::StructuralMismatch)
    );
    assert_eq!(result.failures[0].attempts, 1);
}

#[tokio::test]
async fn test_failure_isolated_to_its_partition() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "M", "B"], "");
    let mut script = abc_script();
    script.pages.insert("M", vec![vec!["Mayhem"]]);
    script
        .load_failures
        .insert("M", (RenderErrorKind::TransientNetwork, u32::MAX));
    let script = Arc::new(script);

    let (result, _) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].partition.label(), "M");
    assert_eq!(result.count_for(&Partition::letter('A')), Some(5));
    assert_eq!(result.count_for(&Partition::letter('M')), Some(0));
    assert_eq!(result.count_for(&Partition::letter('B')), Some(1));
    assert_eq!(result.total_records, 6);

    // Failures are recorded with the run
    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let stored = storage.get_failures(result.run_id).unwrap();
    assert_eq!(stored, result.failures);
}

#[tokio::test]
async fn test_page_ceiling_fails_partition() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, &["D"], "");
    config.crawler.max_pages_per_partition = 2;
    let script = Arc::new(Script::with_pages(&[(
        "D",
        vec![vec!["D1"], vec!["D2"], vec!["D3"], vec!["D4"]],
    )]));

    let (result, _) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].reason, FailureReason::PaginationLoopSuspected);
    assert_eq!(result.total_records, 2);
}

#[tokio::test]
async fn test_resume_after_completion_adds_nothing() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let script = Arc::new(abc_script());

    let (first, _) = crawl(&config, &script, true, CancellationToken::new()).await;
    let (second, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert_eq!(first.total_records, 6);
    assert_eq!(second.total_records, 6);
    assert_eq!(second.new_records, 0);
    assert_eq!(second.count_for(&Partition::letter('A')), Some(5));
    assert_ne!(first.run_id, second.run_id);

    // Completed partitions are never loaded again
    assert_eq!(calls, vec!["close"]);
    assert_eq!(stored_keys(&config).len(), 6);
}

#[tokio::test]
async fn test_resume_retries_failed_partition() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");

    let mut broken = abc_script();
    broken
        .load_failures
        .insert("B", (RenderErrorKind::TransientNetwork, u32::MAX));
    let (first, _) = crawl(&config, &Arc::new(broken), true, CancellationToken::new()).await;
    assert_eq!(first.failures.len(), 1);
    assert_eq!(first.total_records, 5);

    let (second, calls) = crawl(&config, &Arc::new(abc_script()), true, CancellationToken::new()).await;

    assert!(second.is_success());
    assert_eq!(count_calls(&calls, "load A"), 0);
    assert_eq!(count_calls(&calls, "load B"), 1);
    assert_eq!(second.total_records, 6);
    assert_eq!(second.new_records, 1);
}

#[tokio::test]
async fn test_fresh_run_discards_previous_state() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let script = Arc::new(abc_script());

    crawl(&config, &script, true, CancellationToken::new()).await;
    let (fresh, calls) = crawl(&config, &script, false, CancellationToken::new()).await;

    assert_eq!(count_calls(&calls, "load A"), 1);
    assert_eq!(fresh.total_records, 6);
    assert_eq!(fresh.new_records, 6);
    assert_eq!(stored_keys(&config).len(), 6);
}

#[tokio::test]
async fn test_cancellation_then_resume() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");

    let cancel = CancellationToken::new();
    let mut script = abc_script();
    script.cancel_on_advance = Some(("A", cancel.clone()));
    let (interrupted, calls) = crawl(&config, &Arc::new(script), true, cancel).await;

    assert!(interrupted.cancelled);
    assert!(!interrupted.is_success());
    assert_eq!(count_calls(&calls, "load B"), 0);
    assert_eq!(count_calls(&calls, "close"), 1);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let checkpoints = storage.load_checkpoints().unwrap();
    assert!(checkpoints.iter().all(|c| !c.state.completed));

    let (resumed, _) = crawl(&config, &Arc::new(abc_script()), true, CancellationToken::new()).await;

    assert!(resumed.is_success());
    assert!(!resumed.cancelled);
    assert_eq!(resumed.total_records, 6);
    assert_eq!(stored_keys(&config).len(), 6);
}

#[tokio::test]
async fn test_parallel_sessions_cover_every_partition() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, &["A", "B", "C", "D"], "");
    config.crawler.sessions = 2;
    let mut script = abc_script();
    script.pages.insert("C", vec![vec!["Cult of Luna"], vec!["Candlemass"]]);
    script.pages.insert("D", vec![vec!["Dissection", "Q"]]);
    let script = Arc::new(script);

    let (result, calls) = crawl(&config, &script, true, CancellationToken::new()).await;

    assert!(result.is_success());
    assert_eq!(count_calls(&calls, "close"), 2);
    // "Q" is listed under both B and D and stored once
    assert_eq!(result.total_records, 9);
    assert_eq!(result.duplicates, 2);
    assert_eq!(
        result.per_partition_counts.iter().map(|(p, _)| p.label()).collect::<Vec<_>>(),
        vec!["A", "B", "C", "D"]
    );
}

#[tokio::test]
async fn test_csv_sink() {
    let dir = TempDir::new().unwrap();
    let csv_path = dir.path().join("bands.csv");
    let config = create_test_config(
        &dir,
        &["A", "B"],
        &format!("csv-path = \"{}\"", csv_path.display()),
    );
    let script = Arc::new(abc_script());

    let (result, _) = crawl(&config, &script, true, CancellationToken::new()).await;
    assert_eq!(result.total_records, 6);

    let content = std::fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 7);
    assert_eq!(lines[0], CSV_HEADER.join(","));
    assert_eq!(lines[1], "1,X,Sweden,Death Metal,Active");

    // A resumed run re-reads the file and appends nothing
    let (again, _) = crawl(&config, &script, true, CancellationToken::new()).await;
    assert_eq!(again.new_records, 0);

    let mut sink = CsvSink::open(&csv_path).unwrap();
    let existing = sink.load_existing().unwrap();
    assert_eq!(existing.keys.len(), 6);
    assert_eq!(existing.max_sequence, 6);
}

/// Sink that accepts a fixed number of batches, then fails every append
struct FlakySink {
    accepted: Arc<Mutex<Vec<SinkRow>>>,
    batches_before_failure: usize,
}

impl RecordSink for FlakySink {
    fn load_existing(&mut self) -> SinkResult<ExistingRecords> {
        Ok(ExistingRecords::default())
    }

    fn append(&mut self, rows: &[SinkRow]) -> SinkResult<()> {
        if self.batches_before_failure == 0 {
            return Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "no space left on device",
            )));
        }
        self.batches_before_failure -= 1;
        self.accepted.lock().unwrap().extend_from_slice(rows);
        Ok(())
    }

    fn reset(&mut self) -> SinkResult<()> {
        self.accepted.lock().unwrap().clear();
        Ok(())
    }

    fn describe(&self) -> String {
        "flaky".to_string()
    }
}

#[tokio::test]
async fn test_sink_failure_halts_run() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir, &["A", "B"], "");
    let script = Arc::new(abc_script());
    let calls = Arc::new(Mutex::new(Vec::new()));
    let accepted = Arc::new(Mutex::new(Vec::new()));

    let sink = FlakySink {
        accepted: Arc::clone(&accepted),
        batches_before_failure: 1,
    };
    let coordinator = Coordinator::with_sink(
        config.clone(),
        Box::new(sink),
        "test-hash",
        true,
        CancellationToken::new(),
    )
    .unwrap();
    let renderer = ScriptedRenderer::new(Arc::clone(&script), Arc::clone(&calls));

    let error = coordinator.run(vec![renderer]).await.unwrap_err();
    match error {
        CrawlerError::SinkWrite {
            reason,
            last_checkpoint,
        } => {
            assert!(reason.contains("no space left"));
            assert_eq!(last_checkpoint, "partition A page 1 (3 records)");
        }
        other => panic!("unexpected error: {}", other),
    }

    // Only page 1 of A reached the sink, and B was never started
    assert_eq!(accepted.lock().unwrap().len(), 3);
    let calls = calls.lock().unwrap().clone();
    assert_eq!(count_calls(&calls, "load B"), 0);
    assert_eq!(count_calls(&calls, "close"), 1);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.finished_at.is_some());

    let checkpoints = storage.load_checkpoints().unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].state.page_index, 1);
    assert!(!checkpoints[0].state.completed);
}

fn http_listing(names: &[&str], next_href: Option<&str>) -> String {
    let rows: String = names
        .iter()
        .map(|name| {
            format!(
                r#"<tr class="odd"><td><a href="/bands/{0}/1">{0}</a></td><td>Norway</td><td>Black Metal</td><td><span class="split_up">Split-up</span></td></tr>"#,
                name
            )
        })
        .collect();
    let next = match next_href {
        Some(href) => format!(
            r#"<a class="paginate_button next" id="bandListAlpha_next" href="{}">Next</a>"#,
            href
        ),
        None => r#"<a class="paginate_button next paginate_button_disabled" id="bandListAlpha_next">Next</a>"#
            .to_string(),
    };
    format!(
        r#"<html><body><div class="dataTables_wrapper"><table id="bandListAlpha"><tbody>{}</tbody></table><div class="dataTables_paginate">{}</div></div></body></html>"#,
        rows, next
    )
}

#[tokio::test]
async fn test_full_stack_http_crawl() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/lists/A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(http_listing(&["Abigor", "Arcturus"], Some("/lists/A/2"))),
        )
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/lists/A/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(http_listing(&["Ancient"], None)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/lists/B"))
        .respond_with(ResponseTemplate::new(200).set_body_string(http_listing(&["Burzum"], None)))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/lists/C"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir, &["A", "B", "C"], "");
    config.crawler.base_url = format!("{}/lists/", mock_server.uri());

    let client = build_http_client(&config.user_agent, config.crawler.page_load_timeout()).unwrap();
    let session = HttpSession::new(
        client,
        config.crawler.poll_interval(),
        config.crawler.politeness_delay(),
    );
    let renderer = SessionRenderer::from_config(session, &config).unwrap();

    let coordinator =
        Coordinator::new(config.clone(), "test-hash", true, CancellationToken::new()).unwrap();
    let result = coordinator.run(vec![renderer]).await.unwrap();

    assert_eq!(result.total_records, 4);
    assert_eq!(result.count_for(&Partition::letter('A')), Some(3));
    assert_eq!(result.count_for(&Partition::letter('B')), Some(1));

    // A 404 is structural: one attempt, partition failed
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].partition.label(), "C");
    assert_eq!(
        result.failures[0].reason,
        FailureReason::Render(RenderErrorKind::StructuralMismatch)
    );
    assert_eq!(result.failures[0].attempts, 1);

    let mut sink = SqliteSink::open(Path::new(&config.output.database_path)).unwrap();
    let existing = sink.load_existing().unwrap();
    assert!(existing.keys.contains("arcturus"));
    assert_eq!(existing.per_partition.unwrap().get("A"), Some(&3));
}

/// Serves page 2 of A without its listing for the first `broken` requests
async fn mount_slow_second_page(mock_server: &MockServer, broken: u64) {
    Mock::given(method("GET"))
        .and(path("/lists/A"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string(http_listing(&["Abigor", "Arcturus"], Some("/lists/A/2"))),
        )
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/lists/A/2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("<html><body><p>Loading...</p></body></html>"),
        )
        .up_to_n_times(broken)
        .mount(mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/lists/A/2"))
        .respond_with(ResponseTemplate::new(200).set_body_string(http_listing(&["Ancient"], None)))
        .mount(mock_server)
        .await;
}

async fn crawl_over_http(mock_server: &MockServer, dir: &TempDir) -> (Config, CrawlResult) {
    let mut config = create_test_config(dir, &["A"], "");
    config.crawler.base_url = format!("{}/lists/", mock_server.uri());
    config.crawler.page_load_timeout_ms = 200;
    config.crawler.poll_interval_ms = 50;

    let client = build_http_client(&config.user_agent, config.crawler.page_load_timeout()).unwrap();
    let session = HttpSession::new(
        client,
        config.crawler.poll_interval(),
        config.crawler.politeness_delay(),
    );
    let renderer = SessionRenderer::from_config(session, &config).unwrap();

    let coordinator =
        Coordinator::new(config.clone(), "test-hash", true, CancellationToken::new()).unwrap();
    let result = coordinator.run(vec![renderer]).await.unwrap();
    (config, result)
}

async fn requests_to(mock_server: &MockServer, route: &str) -> usize {
    mock_server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request: &&Request| request.url.path() == route)
        .count()
}

#[tokio::test]
async fn test_unrendered_next_page_fails_partition_instead_of_ending_it() {
    let mock_server = MockServer::start().await;
    mount_slow_second_page(&mock_server, 25).await;

    let dir = TempDir::new().unwrap();
    let (config, result) = crawl_over_http(&mock_server, &dir).await;

    assert_eq!(result.failures.len(), 1);
    let failure = &result.failures[0];
    assert_eq!(failure.partition, Partition::letter('A'));
    assert_eq!(failure.reason, FailureReason::Render(RenderErrorKind::Timeout));
    assert_eq!(failure.attempts, 3);
    assert_eq!(failure.page_index, 2);
    assert_eq!(result.count_for(&Partition::letter('A')), Some(2));

    // Every retry went back to page 1 before clicking again
    assert_eq!(requests_to(&mock_server, "/lists/A").await, 3);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let checkpoints = storage.load_checkpoints().unwrap();
    assert_eq!(checkpoints.len(), 1);
    assert_eq!(checkpoints[0].state.page_index, 1);
    assert!(!checkpoints[0].state.completed);
}

#[tokio::test]
async fn test_next_page_rendered_on_retry_is_committed() {
    let mock_server = MockServer::start().await;
    mount_slow_second_page(&mock_server, 6).await;

    let dir = TempDir::new().unwrap();
    let (_, result) = crawl_over_http(&mock_server, &dir).await;

    assert!(result.is_success());
    assert_eq!(result.total_records, 3);
    assert_eq!(result.count_for(&Partition::letter('A')), Some(3));
    assert!(requests_to(&mock_server, "/lists/A").await >= 2);
}
