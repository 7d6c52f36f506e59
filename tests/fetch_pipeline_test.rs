/// Fetch pipeline against an in-memory page standing in for the browser.
use anyhow::anyhow;
use async_trait::async_trait;
use chat_extractor::browser_manager::PageDriver;
use chat_extractor::operator::{AutoGate, VerificationError, VerificationGate};
use chat_extractor::tools::consolidate::consolidate;
use chat_extractor::tools::fetch::relocate_pdf;
use chat_extractor::{
    fetch_chat, ExtractorConfig, FetchError, FetchRequest, OutputFormat, RawPagePolicy,
    Transcript, Role,
};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_test::assert_ok;

const URL: &str = "https://claude.ai/share/0000-test";

#[derive(Default)]
struct Log {
    calls: Vec<String>,
    closed: bool,
}

struct FakePage {
    turns: Value,
    code: Value,
    html: String,
    navigation_fails: bool,
    code_query_fails: bool,
    log: Arc<Mutex<Log>>,
}

impl FakePage {
    fn new(log: Arc<Mutex<Log>>) -> Self {
        Self {
            turns: json!([
                {"index": 0, "text": "  How do I reverse a list in Python?  ", "className": "", "hasUserMarker": true},
                {"index": 1, "text": "Use slicing, or the built-in reversed().", "className": "font-claude"},
                {"index": 2, "text": "thanks!", "className": "", "hasUserMarker": true},
                {"index": 3, "text": "Can you show JavaScript too?", "className": "user-bubble"}
            ]),
            code: json!([
                {"index": 0, "text": "items = [1, 2, 3]\nprint(items[::-1])\nprint(list(reversed(items)))\n", "className": "language-python"},
                {"index": 1, "text": "x = 1", "className": "language-python"},
                {"index": 2, "text": "const items = [1, 2, 3];\nconsole.log([...items].reverse());\n", "className": "language-javascript"}
            ]),
            html: "<html><body>saved</body></html>".to_string(),
            navigation_fails: false,
            code_query_fails: false,
            log,
        }
    }

    fn record(&self, call: &str) {
        self.log.lock().unwrap().calls.push(call.to_string());
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn navigate(&mut self, url: &str, _timeout: Duration) -> anyhow::Result<()> {
        self.record("navigate");
        assert_eq!(url, URL);
        if self.navigation_fails {
            return Err(anyhow!("navigation timed out"));
        }
        Ok(())
    }

    async fn evaluate(&mut self, script: &str) -> anyhow::Result<Value> {
        if script.contains("turnSel") {
            self.record("turns");
            Ok(self.turns.clone())
        } else if script.contains("codeSel") {
            self.record("code");
            if self.code_query_fails {
                return Err(anyhow!("execution context was destroyed"));
            }
            Ok(self.code.clone())
        } else {
            self.record("scroll");
            Ok(Value::Null)
        }
    }

    async fn content(&mut self) -> anyhow::Result<String> {
        self.record("content");
        Ok(self.html.clone())
    }

    async fn print_pdf(&mut self) -> anyhow::Result<Vec<u8>> {
        self.record("pdf");
        Ok(b"%PDF-1.4 fake".to_vec())
    }

    async fn pause(&mut self, _duration: Duration) {
        self.record("pause");
    }

    async fn close(&mut self) -> anyhow::Result<()> {
        self.record("close");
        self.log.lock().unwrap().closed = true;
        Ok(())
    }
}

struct CancellingGate;

#[async_trait]
impl VerificationGate for CancellingGate {
    async fn wait_for_clearance(&self, _url: &str) -> Result<(), VerificationError> {
        Err(VerificationError::Cancelled)
    }
}

fn request(work_dir: &Path, format: OutputFormat, raw_page: RawPagePolicy) -> FetchRequest {
    FetchRequest {
        url: URL.to_string(),
        work_dir: work_dir.to_path_buf(),
        format,
        raw_page,
    }
}

fn config() -> ExtractorConfig {
    ExtractorConfig {
        settle_delay_ms: Some(0),
        ..Default::default()
    }
}

fn read_transcript(work_dir: &Path) -> Transcript {
    let raw = std::fs::read_to_string(work_dir.join("conversation.json")).unwrap();
    serde_json::from_str(&raw).unwrap()
}

#[tokio::test]
async fn markdown_fetch_writes_filtered_intermediates() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("scratch");
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());

    let outcome = assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(&work, OutputFormat::Markdown, RawPagePolicy::Transient),
        )
        .await
    );

    assert_eq!(outcome.metadata.message_count, 3);
    assert_eq!(outcome.metadata.url, URL);
    assert_eq!(outcome.artifact_count, 2);
    assert_eq!(outcome.work_dir, work);

    let transcript = read_transcript(&work);
    let roles: Vec<Role> = transcript.messages.iter().map(|t| t.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
    let indices: Vec<usize> = transcript.messages.iter().map(|t| t.index).collect();
    assert_eq!(indices, vec![0, 1, 3]);
    assert_eq!(transcript.messages[0].content, "How do I reverse a list in Python?");
    assert!(transcript.messages.iter().all(|t| t.content != "thanks!"));

    let md = std::fs::read_to_string(work.join("conversation.md")).unwrap();
    assert_eq!(md.matches("### 👤 **User**").count(), 2);
    assert_eq!(md.matches("### 🤖 **Claude**").count(), 1);
    assert!(!md.contains("thanks!"));

    assert!(work.join("artifact_code_0.py").exists());
    assert!(!work.join("artifact_code_1.py").exists());
    assert!(work.join("artifact_code_2.js").exists());

    assert!(!work.join("chat_complete.html").exists());
    assert!(!work.join("chat.pdf").exists());

    let log = log.lock().unwrap();
    assert!(log.closed);
    assert_eq!(
        log.calls,
        vec!["navigate", "scroll", "pause", "turns", "content", "code", "close"]
    );
}

#[tokio::test]
async fn navigation_failure_is_not_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());
    page.navigation_fails = true;

    let outcome = assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(tmp.path(), OutputFormat::Markdown, RawPagePolicy::Transient),
        )
        .await
    );
    assert_eq!(outcome.metadata.message_count, 3);
    assert!(log.lock().unwrap().closed);
}

#[tokio::test]
async fn raw_page_policies() {
    let keep = tempfile::tempdir().unwrap();
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));
    assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(keep.path(), OutputFormat::Markdown, RawPagePolicy::Keep),
        )
        .await
    );
    assert_eq!(
        std::fs::read_to_string(keep.path().join("chat_complete.html")).unwrap(),
        "<html><body>saved</body></html>"
    );

    let skip = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());
    assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(skip.path(), OutputFormat::Markdown, RawPagePolicy::Skip),
        )
        .await
    );
    assert!(!skip.path().join("chat_complete.html").exists());
    assert!(!log.lock().unwrap().calls.iter().any(|c| c == "content"));
}

#[tokio::test]
async fn pdf_format_renders_before_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());

    assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(tmp.path(), OutputFormat::Pdf, RawPagePolicy::Transient),
        )
        .await
    );

    assert_eq!(
        std::fs::read(tmp.path().join("chat.pdf")).unwrap(),
        b"%PDF-1.4 fake"
    );
    let calls = log.lock().unwrap().calls.clone();
    let pdf = calls.iter().position(|c| c == "pdf").unwrap();
    let turns = calls.iter().position(|c| c == "turns").unwrap();
    assert!(pdf < turns);
}

#[tokio::test]
async fn failed_code_query_still_closes_browser() {
    let tmp = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());
    page.code_query_fails = true;

    let err = fetch_chat(
        &mut page,
        &AutoGate,
        &config(),
        &request(tmp.path(), OutputFormat::Markdown, RawPagePolicy::Transient),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Script(_)));
    assert!(!err.is_cancellation());
    assert!(log.lock().unwrap().closed);
    // The transcript is persisted before artifacts are queried.
    assert!(tmp.path().join("conversation.json").exists());
}

#[tokio::test]
async fn cancelled_gate_stops_before_extraction() {
    let tmp = tempfile::tempdir().unwrap();
    let log = Arc::new(Mutex::new(Log::default()));
    let mut page = FakePage::new(log.clone());

    let err = fetch_chat(
        &mut page,
        &CancellingGate,
        &config(),
        &request(tmp.path(), OutputFormat::Markdown, RawPagePolicy::Transient),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation());
    let log = log.lock().unwrap();
    assert!(log.closed);
    assert!(!log.calls.iter().any(|c| c == "turns"));
    assert!(!tmp.path().join("conversation.json").exists());
}

#[tokio::test]
async fn fetch_then_consolidate_reports_message_count() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("scratch");
    let output = tmp.path().join("consolidated_chat.md");
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));

    let outcome = assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(&work, OutputFormat::Markdown, RawPagePolicy::Transient),
        )
        .await
    );
    assert_ok!(consolidate(&outcome.work_dir, &output, false).await);

    let doc = std::fs::read_to_string(&output).unwrap();
    assert!(doc.contains("**Messages**: 3"));
    assert!(doc.contains(&format!("**Source**: {}", URL)));
    assert!(doc.contains("- [Artifact 0](#artifact-0)\n- [Artifact 2](#artifact-2)"));
    assert!(doc.contains("```python\nitems = [1, 2, 3]"));
    assert!(doc.contains("```js\nconst items"));

    assert!(!work.join("conversation.md").exists());
    assert!(!work.join("artifact_code_0.py").exists());
    assert!(work.join("conversation.json").exists());
}

#[tokio::test]
async fn reused_work_dir_only_holds_the_latest_chat() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("scratch");

    let mut first = FakePage::new(Arc::new(Mutex::new(Log::default())));
    assert_ok!(
        fetch_chat(
            &mut first,
            &AutoGate,
            &config(),
            &request(&work, OutputFormat::Markdown, RawPagePolicy::Transient),
        )
        .await
    );
    // Retain everything, as --keep-artifacts would.
    assert_ok!(consolidate(&work, &tmp.path().join("first.md"), true).await);
    assert!(work.join("artifact_code_2.js").exists());

    let mut second = FakePage::new(Arc::new(Mutex::new(Log::default())));
    second.turns = json!([
        {"index": 0, "text": "A different conversation entirely.", "className": "", "hasUserMarker": true}
    ]);
    second.code = json!([
        {"index": 0, "text": "fn main() {\n    println!(\"the second chat reuses artifact slot zero\");\n}\n", "className": "language-rust"}
    ]);
    let outcome = assert_ok!(
        fetch_chat(
            &mut second,
            &AutoGate,
            &config(),
            &request(&work, OutputFormat::Markdown, RawPagePolicy::Transient),
        )
        .await
    );
    assert_eq!(outcome.artifact_count, 1);
    assert!(!work.join("artifact_code_0.py").exists());
    assert!(!work.join("artifact_code_2.js").exists());

    let output = tmp.path().join("second.md");
    let summary = assert_ok!(consolidate(&work, &output, false).await);
    assert_eq!(summary.artifact_count, 1);
    let doc = std::fs::read_to_string(&output).unwrap();
    assert!(doc.contains("**Messages**: 1"));
    assert!(doc.contains("```rust\nfn main()"));
    assert!(!doc.contains("reverse a list"));
    assert!(!doc.contains("[Artifact 2]"));
}

#[tokio::test]
async fn cancelled_run_leaves_previous_intermediates() {
    let tmp = tempfile::tempdir().unwrap();
    std::fs::write(tmp.path().join("conversation.md"), "earlier run").unwrap();
    std::fs::write(tmp.path().join("artifact_code_0.py"), "print('earlier')").unwrap();
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));

    let err = fetch_chat(
        &mut page,
        &CancellingGate,
        &config(),
        &request(tmp.path(), OutputFormat::Markdown, RawPagePolicy::Transient),
    )
    .await
    .unwrap_err();

    assert!(err.is_cancellation());
    assert!(tmp.path().join("conversation.md").exists());
    assert!(tmp.path().join("artifact_code_0.py").exists());
}

#[tokio::test]
async fn pdf_is_moved_to_the_requested_output() {
    let tmp = tempfile::tempdir().unwrap();
    let work = tmp.path().join("scratch");
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));

    let outcome = assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(&work, OutputFormat::Pdf, RawPagePolicy::Transient),
        )
        .await
    );

    // Parent directories are created on demand.
    let output = tmp.path().join("exports").join("nested").join("chat.pdf");
    assert_ok!(relocate_pdf(&outcome.work_dir, &output).await);

    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 fake");
    assert!(!work.join("chat.pdf").exists());
}

#[tokio::test]
async fn pdf_output_inside_work_dir_stays_put() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));
    assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(tmp.path(), OutputFormat::Pdf, RawPagePolicy::Transient),
        )
        .await
    );

    let output = tmp.path().join("chat.pdf");
    assert_ok!(relocate_pdf(tmp.path(), &output).await);
    assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 fake");
}

#[tokio::test]
async fn empty_page_query_yields_empty_transcript() {
    let tmp = tempfile::tempdir().unwrap();
    let mut page = FakePage::new(Arc::new(Mutex::new(Log::default())));
    page.turns = Value::Null;
    page.code = Value::Null;

    let outcome = assert_ok!(
        fetch_chat(
            &mut page,
            &AutoGate,
            &config(),
            &request(tmp.path(), OutputFormat::Markdown, RawPagePolicy::Skip),
        )
        .await
    );
    assert_eq!(outcome.metadata.message_count, 0);
    assert_eq!(outcome.artifact_count, 0);
    assert!(read_transcript(tmp.path()).messages.is_empty());
}
