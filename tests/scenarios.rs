use script_filter::{
    DirectoryResolver, FilterConfig, FilterError, Message, Processor, ScriptedFilter, Settings,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio::time::timeout;

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures").join(name)
}

fn filter(script: &str, variables: Option<&str>) -> Arc<ScriptedFilter> {
    let settings = Settings {
        script: Some(fixture(script)),
        variables: variables.map(String::from),
        ..Settings::default()
    };
    let config = FilterConfig::load(&settings).unwrap();
    let resolver = DirectoryResolver::new([fixture("modules")]);
    Arc::new(ScriptedFilter::initialize(config, &resolver).unwrap())
}

async fn receives_payload(output: &mut Receiver<Message>, expected: &str) {
    let message = timeout(Duration::from_secs(5), output.recv())
        .await
        .expect("no message within 5s")
        .expect("output closed");
    assert_eq!(message.render_payload(), expected);
}

async fn stays_quiet(output: &mut Receiver<Message>) {
    let polled = timeout(Duration::from_millis(10), output.recv()).await;
    assert!(polled.is_err(), "unexpected message: {polled:?}");
}

async fn length_scenario(script: &str) {
    let mut binding = Processor::bind(filter(script, Some("threshold=5")), 16);
    for word in ["hello", "hello world", "hi!"] {
        binding.input.send(Message::new(word)).await.unwrap();
    }
    receives_payload(&mut binding.output, "hello world").await;
    stays_quiet(&mut binding.output).await;
}

async fn grab_scenario(script: &str) {
    let mut binding = Processor::bind(filter(script, None), 16);
    for reading in [0.2, 0.3, 0.4] {
        binding.input.send(Message::new(reading)).await.unwrap();
    }
    receives_payload(&mut binding.output, "0.2").await;
    stays_quiet(&mut binding.output).await;
}

#[tokio::test]
async fn length_threshold_with_expr_script() {
    length_scenario("script.expr").await;
}

#[tokio::test]
async fn length_threshold_with_rhai_script() {
    length_scenario("script.rhai").await;
}

#[tokio::test]
async fn grabbed_helper_with_rhai_script() {
    grab_scenario("script-with-grab.rhai").await;
}

#[tokio::test]
async fn grabbed_helper_with_expr_script() {
    grab_scenario("script-with-grab.expr").await;
}

#[tokio::test]
async fn processor_drains_and_reports_stats() {
    let binding = Processor::bind(filter("script.expr", Some("threshold=5")), 16);
    let mut output = binding.output;
    let mut errors = binding.errors;
    for payload in [
        serde_json::json!("hello world"),
        serde_json::json!(42),
        serde_json::json!("hi"),
    ] {
        binding.input.send(Message::new(payload)).await.unwrap();
    }
    drop(binding.input);

    let stats = binding.handle.await.unwrap();
    assert_eq!((stats.received, stats.forwarded, stats.dropped, stats.failed), (3, 1, 1, 1));

    assert_eq!(output.recv().await.unwrap().render_payload(), "hello world");
    assert!(output.recv().await.is_none());

    let failed = errors.recv().await.unwrap();
    assert_eq!(failed.message, Message::new(42));
    assert!(matches!(failed.error, FilterError::ScriptEvaluation(_)));
}

#[tokio::test]
async fn forwarded_messages_keep_their_headers() {
    let mut binding = Processor::bind(filter("script.rhai", Some("threshold=2")), 4);
    let sent = Message::new("abcdef").with_header("trace", "t-1").with_header("attempt", 2);
    binding.input.send(sent.clone()).await.unwrap();
    let got = timeout(Duration::from_secs(5), binding.output.recv()).await.unwrap().unwrap();
    assert_eq!(got, sent);
}
