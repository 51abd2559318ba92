//! Integration tests for the ttsbench-core crate: catalog to report

use std::sync::Arc;

use tempfile::TempDir;
use ttsbench_core::hub::DEFAULT_USER_AGENT;
use ttsbench_core::{
    collect_records, summarize, BenchError, Catalog, EngineHost, HubClient, LoadOptions,
    ModelDownloader, ModelStore, PromptSuite, ReadinessEvaluator, ResultRecord, RunMode,
    RunSettings, SuiteRunner, ToneEngine,
};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CATALOG: &str = r#"{
  "schema_version": 1,
  "models": [
    {
      "id": "tone-assets",
      "display_name": "Tone assets",
      "engine": "tone",
      "model_type": "asset",
      "source": {"kind": "hf", "repo": "org/tone-assets"},
      "files": ["lexicon.txt"]
    },
    {
      "id": "tone-en",
      "display_name": "Tone (English)",
      "engine": "tone",
      "model_type": "vits",
      "source": {"kind": "hf", "repo": "org/tone-en", "rev": "v1"},
      "files": ["model.onnx", "tokens.txt"],
      "dependencies": ["tone-assets"],
      "meta": {"languages": "en", "description": "synthetic", "size_hint_mb": 1}
    }
  ]
}"#;

const SUITE: &str = r#"{
  "id": "en",
  "prompts": [
    {"id": "short", "text": "Hello there."},
    {"id": "long", "text": "The quick brown fox jumps over the lazy dog."}
  ]
}"#;

async fn mock_hub() -> MockServer {
    let server = MockServer::start().await;
    for (url, body) in [
        ("/org/tone-assets/resolve/main/lexicon.txt", "hello h e l o\n"),
        ("/org/tone-en/resolve/v1/model.onnx", "not really onnx"),
        ("/org/tone-en/resolve/v1/tokens.txt", "a 0\nb 1\n"),
    ] {
        Mock::given(method("GET"))
            .and(path(url))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .expect(1)
            .mount(&server)
            .await;
    }
    server
}

#[test_log::test(tokio::test)]
async fn test_download_bench_report() {
    let server = mock_hub().await;
    let dir = TempDir::new().unwrap();
    let store = ModelStore::new(dir.path().join("models"));
    let exports = dir.path().join("exports");
    let catalog = Arc::new(Catalog::from_json_str(CATALOG).unwrap());
    let model = catalog.require("tone-en").unwrap().clone();
    let readiness = ReadinessEvaluator::new(Arc::clone(&catalog), store.clone());

    let mut host = EngineHost::new().with_engine(Box::new(ToneEngine::new(readiness.clone())));
    let suite = PromptSuite::from_json_str(SUITE).unwrap();
    let mut settings = RunSettings::new(LoadOptions::default());
    settings.run_id = "run-a".into();
    settings.run_mode = RunMode::Cold;
    let runner = SuiteRunner::new(&exports);

    // gated before download
    let err = runner
        .run_suite(&mut host, &model, &suite, &settings, |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, BenchError::NotReady { .. }));
    assert!(err.to_string().contains("dependency 'tone-assets'"), "{err}");

    let hub = HubClient::new(server.uri(), DEFAULT_USER_AGENT).unwrap();
    ModelDownloader::new(hub, store.clone(), Arc::clone(&catalog))
        .download_with_dependencies(&model, |_| {})
        .await
        .unwrap();
    assert!(readiness.evaluate(&model).is_ready());

    let mut seen = Vec::new();
    let paths = runner
        .run_suite(&mut host, &model, &suite, &settings, |p| seen.push(p.prompt_id.clone()))
        .await
        .unwrap();
    assert_eq!(seen, vec!["short", "long"]);
    assert_eq!(paths.len(), 2);
    assert!(!host.is_loaded());

    let long = ResultRecord::load(&paths[1]).unwrap();
    assert_eq!(long.input.words, 9);
    assert_eq!(long.model.name, "Tone (English)");
    assert_eq!(long.settings.run_mode, "cold");
    assert!((long.audio.duration_sec - 2.7).abs() < 1e-3);

    let wav = hound::WavReader::open(exports.join("run-a/tone-en/long/audio.wav")).unwrap();
    assert_eq!(wav.spec().sample_rate, long.audio.sample_rate);
    assert_eq!(wav.len() as usize, long.audio.samples);

    settings.run_id = "run-b".into();
    settings.run_mode = RunMode::Warm;
    settings.warm_iterations = 2;
    runner
        .run_suite(&mut host, &model, &suite, &settings, |_| {})
        .await
        .unwrap();

    let all = collect_records(&exports, None).unwrap();
    assert_eq!(all.len(), 4);
    let rows = summarize(&collect_records(&exports, Some("run-b")).unwrap());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].model_id, "tone-en");
    assert_eq!(rows[0].count, 2);
    assert_eq!(rows[0].prompt_set, "en");
}

#[tokio::test]
async fn test_catalog_rejects_cycles() {
    let json = r#"{
      "schema_version": 1,
      "models": [
        {"id": "a", "display_name": "A", "engine": "tone", "model_type": "x",
         "source": {"kind": "system"}, "dependencies": ["b"]},
        {"id": "b", "display_name": "B", "engine": "tone", "model_type": "x",
         "source": {"kind": "system"}, "dependencies": ["a"]}
      ]
    }"#;
    let err = Catalog::from_json_str(json).unwrap_err();
    assert!(matches!(err, BenchError::DependencyCycle { .. }));
}
