//! Benchmark runs over HTTP against a file-backed store

use std::sync::Arc;

use hyra_core::benchmark::{Benchmark, EvalSet};
use hyra_core::config::Config;
use hyra_core::routing::{MetricsStore, SqliteMetricsStore};
use hyra_core::storage::Database;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn chat_reply(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{ "message": { "role": "assistant", "content": content } }]
    }))
}

fn completion(text: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(serde_json::json!({
        "choices": [{
            "text": text,
            "logprobs": { "token_logprobs": [null, -0.2] }
        }],
        "usage": { "prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12 }
    }))
}

#[tokio::test]
async fn test_benchmark_grades_against_expected_answer() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completions"))
        .and(body_string_contains("small/right"))
        .respond_with(completion(" 17 * 23 = 391"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/completions"))
        .and(body_string_contains("small/wrong"))
        .respond_with(completion(" 17 * 23 = 381"))
        .expect(1)
        .mount(&server)
        .await;
    // The judge sees the expected answer in its prompt
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Reference answer:"))
        .and(body_string_contains("= 391"))
        .respond_with(chat_reply("{\"score\": 0.95, \"reason\": \"matches\"}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Reference answer:"))
        .and(body_string_contains("= 381"))
        .respond_with(chat_reply("{\"score\": 0.0, \"reason\": \"wrong product\"}"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("rating the fluency"))
        .respond_with(chat_reply("```json\n{\"score\": 0.7}\n```"))
        .expect(2)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let db = Database::open(dir.path().join("hyra.db")).await.unwrap();
    let store = Arc::new(SqliteMetricsStore::new(db.pool().clone()));
    let right = store.add_model("right", "small", 0.0).await.unwrap();
    let wrong = store.add_model("wrong", "small", 0.0).await.unwrap();

    let mut config = Config::default();
    config.inference.base_url = server.uri();
    config.judge.base_url = server.uri();

    let set_path = dir.path().join("eval_set.json");
    std::fs::write(
        &set_path,
        r#"[{"domain": "Math Reasoning", "q": "What is 17 * 23?", "a": "391"}]"#,
    )
    .unwrap();
    let set = EvalSet::load(&set_path).unwrap();

    let benchmark = Benchmark::from_config(&config, store.clone()).unwrap();
    let report = benchmark
        .run(&set, &[right.clone(), wrong.clone()])
        .await
        .unwrap();

    assert_eq!(report.records.len(), 2);
    assert!(report.records[0].passed);
    assert!(!report.records[1].passed);
    assert_eq!(report.records[0].tokens, 12);
    assert!((report.records[0].confidence - (-0.2f64).exp()).abs() < 1e-9);

    let domain = store.find_domain("Math Reasoning").await.unwrap().unwrap();
    let right_row = store.get_metrics(right.id, domain.id).await.unwrap().unwrap();
    assert_eq!(right_row.usage_count, 1);
    assert!((right_row.accuracy_score - 0.95).abs() < 1e-12);
    assert!((right_row.fluency_score - 0.7).abs() < 1e-12);
    let wrong_row = store.get_metrics(wrong.id, domain.id).await.unwrap().unwrap();
    assert_eq!(wrong_row.failure_count, 1);

    let summaries = report.summaries();
    assert_eq!(summaries[0].model, "small/right");
    assert_eq!(summaries[0].passed, 1);
}
