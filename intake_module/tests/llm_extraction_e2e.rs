use std::sync::Arc;
use std::time::Duration;

use intake_module::extractor::{DelegatedExtractor, ExtractError, Extractor, ResponseFormat};
use intake_module::llm::{GeminiGenerator, LlmConfig, LlmError, OpenAiGenerator, TextGenerator};
use intake_module::report::CASE_STATUS_TRACKING;
use intake_module::source_tag::{CaseSource, SourceTagClassifier};
use mockito::{Matcher, Server};
use serde_json::json;

fn llm_config(server: &Server, model: &str) -> LlmConfig {
    LlmConfig {
        api_key: "test-key".to_string(),
        api_url: server.url(),
        model: model.to_string(),
        timeout: Duration::from_secs(5),
    }
}

fn openai_reply(content: &str) -> String {
    json!({
        "id": "chatcmpl-1",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

#[test]
fn openai_tab_reply_becomes_report() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let mock = server
        .mock("POST", "/chat/completions")
        .match_header("authorization", "Bearer test-key")
        .match_body(Matcher::PartialJson(json!({
            "model": "gpt-4o-mini",
            "max_completion_tokens": 512
        })))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(openai_reply("同行收\t2022.11\tMazda\tCX-9 2WD-R\t白\t3.7\t169.9\n"))
        .expect(1)
        .create();

    let generator = Arc::new(OpenAiGenerator::new(llm_config(&server, "gpt-4o-mini")));
    let extractor = DelegatedExtractor::new(
        generator,
        SourceTagClassifier::default(),
        ResponseFormat::TabDelimited,
    );
    let reports = extractor.extract("Mazda CX-9 2WD-R 2022.11 白 3.7萬 同行收", "阿蔣")?;

    mock.assert();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.assigned_salesperson, "阿蔣");
    assert_eq!(report.case_status, CASE_STATUS_TRACKING);
    assert_eq!(report.case_source, CaseSource::Peer);
    assert_eq!(report.brand, "Mazda");
    assert_eq!(report.model, "CX-9 2WD-R");
    assert_eq!(report.list_price, "169.9");
    Ok(())
}

#[test]
fn openai_error_status_is_generation_error() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", "/chat/completions")
        .with_status(429)
        .with_body(r#"{"error":{"message":"rate limited"}}"#)
        .create();

    let generator = Arc::new(OpenAiGenerator::new(llm_config(&server, "gpt-4o-mini")));
    let extractor = DelegatedExtractor::new(
        generator,
        SourceTagClassifier::default(),
        ResponseFormat::TabDelimited,
    );
    match extractor.extract("Altis", "阿蔣") {
        Err(ExtractError::Generation(LlmError::Status { provider, status, .. })) => {
            assert_eq!(provider, "openai");
            assert_eq!(status, 429);
        }
        other => panic!("expected status error, got {:?}", other),
    }
}

#[test]
fn gemini_json_rows_yield_one_report_per_car() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = Server::new();
    let rows = r#"[["直客","2019","Toyota","Altis","黑","5.2","82"],["融資","2020","Honda","Fit","","",""]]"#;
    let mock = server
        .mock("POST", "/v1beta/models/gemini-1.5-flash:generateContent")
        .match_query(Matcher::UrlEncoded("key".into(), "test-key".into()))
        .match_body(Matcher::Regex("systemInstruction".to_string()))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "candidates": [{"content": {"role": "model", "parts": [{"text": format!("```json\n{}\n```", rows)}]}}]
            })
            .to_string(),
        )
        .expect(1)
        .create();

    let generator = Arc::new(GeminiGenerator::new(llm_config(&server, "gemini-1.5-flash")));
    assert_eq!(generator.provider(), "gemini");
    let extractor = DelegatedExtractor::new(
        generator,
        SourceTagClassifier::default(),
        ResponseFormat::JsonRows,
    );
    let reports = extractor.extract("Altis 2019 黑 / Fit 2020", "unknown")?;

    mock.assert();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0].case_source, CaseSource::DirectCustomer);
    assert_eq!(reports[0].mileage, "5.2");
    assert_eq!(reports[1].case_source, CaseSource::Financing);
    assert_eq!(reports[1].model, "Fit");
    assert_eq!(reports[1].color, "");
    Ok(())
}

#[test]
fn gemini_without_candidates_is_empty_content() {
    let mut server = Server::new();
    let _mock = server
        .mock("POST", Matcher::Regex(r"^/v1beta/models/".to_string()))
        .with_status(200)
        .with_body(r#"{"candidates":[],"promptFeedback":{"blockReason":"SAFETY"}}"#)
        .create();

    let generator = GeminiGenerator::new(llm_config(&server, "gemini-1.5-flash"));
    assert!(matches!(
        generator.generate("system", "prompt"),
        Err(LlmError::EmptyContent("gemini"))
    ));
}
