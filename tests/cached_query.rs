//! Cache-first query behavior against a scripted upstream.

mod common;

use cached_llm::{
    CachedQueryInterface, ChatMessage, CompletionEngine, EngineConfig, Error, Prompt,
    QueryParams, UpstreamError,
};
use common::{auto_text, chat_engine, fast, text_engine, ScriptedTransport, Step};

fn prompts(texts: &[&str]) -> Vec<Prompt> {
    texts.iter().map(|t| Prompt::text(*t)).collect()
}

fn first_text(response: &cached_llm::MetaResponse) -> &str {
    response.completions[0].content().unwrap_or_default()
}

#[tokio::test]
async fn test_second_run_is_served_from_cache() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new().with_max_tokens(8).with_n(2);
    let batch = prompts(&["2+2=", "3+3=", "4+4="]);

    let first = query.complete_prompts(&batch, &params, 20).await.unwrap();
    assert_eq!(transport.call_count(), 1);

    let second = query.complete_prompts(&batch, &params, 20).await.unwrap();
    assert_eq!(transport.call_count(), 1);
    assert_eq!(first, second);
    assert_eq!(query.cache().stats().hits, 3);
}

#[tokio::test]
async fn test_mixed_hits_and_misses_keep_input_order() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new().with_max_tokens(8);

    query
        .complete_prompts(&prompts(&["A", "C"]), &params, 20)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 1);

    let out = query
        .complete_prompts(&prompts(&["A", "B", "C", "D"]), &params, 1)
        .await
        .unwrap();

    let texts: Vec<&str> = out.iter().map(first_text).collect();
    assert_eq!(
        texts,
        vec![
            auto_text("A", 0),
            auto_text("B", 0),
            auto_text("C", 0),
            auto_text("D", 0)
        ]
    );
    assert_eq!(
        transport.sent_prompts(),
        vec![
            vec!["A".to_string(), "C".to_string()],
            vec!["B".to_string()],
            vec!["D".to_string()]
        ]
    );

    let progress = query.progress();
    assert_eq!((progress.completed(), progress.total()), (2, 2));
}

#[tokio::test]
async fn test_batch_size_does_not_affect_cache_keys() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new();
    let batch = prompts(&["x", "y", "z"]);

    query.complete_prompts(&batch, &params, 3).await.unwrap();
    query.complete_prompts(&batch, &params, 1).await.unwrap();
    query.complete_prompts(&batch, &params, 2).await.unwrap();
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_sub_batches_are_bounded() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let batch = prompts(&["a", "b", "c", "d", "e"]);

    let out = query
        .complete_prompts(&batch, &QueryParams::new(), 2)
        .await
        .unwrap();
    assert_eq!(out.len(), 5);
    let sizes: Vec<usize> = transport.sent_prompts().iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
    assert_eq!(query.progress().completed(), 3);
}

#[tokio::test]
async fn test_changed_parameters_miss_the_cache() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let batch = prompts(&["p"]);

    query
        .complete_prompts(&batch, &QueryParams::new().with_max_tokens(8), 1)
        .await
        .unwrap();
    query
        .complete_prompts(&batch, &QueryParams::new().with_max_tokens(9), 1)
        .await
        .unwrap();
    query
        .complete_prompts(&batch, &QueryParams::new().with_max_tokens(8).with_stop("\n"), 1)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_sample_tags_separate_cache_entries() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new().with_temperature(0.7);
    let prompt = Prompt::text("Tell me a joke.");

    let a1 = query.complete_prompt(&prompt, &params, Some("s1")).await.unwrap();
    let a2 = query.complete_prompt(&prompt, &params, Some("s1")).await.unwrap();
    assert_eq!(a1, a2);
    assert_eq!(transport.call_count(), 1);

    query.complete_prompt(&prompt, &params, Some("s2")).await.unwrap();
    assert_eq!(transport.call_count(), 2);
    query.complete_prompt(&prompt, &params, None).await.unwrap();
    assert_eq!(transport.call_count(), 3);

    let engine = query.engine();
    let k1 = engine.hash_request(&prompt, &params, Some("s1")).unwrap();
    let k2 = engine.hash_request(&prompt, &params, Some("s2")).unwrap();
    assert_ne!(k1, k2);
    assert_eq!(query.cache().len().await.unwrap(), 3);
}

#[tokio::test]
async fn test_untagged_single_prompt_shares_batch_entry() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new();

    query
        .complete_prompts(&prompts(&["shared"]), &params, 4)
        .await
        .unwrap();
    query
        .complete_prompt(&Prompt::text("shared"), &params, None)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_fatal_error_keeps_earlier_sub_batches() {
    let transport = ScriptedTransport::new();
    transport.push(Step::Auto);
    transport.push(Step::Fail(UpstreamError::invalid_request("prompt too long")));
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let params = QueryParams::new();
    let batch = prompts(&["first", "second"]);

    let err = query.complete_prompts(&batch, &params, 1).await.unwrap_err();
    assert!(matches!(err, Error::InvalidRequest { .. }));
    assert_eq!(transport.call_count(), 2);

    let (_, first) = query.response_lookup(&batch[0], &params, None).await.unwrap();
    let (_, second) = query.response_lookup(&batch[1], &params, None).await.unwrap();
    assert!(first.is_some());
    assert!(second.is_none());

    // Only the missing prompt goes upstream on the rerun.
    query.complete_prompts(&batch, &params, 1).await.unwrap();
    assert_eq!(transport.sent_prompts().last().unwrap(), &vec!["second".to_string()]);
}

// Degraded placeholders are cached like any other response; re-sampling
// under a new tag is how a caller gets a fresh attempt.
#[tokio::test]
async fn test_degraded_placeholder_is_cached() {
    let transport = ScriptedTransport::new();
    transport.push(Step::Fail(UpstreamError::transient("HTTP 502: Bad Gateway")));
    transport.push(Step::Fail(UpstreamError::transient("HTTP 502: Bad Gateway")));
    let engine = CompletionEngine::new(
        fast(EngineConfig::text_completion("davinci-002")).with_max_attempts(2),
        transport.clone(),
    )
    .unwrap();
    let query = CachedQueryInterface::in_memory(engine);
    let params = QueryParams::new();
    let prompt = Prompt::text("flaky");

    let out = query
        .complete_prompts(std::slice::from_ref(&prompt), &params, 1)
        .await
        .unwrap();
    assert!(out[0].is_degraded());
    assert_eq!(first_text(&out[0]), "upstream error: HTTP 502: Bad Gateway");
    assert_eq!(transport.call_count(), 2);

    let again = query
        .complete_prompts(std::slice::from_ref(&prompt), &params, 1)
        .await
        .unwrap();
    assert_eq!(again, out);
    assert_eq!(transport.call_count(), 2);

    let fresh = query
        .complete_prompt(&prompt, &params, Some("retry-1"))
        .await
        .unwrap();
    assert!(!fresh.is_degraded());
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn test_zero_batch_size_rejected() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let err = query
        .complete_prompts(&prompts(&["p"]), &QueryParams::new(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_wrong_prompt_shape_fails_before_lookup() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(text_engine(transport.clone()));
    let batch = vec![
        Prompt::text("fine"),
        Prompt::chat(vec![ChatMessage::user("not for this engine")]),
    ];
    let err = query
        .complete_prompts(&batch, &QueryParams::new(), 2)
        .await
        .unwrap_err();
    assert!(err.is_contract_violation());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_chat_engine_needs_unit_batches() {
    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::in_memory(chat_engine(transport.clone()));
    let batch = vec![
        Prompt::chat(vec![ChatMessage::user("hello")]),
        Prompt::chat(vec![ChatMessage::user("goodbye")]),
    ];

    let err = query
        .complete_prompts(&batch, &QueryParams::new(), 2)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(transport.call_count(), 0);

    let out = query
        .complete_prompts(&batch, &QueryParams::new(), 1)
        .await
        .unwrap();
    assert_eq!(transport.call_count(), 2);
    assert_eq!(first_text(&out[0]), auto_text("hello", 0));
    assert_eq!(first_text(&out[1]), auto_text("goodbye", 0));
}

#[tokio::test]
async fn test_sqlite_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache").join("davinci.sqlite");
    let params = QueryParams::new().with_max_tokens(4);
    let batch = prompts(&["persist me", "and me"]);

    let transport = ScriptedTransport::new();
    let first = {
        let query = CachedQueryInterface::with_sqlite(text_engine(transport.clone()), &path).unwrap();
        query.complete_prompts(&batch, &params, 10).await.unwrap()
    };
    assert_eq!(transport.call_count(), 1);

    let transport = ScriptedTransport::new();
    let query = CachedQueryInterface::with_sqlite(text_engine(transport.clone()), &path).unwrap();
    let second = query.complete_prompts(&batch, &params, 10).await.unwrap();
    assert_eq!(transport.call_count(), 0);
    assert_eq!(first, second);
    assert_eq!(query.cache().backend_name(), "sqlite");
}
