use std::{env, sync::Once};

use rustyindex::{
    config, embedding,
    generation::{GenerationRequest, GenerationTask, OllamaGenerator, TextGenerator},
};

static INIT: Once = Once::new();

fn set_default_env(key: &str, value: &str) {
    let needs_value = env::var(key).map(|v| v.trim().is_empty()).unwrap_or(true);
    if needs_value {
        // SAFETY: Tests run serially via Once and we intentionally mutate process env.
        unsafe {
            env::set_var(key, value);
        }
    }
}

fn init_config_once() {
    INIT.call_once(|| {
        set_default_env("OLLAMA_URL", "http://127.0.0.1:11434");
        set_default_env("GENERATION_MODEL", "llama3.2");
        set_default_env("EMBEDDING_PROVIDER", "ollama");
        set_default_env("EMBEDDING_MODEL", "nomic-embed-text");
        set_default_env("EMBEDDING_DIMENSION", "768");
        config::init_config().expect("live configuration");
    });
}

#[tokio::test]
#[ignore = "Requires live Ollama generation"]
async fn live_ollama_generation_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let (generation_model, vision_model) = config.models().expect("models");
    let generator = OllamaGenerator::new(
        config.ollama_url.clone(),
        generation_model,
        vision_model,
    )
    .expect("generator");
    let reply = generator
        .generate(GenerationRequest::text(
            GenerationTask::ChapterSummary,
            "Summarize in one sentence: Rust guarantees memory safety without a garbage collector.",
        ))
        .await
        .expect("failed to request generation from provider");
    assert!(!reply.trim().is_empty(), "expected a non-empty reply");
}

#[tokio::test]
#[ignore = "Requires live Ollama embeddings"]
async fn live_ollama_embedding_roundtrip() {
    init_config_once();
    let config = config::get_config();
    let client = embedding::get_embedding_client(config).expect("embedding client");
    let vectors = client
        .generate_embeddings(vec!["rusty-index live embedding".to_string()])
        .await
        .expect("failed to request embeddings from provider");
    assert_eq!(vectors.len(), 1, "expected embedding per input text");
    assert_eq!(vectors[0].len(), config.embedding_dimension, "embedding dimension mismatch");
}
