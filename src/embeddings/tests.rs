use super::*;
use crate::config::Config;
use crate::provider::{
    DEFAULT_OPENAI_MODEL, ENV_OPENAI_API_KEY, ENV_PROVIDER, EnvSnapshot, Provider,
};
use tempfile::TempDir;

fn snapshot(pairs: &[(&str, &str)]) -> EnvSnapshot {
    pairs.iter().map(|&(k, v)| (k, v)).collect()
}

fn default_config(dir: &TempDir) -> Config {
    Config::load(dir.path()).expect("config")
}

#[test]
fn environment_provider_beats_config_file_default() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = default_config(&dir);
    config.embedding.provider = Some("ollama".to_string());

    let env = snapshot(&[(ENV_PROVIDER, "openai"), (ENV_OPENAI_API_KEY, "sk-test")]);
    let embedder = Embedder::from_config(&config, &env, None, None).expect("embedder");

    assert_eq!(embedder.provider(), Provider::OpenAi);
    assert_eq!(embedder.model(), DEFAULT_OPENAI_MODEL);
}

#[test]
fn config_file_provider_beats_credential_sniffing() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = default_config(&dir);
    config.embedding.provider = Some("ollama".to_string());

    // An OpenAI credential alone would win the sniffing pass.
    let env = snapshot(&[(ENV_OPENAI_API_KEY, "sk-test")]);
    let embedder = Embedder::from_config(&config, &env, None, None).expect("embedder");

    assert_eq!(embedder.provider(), Provider::Ollama);
}

#[test]
fn config_file_model_applies_when_environment_is_silent() {
    let dir = TempDir::new().expect("tempdir");
    let mut config = default_config(&dir);
    config.embedding.model = Some("config-model".to_string());

    let env = snapshot(&[(ENV_PROVIDER, "openai"), (ENV_OPENAI_API_KEY, "sk-test")]);
    let embedder = Embedder::from_config(&config, &env, None, None).expect("embedder");

    assert_eq!(embedder.provider(), Provider::OpenAi);
    assert_eq!(embedder.model(), "config-model");
}

#[test]
fn explicit_provider_beats_environment_default() {
    let dir = TempDir::new().expect("tempdir");
    let config = default_config(&dir);

    let env = snapshot(&[(ENV_PROVIDER, "openai"), (ENV_OPENAI_API_KEY, "sk-test")]);
    let embedder = Embedder::from_config(&config, &env, Some("ollama"), None).expect("embedder");

    assert_eq!(embedder.provider(), Provider::Ollama);
}

#[test]
fn hosted_providers_report_ready_without_a_round_trip() {
    let client = OpenAiClient::new_openai("sk-test", "text-embedding-3-small").expect("client");
    assert!(client.ping().is_ok());
}

#[test]
fn missing_credential_is_a_config_error() {
    let dir = TempDir::new().expect("tempdir");
    let config = default_config(&dir);

    let err = Embedder::from_config(&config, &snapshot(&[]), Some("openai"), None)
        .expect_err("no credential");
    assert!(matches!(err, SearchError::Config(_)));
}
