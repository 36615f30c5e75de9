use super::*;
use crate::retrieval::RewriteFallback;
use tempfile::TempDir;

fn config_in(dir: &Path) -> Config {
    Config {
        base_dir: dir.to_path_buf(),
        ..Config::default()
    }
}

#[test]
fn default_config() {
    let config = Config::default();
    assert_eq!(config.ollama.protocol, "http");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.ollama.port, 11434);
    assert_eq!(config.ollama.embedding_model, "nomic-embed-text:latest");
    assert_eq!(config.ollama.batch_size, 16);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.chunking.chunk_overlap, 200);
    assert_eq!(config.retrieval.top_k, 5);
    assert_eq!(config.retrieval.query_variants, 3);
    assert_eq!(
        config.retrieval.rewrite_fallback,
        RewriteFallback::RawQuestion
    );
    assert!(!config.loader.enable_docx);
    assert!(config.validate().is_ok());
}

#[test]
fn config_validation() {
    let config = Config::default();

    let mut invalid_config = config.clone();
    invalid_config.ollama.protocol = "ftp".to_string();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.port = 0;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.chat_model = String::new();
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.ollama.batch_size = 1001;
    assert!(invalid_config.validate().is_err());

    let mut invalid_config = config.clone();
    invalid_config.retrieval.top_k = 0;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidTopK(0))
    ));

    let mut invalid_config = config.clone();
    invalid_config.retrieval.query_variants = 6;
    assert!(matches!(
        invalid_config.validate(),
        Err(ConfigError::InvalidQueryVariants(6))
    ));

    let mut invalid_config = config;
    invalid_config.request_timeout_secs = 0;
    assert!(invalid_config.validate().is_err());
}

#[test]
fn overlap_must_be_smaller_than_chunk_size() {
    let mut config = Config::default();
    config.chunking.chunk_size = 200;
    config.chunking.chunk_overlap = 200;

    assert!(matches!(
        config.validate(),
        Err(ConfigError::OverlapTooLarge(200, 200))
    ));

    config.chunking.chunk_overlap = 199;
    assert!(config.validate().is_ok());
}

#[test]
fn ollama_url_generation() {
    let config = Config::default();
    let url = config
        .ollama_url()
        .expect("should generate ollama_url successfully");
    assert_eq!(url.as_str(), "http://localhost:11434/");
}

#[test]
fn toml_serialization() {
    let config = Config {
        base_dir: PathBuf::new(),
        ..Config::default()
    };
    let toml_str = toml::to_string(&config).expect("should serialize toml correctly");
    let parsed_config: Config = toml::from_str(&toml_str).expect("should parse toml correctly");
    assert_eq!(config, parsed_config);
}

#[test]
fn partial_toml_uses_section_defaults() {
    let toml_str = r#"
        [ollama]
        chat_model = "mistral:7b"

        [retrieval]
        top_k = 8
        rewrite_fallback = "fail"
    "#;

    let config: Config = toml::from_str(toml_str).expect("should parse partial toml");
    assert_eq!(config.ollama.chat_model, "mistral:7b");
    assert_eq!(config.ollama.host, "localhost");
    assert_eq!(config.retrieval.top_k, 8);
    assert_eq!(config.retrieval.query_variants, 3);
    assert_eq!(config.retrieval.rewrite_fallback, RewriteFallback::Fail);
    assert_eq!(config.chunking.chunk_size, 1000);
    assert_eq!(config.request_timeout_secs, 120);
}

#[test]
fn setter_validation() {
    let mut config = OllamaConfig::default();

    assert!(config.set_protocol("https".to_string()).is_ok());
    assert!(config.set_host("example.com".to_string()).is_ok());
    assert!(config.set_port(8080).is_ok());
    assert!(config.set_embedding_model("new-model".to_string()).is_ok());
    assert!(config.set_chat_model("chat-model".to_string()).is_ok());
    assert!(config.set_batch_size(128).is_ok());
    assert!(config.set_embedding_dimension(384).is_ok());

    assert!(config.set_protocol("ftp".to_string()).is_err());
    assert!(config.set_protocol("HTTP".to_string()).is_err());
    assert!(config.set_port(0).is_err());
    assert!(config.set_embedding_model(String::new()).is_err());
    assert!(config.set_chat_model("   ".to_string()).is_err());
    assert!(config.set_batch_size(0).is_err());
    assert!(config.set_batch_size(1001).is_err());
    assert!(config.set_embedding_dimension(1).is_err());
}

#[test]
fn load_missing_config_returns_defaults() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    let config = Config::load(temp_dir.path()).expect("should load defaults");
    assert_eq!(config.base_dir, temp_dir.path());
    assert_eq!(config.ollama, OllamaConfig::default());
    assert_eq!(config.index_path(), temp_dir.path().join("index"));
}

#[test]
fn save_and_load_round_trip() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_in(temp_dir.path());
    config.ollama.chat_model = "qwen2.5:7b".to_string();
    config.paths.source_dir = PathBuf::from("/srv/company-docs");
    config.paths.index_dir = Some(PathBuf::from("/srv/company-index"));
    config.loader.enable_docx = true;

    config.save().expect("should save config");
    assert!(config.config_file_path().exists());

    let loaded = Config::load(temp_dir.path()).expect("should load saved config");
    assert_eq!(loaded.ollama.chat_model, "qwen2.5:7b");
    assert_eq!(loaded.source_path(), Path::new("/srv/company-docs"));
    assert_eq!(loaded.index_path(), PathBuf::from("/srv/company-index"));
    assert!(loaded.loader.enable_docx);
}

#[test]
fn load_rejects_invalid_values() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    fs::write(
        temp_dir.path().join("config.toml"),
        "[chunking]\nchunk_size = 100\nchunk_overlap = 150\n",
    )
    .expect("should write config");

    assert!(Config::load(temp_dir.path()).is_err());
}

#[test]
fn save_rejects_invalid_config() {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let mut config = config_in(temp_dir.path());
    config.ollama.port = 0;

    assert!(config.save().is_err());
    assert!(!config.config_file_path().exists());
}
