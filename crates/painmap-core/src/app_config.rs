#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Test => write!(f, "test"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Which LLM backend the gateway talks to. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProviderKind {
    /// Self-hosted Ollama inference server.
    Ollama,
    /// Azure OpenAI chat-completions deployment.
    Azure,
}

impl std::fmt::Display for LlmProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LlmProviderKind::Ollama => write!(f, "ollama"),
            LlmProviderKind::Azure => write!(f, "azure"),
        }
    }
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub env: Environment,
    pub log_level: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub llm_provider: LlmProviderKind,
    pub ollama_base_url: String,
    pub ollama_model: String,
    pub azure_openai_endpoint: Option<String>,
    pub azure_openai_key: Option<String>,
    pub azure_openai_deployment: String,
    pub azure_openai_api_version: String,
    /// Fixed pause before every outbound LLM call, in seconds.
    pub llm_request_delay_secs: f64,
    pub llm_request_timeout_secs: u64,
    /// Documents per LLM batch. Twenty keeps a batch of forum posts well
    /// inside a small model's context window while bounding the number of
    /// paced round-trips per run.
    pub clustering_batch_size: usize,
    /// Target number of themes per product area after consolidation.
    pub clustering_max_themes_per_area: usize,
    /// Consolidation rounds allowed per product area before accepting the
    /// current theme set as-is.
    pub clustering_max_consolidation_rounds: u32,
    pub clustering_debug: bool,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("env", &self.env)
            .field("log_level", &self.log_level)
            .field("database_url", &"[redacted]")
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field("llm_provider", &self.llm_provider)
            .field("ollama_base_url", &self.ollama_base_url)
            .field("ollama_model", &self.ollama_model)
            .field("azure_openai_endpoint", &self.azure_openai_endpoint)
            .field(
                "azure_openai_key",
                &self.azure_openai_key.as_ref().map(|_| "[redacted]"),
            )
            .field("azure_openai_deployment", &self.azure_openai_deployment)
            .field("azure_openai_api_version", &self.azure_openai_api_version)
            .field("llm_request_delay_secs", &self.llm_request_delay_secs)
            .field("llm_request_timeout_secs", &self.llm_request_timeout_secs)
            .field("clustering_batch_size", &self.clustering_batch_size)
            .field(
                "clustering_max_themes_per_area",
                &self.clustering_max_themes_per_area,
            )
            .field(
                "clustering_max_consolidation_rounds",
                &self.clustering_max_consolidation_rounds,
            )
            .field("clustering_debug", &self.clustering_debug)
            .finish()
    }
}
