use crate::app_config::{AppConfig, Environment, LlmProviderKind};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Does not load `.env` files; the caller manages the environment.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Takes the env-var lookup as a closure so tests can pass a `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_positive_usize = |var: &str, default: &str| -> Result<usize, ConfigError> {
        let value = or_default(var, default)
            .parse::<usize>()
            .map_err(|e| invalid(var, e.to_string()))?;
        if value == 0 {
            return Err(invalid(var, "must be at least 1".to_string()));
        }
        Ok(value)
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("PAINMAP_ENV", "development"))?;
    let log_level = or_default("PAINMAP_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("PAINMAP_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("PAINMAP_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "PAINMAP_DB_MIN_CONNECTIONS",
            format!("must not exceed PAINMAP_DB_MAX_CONNECTIONS ({db_max_connections})"),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("PAINMAP_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let llm_provider = parse_llm_provider(&or_default("LLM_PROVIDER", "ollama"))?;
    let ollama_base_url = or_default("OLLAMA_BASE_URL", "http://localhost:11434");
    let ollama_model = or_default("OLLAMA_MODEL", "llama3.2");
    let azure_openai_endpoint = lookup("AZURE_OPENAI_ENDPOINT").ok();
    let azure_openai_key = lookup("AZURE_OPENAI_KEY").ok();
    let azure_openai_deployment = or_default("AZURE_OPENAI_DEPLOYMENT", "gpt-4o");
    let azure_openai_api_version = or_default("AZURE_OPENAI_API_VERSION", "2024-02-01");

    if llm_provider == LlmProviderKind::Azure {
        if azure_openai_endpoint.is_none() {
            return Err(ConfigError::MissingEnvVar(
                "AZURE_OPENAI_ENDPOINT".to_string(),
            ));
        }
        if azure_openai_key.is_none() {
            return Err(ConfigError::MissingEnvVar("AZURE_OPENAI_KEY".to_string()));
        }
    }

    let llm_request_delay_secs = parse_delay_secs(&or_default("LLM_REQUEST_DELAY_SECONDS", "10"))?;
    let llm_request_timeout_secs = parse_u64("LLM_REQUEST_TIMEOUT_SECS", "180")?;

    let clustering_batch_size = parse_positive_usize("CLUSTERING_BATCH_SIZE", "20")?;
    let clustering_max_themes_per_area =
        parse_positive_usize("CLUSTERING_MAX_THEMES_PER_AREA", "5")?;
    let clustering_max_consolidation_rounds =
        parse_u32("CLUSTERING_MAX_CONSOLIDATION_ROUNDS", "3")?;
    let clustering_debug = parse_flag(&or_default("CLUSTERING_DEBUG", ""));

    Ok(AppConfig {
        database_url,
        env,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        llm_provider,
        ollama_base_url,
        ollama_model,
        azure_openai_endpoint,
        azure_openai_key,
        azure_openai_deployment,
        azure_openai_api_version,
        llm_request_delay_secs,
        llm_request_timeout_secs,
        clustering_batch_size,
        clustering_max_themes_per_area,
        clustering_max_consolidation_rounds,
        clustering_debug,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "PAINMAP_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

fn parse_llm_provider(s: &str) -> Result<LlmProviderKind, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "ollama" => Ok(LlmProviderKind::Ollama),
        "azure" => Ok(LlmProviderKind::Azure),
        other => Err(ConfigError::InvalidEnvVar {
            var: "LLM_PROVIDER".to_string(),
            reason: format!("expected 'ollama' or 'azure', got '{other}'"),
        }),
    }
}

fn parse_delay_secs(s: &str) -> Result<f64, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidEnvVar {
        var: "LLM_REQUEST_DELAY_SECONDS".to_string(),
        reason,
    };
    let value = s.trim().parse::<f64>().map_err(|e| invalid(e.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(invalid(format!("must be a non-negative number, got {value}")));
    }
    Ok(value)
}

/// `true`, `1` and `yes` (any case) switch a flag on; everything else is off.
fn parse_flag(s: &str) -> bool {
    matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
