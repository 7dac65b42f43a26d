use super::models::Config;
use crate::types::{ProxyError, Result};
use regex::{Captures, Regex};
use std::fs;
use std::path::Path;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| ProxyError::Config(format!("Failed to read config file: {}", e)))?;

    let expanded = expand_env_vars(&content)?;
    let config = parse_config(&expanded, path)?;

    config
        .validate()
        .map_err(|e| ProxyError::Config(format!("Invalid configuration: {}", e)))?;

    Ok(config)
}

fn parse_config(content: &str, path: &Path) -> Result<Config> {
    if path.extension().and_then(|s| s.to_str()) == Some("json") {
        serde_json::from_str(content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse JSON config: {}", e)))
    } else {
        serde_yaml::from_str(content)
            .map_err(|e| ProxyError::Config(format!("Failed to parse YAML config: {}", e)))
    }
}

/// Replace `${VAR}` and `${VAR:-default}` with values from the environment.
/// Unset variables without a default expand to an empty string.
fn expand_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(:-([^}]*))?\}")
        .map_err(|e| ProxyError::Config(format!("Invalid placeholder pattern: {}", e)))?;

    let expanded = re.replace_all(content, |cap: &Captures| {
        let var_name = &cap[1];
        match std::env::var(var_name) {
            Ok(value) => value,
            Err(_) => match cap.get(3) {
                Some(default) => default.as_str().to_string(),
                None => {
                    tracing::warn!(
                        variable = var_name,
                        "Environment variable not found and no default provided"
                    );
                    String::new()
                }
            },
        }
    });

    Ok(expanded.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("ROUTER_TEST_SECRET", "sk-local");
        let output = expand_env_vars("secret_key: ${ROUTER_TEST_SECRET}").unwrap();
        assert_eq!(output, "secret_key: sk-local");
        std::env::remove_var("ROUTER_TEST_SECRET");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("ROUTER_TEST_MISSING_PORT");
        let output = expand_env_vars("port: ${ROUTER_TEST_MISSING_PORT:-9090}").unwrap();
        assert_eq!(output, "port: 9090");
    }

    #[test]
    fn test_expand_env_vars_missing_without_default() {
        std::env::remove_var("ROUTER_TEST_ABSENT");
        let output = expand_env_vars("admin_token: \"${ROUTER_TEST_ABSENT}\"").unwrap();
        assert_eq!(output, "admin_token: \"\"");
    }

    #[test]
    fn test_load_yaml_config_with_providers() {
        let dir = std::env::temp_dir().join(format!("router-config-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");

        let mut file = fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
server:
  port: 9000
retry:
  max_attempts: 5
store:
  providers:
    gpt-4o:
      - url: "https://a.example.com/v1/chat/completions"
        token: "sk-a"
        priority: 60
        functionEnabled: true
"#
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.retry.max_attempts, 5);
        let records = &config.store.providers["gpt-4o"];
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].priority, Some(60));
        assert_eq!(records[0].function_enabled, Some(true));

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_file_is_config_error() {
        let err = load_config("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, ProxyError::Config(_)));
    }
}
