//! One-shot cache commands

use std::time::Duration;

use anyhow::{bail, Context};
use serde_json::{json, Value};

use crate::infrastructure::cache::CacheLayer;

use super::{bootstrap, print_json, Command};

/// Runs a single command against a fresh connection
pub async fn run(command: Command) -> anyhow::Result<()> {
    let config = bootstrap()?;
    let layer = CacheLayer::new(&config.cache);

    let result = execute(&layer, command).await;
    layer.shutdown().await;

    print_json(&result?)
}

/// Executes `command` and returns its JSON output
pub async fn execute(layer: &CacheLayer, command: Command) -> anyhow::Result<Value> {
    if command == Command::Health {
        // A failed connection is itself the health report
        let _ = layer.connector().connect().await;

        return Ok(json!({
            "health": layer.get_health().await,
            "connection": layer.connector().status().await,
        }));
    }

    layer
        .connector()
        .connect()
        .await
        .context("Cache backend unavailable")?;

    let cache = layer.cache();

    let output = match command {
        Command::Get { key } => serde_json::to_value(cache.get::<Value>(&key).await?)?,
        Command::Set { key, value, ttl } => {
            let value = parse_value(value);
            let stored = cache
                .set(&key, &value, ttl.map(Duration::from_secs), None)
                .await?;
            json!({ "key": key, "stored": stored })
        }
        Command::Del { key } => {
            let deleted = cache.del(&key).await?;
            json!({ "key": key, "deleted": deleted })
        }
        Command::Keys { pattern } => json!(cache.keys(&pattern).await?),
        Command::Flush => {
            let flushed = cache.flush_all().await?;
            json!({ "prefix": cache.key_space().prefix(), "flushed": flushed })
        }
        Command::Health | Command::Monitor(_) => bail!("not a one-shot command"),
    };

    Ok(output)
}

fn parse_value(raw: String) -> Value {
    serde_json::from_str(&raw).unwrap_or(Value::String(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSettings, LocalBackendConfig};
    use crate::domain::cache::SystemClock;
    use crate::infrastructure::cache::factory::mock::MockBackendFactory;
    use std::sync::Arc;

    fn layer(factory: MockBackendFactory) -> CacheLayer {
        let settings = CacheSettings::default()
            .with_local(LocalBackendConfig::new("localhost", 6379))
            .with_key_prefix("cli:")
            .with_retries(1, Duration::from_millis(10));

        CacheLayer::with_factory(&settings, Arc::new(factory), Arc::new(SystemClock))
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("{\"x\":1}".to_string()), json!({"x": 1}));
        assert_eq!(parse_value("42".to_string()), json!(42));
        assert_eq!(parse_value("plain text".to_string()), json!("plain text"));
    }

    #[tokio::test]
    async fn test_set_get_del_round() {
        let layer = layer(MockBackendFactory::new());

        let set = execute(
            &layer,
            Command::Set {
                key: "k".to_string(),
                value: "{\"x\":1}".to_string(),
                ttl: Some(60),
            },
        )
        .await
        .unwrap();
        assert_eq!(set["stored"], true);

        let get = execute(&layer, Command::Get { key: "k".to_string() })
            .await
            .unwrap();
        assert_eq!(get["value"], json!({"x": 1}));
        assert_eq!(get["ttl"], 60);

        let keys = execute(&layer, Command::Keys { pattern: "*".to_string() })
            .await
            .unwrap();
        assert_eq!(keys, json!(["k"]));

        let del = execute(&layer, Command::Del { key: "k".to_string() })
            .await
            .unwrap();
        assert_eq!(del["deleted"], true);

        let missing = execute(&layer, Command::Get { key: "k".to_string() })
            .await
            .unwrap();
        assert_eq!(missing, Value::Null);

        layer.shutdown().await;
    }

    #[tokio::test]
    async fn test_flush_reports_prefix() {
        let layer = layer(MockBackendFactory::new());

        let output = execute(&layer, Command::Flush).await.unwrap();

        assert_eq!(output, json!({"prefix": "cli:", "flushed": true}));
    }

    #[tokio::test]
    async fn test_health_reports_failed_connection() {
        let layer = layer(MockBackendFactory::new().always_failing());

        let output = execute(&layer, Command::Health).await.unwrap();

        assert_eq!(output["health"]["connected"], false);
        assert_eq!(output["health"]["status"], "unhealthy");
        assert_eq!(output["connection"]["exhausted"], true);
    }

    #[tokio::test]
    async fn test_data_command_fails_when_unreachable() {
        let layer = layer(MockBackendFactory::new().always_failing());

        let result = execute(&layer, Command::Get { key: "k".to_string() }).await;

        assert!(result.is_err());
    }
}
