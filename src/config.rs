//! Configuration loader — merges env vars, .env file, and config.toml.

use common::config::AppConfig;
use common::Error;
use std::path::Path;

fn parse_positive_u64(raw: &str, env_name: &str) -> Result<u64, Error> {
    let parsed = raw
        .trim()
        .parse::<u64>()
        .map_err(|_| Error::Config(format!("{env_name} must be an integer > 0")))?;
    if parsed == 0 {
        return Err(Error::Config(format!("{env_name} must be an integer > 0")));
    }
    Ok(parsed)
}

fn parse_bool(raw: &str) -> bool {
    let lowered = raw.trim().to_ascii_lowercase();
    lowered != "0" && lowered != "false" && lowered != "no" && lowered != "off"
}

fn validate_config(config: &AppConfig) -> Result<(), Error> {
    let mut issues: Vec<String> = Vec::new();

    if config.upstream.base_url.trim().is_empty() {
        issues.push("upstream.base_url must not be empty".into());
    } else if !config.upstream.base_url.starts_with("http://")
        && !config.upstream.base_url.starts_with("https://")
    {
        issues.push("upstream.base_url must be an http(s) URL".into());
    }
    if config.upstream.request_timeout_secs == 0 {
        issues.push("upstream.request_timeout_secs must be > 0".into());
    }
    if config.upstream.connect_timeout_secs == 0 {
        issues.push("upstream.connect_timeout_secs must be > 0".into());
    }
    if config.upstream.connect_timeout_secs > config.upstream.request_timeout_secs {
        issues.push(
            "upstream.connect_timeout_secs must be <= upstream.request_timeout_secs".into(),
        );
    }

    if config.cache.ttl_secs == 0 {
        issues.push("cache.ttl_secs must be > 0".into());
    }
    if config.cache.cleanup_interval_secs == 0 {
        issues.push("cache.cleanup_interval_secs must be > 0".into());
    }

    let mut seen = std::collections::HashSet::new();
    for mosque in &config.mosques {
        if mosque.id.trim().is_empty() {
            issues.push(format!("mosques: entry '{}' has an empty id", mosque.name));
        } else if !seen.insert(mosque.id.as_str()) {
            issues.push(format!("mosques: duplicate id '{}'", mosque.id));
        }
    }

    if config.watch.refresh_interval_secs == 0 {
        issues.push("watch.refresh_interval_secs must be > 0".into());
    }
    if config.watch.heartbeat_interval_secs == 0 {
        issues.push("watch.heartbeat_interval_secs must be > 0".into());
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "Invalid config:\n - {}",
            issues.join("\n - ")
        )))
    }
}

fn apply_env_overrides(
    config: &mut AppConfig,
    var: impl Fn(&str) -> Option<String>,
) -> Result<(), Error> {
    if let Some(url) = var("MAWAQIT_BASE_URL") {
        config.upstream.base_url = url.trim().to_string();
    }
    if let Some(raw) = var("MAWAQIT_TIMEOUT_SECS") {
        config.upstream.request_timeout_secs = parse_positive_u64(&raw, "MAWAQIT_TIMEOUT_SECS")?;
    }
    if let Some(raw) = var("PRAYER_CACHE_TTL_SECS") {
        config.cache.ttl_secs = parse_positive_u64(&raw, "PRAYER_CACHE_TTL_SECS")?;
    }
    if let Some(raw) = var("PRAYER_CACHE_CLEANUP_SECS") {
        config.cache.cleanup_interval_secs =
            parse_positive_u64(&raw, "PRAYER_CACHE_CLEANUP_SECS")?;
    }
    if let Some(raw) = var("PRAYER_SINGLE_FLIGHT") {
        config.cache.single_flight = parse_bool(&raw);
    }
    if let Some(id) = var("DEFAULT_MASJID") {
        config.default_masjid = id.trim().to_string();
    }
    Ok(())
}

/// Load configuration from environment and optional config file.
pub fn load_config() -> Result<AppConfig, Error> {
    // 1. Load .env file from project root or parent directories.
    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env file loaded: {}", e);
    }

    // 2. Start with defaults.
    let mut config = AppConfig::default();

    // 3. Try loading config.toml if it exists.
    let config_path = Path::new("config.toml");
    if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .map_err(|e| Error::Config(format!("Failed to read config.toml: {}", e)))?;
        config = toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("Failed to parse config.toml: {}", e)))?;
    }

    // 4. Override with environment variables (highest priority).
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;

    validate_config(&config)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("MAWAQIT_BASE_URL", " http://localhost:8080/en/m "),
                ("MAWAQIT_TIMEOUT_SECS", "20"),
                ("PRAYER_CACHE_TTL_SECS", "60"),
                ("PRAYER_SINGLE_FLIGHT", "off"),
                ("DEFAULT_MASJID", "mosquee-de-paris"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.upstream.base_url, "http://localhost:8080/en/m");
        assert_eq!(cfg.upstream.request_timeout_secs, 20);
        assert_eq!(cfg.cache.ttl_secs, 60);
        assert_eq!(cfg.cache.cleanup_interval_secs, 300);
        assert!(!cfg.cache.single_flight);
        assert_eq!(cfg.default_masjid, "mosquee-de-paris");
    }

    #[test]
    fn test_env_rejects_zero_ttl() {
        let mut cfg = AppConfig::default();
        let err = apply_env_overrides(&mut cfg, env(&[("PRAYER_CACHE_TTL_SECS", "0")])).unwrap_err();
        assert!(err.to_string().contains("PRAYER_CACHE_TTL_SECS"));
    }

    #[test]
    fn test_toml_sections_merge_with_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
default_masjid = "mosquee-de-paris"

[cache]
ttl_secs = 120

[[mosques]]
id = "mosquee-de-paris"
name = "Grande Mosquée de Paris"
timezone = "Europe/Paris"
"#,
        )
        .unwrap();

        assert_eq!(cfg.cache.ttl_secs, 120);
        assert!(cfg.cache.single_flight);
        assert_eq!(cfg.upstream.request_timeout_secs, 15);
        assert_eq!(cfg.mosques.len(), 1);
        assert!(validate_config(&cfg).is_ok());
    }

    #[test]
    fn test_validation_collects_every_issue() {
        let mut cfg = AppConfig::default();
        cfg.upstream.base_url = "ftp://example.com".into();
        cfg.cache.cleanup_interval_secs = 0;
        cfg.mosques = vec![
            common::config::MosqueConfig {
                id: "m1".into(),
                name: "One".into(),
                country: String::new(),
                city: String::new(),
                timezone: String::new(),
            };
            2
        ];

        let msg = validate_config(&cfg).unwrap_err().to_string();
        assert!(msg.contains("http(s) URL"), "{msg}");
        assert!(msg.contains("cache.cleanup_interval_secs"), "{msg}");
        assert!(msg.contains("duplicate id 'm1'"), "{msg}");
    }
}
