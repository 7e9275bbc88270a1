use std::str::FromStr;

use anyhow::{bail, Result};
use arthub_oci::OciConfig;
use arthub_store::DbConfig;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(LogFormat::Json),
            "pretty" | "text" => Ok(LogFormat::Pretty),
            other => bail!("unknown log format {other:?} (expected json or pretty)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_format: LogFormat,
    pub database: DbConfig,
    pub oci: OciConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let log_level = std::env::var("HUB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match std::env::var("HUB_LOG_FORMAT") {
            Ok(v) => v.parse()?,
            Err(_) => LogFormat::Json,
        };

        Ok(Self {
            log_level,
            log_format,
            database: DbConfig::from_env(),
            oci: OciConfig::from_env(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("json", LogFormat::Json)]
    #[case("JSON", LogFormat::Json)]
    #[case("pretty", LogFormat::Pretty)]
    #[case("text", LogFormat::Pretty)]
    fn test_log_format_parse(#[case] input: &str, #[case] expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_log_format_rejects_unknown() {
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
