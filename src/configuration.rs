use derive_more::{Display, Error};
use std::env;
use std::net::SocketAddr;
use url::Url;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";
const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";
const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TTS_ENDPOINT: &str = "https://texttospeech.googleapis.com";
const DEFAULT_RATE_LIMIT_PER_SECOND: u32 = 5;
const DEFAULT_MAX_UPLOAD_BYTES: u64 = 20 * 1024 * 1024;

#[derive(Debug, Display, Error, PartialEq)]
pub enum ConfigurationError {
    #[display(fmt = "Missing environment variable {}", _0)]
    Missing(#[error(not(source))] &'static str),
    #[display(fmt = "Environment variable {} has an invalid value: {}", name, reason)]
    Invalid { name: &'static str, reason: String },
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub database_url: Secret,
    pub bind_address: SocketAddr,
    pub storage: StorageConfiguration,
    pub openai: Option<OpenAiConfiguration>,
    pub speech: Option<SpeechConfiguration>,
    pub honeycomb: Option<HoneycombConfiguration>,
    pub rate_limit_per_second: u32,
    pub max_upload_bytes: u64,
}

#[derive(Debug, Clone)]
pub struct StorageConfiguration {
    pub access_key: Secret,
    pub secret_key: Secret,
    pub endpoint: Url,
    pub bucket: String,
    pub region: String,
}

#[derive(Debug, Clone)]
pub struct OpenAiConfiguration {
    pub api_key: Secret,
    pub endpoint: Url,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct SpeechConfiguration {
    pub api_key: Secret,
    pub endpoint: Url,
}

#[derive(Debug, Clone)]
pub struct HoneycombConfiguration {
    pub api_key: Secret,
    pub dataset: String,
}

/// A configuration value that must not show up in logs.
#[derive(Clone, PartialEq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl Configuration {
    pub fn from_env() -> Result<Configuration, ConfigurationError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Configuration, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let require = |name: &'static str| get(name).ok_or(ConfigurationError::Missing(name));

        let storage = StorageConfiguration {
            access_key: Secret(require("AFFIRM_STORAGE_KEY")?),
            secret_key: Secret(require("AFFIRM_STORAGE_SECRET")?),
            endpoint: parse_url("AFFIRM_STORAGE_ENDPOINT", &require("AFFIRM_STORAGE_ENDPOINT")?)?,
            bucket: require("AFFIRM_STORAGE_BUCKET")?,
            region: get("AFFIRM_STORAGE_REGION").unwrap_or_else(|| "auto".into()),
        };

        let openai = match get("OPENAI_API_KEY") {
            Some(api_key) => Some(OpenAiConfiguration {
                api_key: Secret(api_key),
                endpoint: parse_url(
                    "AFFIRM_OPENAI_ENDPOINT",
                    &get("AFFIRM_OPENAI_ENDPOINT").unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.into()),
                )?,
                model: get("AFFIRM_OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.into()),
            }),
            None => None,
        };

        let speech = match get("GOOGLE_CLOUD_API_KEY") {
            Some(api_key) => Some(SpeechConfiguration {
                api_key: Secret(api_key),
                endpoint: parse_url(
                    "AFFIRM_TTS_ENDPOINT",
                    &get("AFFIRM_TTS_ENDPOINT").unwrap_or_else(|| DEFAULT_TTS_ENDPOINT.into()),
                )?,
            }),
            None => None,
        };

        let honeycomb = match (get("HONEYCOMB_API_KEY"), get("HONEYCOMB_DATASET")) {
            (Some(api_key), Some(dataset)) => Some(HoneycombConfiguration {
                api_key: Secret(api_key),
                dataset,
            }),
            _ => None,
        };

        let bind_address = get("AFFIRM_BIND_ADDRESS")
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.into())
            .parse()
            .map_err(|err: std::net::AddrParseError| ConfigurationError::Invalid {
                name: "AFFIRM_BIND_ADDRESS",
                reason: err.to_string(),
            })?;

        let rate_limit_per_second = parse_number(
            "AFFIRM_RATE_LIMIT_PER_SECOND",
            get("AFFIRM_RATE_LIMIT_PER_SECOND"),
            DEFAULT_RATE_LIMIT_PER_SECOND,
        )?;
        if rate_limit_per_second == 0 {
            return Err(ConfigurationError::Invalid {
                name: "AFFIRM_RATE_LIMIT_PER_SECOND",
                reason: "must be greater than zero".into(),
            });
        }

        Ok(Configuration {
            database_url: Secret(require("DATABASE_URL")?),
            bind_address,
            storage,
            openai,
            speech,
            honeycomb,
            rate_limit_per_second,
            max_upload_bytes: parse_number(
                "AFFIRM_MAX_UPLOAD_BYTES",
                get("AFFIRM_MAX_UPLOAD_BYTES"),
                DEFAULT_MAX_UPLOAD_BYTES,
            )?,
        })
    }
}

fn parse_url(name: &'static str, value: &str) -> Result<Url, ConfigurationError> {
    Url::parse(value).map_err(|err| ConfigurationError::Invalid {
        name,
        reason: err.to_string(),
    })
}

fn parse_number<T>(name: &'static str, value: Option<String>, default: T) -> Result<T, ConfigurationError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigurationError::Invalid {
            name,
            reason: err.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("DATABASE_URL", "postgres://affirm@localhost/affirm"),
        ("AFFIRM_STORAGE_KEY", "key"),
        ("AFFIRM_STORAGE_SECRET", "secret"),
        ("AFFIRM_STORAGE_ENDPOINT", "https://storage.example.com"),
        ("AFFIRM_STORAGE_BUCKET", "affirm-audio"),
    ];

    #[test]
    fn defaults_apply_when_optional_values_are_missing() {
        let config = Configuration::from_lookup(lookup(REQUIRED)).expect("valid configuration");
        assert_eq!(config.bind_address, "0.0.0.0:3000".parse::<SocketAddr>().unwrap());
        assert_eq!(config.storage.region, "auto");
        assert_eq!(config.rate_limit_per_second, 5);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert!(config.openai.is_none());
        assert!(config.speech.is_none());
        assert!(config.honeycomb.is_none());
    }

    #[test]
    fn provider_keys_enable_clients() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("OPENAI_API_KEY", "sk-test"));
        vars.push(("GOOGLE_CLOUD_API_KEY", "g-test"));
        vars.push(("AFFIRM_OPENAI_MODEL", "gpt-4o"));
        let config = Configuration::from_lookup(lookup(&vars)).expect("valid configuration");
        let openai = config.openai.expect("openai configured");
        assert_eq!(openai.model, "gpt-4o");
        assert_eq!(openai.endpoint.as_str(), "https://api.openai.com/v1");
        let speech = config.speech.expect("speech configured");
        assert_eq!(speech.api_key.expose(), "g-test");
    }

    #[test]
    fn missing_required_value_is_reported() {
        let vars: Vec<_> = REQUIRED
            .iter()
            .copied()
            .filter(|(k, _)| *k != "AFFIRM_STORAGE_BUCKET")
            .collect();
        let err = Configuration::from_lookup(lookup(&vars)).unwrap_err();
        assert_eq!(err, ConfigurationError::Missing("AFFIRM_STORAGE_BUCKET"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut vars = REQUIRED.to_vec();
        vars.push(("AFFIRM_RATE_LIMIT_PER_SECOND", "0"));
        assert!(matches!(
            Configuration::from_lookup(lookup(&vars)),
            Err(ConfigurationError::Invalid { name: "AFFIRM_RATE_LIMIT_PER_SECOND", .. })
        ));
        let mut vars = REQUIRED.to_vec();
        vars.push(("AFFIRM_BIND_ADDRESS", "not an address"));
        assert!(matches!(
            Configuration::from_lookup(lookup(&vars)),
            Err(ConfigurationError::Invalid { name: "AFFIRM_BIND_ADDRESS", .. })
        ));
    }

    #[test]
    fn secrets_are_redacted_in_debug_output() {
        let config = Configuration::from_lookup(lookup(REQUIRED)).expect("valid configuration");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("secret\""));
        assert!(!debug.contains("postgres://"));
    }
}
