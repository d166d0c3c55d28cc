//! Worker configuration sourced from the process environment.

use crate::executor::DelayRange;
use crate::handler::{FibonacciMethod, ResultFormat, DEFAULT_MAX_N};
use crate::retry::RetryPolicy;
use crate::worker::UnrecognizedPolicy;
use colony_core::{
    Credential, ResourceDescriptor, Result, WorkerError, WorkerProfile, DEFAULT_ID_FILE,
};
use config::{Config, Environment, Map};
use serde::Deserialize;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

const DEFAULT_CPU: &str = "AMD Ryzen 9 5950X (32) @ 3.400GHz";
const DEFAULT_RUNTIME_TYPE: &str = "fibonacci";
const DEFAULT_BACKOFF_MS: u64 = 1000;
const DEFAULT_ASSIGN_TIMEOUT_SECS: u64 = 10;

/// Raw environment values. The `config` crate lowercases variable names,
/// so `COLONIES_SERVER_PORT` lands in `colonies_server_port`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EnvSettings {
    colonyid: Option<String>,
    colonyprvkey: Option<String>,
    colonies_server_host: Option<String>,
    colonies_server_port: Option<String>,
    colonies_tls: Option<String>,
    cores: Option<String>,
    mem: Option<String>,
    cpu: Option<String>,
    gpu: Option<String>,
    gpus: Option<String>,
    runtime_type: Option<String>,
    runtime_name: Option<String>,
    runtime_id_file: Option<String>,
    worker_backoff_ms: Option<String>,
    worker_backoff_max_ms: Option<String>,
    worker_backoff_jitter_ms: Option<String>,
    worker_assign_timeout_secs: Option<String>,
    worker_task_timeout_secs: Option<String>,
    worker_delay_min_ms: Option<String>,
    worker_delay_max_ms: Option<String>,
    worker_result_format: Option<String>,
    worker_fib_method: Option<String>,
    worker_fib_max_n: Option<String>,
    worker_unrecognized_policy: Option<String>,
    worker_require_registration: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// Everything the run path needs, validated.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub server: ServerSettings,
    pub colony_id: String,
    pub colony_credential: Credential,
    pub profile: WorkerProfile,
    pub id_file: PathBuf,
    pub retry: RetryPolicy,
    pub assign_timeout: Duration,
    pub task_timeout: Option<Duration>,
    pub delay: Option<DelayRange>,
    pub result_format: ResultFormat,
    pub fib_method: FibonacciMethod,
    pub fib_max_n: u64,
    pub unrecognized: UnrecognizedPolicy,
    pub require_registration: bool,
}

/// The deregistration path only needs to reach the server and find the id.
#[derive(Debug, Clone)]
pub struct DeregisterConfig {
    pub server: ServerSettings,
    pub colony_credential: Credential,
    pub id_file: PathBuf,
}

impl EnvSettings {
    pub fn from_env() -> Result<Self> {
        Self::load(Environment::default())
    }

    /// Read from an explicit variable map instead of the process environment.
    pub fn from_map(vars: Map<String, String>) -> Result<Self> {
        Self::load(Environment::default().source(Some(vars)))
    }

    fn load(environment: Environment) -> Result<Self> {
        Config::builder()
            .add_source(environment)
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| WorkerError::Configuration(e.to_string()))
    }

    pub fn server(&self) -> Result<ServerSettings> {
        let host = required("COLONIES_SERVER_HOST", &self.colonies_server_host)?.to_string();
        let port = number(
            "COLONIES_SERVER_PORT",
            required("COLONIES_SERVER_PORT", &self.colonies_server_port)?,
        )?;
        let tls = flag("COLONIES_TLS", &self.colonies_tls, true)?;
        Ok(ServerSettings { host, port, tls })
    }

    pub fn worker_config(&self) -> Result<WorkerConfig> {
        let server = self.server()?;
        let colony_id = required("COLONYID", &self.colonyid)?.to_string();
        let colony_credential = self.colony_credential()?;

        let resources = ResourceDescriptor {
            cpu: text(&self.cpu).unwrap_or(DEFAULT_CPU).to_string(),
            cores: number("CORES", required("CORES", &self.cores)?)?,
            memory: number("MEM", required("MEM", &self.mem)?)?,
            gpu: text(&self.gpu).unwrap_or_default().to_string(),
            gpus: optional_number("GPUS", &self.gpus)?.unwrap_or(0),
        };
        let runtime_type = text(&self.runtime_type).unwrap_or(DEFAULT_RUNTIME_TYPE).to_string();
        let name = text(&self.runtime_name).unwrap_or(&runtime_type).to_string();

        let delay = match (
            optional_number::<u64>("WORKER_DELAY_MIN_MS", &self.worker_delay_min_ms)?,
            optional_number::<u64>("WORKER_DELAY_MAX_MS", &self.worker_delay_max_ms)?,
        ) {
            (None, None) => None,
            (min, max) => {
                let min = min.unwrap_or(0);
                let max = max.unwrap_or(min);
                Some(DelayRange::new(Duration::from_millis(min), Duration::from_millis(max))?)
            }
        };

        Ok(WorkerConfig {
            server,
            colony_id,
            colony_credential,
            profile: WorkerProfile {
                runtime_type,
                name,
                resources,
            },
            id_file: self.id_file(),
            retry: self.retry_policy()?,
            assign_timeout: Duration::from_secs(
                optional_number("WORKER_ASSIGN_TIMEOUT_SECS", &self.worker_assign_timeout_secs)?
                    .unwrap_or(DEFAULT_ASSIGN_TIMEOUT_SECS),
            ),
            task_timeout: optional_number(
                "WORKER_TASK_TIMEOUT_SECS",
                &self.worker_task_timeout_secs,
            )?
            .map(Duration::from_secs),
            delay,
            result_format: choice("WORKER_RESULT_FORMAT", &self.worker_result_format)?,
            fib_method: choice("WORKER_FIB_METHOD", &self.worker_fib_method)?,
            fib_max_n: optional_number("WORKER_FIB_MAX_N", &self.worker_fib_max_n)?
                .unwrap_or(DEFAULT_MAX_N),
            unrecognized: choice("WORKER_UNRECOGNIZED_POLICY", &self.worker_unrecognized_policy)?,
            require_registration: flag(
                "WORKER_REQUIRE_REGISTRATION",
                &self.worker_require_registration,
                false,
            )?,
        })
    }

    pub fn deregister_config(&self) -> Result<DeregisterConfig> {
        Ok(DeregisterConfig {
            server: self.server()?,
            colony_credential: self.colony_credential()?,
            id_file: self.id_file(),
        })
    }

    fn colony_credential(&self) -> Result<Credential> {
        let encoded = required("COLONYPRVKEY", &self.colonyprvkey)?;
        Credential::from_hex(encoded)
            .map_err(|e| WorkerError::Configuration(format!("COLONYPRVKEY: {}", e)))
    }

    fn id_file(&self) -> PathBuf {
        PathBuf::from(text(&self.runtime_id_file).unwrap_or(DEFAULT_ID_FILE))
    }

    fn retry_policy(&self) -> Result<RetryPolicy> {
        let interval = optional_number("WORKER_BACKOFF_MS", &self.worker_backoff_ms)?
            .unwrap_or(DEFAULT_BACKOFF_MS);
        let jitter = optional_number("WORKER_BACKOFF_JITTER_MS", &self.worker_backoff_jitter_ms)?
            .unwrap_or(0);

        let max = optional_number::<u64>("WORKER_BACKOFF_MAX_MS", &self.worker_backoff_max_ms)?;
        let policy = match max {
            Some(max) if max < interval => {
                return Err(WorkerError::Configuration(format!(
                    "WORKER_BACKOFF_MAX_MS ({}) is below WORKER_BACKOFF_MS ({})",
                    max, interval
                )))
            }
            Some(max) if max > interval => RetryPolicy::exponential(
                Duration::from_millis(interval),
                Duration::from_millis(max),
            ),
            _ => RetryPolicy::fixed(Duration::from_millis(interval)),
        };
        Ok(policy.with_jitter(Duration::from_millis(jitter)))
    }
}

/// Set and non-blank.
fn text(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

fn required<'a>(name: &str, field: &'a Option<String>) -> Result<&'a str> {
    text(field).ok_or_else(|| WorkerError::Configuration(format!("{} is not set", name)))
}

fn number<T>(name: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse().map_err(|e| {
        WorkerError::Configuration(format!(
            "{} must be a non-negative integer, got {:?}: {}",
            name, raw, e
        ))
    })
}

fn optional_number<T>(name: &str, field: &Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    text(field).map(|raw| number(name, raw)).transpose()
}

fn flag(name: &str, field: &Option<String>, default: bool) -> Result<bool> {
    match text(field).map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => Err(WorkerError::Configuration(format!(
            "{} must be true or false, got {:?}",
            name, other
        ))),
    }
}

fn choice<T>(name: &str, field: &Option<String>) -> Result<T>
where
    T: FromStr<Err = String> + Default,
{
    match text(field) {
        None => Ok(T::default()),
        Some(raw) => raw
            .parse()
            .map_err(|e| WorkerError::Configuration(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Backoff;

    const KEY: &str = "4242424242424242424242424242424242424242424242424242424242424242";

    fn vars(pairs: &[(&str, &str)]) -> Map<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn base() -> Vec<(&'static str, &'static str)> {
        vec![
            ("COLONYID", "colony-1"),
            ("COLONYPRVKEY", KEY),
            ("COLONIES_SERVER_HOST", "localhost"),
            ("COLONIES_SERVER_PORT", "50080"),
            ("CORES", "32"),
            ("MEM", "65536"),
        ]
    }

    fn with(overrides: &[(&'static str, &'static str)]) -> Result<WorkerConfig> {
        let mut pairs = base();
        pairs.retain(|(k, _)| !overrides.iter().any(|(o, _)| o == k));
        pairs.extend_from_slice(overrides);
        EnvSettings::from_map(vars(&pairs))?.worker_config()
    }

    fn without(key: &str) -> Result<WorkerConfig> {
        let mut pairs = base();
        pairs.retain(|(k, _)| *k != key);
        EnvSettings::from_map(vars(&pairs))?.worker_config()
    }

    fn config_error(result: Result<WorkerConfig>) -> String {
        match result {
            Err(WorkerError::Configuration(message)) => message,
            other => panic!("expected configuration error, got {:?}", other),
        }
    }

    fn rejected(overrides: &[(&'static str, &'static str)]) -> String {
        config_error(with(overrides))
    }

    #[test]
    fn test_defaults() {
        let config = with(&[]).unwrap();

        assert_eq!(
            config.server,
            ServerSettings {
                host: "localhost".into(),
                port: 50080,
                tls: true
            }
        );
        assert_eq!(config.colony_id, "colony-1");
        assert_eq!(config.profile.runtime_type, "fibonacci");
        assert_eq!(config.profile.name, "fibonacci");
        assert_eq!(config.profile.resources.cores, 32);
        assert_eq!(config.profile.resources.memory, 65536);
        assert_eq!(config.profile.resources.cpu, DEFAULT_CPU);
        assert_eq!(config.profile.resources.gpus, 0);
        assert_eq!(config.id_file, PathBuf::from(DEFAULT_ID_FILE));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.assign_timeout, Duration::from_secs(10));
        assert_eq!(config.task_timeout, None);
        assert_eq!(config.delay, None);
        assert_eq!(config.result_format, ResultFormat::Digits);
        assert_eq!(config.fib_method, FibonacciMethod::Iterative);
        assert_eq!(config.fib_max_n, DEFAULT_MAX_N);
        assert_eq!(config.unrecognized, UnrecognizedPolicy::Leave);
        assert!(!config.require_registration);
    }

    #[test]
    fn test_missing_memory_is_configuration_error() {
        let message = config_error(without("MEM"));
        assert!(message.contains("MEM"));
    }

    #[test]
    fn test_blank_value_counts_as_missing() {
        let message = rejected(&[("COLONYID", "  ")]);
        assert!(message.contains("COLONYID"));
    }

    #[test]
    fn test_non_numeric_inputs() {
        assert!(rejected(&[("COLONIES_SERVER_PORT", "http")]).contains("COLONIES_SERVER_PORT"));
        assert!(rejected(&[("CORES", "-4")]).contains("CORES"));
        assert!(rejected(&[("MEM", "lots")]).contains("MEM"));
        assert!(rejected(&[("COLONIES_SERVER_PORT", "70000")]).contains("COLONIES_SERVER_PORT"));
    }

    #[test]
    fn test_malformed_colony_key() {
        let message = rejected(&[("COLONYPRVKEY", "not-a-key")]);
        assert!(message.contains("COLONYPRVKEY"));
    }

    #[test]
    fn test_overrides() {
        let config = with(&[
            ("COLONIES_TLS", "false"),
            ("RUNTIME_TYPE", "fib-term"),
            ("RUNTIME_NAME", "fib-term-01"),
            ("GPU", "RTX 3070"),
            ("GPUS", "1"),
            ("RUNTIME_ID_FILE", "/var/lib/worker/runtimeid"),
            ("WORKER_BACKOFF_MS", "250"),
            ("WORKER_BACKOFF_JITTER_MS", "50"),
            ("WORKER_TASK_TIMEOUT_SECS", "30"),
            ("WORKER_DELAY_MIN_MS", "100"),
            ("WORKER_DELAY_MAX_MS", "40000"),
            ("WORKER_RESULT_FORMAT", "term"),
            ("WORKER_FIB_METHOD", "doubling"),
            ("WORKER_FIB_MAX_N", "5000"),
            ("WORKER_UNRECOGNIZED_POLICY", "fail"),
            ("WORKER_REQUIRE_REGISTRATION", "yes"),
        ])
        .unwrap();

        assert!(!config.server.tls);
        assert_eq!(config.profile.runtime_type, "fib-term");
        assert_eq!(config.profile.name, "fib-term-01");
        assert_eq!(config.profile.resources.gpu, "RTX 3070");
        assert_eq!(config.profile.resources.gpus, 1);
        assert_eq!(config.id_file, PathBuf::from("/var/lib/worker/runtimeid"));
        assert_eq!(config.retry.backoff(), Backoff::Fixed(Duration::from_millis(250)));
        assert_eq!(config.retry.jitter(), Duration::from_millis(50));
        assert_eq!(config.task_timeout, Some(Duration::from_secs(30)));
        assert_eq!(
            config.delay,
            Some(DelayRange::new(Duration::from_millis(100), Duration::from_secs(40)).unwrap())
        );
        assert_eq!(config.result_format, ResultFormat::Term);
        assert_eq!(config.fib_method, FibonacciMethod::Doubling);
        assert_eq!(config.fib_max_n, 5000);
        assert_eq!(config.unrecognized, UnrecognizedPolicy::Fail);
        assert!(config.require_registration);
    }

    #[test]
    fn test_exponential_backoff_when_max_set() {
        let config =
            with(&[("WORKER_BACKOFF_MS", "500"), ("WORKER_BACKOFF_MAX_MS", "8000")]).unwrap();
        assert_eq!(
            config.retry.backoff(),
            Backoff::Exponential {
                base: Duration::from_millis(500),
                max: Duration::from_secs(8)
            }
        );

        assert!(rejected(&[("WORKER_BACKOFF_MAX_MS", "10")]).contains("WORKER_BACKOFF_MAX_MS"));
    }

    #[test]
    fn test_invalid_choices() {
        let inverted = rejected(&[("WORKER_DELAY_MIN_MS", "500"), ("WORKER_DELAY_MAX_MS", "100")]);
        assert!(inverted.contains("exceeds"));

        let policy = rejected(&[("WORKER_UNRECOGNIZED_POLICY", "ignore")]);
        assert!(policy.contains("WORKER_UNRECOGNIZED_POLICY"));

        assert!(rejected(&[("WORKER_FIB_MAX_N", "lots")]).contains("WORKER_FIB_MAX_N"));
        assert!(rejected(&[("COLONIES_TLS", "maybe")]).contains("COLONIES_TLS"));
    }

    #[test]
    fn test_deregister_needs_no_profile() {
        let settings = EnvSettings::from_map(vars(&[
            ("COLONYPRVKEY", KEY),
            ("COLONIES_SERVER_HOST", "localhost"),
            ("COLONIES_SERVER_PORT", "50080"),
            ("RUNTIME_ID_FILE", "/tmp/other-id"),
        ]))
        .unwrap();

        let config = settings.deregister_config().unwrap();
        assert_eq!(config.server.port, 50080);
        assert_eq!(config.id_file, PathBuf::from("/tmp/other-id"));
        assert!(settings.worker_config().is_err());
    }
}
