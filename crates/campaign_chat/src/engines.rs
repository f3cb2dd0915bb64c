//! Generation engine selection from the environment.

use std::sync::Arc;
use std::time::Duration;

use generation_engine::{EngineInitError, GenerationEngine};
use generation_engine_http::{HttpEngine, HttpEngineConfig, HTTP_ENGINE_ID};
use generation_engine_mock::{ScriptSource, ScriptedEngine, MOCK_ENGINE_ID};
use stream_protocol::url::DEFAULT_STREAM_BASE_URL;

pub const ENGINE_ENV_VAR: &str = "CAMPAIGN_CHAT_ENGINE";
pub const ENDPOINT_ENV_VAR: &str = "CAMPAIGN_CHAT_ENDPOINT";
pub const STEP_DELAY_ENV_VAR: &str = "CAMPAIGN_CHAT_STEP_DELAY_MS";
pub const MOCK_SCRIPT_ENV_VAR: &str = "CAMPAIGN_CHAT_MOCK_SCRIPT";

/// Engine settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub engine_id: Option<String>,
    pub endpoint: Option<String>,
    pub step_delay: Duration,
    pub mock_script: Option<String>,
    pub liveness_window: Duration,
}

impl EngineSettings {
    pub fn from_env(liveness_window: Duration) -> Self {
        Self {
            engine_id: env_string_opt(ENGINE_ENV_VAR),
            endpoint: env_string_opt(ENDPOINT_ENV_VAR),
            step_delay: env_string_opt(STEP_DELAY_ENV_VAR)
                .and_then(|value| value.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
                .unwrap_or(Duration::ZERO),
            mock_script: env_string_opt(MOCK_SCRIPT_ENV_VAR),
            liveness_window,
        }
    }
}

pub fn engine_from_env(liveness_window: Duration) -> Result<Arc<dyn GenerationEngine>, EngineInitError> {
    engine_for_settings(&EngineSettings::from_env(liveness_window))
}

pub fn engine_for_settings(
    settings: &EngineSettings,
) -> Result<Arc<dyn GenerationEngine>, EngineInitError> {
    let Some(engine_id) = settings.engine_id.as_deref() else {
        return Err(EngineInitError::new(format!(
            "{ENGINE_ENV_VAR} is required. Available engines: {MOCK_ENGINE_ID}, {HTTP_ENGINE_ID}"
        )));
    };

    match engine_id {
        MOCK_ENGINE_ID => {
            let source = match settings.mock_script.as_deref() {
                Some(script) => ScriptSource::parse(script).ok_or_else(|| {
                    EngineInitError::new(format!(
                        "Unsupported {MOCK_SCRIPT_ENV_VAR} '{script}'. Use 'blocks' or 'partial'"
                    ))
                })?,
                None => ScriptSource::Blocks,
            };
            Ok(Arc::new(
                ScriptedEngine::new(source).with_step_delay(settings.step_delay),
            ))
        }
        HTTP_ENGINE_ID => {
            let base_url = settings
                .endpoint
                .clone()
                .unwrap_or_else(|| DEFAULT_STREAM_BASE_URL.to_string());
            let engine = HttpEngine::new(
                HttpEngineConfig::new(base_url).with_liveness_window(settings.liveness_window),
            )?;
            Ok(Arc::new(engine))
        }
        unknown => Err(EngineInitError::new(format!(
            "Unsupported engine '{unknown}'. Available engines: {MOCK_ENGINE_ID}, {HTTP_ENGINE_ID}"
        ))),
    }
}

fn env_string_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(engine_id: Option<&str>) -> EngineSettings {
        EngineSettings {
            engine_id: engine_id.map(str::to_string),
            endpoint: None,
            step_delay: Duration::ZERO,
            mock_script: None,
            liveness_window: Duration::from_secs(30),
        }
    }

    #[test]
    fn mock_engine_resolves() {
        let engine = engine_for_settings(&settings(Some("mock"))).expect("mock engine should resolve");
        assert_eq!(engine.profile().engine_id, "mock");
    }

    #[test]
    fn http_engine_uses_the_configured_endpoint() {
        let mut settings = settings(Some("http"));
        settings.endpoint = Some("http://127.0.0.1:9999".to_string());
        let engine = engine_for_settings(&settings).expect("http engine should resolve");
        assert_eq!(engine.profile().engine_id, "http");
    }

    #[test]
    fn missing_and_unknown_engines_are_rejected() {
        let missing = match engine_for_settings(&settings(None)) {
            Ok(_) => panic!("a missing engine id should fail"),
            Err(error) => error,
        };
        assert!(missing.message().contains(ENGINE_ENV_VAR));

        let unknown = match engine_for_settings(&settings(Some("custom"))) {
            Ok(_) => panic!("unknown engines should fail"),
            Err(error) => error,
        };
        assert!(unknown.message().contains("Unsupported engine 'custom'"));
    }

    #[test]
    fn bad_mock_script_is_rejected() {
        let mut settings = settings(Some("mock"));
        settings.mock_script = Some("opera".to_string());
        assert!(engine_for_settings(&settings).is_err());
    }
}
