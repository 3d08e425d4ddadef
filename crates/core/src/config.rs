//! 설정 관리: ecuscan.toml 파싱 및 런타임 설정
//!
//! [`EcuscanConfig`]는 모든 컴포넌트의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`ECUSCAN_SERVER_LISTEN_ADDR=0.0.0.0:8080` 형식)
//! 3. 설정 파일 (`ecuscan.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), ecuscan_core::error::EcuscanError> {
//! use ecuscan_core::config::EcuscanConfig;
//!
//! let config = EcuscanConfig::load("ecuscan.toml").await?;
//! let config = EcuscanConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, EcuscanError};
use crate::risk::RiskPolicy;

/// 지원하는 분석 엔진 이름
pub const ENGINES: [&str; 3] = ["simulated", "sast", "ai"];

/// 게이트웨이 기본 모델
pub const DEFAULT_GATEWAY_MODEL: &str = "google/gemini-2.5-flash";

/// ecuscan 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EcuscanConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// HTTP API 서버 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 스토리지 설정
    #[serde(default)]
    pub storage: StorageConfig,
    /// 분석 파이프라인 설정
    #[serde(default)]
    pub analysis: AnalysisConfig,
    /// 메트릭 익스포터 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl EcuscanConfig {
    /// TOML 파일을 읽고 환경변수 오버라이드를 적용한 뒤 검증합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, EcuscanError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, EcuscanError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EcuscanError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                EcuscanError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, EcuscanError> {
        toml::from_str(toml_str).map_err(|e| {
            EcuscanError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `ECUSCAN_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "ECUSCAN_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "ECUSCAN_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "ECUSCAN_GENERAL_DATA_DIR");
        override_string(&mut self.general.pid_file, "ECUSCAN_GENERAL_PID_FILE");

        // Server
        override_string(
            &mut self.server.listen_addr,
            "ECUSCAN_SERVER_LISTEN_ADDR",
        );
        override_string(&mut self.server.api_key, "ECUSCAN_SERVER_API_KEY");
        override_csv(
            &mut self.server.cors_origins,
            "ECUSCAN_SERVER_CORS_ORIGINS",
        );
        override_usize(
            &mut self.server.max_body_bytes,
            "ECUSCAN_SERVER_MAX_BODY_BYTES",
        );
        override_usize(
            &mut self.server.event_channel_capacity,
            "ECUSCAN_SERVER_EVENT_CHANNEL_CAPACITY",
        );

        // Storage
        override_string(&mut self.storage.db_path, "ECUSCAN_STORAGE_DB_PATH");
        override_bool(&mut self.storage.in_memory, "ECUSCAN_STORAGE_IN_MEMORY");

        // Analysis
        override_string(&mut self.analysis.engine, "ECUSCAN_ANALYSIS_ENGINE");
        override_u64(
            &mut self.analysis.stage_delay_ms,
            "ECUSCAN_ANALYSIS_STAGE_DELAY_MS",
        );
        override_u64(
            &mut self.analysis.stale_timeout_secs,
            "ECUSCAN_ANALYSIS_STALE_TIMEOUT_SECS",
        );
        override_u64(
            &mut self.analysis.sweep_interval_secs,
            "ECUSCAN_ANALYSIS_SWEEP_INTERVAL_SECS",
        );
        override_u32(
            &mut self.analysis.critical_weight,
            "ECUSCAN_ANALYSIS_CRITICAL_WEIGHT",
        );
        override_u32(
            &mut self.analysis.high_weight,
            "ECUSCAN_ANALYSIS_HIGH_WEIGHT",
        );
        override_u32(
            &mut self.analysis.medium_weight,
            "ECUSCAN_ANALYSIS_MEDIUM_WEIGHT",
        );
        override_u32(
            &mut self.analysis.base_offset,
            "ECUSCAN_ANALYSIS_BASE_OFFSET",
        );
        override_string(
            &mut self.analysis.gateway_url,
            "ECUSCAN_ANALYSIS_GATEWAY_URL",
        );
        override_string(
            &mut self.analysis.gateway_model,
            "ECUSCAN_ANALYSIS_GATEWAY_MODEL",
        );
        override_string(
            &mut self.analysis.gateway_api_key,
            "ECUSCAN_ANALYSIS_GATEWAY_API_KEY",
        );
        override_u64(
            &mut self.analysis.gateway_timeout_secs,
            "ECUSCAN_ANALYSIS_GATEWAY_TIMEOUT_SECS",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "ECUSCAN_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "ECUSCAN_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "ECUSCAN_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "ECUSCAN_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), EcuscanError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        if self.server.listen_addr.parse::<SocketAddr>().is_err() {
            return Err(invalid(
                "server.listen_addr",
                format!("'{}' is not a valid socket address", self.server.listen_addr),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(invalid("server.max_body_bytes", "must be greater than 0"));
        }
        if self.server.event_channel_capacity == 0 {
            return Err(invalid(
                "server.event_channel_capacity",
                "must be greater than 0",
            ));
        }

        if !self.storage.in_memory && self.general.data_dir.is_empty() && self.storage.db_path.is_empty()
        {
            return Err(invalid(
                "storage.db_path",
                "either storage.db_path or general.data_dir must be set",
            ));
        }

        if !ENGINES.contains(&self.analysis.engine.as_str()) {
            return Err(invalid(
                "analysis.engine",
                format!("must be one of: {}", ENGINES.join(", ")),
            ));
        }
        if self.analysis.stale_timeout_secs == 0 {
            return Err(invalid(
                "analysis.stale_timeout_secs",
                "must be greater than 0",
            ));
        }
        if self.analysis.sweep_interval_secs == 0 {
            return Err(invalid(
                "analysis.sweep_interval_secs",
                "must be greater than 0",
            ));
        }
        if let Err(reason) = self.analysis.risk_policy().validate() {
            return Err(invalid("analysis.critical_weight", reason));
        }
        if self.analysis.gateway_enabled() {
            let url = self.analysis.gateway_url.as_str();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(
                    "analysis.gateway_url",
                    "must start with http:// or https://",
                ));
            }
            if self.analysis.gateway_model.trim().is_empty() {
                return Err(invalid("analysis.gateway_model", "must not be empty"));
            }
            if self.analysis.gateway_timeout_secs == 0 {
                return Err(invalid(
                    "analysis.gateway_timeout_secs",
                    "must be greater than 0",
                ));
            }
        } else if self.analysis.engine == "ai" {
            return Err(invalid(
                "analysis.gateway_url",
                "required when analysis.engine is \"ai\"",
            ));
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(invalid("metrics.port", "must be greater than 0"));
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(invalid("metrics.endpoint", "must start with '/'"));
            }
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> EcuscanError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리
    pub data_dir: String,
    /// PID 파일 경로 (빈 문자열이면 생성하지 않음)
    pub pid_file: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/ecuscan".to_owned(),
            pid_file: String::new(),
        }
    }
}

/// HTTP API 서버 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인드 주소
    pub listen_addr: String,
    /// Bearer 토큰 (빈 문자열이면 인증 비활성화)
    pub api_key: String,
    /// CORS 허용 origin 목록 (비어 있으면 CORS 헤더 없음)
    pub cors_origins: Vec<String>,
    /// 요청 본문 최대 크기 (바이트)
    pub max_body_bytes: usize,
    /// 변경 이벤트 브로드캐스트 채널 용량
    pub event_channel_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "127.0.0.1:8080".to_owned(),
            api_key: String::new(),
            cors_origins: Vec::new(),
            max_body_bytes: 64 * 1024 * 1024, // 64MB (base64 펌웨어 업로드)
            event_channel_capacity: 1024,
        }
    }
}

/// 스토리지 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite 파일 경로 (빈 문자열이면 `{data_dir}/ecuscan.db`)
    pub db_path: String,
    /// 인메모리 DB 사용 (테스트/데모)
    pub in_memory: bool,
}

impl StorageConfig {
    /// 실제 DB 파일 경로를 결정합니다.
    pub fn resolved_path(&self, data_dir: &str) -> PathBuf {
        if self.db_path.is_empty() {
            Path::new(data_dir).join("ecuscan.db")
        } else {
            PathBuf::from(&self.db_path)
        }
    }
}

/// 분석 파이프라인 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// 분석 엔진 (simulated, sast, ai)
    pub engine: String,
    /// 단계 사이 지연 (밀리초)
    pub stage_delay_ms: u64,
    /// 진행 중 스캔이 갱신 없이 머무를 수 있는 최대 시간 (초)
    pub stale_timeout_secs: u64,
    /// 정체 스캔 점검 주기 (초)
    pub sweep_interval_secs: u64,
    /// 위험도 가중치: critical
    pub critical_weight: u32,
    /// 위험도 가중치: high
    pub high_weight: u32,
    /// 위험도 가중치: medium
    pub medium_weight: u32,
    /// 위험도 기본 오프셋
    pub base_offset: u32,
    /// OpenAI 호환 chat completions 엔드포인트. 비어 있으면 게이트웨이 비활성화
    pub gateway_url: String,
    /// 게이트웨이 모델 이름
    pub gateway_model: String,
    /// 게이트웨이 Bearer 토큰
    pub gateway_api_key: String,
    /// 게이트웨이 요청 타임아웃 (초)
    pub gateway_timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        let policy = RiskPolicy::default();
        Self {
            engine: "simulated".to_owned(),
            stage_delay_ms: 500,
            stale_timeout_secs: 600,
            sweep_interval_secs: 30,
            critical_weight: policy.critical_weight,
            high_weight: policy.high_weight,
            medium_weight: policy.medium_weight,
            base_offset: policy.base_offset,
            gateway_url: String::new(),
            gateway_model: DEFAULT_GATEWAY_MODEL.to_owned(),
            gateway_api_key: String::new(),
            gateway_timeout_secs: 120,
        }
    }
}

impl AnalysisConfig {
    /// 설정된 가중치로 위험도 정책을 만듭니다.
    pub fn risk_policy(&self) -> RiskPolicy {
        RiskPolicy {
            critical_weight: self.critical_weight,
            high_weight: self.high_weight,
            medium_weight: self.medium_weight,
            base_offset: self.base_offset,
        }
    }

    pub fn stage_delay(&self) -> Duration {
        Duration::from_millis(self.stage_delay_ms)
    }

    pub fn stale_timeout(&self) -> Duration {
        Duration::from_secs(self.stale_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    /// 게이트웨이 URL이 설정되었는지 여부
    pub fn gateway_enabled(&self) -> bool {
        !self.gateway_url.trim().is_empty()
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

/// 메트릭 익스포터 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 바인드 주소
    pub listen_addr: String,
    /// 포트
    pub port: u16,
    /// 엔드포인트 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_values() {
        let config = EcuscanConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.server.listen_addr, "127.0.0.1:8080");
        assert!(config.server.api_key.is_empty());
        assert_eq!(config.analysis.engine, "simulated");
        assert_eq!(config.analysis.risk_policy(), RiskPolicy::default());
        assert!(!config.metrics.enabled);
    }

    #[test]
    fn default_config_passes_validation() {
        EcuscanConfig::default().validate().unwrap();
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = EcuscanConfig::parse("").unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.server.event_channel_capacity, 1024);
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = EcuscanConfig::parse(
            r#"
[analysis]
engine = "sast"
stage_delay_ms = 0
"#,
        )
        .unwrap();
        assert_eq!(config.analysis.engine, "sast");
        assert_eq!(config.analysis.stage_delay_ms, 0);
        assert_eq!(config.analysis.stale_timeout_secs, 600);
        assert_eq!(config.general.log_format, "json");
    }

    #[test]
    fn invalid_toml_is_parse_error() {
        let err = EcuscanConfig::parse("[general\nlog_level = ").unwrap_err();
        assert!(matches!(
            err,
            EcuscanError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn unknown_engine_is_rejected() {
        let mut config = EcuscanConfig::default();
        config.analysis.engine = "ghidra".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("analysis.engine"));
    }

    #[test]
    fn ai_engine_requires_gateway_url() {
        let mut config = EcuscanConfig::default();
        config.analysis.engine = "ai".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("analysis.gateway_url"));

        config.analysis.gateway_url = "https://llm.example/v1/chat/completions".to_owned();
        config.validate().unwrap();
    }

    #[test]
    fn gateway_url_must_be_http() {
        let mut config = EcuscanConfig::default();
        config.analysis.gateway_url = "ftp://llm.example".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("analysis.gateway_url"));
    }

    #[test]
    fn gateway_is_disabled_by_default() {
        let analysis = AnalysisConfig::default();
        assert!(!analysis.gateway_enabled());
        assert_eq!(analysis.gateway_model, DEFAULT_GATEWAY_MODEL);
        assert_eq!(analysis.gateway_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn invalid_listen_addr_is_rejected() {
        let mut config = EcuscanConfig::default();
        config.server.listen_addr = "localhost".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("server.listen_addr"));
    }

    #[test]
    fn zero_stale_timeout_is_rejected() {
        let mut config = EcuscanConfig::default();
        config.analysis.stale_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_weights_are_rejected() {
        let mut config = EcuscanConfig::default();
        config.analysis.critical_weight = 5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn metrics_endpoint_must_be_absolute() {
        let mut config = EcuscanConfig::default();
        config.metrics.enabled = true;
        config.metrics.endpoint = "metrics".to_owned();
        assert!(config.validate().is_err());
    }

    #[test]
    fn db_path_resolves_against_data_dir() {
        let storage = StorageConfig::default();
        assert_eq!(
            storage.resolved_path("/tmp/ecu"),
            PathBuf::from("/tmp/ecu/ecuscan.db")
        );
        let storage = StorageConfig {
            db_path: "/srv/scans.db".to_owned(),
            in_memory: false,
        };
        assert_eq!(storage.resolved_path("/tmp/ecu"), PathBuf::from("/srv/scans.db"));
    }

    #[test]
    fn config_serializes_back_to_toml() {
        let config = EcuscanConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed = EcuscanConfig::parse(&text).unwrap();
        assert_eq!(parsed.analysis.engine, config.analysis.engine);
        assert_eq!(parsed.server.max_body_bytes, config.server.max_body_bytes);
    }
}
