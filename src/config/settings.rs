// Configuration structs

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::crisis::{Language, RegionCode, SurfacePolicies, DEFAULT_GEOLOCATION_ENDPOINT};

/// ~/.lifeline, or the current directory when there is no home
pub fn lifeline_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lifeline")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Language used when a session does not specify one
    pub default_language: Language,

    /// Region used when geolocation is disabled or fails
    pub default_region: RegionCode,

    /// Optional JSON lexicon layered over the builtin phrases
    pub lexicon_path: Option<PathBuf>,

    /// Optional JSON crisis resource table replacing the builtin one
    pub resources_path: Option<PathBuf>,

    /// Flag log location
    pub audit_log_path: PathBuf,

    /// Blocking policy per content surface
    pub surfaces: SurfacePolicies,

    pub server: ServerConfig,

    pub geolocation: GeolocationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_language: Language::En,
            default_region: RegionCode::us(),
            lexicon_path: None,
            resources_path: None,
            audit_log_path: lifeline_dir().join("flags.jsonl"),
            surfaces: SurfacePolicies::default(),
            server: ServerConfig::default(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

/// Configuration for the HTTP daemon
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "127.0.0.1:8787")
    pub bind_address: String,
    /// Maximum number of concurrent sessions
    pub max_sessions: usize,
    /// Idle session timeout in minutes
    pub session_timeout_minutes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8787".to_string(),
            max_sessions: 1000,
            session_timeout_minutes: 30,
        }
    }
}

/// IP geolocation used to pick a crisis resource region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout_ms: u64,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            endpoint: DEFAULT_GEOLOCATION_ENDPOINT.to_string(),
            timeout_ms: 2000,
        }
    }
}
