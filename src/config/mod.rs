//! Configuration management for Capgate

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// HTTP server host
    pub http_host: String,
    /// HTTP server port
    pub http_port: u16,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Capability registry configuration
    pub registry: RegistryConfig,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
}

/// Capability registry and cache configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding declarative capability units (one JSON document each)
    pub modules_dir: PathBuf,
    /// TTL for the in-process capability cache, in seconds
    pub cache_ttl_secs: u64,
    /// Whether discovery + sync runs at process start
    pub sync_on_start: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            modules_dir: PathBuf::from("modules"),
            cache_ttl_secs: 300,
            sync_on_start: true,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            http_host: env::var("HTTP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            http_port: env::var("HTTP_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .context("Invalid HTTP_PORT")?,
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").context("DATABASE_URL is required")?,
                max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                    .unwrap_or_else(|_| "10".to_string())
                    .parse()
                    .unwrap_or(10),
                min_connections: env::var("DATABASE_MIN_CONNECTIONS")
                    .unwrap_or_else(|_| "2".to_string())
                    .parse()
                    .unwrap_or(2),
            },
            registry: RegistryConfig {
                modules_dir: env::var("MODULES_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| PathBuf::from("modules")),
                cache_ttl_secs: env::var("CAPABILITY_CACHE_TTL_SECS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .unwrap_or(300),
                sync_on_start: env::var("REGISTRY_SYNC_ON_START")
                    .map(|s| s.to_lowercase() != "false")
                    .unwrap_or(true),
            },
        })
    }

    /// HTTP bind address
    pub fn http_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }
}
