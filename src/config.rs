//! Configuración central de la aplicación.
//! Carga variables de entorno (.env) y expone una estructura inmutable
//! (`CONFIG`). La base de datos es opcional: sin `DATABASE_URL` la demo usa
//! el backend en memoria.
use std::env;
use std::time::Duration;

use once_cell::sync::Lazy;
use review_adapters::{WebhookEndpoint, WorkerConfig};

use crate::errors::AppError;

/// Configuración global de la aplicación.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// `None` cuando no hay `DATABASE_URL`.
    pub database: Option<DatabaseConfig>,
    pub outbox: OutboxConfig,
    /// Actor registrado en el historial cuando el llamador no indica uno.
    pub default_actor: String,
    pub webhooks: Vec<WebhookEndpoint>,
}

/// Parámetros de conexión a la base de datos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// URL completa de conexión (postgres://...).
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutboxConfig {
    pub batch_size: usize,
    pub period: Duration,
}

impl From<OutboxConfig> for WorkerConfig {
    fn from(c: OutboxConfig) -> Self {
        WorkerConfig { batch_size: c.batch_size,
                       period: c.period }
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T)
                                -> Result<T, AppError> {
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim()
                        .parse()
                        .map_err(|_| AppError::Config(format!("{key} inválido: {raw}"))),
    }
}

impl AppConfig {
    /// Construye la configuración a partir de una función de búsqueda de
    /// variables (el entorno del proceso en `from_env`).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let database = match lookup("DATABASE_URL").filter(|u| !u.trim().is_empty()) {
            Some(url) => Some(DatabaseConfig { url,
                                               min_connections: parsed(&lookup, "DATABASE_MIN_CONNECTIONS", 2)?,
                                               max_connections: parsed(&lookup, "DATABASE_MAX_CONNECTIONS", 16)? }),
            None => None,
        };
        let outbox = OutboxConfig { batch_size: parsed(&lookup, "OUTBOX_BATCH_SIZE", 100usize)?.max(1),
                                    period: Duration::from_millis(parsed(&lookup, "OUTBOX_PERIOD_MS", 5_000u64)?) };
        let default_actor = lookup("REVIEW_DEFAULT_ACTOR").unwrap_or_else(|| "system".to_string());

        // WEBHOOK_URL + WEBHOOK_TRIGGERS (lista separada por comas)
        let webhooks = match lookup("WEBHOOK_URL") {
            Some(url) => {
                let triggers = lookup("WEBHOOK_TRIGGERS").unwrap_or_else(|| "new_submission,stage_changed".into());
                let api_key = lookup("WEBHOOK_API_KEY");
                triggers.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(|t| {
                            let endpoint = WebhookEndpoint::new(url.clone(), t);
                            match &api_key {
                                Some(k) => endpoint.with_api_key(k.clone()),
                                None => endpoint,
                            }
                        })
                        .collect()
            }
            None => Vec::new(),
        };
        Ok(Self { database,
                  outbox,
                  default_actor,
                  webhooks })
    }

    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|k| env::var(k).ok())
    }
}

/// Instancia global perezosa de configuración, evaluada una sola vez.
pub static CONFIG: Lazy<Result<AppConfig, AppError>> = Lazy::new(AppConfig::from_env);
