//! ReviewFlow Rust Library
//!
//! Este crate actúa como la capa de aplicación de ReviewFlow:
//! - `config`: configuración desde el entorno (`.env`).
//! - `errors`: `AppError`, que agrupa los errores de los crates miembros.
//! - `app`: `ReviewApp`, el wiring de servicios sobre un store.
//!
//! Puede usarse desde `main.rs` o por otros crates/clientes.

pub mod app;
pub mod config;
pub mod errors;

pub use app::{PgStore, ReviewApp};
pub use config::{AppConfig, CONFIG};
pub use errors::AppError;
