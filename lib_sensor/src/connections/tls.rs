//! # PostgreSQL TLS
//!
//! Hosted databases are reached with `sslmode=require` in the URL; local ones
//! usually run without TLS. The URL decides which connector is used.

use rustls::{ClientConfig, RootCertStore};
use std::sync::Arc;
use tokio_postgres::config::SslMode;
use tokio_postgres_rustls::MakeRustlsConnect;

use crate::connections::db_postgres::DbError;

/// `true` when the connection string asks for `sslmode=require`.
pub fn requires_tls(config: &tokio_postgres::Config) -> bool {
    matches!(config.get_ssl_mode(), SslMode::Require)
}

/// Builds a `rustls` connector trusting the webpki root set.
///
/// The ring provider is passed explicitly so no process-wide default has to be installed.
pub fn rustls_connector() -> Result<MakeRustlsConnect, DbError> {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());

    let config = ClientConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| DbError::Config(format!("TLS setup failed: {}", e)))?
        .with_root_certificates(roots)
        .with_no_client_auth();

    Ok(MakeRustlsConnect::new(config))
}
