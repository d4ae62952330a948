//! Database connections.
//!
//! One long-lived connection per side, acquired at startup and held for the
//! whole run. Both sides speak the PostgreSQL wire protocol.

use crate::error::{MigrateError, Result};
use rustls::ClientConfig;
use std::sync::Arc;
use tokio_postgres::config::SslMode;
use tokio_postgres::types::ToSql;
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row, Statement};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{info, warn};

/// A single database connection with its background connection task.
pub struct Db {
    client: Client,
    label: &'static str,
}

impl Db {
    /// Connect using a tokio-postgres connection string (URL or key/value).
    ///
    /// TLS follows the `sslmode` of the connection string: `disable` runs in
    /// plaintext (with a warning), anything else enables TLS without
    /// certificate verification.
    pub async fn connect(label: &'static str, url: &str) -> Result<Self> {
        let pg_config: PgConfig = url
            .parse()
            .map_err(|e| MigrateError::Config(format!("invalid {} database URL: {}", label, e)))?;

        let client = match pg_config.get_ssl_mode() {
            SslMode::Disable => {
                warn!(
                    "{}: TLS is disabled, credentials will be transmitted in plaintext",
                    label
                );
                let (client, connection) = pg_config.connect(NoTls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("{} database connection closed with error: {}", label, e);
                    }
                });
                client
            }
            _ => {
                let tls = MakeRustlsConnect::new(tls_config());
                let (client, connection) = pg_config.connect(tls).await?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("{} database connection closed with error: {}", label, e);
                    }
                });
                client
            }
        };

        client.simple_query("SELECT 1").await?;
        info!("{}: database connection established", label);

        Ok(Self { client, label })
    }

    /// The side this connection belongs to ("source" or "target").
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Run a query and collect all rows.
    pub async fn query(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        Ok(self.client.query(sql, params).await?)
    }

    /// Run a query expected to return exactly one row.
    pub async fn query_one(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        Ok(self.client.query_one(sql, params).await?)
    }

    /// Execute a statement and return the affected row count.
    pub async fn execute(&self, sql: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        Ok(self.client.execute(sql, params).await?)
    }

    /// Prepare a statement for repeated execution.
    pub async fn prepare(&self, sql: &str) -> Result<Statement> {
        Ok(self.client.prepare(sql).await?)
    }

    /// Execute a prepared statement.
    pub async fn execute_prepared(
        &self,
        statement: &Statement,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<u64> {
        Ok(self.client.execute(statement, params).await?)
    }
}

/// TLS configuration without certificate verification.
///
/// Matches libpq's `sslmode=require` semantics: the channel is encrypted but
/// the server certificate is not validated, so self-signed certificates on
/// managed database hosts work out of the box.
fn tls_config() -> ClientConfig {
    ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(NoVerifier))
        .with_no_client_auth()
}

/// Certificate verifier that accepts any certificate.
///
/// # Security Warning
///
/// This bypasses all certificate validation, leaving the connection open to
/// man-in-the-middle attacks. It matches libpq's `sslmode=require` (encrypt
/// but do not verify) and exists so the self-signed certificates common on
/// managed database hosts work without extra setup. Operators on untrusted
/// networks should terminate TLS in front of the database instead.
#[derive(Debug)]
struct NoVerifier;

impl rustls::client::danger::ServerCertVerifier for NoVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        vec![
            rustls::SignatureScheme::RSA_PKCS1_SHA256,
            rustls::SignatureScheme::RSA_PKCS1_SHA384,
            rustls::SignatureScheme::RSA_PKCS1_SHA512,
            rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            rustls::SignatureScheme::ECDSA_NISTP384_SHA384,
            rustls::SignatureScheme::ECDSA_NISTP521_SHA512,
            rustls::SignatureScheme::RSA_PSS_SHA256,
            rustls::SignatureScheme::RSA_PSS_SHA384,
            rustls::SignatureScheme::RSA_PSS_SHA512,
            rustls::SignatureScheme::ED25519,
        ]
    }
}
