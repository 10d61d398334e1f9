//! rustls connector for encrypted PostgreSQL and CockroachDB connections.
//!
//! Server certificates are verified against `ssl_root_cert` when it is set
//! and against the platform trust store otherwise. `ssl_cert` and `ssl_key`
//! add a client certificate, which secure CockroachDB clusters require.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, warn};

use crate::config::{PgConfig, SslMode};
use crate::error::{PgError, PgResult};

/// Whether `config` connects through the rustls connector.
///
/// `prefer` only negotiates TLS when certificate files were given; without
/// them it connects in plain text.
pub fn wants_tls(config: &PgConfig) -> bool {
    match config.ssl_mode {
        SslMode::Disable => false,
        SslMode::Prefer => config.ssl_root_cert.is_some() || config.ssl_cert.is_some(),
        SslMode::Require => true,
    }
}

/// Build the connector for `config`.
pub fn make_connector(config: &PgConfig) -> PgResult<MakeRustlsConnect> {
    let roots = root_store(config.ssl_root_cert.as_deref())?;

    let builder = ClientConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| PgError::tls(e.to_string()))?
    .with_root_certificates(roots);

    let client_config = match (&config.ssl_cert, &config.ssl_key) {
        (Some(cert), Some(key)) => {
            let chain = read_certs(cert)?;
            let key = read_key(key)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| PgError::tls(format!("invalid client certificate: {}", e)))?
        }
        (None, None) => builder.with_no_client_auth(),
        _ => {
            return Err(PgError::config(
                "ssl_cert and ssl_key must be given together",
            ));
        }
    };

    Ok(MakeRustlsConnect::new(client_config))
}

fn root_store(root_cert: Option<&Path>) -> PgResult<RootCertStore> {
    let mut roots = RootCertStore::empty();

    if let Some(path) = root_cert {
        for cert in read_certs(path)? {
            roots.add(cert).map_err(|e| {
                PgError::tls(format!("invalid root certificate {}: {}", path.display(), e))
            })?;
        }
        debug!(path = %path.display(), roots = roots.len(), "Loaded root certificates");
        return Ok(roots);
    }

    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        warn!(error = %e, "Skipping unreadable platform certificate");
    }
    let (added, ignored) = roots.add_parsable_certificates(native.certs);
    debug!(added, ignored, "Loaded platform root certificates");

    if roots.is_empty() {
        return Err(PgError::tls(
            "no trusted root certificates found; set ssl_root_cert",
        ));
    }
    Ok(roots)
}

fn open(path: &Path) -> PgResult<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| PgError::config(format!("cannot read {}: {}", path.display(), e)))
}

fn read_certs(path: &Path) -> PgResult<Vec<CertificateDer<'static>>> {
    let certs = rustls_pemfile::certs(&mut open(path)?)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| PgError::config(format!("invalid PEM in {}: {}", path.display(), e)))?;

    if certs.is_empty() {
        return Err(PgError::config(format!(
            "no certificates found in {}",
            path.display()
        )));
    }
    Ok(certs)
}

fn read_key(path: &Path) -> PgResult<PrivateKeyDer<'static>> {
    rustls_pemfile::private_key(&mut open(path)?)
        .map_err(|e| PgError::config(format!("invalid PEM in {}: {}", path.display(), e)))?
        .ok_or_else(|| PgError::config(format!("no private key found in {}", path.display())))
}
