//! TLS listener support, enabled when both `TLS_CERT_PATH` and
//! `TLS_KEY_PATH` are configured.

use anyhow::Context;
use std::fs::File;
use std::io::BufReader;
use std::sync::Arc;
use tokio_rustls::rustls::ServerConfig;

pub fn load_tls_config(cert_path: &str, key_path: &str) -> anyhow::Result<Arc<ServerConfig>> {
    let certs = rustls_pemfile::certs(&mut BufReader::new(
        File::open(cert_path).with_context(|| format!("opening {cert_path}"))?,
    ))
    .collect::<Result<Vec<_>, _>>()
    .context("parsing TLS certificates")?;

    let key = rustls_pemfile::private_key(&mut BufReader::new(
        File::open(key_path).with_context(|| format!("opening {key_path}"))?,
    ))
    .context("parsing TLS private key")?
    .context("no private key found in key file")?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .context("building TLS configuration")?;
    config.alpn_protocols = vec![b"h2".to_vec(), b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}
