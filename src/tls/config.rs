use crate::tls::cert_verifier::{ChainCheck, HopCertVerifier};
use anyhow::Context;
use rustls::crypto::ring::{default_provider, DEFAULT_CIPHER_SUITES};
use rustls::{ClientConfig, RootCertStore};
use std::path::Path;
use std::sync::Arc;

/// Builds the rustls configuration shared by every TLS hop of a client.
///
/// Roots come from `ca_file` (PEM) when given, otherwise from the bundled
/// Mozilla set. Only `http/1.1` is offered over ALPN.
pub fn build_tls_config(
    ca_file: Option<&Path>,
    insecure: bool,
) -> Result<ClientConfig, anyhow::Error> {
    let mut root_store = RootCertStore::empty();
    if let Some(file_path) = ca_file {
        let f = std::fs::File::open(file_path)
            .with_context(|| format!("Failed to open CA file {}", file_path.display()))?;
        let mut rd = std::io::BufReader::new(f);
        for cert in rustls_pemfile::certs(&mut rd) {
            root_store.add(cert?)?;
        }
        ensure!(
            !root_store.is_empty(),
            "No certificates found in {}",
            file_path.display()
        );
    } else {
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    };

    let provider = Arc::new(rustls::crypto::CryptoProvider {
        cipher_suites: DEFAULT_CIPHER_SUITES.to_vec(),
        ..default_provider()
    });

    let chain = if insecure {
        ChainCheck::Skip
    } else {
        ChainCheck::Verify
    };
    let verifier = HopCertVerifier::with_roots(&root_store, provider.clone(), chain)?;
    debug!("TLS chain check: {:?}", verifier.chain_check());

    let mut tls_config = ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(rustls::DEFAULT_VERSIONS)?
        .with_root_certificates(root_store)
        .with_no_client_auth();

    tls_config
        .dangerous()
        .set_certificate_verifier(Arc::new(verifier));
    tls_config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(tls_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_roots_build() {
        let config = build_tls_config(None, false).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"http/1.1".to_vec()]);
    }

    #[test]
    fn missing_ca_file_is_an_error() {
        let err = build_tls_config(Some(Path::new("/nonexistent/ca.pem")), false).unwrap_err();
        assert!(err.to_string().contains("Failed to open CA file"));
    }
}
