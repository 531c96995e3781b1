use pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::{DigitallySignedStruct, Error as TlsError, RootCertStore, SignatureScheme};
use std::sync::Arc;

/// How much of the server's certificate chain is checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainCheck {
    /// Full Web PKI path and hostname validation.
    Verify,
    /// Accept any chain. Handshake signatures are still checked.
    Skip,
}

/// Certificate verifier used for every TLS hop. Delegates to rustls' Web
/// PKI verifier unless chain checks are turned off with `--insecure`.
#[derive(Debug)]
pub struct HopCertVerifier {
    webpki: Arc<WebPkiServerVerifier>,
    chain: ChainCheck,
}

impl HopCertVerifier {
    pub fn with_roots(
        roots: &RootCertStore,
        provider: Arc<CryptoProvider>,
        chain: ChainCheck,
    ) -> Result<Self, anyhow::Error> {
        let webpki = WebPkiServerVerifier::builder_with_provider(Arc::new(roots.clone()), provider)
            .build()?;
        Ok(Self { webpki, chain })
    }

    pub fn chain_check(&self) -> ChainCheck {
        self.chain
    }
}

impl ServerCertVerifier for HopCertVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, TlsError> {
        match self.chain {
            ChainCheck::Skip => {
                debug!("Accepting certificate for {:?} unchecked", server_name);
                Ok(ServerCertVerified::assertion())
            }
            ChainCheck::Verify => {
                let verdict = self.webpki.verify_server_cert(
                    end_entity,
                    intermediates,
                    server_name,
                    ocsp,
                    now,
                );
                if let Err(e) = &verdict {
                    debug!("Certificate for {:?} rejected: {}", server_name, e);
                }
                verdict
            }
        }
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.webpki.verify_tls12_signature(message, cert, dss)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, TlsError> {
        self.webpki.verify_tls13_signature(message, cert, dss)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.webpki.supported_verify_schemes()
    }
}
