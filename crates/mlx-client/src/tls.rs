//! rustls client configuration for TLS connections.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error::{ClientError, ClientResult};
use crate::params::ConnectionParams;

/// Custom TLS configuration for `params`, or `None` when the agent's default
/// (public roots, verification on) applies.
pub(crate) fn client_config(params: &ConnectionParams) -> ClientResult<Option<Arc<ClientConfig>>> {
    if !params.ssl || (params.ca.is_none() && params.reject_unauthorized) {
        return Ok(None);
    }
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()
        .map_err(|err| ClientError::Configuration(format!("invalid TLS setup: {err}")))?;
    let config = if params.reject_unauthorized {
        let roots = root_store(params.ca.as_deref().unwrap_or_default())?;
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert { provider }))
            .with_no_client_auth()
    };
    Ok(Some(Arc::new(config)))
}

fn root_store(pem: &str) -> ClientResult<RootCertStore> {
    let mut roots = RootCertStore::empty();
    let mut reader = pem.as_bytes();
    for cert in rustls_pemfile::certs(&mut reader) {
        let cert = cert.map_err(|err| {
            ClientError::Configuration(format!("malformed CA certificate: {err}"))
        })?;
        roots.add(cert).map_err(|err| {
            ClientError::Configuration(format!("unusable CA certificate: {err}"))
        })?;
    }
    if roots.is_empty() {
        return Err(ClientError::Configuration(
            "CA file contains no certificates".to_string(),
        ));
    }
    Ok(roots)
}

/// Verifier used when `rejectUnauthorized` is off: any certificate chain is
/// accepted, handshake signatures are still checked.
#[derive(Debug)]
struct AcceptAnyServerCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
