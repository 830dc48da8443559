// TCP and TLS transport for the RouterOS API.
//
// The routers this client talks to present self-signed certificates, so
// the TLS path installs a verifier that accepts any chain: the session is
// encrypted but the peer is not authenticated. That trust relaxation is
// the named mode `TlsMode::DangerAcceptInvalid`, not a hidden default.

use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;

use crate::error::Error;

/// TLS behavior for the router connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TlsMode {
    /// TLS with certificate verification disabled (the API-SSL service,
    /// port 8729 by convention).
    #[default]
    DangerAcceptInvalid,
    /// Plaintext API (port 8728 by convention). Used by tests and lab
    /// setups on trusted networks.
    Disabled,
}

/// Unified byte stream over plain TCP or TLS.
pub trait ByteStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ByteStream for T {}

/// Open the socket and, in TLS mode, complete the handshake.
pub(crate) async fn connect(address: &str, tls: TlsMode) -> Result<Box<dyn ByteStream>, Error> {
    let tcp = TcpStream::connect(address).await?;
    tcp.set_nodelay(true)?;

    match tls {
        TlsMode::Disabled => Ok(Box::new(tcp)),
        TlsMode::DangerAcceptInvalid => {
            let config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
                .with_no_client_auth();
            let connector = TlsConnector::from(Arc::new(config));

            // SNI still wants a name even though nothing is verified.
            let server_name = ServerName::try_from(host_of(address).to_owned()).map_err(|e| {
                Error::InvalidAddress {
                    address: address.to_owned(),
                    reason: e.to_string(),
                }
            })?;

            let stream = connector
                .connect(server_name, tcp)
                .await
                .map_err(|e| Error::Tls(e.to_string()))?;
            Ok(Box::new(stream))
        }
    }
}

/// Host portion of a `host:port` address, with IPv6 brackets stripped.
fn host_of(address: &str) -> &str {
    let host = address.rsplit_once(':').map_or(address, |(host, _)| host);
    host.trim_start_matches('[').trim_end_matches(']')
}

// ── Certificate verifier ────────────────────────────────────────────

/// Accepts every server certificate. See [`TlsMode::DangerAcceptInvalid`].
#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
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
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
