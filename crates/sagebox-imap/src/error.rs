//! Error types for the IMAP session layer.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during IMAP operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error during network operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS handshake or encryption error.
    #[error("TLS error: {0}")]
    Tls(#[from] rustls::Error),

    /// Invalid DNS name for TLS.
    #[error("Invalid DNS name: {0}")]
    InvalidDnsName(#[from] rustls::pki_types::InvalidDnsNameError),

    /// The server rejected the credentials.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Server returned NO response.
    #[error("Server returned NO: {0}")]
    No(String),

    /// Server returned BAD response.
    #[error("Server returned BAD: {0}")]
    Bad(String),

    /// Operation timed out.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// The connection was closed by the peer.
    #[error("Connection lost")]
    ConnectionLost,

    /// Malformed or unexpected data from the server.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The configured security mode cannot be used.
    #[error("Security mode not supported: {0}")]
    UnsupportedSecurity(&'static str),
}

impl Error {
    /// Returns true if the failure is in the transport (socket, TLS, timeout)
    /// and the same operation may succeed on a fresh connection.
    ///
    /// Certificate and TLS policy failures are not transient: reconnecting
    /// meets the same certificate.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Tls(err) => !is_tls_rejection(err),
            Self::Io(_) | Self::Timeout(_) | Self::ConnectionLost => true,
            _ => false,
        }
    }

    /// Returns true if the server rejected the credentials.
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

/// The handshake failed on certificate validation or an incompatible TLS
/// configuration, on either side.
const fn is_tls_rejection(err: &rustls::Error) -> bool {
    use rustls::AlertDescription as Alert;

    matches!(
        err,
        rustls::Error::InvalidCertificate(_)
            | rustls::Error::InvalidCertRevocationList(_)
            | rustls::Error::NoCertificatesPresented
            | rustls::Error::UnsupportedNameType
            | rustls::Error::PeerIncompatible(_)
            | rustls::Error::InconsistentKeys(_)
            | rustls::Error::AlertReceived(
                Alert::BadCertificate
                    | Alert::UnsupportedCertificate
                    | Alert::CertificateRevoked
                    | Alert::CertificateExpired
                    | Alert::CertificateUnknown
                    | Alert::UnknownCA
                    | Alert::HandshakeFailure
                    | Alert::ProtocolVersion
            )
    )
}

impl From<async_imap::error::Error> for Error {
    fn from(err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::Io(e) => Self::Io(e),
            ImapError::No(text) => Self::No(text),
            ImapError::Bad(text) => Self::Bad(text),
            ImapError::ConnectionLost => Self::ConnectionLost,
            other => Self::Protocol(other.to_string()),
        }
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
