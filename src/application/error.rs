//! Session errors.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::ValidationError;
use crate::ports::{CertificateError, RegistryError};

/// Errors that end a session or keep it from starting.
#[derive(Debug, Error)]
pub enum ResponderError {
    /// Configuration violates an invariant; fix it and restart.
    #[error("invalid configuration: {0}")]
    Config(#[from] ValidationError),

    /// GitHub refused or failed to create the hook.
    #[error("webhook registration failed: {0}")]
    Registration(#[from] RegistryError),

    /// A listener could not bind, or failed while serving.
    #[error("listener on {addr} failed: {source}")]
    Listener {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// TLS could not be set up.
    #[error("TLS setup failed: {0}")]
    Tls(#[from] CertificateError),

    /// Cancelled before the session started serving.
    #[error("session cancelled during startup")]
    Cancelled,
}

impl ResponderError {
    pub fn listener(addr: SocketAddr, source: io::Error) -> Self {
        ResponderError::Listener { addr, source }
    }
}
