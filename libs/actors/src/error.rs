//! Runtime errors
//!
//! Addressing failures never show up here: a send to a dead or unknown actor comes
//! back as an exit envelope. These are the failures a caller can act on.

use strand_codec::ProtocolError;
use strand_types::TypesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ActorError {
    /// The context is shutting down or already gone
    #[error("Context stopped: {operation} refused")]
    ContextStopped { operation: String },

    /// Spawn could not produce an actor
    #[error("Spawn failed: {reason}")]
    SpawnFailed { reason: String },

    /// Actor logic reported a failure; becomes an `exception` exit
    #[error("Actor fault: {message}")]
    Fault {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A strand's actor pool hit its configured ceiling
    #[error("Actor pool exhausted on strand {strand}: {max} slots in use")]
    PoolExhausted { strand: u32, max: usize },

    /// Handing a frame to the relay failed
    #[error("Relay error: {message}")]
    Relay {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Worker threads or their runtimes could not be started
    #[error("Runtime error: {message}")]
    Runtime {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Context configuration rejected
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Payload error: {0}")]
    Payload(#[from] TypesError),

    #[error("Codec error: {0}")]
    Codec(#[from] ProtocolError),
}

/// Result type alias for actor operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    pub fn context_stopped(operation: impl Into<String>) -> Self {
        Self::ContextStopped {
            operation: operation.into(),
        }
    }

    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a fault from actor logic
    pub fn fault(message: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            source: None,
        }
    }

    /// Create a fault wrapping the error that caused it
    pub fn fault_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Fault {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn relay(message: impl Into<String>) -> Self {
        Self::Relay {
            message: message.into(),
            source: None,
        }
    }

    pub fn relay_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Relay {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn runtime_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Runtime {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
