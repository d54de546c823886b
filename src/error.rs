use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WifiError {
    #[error("No wireless interface found")]
    NoWirelessInterface,

    /// An OS network tool ran but exited non-zero.
    #[error("Network tool failed on '{interface}': {output}")]
    Interface { interface: String, output: String },

    /// Bring-up succeeded but no IPv4 address was bound afterwards.
    #[error("Failed to authenticate with '{ssid}' on '{interface}': no address bound")]
    Authentication { interface: String, ssid: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Network '{0}' not found")]
    SsidNotFound(String),

    #[error("Network '{0}' uses an encryption type that cannot be configured")]
    UnsupportedEncryption(String),

    #[error("Failed to execute {program}: {source}")]
    CommandSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to access {}: {source}", path.display())]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

pub type Result<T, E = WifiError> = std::result::Result<T, E>;

impl WifiError {
    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        WifiError::File {
            path: path.into(),
            source,
        }
    }
}
