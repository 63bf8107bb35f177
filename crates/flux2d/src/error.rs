//! Crate error type.
//!
//! Only device-level and configuration failures surface here. Misuse of the
//! command API (submitting an unrecorded buffer, missing barriers, bad
//! bindings) is a programming error and panics at the call site.

/// Errors returned by device creation, readback and configuration I/O.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no compatible GPU adapter found")]
    NoAdapter,

    #[error("failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("buffer map failed: {0}")]
    BufferMap(#[from] wgpu::BufferAsyncError),

    #[error("buffer map channel disconnected (device lost?)")]
    ChannelDisconnected,

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),

    #[error("invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
