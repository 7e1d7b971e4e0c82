/// Errors that can occur in the transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Binding the listener or accepting a connection failed.
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// Reading from the socket failed. Includes a peer disappearing
    /// mid-frame — only an EOF on a frame boundary is a clean close.
    #[error("read failed: {0}")]
    ReadFailed(#[source] std::io::Error),

    /// Writing to the socket failed.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// A frame's declared length exceeds the configured maximum.
    ///
    /// The connection must be closed — a partial read of an oversized
    /// frame would desynchronize the stream.
    #[error("frame of {len} bytes exceeds maximum of {max}")]
    FrameTooLarge { len: usize, max: usize },
}
