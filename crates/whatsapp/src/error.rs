/// Errors surfaced by the WhatsApp seam.
#[derive(Debug, thiserror::Error)]
pub enum WhatsAppError {
    /// The per-session credential store could not be opened or created.
    #[error("credential store: {0}")]
    Store(String),

    /// Building or running the client failed before a pairing outcome arrived.
    #[error("connect failed: {0}")]
    Connect(String),

    /// No pairing code or connection event arrived in time.
    #[error("timed out after {0}s waiting for a pairing code")]
    PairingTimeout(u64),

    /// The device was logged out while linking.
    #[error("device was logged out")]
    LoggedOut,

    /// The address could not be parsed into a JID.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// The library rejected or failed a message send.
    #[error("send failed: {0}")]
    Send(String),
}
