/// Crate-wide result type for conversion operations.
pub type Result<T> = std::result::Result<T, ConvertError>;

/// Typed conversion failures.
///
/// Only structurally invalid input lands here. Media download failures are
/// recovered inside the engine (the attachment degrades to a placeholder
/// string) and never surface as a `ConvertError`.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    /// The wire envelope could not be decoded into an inbound event.
    #[error("undecodable event envelope: {0}")]
    Envelope(#[from] serde_json::Error),

    /// A group event arrived without a conversation id, so no group
    /// identity can be derived.
    #[error("group event is missing a conversation id")]
    MissingConversation,
}
