/// Failures of handing an event to the forwarding link.
///
/// These are owned by the forwarder; a failed send triggers its reconnect
/// policy, never a re-normalization upstream.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The supervisor task has exited; nothing will drain the queue.
    #[error("forwarding link is shut down")]
    ChannelClosed,

    /// The outbound queue is full (the link has been down for a while).
    #[error("forwarding queue is full")]
    QueueFull,

    /// The event could not be serialized to the wire format.
    #[error(transparent)]
    Serialize(#[from] serde_json::Error),
}
