//! Worker channel error types.

/// Errors that can occur on a worker's private channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The channel to the worker is already closed.
    #[error("Channel to worker {0} is closed")]
    Closed(u32),

    /// The worker was started without a channel.
    #[error("Worker channel not configured ({0} is not set)")]
    NotConfigured(&'static str),

    /// Socket I/O failed.
    #[error("Channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation timed out.
    #[error("Channel timeout after {0}ms")]
    Timeout(u64),

    /// Failed to serialize or deserialize a frame.
    #[error("Failed to serialize frame: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_error_display() {
        assert_eq!(
            ChannelError::Closed(812).to_string(),
            "Channel to worker 812 is closed"
        );
        assert_eq!(
            ChannelError::NotConfigured("SCRIPT_HOST_CHANNEL").to_string(),
            "Worker channel not configured (SCRIPT_HOST_CHANNEL is not set)"
        );
        assert_eq!(
            ChannelError::Timeout(4000).to_string(),
            "Channel timeout after 4000ms"
        );
    }
}
