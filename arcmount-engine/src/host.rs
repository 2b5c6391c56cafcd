//! Outbound channel to the host

use arcmount_protocol::HostResponse;

/// Sends core-to-host messages. The concrete implementation lives in the
/// host glue (it owns the message channel serializer); tests substitute a
/// recording sender.
///
/// Called from both the volume's worker thread and the main thread, so
/// implementations must be thread safe.
pub trait HostSender: Send + Sync {
    fn send(&self, response: HostResponse);
}
