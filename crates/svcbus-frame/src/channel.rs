//! Built-in channel IDs.

/// Connection management (handshake, disconnect notification).
pub const CONTROL: u16 = 0;

/// Service message envelopes.
pub const MESSAGE: u16 = 1;

/// Returns a human-readable name for a channel ID.
pub fn channel_name(id: u16) -> &'static str {
    match id {
        CONTROL => "CONTROL",
        MESSAGE => "MESSAGE",
        _ => "RESERVED",
    }
}
