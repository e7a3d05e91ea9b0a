//! # Message Decoding
//!
//! Turns one inbound topic payload into typed now-playing metadata. A decode
//! failure drops that message only; the next message is independent.

use serde::Deserialize;

/// Now-playing metadata decoded from one inbound message.
///
/// Borrows from the payload buffer. Transient: created by decoding, consumed
/// immediately by rendering, then discarded. A new message fully replaces the
/// displayed content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TrackInfo<'a> {
    #[serde(rename = "Artist")]
    pub artist: &'a str,
    #[serde(rename = "Title")]
    pub title: &'a str,
}

/// Error produced when a payload does not decode into [`TrackInfo`].
pub type DecodeError = serde_json_core::de::Error;

/// Decode one topic payload.
///
/// Fails on malformed structure or wrong field types; the caller logs the
/// error and drops the message without rendering.
pub fn decode(payload: &[u8]) -> Result<TrackInfo<'_>, DecodeError> {
    let (track, _) = serde_json_core::from_slice(payload)?;
    Ok(track)
}
