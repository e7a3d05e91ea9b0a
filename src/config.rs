//! # Configuration Inputs
//!
//! Owned configuration records for the network join, the broker session, and
//! the display geometry. All of these are consumed by reference, so a
//! firmware can keep them in statics or build them from `env!` strings at
//! compile time.

use core::net::SocketAddrV4;

use heapless::String;
use rand_core::RngCore;

/// Maximum length of a generated client identifier.
pub const CLIENT_ID_CAP: usize = 48;

/// Wireless network identity and credential.
#[derive(Debug, Clone, Copy)]
pub struct NetworkConfig<'a> {
    pub ssid: &'a str,
    pub passphrase: &'a str,
}

/// Broker session parameters.
#[derive(Debug, Clone, Copy)]
pub struct BrokerConfig<'a> {
    /// Broker network address, consumed when the transport socket is opened.
    pub addr: SocketAddrV4,
    /// The single topic carrying now-playing metadata.
    pub topic: &'a str,
    /// Prefix of the generated client identifier.
    pub client_prefix: &'a str,
    /// Board identifier; its length sizes the random client-id suffix.
    pub board_id: &'a str,
}

/// Display geometry, calibrated to one physical panel and font.
///
/// The defaults match a 64x128 SH1107 mounted sideways and driven with a
/// 5x8 mono font: 22 characters fit a rotated line, the artist block anchors
/// at baseline 50, stacked lines sit 15 pixels apart, and the title block
/// starts 20 pixels above the artist block.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Geometry {
    /// Per-line character budget.
    pub max_chars: usize,
    /// Baseline of the artist block's first line, in logical coordinates.
    pub artist_anchor: i32,
    /// Vertical distance between two stacked lines of one block.
    pub line_pitch: i32,
    /// Vertical distance between the artist block and the title block.
    pub block_gap: i32,
    /// Settle time after a panel wipe before the next frame, in milliseconds.
    /// The SH1107 needs roughly three seconds here.
    pub settle_ms: u32,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            max_chars: 22,
            artist_anchor: 50,
            line_pitch: 15,
            block_gap: 20,
            settle_ms: 3000,
        }
    }
}

/// Generate a broker client identifier: `<prefix>-<random A-Z suffix>`.
///
/// The suffix length equals the board identifier's length, so identifiers
/// stay unique across repeated boots of the same board. A fresh identifier
/// is generated for every connect attempt.
pub fn client_id(prefix: &str, board_id: &str, rng: &mut dyn RngCore) -> String<CLIENT_ID_CAP> {
    let mut id = String::new();
    let _ = id.push_str(prefix);
    let _ = id.push('-');
    for _ in 0..board_id.len() {
        let c = (b'A' + (rng.next_u32() % 26) as u8) as char;
        if id.push(c).is_err() {
            break;
        }
    }
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SeqRng(u32);

    impl RngCore for SeqRng {
        fn next_u32(&mut self) -> u32 {
            let v = self.0;
            self.0 = self.0.wrapping_add(1);
            v
        }

        fn next_u64(&mut self) -> u64 {
            self.next_u32() as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for b in dest {
                *b = self.next_u32() as u8;
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    #[test]
    fn client_id_shape() {
        let mut rng = SeqRng(0);
        let id = client_id("trackpanel", "feather-m4", &mut rng);

        assert!(id.starts_with("trackpanel-"));
        // Suffix is sized by the board id and drawn from A-Z.
        let suffix = &id["trackpanel-".len()..];
        assert_eq!(suffix.len(), "feather-m4".len());
        assert!(suffix.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn client_id_varies_with_rng() {
        let a = client_id("tp", "board", &mut SeqRng(0));
        let b = client_id("tp", "board", &mut SeqRng(7));
        assert_ne!(a, b);
    }
}
