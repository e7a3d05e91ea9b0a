//! # Radio Link
//!
//! Seam between the supervisor and the wireless hardware. Implementations
//! wrap a HAL Wi-Fi controller plus the network stack's address
//! configuration; low-level bus and pin bring-up stays outside this crate.

use core::net::Ipv4Addr;

/// A joinable wireless link.
#[allow(async_fn_in_trait)]
pub trait Radio {
    type Error: core::fmt::Debug;

    /// Associate with the configured access point. Implementations should
    /// bound the attempt with their own timeout rather than hang; the
    /// supervisor retries failures without bound.
    async fn join(&mut self, ssid: &str, passphrase: &str) -> Result<(), Self::Error>;

    /// The acquired IPv4 address, once e.g. DHCP completes. The supervisor
    /// polls this after a successful join.
    fn address(&self) -> Option<Ipv4Addr>;
}

impl<R: Radio + ?Sized> Radio for &mut R {
    type Error = R::Error;

    async fn join(&mut self, ssid: &str, passphrase: &str) -> Result<(), Self::Error> {
        (**self).join(ssid, passphrase).await
    }

    fn address(&self) -> Option<Ipv4Addr> {
        (**self).address()
    }
}
