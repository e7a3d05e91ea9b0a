//! # Now-Playing Display Controller
//!
//! `trackpanel` is a `no_std` controller core for a small unattended device:
//! it keeps a Wi-Fi + MQTT session alive, subscribes to a single topic
//! carrying now-playing metadata, and renders artist and title onto a
//! sideways-mounted monochrome OLED. Built on the [Embassy](https://embassy.dev/)
//! async ecosystem.
//!
//! ## Core Features
//!
//! - **`no_std` & `no_alloc`:** Runs on bare-metal microcontrollers; buffers
//!   are managed with `heapless`.
//! - **Fully Async:** `async/await` throughout, with native `async fn` in
//!   traits. One logical task interleaves inbound messages with keep-alive
//!   deadlines; renders and session operations never overlap.
//! - **Two-class failure policy:** Radio join and address acquisition retry
//!   forever with a fixed delay; broker connect, subscribe, and keep-alive
//!   failures are fatal-class and follow a configurable restart policy.
//! - **Hardware seams everywhere:** Radio, broker session, transport, panel,
//!   delay, and entropy are all traits, so the whole controller runs against
//!   test doubles on the host.
//!
//! ## Architecture
//!
//! Leaf-first: [`layout`] is a pure function from a string to positioned
//! lines; [`render`] orders the draw calls for one track against a panel
//! [`render::Surface`]; [`track`] decodes payload bytes; [`session`] speaks
//! the at-most-once MQTT subset over a [`transport::Transport`];
//! [`supervisor`] owns the bring-up state machine; [`controller`] ties the
//! loop together.
//!
//! ```ignore
//! let session: MqttSession<_, 1024> = MqttSession::new(transport);
//! let supervisor = Supervisor::new(radio, session, delay, rng, SupervisorConfig::default());
//! let renderer = TrackRenderer::new(display, delay, Geometry::default());
//! let mut controller = Controller::new(
//!     supervisor, renderer, delay, net, broker, FatalPolicy::default(),
//! );
//! controller.run().await
//! ```

#![cfg_attr(not(test), no_std)]

#[macro_use]
mod fmt;

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod layout;
pub mod link;
pub mod packet;
pub mod render;
pub mod session;
pub mod supervisor;
pub mod track;
pub mod transport;

// Re-export key types for easier access at the crate root.
pub use config::{BrokerConfig, Geometry, NetworkConfig};
pub use controller::{Controller, FatalPolicy};
pub use display::Sh1107;
pub use error::{FailureClass, SessionError, SupervisorError};
pub use layout::{TextLayout, layout};
pub use link::Radio;
pub use packet::QoS;
pub use render::{Surface, TrackRenderer};
pub use session::{Broker, MqttSession};
pub use supervisor::{ConnectionState, Supervisor, SupervisorConfig};
pub use track::{TrackInfo, decode};
pub use transport::{TcpTransport, Transport};
