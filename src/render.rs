//! # Render Sink
//!
//! Turns decoded track metadata into an ordered sequence of draw calls
//! against a [`Surface`]. Renders are single-threaded and run to completion,
//! so the panel always shows exactly one coherent track.

use embedded_hal_async::delay::DelayNs;

use crate::config::Geometry;
use crate::layout::{Line, layout};
use crate::track::TrackInfo;

/// Abstraction over the physical panel.
///
/// The frame buffer is exclusively owned by the implementation; callers
/// mutate it only through these operations.
#[allow(async_fn_in_trait)]
pub trait Surface {
    type Error: core::fmt::Debug;

    /// Immediately wipe the panel's display RAM.
    async fn clear_panel(&mut self) -> Result<(), Self::Error>;

    /// Reset the in-memory frame buffer.
    fn clear_frame(&mut self);

    /// Rasterize one line of text into the frame buffer, foreground color.
    fn draw_text(&mut self, line: &Line) -> Result<(), Self::Error>;

    /// Push the frame buffer to the panel.
    async fn present(&mut self) -> Result<(), Self::Error>;
}

impl<S: Surface + ?Sized> Surface for &mut S {
    type Error = S::Error;

    async fn clear_panel(&mut self) -> Result<(), Self::Error> {
        (**self).clear_panel().await
    }

    fn clear_frame(&mut self) {
        (**self).clear_frame()
    }

    fn draw_text(&mut self, line: &Line) -> Result<(), Self::Error> {
        (**self).draw_text(line)
    }

    async fn present(&mut self) -> Result<(), Self::Error> {
        (**self).present().await
    }
}

/// Renders one track per inbound message onto a [`Surface`].
pub struct TrackRenderer<S, D> {
    surface: S,
    delay: D,
    geometry: Geometry,
}

impl<S: Surface, D: DelayNs> TrackRenderer<S, D> {
    pub fn new(surface: S, delay: D, geometry: Geometry) -> Self {
        Self {
            surface,
            delay,
            geometry,
        }
    }

    /// Access the wrapped surface, e.g. for driver setup.
    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Render one track. Strictly ordered: wipe the panel, reset the frame,
    /// wait out the panel's post-wipe settle time, draw the artist block at
    /// the fixed anchor, draw the title block immediately above it, present.
    pub async fn render(&mut self, track: &TrackInfo<'_>) -> Result<(), S::Error> {
        let g = self.geometry;

        self.surface.clear_panel().await?;
        self.surface.clear_frame();
        self.delay.delay_ms(g.settle_ms).await;

        let artist = layout(track.artist, g.max_chars, g.artist_anchor, g.line_pitch);
        for line in artist.lines() {
            self.surface.draw_text(line)?;
        }

        let title_anchor = artist.bottom() - g.block_gap;
        let title = layout(track.title, g.max_chars, title_anchor, g.line_pitch);
        for line in title.lines() {
            self.surface.draw_text(line)?;
        }

        self.surface.present().await
    }
}
