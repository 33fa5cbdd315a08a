//! # Packed Image Rendering
//!
//! This module paints a packed 4-bit image onto a [`Panel`]. Every byte holds
//! two horizontally adjacent pixels, the high nibble on the left. The 16 source
//! levels are reduced to the panel's 8 by dropping the lowest bit.
//!
//! The reduction must stay a right shift. The server dithers against this
//! exact mapping.

use crate::panel::{Panel, PanelError};

/// Reduce a 4-bit sample (0..=15) to the panel's 3-bit depth (0..=7).
#[inline]
pub fn reduce_depth(nibble: u8) -> u8 {
    (nibble & 0x0F) >> 1
}

/// Pixel covered by the high nibble of byte `index`; the low nibble covers
/// the pixel to its right.
///
/// `width` must be at least 2.
#[inline]
pub fn pixel_position(index: usize, width: u32) -> (u32, u32) {
    let half_width = (width / 2) as usize;
    let y = index / half_width;
    let x = (index % half_width) * 2;
    (x as u32, y as u32)
}

/// Paint every byte of `payload` onto `panel` without committing.
///
/// The caller decides what a valid payload is; this walks exactly the bytes it
/// is given. Pixels that fall outside the panel are dropped by the panel.
pub fn render<P: Panel + ?Sized>(panel: &mut P, payload: &[u8]) {
    let width = panel.width();
    if width < 2 {
        log::warn!("Panel width {} cannot hold a packed pixel pair, nothing rendered", width);
        return;
    }

    log::debug!("Rendering {} bytes onto a {}px wide panel", payload.len(), width);

    for (index, &byte) in payload.iter().enumerate() {
        let (x, y) = pixel_position(index, width);
        panel.set_pixel(x, y, reduce_depth(byte >> 4));
        panel.set_pixel(x + 1, y, reduce_depth(byte & 0x0F));
    }
}

/// Paint `payload` and commit it in one go.
pub fn render_frame<P: Panel + ?Sized>(panel: &mut P, payload: &[u8]) -> Result<(), PanelError> {
    render(panel, payload);
    panel.commit()
}
