//! Where views go inside their window.
//!
//! All inputs are window sizes; outputs are bounds relative to the window.

use crate::backend::WindowState;
use crate::config::LayoutConfig;
use crate::geometry::{Bounds, Size};

/// Primary view with no overlay: the whole window.
pub fn primary_bounds(window: Size) -> Bounds {
    Bounds::new(0, 0, window.width, window.height)
}

/// Primary view behind an overlay. It keeps covering the window so the
/// header stays interactive around the overlay.
pub fn primary_backdrop_bounds(window: Size) -> Bounds {
    primary_bounds(window)
}

/// Overlay view: below the header, inset by the overlay padding.
pub fn overlay_bounds(cfg: &LayoutConfig, window: Size) -> Bounds {
    let pad = cfg.overlay_padding();
    Bounds::new(
        pad as i32,
        (cfg.header_height + pad) as i32,
        window.width.saturating_sub(pad * 2),
        window
            .height
            .saturating_sub(cfg.header_height)
            .saturating_sub(pad * 2),
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetachedLayout {
    /// `None` when the bar is hidden (fullscreen, or disabled).
    pub control_bar: Option<Bounds>,
    pub content: Bounds,
}

/// Control bar strip on top, content fills the rest. Fullscreen gives the
/// whole window to the content.
pub fn detached_layout(
    window: Size,
    state: WindowState,
    bar_height: u32,
    show_bar: bool,
) -> DetachedLayout {
    if !show_bar || state == WindowState::Fullscreen {
        return DetachedLayout {
            control_bar: None,
            content: primary_bounds(window),
        };
    }
    let bar = bar_height.min(window.height);
    DetachedLayout {
        control_bar: Some(Bounds::new(0, 0, window.width, bar)),
        content: Bounds::new(0, bar as i32, window.width, window.height - bar),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_is_inset_below_header() {
        let cfg = LayoutConfig::default();
        assert_eq!(
            overlay_bounds(&cfg, Size::new(800, 600)),
            Bounds::new(16, 66, 768, 518)
        );
    }

    #[test]
    fn overlay_saturates_on_tiny_windows() {
        let cfg = LayoutConfig::default();
        let b = overlay_bounds(&cfg, Size::new(20, 40));
        assert_eq!((b.width, b.height), (0, 0));
    }

    #[test]
    fn detached_layout_splits_or_fills() {
        let normal = detached_layout(Size::new(800, 600), WindowState::Normal, 32, true);
        assert_eq!(normal.control_bar, Some(Bounds::new(0, 0, 800, 32)));
        assert_eq!(normal.content, Bounds::new(0, 32, 800, 568));

        let full = detached_layout(Size::new(1920, 1080), WindowState::Fullscreen, 32, true);
        assert_eq!(full.control_bar, None);
        assert_eq!(full.content, Bounds::new(0, 0, 1920, 1080));
    }
}
