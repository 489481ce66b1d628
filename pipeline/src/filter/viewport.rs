use image::imageops::{self, FilterType};
use image::RgbImage;

/// Largest half-extent; the whole frame is visible.
pub const IDENTITY_ZOOM: f64 = 0.5;

/// Digital zoom state.
///
/// `zoom` is the half-extent of the visible window as a fraction of the
/// frame size, in (0, 0.5]. `center` is in frame pixels and is kept such
/// that the window `[cx - w*z, cx + w*z] x [cy - h*z, cy + h*z]` lies inside
/// the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewportState {
    pub zoom: f64,
    pub center: Option<(f64, f64)>,
    frame_size: Option<(u32, u32)>,
}

impl Default for ViewportState {
    fn default() -> Self {
        Self {
            zoom: IDENTITY_ZOOM,
            center: None,
            frame_size: None,
        }
    }
}

/// Map a control value in [0, 1] to a half-extent in (0, 0.5].
pub fn zoom_from_normalized(zoom: f64) -> f64 {
    (1.0 - zoom.clamp(0.0, 1.0) * 0.99) / 2.0
}

impl ViewportState {
    pub fn with_normalized_zoom(zoom: f64) -> Self {
        Self {
            zoom: zoom_from_normalized(zoom),
            ..Self::default()
        }
    }

    pub fn set_normalized_zoom(&mut self, zoom: f64) {
        self.zoom = zoom_from_normalized(zoom);
        self.clamp_center();
    }

    pub fn is_identity(&self) -> bool {
        self.zoom >= IDENTITY_ZOOM
    }

    /// Forget the centre and frame size, e.g. after a source switch.
    pub fn reset(&mut self) {
        self.center = None;
        self.frame_size = None;
    }

    /// Move the window by a pointer delta.
    ///
    /// `dx`/`dy` are per-event deltas from a bottom-up pointer space, hence
    /// the inverted Y. Does nothing until a frame size is known.
    pub fn recenter(&mut self, dx: f64, dy: f64, sensitivity: f64) {
        let Some((w, h)) = self.frame_size else {
            return;
        };
        if self.is_identity() {
            return;
        }
        let (cx, cy) = self.center.unwrap_or((w as f64 / 2.0, h as f64 / 2.0));
        let step = self.zoom * sensitivity;
        self.center = Some((cx + dx * step, cy - dy * step));
        self.clamp_center();
    }

    /// Visible window as `(x0, y0, x1, y1)` for the last seen frame size.
    pub fn crop_rect(&self) -> Option<(f64, f64, f64, f64)> {
        let (w, h) = self.frame_size?;
        let (w, h) = (w as f64, h as f64);
        let (cx, cy) = self.center.unwrap_or((w / 2.0, h / 2.0));
        let (hw, hh) = (w * self.zoom, h * self.zoom);
        Some((cx - hw, cy - hh, cx + hw, cy + hh))
    }

    fn clamp_center(&mut self) {
        let (Some((w, h)), Some((cx, cy))) = (self.frame_size, self.center) else {
            return;
        };
        let (w, h) = (w as f64, h as f64);
        let z = self.zoom.min(IDENTITY_ZOOM);
        self.center = Some((
            cx.clamp(w * z, w - w * z),
            cy.clamp(h * z, h - h * z),
        ));
    }

    /// Crop to the visible window and scale back to the input size.
    pub fn apply_zoom(&mut self, image: &RgbImage) -> RgbImage {
        let (w, h) = image.dimensions();
        if self.frame_size != Some((w, h)) {
            self.frame_size = Some((w, h));
            self.center = None;
        }
        if self.center.is_none() || self.is_identity() {
            self.center = Some((w as f64 / 2.0, h as f64 / 2.0));
        }
        if self.is_identity() || w == 0 || h == 0 {
            return image.clone();
        }
        self.clamp_center();

        let Some((x0, y0, x1, y1)) = self.crop_rect() else {
            return image.clone();
        };
        let left = (x0.floor().max(0.0) as u32).min(w - 1);
        let top = (y0.floor().max(0.0) as u32).min(h - 1);
        let crop_w = ((x1 - x0).round() as u32).clamp(1, w - left);
        let crop_h = ((y1 - y0).round() as u32).clamp(1, h - top);

        let window = imageops::crop_imm(image, left, top, crop_w, crop_h).to_image();
        imageops::resize(&window, w, h, FilterType::Triangle)
    }
}
