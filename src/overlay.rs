//! Detection overlay geometry.
//!
//! Service boxes are in source-image pixels. The preview is shown with
//! object-fit "contain", so every box is scaled and offset into container
//! pixels before it is drawn, whatever the display size.

use crate::detect::{BoundingBox, Detection};
use crate::report::{confidence_tier, ConfidenceTier};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    fn is_drawable(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Rectangle in container pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rect {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

/// Uniform scale plus letterbox offset of a contained image.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContainTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ContainTransform {
    /// `None` when either size is empty or not finite.
    pub fn fit(source: Size, container: Size) -> Option<Self> {
        if !source.is_drawable() || !container.is_drawable() {
            return None;
        }
        let scale = (container.width / source.width).min(container.height / source.height);
        Some(Self {
            scale,
            offset_x: (container.width - source.width * scale) / 2.0,
            offset_y: (container.height - source.height * scale) / 2.0,
        })
    }

    pub fn apply(&self, bbox: &BoundingBox) -> Rect {
        Rect {
            left: self.offset_x + bbox.x * self.scale,
            top: self.offset_y + bbox.y * self.scale,
            width: bbox.width * self.scale,
            height: bbox.height * self.scale,
        }
    }
}

/// One drawable annotation.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub rect: Rect,
    pub label: String,
    pub percent: u32,
    pub tier: ConfidenceTier,
}

impl Annotation {
    pub fn caption(&self) -> String {
        format!("{} {}%", self.label, self.percent)
    }
}

/// Map detections into container space. One annotation per detection, in order.
pub fn annotate(detections: &[Detection], source: Size, container: Size) -> Vec<Annotation> {
    let Some(transform) = ContainTransform::fit(source, container) else {
        return Vec::new();
    };
    detections
        .iter()
        .map(|det| Annotation {
            rect: transform.apply(&det.bbox),
            label: det.label.clone(),
            percent: det.percent(),
            tier: confidence_tier(det.confidence),
        })
        .collect()
}

fn tier_color(tier: ConfidenceTier) -> image::Rgb<u8> {
    match tier {
        ConfidenceTier::High => image::Rgb([34, 197, 94]),
        ConfidenceTier::Medium => image::Rgb([234, 179, 8]),
        ConfidenceTier::Low => image::Rgb([249, 115, 22]),
    }
}

/// Burn box outlines into an image whose container is the image itself.
pub fn draw_annotations(canvas: &mut image::RgbImage, annotations: &[Annotation], thickness: u32) {
    let (w, h) = canvas.dimensions();
    if w == 0 || h == 0 {
        return;
    }
    for annotation in annotations {
        let color = tier_color(annotation.tier);
        let clamp_x = |v: f64| v.round().clamp(0.0, (w - 1) as f64) as u32;
        let clamp_y = |v: f64| v.round().clamp(0.0, (h - 1) as f64) as u32;
        let x0 = clamp_x(annotation.rect.left);
        let y0 = clamp_y(annotation.rect.top);
        let x1 = clamp_x(annotation.rect.left + annotation.rect.width);
        let y1 = clamp_y(annotation.rect.top + annotation.rect.height);
        for t in 0..thickness {
            for x in x0..=x1 {
                canvas.put_pixel(x, (y0 + t).min(y1), color);
                canvas.put_pixel(x, y1.saturating_sub(t).max(y0), color);
            }
            for y in y0..=y1 {
                canvas.put_pixel((x0 + t).min(x1), y, color);
                canvas.put_pixel(x1.saturating_sub(t).max(x0), y, color);
            }
        }
    }
}
