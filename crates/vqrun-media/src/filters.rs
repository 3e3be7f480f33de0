//! FFmpeg video filter definitions.

use vqrun_models::{Dimensions, FrameRegion};

/// Build the workfile transform chain: crop, then pad, then scale.
pub fn transform_filter(
    crop: Option<&FrameRegion>,
    pad: Option<&FrameRegion>,
    target: Dimensions,
) -> String {
    let mut filters = Vec::with_capacity(3);

    if let Some(crop) = crop {
        filters.push(format!("crop={}", crop));
    }
    if let Some(pad) = pad {
        filters.push(format!("pad={}", pad));
    }
    filters.push(format!("scale={}", target));

    filters.join(",")
}
