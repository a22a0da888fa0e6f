//! Effective bit-depth estimation.
//!
//! Some inspection backends classify an image as grayscale from its pixel
//! values even when the file is physically encoded with three channels (a
//! grayscale photo re-saved by an RGB-capable editor, for instance). Taking
//! the hint at face value would under-estimate the per-pixel payload and
//! corrupt the rate calculation, so a size-consistency check corrects it.

use crate::image::{Colorspace, ImageProperties};

/// Estimate the effective bits per pixel carried by the encoded source.
///
/// For a grayscale hint, the expected size of a true single-channel encoding
/// is `width * height * (channel_bit_depth / 8)` (truncating division, since
/// source depths are whole bytes per channel). An actual file more than twice
/// that size is judged to really carry three channels.
///
/// This is a best-effort heuristic, not exact colorspace detection; it only
/// feeds the compression-rate computation.
pub fn estimate_bits_per_pixel(props: &ImageProperties) -> u32 {
    match props.colorspace {
        Colorspace::Color => 3 * props.channel_bit_depth,
        Colorspace::Gray => {
            let bytes_per_channel = u64::from(props.channel_bit_depth / 8);
            let predicted = u64::from(props.width) * u64::from(props.height) * bytes_per_channel;
            if props.byte_size > 2 * predicted {
                tracing::debug!(
                    byte_size = props.byte_size,
                    predicted,
                    "grayscale hint inconsistent with file size; assuming 3 channels"
                );
                3 * props.channel_bit_depth
            } else {
                props.channel_bit_depth
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gray_props(byte_size: u64) -> ImageProperties {
        ImageProperties {
            width: 1000,
            height: 1000,
            colorspace: Colorspace::Gray,
            channel_bit_depth: 8,
            byte_size,
        }
    }

    #[test]
    fn oversized_gray_file_treated_as_three_channels() {
        // Predicted single-channel size is 1,000,000 bytes; 2.5 MB exceeds
        // twice that, so the hint is overridden.
        assert_eq!(estimate_bits_per_pixel(&gray_props(2_500_000)), 24);
    }

    #[test]
    fn plausible_gray_file_keeps_single_channel() {
        assert_eq!(estimate_bits_per_pixel(&gray_props(900_000)), 8);
    }

    #[test]
    fn boundary_is_strictly_greater_than_double() {
        assert_eq!(estimate_bits_per_pixel(&gray_props(2_000_000)), 8);
        assert_eq!(estimate_bits_per_pixel(&gray_props(2_000_001)), 24);
    }

    #[test]
    fn color_hint_is_always_three_channels() {
        let props = ImageProperties {
            width: 100,
            height: 100,
            colorspace: Colorspace::Color,
            channel_bit_depth: 16,
            byte_size: 1,
        };
        assert_eq!(estimate_bits_per_pixel(&props), 48);
    }

    #[test]
    fn channel_depth_division_truncates() {
        // 12-bit channels: 12 / 8 truncates to 1 byte per channel.
        let props = ImageProperties {
            width: 1000,
            height: 1000,
            colorspace: Colorspace::Gray,
            channel_bit_depth: 12,
            byte_size: 2_500_000,
        };
        assert_eq!(estimate_bits_per_pixel(&props), 36);
    }
}
