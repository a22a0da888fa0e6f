//! Source image properties and the inspection seam.
//!
//! Image decoding is an external collaborator: the orchestrator only needs
//! the [`ImageProperties`] snapshot and a way to produce a working TIFF for
//! the encoder. [`ImageCrateInspector`] is the bundled backend built on the
//! `image` crate; color-managed pipelines can inject their own
//! [`ImageInspector`].

use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Colorspace classification of a source image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Colorspace {
    /// Single-channel grayscale.
    Gray,
    /// Three-channel color.
    Color,
}

impl Colorspace {
    /// The `-jp2_space` tag signalled to the encoder.
    pub fn jp2_space_tag(&self) -> &'static str {
        match self {
            Colorspace::Gray => "sLUM",
            Colorspace::Color => "sRGB",
        }
    }

    /// The suffix used in preset keys (`<preset>_<gray|color>`).
    pub fn preset_suffix(&self) -> &'static str {
        match self {
            Colorspace::Gray => "gray",
            Colorspace::Color => "color",
        }
    }
}

/// Immutable snapshot of a source image, taken once per source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageProperties {
    /// Pixel width.
    pub width: u32,
    /// Pixel height.
    pub height: u32,
    /// Colorspace as reported by the inspection backend. A hint only; see
    /// [`estimate_bits_per_pixel`](crate::depth::estimate_bits_per_pixel).
    pub colorspace: Colorspace,
    /// Bits per channel.
    pub channel_bit_depth: u32,
    /// Size of the encoded source in bytes.
    pub byte_size: u64,
}

impl ImageProperties {
    /// The longer of width and height, used for resolution-level sizing.
    pub fn long_dim(&self) -> u32 {
        self.width.max(self.height)
    }
}

/// Preprocessing applied while staging the working image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformOptions {
    /// Target dimensions to fit within, preserving aspect ratio.
    pub resize: Option<(u32, u32)>,
    /// Convert a color source to the sRGB profile.
    pub to_srgb: bool,
}

/// Seam for image decoding, metadata extraction, and working-file
/// preparation.
pub trait ImageInspector: Send + Sync {
    /// Extract the properties of an encoded source image.
    fn inspect(&self, bytes: &[u8]) -> Result<ImageProperties>;

    /// Decode the source, apply `opts`, and re-encode as a TIFF working
    /// image suitable for the external encoder. The sRGB profile conversion
    /// only applies when the source is color and the option is set.
    fn transform(
        &self,
        bytes: &[u8],
        props: &ImageProperties,
        opts: &TransformOptions,
    ) -> Result<Vec<u8>>;
}

/// Inspection backend built on the `image` crate.
///
/// Profile-accurate sRGB conversion needs an ICC-capable backend; this one
/// logs and skips that step while still handling decode, resize, and TIFF
/// staging.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateInspector;

impl ImageInspector for ImageCrateInspector {
    fn inspect(&self, bytes: &[u8]) -> Result<ImageProperties> {
        let img = image::load_from_memory(bytes).map_err(|e| Error::inspect(e.to_string()))?;
        let color = img.color();
        let channels = u32::from(color.channel_count());
        // Alpha does not change the gray/color classification.
        let colorspace = if channels <= 2 {
            Colorspace::Gray
        } else {
            Colorspace::Color
        };
        let channel_bit_depth = u32::from(color.bits_per_pixel()) / channels.max(1);

        Ok(ImageProperties {
            width: img.width(),
            height: img.height(),
            colorspace,
            channel_bit_depth,
            byte_size: bytes.len() as u64,
        })
    }

    fn transform(
        &self,
        bytes: &[u8],
        props: &ImageProperties,
        opts: &TransformOptions,
    ) -> Result<Vec<u8>> {
        let mut img = image::load_from_memory(bytes).map_err(|e| Error::inspect(e.to_string()))?;

        if let Some((width, height)) = opts.resize {
            img = img.resize(width, height, image::imageops::FilterType::Lanczos3);
        }

        if opts.to_srgb && props.colorspace == Colorspace::Color {
            tracing::debug!(
                "sRGB profile conversion requires an ICC-capable inspector backend; skipping"
            );
        }

        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Tiff)
            .map_err(|e| Error::inspect(e.to_string()))?;
        Ok(buf.into_inner())
    }
}

/// Parse a `WxH` geometry string (e.g. `"1024x768"`).
pub fn parse_geometry(geometry: &str) -> Result<(u32, u32)> {
    let mut parts = geometry.trim().splitn(2, ['x', 'X']);
    let width = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    let height = parts.next().and_then(|p| p.trim().parse::<u32>().ok());
    match (width, height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::config(format!(
            "invalid resize geometry \"{geometry}\"; expected WxH"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes(width: u32, height: u32, gray: bool) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        if gray {
            let img = image::GrayImage::from_pixel(width, height, image::Luma([128u8]));
            img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        } else {
            let img = image::RgbImage::from_pixel(width, height, image::Rgb([200u8, 10, 10]));
            img.write_to(&mut buf, image::ImageFormat::Png).unwrap();
        }
        buf.into_inner()
    }

    #[test]
    fn jp2_space_tags() {
        assert_eq!(Colorspace::Gray.jp2_space_tag(), "sLUM");
        assert_eq!(Colorspace::Color.jp2_space_tag(), "sRGB");
    }

    #[test]
    fn long_dim_picks_larger_side() {
        let props = ImageProperties {
            width: 640,
            height: 480,
            colorspace: Colorspace::Color,
            channel_bit_depth: 8,
            byte_size: 1000,
        };
        assert_eq!(props.long_dim(), 640);
    }

    #[test]
    fn inspect_reads_dimensions_and_colorspace() {
        let bytes = png_bytes(8, 6, false);
        let props = ImageCrateInspector.inspect(&bytes).unwrap();
        assert_eq!(props.width, 8);
        assert_eq!(props.height, 6);
        assert_eq!(props.colorspace, Colorspace::Color);
        assert_eq!(props.channel_bit_depth, 8);
        assert_eq!(props.byte_size, bytes.len() as u64);
    }

    #[test]
    fn inspect_classifies_grayscale() {
        let bytes = png_bytes(4, 4, true);
        let props = ImageCrateInspector.inspect(&bytes).unwrap();
        assert_eq!(props.colorspace, Colorspace::Gray);
    }

    #[test]
    fn transform_resizes_and_produces_tiff() {
        let bytes = png_bytes(16, 16, false);
        let props = ImageCrateInspector.inspect(&bytes).unwrap();
        let opts = TransformOptions {
            resize: Some((8, 8)),
            to_srgb: true,
        };
        let tiff = ImageCrateInspector.transform(&bytes, &props, &opts).unwrap();
        let staged = image::load_from_memory(&tiff).unwrap();
        assert_eq!(staged.width(), 8);
        assert_eq!(staged.height(), 8);
    }

    #[test]
    fn inspect_rejects_garbage() {
        let result = ImageCrateInspector.inspect(b"not an image");
        assert!(matches!(result, Err(Error::Inspect(_))));
    }

    #[test]
    fn geometry_parses_and_rejects() {
        assert_eq!(parse_geometry("1024x768").unwrap(), (1024, 768));
        assert_eq!(parse_geometry("200X150").unwrap(), (200, 150));
        assert!(parse_geometry("x768").is_err());
        assert!(parse_geometry("1024").is_err());
        assert!(parse_geometry("0x10").is_err());
    }
}
