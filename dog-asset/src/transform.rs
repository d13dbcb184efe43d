//! Synchronous image transforms: resize, re-encode, tag density.
//!
//! Everything here blocks; callers run it on the blocking pool behind the
//! adapter's transform semaphore.

use std::io::Cursor;

use bytes::Bytes;
use image::codecs::jpeg::{JpegEncoder, PixelDensity};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use crate::{AssetError, AssetResult, ResizePolicy};

const INCHES_PER_METER: f64 = 39.370_078_740_157_48;

/// Fully resolved transform parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformSpec {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub dpi: Option<u32>,
    pub quality: u8,
    pub policy: ResizePolicy,
}

/// How the source should be scaled, if at all
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePlan {
    /// Scale to exactly these dimensions (aspect already preserved)
    Fit { width: u32, height: u32 },
    /// Cover the box and crop the overflow, centred
    Fill { width: u32, height: u32 },
}

/// Encoded output of a transform
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub data: Bytes,
    pub content_type: &'static str,
    pub width: u32,
    pub height: u32,
}

/// Decide the target box for a source of `src_w` x `src_h`.
///
/// A single dimension keeps the aspect ratio; both dimensions cover and crop.
/// Under [`ResizePolicy::WithoutEnlargement`] a target bigger than the
/// source in any requested dimension leaves the image at its native size.
pub fn plan_resize(src_w: u32, src_h: u32, spec: &TransformSpec) -> Option<ResizePlan> {
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let no_enlarge = spec.policy == ResizePolicy::WithoutEnlargement;

    let plan = match (spec.width, spec.height) {
        (None, None) => return None,
        (Some(w), None) => {
            if no_enlarge && w > src_w {
                return None;
            }
            ResizePlan::Fit {
                width: w,
                height: scale(src_h, w, src_w),
            }
        }
        (None, Some(h)) => {
            if no_enlarge && h > src_h {
                return None;
            }
            ResizePlan::Fit {
                width: scale(src_w, h, src_h),
                height: h,
            }
        }
        (Some(w), Some(h)) => {
            if no_enlarge && (w > src_w || h > src_h) {
                return None;
            }
            ResizePlan::Fill { width: w, height: h }
        }
    };

    match plan {
        ResizePlan::Fit { width, height } | ResizePlan::Fill { width, height }
            if width == src_w && height == src_h =>
        {
            None
        }
        plan => Some(plan),
    }
}

/// `value * num / den`, rounded, never below one pixel
fn scale(value: u32, num: u32, den: u32) -> u32 {
    let scaled = (u64::from(value) * u64::from(num) + u64::from(den) / 2) / u64::from(den);
    scaled.clamp(1, u64::from(u32::MAX)) as u32
}

/// Decode `data`, apply `spec`, and re-encode in the source format
pub fn transform_image(data: &[u8], format: ImageFormat, spec: &TransformSpec) -> AssetResult<TransformOutput> {
    let source = image::load_from_memory_with_format(data, format)
        .map_err(|e| AssetError::transform("could not decode source image", e))?;

    let image = match plan_resize(source.width(), source.height(), spec) {
        Some(ResizePlan::Fit { width, height }) => source.resize_exact(width, height, FilterType::Lanczos3),
        Some(ResizePlan::Fill { width, height }) => source.resize_to_fill(width, height, FilterType::Lanczos3),
        None => source,
    };

    let (data, content_type) = encode(&image, format, spec)?;
    Ok(TransformOutput {
        data: Bytes::from(data),
        content_type,
        width: image.width(),
        height: image.height(),
    })
}

fn encode(image: &DynamicImage, format: ImageFormat, spec: &TransformSpec) -> AssetResult<(Vec<u8>, &'static str)> {
    match format {
        ImageFormat::Jpeg => Ok((encode_jpeg(image, spec)?, "image/jpeg")),
        ImageFormat::Png => Ok((encode_png(image, spec.dpi)?, "image/png")),
        ImageFormat::Gif | ImageFormat::WebP => {
            if let Some(dpi) = spec.dpi {
                debug!(?format, dpi, "format has no density field, dpi dropped");
            }
            let content_type = if format == ImageFormat::Gif { "image/gif" } else { "image/webp" };
            Ok((encode_with(image, format)?, content_type))
        }
        other => Err(AssetError::transform_msg(format!(
            "unsupported output format {:?}",
            other
        ))),
    }
}

fn encode_jpeg(image: &DynamicImage, spec: &TransformSpec) -> AssetResult<Vec<u8>> {
    let rgb = image.to_rgb8();
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, spec.quality);
    if let Some(dpi) = spec.dpi {
        encoder.set_pixel_density(PixelDensity::dpi(dpi.min(u32::from(u16::MAX)) as u16));
    }
    encoder
        .encode_image(&rgb)
        .map_err(|e| AssetError::transform("could not encode jpeg", e))?;
    Ok(buf)
}

fn encode_png(image: &DynamicImage, dpi: Option<u32>) -> AssetResult<Vec<u8>> {
    let rgba = image.to_rgba8();
    let mut buf = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut buf, rgba.width(), rgba.height());
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = dpi_to_pixels_per_meter(dpi);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| AssetError::transform("could not encode png", e))?;
        writer
            .write_image_data(rgba.as_raw())
            .map_err(|e| AssetError::transform("could not encode png", e))?;
        writer
            .finish()
            .map_err(|e| AssetError::transform("could not encode png", e))?;
    }
    Ok(buf)
}

fn encode_with(image: &DynamicImage, format: ImageFormat) -> AssetResult<Vec<u8>> {
    let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
    let mut buf = Cursor::new(Vec::new());
    rgba.write_to(&mut buf, format)
        .map_err(|e| AssetError::transform(format!("could not encode {:?}", format), e))?;
    Ok(buf.into_inner())
}

/// Whether the encoder for `format` can record a DPI value
pub fn carries_density(format: ImageFormat) -> bool {
    matches!(format, ImageFormat::Jpeg | ImageFormat::Png)
}

pub fn dpi_to_pixels_per_meter(dpi: u32) -> u32 {
    (f64::from(dpi) * INCHES_PER_METER).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn spec(width: Option<u32>, height: Option<u32>) -> TransformSpec {
        TransformSpec {
            width,
            height,
            dpi: None,
            quality: 80,
            policy: ResizePolicy::WithoutEnlargement,
        }
    }

    fn sample(format: ImageFormat, w: u32, h: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([200, 40, 10, 255])));
        // JPEG has no alpha channel
        let img = if format == ImageFormat::Jpeg {
            DynamicImage::ImageRgb8(img.to_rgb8())
        } else {
            img
        };
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    #[test]
    fn single_dimension_keeps_aspect() {
        assert_eq!(
            plan_resize(200, 100, &spec(Some(100), None)),
            Some(ResizePlan::Fit { width: 100, height: 50 })
        );
        assert_eq!(
            plan_resize(200, 100, &spec(None, Some(25))),
            Some(ResizePlan::Fit { width: 50, height: 25 })
        );
    }

    #[test]
    fn no_enlargement_keeps_native_size() {
        assert_eq!(plan_resize(200, 100, &spec(Some(5000), None)), None);
        assert_eq!(plan_resize(200, 100, &spec(Some(150), Some(150))), None);
    }

    #[test]
    fn enlargement_when_allowed() {
        let mut allow = spec(Some(400), None);
        allow.policy = ResizePolicy::AllowEnlargement;
        assert_eq!(
            plan_resize(200, 100, &allow),
            Some(ResizePlan::Fit { width: 400, height: 200 })
        );
    }

    #[test]
    fn both_dimensions_cover() {
        assert_eq!(
            plan_resize(200, 100, &spec(Some(50), Some(50))),
            Some(ResizePlan::Fill { width: 50, height: 50 })
        );
        assert_eq!(plan_resize(200, 100, &spec(Some(200), Some(100))), None);
    }

    #[test]
    fn tiny_scale_never_reaches_zero() {
        assert_eq!(
            plan_resize(5000, 10, &spec(Some(10), None)),
            Some(ResizePlan::Fit { width: 10, height: 1 })
        );
    }

    #[test]
    fn png_carries_requested_density() {
        let source = sample(ImageFormat::Png, 40, 20);
        let mut with_dpi = spec(Some(20), None);
        with_dpi.dpi = Some(300);

        let out = transform_image(&source, ImageFormat::Png, &with_dpi).unwrap();
        assert_eq!((out.width, out.height), (20, 10));
        assert_eq!(out.content_type, "image/png");

        let reader = png::Decoder::new(Cursor::new(out.data.to_vec())).read_info().unwrap();
        let dims = reader.info().pixel_dims.expect("pHYs chunk");
        assert_eq!(dims.unit, png::Unit::Meter);
        assert_eq!(dims.xppu, dpi_to_pixels_per_meter(300));
        assert_eq!(dims.xppu, 11811);
    }

    #[test]
    fn jpeg_carries_requested_density() {
        let source = sample(ImageFormat::Jpeg, 40, 20);
        let mut with_dpi = spec(None, None);
        with_dpi.dpi = Some(150);

        let out = transform_image(&source, ImageFormat::Jpeg, &with_dpi).unwrap();
        assert_eq!((out.width, out.height), (40, 20));

        let jfif = out
            .data
            .windows(5)
            .position(|w| w == b"JFIF\0")
            .expect("JFIF header");
        // version (2 bytes), then units, then big-endian x/y density
        assert_eq!(out.data[jfif + 7], 1);
        assert_eq!(u16::from_be_bytes([out.data[jfif + 8], out.data[jfif + 9]]), 150);
    }

    #[test]
    fn gif_and_webp_re_encode() {
        for format in [ImageFormat::Gif, ImageFormat::WebP] {
            let source = sample(format, 30, 30);
            let out = transform_image(&source, format, &spec(Some(15), None)).unwrap();
            assert_eq!((out.width, out.height), (15, 15));
            let decoded = image::load_from_memory_with_format(&out.data, format).unwrap();
            assert_eq!(decoded.width(), 15);
        }
    }

    #[test]
    fn only_jpeg_and_png_carry_density() {
        assert!(carries_density(ImageFormat::Jpeg));
        assert!(carries_density(ImageFormat::Png));
        assert!(!carries_density(ImageFormat::Gif));
        assert!(!carries_density(ImageFormat::WebP));
    }

    #[test]
    fn corrupt_source_is_a_transform_error() {
        let err = transform_image(b"not a png", ImageFormat::Png, &spec(Some(20), None)).unwrap_err();
        assert_eq!(err.kind(), crate::AssetErrorKind::Transform);
    }
}
