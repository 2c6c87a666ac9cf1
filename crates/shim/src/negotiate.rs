//! Output configuration negotiation.
//!
//! Maps a set of requested output surfaces onto what the legacy device can
//! actually produce: one shared intermediate preview buffer that every
//! preview-class output is rendered from, and one still-capture size that
//! every JPEG output can be cropped out of.

use crate::device::CameraParameters;
use crate::errors::{EngineError, Result};
use crate::size::{FpsRange, Size, aspect_ratios_match, cmp_by_area, largest_by_area};
use crate::surface::{SurfaceRef, partition_outputs, surface_sizes};

/// The negotiated configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct OutputConfiguration {
    pub preview_outputs: Vec<SurfaceRef>,
    pub still_outputs: Vec<SurfaceRef>,
    /// Size of the shared preview buffer; `None` without preview outputs.
    pub intermediate_size: Option<Size>,
    pub picture: Option<PictureSelection>,
}

impl OutputConfiguration {
    pub fn is_empty(&self) -> bool {
        self.preview_outputs.is_empty() && self.still_outputs.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictureSelection {
    /// Size handed to the device's take-picture call.
    pub size: Size,
    /// Bounding rectangle of all configured still outputs.
    pub bound: Size,
}

impl PictureSelection {
    /// Outputs must be cropped out of the captured picture.
    pub fn needs_crop(&self) -> bool {
        self.size != self.bound
    }
}

/// Pick the intermediate preview buffer size.
///
/// The largest supported picture size is taken as the sensor aspect ratio.
/// Among preview sizes with that aspect ratio and at least the area of the
/// largest output, the smallest wins; otherwise the largest preview size.
pub fn choose_intermediate_size(
    preview_sizes: &[Size],
    picture_sizes: &[Size],
    output_sizes: &[Size],
) -> Result<Size> {
    let largest_preview =
        largest_by_area(preview_sizes).ok_or(EngineError::NoSupportedSizes("preview"))?;
    let sensor = largest_by_area(picture_sizes).ok_or(EngineError::NoSupportedSizes("picture"))?;
    let required_area = largest_by_area(output_sizes).map_or(0, |s| s.area());

    let chosen = preview_sizes
        .iter()
        .copied()
        .filter(|s| aspect_ratios_match(sensor, *s) && s.area() >= required_area)
        .min_by(cmp_by_area)
        .unwrap_or(largest_preview);

    Ok(chosen)
}

/// Pick the smallest supported picture size covering every still output.
///
/// Returns `None` when there are no still outputs.
pub fn choose_picture_size(
    still_sizes: &[Size],
    picture_sizes: &[Size],
) -> Result<Option<PictureSelection>> {
    if still_sizes.is_empty() {
        return Ok(None);
    }

    let bound = Size::new(
        still_sizes.iter().map(|s| s.width).max().unwrap_or(0),
        still_sizes.iter().map(|s| s.height).max().unwrap_or(0),
    );

    let size = picture_sizes
        .iter()
        .copied()
        .filter(|s| s.covers(bound))
        .min_by(cmp_by_area)
        .ok_or(EngineError::NoPictureSize { bound })?;

    let selection = PictureSelection { size, bound };
    if selection.needs_crop() {
        tracing::warn!(
            picture = %size,
            bound = %bound,
            "Will need to crop picture into smallest bound size"
        );
    }
    Ok(Some(selection))
}

/// Preview fps range with the highest maximum, ties broken by highest minimum.
pub fn choose_fps_range(ranges: &[FpsRange]) -> Option<FpsRange> {
    ranges.iter().copied().fold(None, |best, range| match best {
        Some(b) if range.max < b.max || (range.max == b.max && range.min <= b.min) => Some(b),
        _ => Some(range),
    })
}

/// Negotiate a full configuration for `outputs` against the device's
/// capabilities. Nothing is applied; the caller commits the result.
pub fn negotiate(outputs: &[SurfaceRef], params: &CameraParameters) -> Result<OutputConfiguration> {
    let partitioned = partition_outputs(outputs)?;

    let intermediate_size = if partitioned.preview.is_empty() {
        tracing::debug!("No intermediate buffer selected, no preview outputs were configured");
        None
    } else {
        let output_sizes = surface_sizes(&partitioned.preview)?;
        let size = choose_intermediate_size(
            &params.supported_preview_sizes,
            &params.supported_picture_sizes,
            &output_sizes,
        )?;
        tracing::debug!(size = %size, "Intermediate buffer selected");
        Some(size)
    };

    let still_sizes = surface_sizes(&partitioned.still)?;
    let picture = choose_picture_size(&still_sizes, &params.supported_picture_sizes)?;

    Ok(OutputConfiguration {
        preview_outputs: partitioned.preview,
        still_outputs: partitioned.still,
        intermediate_size,
        picture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SurfaceError;
    use crate::surface::{Surface, SurfaceFormat};
    use std::sync::Arc;

    #[derive(Debug)]
    struct FakeSurface {
        id: u64,
        format: SurfaceFormat,
        size: Size,
    }

    impl Surface for FakeSurface {
        fn id(&self) -> u64 {
            self.id
        }
        fn format(&self) -> std::result::Result<SurfaceFormat, SurfaceError> {
            Ok(self.format)
        }
        fn size(&self) -> std::result::Result<Size, SurfaceError> {
            Ok(self.size)
        }
        fn produce_frame(&self, _data: &[u8]) -> std::result::Result<(), SurfaceError> {
            Ok(())
        }
    }

    fn surface(id: u64, format: SurfaceFormat, w: u32, h: u32) -> SurfaceRef {
        Arc::new(FakeSurface {
            id,
            format,
            size: Size::new(w, h),
        })
    }

    const YUV: SurfaceFormat = SurfaceFormat::Other(0x23);

    fn sizes(list: &[(u32, u32)]) -> Vec<Size> {
        list.iter().map(|&(w, h)| Size::new(w, h)).collect()
    }

    // ========== Intermediate buffer ==========

    #[test]
    fn intermediate_matches_requested_when_aspect_fits() {
        let preview = sizes(&[(640, 480), (1280, 720), (1920, 1080)]);
        let pictures = sizes(&[(1920, 1080)]);
        let chosen =
            choose_intermediate_size(&preview, &pictures, &[Size::new(1280, 720)]).unwrap();
        assert_eq!(chosen, Size::new(1280, 720));
    }

    #[test]
    fn intermediate_skips_wrong_aspect_ratio() {
        // 640x480 is large enough for a 320x240 output but is 4:3
        let preview = sizes(&[(640, 480), (1280, 720), (1920, 1080)]);
        let pictures = sizes(&[(3840, 2160)]);
        let chosen =
            choose_intermediate_size(&preview, &pictures, &[Size::new(320, 240)]).unwrap();
        assert_eq!(chosen, Size::new(1280, 720));
    }

    #[test]
    fn intermediate_covers_largest_output() {
        let preview = sizes(&[(640, 360), (1280, 720), (1920, 1080)]);
        let pictures = sizes(&[(1920, 1080)]);
        let outputs = sizes(&[(320, 180), (1000, 600)]);
        let chosen = choose_intermediate_size(&preview, &pictures, &outputs).unwrap();
        assert_eq!(chosen, Size::new(1280, 720));
    }

    #[test]
    fn intermediate_falls_back_to_largest_preview() {
        let preview = sizes(&[(640, 480), (800, 600)]);
        let pictures = sizes(&[(1920, 1080)]);
        let chosen =
            choose_intermediate_size(&preview, &pictures, &[Size::new(1280, 720)]).unwrap();
        assert_eq!(chosen, Size::new(800, 600));
    }

    #[test]
    fn intermediate_requires_supported_sizes() {
        assert!(matches!(
            choose_intermediate_size(&[], &sizes(&[(640, 480)]), &[Size::new(1, 1)]),
            Err(EngineError::NoSupportedSizes("preview"))
        ));
        assert!(matches!(
            choose_intermediate_size(&sizes(&[(640, 480)]), &[], &[Size::new(1, 1)]),
            Err(EngineError::NoSupportedSizes("picture"))
        ));
    }

    // ========== Picture size ==========

    #[test]
    fn picture_size_is_smallest_covering_size() {
        let pictures = sizes(&[(640, 480), (1280, 960), (1920, 1440)]);
        let selection = choose_picture_size(&[Size::new(1000, 800)], &pictures)
            .unwrap()
            .unwrap();
        assert_eq!(selection.size, Size::new(1280, 960));
        assert!(selection.needs_crop());
    }

    #[test]
    fn picture_size_uses_bounding_rectangle() {
        // Neither output alone needs 1920x1440, their bound 1300x1000 does.
        let pictures = sizes(&[(640, 480), (1280, 960), (1920, 1440)]);
        let outputs = sizes(&[(1300, 500), (600, 1000)]);
        let selection = choose_picture_size(&outputs, &pictures).unwrap().unwrap();
        assert_eq!(selection.bound, Size::new(1300, 1000));
        assert_eq!(selection.size, Size::new(1920, 1440));
    }

    #[test]
    fn exact_picture_size_needs_no_crop() {
        let pictures = sizes(&[(640, 480), (1280, 960)]);
        let selection = choose_picture_size(&[Size::new(640, 480)], &pictures)
            .unwrap()
            .unwrap();
        assert!(!selection.needs_crop());
    }

    #[test]
    fn picture_size_too_large_is_an_error() {
        let pictures = sizes(&[(640, 480), (1280, 960)]);
        let err = choose_picture_size(&[Size::new(4000, 3000)], &pictures).unwrap_err();
        assert!(matches!(
            err,
            EngineError::NoPictureSize { bound } if bound == Size::new(4000, 3000)
        ));
    }

    #[test]
    fn no_still_outputs_means_no_picture_size() {
        assert_eq!(choose_picture_size(&[], &sizes(&[(640, 480)])).unwrap(), None);
    }

    // ========== Frame rate ==========

    #[test]
    fn fps_range_prefers_highest_max_then_min() {
        let ranges = [
            FpsRange::new(15000, 15000),
            FpsRange::new(7000, 30000),
            FpsRange::new(24000, 30000),
            FpsRange::new(30000, 24000),
        ];
        assert_eq!(choose_fps_range(&ranges), Some(FpsRange::new(24000, 30000)));
        assert_eq!(choose_fps_range(&[]), None);
    }

    #[test]
    fn fps_range_keeps_first_of_identical_ranges() {
        let ranges = [FpsRange::new(10000, 30000), FpsRange::new(10000, 30000)];
        assert_eq!(choose_fps_range(&ranges), Some(FpsRange::new(10000, 30000)));
    }

    // ========== Full negotiation ==========

    #[test]
    fn negotiate_partitions_and_sizes() {
        let params = CameraParameters {
            supported_preview_sizes: sizes(&[(640, 480), (1280, 720), (1920, 1080)]),
            supported_picture_sizes: sizes(&[(1280, 720), (1920, 1080)]),
            ..CameraParameters::default()
        };
        let outputs = vec![
            surface(1, YUV, 1280, 720),
            surface(2, SurfaceFormat::Jpeg, 1920, 1080),
            surface(3, YUV, 640, 360),
        ];

        let config = negotiate(&outputs, &params).unwrap();

        assert_eq!(
            config.preview_outputs.iter().map(|s| s.id()).collect::<Vec<_>>(),
            vec![1, 3]
        );
        assert_eq!(config.still_outputs.len(), 1);
        assert_eq!(config.intermediate_size, Some(Size::new(1280, 720)));
        assert_eq!(config.picture.unwrap().size, Size::new(1920, 1080));
    }

    #[test]
    fn negotiate_still_only_has_no_intermediate_buffer() {
        let params = CameraParameters {
            supported_preview_sizes: sizes(&[(640, 480)]),
            supported_picture_sizes: sizes(&[(640, 480), (1280, 960)]),
            ..CameraParameters::default()
        };
        let outputs = vec![surface(1, SurfaceFormat::Jpeg, 1000, 800)];

        let config = negotiate(&outputs, &params).unwrap();
        assert!(config.preview_outputs.is_empty());
        assert_eq!(config.intermediate_size, None);
        assert_eq!(config.picture.unwrap().size, Size::new(1280, 960));
    }

    #[test]
    fn negotiate_empty_outputs_is_unconfigured() {
        let config = negotiate(&[], &CameraParameters::default()).unwrap();
        assert!(config.is_empty());
        assert_eq!(config.intermediate_size, None);
        assert!(config.picture.is_none());
    }
}
