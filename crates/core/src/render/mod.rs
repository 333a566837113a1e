use serde::{Deserialize, Serialize};

/// Size of the drawing area the bars are laid out in.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Region {
    pub width: f32,
    pub height: f32,
}

impl Region {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn usable(self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

/// Rectangle for one spectrum bin, in region coordinates with the origin at
/// the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BarGeometry {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Stateless layout of a spectrum as bottom-anchored bars.
///
/// The bin count is fixed at construction and every call returns exactly
/// that many bars, whatever the sample length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpectrumRenderer {
    bin_count: usize,
}

impl SpectrumRenderer {
    pub fn new(bin_count: usize) -> Self {
        Self { bin_count }
    }

    pub fn bin_count(&self) -> usize {
        self.bin_count
    }

    /// Lays out one bar per bin. Missing samples give empty bars, extra
    /// samples are ignored and values are clamped to `[0, 1]` (NaN reads
    /// as 0). A region without positive, finite extent yields zero-sized
    /// bars.
    pub fn compute_bars(&self, region: Region, samples: &[f32]) -> Vec<BarGeometry> {
        if !region.usable() || self.bin_count == 0 {
            return vec![BarGeometry::default(); self.bin_count];
        }

        let bar_width = region.width / self.bin_count as f32;
        (0..self.bin_count)
            .map(|i| {
                let level = samples.get(i).copied().map(unit_level).unwrap_or(0.0);
                let height = region.height * level;
                BarGeometry {
                    x: i as f32 * bar_width,
                    y: region.height - height,
                    width: bar_width,
                    height,
                }
            })
            .collect()
    }
}

fn unit_level(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lays_out_bottom_anchored_bars() {
        let renderer = SpectrumRenderer::new(4);
        let bars = renderer.compute_bars(Region::new(100.0, 50.0), &[0.0, 0.5, 1.0, 0.25]);

        assert_eq!(bars.len(), 4);
        assert_eq!(
            bars[1],
            BarGeometry {
                x: 25.0,
                y: 25.0,
                width: 25.0,
                height: 25.0
            }
        );
        assert_eq!(bars[2].y, 0.0);
        assert_eq!(bars[2].height, 50.0);
        assert_eq!(bars[0].y, 50.0);
        assert_eq!(bars[3].x, 75.0);
    }

    #[test]
    fn missing_samples_render_empty_and_extra_are_ignored() {
        let renderer = SpectrumRenderer::new(3);
        let short = renderer.compute_bars(Region::new(30.0, 10.0), &[1.0]);
        assert_eq!(short.len(), 3);
        assert_eq!(short[0].height, 10.0);
        assert_eq!(short[1].height, 0.0);
        assert_eq!(short[2].height, 0.0);

        let long = renderer.compute_bars(Region::new(30.0, 10.0), &[0.1; 10]);
        assert_eq!(long.len(), 3);
    }

    #[test]
    fn clamps_out_of_range_values() {
        let renderer = SpectrumRenderer::new(3);
        let bars = renderer.compute_bars(Region::new(3.0, 10.0), &[-1.0, 4.0, f32::NAN]);
        assert_eq!(bars[0].height, 0.0);
        assert_eq!(bars[1].height, 10.0);
        assert_eq!(bars[2].height, 0.0);
        assert!(bars.iter().all(|bar| bar.y + bar.height == 10.0));
    }

    #[test]
    fn degenerate_region_yields_zero_sized_bars() {
        let renderer = SpectrumRenderer::new(8);
        for region in [
            Region::new(0.0, 10.0),
            Region::new(10.0, 0.0),
            Region::new(-5.0, -5.0),
            Region::new(f32::INFINITY, 10.0),
        ] {
            let bars = renderer.compute_bars(region, &[1.0; 8]);
            assert_eq!(bars.len(), 8);
            assert!(bars.iter().all(|bar| bar.width == 0.0 && bar.height == 0.0));
        }
    }

    #[test]
    fn heights_are_bounded_and_track_samples() {
        let renderer = SpectrumRenderer::new(256);
        let samples: Vec<f32> = (0..256).map(|i| ((i * 37) % 101) as f32 / 100.0).collect();
        let region = Region::new(640.0, 120.0);
        let bars = renderer.compute_bars(region, &samples);

        assert_eq!(bars.len(), 256);
        for bar in &bars {
            assert!(bar.height >= 0.0 && bar.height <= region.height);
        }
        for i in 0..samples.len() {
            for j in 0..samples.len() {
                if samples[i] > samples[j] {
                    assert!(bars[i].height >= bars[j].height);
                }
            }
        }
    }
}
