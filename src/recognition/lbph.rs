use super::{ClassificationResult, FaceClassifier, LabeledSample};
use image::GrayImage;
use tracing::{debug, info};

/// Number of distinct 8-neighbour LBP codes
const PATTERNS: usize = 256;

/// Local Binary Pattern Histogram recognizer.
///
/// Each face becomes a grid of per-cell LBP histograms; prediction is the nearest stored
/// sample under the symmetric chi-square distance.
pub struct LbphRecognizer {
    threshold: f64,
    grid_x: u32,
    grid_y: u32,
    labels: Vec<String>,
    histograms: Vec<(usize, Vec<f32>)>,
}

impl LbphRecognizer {
    pub fn new(threshold: f64, grid_x: u32, grid_y: u32) -> Self {
        Self {
            threshold,
            grid_x: grid_x.max(1),
            grid_y: grid_y.max(1),
            labels: Vec::new(),
            histograms: Vec::new(),
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Number of stored training histograms
    pub fn sample_count(&self) -> usize {
        self.histograms.len()
    }

    fn spatial_histogram(&self, face: &GrayImage) -> Vec<f32> {
        let grid_x = self.grid_x as usize;
        let grid_y = self.grid_y as usize;
        let mut hist = vec![0f32; grid_x * grid_y * PATTERNS];
        let mut counts = vec![0u32; grid_x * grid_y];

        let (width, height) = face.dimensions();
        if width < 3 || height < 3 {
            return hist;
        }

        let lbp_w = (width - 2) as usize;
        let lbp_h = (height - 2) as usize;

        for y in 0..lbp_h {
            let cell_y = y * grid_y / lbp_h;
            for x in 0..lbp_w {
                let cell_x = x * grid_x / lbp_w;
                let cell = cell_y * grid_x + cell_x;
                let code = lbp_code(face, x as u32 + 1, y as u32 + 1);
                hist[cell * PATTERNS + code as usize] += 1.0;
                counts[cell] += 1;
            }
        }

        for (cell, &count) in counts.iter().enumerate() {
            if count > 0 {
                let bins = &mut hist[cell * PATTERNS..(cell + 1) * PATTERNS];
                for bin in bins {
                    *bin /= count as f32;
                }
            }
        }

        hist
    }
}

impl FaceClassifier for LbphRecognizer {
    fn train(&mut self, samples: &[LabeledSample]) -> bool {
        if samples.is_empty() {
            return false;
        }

        let mut labels: Vec<String> = Vec::new();
        let mut histograms = Vec::with_capacity(samples.len());

        for sample in samples {
            let index = match labels.iter().position(|l| l == &sample.label) {
                Some(index) => index,
                None => {
                    labels.push(sample.label.clone());
                    labels.len() - 1
                }
            };
            histograms.push((index, self.spatial_histogram(&sample.image)));
        }

        info!(
            "Face recognizer trained with {} samples for {} people",
            histograms.len(),
            labels.len()
        );

        self.labels = labels;
        self.histograms = histograms;
        true
    }

    fn is_trained(&self) -> bool {
        !self.histograms.is_empty()
    }

    fn classify(&self, face: &GrayImage) -> ClassificationResult {
        let query = self.spatial_histogram(face);

        let nearest = self
            .histograms
            .iter()
            .map(|(label, hist)| (*label, chi_square(hist, &query)))
            .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));

        match nearest {
            Some((label, distance)) => {
                debug!(
                    "Nearest enrolled match {} at distance {:.2}",
                    self.labels[label], distance
                );
                ClassificationResult::from_match(self.labels[label].as_str(), distance, self.threshold)
            }
            None => ClassificationResult::unknown(f64::INFINITY),
        }
    }

    fn labels(&self) -> Vec<String> {
        self.labels.clone()
    }
}

/// 8-neighbour LBP code at (x, y), clockwise from the top-left neighbour
fn lbp_code(image: &GrayImage, x: u32, y: u32) -> u8 {
    const OFFSETS: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (1, 0),
        (1, 1),
        (0, 1),
        (-1, 1),
        (-1, 0),
    ];

    let center = image.get_pixel(x, y)[0];
    let mut code = 0u8;
    for (bit, (dx, dy)) in OFFSETS.iter().enumerate() {
        let nx = (x as i32 + dx) as u32;
        let ny = (y as i32 + dy) as u32;
        if image.get_pixel(nx, ny)[0] >= center {
            code |= 1 << bit;
        }
    }
    code
}

/// Symmetric chi-square distance: `2 * Σ (a - b)² / (a + b)`
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    let sum: f64 = a
        .iter()
        .zip(b)
        .filter(|(x, y)| **x + **y > 0.0)
        .map(|(&x, &y)| {
            let diff = (x - y) as f64;
            diff * diff / (x + y) as f64
        })
        .sum();
    2.0 * sum
}
