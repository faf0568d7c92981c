use glam::DVec2;

/// 多边形填充原语：给定窗口局部像素坐标下的若干闭合环，返回每个像素的覆盖率。
///
/// 返回值为行优先的 `width * height` 个 `[0, 1]` 浮点数，采用奇偶填充规则，不含描边。
pub trait CoverageRasterizer: Send + Sync {
    fn coverage(&self, rings: &[Vec<DVec2>], width: usize, height: usize) -> Vec<f32>;
}

/// 扫描线填充：每个像素行取若干条子扫描线，水平方向精确累计区间覆盖。
#[derive(Debug, Clone, Copy)]
pub struct ScanlineRasterizer {
    samples: usize,
}

impl ScanlineRasterizer {
    pub const DEFAULT_SAMPLES: usize = 16;

    pub fn new(samples: usize) -> Self {
        Self {
            samples: samples.max(1),
        }
    }

    #[inline]
    pub fn samples(&self) -> usize {
        self.samples
    }
}

impl Default for ScanlineRasterizer {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SAMPLES)
    }
}

#[derive(Debug, Clone, Copy)]
struct Edge {
    start: DVec2,
    end: DVec2,
}

impl Edge {
    /// 半开规则判断是否与水平线相交，避免顶点被重复计数。
    #[inline]
    fn crossing(&self, y: f64) -> Option<f64> {
        if (self.start.y <= y) == (self.end.y <= y) {
            return None;
        }
        let t = (y - self.start.y) / (self.end.y - self.start.y);
        Some(self.start.x + t * (self.end.x - self.start.x))
    }
}

impl CoverageRasterizer for ScanlineRasterizer {
    fn coverage(&self, rings: &[Vec<DVec2>], width: usize, height: usize) -> Vec<f32> {
        let mut coverage = vec![0.0f32; width * height];
        if width == 0 || height == 0 {
            return coverage;
        }

        // 按像素行分桶，每条子扫描线只检查可能相交的边。
        let mut buckets: Vec<Vec<Edge>> = vec![Vec::new(); height];
        for ring in rings.iter().filter(|ring| ring.len() >= 2) {
            let closing = std::iter::once((ring[ring.len() - 1], ring[0]));
            let edges = ring.windows(2).map(|pair| (pair[0], pair[1])).chain(closing);
            for (start, end) in edges {
                if start.y == end.y {
                    continue;
                }
                let low = start.y.min(end.y).floor().max(0.0);
                let high = start.y.max(end.y).ceil().min(height as f64);
                if high <= low {
                    continue;
                }
                for row in low as usize..high as usize {
                    buckets[row].push(Edge { start, end });
                }
            }
        }

        let weight = 1.0 / self.samples as f64;
        let mut crossings: Vec<f64> = Vec::new();
        for (py, bucket) in buckets.iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            let row = &mut coverage[py * width..(py + 1) * width];
            for sample in 0..self.samples {
                let y = py as f64 + (sample as f64 + 0.5) * weight;
                crossings.clear();
                crossings.extend(bucket.iter().filter_map(|edge| edge.crossing(y)));
                if crossings.len() < 2 {
                    continue;
                }
                crossings.sort_by(f64::total_cmp);
                for span in crossings.chunks_exact(2) {
                    accumulate_span(row, span[0], span[1], weight);
                }
            }
        }

        for value in &mut coverage {
            *value = value.clamp(0.0, 1.0);
        }
        coverage
    }
}

fn accumulate_span(row: &mut [f32], x0: f64, x1: f64, weight: f64) {
    let start = x0.max(0.0);
    let end = x1.min(row.len() as f64);
    if end <= start {
        return;
    }
    let first = start.floor() as usize;
    let last = (end.ceil() as usize).min(row.len());
    for (px, cell) in row.iter_mut().enumerate().take(last).skip(first) {
        let lo = start.max(px as f64);
        let hi = end.min(px as f64 + 1.0);
        if hi > lo {
            *cell += ((hi - lo) * weight) as f32;
        }
    }
}
