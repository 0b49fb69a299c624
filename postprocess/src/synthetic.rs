//! Synthetic search engine and test-field generation.
//!
//! Provides an in-memory [`SearchEngine`] backed by a fixed list of objects,
//! plus generators for Gaussian point-source stamps and a seeded field of
//! mixed candidates: real movers (with near-duplicate copies the search
//! would also report), movers with a transient spike, streaks that are not
//! point-like, and a noise tail below the likelihood floor.

use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::curve::CurvePair;
use crate::engine::{EngineError, ImageParams, SearchEngine, Stamp, Trajectory};

/// Square stamp with a Gaussian PSF centered at (`center_row`, `center_col`).
pub fn gaussian_stamp(
    half_width: usize,
    center_row: f64,
    center_col: f64,
    amplitude: f64,
    sigma: f64,
    background: f64,
) -> Stamp {
    let side = 2 * half_width + 1;
    let two_sigma2 = 2.0 * sigma * sigma;
    Array2::from_shape_fn((side, side), |(r, c)| {
        let dr = r as f64 - center_row;
        let dc = c as f64 - center_col;
        background + amplitude * (-(dr * dr + dc * dc) / two_sigma2).exp()
    })
}

/// One candidate known to the synthetic engine.
#[derive(Debug, Clone)]
pub struct SyntheticObject {
    pub trajectory: Trajectory,
    pub curve: CurvePair,
    pub stamps: Vec<Stamp>,
}

/// In-memory search engine over a fixed candidate list.
pub struct SyntheticEngine {
    objects: Vec<SyntheticObject>,
    half_width: usize,
}

impl SyntheticEngine {
    /// Rank `objects` by descending likelihood. Stamps must be
    /// `2 * half_width + 1` pixels square.
    pub fn new(mut objects: Vec<SyntheticObject>, half_width: usize) -> Self {
        objects.sort_by(|a, b| b.trajectory.lh.total_cmp(&a.trajectory.lh));
        Self {
            objects,
            half_width,
        }
    }

    /// Objects in rank order.
    pub fn objects(&self) -> &[SyntheticObject] {
        &self.objects
    }

    fn find(&self, trajectory: &Trajectory) -> Result<&SyntheticObject, EngineError> {
        self.objects
            .iter()
            .find(|o| o.trajectory == *trajectory)
            .ok_or_else(|| EngineError::MissingData(format!("{trajectory:?}")))
    }
}

impl SearchEngine for SyntheticEngine {
    fn fetch_ranked(&self, start_rank: usize, count: usize) -> Result<Vec<Trajectory>, EngineError> {
        let start = start_rank.min(self.objects.len());
        let end = start_rank.saturating_add(count).min(self.objects.len());
        Ok(self.objects[start..end]
            .iter()
            .map(|o| o.trajectory)
            .collect())
    }

    fn curve_pair_for(&self, trajectory: &Trajectory) -> Result<CurvePair, EngineError> {
        Ok(self.find(trajectory)?.curve.clone())
    }

    fn stamps_for(&self, trajectory: &Trajectory, half_width: usize) -> Result<Vec<Stamp>, EngineError> {
        if half_width != self.half_width {
            return Err(EngineError::Backend(format!(
                "stamps were rendered with half width {}, {half_width} requested",
                self.half_width
            )));
        }
        Ok(self.find(trajectory)?.stamps.clone())
    }
}

/// Composition of a generated field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub seed: u64,
    /// Distinct real movers
    pub movers: usize,
    /// Extra near-identical detections reported for each mover
    pub duplicates: usize,
    /// Movers whose curve carries one bright transient
    pub spiky_movers: usize,
    /// Bright candidates whose stamp is an elongated streak
    pub streaks: usize,
    /// Faint candidates below the likelihood floor
    pub noise: usize,
    pub epochs: usize,
    pub width: usize,
    pub height: usize,
    pub stamp_half_width: usize,
}

impl Default for FieldSpec {
    fn default() -> Self {
        Self {
            seed: 42,
            movers: 5,
            duplicates: 2,
            spiky_movers: 2,
            streaks: 3,
            noise: 20,
            epochs: 20,
            width: 2048,
            height: 2048,
            stamp_half_width: 10,
        }
    }
}

/// Generated engine together with the metadata of its image stack.
pub struct SyntheticField {
    pub engine: SyntheticEngine,
    pub params: ImageParams,
}

struct FieldGenerator {
    rng: ChaCha8Rng,
    spec: FieldSpec,
    noise: Normal<f64>,
}

impl FieldGenerator {
    fn random_trajectory(&mut self) -> Trajectory {
        let margin = 50.0;
        let x = self.rng.random_range(margin..self.spec.width as f64 - margin);
        let y = self.rng.random_range(margin..self.spec.height as f64 - margin);
        let speed = self.rng.random_range(1.0..9.0);
        let angle: f64 = self.rng.random_range(-0.8..0.8);
        Trajectory::new(x, y, speed * angle.cos(), speed * angle.sin(), 0.0)
    }

    fn curve(&mut self, flux: f64) -> CurvePair {
        let epochs = self.spec.epochs;
        let phi: Vec<f64> = (0..epochs).map(|_| self.rng.random_range(0.8..1.2)).collect();
        let psi = phi
            .iter()
            .map(|p| p * (flux + 0.3 * self.noise.sample(&mut self.rng)))
            .collect();
        CurvePair::new(psi, phi)
    }

    fn point_stamps(&mut self, amplitude: f64) -> Vec<Stamp> {
        let h = self.spec.stamp_half_width;
        let center = h as f64;
        (0..self.spec.epochs)
            .map(|_| {
                let mut stamp = gaussian_stamp(h, center, center, amplitude, 1.4, 0.0);
                stamp.mapv_inplace(|v| v + 0.05 * self.noise.sample(&mut self.rng));
                stamp
            })
            .collect()
    }

    fn streak_stamps(&mut self, amplitude: f64) -> Vec<Stamp> {
        let h = self.spec.stamp_half_width;
        let side = 2 * h + 1;
        (0..self.spec.epochs)
            .map(|_| {
                let mut stamp = Array2::zeros((side, side));
                for c in 0..side {
                    stamp += &gaussian_stamp(h, c as f64, c as f64, amplitude, 1.0, 0.0);
                }
                stamp
            })
            .collect()
    }

    fn object(&self, trajectory: Trajectory, curve: CurvePair, stamps: Vec<Stamp>) -> SyntheticObject {
        let lh = curve.likelihood();
        SyntheticObject {
            trajectory: Trajectory {
                lh,
                flux: lh / self.spec.epochs as f64,
                obs_count: self.spec.epochs,
                ..trajectory
            },
            curve,
            stamps,
        }
    }
}

/// Generate a seeded field of candidates described by `spec`.
pub fn synthetic_field(spec: FieldSpec) -> SyntheticField {
    let mut generator = FieldGenerator {
        rng: ChaCha8Rng::seed_from_u64(spec.seed),
        spec: spec.clone(),
        noise: Normal::new(0.0, 1.0).expect("unit normal is valid"),
    };
    let mut objects = Vec::new();

    for _ in 0..spec.movers {
        let base = generator.random_trajectory();
        let flux = generator.rng.random_range(4.0..8.0);
        for copy in 0..=spec.duplicates {
            // Duplicates differ by a fraction of a pixel and a small velocity step
            let offset = copy as f64 * 0.5;
            let trajectory = Trajectory {
                x: base.x + offset,
                y: base.y - offset,
                x_v: base.x_v * (1.0 + 0.002 * copy as f64),
                ..base
            };
            let curve = generator.curve(flux);
            let stamps = generator.point_stamps(flux * 3.0);
            objects.push(generator.object(trajectory, curve, stamps));
        }
    }

    for _ in 0..spec.spiky_movers {
        let trajectory = generator.random_trajectory();
        let flux = generator.rng.random_range(4.0..8.0);
        let mut curve = generator.curve(flux);
        let spike = generator.rng.random_range(0..spec.epochs);
        curve.psi[spike] += 40.0 * flux;
        let stamps = generator.point_stamps(flux * 3.0);
        objects.push(generator.object(trajectory, curve, stamps));
    }

    for _ in 0..spec.streaks {
        let trajectory = generator.random_trajectory();
        let flux = generator.rng.random_range(4.0..8.0);
        let curve = generator.curve(flux);
        let stamps = generator.streak_stamps(flux);
        objects.push(generator.object(trajectory, curve, stamps));
    }

    for _ in 0..spec.noise {
        let trajectory = generator.random_trajectory();
        let curve = generator.curve(0.2);
        let stamps = generator.point_stamps(0.5);
        objects.push(generator.object(trajectory, curve, stamps));
    }

    let params = ImageParams {
        times: (0..spec.epochs).map(|i| 57130.2 + 0.02 * i as f64).collect(),
        width: spec.width,
        height: spec.height,
        vel_lims: (0.0, 10.0),
        ang_lims: (-1.0, 1.0),
    };

    SyntheticField {
        engine: SyntheticEngine::new(objects, spec.stamp_half_width),
        params,
    }
}
