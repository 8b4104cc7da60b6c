//! 水下环境模拟 - green cast, turbidity and marine snow on RGB frames

use super::config::{SimulationConfig, Turbidity};
use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use rand::seq::SliceRandom;
use rand::Rng;
use rand_distr::StandardNormal;

const FOG: [f32; 3] = [0.0, 0.4, 0.0];
const CAST: [f32; 3] = [0.6, 1.1, 0.9];
const IMAGE_WEIGHT: f32 = 0.7;
const FOG_WEIGHT: f32 = 0.3;

/// Green colour cast plus a green fog overlay.
pub fn green_water(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        for c in 0..3 {
            let v = (px.0[c] as f32 / 255.0 * CAST[c]).clamp(0.0, 1.0);
            let blended = IMAGE_WEIGHT * v + FOG_WEIGHT * FOG[c];
            // 截断取整，与 8 位转换一致
            px.0[c] = (blended * 255.0) as u8;
        }
    }
    out
}

/// OpenCV's sigma for a given kernel size when sigma is left at 0.
pub fn kernel_sigma(kernel: u32) -> f32 {
    0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Blur then additive gaussian noise.
pub fn turbidity<R: Rng + ?Sized>(image: &RgbImage, level: Turbidity, rng: &mut R) -> RgbImage {
    let mut out = image::imageops::blur(image, kernel_sigma(level.kernel()));
    let std_dev = level.noise_factor() * 255.0;
    for px in out.pixels_mut() {
        for c in 0..3 {
            let n: f32 = rng.sample(StandardNormal);
            px.0[c] = (px.0[c] as f32 + n * std_dev).clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Bright grey specks of suspended particles.
pub fn marine_snow<R: Rng + ?Sized>(image: &RgbImage, particles: u32, rng: &mut R) -> RgbImage {
    let mut out = image.clone();
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return out;
    }

    for _ in 0..particles {
        let x = rng.gen_range(0..w) as i32;
        let y = rng.gen_range(0..h) as i32;
        let radius = rng.gen_range(1..=3);
        let b: u8 = rng.gen_range(180..=255);
        draw_filled_circle_mut(&mut out, (x, y), radius, Rgb([b, b, b]));
    }
    out
}

/// green water → turbidity → optional marine snow
pub fn full_simulation<R: Rng + ?Sized>(
    image: &RgbImage,
    config: &SimulationConfig,
    rng: &mut R,
) -> RgbImage {
    let mut out = green_water(image);
    out = turbidity(&out, config.turbidity, rng);
    if config.marine_snow {
        out = marine_snow(&out, config.particles, rng);
    }
    out
}

/// Random subset of the stages, used when building training data.
pub fn training_augmentation<R: Rng + ?Sized>(image: &RgbImage, rng: &mut R) -> RgbImage {
    let mut out = image.clone();
    if rng.gen_bool(0.5) {
        out = green_water(&out);
    }
    if rng.gen_bool(0.5) {
        let level = *Turbidity::ALL.choose(rng).unwrap_or(&Turbidity::Medium);
        out = turbidity(&out, level, rng);
    }
    if rng.gen_bool(0.5) {
        let particles = rng.gen_range(50..=300);
        out = marine_snow(&out, particles, rng);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 7 % 256) as u8, (y * 5 % 256) as u8, 200]))
    }

    #[test]
    fn test_green_water_values() {
        let img = RgbImage::from_pixel(2, 2, Rgb([255, 255, 255]));
        let out = green_water(&img);
        // r: 0.7*0.6 = 0.42, g: 0.7*1.0 + 0.12 = 0.82, b: 0.7*0.9 = 0.63
        assert_eq!(out.get_pixel(0, 0).0, [107, 209, 160]);

        let black = green_water(&RgbImage::new(1, 1));
        assert_eq!(black.get_pixel(0, 0).0, [0, 30, 0]);
    }

    #[test]
    fn test_kernel_sigma() {
        assert!((kernel_sigma(3) - 0.8).abs() < 1e-6);
        assert!((kernel_sigma(7) - 1.4).abs() < 1e-6);
        assert!((kernel_sigma(15) - 2.6).abs() < 1e-6);
    }

    #[test]
    fn test_simulation_keeps_dimensions() {
        let img = sample(64, 48);
        let mut rng = StdRng::seed_from_u64(7);
        for level in Turbidity::ALL {
            let config = SimulationConfig {
                enabled: true,
                turbidity: level,
                ..Default::default()
            };
            assert_eq!(full_simulation(&img, &config, &mut rng).dimensions(), (64, 48));
        }
        assert_eq!(training_augmentation(&img, &mut rng).dimensions(), (64, 48));
    }

    #[test]
    fn test_deterministic_under_seed() {
        let img = sample(32, 32);
        let config = SimulationConfig::default();

        let a = full_simulation(&img, &config, &mut StdRng::seed_from_u64(42));
        let b = full_simulation(&img, &config, &mut StdRng::seed_from_u64(42));
        let c = full_simulation(&img, &config, &mut StdRng::seed_from_u64(43));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_marine_snow_brightens() {
        let img = RgbImage::new(40, 40);
        let out = marine_snow(&img, 30, &mut StdRng::seed_from_u64(1));
        let bright = out.pixels().filter(|p| p.0[0] >= 180).count();
        assert!(bright >= 5);
        assert!(out.pixels().all(|p| p.0[0] == 0 || p.0[0] >= 180));
        assert!(out.pixels().all(|p| p.0[0] == p.0[1] && p.0[1] == p.0[2]));
    }

    #[test]
    fn test_marine_snow_on_empty_image() {
        let img = RgbImage::new(0, 0);
        let out = marine_snow(&img, 150, &mut StdRng::seed_from_u64(1));
        assert_eq!(out.dimensions(), (0, 0));
    }
}
