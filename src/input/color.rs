use rand::Rng;

use crate::constants::splat::COLOR_INTENSITY;

pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> [f32; 3] {
    let sector = (h * 6.0).floor();
    let f = h * 6.0 - sector;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);

    match (sector as i64).rem_euclid(6) {
        0 => [v, t, p],
        1 => [q, v, p],
        2 => [p, v, t],
        3 => [p, q, v],
        4 => [t, p, v],
        _ => [v, p, q],
    }
}

/// Random fully saturated hue, dimmed for a subtle backdrop.
pub fn generate_color<R: Rng + ?Sized>(rng: &mut R) -> [f32; 3] {
    let [r, g, b] = hsv_to_rgb(rng.gen::<f32>(), 1.0, 1.0);
    [r * COLOR_INTENSITY, g * COLOR_INTENSITY, b * COLOR_INTENSITY]
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_primary_hues() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), [1.0, 0.0, 0.0]);
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), [0.0, 1.0, 0.0]);
        assert_eq!(hsv_to_rgb(2.0 / 3.0, 1.0, 1.0), [0.0, 0.0, 1.0]);
        assert_eq!(hsv_to_rgb(0.5, 0.0, 0.25), [0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_generated_colors_are_dimmed() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let color = generate_color(&mut rng);
            let max = color.iter().cloned().fold(0.0, f32::max);
            assert!((max - COLOR_INTENSITY).abs() < 1e-6);
            assert!(color.iter().all(|c| *c >= 0.0));
        }
    }
}
