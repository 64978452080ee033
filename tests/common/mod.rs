//! Synthetic body-measurement data shaped like the classic body fat survey:
//! imperial weight and height, circumferences in cm, and two responses.

use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::path::Path;

pub const HEADER: [&str; 15] = [
    "Density", "BodyFat", "Age", "Weight", "Height", "Neck", "Chest", "Abdomen", "Hip", "Thigh",
    "Knee", "Ankle", "Biceps", "Forearm", "Wrist",
];

fn noise(rng: &mut StdRng, sd: f64) -> f64 {
    Normal::new(0.0, sd).unwrap().sample(rng)
}

/// `n_rows` rows in `HEADER` order.
pub fn body_measurements(n_rows: usize, seed: u64) -> Vec<[f64; 15]> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n_rows)
        .map(|_| {
            let age = 45.0 + noise(&mut rng, 12.0);
            let hcm = 178.0 + noise(&mut rng, 7.0);
            let abdomen = 92.0 + noise(&mut rng, 10.0);
            let wkg = 0.9 * abdomen - 3.0 + 0.3 * (hcm - 178.0) + noise(&mut rng, 5.0);
            let chest = 0.6 * abdomen + 45.0 + noise(&mut rng, 3.0);
            let hip = 0.5 * wkg + 60.0 + noise(&mut rng, 3.0);
            let thigh = 0.35 * hip + 24.0 + noise(&mut rng, 2.0);
            let knee = 0.1 * hcm + 20.6 + 0.05 * wkg + noise(&mut rng, 1.0);
            let ankle = 0.06 * wkg + 18.0 + noise(&mut rng, 1.0);
            let neck = 0.1 * wkg + 30.0 + noise(&mut rng, 1.0);
            let biceps = 0.15 * wkg + 20.0 + noise(&mut rng, 1.5);
            let forearm = 0.05 * wkg + 24.5 + noise(&mut rng, 1.0);
            let wrist = 0.03 * wkg + 15.8 + noise(&mut rng, 0.5);
            let body_fat =
                0.9 * abdomen - 0.3 * wkg - 0.1 * (hcm - 178.0) - 40.0 + noise(&mut rng, 4.0);
            let density = 495.0 / (body_fat + 450.0) + noise(&mut rng, 0.0005);
            [
                density,
                body_fat,
                age,
                wkg / 0.45359237,
                hcm / 2.54,
                neck,
                chest,
                abdomen,
                hip,
                thigh,
                knee,
                ankle,
                biceps,
                forearm,
                wrist,
            ]
        })
        .collect()
}

/// Writes a 252-row comma-separated file like the survey's.
pub fn write_body_csv(path: &Path, seed: u64) {
    let mut writer = csv::Writer::from_path(path).unwrap();
    writer.write_record(HEADER).unwrap();
    for row in body_measurements(252, seed) {
        writer
            .write_record(row.iter().map(|v| format!("{v:.6}")))
            .unwrap();
    }
    writer.flush().unwrap();
}
