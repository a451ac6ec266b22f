// src/simulation.rs - Deterministic offline stand-in for the analysis pipeline

use std::path::Path;
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::classifier::{Classification, SeverityStage};

/// Stage draw weights, heavily favoring a healthy result
pub const STAGE_WEIGHTS: [u32; 5] = [50, 20, 15, 10, 5];

pub const SIMULATION_DETAIL: &str = "Simulated result: no image analysis was performed.";

/// Simulated grade seeded only by the length of the file name, so the same
/// name length always gives the same stage and confidence.
pub fn simulate_diagnosis(image_path: &Path) -> Classification {
    let name_len = image_path
        .file_name()
        .map(|name| name.to_string_lossy().chars().count())
        .unwrap_or(0);

    simulate_for_seed(name_len as u64)
}

pub fn simulate_for_seed(seed: u64) -> Classification {
    let mut rng = StdRng::seed_from_u64(seed);

    let stage = match WeightedIndex::new(STAGE_WEIGHTS) {
        Ok(weights) => SeverityStage::ALL[weights.sample(&mut rng)],
        Err(_) => SeverityStage::NoDR,
    };
    let confidence = rng.gen_range(0.85..=0.99);

    Classification {
        stage,
        confidence,
        detail: SIMULATION_DETAIL.to_string(),
    }
}
