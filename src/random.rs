use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Mutex;

/// Source of randomness for synthesized book metadata.
///
/// Production uses an OS-seeded generator; tests plug in a fixed seed or a
/// scripted sequence so prices and formats can be asserted exactly.
pub trait RandomSource: Send + Sync {
    /// Uniform value in `[0, 1)`.
    fn unit(&self) -> f64;

    /// Uniform integer in `[low, high)`. Returns `low` for an empty range.
    fn below(&self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let span = f64::from(high - low);
        low + ((self.unit() * span).floor() as u32).min(high - low - 1)
    }

    /// Uniform index into a slice of `len` items.
    fn index(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        ((self.unit() * len as f64).floor() as usize).min(len - 1)
    }
}

pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn unit(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random::<f64>()
    }
}

/// Cycles through a fixed list of values. Handy for pinning exact outcomes.
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: Mutex<usize>,
}

impl ScriptedRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            cursor: Mutex::new(0),
        }
    }

    pub fn constant(value: f64) -> Self {
        Self::new(vec![value])
    }
}

impl RandomSource for ScriptedRandom {
    fn unit(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let value = self.values[*cursor % self.values.len()];
        *cursor += 1;
        value.clamp(0.0, 0.999_999)
    }
}
