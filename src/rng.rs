/// Source of randomness for maze carving and fog partitioning.
///
/// Generation only ever asks for `next_f32`; the helpers are derived from it so
/// a scripted source in tests can fix every shuffle and group size.
pub trait RandomSource {
    fn next_f32(&mut self) -> f32;

    fn int(&mut self, min: i32, max: i32) -> i32 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1) as f32;
        let value = min + (self.next_f32() * span).floor() as i32;
        value.min(max)
    }

    fn pick_index(&mut self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        (self.next_f32() * len as f32).floor().min((len - 1) as f32) as usize
    }

    /// Fisher-Yates, uniform over permutations.
    fn shuffle<T>(&mut self, items: &mut [T])
    where
        Self: Sized,
    {
        for idx in (1..items.len()).rev() {
            let swap_with = self.pick_index(idx + 1);
            items.swap(idx, swap_with);
        }
    }
}

#[derive(Clone, Debug)]
pub struct Rng {
    seed: u32,
}

impl Rng {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    pub fn from_entropy() -> Self {
        Self::new(rand::random::<u32>())
    }

    pub fn seed(&self) -> u32 {
        self.seed
    }
}

impl RandomSource for Rng {
    fn next_f32(&mut self) -> f32 {
        self.seed = self.seed.wrapping_add(0x6d2b79f5);
        let mut t = self.seed;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        let out = t ^ (t >> 14);
        (out as f64 / 4_294_967_296.0) as f32
    }
}

/// Replays a fixed sequence of values, cycling when exhausted.
#[derive(Clone, Debug)]
pub struct ScriptedSource {
    values: Vec<f32>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values, cursor: 0 }
    }
}

impl RandomSource for ScriptedSource {
    fn next_f32(&mut self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value.clamp(0.0, 0.999_999)
    }
}
