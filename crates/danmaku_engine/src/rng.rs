use danmaku_core::RandomSource;
use rand::Rng;

/// Randomness backed by the thread-local generator.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn index(&mut self, len: usize) -> usize {
        rand::thread_rng().gen_range(0..len.max(1))
    }

    fn unit(&mut self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}
