//! Execution context for forward passes

use rand::rngs::StdRng;
use rand::SeedableRng;

/// Forward-pass state: training flag and the RNG used by dropout
pub struct Context {
    training: bool,
    rng: StdRng,
}

impl Context {
    /// Create a context in training mode with a seeded RNG
    pub fn new(seed: u64) -> Self {
        Self { training: true, rng: StdRng::seed_from_u64(seed) }
    }

    /// Set training mode
    pub fn train(&mut self) {
        self.training = true;
    }

    /// Set evaluation mode
    pub fn eval(&mut self) {
        self.training = false;
    }

    /// Check if in training mode
    pub fn is_training(&self) -> bool {
        self.training
    }

    /// RNG shared by all stochastic layers
    pub fn rng_mut(&mut self) -> &mut StdRng {
        &mut self.rng
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_modes() {
        let mut ctx = Context::default();
        assert!(ctx.is_training());
        ctx.eval();
        assert!(!ctx.is_training());
        ctx.train();
        assert!(ctx.is_training());
    }
}
