/// Step decay learning rate: `base * gamma^(stepped / step_size)`, stepped once per epoch.
#[derive(Debug, Clone)]
pub struct StepScheduler {
    base_lr: f64,
    step_size: usize,
    gamma: f64,
    stepped: usize,
}

impl StepScheduler {
    pub fn new(base_lr: f64, step_size: usize, gamma: f64) -> Self {
        Self {
            base_lr,
            step_size: step_size.max(1),
            gamma,
            stepped: 0,
        }
    }

    /// Decays by `gamma` at the midpoint of the run and every `epochs / 2` epochs after.
    pub fn halfway(base_lr: f64, epochs: usize, gamma: f64) -> Self {
        Self::new(base_lr, epochs / 2, gamma)
    }

    /// Learning rate for the epoch currently being trained.
    pub fn lr(&self) -> f64 {
        self.lr_at(self.stepped)
    }

    pub fn lr_at(&self, stepped: usize) -> f64 {
        self.base_lr * self.gamma.powi((stepped / self.step_size) as i32)
    }

    pub fn step(&mut self) {
        self.stepped += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_until_midpoint_then_decays() {
        let epochs = 400;
        let mut scheduler = StepScheduler::halfway(1e-3, epochs, 0.1);

        let mut per_epoch = Vec::with_capacity(epochs);
        for _ in 1..=epochs {
            per_epoch.push(scheduler.lr());
            scheduler.step();
        }

        assert!(per_epoch[..epochs / 2].iter().all(|&lr| lr == 1e-3));
        assert!((per_epoch[epochs / 2] - 1e-4).abs() < 1e-12);
        assert!(per_epoch[epochs / 2..].iter().all(|&lr| (lr - 1e-4).abs() < 1e-12));
    }

    #[test]
    fn single_epoch_run_does_not_divide_by_zero() {
        let mut scheduler = StepScheduler::halfway(1e-3, 1, 0.1);
        assert_eq!(scheduler.lr(), 1e-3);
        scheduler.step();
        assert!((scheduler.lr() - 1e-4).abs() < 1e-12);
    }
}
