//! Stochastic Gradient Descent optimizer

use super::Optimizer;
use crate::Tensor;
use ndarray::Array1;

/// SGD optimizer with optional momentum and L2 weight decay
///
/// ```text
/// g = grad + weight_decay * param
/// v = momentum * v + g
/// param -= lr * v
/// ```
#[derive(Debug, Clone)]
pub struct SGD {
    lr: f32,
    momentum: f32,
    weight_decay: f32,
    velocities: Vec<Option<Array1<f32>>>,
}

impl SGD {
    /// Create a new SGD optimizer
    pub fn new(lr: f32, momentum: f32) -> Self {
        Self {
            lr,
            momentum,
            weight_decay: 0.0,
            velocities: Vec::new(),
        }
    }

    /// Add L2 weight decay
    pub fn with_weight_decay(mut self, weight_decay: f32) -> Self {
        self.weight_decay = weight_decay;
        self
    }

    fn ensure_velocities(&mut self, params: &[Tensor]) {
        if self.velocities.len() != params.len() {
            self.velocities = params.iter().map(|_| None).collect();
        }
    }
}

impl Optimizer for SGD {
    fn step(&mut self, params: &mut [Tensor]) {
        self.ensure_velocities(params);

        for (param, velocity) in params.iter_mut().zip(self.velocities.iter_mut()) {
            let Some(mut grad) = param.grad() else {
                continue;
            };
            if self.weight_decay != 0.0 {
                grad = grad + param.data() * self.weight_decay;
            }

            let update = if self.momentum > 0.0 {
                let v = match velocity.take() {
                    Some(v) => v * self.momentum + &grad,
                    None => grad,
                };
                *velocity = Some(v.clone());
                v
            } else {
                grad
            };

            *param.data_mut() -= &(update * self.lr);
        }
    }

    fn lr(&self) -> f32 {
        self.lr
    }

    fn set_lr(&mut self, lr: f32) {
        self.lr = lr;
    }
}
