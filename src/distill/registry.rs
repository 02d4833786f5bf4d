//! Loss registry: build distillation losses from configuration keys

use super::ChannelWiseDivergence;
use crate::autograd::Tensor;
use crate::config::{DistillSpec, LossSpec};
use crate::error::{Error, Result};
use std::collections::HashMap;

/// A feature-map distillation loss with learnable state
///
/// Optimizers reach the learnable tensors through [`parameters_mut`]
/// rather than through any implicit registration.
///
/// [`parameters_mut`]: DistillLoss::parameters_mut
pub trait DistillLoss {
    /// Registry key of the loss kind
    fn type_name(&self) -> &'static str;

    /// Instance name from the configuration
    fn name(&self) -> &str;

    /// Compute a `[1]` loss tensor
    fn forward(&self, student: &Tensor, teacher: &Tensor) -> Result<Tensor>;

    /// Learnable tensors owned by the loss
    fn parameters(&self) -> &[Tensor];

    /// Mutable learnable tensors, for optimizer steps
    fn parameters_mut(&mut self) -> &mut [Tensor];
}

/// Constructor stored in the registry
pub type LossBuilder = fn(&LossSpec) -> Result<Box<dyn DistillLoss>>;

/// Maps configuration keys to loss constructors
///
/// # Example
///
/// ```
/// use destila::config::LossSpec;
/// use destila::distill::LossRegistry;
///
/// let registry = LossRegistry::with_builtins();
/// let loss = registry.build(&LossSpec::channel_wise(8, 4).with_name("fpn_0"))?;
/// assert_eq!(loss.type_name(), "ChannelWiseDivergence");
/// assert_eq!(loss.parameters().len(), 2);
/// # Ok::<(), destila::Error>(())
/// ```
pub struct LossRegistry {
    builders: HashMap<String, LossBuilder>,
}

impl LossRegistry {
    /// Registry with no entries
    pub fn new() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    /// Registry with the losses shipped by this crate
    ///
    /// `ChannelWiseDivergence` is also reachable as `cwd`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ChannelWiseDivergence::TYPE_NAME, build_cwd);
        registry.register("cwd", build_cwd);
        registry
    }

    /// Register a constructor, returning the one it replaced
    pub fn register(&mut self, key: impl Into<String>, builder: LossBuilder) -> Option<LossBuilder> {
        self.builders.insert(key.into(), builder)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.builders.contains_key(key)
    }

    /// Registered keys in sorted order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.builders.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Instantiate one loss
    pub fn build(&self, spec: &LossSpec) -> Result<Box<dyn DistillLoss>> {
        let builder = self.builders.get(&spec.type_name).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unknown loss type '{}' (registered: {})",
                spec.type_name,
                self.keys().join(", ")
            ))
        })?;
        builder(spec)
    }

    /// Instantiate every loss of a config, in order
    pub fn build_all(&self, spec: &DistillSpec) -> Result<Vec<Box<dyn DistillLoss>>> {
        spec.losses.iter().map(|loss| self.build(loss)).collect()
    }
}

impl Default for LossRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

fn build_cwd(spec: &LossSpec) -> Result<Box<dyn DistillLoss>> {
    Ok(Box::new(ChannelWiseDivergence::from_spec(spec)?))
}
