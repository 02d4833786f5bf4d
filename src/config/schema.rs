//! YAML schema definitions for distillation loss configuration

use crate::distill::PadEdge;
use serde::{Deserialize, Serialize};

/// Complete distillation loss specification
///
/// One file may declare several losses, e.g. one per feature pyramid level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistillSpec {
    /// Loss modules to instantiate, in order
    pub losses: Vec<LossSpec>,
}

/// A single loss entry, dispatched on `type` through the loss registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LossSpec {
    /// Registry key, e.g. `ChannelWiseDivergence`
    #[serde(rename = "type", default = "default_type")]
    pub type_name: String,

    /// Instance name inside the distillation config (e.g. `loss_fpn_0`)
    #[serde(default)]
    pub name: String,

    /// Channels of the student feature map
    pub student_channels: usize,

    /// Channels of the teacher feature map
    pub teacher_channels: usize,

    /// Softmax temperature
    #[serde(default = "default_tau")]
    pub tau: f32,

    /// Multiplier applied to the normalized loss
    #[serde(default = "default_weight")]
    pub weight: f32,

    /// Edge that receives the pad cell when downsampling odd dimensions
    #[serde(default)]
    pub pad_edge: PadEdge,

    /// Seed for projection initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl LossSpec {
    /// Channel-wise divergence entry with default temperature and weight
    pub fn channel_wise(student_channels: usize, teacher_channels: usize) -> Self {
        Self {
            type_name: default_type(),
            name: String::new(),
            student_channels,
            teacher_channels,
            tau: default_tau(),
            weight: default_weight(),
            pad_edge: PadEdge::default(),
            seed: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_tau(mut self, tau: f32) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_weight(mut self, weight: f32) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_pad_edge(mut self, pad_edge: PadEdge) -> Self {
        self.pad_edge = pad_edge;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

fn default_type() -> String {
    "ChannelWiseDivergence".to_string()
}

fn default_tau() -> f32 {
    1.0
}

fn default_weight() -> f32 {
    1.0
}
