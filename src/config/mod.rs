//! Declarative YAML configuration
//!
//! Distillation losses are declared in YAML and instantiated by key through
//! [`crate::distill::LossRegistry`].
//!
//! # Example
//!
//! ```yaml
//! losses:
//!   - type: ChannelWiseDivergence
//!     name: loss_fpn_0
//!     student_channels: 128
//!     teacher_channels: 256
//!     tau: 1.0
//!     weight: 3.0
//! ```

mod cli;
mod load;
mod schema;
mod validate;

#[cfg(test)]
mod tests;

pub use cli::{apply_overrides, parse_args, Cli, Command, ProbeArgs, ValidateArgs};
pub use load::{load_config, parse_config, save_config};
pub use schema::{DistillSpec, LossSpec};
pub use validate::{validate_config, validate_loss, ValidationError};
