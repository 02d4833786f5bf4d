//! Configuration validation

use super::schema::{DistillSpec, LossSpec};
use std::collections::HashSet;

/// Validation error type
#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("No losses configured")]
    NoLosses,

    #[error("Invalid student channels: {0} (must be > 0)")]
    InvalidStudentChannels(usize),

    #[error("Invalid teacher channels: {0} (must be > 0)")]
    InvalidTeacherChannels(usize),

    #[error("Invalid temperature: {0} (must be finite and > 0.0)")]
    InvalidTau(f32),

    #[error("Invalid loss weight: {0} (must be finite)")]
    InvalidWeight(f32),

    #[error("Duplicate loss name: {0}")]
    DuplicateName(String),
}

/// Validate a single loss entry
///
/// Checks channel counts, temperature and weight. The `type` key is
/// resolved later by the registry.
pub fn validate_loss(spec: &LossSpec) -> Result<(), ValidationError> {
    if spec.student_channels == 0 {
        return Err(ValidationError::InvalidStudentChannels(
            spec.student_channels,
        ));
    }

    if spec.teacher_channels == 0 {
        return Err(ValidationError::InvalidTeacherChannels(
            spec.teacher_channels,
        ));
    }

    if !(spec.tau.is_finite() && spec.tau > 0.0) {
        return Err(ValidationError::InvalidTau(spec.tau));
    }

    if !spec.weight.is_finite() {
        return Err(ValidationError::InvalidWeight(spec.weight));
    }

    Ok(())
}

/// Validate a full distillation specification
///
/// Every entry must pass [`validate_loss`] and non-empty names must be unique.
pub fn validate_config(spec: &DistillSpec) -> Result<(), ValidationError> {
    if spec.losses.is_empty() {
        return Err(ValidationError::NoLosses);
    }

    let mut seen = HashSet::new();
    for loss in &spec.losses {
        validate_loss(loss)?;
        if !loss.name.is_empty() && !seen.insert(loss.name.as_str()) {
            return Err(ValidationError::DuplicateName(loss.name.clone()));
        }
    }

    Ok(())
}
