//! Channel-wise divergence loss

use super::pool::{self, PadEdge};
use super::registry::DistillLoss;
use crate::autograd::{self, softmax_2d, Tensor};
use crate::config::{validate_loss, LossSpec};
use crate::error::{Error, Result};
use ndarray::Array2;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Channel-wise divergence between student and teacher feature maps
///
/// Each (sample, channel) plane is turned into a probability distribution
/// over its spatial positions with a temperature-scaled softmax. The loss
/// is the cross-entropy of the student distribution against the teacher
/// distribution, summed over planes, rescaled by `tau²` and averaged over
/// teacher channels and batch.
///
/// # Formula
///
/// ```text
/// L = w * tau² / (N * C) * Σ_{n,c} Σ_p -softmax(T_nc / tau)_p * log_softmax(S_nc / tau)_p
/// ```
///
/// where `S` is the student map after 2x2 downsampling and (if the channel
/// counts differ) a learned 1x1 projection to the teacher's channel count.
///
/// # Example
///
/// ```
/// use destila::distill::ChannelWiseDivergence;
/// use destila::Tensor;
///
/// let loss_fn = ChannelWiseDivergence::new(4, 4, 1.0, 1.0)?;
/// let student = Tensor::from_shape_vec(&[1, 4, 8, 8], vec![0.5; 256], true)?;
/// let teacher = Tensor::from_shape_vec(&[1, 4, 4, 4], vec![0.1; 64], false)?;
///
/// let loss = loss_fn.forward(&student, &teacher)?;
/// assert!(loss.item() >= 0.0);
/// # Ok::<(), destila::Error>(())
/// ```
pub struct ChannelWiseDivergence {
    name: String,
    student_channels: usize,
    teacher_channels: usize,
    tau: f32,
    loss_weight: f32,
    pad_edge: PadEdge,
    /// `[weight, bias]` of the 1x1 projection; empty when channel counts match
    params: Vec<Tensor>,
}

/// Row-wise spatial distributions produced by [`ChannelWiseDivergence::soft_targets`]
#[derive(Debug, Clone)]
pub struct SoftTargets {
    /// `softmax(teacher / tau)`, one row per (sample, channel)
    pub teacher: Array2<f32>,
    /// `softmax(student / tau)` after downsampling and projection
    pub student: Array2<f32>,
}

impl ChannelWiseDivergence {
    /// Registry key
    pub const TYPE_NAME: &'static str = "ChannelWiseDivergence";

    /// Create a new channel-wise divergence loss
    ///
    /// # Arguments
    ///
    /// * `student_channels` - Channels in the student feature map
    /// * `teacher_channels` - Channels in the teacher feature map
    /// * `tau` - Softmax temperature (typically 1.0-4.0)
    /// * `loss_weight` - Multiplier applied to the normalized loss
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] for zero channel counts, a
    /// non-positive or non-finite `tau`, or a non-finite weight.
    pub fn new(
        student_channels: usize,
        teacher_channels: usize,
        tau: f32,
        loss_weight: f32,
    ) -> Result<Self> {
        Self::from_spec(
            &LossSpec::channel_wise(student_channels, teacher_channels)
                .with_tau(tau)
                .with_weight(loss_weight),
        )
    }

    /// Same as [`new`](Self::new) with a reproducible projection initialization
    pub fn with_seed(
        student_channels: usize,
        teacher_channels: usize,
        tau: f32,
        loss_weight: f32,
        seed: u64,
    ) -> Result<Self> {
        Self::from_spec(
            &LossSpec::channel_wise(student_channels, teacher_channels)
                .with_tau(tau)
                .with_weight(loss_weight)
                .with_seed(seed),
        )
    }

    /// Build from a configuration entry
    pub fn from_spec(spec: &LossSpec) -> Result<Self> {
        validate_loss(spec).map_err(|e| Error::ConfigError(e.to_string()))?;

        let params = if spec.student_channels != spec.teacher_channels {
            let mut rng = match spec.seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            };
            init_projection(&mut rng, spec.student_channels, spec.teacher_channels)?
        } else {
            Vec::new()
        };

        log::debug!(
            "cwd '{}': {} -> {} channels, tau={}, weight={}, projection={}",
            spec.name,
            spec.student_channels,
            spec.teacher_channels,
            spec.tau,
            spec.weight,
            !params.is_empty()
        );

        Ok(Self {
            name: spec.name.clone(),
            student_channels: spec.student_channels,
            teacher_channels: spec.teacher_channels,
            tau: spec.tau,
            loss_weight: spec.weight,
            pad_edge: spec.pad_edge,
            params,
        })
    }

    /// Set the instance name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the edge padded when downsampling odd dimensions
    pub fn with_pad_edge(mut self, pad_edge: PadEdge) -> Self {
        self.pad_edge = pad_edge;
        self
    }

    /// Instance name from the configuration
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Channels expected in the student feature map
    pub fn student_channels(&self) -> usize {
        self.student_channels
    }

    /// Channels expected in the teacher feature map
    pub fn teacher_channels(&self) -> usize {
        self.teacher_channels
    }

    /// Softmax temperature
    pub fn tau(&self) -> f32 {
        self.tau
    }

    /// Multiplier applied to the normalized loss
    pub fn loss_weight(&self) -> f32 {
        self.loss_weight
    }

    /// Edge padded when downsampling odd dimensions
    pub fn pad_edge(&self) -> PadEdge {
        self.pad_edge
    }

    /// Whether a 1x1 projection was allocated
    pub fn has_projection(&self) -> bool {
        !self.params.is_empty()
    }

    /// Learnable parameters: `[weight, bias]` or nothing
    ///
    /// The weight has shape `[teacher_channels, student_channels, 1, 1]` and
    /// the bias `[teacher_channels]`.
    pub fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    /// Mutable access for optimizers
    pub fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }

    /// Compute the loss
    ///
    /// # Arguments
    ///
    /// * `student` - Student features `[N, student_channels, H_s, W_s]`
    /// * `teacher` - Teacher features `[N, teacher_channels, H_t, W_t]`
    ///   with `(H_t, W_t) = (ceil(H_s / 2), ceil(W_s / 2))`
    ///
    /// # Returns
    ///
    /// A `[1]` tensor differentiable with respect to `student` and the
    /// projection parameters. The teacher is a constant target.
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if the downsampled student does not match
    /// the teacher's spatial size, or batch / channel counts disagree.
    pub fn forward(&self, student: &Tensor, teacher: &Tensor) -> Result<Tensor> {
        let aligned = self.align(student, teacher)?;
        let (n, c, h, w) = teacher.dims4()?;

        let student_rows = autograd::scale(&aligned.reshape(&[n * c, h * w])?, 1.0 / self.tau);
        let target = teacher.detach();
        let teacher_probs = Tensor::from_array2(self.teacher_distribution(&target)?, false);

        let log_probs = autograd::log_softmax_rows(&student_rows)?;
        let cross_entropy = autograd::sum(&autograd::mul(&teacher_probs, &log_probs)?);

        let factor = -self.tau * self.tau * self.loss_weight / (c * n) as f32;
        let loss = autograd::scale(&cross_entropy, factor);

        log::debug!(
            "cwd '{}': student {:?} teacher {:?} loss {:.6}",
            self.name,
            student.shape(),
            teacher.shape(),
            loss.item()
        );

        Ok(loss)
    }

    /// Loss value without keeping the result tensor
    pub fn forward_value(&self, student: &Tensor, teacher: &Tensor) -> Result<f32> {
        Ok(self.forward(student, teacher)?.item())
    }

    /// Teacher and student spatial distributions, one row per (sample, channel)
    pub fn soft_targets(&self, student: &Tensor, teacher: &Tensor) -> Result<SoftTargets> {
        let aligned = self.align(student, teacher)?;
        let (n, c, h, w) = teacher.dims4()?;
        let student_logits = Array2::from_shape_vec((n * c, h * w), aligned.data().to_vec())?;

        Ok(SoftTargets {
            teacher: self.teacher_distribution(teacher)?,
            student: softmax_2d(&(student_logits / self.tau)),
        })
    }

    /// Downsample, check shapes and project the student onto the teacher's channels
    fn align(&self, student: &Tensor, teacher: &Tensor) -> Result<Tensor> {
        let (n, c, h, w) = student.dims4()?;
        let (tn, tc, th, tw) = teacher.dims4()?;

        if c != self.student_channels {
            return Err(Error::ShapeMismatch {
                expected: vec![n, self.student_channels, h, w],
                got: student.shape().to_vec(),
            });
        }
        if tn == 0 || tc == 0 {
            return Err(Error::InvalidParameter(format!(
                "teacher features {:?} have no planes",
                teacher.shape()
            )));
        }

        let pooled = pool::downsample(student, self.pad_edge)?;
        let (_, _, ph, pw) = pooled.dims4()?;
        if (ph, pw) != (th, tw) {
            return Err(Error::ShapeMismatch {
                expected: teacher.shape().to_vec(),
                got: pooled.shape().to_vec(),
            });
        }

        let aligned = match self.params.as_slice() {
            [weight, bias] => autograd::conv2d_1x1(&pooled, weight, Some(bias))?,
            _ => pooled,
        };
        if aligned.shape() != teacher.shape() {
            return Err(Error::ShapeMismatch {
                expected: teacher.shape().to_vec(),
                got: aligned.shape().to_vec(),
            });
        }

        Ok(aligned)
    }

    fn teacher_distribution(&self, teacher: &Tensor) -> Result<Array2<f32>> {
        let (n, c, h, w) = teacher.dims4()?;
        let logits = Array2::from_shape_vec((n * c, h * w), teacher.data().to_vec())?;
        Ok(softmax_2d(&(logits / self.tau)))
    }
}

impl std::fmt::Debug for ChannelWiseDivergence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelWiseDivergence")
            .field("name", &self.name)
            .field("student_channels", &self.student_channels)
            .field("teacher_channels", &self.teacher_channels)
            .field("tau", &self.tau)
            .field("loss_weight", &self.loss_weight)
            .field("pad_edge", &self.pad_edge)
            .field("projection", &self.has_projection())
            .finish()
    }
}

impl DistillLoss for ChannelWiseDivergence {
    fn type_name(&self) -> &'static str {
        Self::TYPE_NAME
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn forward(&self, student: &Tensor, teacher: &Tensor) -> Result<Tensor> {
        ChannelWiseDivergence::forward(self, student, teacher)
    }

    fn parameters(&self) -> &[Tensor] {
        &self.params
    }

    fn parameters_mut(&mut self) -> &mut [Tensor] {
        &mut self.params
    }
}

/// Uniform init in `[-1/sqrt(fan_in), 1/sqrt(fan_in)]` for a 1x1 conv
fn init_projection<R: Rng>(
    rng: &mut R,
    student_channels: usize,
    teacher_channels: usize,
) -> Result<Vec<Tensor>> {
    let bound = 1.0 / (student_channels as f32).sqrt();
    let weight: Vec<f32> = (0..teacher_channels * student_channels)
        .map(|_| rng.random_range(-bound..bound))
        .collect();
    let bias: Vec<f32> = (0..teacher_channels)
        .map(|_| rng.random_range(-bound..bound))
        .collect();

    Ok(vec![
        Tensor::from_shape_vec(&[teacher_channels, student_channels, 1, 1], weight, true)?,
        Tensor::from_shape_vec(&[teacher_channels], bias, true)?,
    ])
}
