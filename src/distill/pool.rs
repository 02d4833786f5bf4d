//! Parity-driven student downsampling

use crate::autograd::{self, Padding2d, Tensor};
use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Which side of an odd dimension receives the extra pad cell
///
/// `Leading` reproduces `AvgPool2d(2, 2, padding=(H % 2, W % 2))`: the pad
/// is applied on both sides and the floor in the output size discards the
/// trailing one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PadEdge {
    /// Pad before the first row / column
    #[default]
    Leading,
    /// Pad after the last row / column
    Trailing,
}

impl PadEdge {
    /// Place `(pad_h, pad_w)` cells on this edge
    pub fn padding(self, pad_h: usize, pad_w: usize) -> Padding2d {
        match self {
            PadEdge::Trailing => Padding2d {
                bottom: pad_h,
                right: pad_w,
                ..Padding2d::default()
            },
            PadEdge::Leading => Padding2d {
                top: pad_h,
                left: pad_w,
                ..Padding2d::default()
            },
        }
    }
}

/// Padding needed so a 2x2 / stride-2 pool covers every row and column
pub fn parity_padding(height: usize, width: usize) -> (usize, usize) {
    (height % 2, width % 2)
}

/// Spatial size after [`downsample`]
pub fn downsampled_hw(height: usize, width: usize) -> (usize, usize) {
    let (pad_h, pad_w) = parity_padding(height, width);
    ((height + pad_h) / 2, (width + pad_w) / 2)
}

/// Halve the spatial size of a `[N, C, H, W]` tensor with 2x2 average pooling
///
/// Odd dimensions get one zero pad cell on `edge`, so the output is
/// `(ceil(H / 2), ceil(W / 2))`.
pub fn downsample(x: &Tensor, edge: PadEdge) -> Result<Tensor> {
    let (_, _, h, w) = x.dims4()?;
    let (pad_h, pad_w) = parity_padding(h, w);
    autograd::avg_pool2d(x, (2, 2), (2, 2), edge.padding(pad_h, pad_w))
}
