//! Backward operation trait

/// A node on the gradient tape
///
/// Implementations read the gradient of the tensor they produced, push
/// the chain-ruled gradient into each input and recurse into the inputs'
/// own backward ops.
pub trait BackwardOp {
    /// Perform backward pass
    fn backward(&self);
}
