//! Two-stage GPU reductions into one-element buffers.
//!
//! The partial stage folds each 256-element block into a scratch buffer,
//! the final stage folds the scratch buffer in a single work group. Results
//! stay on the GPU, where later kernels in the same command list read them.

use crate::renderer::{Access, Binding, BoundWork, CommandEncoder, ComputeSize, Device, GenericBuffer, Work};
use crate::renderer::work::LINEAR_LOCAL_SIZE;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    /// `sum(a[i] * b[i])` over two f32 arrays.
    Dot,
    /// `max(|a[i]|)` over an f32 array.
    MaxAbs,
    /// Component-wise sum of a vec4 array.
    SumVec4,
}

impl ReduceOp {
    fn shader(self) -> &'static str {
        match self {
            ReduceOp::Dot | ReduceOp::MaxAbs => "reduce",
            ReduceOp::SumVec4 => "reduce_vec4",
        }
    }

    fn entry_points(self) -> (&'static str, &'static str) {
        match self {
            ReduceOp::Dot => ("dot_partial", "sum_final"),
            ReduceOp::MaxAbs => ("max_abs_partial", "max_final"),
            ReduceOp::SumVec4 => ("sum_partial", "sum_final"),
        }
    }

    fn inputs(self) -> usize {
        match self {
            ReduceOp::Dot => 2,
            ReduceOp::MaxAbs | ReduceOp::SumVec4 => 1,
        }
    }
}

/// Reduction kernels for arrays of one length.
pub struct Reduce {
    device: Device,
    op: ReduceOp,
    partial: Work,
    finish: Work,
    blocks: usize,
}

impl Reduce {
    pub fn new(device: &Device, len: usize, op: ReduceOp) -> Self {
        let (partial_entry, finish_entry) = op.entry_points();
        let mut partial_bindings = vec![Binding::Storage(Access::Read), Binding::Storage(Access::Write)];
        if op.inputs() == 2 {
            partial_bindings.push(Binding::Storage(Access::Read));
        }

        Self {
            device: device.clone(),
            op,
            partial: Work::new(
                device,
                ComputeSize::linear(len as u32),
                op.shader(),
                partial_entry,
                &partial_bindings,
            ),
            finish: Work::new(
                device,
                ComputeSize::single(),
                op.shader(),
                finish_entry,
                &[Binding::Storage(Access::Read), Binding::Storage(Access::Write)],
            ),
            blocks: len.div_ceil(LINEAR_LOCAL_SIZE as usize),
        }
    }

    /// Bind `inputs` (two for [`ReduceOp::Dot`], one otherwise) and the
    /// one-element `output`.
    pub fn bind(&self, inputs: &[&GenericBuffer], output: &GenericBuffer) -> BoundReduce {
        assert_eq!(
            inputs.len(),
            self.op.inputs(),
            "{:?} reduction takes {} inputs",
            self.op,
            self.op.inputs()
        );

        let label = format!("{:?} partials of {}", self.op, inputs[0].label());
        let scratch = match self.op {
            ReduceOp::SumVec4 => GenericBuffer::storage::<[f32; 4]>(&self.device, &label, self.blocks),
            ReduceOp::Dot | ReduceOp::MaxAbs => {
                GenericBuffer::storage::<f32>(&self.device, &label, self.blocks)
            }
        };

        let mut partial_buffers = vec![inputs[0], &scratch];
        partial_buffers.extend_from_slice(&inputs[1..]);

        BoundReduce {
            partial: self.partial.bind(&partial_buffers),
            finish: self.finish.bind(&[&scratch, output]),
            scratch: scratch.clone(),
            output: output.clone(),
        }
    }
}

/// A reduction bound to its inputs and output.
pub struct BoundReduce {
    partial: BoundWork,
    finish: BoundWork,
    scratch: GenericBuffer,
    output: GenericBuffer,
}

impl BoundReduce {
    /// Record both stages. The output is readable after this returns; the
    /// inputs still carry pending reads.
    pub fn record(&self, encoder: &mut CommandEncoder) {
        self.partial.record(encoder);
        encoder.barrier(&[&self.scratch]);
        self.finish.record(encoder);
        encoder.barrier(&[&self.scratch, &self.output]);
    }

    pub fn output(&self) -> &GenericBuffer {
        &self.output
    }
}
