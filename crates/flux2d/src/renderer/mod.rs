//! Compute substrate over `wgpu`.
//!
//! Kernels are bound once to concrete buffers ([`work`]), recorded once into
//! replayable command lists ([`command`]) and submitted every step. Ordering
//! between dependent dispatches is explicit: the recorder panics when a
//! buffer is read or written after a write without a barrier naming it.

pub mod buffer;
pub mod command;
pub mod device;
pub mod drawable;
pub mod readback;
pub(crate) mod shaders;
pub mod work;

pub use buffer::{BufferKind, DoubleBuffer, GenericBuffer, ResourceId};
pub use command::{execute_command, CommandBuffer, CommandEncoder, RenderCommand};
pub use device::Device;
pub use drawable::{Blend, Clear, Drawable, Ellipse, Rectangle, RenderTarget, Shape, Transform};
pub use work::{Access, Binding, BoundWork, ComputeSize, Work, LOCAL_SIZE};
