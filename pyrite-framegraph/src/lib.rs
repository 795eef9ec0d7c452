//! Declarative per-frame render-graph builder, transient resource pool,
//! and multi-threaded pass scheduler. A pass describes
//! what it needs through `builder::FrameGraphBuilder` during setup; once
//! every pass for the frame has been declared, the graph is compiled
//! (culling dead passes, realizing transient resources against the
//! device) and handed to `scheduler::Scheduler`, which distributes the
//! surviving passes across a pool of `worker::Worker`s and presents once
//! every worker has finished recording.
//!
//! Grounded on `Dusk/Graphics/FrameGraph.cpp` end to end; the concurrency
//! model (a dispatcher thread, N render-thread workers, CAS-guarded state
//! machines, no mutexes in the original's own synchronization) is carried
//! over deliberately rather than flattened into a simpler callback
//! pipeline, since the ordering guarantees and
//! suspension points the original's threads implement.

pub mod builder;
pub mod resources;
pub mod scheduler;
pub mod worker;

pub use builder::{BufferHandle, FrameGraphBuilder, ImageAllocFlags, ImageHandle, PassId, SamplerHandle, ScissorRegion, Viewport};
pub use resources::{
    DrawCommand, DrawCommandBucket, DrawCommandInfos, DrawCommandKey, FrameGraphResources, InstanceData, Layer,
    MaterialHandle, SortOrder, MAX_VERTEX_BUFFER_COUNT,
};
pub use scheduler::Scheduler;
pub use worker::{ScheduledPass, Worker};
