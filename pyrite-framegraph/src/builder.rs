//! The frame-graph builder: the declarative surface a pass's
//! `setup` closure calls into to describe which transient resources it
//! needs and how they flow between passes. Grounded method-for-method on
//! `Dusk/Graphics/FrameGraph.cpp`'s `FrameGraphBuilder::allocateImage` /
//! `readImage` / `updatePassDependency` / `cullRenderPasses` family.
//!
//! The original threads an implicit "current pass" (`renderPassCount - 1`)
//! through every call; every operation here instead takes the `PassId`
//! explicitly, since a global "current pass" counter has no safe
//! representation across `&mut self` calls in idiomatic Rust.

use bitflags::bitflags;
use smallvec::SmallVec;

use pyrite_core::device::{BufferDesc, ImageDesc, SamplerDesc};
use pyrite_core::Handle;

/// Fixed-capacity pools are fatal-on-overflow, matching the
/// original's fixed C arrays rather than a growable `Vec`.
pub const MAX_RENDER_PASS_COUNT: usize = 256;
pub const MAX_RESOURCES_HANDLE_PER_FRAME: usize = 4096;
pub const MAX_DEPENDENCY_COUNT: usize = 12;

/// Tag types for `pyrite_core::Handle<T>`, one per
/// per-frame table. Never mix these up with `pyrite_core::device::ImageHandle`
/// et al, which identify device-owned resources that outlive a frame.
pub struct Image;
pub struct Buffer;
pub struct Sampler;
pub struct Pass;

pub type ImageHandle = Handle<Image>;
pub type BufferHandle = Handle<Buffer>;
pub type SamplerHandle = Handle<Sampler>;
pub type PassId = Handle<Pass>;

bitflags! {
    /// Image-allocation flags: how an image's dimensions and
    /// sample count are derived from the builder's pipeline-wide state
    /// rather than the caller's literal `ImageDesc`.
    #[derive(Default)]
    pub struct ImageAllocFlags: u32 {
        const USE_PIPELINE_DIMENSIONS_ONE  = 0b0000_0001;
        const USE_PIPELINE_DIMENSIONS      = 0b0000_0010;
        const USE_SCREEN_SIZE              = 0b0000_0100;
        const USE_PIPELINE_SAMPLER_COUNT   = 0b0000_1000;
        const NO_MULTISAMPLE                = 0b0001_0000;
        const REQUEST_PER_MIP_RESOURCE_VIEW = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport { x: 0.0, y: 0.0, width: 0.0, height: 0.0, min_depth: 0.0, max_depth: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScissorRegion {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// A render-pass record, minus `setup_fn`/`execute_fn` — those
/// are owned by the caller's own pass-description type and wired into a
/// `ScheduledPass` at scheduling time (see `crate::worker`).
#[derive(Debug, Default)]
pub struct PassInfo {
    pub name: String,
    pub image_handles: SmallVec<[ImageHandle; 8]>,
    pub buffer_handles: SmallVec<[BufferHandle; 8]>,
    /// Resources this pass *reads* rather than allocates, tracked separately
    /// so culling a reader can retract the reference count it contributed
    /// and let culling cascade to that resource's writer in a later round.
    pub read_image_handles: SmallVec<[ImageHandle; 8]>,
    pub read_buffer_handles: SmallVec<[BufferHandle; 8]>,
    pub dependencies: SmallVec<[PassId; MAX_DEPENDENCY_COUNT]>,
    pub is_uncullable: bool,
    pub use_async_compute: bool,
}

/// Transient-resource alloc entry, one table per resource kind.
#[derive(Debug, Clone, Copy)]
pub struct ImageAllocInfo {
    pub description: ImageDesc,
    pub flags: ImageAllocFlags,
    pub reference_count: u32,
    pub requesting_pass: PassId,
}

#[derive(Debug, Clone, Copy)]
pub struct BufferAllocInfo {
    pub description: BufferDesc,
    pub shader_stage_binding: u32,
    pub reference_count: u32,
    pub requesting_pass: PassId,
}

/// Well-known persistent-resource hash codes, mirroring
/// `DUSK_STRING_HASH(...)` constants in the original `FrameGraph.cpp`.
/// Computed with the same `string_hash32` the render-library generator and
/// shader cache use, so an application registering a persistent resource
/// under a literal name hashes it the same way. Plain functions rather than
/// `const`s: `string_hash32` folds ASCII case at runtime and isn't `const fn`.
pub fn swapchain_buffer_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("SwapchainBuffer")
}
pub fn present_image_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("PresentImage")
}
pub fn last_frame_image_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("LastFrameImage")
}
pub fn ssr_last_frame_image_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("SSRLastFrameImage")
}
pub fn per_view_buffer_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("PerViewBuffer")
}
pub fn material_ed_buffer_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("MaterialEdBuffer")
}
pub fn vector_data_buffer_hashcode() -> u32 {
    pyrite_core::hash::string_hash32("VectorDataBuffer")
}

/// Declared resources and pass records for a single frame, reset (not
/// deallocated) once `compile()` hands them to the resource pool: the
/// tables are emptied for reuse next frame, not freed.
#[derive(Default)]
pub struct FrameGraphBuilder {
    passes: Vec<PassInfo>,
    images: Vec<ImageAllocInfo>,
    buffers: Vec<BufferAllocInfo>,
    samplers: Vec<SamplerDesc>,
    persistent_image_hashes: Vec<u32>,
    persistent_buffer_hashes: Vec<u32>,
    viewport: Viewport,
    scissor: ScissorRegion,
    image_quality: f32,
    msaa_sample_count: u32,
    screen_size: (u32, u32),
}

impl FrameGraphBuilder {
    pub fn new() -> Self {
        FrameGraphBuilder { image_quality: 1.0, msaa_sample_count: 1, ..Default::default() }
    }

    pub fn set_pipeline_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn set_pipeline_scissor(&mut self, scissor: ScissorRegion) {
        self.scissor = scissor;
    }

    pub fn set_image_quality(&mut self, quality: f32) {
        self.image_quality = quality;
    }

    pub fn set_msaa_sample_count(&mut self, sample_count: u32) {
        self.msaa_sample_count = sample_count;
    }

    pub fn set_screen_size(&mut self, size: (u32, u32)) {
        self.screen_size = size;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn scissor(&self) -> ScissorRegion {
        self.scissor
    }

    pub fn passes(&self) -> &[PassInfo] {
        &self.passes
    }

    pub fn images(&self) -> &[ImageAllocInfo] {
        &self.images
    }

    pub fn buffers(&self) -> &[BufferAllocInfo] {
        &self.buffers
    }

    pub fn samplers(&self) -> &[SamplerDesc] {
        &self.samplers
    }

    pub fn persistent_image_hashes(&self) -> &[u32] {
        &self.persistent_image_hashes
    }

    pub fn persistent_buffer_hashes(&self) -> &[u32] {
        &self.persistent_buffer_hashes
    }

    pub fn add_render_pass(&mut self, name: &str) -> PassId {
        assert!(self.passes.len() < MAX_RENDER_PASS_COUNT, "render-pass pool exhausted: {}", name);
        let id = PassId::new(self.passes.len() as u32);
        log::trace!("add_render_pass: '{}' -> {:?}", name, id);
        self.passes.push(PassInfo { name: name.to_string(), ..Default::default() });
        id
    }

    pub fn set_uncullable_pass(&mut self, pass: PassId) {
        self.passes[pass.index() as usize].is_uncullable = true;
    }

    pub fn set_async_compute_pass(&mut self, pass: PassId) {
        self.passes[pass.index() as usize].use_async_compute = true;
    }

    fn apply_image_flags(&self, desc: &mut ImageDesc, flags: ImageAllocFlags) {
        if flags.contains(ImageAllocFlags::USE_PIPELINE_DIMENSIONS_ONE) {
            desc.width = self.viewport.width as u32;
            desc.height = self.viewport.height as u32;
        } else if flags.contains(ImageAllocFlags::USE_PIPELINE_DIMENSIONS) {
            desc.width = (self.viewport.width * self.image_quality) as u32;
            desc.height = (self.viewport.height * self.image_quality) as u32;
        } else if flags.contains(ImageAllocFlags::USE_SCREEN_SIZE) {
            desc.width = self.screen_size.0;
            desc.height = self.screen_size.1;
        }

        if flags.contains(ImageAllocFlags::USE_PIPELINE_SAMPLER_COUNT) {
            desc.sample_count = self.msaa_sample_count;
        }
        if flags.contains(ImageAllocFlags::NO_MULTISAMPLE) {
            desc.sample_count = 1;
        }
    }

    pub fn allocate_image(&mut self, pass: PassId, mut desc: ImageDesc, flags: ImageAllocFlags) -> ImageHandle {
        assert!(self.images.len() < MAX_RESOURCES_HANDLE_PER_FRAME, "transient image pool exhausted");
        self.apply_image_flags(&mut desc, flags);
        let handle = ImageHandle::new(self.images.len() as u32);
        self.images.push(ImageAllocInfo { description: desc, flags, reference_count: 0, requesting_pass: pass });
        self.passes[pass.index() as usize].image_handles.push(handle);
        handle
    }

    /// `copyImage`: derives a new transient image from an existing one's
    /// description, then re-applies the flags (the original re-runs
    /// `ApplyImageDescriptionFlags` on the copy rather than bit-copying the
    /// source's already-resolved dimensions).
    pub fn copy_image(&mut self, pass: PassId, source: ImageHandle, flags: ImageAllocFlags) -> ImageHandle {
        assert!(self.images.len() < MAX_RESOURCES_HANDLE_PER_FRAME, "transient image pool exhausted");
        let mut desc = self.images[source.index() as usize].description;
        self.apply_image_flags(&mut desc, flags);
        let handle = ImageHandle::new(self.images.len() as u32);
        self.images.push(ImageAllocInfo { description: desc, flags, reference_count: 0, requesting_pass: pass });
        self.passes[pass.index() as usize].image_handles.push(handle);
        handle
    }

    pub fn allocate_buffer(&mut self, pass: PassId, desc: BufferDesc, shader_stage_binding: u32) -> BufferHandle {
        assert!(self.buffers.len() < MAX_RESOURCES_HANDLE_PER_FRAME, "transient buffer pool exhausted");
        let handle = BufferHandle::new(self.buffers.len() as u32);
        self.buffers.push(BufferAllocInfo {
            description: desc,
            shader_stage_binding,
            reference_count: 0,
            requesting_pass: pass,
        });
        self.passes[pass.index() as usize].buffer_handles.push(handle);
        handle
    }

    pub fn allocate_sampler(&mut self, desc: SamplerDesc) -> SamplerHandle {
        let handle = SamplerHandle::new(self.samplers.len() as u32);
        self.samplers.push(desc);
        handle
    }

    /// Bumps the reference count only; no dependency is recorded, matching
    /// `readReadOnlyImage` in the original (a resource a pass reads but that
    /// no other pass writes within the same frame, e.g. a persistent asset).
    pub fn read_read_only_image(&mut self, handle: ImageHandle) -> ImageHandle {
        self.images[handle.index() as usize].reference_count += 1;
        handle
    }

    pub fn read_read_only_buffer(&mut self, handle: BufferHandle) -> BufferHandle {
        self.buffers[handle.index() as usize].reference_count += 1;
        handle
    }

    fn update_pass_dependency(&mut self, pass: PassId, dependency: PassId) {
        if pass == dependency {
            return;
        }
        let infos = &mut self.passes[pass.index() as usize];
        if infos.dependencies.contains(&dependency) {
            return;
        }
        assert!(
            infos.dependencies.len() < MAX_DEPENDENCY_COUNT,
            "pass '{}' exceeds the {}-dependency limit",
            infos.name,
            MAX_DEPENDENCY_COUNT
        );
        infos.dependencies.push(dependency);
    }

    /// `readImage`: bumps the refcount, records a dependency on whichever
    /// pass last wrote (or read, chained) this resource, then hands
    /// ownership of "last touched by" to the reading pass — so a third pass
    /// reading the same resource later depends on the second, not the
    /// first (the dependency-chaining rule).
    pub fn read_image(&mut self, pass: PassId, handle: ImageHandle) -> ImageHandle {
        let writer = {
            let entry = &mut self.images[handle.index() as usize];
            entry.reference_count += 1;
            entry.requesting_pass
        };
        self.update_pass_dependency(pass, writer);
        self.images[handle.index() as usize].requesting_pass = pass;
        self.passes[pass.index() as usize].read_image_handles.push(handle);
        handle
    }

    pub fn read_buffer(&mut self, pass: PassId, handle: BufferHandle) -> BufferHandle {
        let writer = {
            let entry = &mut self.buffers[handle.index() as usize];
            entry.reference_count += 1;
            entry.requesting_pass
        };
        self.update_pass_dependency(pass, writer);
        self.buffers[handle.index() as usize].requesting_pass = pass;
        self.passes[pass.index() as usize].read_buffer_handles.push(handle);
        handle
    }

    fn push_persistent_image(&mut self, hashcode: u32) -> ImageHandle {
        let handle = ImageHandle::new(self.persistent_image_hashes.len() as u32);
        self.persistent_image_hashes.push(hashcode);
        handle
    }

    fn push_persistent_buffer(&mut self, hashcode: u32) -> BufferHandle {
        let handle = BufferHandle::new(self.persistent_buffer_hashes.len() as u32);
        self.persistent_buffer_hashes.push(hashcode);
        handle
    }

    pub fn retrieve_swapchain_buffer(&mut self) -> ImageHandle {
        self.push_persistent_image(swapchain_buffer_hashcode())
    }

    pub fn retrieve_present_image(&mut self) -> ImageHandle {
        self.push_persistent_image(present_image_hashcode())
    }

    pub fn retrieve_last_frame_image(&mut self) -> ImageHandle {
        self.push_persistent_image(last_frame_image_hashcode())
    }

    pub fn retrieve_ssr_last_frame_image(&mut self) -> ImageHandle {
        self.push_persistent_image(ssr_last_frame_image_hashcode())
    }

    pub fn retrieve_per_view_buffer(&mut self) -> BufferHandle {
        self.push_persistent_buffer(per_view_buffer_hashcode())
    }

    pub fn retrieve_material_ed_buffer(&mut self) -> BufferHandle {
        self.push_persistent_buffer(material_ed_buffer_hashcode())
    }

    pub fn retrieve_vector_data_buffer(&mut self) -> BufferHandle {
        self.push_persistent_buffer(vector_data_buffer_hashcode())
    }

    /// Application-named persistent resources implicitly mark the
    /// requesting pass uncullable, since a persistent resource
    /// carries state across frames and so can never be inferred dead from
    /// this frame's reference counts alone.
    pub fn retrieve_persistent_image(&mut self, pass: PassId, hashcode: u32) -> ImageHandle {
        let handle = self.push_persistent_image(hashcode);
        self.set_uncullable_pass(pass);
        handle
    }

    pub fn retrieve_persistent_buffer(&mut self, pass: PassId, hashcode: u32) -> BufferHandle {
        let handle = self.push_persistent_buffer(hashcode);
        self.set_uncullable_pass(pass);
        handle
    }

    /// `cullRenderPasses`: a pass survives if it is uncullable or if any
    /// resource it declared is still referenced by a later reader. Iterates
    /// to a fixed point: culling a pass retracts the reference counts it
    /// contributed as a *reader*, which can in turn make that resource's
    /// writer culled in a later round. A single non-iterative pass would
    /// miss this cascade — e.g. P1 writes X, P2 reads X but is itself
    /// culled, P1 must be culled too once P2's read no longer counts.
    pub fn cull_render_passes(&self) -> Vec<PassId> {
        let mut image_refs: Vec<u32> = self.images.iter().map(|i| i.reference_count).collect();
        let mut buffer_refs: Vec<u32> = self.buffers.iter().map(|b| b.reference_count).collect();
        let mut culled = vec![false; self.passes.len()];

        loop {
            let mut changed = false;
            for (index, infos) in self.passes.iter().enumerate() {
                if culled[index] {
                    continue;
                }
                let keep = infos.is_uncullable
                    || infos.image_handles.iter().any(|h| image_refs[h.index() as usize] > 0)
                    || infos.buffer_handles.iter().any(|h| buffer_refs[h.index() as usize] > 0);
                if keep {
                    continue;
                }
                culled[index] = true;
                changed = true;
                for h in &infos.read_image_handles {
                    image_refs[h.index() as usize] = image_refs[h.index() as usize].saturating_sub(1);
                }
                for h in &infos.read_buffer_handles {
                    buffer_refs[h.index() as usize] = buffer_refs[h.index() as usize].saturating_sub(1);
                }
            }
            if !changed {
                break;
            }
        }

        (0..self.passes.len())
            .filter(|&index| !culled[index])
            .map(|index| PassId::new(index as u32))
            .collect()
    }

    /// Resets every per-frame table to empty without deallocating their
    /// backing storage, mirroring the original zeroing its
    /// counters rather than freeing its fixed arrays. Realizing the
    /// declared resources against the device happens in
    /// `crate::resources::FrameGraphResources::realize` *before* this is
    /// called — `compile()` here only clears the builder's own state.
    pub fn compile(&mut self) {
        self.passes.clear();
        self.images.clear();
        self.buffers.clear();
        self.samplers.clear();
        self.persistent_image_hashes.clear();
        self.persistent_buffer_hashes.clear();
    }
}
