//! The `Device` contract: the concrete graphics backend is out
//! of scope for this workspace, so every crate downstream of `pyrite-core`
//! only ever sees this trait. Modeled the way `rendy-memory::Device` models
//! the allocator's own backend seam (one associated type per resource kind,
//! `unsafe` only where a raw backend call genuinely cannot be checked).

use crate::error::DeviceError;
use bitflags::bitflags;

/// Pixel/byte layout description of an image resource. Equality is
/// bit-for-bit structural, which is what the frame-graph resource pool uses
/// to decide whether a transient resource can be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageDesc {
    pub width: u32,
    pub height: u32,
    pub depth_or_layers: u32,
    pub mip_count: i32,
    pub sample_count: u32,
    pub format: ImageFormat,
    pub usage: ImageUsage,
}

impl ImageDesc {
    /// Mirrors `ImageDesc::GetMipCount` from `FrameGraph.cpp`: a full mip
    /// chain down to a 1x1 level when the caller asked for an automatically
    /// computed mip count (`mip_count <= 0`).
    pub fn mip_count(&self) -> u32 {
        if self.mip_count > 0 {
            return self.mip_count as u32;
        }
        let largest = self.width.max(self.height);
        32 - largest.max(1).leading_zeros()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    R16Float,
    Rg16Float,
    Rgba16Float,
    R32Float,
    Rg32Float,
    Rgba32Float,
    D32Float,
    D24UnormS8Uint,
    Bc7Unorm,
}

bitflags! {
    #[derive(Default)]
    pub struct ImageUsage: u32 {
        const RENDER_TARGET    = 0b0000_0001;
        const DEPTH_STENCIL    = 0b0000_0010;
        const SAMPLED          = 0b0000_0100;
        const STORAGE          = 0b0000_1000;
        const TRANSFER_SRC     = 0b0001_0000;
        const TRANSFER_DST     = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferDesc {
    pub size: u64,
    pub usage: BufferUsage,
}

bitflags! {
    #[derive(Default)]
    pub struct BufferUsage: u32 {
        const UNIFORM    = 0b0000_0001;
        const STORAGE    = 0b0000_0010;
        const VERTEX     = 0b0000_0100;
        const INDEX      = 0b0000_1000;
        const TRANSFER_SRC = 0b0001_0000;
        const TRANSFER_DST = 0b0010_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerDesc {
    pub filter: SamplerFilter,
    pub address_mode: AddressMode,
    pub comparison: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SamplerFilter {
    Nearest,
    Linear,
    Anisotropic(u8),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressMode {
    Wrap,
    Clamp,
    Mirror,
    Border,
}

bitflags! {
    /// Flags accepted by `Device::create_image_view`.
    pub struct ImageViewFlags: u32 {
        const CREATE_UAV = 0b0001;
        const CREATE_SRV = 0b0010;
        const CREATE_RTV_OR_DSV = 0b0100;
        const COVER_WHOLE_MIPCHAIN = 0b1000;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImageViewDesc {
    pub mip_count: u32,
    pub start_mip_index: u32,
}

/// A pipeline state descriptor: fixed-function state plus the shader
/// binding it was built from. Shader names are pre-hashed to five
/// shader-name hashes so the descriptor itself never borrows text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineDescriptor {
    pub pipeline_kind: PipelineKind,
    pub shader_name_hashes: [u32; 5],
    pub rasterizer_key: u32,
    pub depth_stencil_key: u32,
    pub blend_key: u32,
    pub color_rt_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Graphics,
    Compute,
}

/// Per-command-list recording operations. Kept separate
/// from `Device` because it is the recording-time surface, not the
/// resource-lifetime surface; a `Device` creates `CommandList`s, a worker
/// records into them.
pub trait CommandList {
    fn begin(&mut self);
    fn end(&mut self);
    fn bind_pipeline_state(&mut self, pipeline: PipelineStateHandle);
    fn bind_image(&mut self, slot: u32, image: ImageHandle);
    fn bind_buffer(&mut self, slot: u32, buffer: BufferHandle);
    fn bind_sampler(&mut self, slot: u32, sampler: SamplerHandle);
    fn bind_constant_buffer(&mut self, slot: u32, buffer: BufferHandle);
    fn set_viewport(&mut self, x: f32, y: f32, w: f32, h: f32);
    fn set_scissor(&mut self, x: i32, y: i32, w: u32, h: u32);
    fn draw(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32);
    fn draw_indexed(&mut self, index_count: u32, instance_count: u32, first_index: u32);
    fn dispatch(&mut self, x: u32, y: u32, z: u32);
    fn push_event_marker(&mut self, name: &str);
    fn pop_event_marker(&mut self);
    fn setup_framebuffer(&mut self, color_rts: &[ImageHandle], depth_stencil: Option<ImageHandle>);
    fn clear_render_targets(&mut self, color_rts: &[ImageHandle], value: [f32; 4]);
    fn clear_depth_stencil(&mut self, depth_stencil: ImageHandle, depth: f32, stencil: u8);
    fn prepare_and_bind_resource_list(&mut self, images: &[ImageHandle], buffers: &[BufferHandle]);
    fn multi_draw_indexed_instanced_indirect(&mut self, args_buffer: BufferHandle, draw_count: u32);
}

/// Opaque, device-owned resource handles. These are distinct from
/// `pyrite_core::Handle<T>` (the frame-local index into the graph's
/// transient pool) — a `BufferHandle` identifies a real device-side
/// allocation that may outlive any single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SamplerHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u64);
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineStateHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    TesselationControl,
    TesselationEvaluation,
    Pixel,
    Compute,
}

pub struct PipelineStateBlob {
    pub bytes: Vec<u8>,
}

/// The backend contract. A concrete implementation lives outside
/// this workspace; tests stand in a hand-written mock, the same way
/// `rendy-memory`'s allocator tests stand in `MockDevice`.
pub trait Device {
    type CommandList: CommandList;

    fn create_buffer(&self, desc: &BufferDesc) -> Result<BufferHandle, DeviceError>;
    fn destroy_buffer(&self, buffer: BufferHandle);
    fn update_buffer(&self, buffer: BufferHandle, offset: u64, data: &[u8]);

    fn create_image(&self, desc: &ImageDesc) -> Result<ImageHandle, DeviceError>;
    fn destroy_image(&self, image: ImageHandle);
    fn create_image_view(
        &self,
        image: ImageHandle,
        view_desc: &ImageViewDesc,
        flags: ImageViewFlags,
    ) -> Result<(), DeviceError>;
    fn copy_image(&self, src: ImageHandle, dst: ImageHandle);
    fn resolve_image(&self, src: ImageHandle, dst: ImageHandle);

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError>;
    fn destroy_sampler(&self, sampler: SamplerHandle);

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<ShaderHandle, DeviceError>;
    fn destroy_shader(&self, shader: ShaderHandle);

    fn create_pipeline_state(
        &self,
        descriptor: &PipelineDescriptor,
        shaders: &[ShaderHandle],
        cached_blob: Option<&[u8]>,
    ) -> Result<PipelineStateHandle, DeviceError>;
    fn get_pipeline_state_cache(&self, pipeline: PipelineStateHandle) -> Option<PipelineStateBlob>;
    fn destroy_pipeline_state_cache(&self, pipeline: PipelineStateHandle);
    fn destroy_pipeline_state(&self, pipeline: PipelineStateHandle);

    fn allocate_graphics_command_list(&self) -> Self::CommandList;
    fn allocate_compute_command_list(&self) -> Self::CommandList;
    fn allocate_copy_command_list(&self) -> Self::CommandList;
    fn submit_command_list(&self, list: Self::CommandList);
    fn submit_command_lists(&self, lists: Vec<Self::CommandList>);

    fn get_swapchain_buffer(&self) -> ImageHandle;
    fn present(&self);
    fn resize_backbuffer(&self, width: u32, height: u32);
}
