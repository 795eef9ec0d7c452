//! The frame-graph resource pool: realizes the builder's
//! declared transient resources against the device by reusing any pooled
//! resource whose description is bit-for-bit identical, binds the
//! application's persistent resources by hash, and buckets the frame's
//! draw commands into the shared per-instance data buffer. Grounded on
//! `Dusk/Graphics/FrameGraph.cpp`'s `FrameGraphResources::allocateImage` /
//! `bindPersistentImages` / `dispatchToBuckets`.

use std::collections::HashMap;

use pyrite_core::device::{
    BufferDesc, BufferHandle as DeviceBufferHandle, Device, ImageDesc, ImageHandle as DeviceImageHandle,
    ImageViewDesc, ImageViewFlags, SamplerDesc, SamplerHandle as DeviceSamplerHandle,
};
use pyrite_core::error::DeviceError;

use crate::builder::{BufferHandle, FrameGraphBuilder, ImageAllocFlags, ImageHandle, SamplerHandle, ScissorRegion, Viewport};

/// Per-instance draw data, one per drawn object. Sized to a
/// whole number of 16-byte vectors so `vectors_per_instance` divides evenly,
/// the same constraint the original's `DrawCommandInfos::InstanceData`
/// struct satisfies by packing the trailing scalars into a padded vec4.
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct InstanceData {
    pub model_matrix: [[f32; 4]; 4],
    pub entity_id: u32,
    pub lod_dither: f32,
    pub _pad: [u32; 2],
}

impl InstanceData {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        for row in &self.model_matrix {
            for component in row {
                out.extend_from_slice(&component.to_le_bytes());
            }
        }
        out.extend_from_slice(&self.entity_id.to_le_bytes());
        out.extend_from_slice(&self.lod_dither.to_le_bytes());
        out.extend_from_slice(&self._pad[0].to_le_bytes());
        out.extend_from_slice(&self._pad[1].to_le_bytes());
    }
}

pub const VECTORS_PER_INSTANCE: usize = std::mem::size_of::<InstanceData>() / 16;

/// Which of the four layers a draw command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Depth,
    World,
    Hud,
    Debug,
}

/// Front-to-back (opaque) or back-to-front (transparent) sorting within a
/// bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SortOrder {
    FrontToBack,
    BackToFront,
}

/// A draw command's sort/bucket key. Bucketed by `(layer, viewport_layer)`;
/// `material_sort_key`, `depth_half_float` and `sort_order` additionally
/// order commands within a bucket the way `DrawCmd::SortFrontToBack` /
/// `SortBackToFront` compare the packed key as a single integer in the
/// original.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DrawCommandKey {
    pub layer: Layer,
    pub viewport_layer: u8,
    pub viewport_id: u8,
    pub material_sort_key: u32,
    /// Half-float depth bits, kept as the raw bit pattern (not `f32`) so the
    /// key can derive `Eq`/`Hash` and be compared bit-for-bit like the
    /// original's packed `u64` key.
    pub depth_half_float: u16,
    pub sort_order: SortOrder,
}

/// Opaque reference to the `Material` bound by a draw command. Kept as a
/// handle rather than a borrow, matching this crate's
/// `pyrite_core::device` handle-newtype convention, since a frame graph
/// doesn't otherwise need to know `pyrite-material`'s types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u64);

/// Max vertex buffers one draw command can bind, mirroring the original's
/// `vertexBufferCount`-bounded array rather than a heap allocation per draw.
pub const MAX_VERTEX_BUFFER_COUNT: usize = 4;

/// The geometry and instancing data a draw command carries, grounded on
/// `WorldRenderer.h`'s `DrawCommandInfos`.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommandInfos {
    pub material: MaterialHandle,
    pub vertex_buffers: [Option<DeviceBufferHandle>; MAX_VERTEX_BUFFER_COUNT],
    pub vertex_buffer_count: u32,
    pub index_buffer: Option<DeviceBufferHandle>,
    pub index_buffer_offset: u32,
    pub index_buffer_count: u32,
    pub instance_count: u32,
    pub instance_data: InstanceData,
    pub uses_short_indices: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    pub key: DrawCommandKey,
    pub infos: DrawCommandInfos,
}

/// One contiguous run of draw commands sharing a `DrawCommandKey`, plus
/// where its instance data landed in the shared instance buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawCommandBucket {
    pub begin: usize,
    pub end: usize,
    pub instance_data_start_offset: usize,
    pub vectors_per_instance: usize,
}

/// Max instances the shared instance-data buffer can hold in one frame
/// (`MAX_VECTOR_PER_INSTANCE`). Exceeding it is fatal, matching
/// the fixed-capacity-pool policy used throughout this crate.
pub const MAX_VECTOR_PER_INSTANCE: usize = 1024;
pub const INSTANCE_BUFFER_SIZE: usize = MAX_VECTOR_PER_INSTANCE * 16;

struct PooledResource<Desc, Handle> {
    description: Desc,
    handle: Handle,
    free: bool,
}

/// Transient resource pool plus persistent-resource registry and
/// draw-command bucketer for one frame-graph instance. Not `Clone`: a
/// single `FrameGraphResources` is owned by whichever object drives the
/// frame (outside this crate's scope, per the external-interface
/// boundary).
pub struct FrameGraphResources {
    images: Vec<PooledResource<ImageDesc, DeviceImageHandle>>,
    buffers: Vec<PooledResource<BufferDesc, DeviceBufferHandle>>,
    samplers: Vec<PooledResource<SamplerDesc, DeviceSamplerHandle>>,

    bound_images: Vec<DeviceImageHandle>,
    bound_buffers: Vec<DeviceBufferHandle>,
    bound_samplers: Vec<DeviceSamplerHandle>,

    persistent_images: HashMap<u32, DeviceImageHandle>,
    persistent_buffers: HashMap<u32, DeviceBufferHandle>,
    bound_persistent_images: Vec<Option<DeviceImageHandle>>,
    bound_persistent_buffers: Vec<Option<DeviceBufferHandle>>,

    viewport: Viewport,
    scissor: ScissorRegion,
    screen_size: (u32, u32),
    delta_time: f32,

    instance_buffer: Vec<u8>,
    buckets: Vec<(DrawCommandKey, DrawCommandBucket)>,
}

impl Default for FrameGraphResources {
    fn default() -> Self {
        FrameGraphResources {
            images: Vec::new(),
            buffers: Vec::new(),
            samplers: Vec::new(),
            bound_images: Vec::new(),
            bound_buffers: Vec::new(),
            bound_samplers: Vec::new(),
            persistent_images: HashMap::new(),
            persistent_buffers: HashMap::new(),
            bound_persistent_images: Vec::new(),
            bound_persistent_buffers: Vec::new(),
            viewport: Viewport::default(),
            scissor: ScissorRegion::default(),
            screen_size: (0, 0),
            delta_time: 0.0,
            instance_buffer: vec![0u8; INSTANCE_BUFFER_SIZE],
            buckets: Vec::new(),
        }
    }
}

impl FrameGraphResources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a persistent resource the application created itself
    /// (swapchain images, the engine's own per-view/vector-data buffers),
    /// keyed by the same hash a pass uses to retrieve it.
    pub fn import_persistent_image(&mut self, hashcode: u32, handle: DeviceImageHandle) {
        self.persistent_images.insert(hashcode, handle);
    }

    pub fn import_persistent_buffer(&mut self, hashcode: u32, handle: DeviceBufferHandle) {
        self.persistent_buffers.insert(hashcode, handle);
    }

    pub fn set_delta_time(&mut self, dt: f32) {
        self.delta_time = dt;
    }

    /// `unacquireResources`: marks every pooled entry free so this frame's
    /// realization pass can reuse them; entries are never actually freed
    /// from the device, only from the "in use this frame" bookkeeping.
    fn unacquire_resources(&mut self) {
        for entry in &mut self.images {
            entry.free = true;
        }
        for entry in &mut self.buffers {
            entry.free = true;
        }
        for entry in &mut self.samplers {
            entry.free = true;
        }
    }

    fn acquire_image<D: Device>(&mut self, device: &D, desc: ImageDesc, flags: ImageAllocFlags) -> Result<DeviceImageHandle, DeviceError> {
        if let Some(entry) = self.images.iter_mut().find(|e| e.free && e.description == desc) {
            entry.free = false;
            return Ok(entry.handle);
        }

        let handle = device.create_image(&desc)?;
        if flags.contains(ImageAllocFlags::REQUEST_PER_MIP_RESOURCE_VIEW) {
            let mip_count = desc.mip_count();
            if desc.mip_count <= 0 {
                device.create_image_view(
                    handle,
                    &ImageViewDesc { mip_count, start_mip_index: 0 },
                    ImageViewFlags::CREATE_SRV | ImageViewFlags::COVER_WHOLE_MIPCHAIN,
                )?;
            } else {
                for mip in 0..mip_count {
                    device.create_image_view(
                        handle,
                        &ImageViewDesc { mip_count: 1, start_mip_index: mip },
                        ImageViewFlags::CREATE_SRV,
                    )?;
                }
            }
        }

        self.images.push(PooledResource { description: desc, handle, free: false });
        Ok(handle)
    }

    fn acquire_buffer<D: Device>(&mut self, device: &D, desc: BufferDesc) -> Result<DeviceBufferHandle, DeviceError> {
        if let Some(entry) = self.buffers.iter_mut().find(|e| e.free && e.description == desc) {
            entry.free = false;
            return Ok(entry.handle);
        }
        let handle = device.create_buffer(&desc)?;
        self.buffers.push(PooledResource { description: desc, handle, free: false });
        Ok(handle)
    }

    fn acquire_sampler<D: Device>(&mut self, device: &D, desc: SamplerDesc) -> Result<DeviceSamplerHandle, DeviceError> {
        if let Some(entry) = self.samplers.iter_mut().find(|e| e.free && e.description == desc) {
            entry.free = false;
            return Ok(entry.handle);
        }
        let handle = device.create_sampler(&desc)?;
        self.samplers.push(PooledResource { description: desc, handle, free: false });
        Ok(handle)
    }

    /// Realizes every transient resource the builder declared this frame
    /// and binds the application-registered persistent ones, mirroring
    /// `FrameGraphBuilder::compile`'s collaboration with
    /// `FrameGraphResources` in the original. The builder's own tables are
    /// reset separately via `FrameGraphBuilder::compile`.
    pub fn realize<D: Device>(&mut self, device: &D, builder: &FrameGraphBuilder) -> Result<(), DeviceError> {
        self.unacquire_resources();
        self.viewport = builder.viewport();
        self.scissor = builder.scissor();

        self.bound_images.clear();
        for info in builder.images() {
            let handle = self.acquire_image(device, info.description, info.flags)?;
            self.bound_images.push(handle);
        }

        self.bound_buffers.clear();
        for info in builder.buffers() {
            let handle = self.acquire_buffer(device, info.description)?;
            self.bound_buffers.push(handle);
        }

        self.bound_samplers.clear();
        for desc in builder.samplers() {
            let handle = self.acquire_sampler(device, *desc)?;
            self.bound_samplers.push(handle);
        }

        self.bound_persistent_images.clear();
        for hashcode in builder.persistent_image_hashes() {
            self.bound_persistent_images.push(self.persistent_images.get(hashcode).copied());
        }

        self.bound_persistent_buffers.clear();
        for hashcode in builder.persistent_buffer_hashes() {
            self.bound_persistent_buffers.push(self.persistent_buffers.get(hashcode).copied());
        }

        Ok(())
    }

    pub fn get_image(&self, handle: ImageHandle) -> DeviceImageHandle {
        self.bound_images[handle.index() as usize]
    }

    pub fn get_buffer(&self, handle: BufferHandle) -> DeviceBufferHandle {
        self.bound_buffers[handle.index() as usize]
    }

    pub fn get_sampler(&self, handle: SamplerHandle) -> DeviceSamplerHandle {
        self.bound_samplers[handle.index() as usize]
    }

    /// A persistent resource bound by hash may be absent (no application
    /// object was ever imported under that hash); the pass is expected to
    /// handle that.
    pub fn get_persistent_image(&self, handle: ImageHandle) -> Option<DeviceImageHandle> {
        self.bound_persistent_images[handle.index() as usize]
    }

    pub fn get_persistent_buffer(&self, handle: BufferHandle) -> Option<DeviceBufferHandle> {
        self.bound_persistent_buffers[handle.index() as usize]
    }

    pub fn main_viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn main_scissor_region(&self) -> ScissorRegion {
        self.scissor
    }

    pub fn set_screen_size(&mut self, size: (u32, u32)) {
        self.screen_size = size;
    }

    pub fn screen_size(&self) -> (u32, u32) {
        self.screen_size
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn vector_buffer_data(&self) -> &[u8] {
        &self.instance_buffer
    }

    pub fn bucket(&self, key: DrawCommandKey) -> Option<DrawCommandBucket> {
        self.buckets.iter().find(|(k, _)| *k == key).map(|(_, bucket)| *bucket)
    }

    /// `dispatchToBuckets`: the draw commands must already be sorted by
    /// `(layer, viewport_layer)`; this does a single forward scan detecting
    /// bucket transitions and copies each command's instance data into the
    /// shared buffer at a running byte offset. Overflowing the fixed
    /// instance buffer is fatal.
    pub fn dispatch_to_buckets(&mut self, commands: &[DrawCommand]) {
        self.buckets.clear();
        self.instance_buffer.clear();
        self.instance_buffer.resize(INSTANCE_BUFFER_SIZE, 0);

        if commands.is_empty() {
            return;
        }

        let mut offset = 0usize;
        let mut bucket_start = 0usize;
        let mut current_key = commands[0].key;

        for (index, command) in commands.iter().enumerate() {
            if command.key != current_key {
                self.buckets.push((
                    current_key,
                    DrawCommandBucket {
                        begin: bucket_start,
                        end: index,
                        instance_data_start_offset: offset - (index - bucket_start) * std::mem::size_of::<InstanceData>(),
                        vectors_per_instance: VECTORS_PER_INSTANCE,
                    },
                ));
                bucket_start = index;
                current_key = command.key;
            }

            let mut bytes = Vec::with_capacity(std::mem::size_of::<InstanceData>());
            command.infos.instance_data.write_bytes(&mut bytes);
            assert!(
                offset + bytes.len() <= INSTANCE_BUFFER_SIZE,
                "vector-data buffer overflow: more than {} instances in one frame",
                MAX_VECTOR_PER_INSTANCE
            );
            self.instance_buffer[offset..offset + bytes.len()].copy_from_slice(&bytes);
            offset += bytes.len();
        }

        self.buckets.push((
            current_key,
            DrawCommandBucket {
                begin: bucket_start,
                end: commands.len(),
                instance_data_start_offset: offset - (commands.len() - bucket_start) * std::mem::size_of::<InstanceData>(),
                vectors_per_instance: VECTORS_PER_INSTANCE,
            },
        ));
    }
}
