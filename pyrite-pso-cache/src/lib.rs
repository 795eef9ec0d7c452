//! The pipeline-state cache: a fixed-capacity linear-probe
//! cache keyed by a 128-bit Murmur3 digest over a packed pipeline
//! descriptor, backed by an on-disk blob cache so a cold
//! pipeline-state build only has to happen once across process runs.
//! Grounded method-for-method on `Dusk/Graphics/PipelineStateCache.cpp`'s
//! `getOrCreatePipelineState`/`computePipelineStateKey`, including its
//! embedded `ShaderCache` step of resolving each shader name through the
//! shader cache first.

use std::io::{Read, Write};

use pyrite_core::device::{Device, PipelineDescriptor, PipelineStateHandle, ShaderHandle, ShaderStage};
use pyrite_core::error::CacheError;
use pyrite_core::filesystem::{FileOpenMode, Filesystem, FsObject};
use pyrite_core::hash::{format_digest_hex, murmur3_x64_128, Hash128};
use pyrite_shader_cache::{ShaderBackendDir, ShaderCache};

/// Seed the packed pipeline-descriptor key is hashed with.
pub const PSO_CACHE_KEY_SEED: u32 = 234_823_489;

/// Linear-probe capacity: a scan of up to `MAX_CACHE_ELEMENT_COUNT` (32)
/// entries.
pub const MAX_CACHE_ELEMENT_COUNT: usize = 32;

/// The set of shader source names a pipeline state is built from, resolved
/// through the embedded `ShaderCache` before the device creates the state.
/// Mirrors `Dusk/Graphics/ShaderBinding.h`'s field set, minus geometry
/// shaders (out of this workspace's scope).
#[derive(Debug, Clone, Default)]
pub struct ShaderBinding {
    pub vertex_shader: Option<String>,
    pub tesselation_control_shader: Option<String>,
    pub tesselation_evaluation_shader: Option<String>,
    pub pixel_shader: Option<String>,
    pub compute_shader: Option<String>,
}

fn pack_descriptor(descriptor: &PipelineDescriptor) -> [u8; 36] {
    let mut buf = [0u8; 36];
    buf[0..4].copy_from_slice(&(descriptor.pipeline_kind as u32).to_le_bytes());
    for (i, hash) in descriptor.shader_name_hashes.iter().enumerate() {
        let offset = 4 + i * 4;
        buf[offset..offset + 4].copy_from_slice(&hash.to_le_bytes());
    }
    buf[24..28].copy_from_slice(&descriptor.rasterizer_key.to_le_bytes());
    buf[28..32].copy_from_slice(&descriptor.depth_stencil_key.to_le_bytes());
    buf[32..36].copy_from_slice(&descriptor.blend_key.to_le_bytes());
    buf
}

/// `computePipelineStateKey`: a 128-bit digest over the descriptor's
/// pipeline kind, its five pre-hashed shader names, and the three
/// fixed-function sort keys. `color_rt_count` is not part of the original's
/// packed key struct and is deliberately left out here too, to keep the
/// digest reproducible from the same fields the original hashes.
pub fn compute_pipeline_state_key(descriptor: &PipelineDescriptor) -> Hash128 {
    murmur3_x64_128(&pack_descriptor(descriptor), PSO_CACHE_KEY_SEED)
}

fn resolve_shaders<D: Device, F: Filesystem>(
    shader_cache: &ShaderCache<D, F>,
    descriptor: &PipelineDescriptor,
    binding: &ShaderBinding,
    force_rebuild: bool,
) -> Vec<ShaderHandle> {
    use pyrite_core::device::PipelineKind;

    let mut shaders = Vec::with_capacity(2);
    if descriptor.pipeline_kind == PipelineKind::Compute {
        if let Some(name) = &binding.compute_shader {
            shaders.push(shader_cache.get_or_upload_stage(ShaderStage::Compute, name, force_rebuild));
        }
        return shaders;
    }

    if let Some(name) = &binding.vertex_shader {
        shaders.push(shader_cache.get_or_upload_stage(ShaderStage::Vertex, name, force_rebuild));
    }
    if let Some(name) = &binding.tesselation_control_shader {
        shaders.push(shader_cache.get_or_upload_stage(
            ShaderStage::TesselationControl,
            name,
            force_rebuild,
        ));
    }
    if let Some(name) = &binding.tesselation_evaluation_shader {
        shaders.push(shader_cache.get_or_upload_stage(
            ShaderStage::TesselationEvaluation,
            name,
            force_rebuild,
        ));
    }
    if let Some(name) = &binding.pixel_shader {
        shaders.push(shader_cache.get_or_upload_stage(ShaderStage::Pixel, name, force_rebuild));
    }
    shaders
}

/// Parallel `hashes[]`/`states[]` arrays, plus the `DisablePipelineCache`
/// toggle (default `true`) that governs whether the on-disk blob cache
/// under `GameData/cache/` is consulted at all. One instance is meant to be
/// owned per worker, which holds its own pipeline-state cache, so it
/// requires no internal synchronization.
pub struct PipelineStateCache<D: Device, F: Filesystem> {
    device: D,
    filesystem: F,
    shader_cache: ShaderCache<D, F>,
    disable_pipeline_cache: bool,
    hashes: Vec<Hash128>,
    states: Vec<PipelineStateHandle>,
}

impl<D: Device + Clone, F: Filesystem + Clone> PipelineStateCache<D, F> {
    pub fn new(
        device: D,
        filesystem: F,
        backend_dir: ShaderBackendDir,
        disable_pipeline_cache: bool,
        fallback_vertex_hash: &str,
        fallback_pixel_hash: &str,
        fallback_compute_hash: &str,
    ) -> Self {
        let shader_cache = ShaderCache::new(
            device.clone(),
            filesystem.clone(),
            backend_dir,
            fallback_vertex_hash,
            fallback_pixel_hash,
            fallback_compute_hash,
        );
        PipelineStateCache {
            device,
            filesystem,
            shader_cache,
            disable_pipeline_cache,
            hashes: Vec::with_capacity(MAX_CACHE_ELEMENT_COUNT),
            states: Vec::with_capacity(MAX_CACHE_ELEMENT_COUNT),
        }
    }

    fn find(&self, key: Hash128) -> Option<usize> {
        self.hashes.iter().position(|&h| h == key)
    }

    fn blob_path(digest: &str) -> String {
        format!("GameData/cache/{}.bin", digest)
    }

    fn read_cached_blob(&self, digest: &str) -> Option<Vec<u8>> {
        let mut file = self
            .filesystem
            .open(&Self::blob_path(digest), FileOpenMode::READ | FileOpenMode::BINARY)
            .ok()?;
        let mut size_bytes = [0u8; 4];
        if file.read_exact(&mut size_bytes).is_err() {
            file.close();
            return None;
        }
        let size = u32::from_le_bytes(size_bytes) as usize;
        let mut bytes = vec![0u8; size];
        if file.read_exact(&mut bytes).is_err() {
            file.close();
            return None;
        }
        file.close();
        Some(bytes)
    }

    fn write_blob(&self, digest: &str, bytes: &[u8]) -> Result<(), CacheError> {
        let mut file = self
            .filesystem
            .open(&Self::blob_path(digest), FileOpenMode::WRITE | FileOpenMode::BINARY)?;
        file.write_all(&(bytes.len() as u32).to_le_bytes())
            .map_err(|e| CacheError::CorruptBlob {
                path: Self::blob_path(digest),
                reason: e.to_string(),
            })?;
        file.write_all(bytes).map_err(|e| CacheError::CorruptBlob {
            path: Self::blob_path(digest),
            reason: e.to_string(),
        })?;
        file.close();
        Ok(())
    }

    /// `getOrCreatePipelineState`: linear-probes the cache, resolves
    /// shaders through the embedded `ShaderCache`, consults (and on a cold
    /// build, populates) the on-disk blob cache, then asks the Device to
    /// create the pipeline state.
    pub fn get_or_create(
        &mut self,
        descriptor: PipelineDescriptor,
        binding: &ShaderBinding,
        force_rebuild: bool,
    ) -> Result<PipelineStateHandle, CacheError> {
        let key = compute_pipeline_state_key(&descriptor);
        let existing_index = self.find(key);

        if let Some(index) = existing_index {
            if !force_rebuild {
                return Ok(self.states[index]);
            }
        }

        let shaders = resolve_shaders(&self.shader_cache, &descriptor, binding, force_rebuild);

        let digest = format_digest_hex(key);
        let (cached_blob, is_cached) = if self.disable_pipeline_cache {
            (None, true)
        } else {
            match self.read_cached_blob(&digest) {
                Some(blob) => (Some(blob), true),
                None => (None, false),
            }
        };

        let pipeline = self
            .device
            .create_pipeline_state(&descriptor, &shaders, cached_blob.as_deref())?;

        if !is_cached {
            log::info!("Missing PSO cache '{}'! Building cache...", digest);
            if let Some(blob) = self.device.get_pipeline_state_cache(pipeline) {
                if let Err(err) = self.write_blob(&digest, &blob.bytes) {
                    log::warn!("'{}': failed to persist PSO cache blob: {}", digest, err);
                }
            }
            self.device.destroy_pipeline_state_cache(pipeline);
        }

        match existing_index {
            Some(index) => {
                self.device.destroy_pipeline_state(self.states[index]);
                self.hashes[index] = key;
                self.states[index] = pipeline;
            }
            None => {
                assert!(
                    self.states.len() < MAX_CACHE_ELEMENT_COUNT,
                    "pipeline-state cache is full ({} entries)",
                    MAX_CACHE_ELEMENT_COUNT
                );
                self.hashes.push(key);
                self.states.push(pipeline);
            }
        }

        Ok(pipeline)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
