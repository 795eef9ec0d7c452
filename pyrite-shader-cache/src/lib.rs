//! The shader cache: loads precompiled shader blobs from the
//! virtual filesystem and deduplicates them by file hash, guarded by a
//! single atomic lock rather than a kernel mutex — the hashmap is protected
//! by a single atomic "lock" boolean; mutators CAS `false -> true`, do
//! their work, then store `false`.
//! Grounded method-for-method on `Dusk/Graphics/ShaderCache.cpp`'s
//! `getOrUploadStage`/`getOrUploadStageDynamic`/`canAccessCache`.

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};

use pyrite_core::device::{Device, ShaderHandle, ShaderStage};
use pyrite_core::filesystem::{FileOpenMode, Filesystem, FsObject};
use pyrite_core::hash::{format_digest_hex, murmur3_x64_128, string_hash32};

/// Seed a decorated permutation name (`{name}{stage_suffix}`) is hashed with
/// to derive the on-disk filename digest `getOrUploadStageDynamic` resolves
/// to, shared with the generator's own `SHADER_FILENAME_SEED`.
pub const SHADER_FILENAME_SEED: u32 = 19_081_996;

/// Sentinel returned for a stage with no fallback (tessellation control and
/// evaluation, matching the original's `default: return nullptr;` arm).
const INVALID_SHADER: ShaderHandle = ShaderHandle(u64::MAX);

fn stage_suffix(stage: ShaderStage) -> &'static str {
    match stage {
        ShaderStage::Vertex => "vertex",
        ShaderStage::TesselationControl => "tesselationControl",
        ShaderStage::TesselationEvaluation => "tesselationEvaluation",
        ShaderStage::Pixel => "pixel",
        ShaderStage::Compute => "compute",
    }
}

/// Backend-specific precompiled-blob subdirectory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderBackendDir {
    Spirv,
    Sm5,
    Sm6,
}

impl ShaderBackendDir {
    fn path_prefix(self) -> &'static str {
        match self {
            ShaderBackendDir::Spirv => "spirv",
            ShaderBackendDir::Sm5 => "sm5",
            ShaderBackendDir::Sm6 => "sm6",
        }
    }
}

/// Cache of `{file hash -> shader handle}` entries. Exposes
/// `&self` methods so multiple workers can share one instance the way the
/// original's `ShaderCache` is shared across render-thread workers; the one
/// piece of actual mutable state (`cache`) lives behind an `UnsafeCell`
/// whose access is serialized entirely by `cache_lock`'s CAS guard, not by
/// the borrow checker — the same externally-synchronized-unsafe-cell
/// pattern `amethyst-rendy/graph`'s `Bump` allocator uses for its own
/// manually-guarded shared state.
pub struct ShaderCache<D: Device, F: Filesystem> {
    device: D,
    filesystem: F,
    backend_dir: ShaderBackendDir,
    cache: UnsafeCell<HashMap<u32, ShaderHandle>>,
    cache_lock: AtomicBool,
    default_vertex: ShaderHandle,
    default_pixel: ShaderHandle,
    default_compute: ShaderHandle,
}

/// Safety: every access to `cache` happens inside `with_cache_locked`, which
/// holds `cache_lock` acquired for the duration of the closure. As long as
/// callers never bypass that method, concurrent `&self` access is sound.
unsafe impl<D: Device + Sync, F: Filesystem + Sync> Sync for ShaderCache<D, F> {}

impl<D: Device, F: Filesystem> ShaderCache<D, F> {
    /// Constructs the cache and eagerly loads the three fallback shaders —
    /// a fallback shader (one per stage) returned on a missing file; there
    /// is no tessellation-stage fallback, matching the original.
    pub fn new(
        device: D,
        filesystem: F,
        backend_dir: ShaderBackendDir,
        fallback_vertex_hash: &str,
        fallback_pixel_hash: &str,
        fallback_compute_hash: &str,
    ) -> Self {
        log::info!("Loading default shaders...");

        let mut cache = ShaderCache {
            device,
            filesystem,
            backend_dir,
            cache: UnsafeCell::new(HashMap::new()),
            cache_lock: AtomicBool::new(false),
            default_vertex: INVALID_SHADER,
            default_pixel: INVALID_SHADER,
            default_compute: INVALID_SHADER,
        };

        cache.default_vertex =
            cache.get_or_upload_stage(ShaderStage::Vertex, fallback_vertex_hash, false);
        cache.default_pixel =
            cache.get_or_upload_stage(ShaderStage::Pixel, fallback_pixel_hash, false);
        cache.default_compute =
            cache.get_or_upload_stage(ShaderStage::Compute, fallback_compute_hash, false);

        cache
    }

    fn fallback_for(&self, stage: ShaderStage) -> ShaderHandle {
        match stage {
            ShaderStage::Vertex => self.default_vertex,
            ShaderStage::Pixel => self.default_pixel,
            ShaderStage::Compute => self.default_compute,
            ShaderStage::TesselationControl | ShaderStage::TesselationEvaluation => INVALID_SHADER,
        }
    }

    /// `canAccessCache`: confirms the lock currently reads unlocked without
    /// changing it (a `false -> false` CAS), used as the spin condition.
    fn can_access_cache(&self) -> bool {
        self.cache_lock
            .compare_exchange(false, false, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn acquire_lock(&self) {
        loop {
            while !self.can_access_cache() {
                std::thread::yield_now();
            }
            if self
                .cache_lock
                .compare_exchange_weak(false, true, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return;
            }
        }
    }

    fn release_lock(&self) {
        self.cache_lock.store(false, Ordering::Release);
    }

    fn with_cache_locked<R>(&self, f: impl FnOnce(&mut HashMap<u32, ShaderHandle>) -> R) -> R {
        self.acquire_lock();
        let result = unsafe { f(&mut *self.cache.get()) };
        self.release_lock();
        result
    }

    /// `getOrUploadStage<Stage>`: resolves `hash_or_path` under this cache's
    /// backend directory, returning the cached handle on a repeat request,
    /// the stage's fallback on a missing file, and re-creating the shader
    /// when `force_reload` is set.
    pub fn get_or_upload_stage(
        &self,
        stage: ShaderStage,
        hash_or_path: &str,
        force_reload: bool,
    ) -> ShaderHandle {
        let path = format!(
            "GameData/shaders/{}/{}",
            self.backend_dir.path_prefix(),
            hash_or_path
        );

        let mut file = match self
            .filesystem
            .open(&path, FileOpenMode::READ | FileOpenMode::BINARY)
        {
            Ok(file) => file,
            Err(_) => {
                log::error!("'{}': file does not exist!", hash_or_path);
                return self.fallback_for(stage);
            }
        };

        let file_hash = string_hash32(hash_or_path);

        self.with_cache_locked(|cache| {
            if let Some(&existing) = cache.get(&file_hash) {
                if !force_reload {
                    file.close();
                    return existing;
                }
                log::warn!("'{}': force-reloading a cached shader", hash_or_path);
                self.device.destroy_shader(existing);
                cache.remove(&file_hash);
            }

            let mut bytes = Vec::with_capacity(file.size() as usize);
            if let Err(err) = file.read_to_end(&mut bytes) {
                log::error!(
                    "'{}': failed to read precompiled blob: {}",
                    hash_or_path,
                    err
                );
                file.close();
                return self.fallback_for(stage);
            }
            file.close();

            let handle = match self.device.create_shader(stage, &bytes) {
                Ok(handle) => handle,
                Err(err) => {
                    log::error!(
                        "'{}': device rejected the precompiled blob: {}",
                        hash_or_path,
                        err
                    );
                    return self.fallback_for(stage);
                }
            };
            cache.insert(file_hash, handle);
            handle
        })
    }

    /// `getOrUploadStageDynamic`: hashes a runtime-generated permutation
    /// name (decorated with the stage suffix, the same convention the
    /// generator uses for its own filenames) and resolves it the same way
    /// as `get_or_upload_stage`.
    pub fn get_or_upload_stage_dynamic(
        &self,
        stage: ShaderStage,
        name_with_permutation_flags: &str,
        force_reload: bool,
    ) -> ShaderHandle {
        let mut decorated = name_with_permutation_flags.to_string();
        decorated.push_str(stage_suffix(stage));
        let digest = murmur3_x64_128(decorated.as_bytes(), SHADER_FILENAME_SEED);
        let filename = format_digest_hex(digest);
        self.get_or_upload_stage(stage, &filename, force_reload)
    }
}
