//! Material runtime: the render-scenario pipeline bindings, fixed flag set
//! and mutable per-instance parameter map a `material` block authored in the
//! render-library language deserializes into. Grounded method-for-method on
//! `Dusk/Graphics/Material.h`/`.cpp`: `deserialize` walks the same render
//! scenario / mutable-parameter shape, and `bind_for_scenario` synthesizes
//! the same fixed-function state split between the four `Default*`
//! scenarios and `DepthOnly`.

use std::collections::HashMap;
use std::io::Read;

use bitflags::bitflags;

use pyrite_core::device::{CommandList, Device, ImageHandle, PipelineDescriptor, PipelineKind};
use pyrite_core::error::{CacheError, CoreError};
use pyrite_core::filesystem::FsObject;
use pyrite_core::hash::string_hash32;
use pyrite_pso_cache::{PipelineStateCache, ShaderBinding};
use pyrite_rlib::{ast, NodeKind, Parser, TypeAst};

/// Fixed bound on per-layer material variant tables. Carried over from the
/// original material runtime; this workspace's render scenarios are not
/// layer-indexed, so nothing here multiplies by it yet.
pub const MAX_LAYER_COUNT: i32 = 4;

/// The five ways a material can be bound to a command list. Picking variants
/// are editor-only (UAV picking-buffer writes); `Count` is deliberately not
/// modeled since nothing ever binds "every scenario".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderScenario {
    /// World geometry, forward+ light pass.
    Default,
    /// `Default`, but parameters may be edited live (a material-editor cost).
    DefaultEditor,
    /// `Default` with the picking UAV write enabled.
    DefaultPicking,
    /// `DefaultEditor` with the picking UAV write enabled.
    DefaultPickingEditor,
    /// Depth prepass / shadow capture. Outputs non-linear depth.
    DepthOnly,
}

const RENDER_SCENARIO_COUNT: usize = 5;

fn scenario_index(scenario: RenderScenario) -> usize {
    match scenario {
        RenderScenario::Default => 0,
        RenderScenario::DefaultEditor => 1,
        RenderScenario::DefaultPicking => 2,
        RenderScenario::DefaultPickingEditor => 3,
        RenderScenario::DepthOnly => 4,
    }
}

bitflags! {
    /// One bit per boolean the render-library `material` block can set.
    /// `invalidate_cached_states` is tracked separately since it is a
    /// one-shot dirty flag the bind call clears, not an authored property.
    #[derive(Default)]
    pub struct MaterialFlags: u8 {
        const IS_ALPHA_BLENDED         = 0b0000_0001;
        const IS_DOUBLE_FACE           = 0b0000_0010;
        const ENABLE_ALPHA_TO_COVERAGE = 0b0000_0100;
        const IS_ALPHA_TESTED          = 0b0000_1000;
        const IS_WIREFRAME             = 0b0001_0000;
        const IS_SHADELESS             = 0b0010_0000;
    }
}

/// The shader names and resolved `ShaderBinding` for one render scenario.
#[derive(Debug, Clone, Default)]
pub struct RenderScenarioBinding {
    pub vertex_stage: String,
    pub pixel_stage: String,
    pub shader_binding: ShaderBinding,
}

/// A mutable parameter's current value. The DSL never spells out a type for
/// a parameter entry, so the parser classifies it from the authored value's
/// shape: `{x, y, z}` is a `Float3`, anything else is a texture path.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Float3([f32; 3]),
    Texture2D {
        path: String,
        cached_image: Option<ImageHandle>,
    },
}

#[derive(Debug, Clone)]
struct MutableParameter {
    value: ParameterValue,
}

/// The asset-resolution seam `update_resource_streaming` consults to turn a
/// mutable parameter's authored texture path into a device image handle.
/// The original forward-declares `GraphicsAssetCache` without defining it in
/// this material runtime's own files; this trait is that same seam.
pub trait GraphicsAssetCache {
    fn get_image(&self, path: &str) -> Option<ImageHandle>;
}

/// One authored material: a name, a fixed flag set, up to five render
/// scenario bindings, and a hash-keyed map of per-instance mutable
/// parameter overrides.
#[derive(Debug, Clone)]
pub struct Material {
    name: String,
    flags: MaterialFlags,
    invalidate_cached_states: bool,
    scenarios: [RenderScenarioBinding; RENDER_SCENARIO_COUNT],
    mutable_parameters: HashMap<u32, MutableParameter>,
}

impl Default for Material {
    fn default() -> Self {
        Material {
            name: String::new(),
            flags: MaterialFlags::empty(),
            invalidate_cached_states: false,
            scenarios: Default::default(),
            mutable_parameters: HashMap::new(),
        }
    }
}

impl Material {
    pub fn new() -> Self {
        Material::default()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Loads and parses `object`'s contents as a render-library `material`
    /// block, populating flags, render-scenario bindings and mutable
    /// parameters. Any other top-level declaration in the same file (a
    /// `struct`, a `lib`, ...) is ignored; only the first `material` node
    /// is read.
    pub fn deserialize<O: FsObject>(&mut self, object: &mut O) -> Result<(), CoreError> {
        let mut text = String::new();
        object.read_to_string(&mut text).map_err(|e| CoreError::FileOpen {
            path: self.name.clone(),
            reason: e.to_string(),
        })?;
        object.close();

        let mut parser = Parser::new(&text);
        let root = parser.generate_ast();

        let material_id = match parser.nodes()[root as usize].find_child_by_kind(parser.nodes(), NodeKind::Material) {
            Some(id) => id,
            None => return Ok(()),
        };

        let source = parser.source();
        let nodes = parser.nodes();
        let material_node = &nodes[material_id as usize];
        self.name = strip_quotes(material_node.source_name().resolve(source));

        for i in 0..material_node.names.len() {
            let child_id = material_node.child_types[i];
            if child_id == ast::NO_TYPE {
                let key = material_node.names[i].resolve(source);
                let value = material_node.values[i].resolve(source).trim();
                self.apply_flag(key, value);
                continue;
            }

            let child = &nodes[child_id as usize];
            match child.kind {
                NodeKind::ShaderPermutation => {
                    let scenario_name = strip_quotes(child.source_name().resolve(source));
                    self.apply_scenario(&scenario_name, child, source);
                }
                NodeKind::MaterialParameter => self.apply_parameters(child, source),
                _ => {}
            }
        }

        Ok(())
    }

    fn apply_flag(&mut self, name: &str, value: &str) {
        let truthy = value == "true" || value == "1";
        match name {
            "version" => {}
            "isAlphaBlended" => self.flags.set(MaterialFlags::IS_ALPHA_BLENDED, truthy),
            "isDoubleFace" => self.flags.set(MaterialFlags::IS_DOUBLE_FACE, truthy),
            "enableAlphaToCoverage" => self.flags.set(MaterialFlags::ENABLE_ALPHA_TO_COVERAGE, truthy),
            "isAlphaTested" => self.flags.set(MaterialFlags::IS_ALPHA_TESTED, truthy),
            "isWireframe" => self.flags.set(MaterialFlags::IS_WIREFRAME, truthy),
            "isShadeless" => self.flags.set(MaterialFlags::IS_SHADELESS, truthy),
            _ => log::warn!("material '{}': unknown flag '{}'", self.name, name),
        }
    }

    fn apply_scenario(&mut self, scenario_name: &str, node: &TypeAst, source: &str) {
        let scenario = match scenario_name {
            "Default" => RenderScenario::Default,
            "DefaultEditor" => RenderScenario::DefaultEditor,
            "DefaultPicking" => RenderScenario::DefaultPicking,
            "DefaultPickingEditor" => RenderScenario::DefaultPickingEditor,
            "DepthOnly" => RenderScenario::DepthOnly,
            _ => {
                log::warn!("material '{}': unknown render scenario '{}'", self.name, scenario_name);
                return;
            }
        };

        let mut binding = RenderScenarioBinding::default();
        for i in 0..node.names.len() {
            let key = node.names[i].resolve(source);
            let value = strip_quotes(node.values[i].resolve(source).trim());
            match key {
                "vertex" => binding.vertex_stage = value,
                "pixel" => binding.pixel_stage = value,
                _ => {}
            }
        }
        binding.shader_binding = ShaderBinding {
            vertex_shader: non_empty(&binding.vertex_stage),
            pixel_shader: non_empty(&binding.pixel_stage),
            ..Default::default()
        };

        self.scenarios[scenario_index(scenario)] = binding;
    }

    fn apply_parameters(&mut self, node: &TypeAst, source: &str) {
        for i in 0..node.names.len() {
            let name = node.names[i].resolve(source);
            let key = string_hash32(name);
            let raw = node.values[i].resolve(source).trim();

            let value = if raw.starts_with('{') && raw.ends_with('}') {
                ParameterValue::Float3(parse_float3(raw))
            } else {
                ParameterValue::Texture2D {
                    path: strip_quotes(raw),
                    cached_image: None,
                }
            };
            self.mutable_parameters.insert(key, MutableParameter { value });
        }
    }

    /// Is `parameter_hashcode` a declared mutable parameter on this
    /// material (i.e. can it be changed at runtime)?
    pub fn is_parameter_mutable(&self, parameter_hashcode: u32) -> bool {
        self.mutable_parameters.contains_key(&parameter_hashcode)
    }

    /// Forces a full pipeline-state/resource rebuild on the next
    /// `bind_for_scenario` call. Slow — call only when a material is being
    /// actively edited.
    pub fn invalidate_cache(&mut self) {
        self.invalidate_cached_states = true;
    }

    /// Resolves every `Texture2D` mutable parameter's authored path through
    /// `asset_cache`, caching the resulting handle for `bind_for_scenario`
    /// to bind.
    pub fn update_resource_streaming(&mut self, asset_cache: &impl GraphicsAssetCache) {
        for param in self.mutable_parameters.values_mut() {
            if let ParameterValue::Texture2D { path, cached_image } = &mut param.value {
                *cached_image = asset_cache.get_image(path);
            }
        }
    }

    pub fn set_parameter_as_texture_2d(&mut self, parameter_hashcode: u32, image_path: String) {
        self.mutable_parameters.insert(
            parameter_hashcode,
            MutableParameter {
                value: ParameterValue::Texture2D {
                    path: image_path,
                    cached_image: None,
                },
            },
        );
    }

    /// True if this material skips the lighting pass (is shadeless).
    pub fn skip_lighting(&self) -> bool {
        self.flags.contains(MaterialFlags::IS_SHADELESS)
    }

    /// True if this material is a shadow emitter. Every material casts a
    /// shadow for now — there is no authored opt-out yet.
    pub fn cast_shadow(&self) -> bool {
        true
    }

    fn descriptor_for(&self, scenario: RenderScenario, sampler_count: u32) -> PipelineDescriptor {
        let binding = &self.scenarios[scenario_index(scenario)];
        PipelineDescriptor {
            pipeline_kind: PipelineKind::Graphics,
            shader_name_hashes: [
                string_hash32(&binding.vertex_stage),
                0,
                0,
                string_hash32(&binding.pixel_stage),
                0,
            ],
            rasterizer_key: pack_rasterizer_key(
                self.flags.contains(MaterialFlags::IS_DOUBLE_FACE),
                self.flags.contains(MaterialFlags::IS_WIREFRAME),
                sampler_count,
            ),
            depth_stencil_key: pack_depth_stencil_key(scenario),
            blend_key: pack_blend_key(
                self.flags.contains(MaterialFlags::IS_ALPHA_BLENDED),
                self.flags.contains(MaterialFlags::ENABLE_ALPHA_TO_COVERAGE),
            ),
            color_rt_count: color_rt_count(scenario),
        }
    }

    /// Binds this material's pipeline state for `scenario` and lazily binds
    /// every resolved `Texture2D` mutable parameter by its parameter hash
    /// (the same hash `bindImage` was keyed on in the original — there is
    /// no sequential slot assignment here). Clears the invalidate-cache
    /// dirty bit once the rebuild it requested has happened.
    ///
    /// Every material-originated pipeline also always declares the fixed
    /// three-entry input layout (`POSITION`, `NORMAL`, `TEXCOORD`) and, for
    /// the `Default*` scenarios, two static samplers (bilinear wrap,
    /// trilinear comparison clamp) — neither has a field on this
    /// workspace's `PipelineDescriptor`, so both are documented invariants
    /// of the backend contract rather than encoded bits.
    pub fn bind_for_scenario<D: Device + Clone, F: pyrite_core::filesystem::Filesystem + Clone>(
        &mut self,
        scenario: RenderScenario,
        cmd_list: &mut D::CommandList,
        pso_cache: &mut PipelineStateCache<D, F>,
        sampler_count: u32,
    ) -> Result<(), CacheError> {
        let descriptor = self.descriptor_for(scenario, sampler_count);
        let shader_binding = self.scenarios[scenario_index(scenario)].shader_binding.clone();

        let pipeline = pso_cache.get_or_create(descriptor, &shader_binding, self.invalidate_cached_states)?;
        self.invalidate_cached_states = false;

        cmd_list.bind_pipeline_state(pipeline);

        for (&hash, param) in &self.mutable_parameters {
            if let ParameterValue::Texture2D { cached_image: Some(image), .. } = &param.value {
                cmd_list.bind_image(hash, *image);
            }
        }

        Ok(())
    }
}

/// `DefaultPipelineState.RasterizerState`: cull-mode bit 0 (double-faced ⇒
/// no culling), fill-mode bit 1 (wireframe), sampler count in the remaining
/// bits — `PipelineDescriptor` has no dedicated field for either, so both
/// fold into the rasterizer sort key alongside cull/fill.
fn pack_rasterizer_key(double_face: bool, wireframe: bool, sampler_count: u32) -> u32 {
    let cull = u32::from(!double_face);
    let fill = u32::from(wireframe) << 1;
    (sampler_count << 2) | fill | cull
}

/// `DepthStencilState`: every `Default*` scenario reads depth without
/// writing it (`COMPARISON_FUNCTION_EQUAL`, forward+ light pass redraws
/// over a populated depth buffer); `DepthOnly` writes depth with a
/// `COMPARISON_FUNCTION_GREATER` test (reverse-Z depth prepass).
fn pack_depth_stencil_key(scenario: RenderScenario) -> u32 {
    const WRITE: u32 = 0b001;
    const TEST: u32 = 0b010;
    const CMP_GREATER: u32 = 0b100;
    match scenario {
        RenderScenario::DepthOnly => WRITE | TEST | CMP_GREATER,
        _ => TEST,
    }
}

fn pack_blend_key(alpha_blended: bool, alpha_to_coverage: bool) -> u32 {
    u32::from(alpha_blended) | (u32::from(alpha_to_coverage) << 1)
}

/// `DepthOnly` declares two render targets (depth + linear-depth derivative)
/// plus its depth-stencil view; every `Default*` scenario declares one
/// color render target plus its depth-stencil view.
fn color_rt_count(scenario: RenderScenario) -> u32 {
    match scenario {
        RenderScenario::DepthOnly => 2,
        _ => 1,
    }
}

fn strip_quotes(s: &str) -> String {
    s.trim().trim_matches('"').to_string()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_float3(s: &str) -> [f32; 3] {
    let nums: Vec<f32> = s
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}')
        .split(',')
        .map(|p| p.trim().parse().unwrap_or(0.0))
        .collect();
    [
        nums.first().copied().unwrap_or(0.0),
        nums.get(1).copied().unwrap_or(0.0),
        nums.get(2).copied().unwrap_or(0.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrite_core::device::{
        BufferDesc, BufferHandle, ImageDesc, ImageViewDesc, ImageViewFlags, PipelineStateBlob,
        PipelineStateHandle, SamplerDesc, SamplerHandle, ShaderHandle, ShaderStage,
    };
    use pyrite_core::error::DeviceError;
    use pyrite_core::filesystem::{FileOpenMode, Filesystem};
    use pyrite_pso_cache::compute_pipeline_state_key;
    use pyrite_shader_cache::ShaderBackendDir;
    use std::cell::RefCell;
    use std::io::{Cursor, Seek, SeekFrom, Write};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn material_source() -> &'static str {
        r#"
            material "Rock" {
                isDoubleFace = true;
                isAlphaTested = true;
                parameters {
                    Albedo = "textures/rock_albedo.dds";
                    Tint = { 1.0, 0.5, 0.25 };
                }
                scenario "Default" { vertex = "Std"; pixel = "Rock"; }
                scenario "DepthOnly" { vertex = "StdDepth"; pixel = "RockDepth"; }
            }
        "#
    }

    struct StringObject {
        cursor: Cursor<Vec<u8>>,
    }
    impl StringObject {
        fn new(text: &str) -> Self {
            StringObject {
                cursor: Cursor::new(text.as_bytes().to_vec()),
            }
        }
    }
    impl Read for StringObject {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.cursor.read(buf)
        }
    }
    impl Write for StringObject {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.cursor.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.cursor.flush()
        }
    }
    impl Seek for StringObject {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.cursor.seek(pos)
        }
    }
    impl FsObject for StringObject {
        fn size(&self) -> u64 {
            self.cursor.get_ref().len() as u64
        }
        fn close(&mut self) {}
    }

    fn deserialized() -> Material {
        let mut material = Material::new();
        let mut object = StringObject::new(material_source());
        material.deserialize(&mut object).unwrap();
        material
    }

    #[test]
    fn deserialize_reads_name_and_flags() {
        let material = deserialized();
        assert_eq!(material.name(), "Rock");
        assert!(material.flags.contains(MaterialFlags::IS_DOUBLE_FACE));
        assert!(material.flags.contains(MaterialFlags::IS_ALPHA_TESTED));
        assert!(!material.flags.contains(MaterialFlags::IS_ALPHA_BLENDED));
    }

    #[test]
    fn deserialize_reads_render_scenario_bindings() {
        let material = deserialized();
        let default_scenario = &material.scenarios[scenario_index(RenderScenario::Default)];
        assert_eq!(default_scenario.vertex_stage, "Std");
        assert_eq!(default_scenario.pixel_stage, "Rock");

        let depth_only = &material.scenarios[scenario_index(RenderScenario::DepthOnly)];
        assert_eq!(depth_only.vertex_stage, "StdDepth");
        assert_eq!(depth_only.pixel_stage, "RockDepth");
    }

    #[test]
    fn deserialize_classifies_mutable_parameters_by_value_shape() {
        let material = deserialized();
        let albedo_hash = string_hash32("Albedo");
        let tint_hash = string_hash32("Tint");

        assert!(material.is_parameter_mutable(albedo_hash));
        assert!(material.is_parameter_mutable(tint_hash));
        assert!(!material.is_parameter_mutable(string_hash32("NotDeclared")));

        match &material.mutable_parameters[&albedo_hash].value {
            ParameterValue::Texture2D { path, cached_image } => {
                assert_eq!(path, "textures/rock_albedo.dds");
                assert!(cached_image.is_none());
            }
            other => panic!("expected a Texture2D parameter, got {:?}", other),
        }

        match &material.mutable_parameters[&tint_hash].value {
            ParameterValue::Float3(v) => assert_eq!(*v, [1.0, 0.5, 0.25]),
            other => panic!("expected a Float3 parameter, got {:?}", other),
        }
    }

    #[test]
    fn depth_only_scenario_uses_two_render_targets_and_a_stricter_depth_test() {
        let material = deserialized();
        let default_desc = material.descriptor_for(RenderScenario::Default, 1);
        let depth_only_desc = material.descriptor_for(RenderScenario::DepthOnly, 1);

        assert_eq!(default_desc.color_rt_count, 1);
        assert_eq!(depth_only_desc.color_rt_count, 2);
        assert_ne!(default_desc.depth_stencil_key, depth_only_desc.depth_stencil_key);
    }

    #[test]
    fn double_face_flag_clears_the_cull_bit_in_the_rasterizer_key() {
        let mut material = deserialized();
        let culled = material.descriptor_for(RenderScenario::Default, 1).rasterizer_key;

        material.flags.remove(MaterialFlags::IS_DOUBLE_FACE);
        let not_double_faced = material.descriptor_for(RenderScenario::Default, 1).rasterizer_key;
        assert_ne!(culled, not_double_faced);
    }

    #[test]
    fn skip_lighting_reflects_is_shadeless_flag() {
        let mut material = Material::new();
        assert!(!material.skip_lighting());
        material.flags.insert(MaterialFlags::IS_SHADELESS);
        assert!(material.skip_lighting());
    }

    #[test]
    fn cast_shadow_is_always_true() {
        assert!(Material::new().cast_shadow());
    }

    #[test]
    fn set_parameter_as_texture_2d_then_streaming_resolves_cached_image() {
        struct FakeAssetCache;
        impl GraphicsAssetCache for FakeAssetCache {
            fn get_image(&self, path: &str) -> Option<ImageHandle> {
                if path == "textures/new_albedo.dds" {
                    Some(ImageHandle(7))
                } else {
                    None
                }
            }
        }

        let mut material = Material::new();
        let hash = string_hash32("Albedo");
        material.set_parameter_as_texture_2d(hash, "textures/new_albedo.dds".to_string());
        assert!(material.is_parameter_mutable(hash));

        material.update_resource_streaming(&FakeAssetCache);
        match &material.mutable_parameters[&hash].value {
            ParameterValue::Texture2D { cached_image, .. } => {
                assert_eq!(*cached_image, Some(ImageHandle(7)));
            }
            other => panic!("expected a Texture2D parameter, got {:?}", other),
        }
    }

    #[derive(Clone)]
    struct MockCommandList {
        bound_pipeline: Rc<RefCell<Option<PipelineStateHandle>>>,
        bound_images: Rc<RefCell<Vec<(u32, ImageHandle)>>>,
    }
    impl MockCommandList {
        fn new() -> Self {
            MockCommandList {
                bound_pipeline: Rc::new(RefCell::new(None)),
                bound_images: Rc::new(RefCell::new(Vec::new())),
            }
        }
    }
    impl CommandList for MockCommandList {
        fn begin(&mut self) {}
        fn end(&mut self) {}
        fn bind_pipeline_state(&mut self, pipeline: PipelineStateHandle) {
            *self.bound_pipeline.borrow_mut() = Some(pipeline);
        }
        fn bind_image(&mut self, slot: u32, image: ImageHandle) {
            self.bound_images.borrow_mut().push((slot, image));
        }
        fn bind_buffer(&mut self, _slot: u32, _buffer: BufferHandle) {}
        fn bind_sampler(&mut self, _slot: u32, _sampler: SamplerHandle) {}
        fn bind_constant_buffer(&mut self, _slot: u32, _buffer: BufferHandle) {}
        fn set_viewport(&mut self, _x: f32, _y: f32, _w: f32, _h: f32) {}
        fn set_scissor(&mut self, _x: i32, _y: i32, _w: u32, _h: u32) {}
        fn draw(&mut self, _vertex_count: u32, _instance_count: u32, _first_vertex: u32) {}
        fn draw_indexed(&mut self, _index_count: u32, _instance_count: u32, _first_index: u32) {}
        fn dispatch(&mut self, _x: u32, _y: u32, _z: u32) {}
        fn push_event_marker(&mut self, _name: &str) {}
        fn pop_event_marker(&mut self) {}
        fn setup_framebuffer(&mut self, _color_rts: &[ImageHandle], _depth_stencil: Option<ImageHandle>) {}
        fn clear_render_targets(&mut self, _color_rts: &[ImageHandle], _value: [f32; 4]) {}
        fn clear_depth_stencil(&mut self, _depth_stencil: ImageHandle, _depth: f32, _stencil: u8) {}
        fn prepare_and_bind_resource_list(&mut self, _images: &[ImageHandle], _buffers: &[BufferHandle]) {}
        fn multi_draw_indexed_instanced_indirect(&mut self, _args_buffer: BufferHandle, _draw_count: u32) {}
    }

    #[derive(Clone)]
    struct MockDevice {
        next_handle: Rc<AtomicU64>,
    }
    impl MockDevice {
        fn new() -> Self {
            MockDevice {
                next_handle: Rc::new(AtomicU64::new(1)),
            }
        }
        fn alloc(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed)
        }
    }
    impl Device for MockDevice {
        type CommandList = MockCommandList;

        fn create_buffer(&self, _desc: &BufferDesc) -> Result<BufferHandle, DeviceError> {
            unimplemented!()
        }
        fn destroy_buffer(&self, _buffer: BufferHandle) {}
        fn update_buffer(&self, _buffer: BufferHandle, _offset: u64, _data: &[u8]) {}

        fn create_image(&self, _desc: &ImageDesc) -> Result<ImageHandle, DeviceError> {
            unimplemented!()
        }
        fn destroy_image(&self, _image: ImageHandle) {}
        fn create_image_view(
            &self,
            _image: ImageHandle,
            _view_desc: &ImageViewDesc,
            _flags: ImageViewFlags,
        ) -> Result<(), DeviceError> {
            unimplemented!()
        }
        fn copy_image(&self, _src: ImageHandle, _dst: ImageHandle) {}
        fn resolve_image(&self, _src: ImageHandle, _dst: ImageHandle) {}

        fn create_sampler(&self, _desc: &SamplerDesc) -> Result<SamplerHandle, DeviceError> {
            unimplemented!()
        }
        fn destroy_sampler(&self, _sampler: SamplerHandle) {}

        fn create_shader(&self, _stage: ShaderStage, _bytecode: &[u8]) -> Result<ShaderHandle, DeviceError> {
            Ok(ShaderHandle(self.alloc()))
        }
        fn destroy_shader(&self, _shader: ShaderHandle) {}

        fn create_pipeline_state(
            &self,
            _descriptor: &PipelineDescriptor,
            _shaders: &[ShaderHandle],
            _cached_blob: Option<&[u8]>,
        ) -> Result<PipelineStateHandle, DeviceError> {
            Ok(PipelineStateHandle(self.alloc()))
        }
        fn get_pipeline_state_cache(&self, _pipeline: PipelineStateHandle) -> Option<PipelineStateBlob> {
            None
        }
        fn destroy_pipeline_state_cache(&self, _pipeline: PipelineStateHandle) {}
        fn destroy_pipeline_state(&self, _pipeline: PipelineStateHandle) {}

        fn allocate_graphics_command_list(&self) -> Self::CommandList {
            MockCommandList::new()
        }
        fn allocate_compute_command_list(&self) -> Self::CommandList {
            MockCommandList::new()
        }
        fn allocate_copy_command_list(&self) -> Self::CommandList {
            MockCommandList::new()
        }
        fn submit_command_list(&self, _list: Self::CommandList) {}
        fn submit_command_lists(&self, _lists: Vec<Self::CommandList>) {}

        fn get_swapchain_buffer(&self) -> ImageHandle {
            unimplemented!()
        }
        fn present(&self) {}
        fn resize_backbuffer(&self, _width: u32, _height: u32) {}
    }

    struct MockFsObject {
        cursor: Cursor<Vec<u8>>,
    }
    impl Read for MockFsObject {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.cursor.read(buf)
        }
    }
    impl Write for MockFsObject {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.cursor.write(buf)
        }
        fn flush(&mut self) -> std::io::Result<()> {
            self.cursor.flush()
        }
    }
    impl Seek for MockFsObject {
        fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
            self.cursor.seek(pos)
        }
    }
    impl FsObject for MockFsObject {
        fn size(&self) -> u64 {
            self.cursor.get_ref().len() as u64
        }
        fn close(&mut self) {}
    }

    #[derive(Clone)]
    struct MockFilesystem;
    impl Filesystem for MockFilesystem {
        type Object = MockFsObject;
        fn open(&self, _path: &str, _mode: FileOpenMode) -> Result<Self::Object, pyrite_core::error::CoreError> {
            Ok(MockFsObject {
                cursor: Cursor::new(Vec::new()),
            })
        }
    }

    fn pso_cache() -> PipelineStateCache<MockDevice, MockFilesystem> {
        PipelineStateCache::new(
            MockDevice::new(),
            MockFilesystem,
            ShaderBackendDir::Spirv,
            true,
            "fallback.vertex",
            "fallback.pixel",
            "fallback.compute",
        )
    }

    #[test]
    fn bind_for_scenario_binds_pipeline_and_resolved_textures() {
        let mut material = deserialized();
        let hash = string_hash32("Albedo");
        material.mutable_parameters.get_mut(&hash).unwrap().value = ParameterValue::Texture2D {
            path: "textures/rock_albedo.dds".to_string(),
            cached_image: Some(ImageHandle(42)),
        };
        material.invalidate_cache();

        let mut cache = pso_cache();
        let mut cmd_list = MockCommandList::new();
        material
            .bind_for_scenario(RenderScenario::Default, &mut cmd_list, &mut cache, 1)
            .unwrap();

        assert!(cmd_list.bound_pipeline.borrow().is_some());
        assert_eq!(*cmd_list.bound_images.borrow(), vec![(hash, ImageHandle(42))]);
        assert!(!material.invalidate_cached_states);
    }

    #[test]
    fn bind_for_scenario_does_not_bind_unresolved_texture_parameters() {
        let mut material = deserialized();
        let mut cache = pso_cache();
        let mut cmd_list = MockCommandList::new();
        material
            .bind_for_scenario(RenderScenario::Default, &mut cmd_list, &mut cache, 1)
            .unwrap();

        // Albedo was never resolved through `update_resource_streaming`, so
        // its `cached_image` is still `None` and nothing is bound for it.
        assert!(cmd_list.bound_images.borrow().is_empty());
    }

    #[test]
    fn distinct_scenarios_produce_distinct_pipeline_state_keys() {
        let material = deserialized();
        let default_key = compute_pipeline_state_key(&material.descriptor_for(RenderScenario::Default, 1));
        let depth_only_key = compute_pipeline_state_key(&material.descriptor_for(RenderScenario::DepthOnly, 1));
        assert_ne!(default_key, depth_only_key);
    }
}
