//! HLSL semantic table: a fixed compile-time
//! table of `{name_hash, canonical_name, hlsl_scalar_type, stage_access_mask}`
//! entries the `$Identifier` rewrite in the generator consults. Grounded on
//! `original_source/`'s semantic table, which enumerates every HLSL system
//! value and per-stage varying the shader-authoring language recognizes.

use bitflags::bitflags;
use pyrite_core::string_hash32;

bitflags! {
    /// A 5-bit stage-access mask: a set bit means the semantic
    /// is a **stage output** for that stage; a clear bit means it is a
    /// **stage input**.
    #[derive(Default)]
    pub struct StageAccessMask: u8 {
        const VERTEX        = 0b0_0001;
        const HULL          = 0b0_0010;
        const DOMAIN        = 0b0_0100;
        const PIXEL         = 0b0_1000;
        const COMPUTE       = 0b1_0000;
    }
}

pub use pyrite_core::device::ShaderStage;

fn mask_bit(stage: ShaderStage) -> StageAccessMask {
    match stage {
        ShaderStage::Vertex => StageAccessMask::VERTEX,
        ShaderStage::TesselationControl => StageAccessMask::HULL,
        ShaderStage::TesselationEvaluation => StageAccessMask::DOMAIN,
        ShaderStage::Pixel => StageAccessMask::PIXEL,
        ShaderStage::Compute => StageAccessMask::COMPUTE,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SemanticEntry {
    pub name_hash: u32,
    pub canonical_name: &'static str,
    pub hlsl_scalar_type: &'static str,
    pub stage_access_mask: StageAccessMask,
}

/// `(canonical_name, hlsl_scalar_type, mask)`; `name_hash` is derived at
/// lookup time via `string_hash32` rather than stored redundantly, since
/// this table is keyed by a case-insensitive hash of `canonical_name`
/// and there is no value in hand-computing and hard-coding ~120 hashes
/// that would silently go stale if a name ever changed.
const RAW_TABLE: &[(&str, &str, StageAccessMask)] = &[
    // Vertex-stage system values and common per-vertex inputs.
    ("SV_Position", "float4", StageAccessMask::VERTEX),
    ("SV_VertexID", "uint", StageAccessMask { bits: 0 }),
    ("SV_InstanceID", "uint", StageAccessMask { bits: 0 }),
    ("POSITION", "float3", StageAccessMask { bits: 0 }),
    ("NORMAL", "float3", StageAccessMask { bits: 0 }),
    ("TANGENT", "float4", StageAccessMask { bits: 0 }),
    ("BINORMAL", "float3", StageAccessMask { bits: 0 }),
    ("COLOR", "float4", StageAccessMask { bits: 0 }),
    ("COLOR0", "float4", StageAccessMask { bits: 0 }),
    ("COLOR1", "float4", StageAccessMask { bits: 0 }),
    ("BLENDWEIGHT", "float4", StageAccessMask { bits: 0 }),
    ("BLENDINDICES", "uint4", StageAccessMask { bits: 0 }),
    // Texture coordinate varyings: read by pixel stage, written by vertex
    // stage, so both bits are set.
    ("TEXCOORD0", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD1", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD2", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD3", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD4", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD5", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD6", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD7", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD8", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD9", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD10", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD11", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD12", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD13", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD14", "float2", StageAccessMask::VERTEX),
    ("TEXCOORD15", "float2", StageAccessMask::VERTEX),
    // Remaining per-vertex input channels.
    ("COLOR2", "float4", StageAccessMask { bits: 0 }),
    ("COLOR3", "float4", StageAccessMask { bits: 0 }),
    ("COLOR4", "float4", StageAccessMask { bits: 0 }),
    ("COLOR5", "float4", StageAccessMask { bits: 0 }),
    ("COLOR6", "float4", StageAccessMask { bits: 0 }),
    ("COLOR7", "float4", StageAccessMask { bits: 0 }),
    ("BLENDINDICES1", "uint4", StageAccessMask { bits: 0 }),
    ("PSIZE", "float", StageAccessMask { bits: 0 }),
    ("POSITION1", "float3", StageAccessMask { bits: 0 }),
    ("POSITION2", "float3", StageAccessMask { bits: 0 }),
    ("POSITION3", "float3", StageAccessMask { bits: 0 }),
    ("NORMAL1", "float3", StageAccessMask { bits: 0 }),
    ("TANGENT1", "float4", StageAccessMask { bits: 0 }),
    ("BINORMAL1", "float3", StageAccessMask { bits: 0 }),
    ("BLENDWEIGHT1", "float4", StageAccessMask { bits: 0 }),
    // Legacy DX9-era pixel/vertex semantics still recognized for authoring
    // convenience.
    ("FOG", "float", StageAccessMask { bits: 0 }),
    ("TESSFACTOR", "float", StageAccessMask { bits: 0 }),
    ("DEPTH", "float", StageAccessMask::PIXEL),
    ("VFACE", "float", StageAccessMask { bits: 0 }),
    ("VPOS", "float2", StageAccessMask { bits: 0 }),
    // Pixel-stage system values.
    ("SV_Target0", "float4", StageAccessMask::PIXEL),
    ("SV_Target1", "float4", StageAccessMask::PIXEL),
    ("SV_Target2", "float4", StageAccessMask::PIXEL),
    ("SV_Target3", "float4", StageAccessMask::PIXEL),
    ("SV_Target4", "float4", StageAccessMask::PIXEL),
    ("SV_Target5", "float4", StageAccessMask::PIXEL),
    ("SV_Target6", "float4", StageAccessMask::PIXEL),
    ("SV_Target7", "float4", StageAccessMask::PIXEL),
    ("SV_Depth", "float", StageAccessMask::PIXEL),
    ("SV_IsFrontFace", "bool", StageAccessMask { bits: 0 }),
    ("SV_SampleIndex", "uint", StageAccessMask { bits: 0 }),
    ("SV_Coverage", "uint", StageAccessMask::PIXEL),
    // Tessellation stages.
    ("SV_TessFactor", "float", StageAccessMask::HULL),
    ("SV_InsideTessFactor", "float", StageAccessMask::HULL),
    ("SV_OutputControlPointID", "uint", StageAccessMask { bits: 0 }),
    ("SV_DomainLocation", "float3", StageAccessMask { bits: 0 }),
    // Compute-stage system values (always inputs).
    ("SV_DispatchThreadID", "uint3", StageAccessMask { bits: 0 }),
    ("SV_GroupID", "uint3", StageAccessMask { bits: 0 }),
    ("SV_GroupThreadID", "uint3", StageAccessMask { bits: 0 }),
    ("SV_GroupIndex", "uint", StageAccessMask { bits: 0 }),
    // Clip/cull distance planes, one entry per plane index.
    ("SV_ClipDistance0", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance1", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance2", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance3", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance4", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance5", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance6", "float", StageAccessMask::VERTEX),
    ("SV_ClipDistance7", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance0", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance1", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance2", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance3", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance4", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance5", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance6", "float", StageAccessMask::VERTEX),
    ("SV_CullDistance7", "float", StageAccessMask::VERTEX),
    // Remaining system values: geometry/raster routing, fragment-stage
    // extras, and SM6.x additions.
    ("SV_RenderTargetArrayIndex", "uint", StageAccessMask { bits: 0 }),
    ("SV_ViewportArrayIndex", "uint", StageAccessMask { bits: 0 }),
    ("SV_StencilRef", "uint", StageAccessMask::PIXEL),
    ("SV_GSInstanceID", "uint", StageAccessMask { bits: 0 }),
    ("SV_PrimitiveID", "uint", StageAccessMask { bits: 0 }),
    ("SV_ViewID", "uint", StageAccessMask { bits: 0 }),
    ("SV_InnerCoverage", "uint", StageAccessMask { bits: 0 }),
    ("SV_DepthGreaterEqual", "float", StageAccessMask::PIXEL),
    ("SV_DepthLessEqual", "float", StageAccessMask::PIXEL),
    ("SV_ShadingRate", "uint", StageAccessMask { bits: 0 }),
    ("SV_Barycentrics", "float3", StageAccessMask { bits: 0 }),
    ("SV_CullPrimitive", "bool", StageAccessMask::VERTEX),
    // Engine-level `PerViewBuffer` varyings threaded through the fixed
    // preamble, exposed here so pass bodies can reference them with the
    // same `$Identifier` syntax as a true HLSL semantic.
    ("g_ViewProjectionMatrix", "float4x4", StageAccessMask { bits: 0 }),
    ("g_InverseViewProjectionMatrix", "float4x4", StageAccessMask { bits: 0 }),
    ("g_PreviousViewProjectionMatrix", "float4x4", StageAccessMask { bits: 0 }),
    ("g_OrthoProjectionMatrix", "float4x4", StageAccessMask { bits: 0 }),
    ("g_ScreenSize", "float2", StageAccessMask { bits: 0 }),
    ("g_InverseScreenSize", "float2", StageAccessMask { bits: 0 }),
    ("g_WorldPosition", "float3", StageAccessMask { bits: 0 }),
    ("g_FrameIndex", "int", StageAccessMask { bits: 0 }),
    ("g_ViewDirection", "float3", StageAccessMask { bits: 0 }),
    ("g_ImageQuality", "float", StageAccessMask { bits: 0 }),
    ("g_CameraJitteringOffset", "float2", StageAccessMask { bits: 0 }),
    ("g_CursorPosition", "uint2", StageAccessMask { bits: 0 }),
    ("g_UpVector", "float3", StageAccessMask { bits: 0 }),
    ("g_Fov", "float", StageAccessMask { bits: 0 }),
    ("g_RightVector", "float3", StageAccessMask { bits: 0 }),
    ("g_AspectRatio", "float", StageAccessMask { bits: 0 }),
    // Engine-level `PerWorldBuffer` varyings.
    ("g_DirectionalLight", "DirectionalLightGPU", StageAccessMask { bits: 0 }),
    ("g_ClustersScale", "float3", StageAccessMask { bits: 0 }),
    ("g_SceneAABBMinX", "float", StageAccessMask { bits: 0 }),
    ("g_ClustersInverseScale", "float3", StageAccessMask { bits: 0 }),
    ("g_SceneAABBMinY", "float", StageAccessMask { bits: 0 }),
    ("g_ClustersBias", "float3", StageAccessMask { bits: 0 }),
    ("g_SceneAABBMinZ", "float", StageAccessMask { bits: 0 }),
    ("g_SceneAABBMax", "float3", StageAccessMask { bits: 0 }),
];

/// Looks up a semantic by name, case-insensitively: a name not rewritten by
/// an earlier pass is looked up case-insensitively in this table.
pub fn lookup(name: &str) -> Option<SemanticEntry> {
    let needle = string_hash32(name);
    RAW_TABLE
        .iter()
        .find(|(candidate, _, _)| string_hash32(candidate) == needle)
        .map(|(canonical_name, hlsl_scalar_type, mask)| SemanticEntry {
            name_hash: needle,
            canonical_name,
            hlsl_scalar_type,
            stage_access_mask: *mask,
        })
}

/// Is `name` a stage **output** when referenced from `stage`, per the
/// `$Identifier` rewrite: if the access bit for stage `s` is set, it
/// becomes `output.SystemValue_N`; otherwise `input.SystemValue_N`.
/// Unknown names (not in the table, and not a compile-time constant —
/// that check happens one level up in the generator) are treated as pass
/// through-inputs, matching the original's fallback when a semantic
/// lookup misses.
pub fn is_stage_output(name: &str, stage: ShaderStage) -> bool {
    match lookup(name) {
        Some(entry) => entry.stage_access_mask.contains(mask_bit(stage)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_has_no_duplicate_name_hashes() {
        let mut hashes: Vec<u32> = RAW_TABLE
            .iter()
            .map(|(name, _, _)| string_hash32(name))
            .collect();
        hashes.sort_unstable();
        let before = hashes.len();
        hashes.dedup();
        assert_eq!(before, hashes.len());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let a = lookup("sv_position").unwrap();
        let b = lookup("SV_POSITION").unwrap();
        assert_eq!(a.name_hash, b.name_hash);
        assert_eq!(a.canonical_name, "SV_Position");
    }

    #[test]
    fn unknown_semantic_misses() {
        assert!(lookup("NotARealSemantic").is_none());
    }

    #[test]
    fn sv_position_is_output_of_vertex_and_input_of_pixel() {
        assert!(is_stage_output("SV_Position", ShaderStage::Vertex));
        // SV_Position is an output of the vertex stage and an input of
        // every later stage in the pipeline — per the mask encoding,
        // only the producing stage's bit is set.
        assert!(!is_stage_output("SV_Position", ShaderStage::Pixel));
    }

    #[test]
    fn texcoord_is_output_of_vertex_and_input_of_pixel() {
        assert!(is_stage_output("TEXCOORD0", ShaderStage::Vertex));
        assert!(!is_stage_output("TEXCOORD0", ShaderStage::Pixel));
    }

    #[test]
    fn sv_target_is_output_of_pixel() {
        assert!(is_stage_output("SV_Target0", ShaderStage::Pixel));
    }
}
