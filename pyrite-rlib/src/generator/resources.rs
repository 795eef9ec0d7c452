//! Resource-list emission and register allocation. Grounded on
//! `amethyst-rendy/shader/src/reflect.rs`'s descriptor-set-binding
//! classification (which SPIR-V descriptor kinds are read-only vs
//! read-write) generalized to this DSL's own primitive-kind set.

use std::collections::HashMap;

use crate::ast::{self, NodeKind, PrimitiveKind, TypeAst};
use pyrite_core::device::PipelineKind;

pub struct ResourceBinding {
    pub name: String,
    pub declaration: String,
    pub register: String,
    pub hashcode_constant: String,
}

fn is_image_kind(kind: PrimitiveKind) -> bool {
    matches!(
        kind,
        PrimitiveKind::RoImage1D
            | PrimitiveKind::RoImage2D
            | PrimitiveKind::RoImage3D
            | PrimitiveKind::RoImageCube
            | PrimitiveKind::RoImage1DArray
            | PrimitiveKind::RoImage2DArray
            | PrimitiveKind::RoImageCubeArray
            | PrimitiveKind::RwImage1D
            | PrimitiveKind::RwImage2D
            | PrimitiveKind::RwImage3D
            | PrimitiveKind::RwImage1DArray
            | PrimitiveKind::RwImage2DArray
            | PrimitiveKind::RwImageCube
            | PrimitiveKind::RwImageCubeArray
    )
}

/// Emits the HLSL resource declarations and `DUSK_STRING_HASH` metadata
/// constants for one pass's `resources` block. `color_rt_names`
/// and `depth_stencil_name` come from the pass's parsed `RenderPassInfo`
/// and decide the framebuffer-output override.
pub fn emit_resource_list(
    pass_name: &str,
    resources: &TypeAst,
    nodes: &[TypeAst],
    source: &str,
    pipeline_kind: PipelineKind,
    color_rt_names: &[String],
    depth_stencil_name: Option<&str>,
    constants: &HashMap<String, String>,
) -> (String, Vec<ResourceBinding>) {
    let mut declarations = String::new();
    let mut bindings = Vec::new();

    let mut sampler_counter = 0u32;
    let mut read_only_counter = 0u32;
    let mut uav_counter = if pipeline_kind == PipelineKind::Graphics {
        color_rt_names.len() as u32
    } else {
        0
    };

    for &entry_id in &resources.child_types {
        let entry = &nodes[entry_id as usize];
        if entry.kind != NodeKind::ResourceEntry {
            continue;
        }
        let name = entry.source_name().resolve(source).to_string();
        let kind = entry.primitive_kind;

        let mut read_only = ast::is_read_only_resource_type(kind);
        let is_framebuffer_output = is_image_kind(kind)
            && (color_rt_names.iter().any(|rt| rt == &name)
                || depth_stencil_name == Some(name.as_str()));
        if is_framebuffer_output {
            read_only = false;
        }

        let swizzle = find_kv_value(entry, nodes, source, "swizzle");
        let is_multisampled = find_kv_value(entry, nodes, source, "isMultisampled")
            .map(|v| resolve_bool_flag(v.trim(), constants))
            .unwrap_or(false);

        let mut hlsl_type = ast::primitive_hlsl_name(kind).to_string();
        if let Some(t) = swizzle {
            hlsl_type = format!("{}<{}>", hlsl_type, t.trim());
        }
        if is_multisampled {
            hlsl_type = hlsl_type.replacen("Texture", "Texture2DMS", 1);
        }

        let register = if ast::is_sampler(kind) {
            let r = format!("s{}", sampler_counter);
            sampler_counter += 1;
            r
        } else if read_only {
            let r = format!("t{}", read_only_counter);
            read_only_counter += 1;
            r
        } else {
            let r = format!("u{}", uav_counter);
            uav_counter += 1;
            r
        };

        let declaration = format!("{} {} : register({});\n", hlsl_type, name, register);
        declarations.push_str(&declaration);

        let hashcode_constant = format!(
            "static const uint32_t {}_{}_Hashcode = DUSK_STRING_HASH(\"{}\");",
            pass_name, name, name
        );

        bindings.push(ResourceBinding {
            name: name.clone(),
            declaration,
            register,
            hashcode_constant,
        });
    }

    (declarations, bindings)
}

/// Resolves a resource-entry property value that is either a literal
/// `true`/`false` or a `$flag`-style reference into a declared `cflag`.
/// Grounded on `RenderPassGenerator.cpp:261-276`, which resolves
/// `isMultisampled` the same way: a literal is used as-is, and a `$`-prefixed
/// reference is looked up by name among the pass's own properties.
fn resolve_bool_flag(value: &str, constants: &HashMap<String, String>) -> bool {
    match value.strip_prefix('$') {
        Some(flag) => constants.get(flag).map(|v| v == "true" || v == "1").unwrap_or(false),
        None => value == "true",
    }
}

fn find_kv_value<'a>(
    entry: &'a TypeAst,
    _nodes: &[TypeAst],
    source: &'a str,
    key: &str,
) -> Option<&'a str> {
    entry
        .names
        .iter()
        .position(|slice| slice.resolve(source) == key)
        .map(|idx| entry.values[idx].resolve(source))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::NameSlice;
    use crate::token::SourceSlice;

    fn resource_entry(name: &str, kind: PrimitiveKind, source: &str) -> TypeAst {
        let offset = source.find(name).unwrap() as u32;
        let mut node = TypeAst::empty(NodeKind::ResourceEntry);
        node.primitive_kind = kind;
        node.name = NameSlice::Source(SourceSlice {
            offset,
            len: name.len() as u32,
        });
        node
    }

    #[test]
    fn samplers_read_only_and_uav_get_distinct_register_classes() {
        let source = "Input LinearSampler Color";
        let nodes = vec![
            resource_entry("Input", PrimitiveKind::RoImage2D, source),
            resource_entry("LinearSampler", PrimitiveKind::Sampler, source),
            resource_entry("Color", PrimitiveKind::RwImage2D, source),
        ];
        let mut resources = TypeAst::empty(NodeKind::Resources);
        for i in 0..nodes.len() as u32 {
            resources.push_child(SourceSlice::EMPTY, i, SourceSlice::EMPTY);
        }

        let (decl, bindings) = emit_resource_list(
            "Blit",
            &resources,
            &nodes,
            source,
            PipelineKind::Graphics,
            &[],
            None,
            &HashMap::new(),
        );
        assert!(decl.contains("register(t0)"));
        assert!(decl.contains("register(s0)"));
        assert!(decl.contains("register(u0)"));
        assert_eq!(bindings.len(), 3);
    }

    #[test]
    fn framebuffer_overlap_forces_uav_offset_by_rt_count() {
        let source = "Color";
        let nodes = vec![resource_entry("Color", PrimitiveKind::RoImage2D, source)];
        let mut resources = TypeAst::empty(NodeKind::Resources);
        resources.push_child(SourceSlice::EMPTY, 0, SourceSlice::EMPTY);

        let rts = vec!["Color".to_string()];
        let (decl, bindings) = emit_resource_list(
            "Tonemap",
            &resources,
            &nodes,
            source,
            PipelineKind::Graphics,
            &rts,
            None,
            &HashMap::new(),
        );
        assert!(decl.contains("register(u1)"));
        assert_eq!(bindings[0].register, "u1");
    }

    #[test]
    fn is_multisampled_resolves_a_dollar_flag_against_declared_cflags() {
        let source = "Input isMultisampled $UseMSAA";
        let mut node = resource_entry("Input", PrimitiveKind::RoImage2D, source);
        let key_offset = source.find("isMultisampled").unwrap() as u32;
        let value_offset = source.find("$UseMSAA").unwrap() as u32;
        node.push_child(
            SourceSlice {
                offset: key_offset,
                len: "isMultisampled".len() as u32,
            },
            ast::NO_TYPE,
            SourceSlice {
                offset: value_offset,
                len: "$UseMSAA".len() as u32,
            },
        );
        let nodes = vec![node];
        let mut resources = TypeAst::empty(NodeKind::Resources);
        resources.push_child(SourceSlice::EMPTY, 0, SourceSlice::EMPTY);

        let mut constants = HashMap::new();
        constants.insert("UseMSAA".to_string(), "true".to_string());

        let (decl, _bindings) = emit_resource_list(
            "Pass",
            &resources,
            &nodes,
            source,
            PipelineKind::Graphics,
            &[],
            None,
            &constants,
        );
        assert!(decl.contains("Texture2DMS"));
    }

    #[test]
    fn is_multisampled_dollar_flag_resolving_false_leaves_texture_unchanged() {
        let source = "Input isMultisampled $UseMSAA";
        let mut node = resource_entry("Input", PrimitiveKind::RoImage2D, source);
        let key_offset = source.find("isMultisampled").unwrap() as u32;
        let value_offset = source.find("$UseMSAA").unwrap() as u32;
        node.push_child(
            SourceSlice {
                offset: key_offset,
                len: "isMultisampled".len() as u32,
            },
            ast::NO_TYPE,
            SourceSlice {
                offset: value_offset,
                len: "$UseMSAA".len() as u32,
            },
        );
        let nodes = vec![node];
        let mut resources = TypeAst::empty(NodeKind::Resources);
        resources.push_child(SourceSlice::EMPTY, 0, SourceSlice::EMPTY);

        let (decl, _bindings) = emit_resource_list(
            "Pass",
            &resources,
            &nodes,
            source,
            PipelineKind::Graphics,
            &[],
            None,
            &HashMap::new(),
        );
        assert!(!decl.contains("Texture2DMS"));
    }
}
