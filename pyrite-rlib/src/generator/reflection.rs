//! Reflection-header emission: for each runtime property, a C-style struct
//! field plus an ImGui-style widget call guarded by `DUSK_USE_IMGUI`.
//! Grounded on `original_source/`'s reflection widget table.

use crate::ast::PrimitiveKind;

struct FieldMapping {
    c_type: &'static str,
    size: u32,
    widget: Option<&'static str>,
}

fn mapping(kind: PrimitiveKind) -> FieldMapping {
    match kind {
        PrimitiveKind::I8 => FieldMapping { c_type: "int8_t", size: 1, widget: Some("InputInt") },
        PrimitiveKind::U8 => FieldMapping { c_type: "uint8_t", size: 1, widget: Some("InputInt") },
        PrimitiveKind::I16 => FieldMapping { c_type: "int16_t", size: 2, widget: Some("InputInt") },
        PrimitiveKind::U16 => FieldMapping { c_type: "uint16_t", size: 2, widget: Some("InputInt") },
        PrimitiveKind::I32 => FieldMapping { c_type: "int32_t", size: 4, widget: Some("InputInt") },
        PrimitiveKind::U32 => FieldMapping { c_type: "uint32_t", size: 4, widget: Some("InputInt") },
        PrimitiveKind::I64 => FieldMapping { c_type: "int64_t", size: 8, widget: None },
        PrimitiveKind::U64 => FieldMapping { c_type: "uint64_t", size: 8, widget: None },
        PrimitiveKind::F32 => FieldMapping { c_type: "float", size: 4, widget: Some("DragFloat") },
        PrimitiveKind::F64 => FieldMapping { c_type: "double", size: 8, widget: Some("DragFloat") },
        PrimitiveKind::Bool => FieldMapping { c_type: "bool", size: 1, widget: Some("Checkbox") },
        PrimitiveKind::Float2 => FieldMapping { c_type: "vec2", size: 8, widget: Some("DragFloat2") },
        PrimitiveKind::Float3 => FieldMapping { c_type: "vec3", size: 12, widget: Some("DragFloat3") },
        PrimitiveKind::Float4 => FieldMapping { c_type: "vec4", size: 16, widget: Some("DragFloat4") },
        PrimitiveKind::Float4x4 => FieldMapping { c_type: "mat4x4", size: 64, widget: None },
        _ => FieldMapping { c_type: "uint32_t", size: 4, widget: None },
    }
}

pub struct ReflectionField {
    pub name: String,
    pub kind: PrimitiveKind,
    pub initializer: Option<String>,
}

/// Emits `struct <PassName>RuntimeProperties { ... };` plus the ImGui widget
/// block: a C-style struct field with initializer, padded to a 16-byte
/// multiple, and an IMGUI-style widget call guarded by `#if DUSK_USE_IMGUI`.
pub fn emit_reflection_struct(pass_name: &str, fields: &[ReflectionField]) -> String {
    let mut struct_body = String::new();
    let mut widget_body = String::new();
    let mut total_size: u32 = 0;

    for field in fields {
        let info = mapping(field.kind);
        total_size += info.size;
        match &field.initializer {
            Some(init) => struct_body.push_str(&format!(
                "    {} {} = {};\n",
                info.c_type, field.name, init
            )),
            None => struct_body.push_str(&format!("    {} {};\n", info.c_type, field.name)),
        }

        if let Some(widget) = info.widget {
            widget_body.push_str(&format!(
                "    ImGui::{}(\"{}\", &{});\n",
                widget, field.name, field.name
            ));
        }
    }

    let remainder = total_size % 16;
    if remainder != 0 {
        let pad_bytes = 16 - remainder;
        let pad_floats = (pad_bytes + 3) / 4;
        struct_body.push_str(&format!("    float _reflectionPad[{}];\n", pad_floats));
    }

    format!(
        "struct {pass}RuntimeProperties {{\n{body}}};\n\n#if DUSK_USE_IMGUI\nstatic void Reflect{pass}( {pass}RuntimeProperties& properties ) {{\n{widgets}}}\n#endif\n",
        pass = pass_name,
        body = struct_body,
        widgets = widget_body,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_float_field_gets_drag_float_widget() {
        let out = emit_reflection_struct(
            "Blit",
            &[ReflectionField {
                name: "exposure".to_string(),
                kind: PrimitiveKind::F32,
                initializer: Some("1.5".to_string()),
            }],
        );
        assert!(out.contains("struct BlitRuntimeProperties"));
        assert!(out.contains("ReflectBlit"));
        assert!(out.contains("float exposure = 1.5;"));
        assert!(out.contains("#if DUSK_USE_IMGUI"));
        assert!(out.contains("ImGui::DragFloat(\"exposure\", &exposure);"));
    }

    #[test]
    fn struct_is_padded_to_sixteen_byte_multiple() {
        let out = emit_reflection_struct(
            "Tonemap",
            &[ReflectionField {
                name: "flag".to_string(),
                kind: PrimitiveKind::Bool,
                initializer: None,
            }],
        );
        assert!(out.contains("_reflectionPad"));
    }

    #[test]
    fn matrix_field_has_no_widget() {
        let out = emit_reflection_struct(
            "Skin",
            &[ReflectionField {
                name: "bone".to_string(),
                kind: PrimitiveKind::Float4x4,
                initializer: None,
            }],
        );
        assert!(out.contains("mat4x4 bone;"));
        assert!(!out.contains("ImGui::"));
    }
}
