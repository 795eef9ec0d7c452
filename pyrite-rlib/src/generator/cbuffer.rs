//! Constant-buffer 16-byte line packing. `amethyst-rendy` has no DSL
//! cbuffer layer of its own, so this is implemented as a first-fit-decreasing
//! bin pack, the standard approach for a "sort descending, open a new line
//! when nothing fits" packing rule.

const LINE_BYTES: u32 = 16;

#[derive(Debug, Clone)]
pub struct CbufferField {
    pub name: String,
    pub hlsl_type: String,
    pub size: u32,
}

/// Packs `fields` into 16-byte lines and renders the final
/// `cbuffer Name : register(bN) { ... };` declaration. Zero-size fields
/// are warned about and skipped.
pub fn pack_cbuffer(name: &str, register: u32, mut fields: Vec<CbufferField>) -> String {
    fields.retain(|f| {
        if f.size == 0 {
            log::warn!(
                "cbuffer {}: field `{}` has size 0 and will not be emitted",
                name,
                f.name
            );
            false
        } else {
            true
        }
    });
    fields.sort_by(|a, b| b.size.cmp(&a.size));

    let mut lines: Vec<(u32, Vec<CbufferField>)> = Vec::new();
    for field in fields {
        let fit = lines
            .iter_mut()
            .find(|(used, _)| *used + field.size <= LINE_BYTES);
        match fit {
            Some((used, entries)) => {
                *used += field.size;
                entries.push(field);
            }
            None => lines.push((field.size, vec![field])),
        }
    }

    let mut body = String::new();
    for (index, (used, entries)) in lines.iter().enumerate() {
        for field in entries {
            body.push_str(&format!("    {} {};\n", field.hlsl_type, field.name));
        }
        let remainder = LINE_BYTES - used;
        if remainder > 0 {
            let pad_floats = (remainder + 3) / 4;
            body.push_str(&format!("    float _pad{}[{}];\n", index, pad_floats));
        }
    }

    format!(
        "cbuffer {} : register(b{}) {{\n{}}};\n",
        name, register, body
    )
}
