//! The uniform AST node (`TypeAST`) and the primitive-type table
//! it is built from. Grounded on `DuskLexer/Parser.h`'s `ePrimitiveType`
//! enum and `PRIMITIVE_TYPES`/`PRIMITIVE_TYPE_SIZE` tables, extended with
//! the array/cube and raw/append/consume-buffer variants `RenderPassGenerator.cpp`
//! references but the one parser header does not itself declare — the full
//! set runs to roughly 45 entries, more than that single header shows.

use crate::token::SourceSlice;

/// One entry per HLSL-ish primitive type the DSL understands. A size of
/// `0` means "opaque / not host-storable": textures, buffers, samplers,
/// strings and the two ad-hoc domain types
/// (`InstanceId`, `StringHash`) all carry it, as do the two compile-time
/// constant kinds (`CFlag`, `CInt` — not because they are opaque, but
/// because the generator special-cases them into the constant map instead
/// of emitting a cbuffer field, so their "size" only matters for the
/// handful of places that size every scalar/vector type uniformly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
    CFlag,
    CInt,
    Float2,
    Float3,
    Float4,
    Float4x4,
    RoImage1D,
    RoImage2D,
    RoImage3D,
    RoImageCube,
    RoImage1DArray,
    RoImage2DArray,
    RoImageCubeArray,
    RwImage1D,
    RwImage2D,
    RwImage3D,
    RwImage1DArray,
    RwImage2DArray,
    RwImageCube,
    RwImageCubeArray,
    RoBuffer,
    RwBuffer,
    RoStructuredBuffer,
    RwStructuredBuffer,
    RawBuffer,
    RwRawBuffer,
    AppendBuffer,
    ConsumeBuffer,
    Sampler,
    SamplerComparison,
    String,
    InstanceId,
    StringHash,
}

struct PrimitiveInfo {
    kind: PrimitiveKind,
    hlsl_name: &'static str,
    size: u32,
}

/// Canonical HLSL (or DSL-local, for the domain/opaque kinds) spelling and
/// byte size, in declaration order. `Parser::new` pre-populates the type
/// pool with one node per entry, keyed by `hlsl_name`, exactly as
/// `Parser::Parser` does in `DuskLexer/Parser.cpp`.
pub const PRIMITIVE_TABLE: &[(PrimitiveKind, &str, u32)] = &[
    (PrimitiveKind::I8, "i8", 1),
    (PrimitiveKind::U8, "u8", 1),
    (PrimitiveKind::I16, "i16", 2),
    (PrimitiveKind::U16, "u16", 2),
    (PrimitiveKind::I32, "int", 4),
    (PrimitiveKind::U32, "uint", 4),
    (PrimitiveKind::I64, "i64", 8),
    (PrimitiveKind::U64, "u64", 8),
    (PrimitiveKind::F32, "float", 4),
    (PrimitiveKind::F64, "double", 8),
    (PrimitiveKind::Bool, "bool", 1),
    (PrimitiveKind::CFlag, "cflag", 0),
    (PrimitiveKind::Float2, "float2", 8),
    (PrimitiveKind::Float3, "float3", 12),
    (PrimitiveKind::Float4, "float4", 16),
    (PrimitiveKind::RoImage1D, "Texture1D", 0),
    (PrimitiveKind::RoImage2D, "Texture2D", 0),
    (PrimitiveKind::RoImage3D, "Texture3D", 0),
    (PrimitiveKind::RoImageCube, "TextureCube", 0),
    (PrimitiveKind::RoImage1DArray, "Texture1DArray", 0),
    (PrimitiveKind::RoImage2DArray, "Texture2DArray", 0),
    (PrimitiveKind::RoImageCubeArray, "TextureCubeArray", 0),
    (PrimitiveKind::RwImage1D, "RWTexture1D", 0),
    (PrimitiveKind::RwImage2D, "RWTexture2D", 0),
    (PrimitiveKind::RwImage3D, "RWTexture3D", 0),
    (PrimitiveKind::RwImage1DArray, "RWTexture1DArray", 0),
    (PrimitiveKind::RwImage2DArray, "RWTexture2DArray", 0),
    (PrimitiveKind::RwImageCube, "RWTextureCube", 0),
    (PrimitiveKind::RwImageCubeArray, "RWTextureCubeArray", 0),
    (PrimitiveKind::RoBuffer, "Buffer", 0),
    (PrimitiveKind::RwBuffer, "RWBuffer", 0),
    (PrimitiveKind::RoStructuredBuffer, "StructuredBuffer", 0),
    (PrimitiveKind::RwStructuredBuffer, "RWStructuredBuffer", 0),
    (PrimitiveKind::RawBuffer, "ByteAddressBuffer", 0),
    (PrimitiveKind::RwRawBuffer, "RWByteAddressBuffer", 0),
    (PrimitiveKind::AppendBuffer, "AppendStructuredBuffer", 0),
    (PrimitiveKind::ConsumeBuffer, "ConsumeStructuredBuffer", 0),
    (PrimitiveKind::Sampler, "sampler", 0),
    (PrimitiveKind::SamplerComparison, "SamplerComparisonState", 0),
    (PrimitiveKind::String, "string", 0),
    (PrimitiveKind::Float4x4, "float4x4", 16),
    (PrimitiveKind::CInt, "cint", 4),
    (PrimitiveKind::InstanceId, "instanceId", 0),
    (PrimitiveKind::StringHash, "stringHash", 0),
];

pub fn primitive_size(kind: PrimitiveKind) -> u32 {
    PRIMITIVE_TABLE
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, _, size)| *size)
        .unwrap_or(0)
}

pub fn primitive_hlsl_name(kind: PrimitiveKind) -> &'static str {
    PRIMITIVE_TABLE
        .iter()
        .find(|(k, _, _)| *k == kind)
        .map(|(_, name, _)| *name)
        .unwrap_or("")
}

pub fn primitive_by_name(name: &str) -> Option<PrimitiveKind> {
    PRIMITIVE_TABLE
        .iter()
        .find(|(_, hlsl_name, _)| *hlsl_name == name)
        .map(|(kind, _, _)| *kind)
}

/// Is this primitive read-only when it appears in a `resources` block
/// (used for register-class assignment)?
pub fn is_read_only_resource_type(kind: PrimitiveKind) -> bool {
    matches!(
        kind,
        PrimitiveKind::RoBuffer
            | PrimitiveKind::RoStructuredBuffer
            | PrimitiveKind::RoImage1D
            | PrimitiveKind::RoImage2D
            | PrimitiveKind::RoImage3D
            | PrimitiveKind::RoImageCube
            | PrimitiveKind::RoImageCubeArray
            | PrimitiveKind::RoImage1DArray
            | PrimitiveKind::RoImage2DArray
            | PrimitiveKind::Sampler
            | PrimitiveKind::RawBuffer
    )
}

pub fn is_sampler(kind: PrimitiveKind) -> bool {
    matches!(kind, PrimitiveKind::Sampler | PrimitiveKind::SamplerComparison)
}

/// Is this a compile-time constant (`cflag`/`cint`) that the generator
/// moves into the constant map rather than emitting as a cbuffer field?
pub fn is_compile_time_constant(kind: PrimitiveKind) -> bool {
    matches!(kind, PrimitiveKind::CFlag | PrimitiveKind::CInt)
}

/// The syntactic kind of an AST node (the node's `kind` field).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    None,
    Primitive,
    Struct,
    Enum,
    Shader,
    SharedContent,
    Resources,
    ResourceEntry,
    Properties,
    Pass,
    Library,
    Font,
    Material,
    RenderScenario,
    ShaderPermutation,
    MaterialParameter,
}

/// An index into `Parser::nodes`. The pool capacity is 96, so `u32::MAX`
/// is never a real node and doubles as "this kv_pair had no explicit type"
/// (the `IDENT = value;` form of the grammar, as opposed to
/// `IDENT IDENT = value;`).
pub type NodeId = u32;
pub const NO_TYPE: NodeId = u32::MAX;

/// A node's `name` is either a slice into the user's source (every
/// struct/enum/pass/resource the author wrote) or a `'static` string (the
/// 44 primitive-type nodes the parser pre-populates, whose canonical
/// spellings live in `PRIMITIVE_TABLE`, not in any one source file).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSlice {
    Source(SourceSlice),
    Static(&'static str),
}

impl NameSlice {
    pub fn resolve<'a>(&self, source: &'a str) -> &'a str {
        match self {
            NameSlice::Source(slice) => slice.resolve(source),
            NameSlice::Static(name) => name,
        }
    }
}

impl Default for NameSlice {
    fn default() -> Self {
        NameSlice::Source(SourceSlice::EMPTY)
    }
}

/// The uniform tagged AST node. `child_types`, `names` and `values` are
/// always equal length — callers index them together rather than zipping
/// three independently-lengthed vectors.
#[derive(Debug, Clone)]
pub struct TypeAst {
    pub kind: NodeKind,
    pub primitive_kind: PrimitiveKind,
    pub name: NameSlice,
    pub names: Vec<SourceSlice>,
    pub child_types: Vec<NodeId>,
    pub values: Vec<SourceSlice>,
    pub exportable: bool,
}

impl TypeAst {
    pub fn empty(kind: NodeKind) -> Self {
        TypeAst {
            kind,
            primitive_kind: PrimitiveKind::F32,
            name: NameSlice::default(),
            names: Vec::new(),
            child_types: Vec::new(),
            values: Vec::new(),
            exportable: false,
        }
    }

    pub fn push_child(&mut self, name: SourceSlice, child: NodeId, value: SourceSlice) {
        self.names.push(name);
        self.child_types.push(child);
        self.values.push(value);
    }

    /// The invariant that `child_types`, `names`, and `values` are always
    /// equal length.
    pub fn invariant_holds(&self) -> bool {
        self.names.len() == self.child_types.len() && self.child_types.len() == self.values.len()
    }

    /// This node's own name as a source slice, or `SourceSlice::EMPTY` for
    /// the pre-populated primitive nodes (whose names are `'static`, not
    /// positioned in any particular source file).
    pub fn source_name(&self) -> SourceSlice {
        match self.name {
            NameSlice::Source(slice) => slice,
            NameSlice::Static(_) => SourceSlice::EMPTY,
        }
    }

    pub fn find_child_by_kind(&self, nodes: &[TypeAst], kind: NodeKind) -> Option<NodeId> {
        self.child_types
            .iter()
            .copied()
            .find(|&id| nodes[id as usize].kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_table_has_no_duplicate_names() {
        let mut names: Vec<&str> = PRIMITIVE_TABLE.iter().map(|(_, n, _)| *n).collect();
        names.sort_unstable();
        let before = names.len();
        names.dedup();
        assert_eq!(before, names.len());
    }

    #[test]
    fn lookup_by_name_round_trips() {
        for (kind, name, _) in PRIMITIVE_TABLE {
            assert_eq!(primitive_by_name(name), Some(*kind));
        }
    }

    #[test]
    fn read_only_classification_matches_known_set() {
        assert!(is_read_only_resource_type(PrimitiveKind::RoImage2D));
        assert!(is_read_only_resource_type(PrimitiveKind::RawBuffer));
        assert!(is_read_only_resource_type(PrimitiveKind::Sampler));
        assert!(!is_read_only_resource_type(PrimitiveKind::RwImage2D));
        assert!(!is_read_only_resource_type(PrimitiveKind::RwStructuredBuffer));
    }

    #[test]
    fn compile_time_constants_are_not_sized_as_data() {
        assert!(is_compile_time_constant(PrimitiveKind::CFlag));
        assert!(is_compile_time_constant(PrimitiveKind::CInt));
        assert!(!is_compile_time_constant(PrimitiveKind::Bool));
    }

    #[test]
    fn fresh_node_satisfies_parallel_array_invariant() {
        let mut node = TypeAst::empty(NodeKind::Struct);
        assert!(node.invariant_holds());
        node.push_child(SourceSlice::EMPTY, 0, SourceSlice::EMPTY);
        assert!(node.invariant_holds());
    }
}
