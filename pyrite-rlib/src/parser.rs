//! Recursive-descent parser building the fixed-capacity AST pool.
//! Grounded on `DuskLexer/Parser.cpp`: the type pool is
//! pre-populated with one primitive node per `PrimitiveKind` so that a
//! type-name lookup always finds either a primitive or a previously
//! declared `struct`/`enum`; shader/shared bodies and pass/resource
//! property values are captured as raw source slices, never lexed here.

use crate::ast::{self, NameSlice, NodeId, NodeKind, TypeAst, PRIMITIVE_TABLE};
use crate::lexer::Lexer;
use crate::token::{SourceSlice, Token, TokenKind};

pub const MAX_TYPE_COUNT: usize = 96;

pub struct Parser<'s> {
    lexer: Lexer<'s>,
    nodes: Vec<TypeAst>,
}

impl<'s> Parser<'s> {
    pub fn new(source: &'s str) -> Self {
        let mut nodes = Vec::with_capacity(MAX_TYPE_COUNT);
        for (kind, name, _size) in PRIMITIVE_TABLE {
            let mut node = TypeAst::empty(NodeKind::Primitive);
            node.primitive_kind = *kind;
            node.name = NameSlice::Static(name);
            nodes.push(node);
        }

        Parser {
            lexer: Lexer::new(source),
            nodes,
        }
    }

    pub fn type_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn get_type(&self, id: NodeId) -> &TypeAst {
        &self.nodes[id as usize]
    }

    pub fn nodes(&self) -> &[TypeAst] {
        &self.nodes
    }

    pub fn source(&self) -> &'s str {
        self.lexer.source()
    }

    pub fn has_error(&self) -> bool {
        self.lexer.has_error()
    }

    fn text(&self, slice: SourceSlice) -> &'s str {
        self.lexer.slice(slice)
    }

    fn alloc_node(&mut self, node: TypeAst) -> NodeId {
        if self.nodes.len() >= MAX_TYPE_COUNT {
            // AST pool overflow (>96 nodes) is a declared-fatal condition.
            panic!(
                "render-library AST pool exhausted (> {} nodes)",
                MAX_TYPE_COUNT
            );
        }
        self.nodes.push(node);
        (self.nodes.len() - 1) as NodeId
    }

    fn get_type_by_name(&self, name: &str) -> Option<NodeId> {
        self.nodes
            .iter()
            .position(|n| n.name.resolve(self.source()) == name)
            .map(|i| i as NodeId)
    }

    /// Top-level loop: `{ 'struct' | 'enum' | 'font' | 'lib' | 'material' }*`.
    /// Returns the id of a synthetic document-root node (`NodeKind::None`)
    /// whose children are the top-level declarations, in source order.
    pub fn generate_ast(&mut self) -> NodeId {
        let mut root = TypeAst::empty(NodeKind::None);

        loop {
            let (matched, token) = self.lexer.accept(TokenKind::Identifier);
            if !matched {
                break;
            }

            let keyword = self.text(token.slice);
            let child = match keyword {
                "struct" => Some(self.parse_struct()),
                "enum" => Some(self.parse_enum()),
                "font" => Some(self.parse_font()),
                "lib" => Some(self.parse_library()),
                "material" => Some(self.parse_material()),
                _ => None,
            };

            match child {
                Some(id) => {
                    let name = self.nodes[id as usize].source_name();
                    root.push_child(name, id, SourceSlice::EMPTY);
                }
                None => break,
            }

            if self.lexer.has_error() {
                break;
            }
        }

        self.alloc_node(root)
    }

    /// Finds the first `Library` child of a `generate_ast()` root — the
    /// node the generator takes as its input.
    pub fn find_library(&self, root: NodeId) -> Option<NodeId> {
        self.nodes[root as usize].find_child_by_kind(&self.nodes, NodeKind::Library)
    }

    fn parse_struct(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let mut node = TypeAst::empty(NodeKind::Struct);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            self.parse_typed_variable(&mut node);
        }

        self.alloc_node(node)
    }

    fn parse_enum(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let mut node = TypeAst::empty(NodeKind::Enum);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            let (_, variant) = self.lexer.expect(TokenKind::Identifier);
            node.push_child(variant.slice, ast::NO_TYPE, SourceSlice::EMPTY);
            self.lexer.accept(TokenKind::Comma);
        }

        self.alloc_node(node)
    }

    fn parse_font(&mut self) -> NodeId {
        // Matches DuskLexer/Parser.cpp's parseFont: a stub. Font assets are
        // out of scope for this core, so we only consume the block without
        // extracting anything from it.
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let mut node = TypeAst::empty(NodeKind::Font);
        node.name = NameSlice::Source(name_tok.slice);

        let (has_body, _) = self.lexer.accept(TokenKind::OpenBrace);
        if has_body {
            let _ = self.lexer.capture_brace_body();
        } else {
            self.lexer.expect(TokenKind::Semicolon);
        }

        self.alloc_node(node)
    }

    /// `Type name;` or `Type name = value;`.
    fn parse_typed_variable(&mut self, owner: &mut TypeAst) {
        let (_, type_tok) = self.lexer.expect(TokenKind::Identifier);
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let type_id = self
            .get_type_by_name(self.text(type_tok.slice))
            .unwrap_or(ast::NO_TYPE);

        let (has_eq, _) = self.lexer.accept(TokenKind::Equals);
        let value = if has_eq {
            self.lexer.capture_until(TokenKind::Semicolon)
        } else {
            self.lexer.expect(TokenKind::Semicolon);
            SourceSlice::EMPTY
        };

        owner.push_child(name_tok.slice, type_id, value);
    }

    /// A `kv_pair` inside a `pass`/`material`/`scenario` block:
    /// `IDENT = value ;` (untyped override/flag) or
    /// `IDENT IDENT = value ;` (typed property override).
    fn parse_kv_pair(&mut self, first: Token) -> (SourceSlice, NodeId, SourceSlice) {
        let (is_assignment, _) = self.lexer.accept(TokenKind::Equals);
        if is_assignment {
            let value = self.lexer.capture_until(TokenKind::Semicolon);
            (first.slice, ast::NO_TYPE, value)
        } else {
            let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
            let (has_eq, _) = self.lexer.accept(TokenKind::Equals);
            let value = if has_eq {
                self.lexer.capture_until(TokenKind::Semicolon)
            } else {
                self.lexer.expect(TokenKind::Semicolon);
                SourceSlice::EMPTY
            };
            let type_id = self
                .get_type_by_name(self.text(first.slice))
                .unwrap_or(ast::NO_TYPE);
            (name_tok.slice, type_id, value)
        }
    }

    fn parse_properties(&mut self) -> NodeId {
        let mut node = TypeAst::empty(NodeKind::Properties);
        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            self.parse_typed_variable(&mut node);
        }
        self.alloc_node(node)
    }

    fn parse_resource_entry(&mut self) -> NodeId {
        let (_, type_tok) = self.lexer.expect(TokenKind::Identifier);
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let type_id = self
            .get_type_by_name(self.text(type_tok.slice))
            .unwrap_or(ast::NO_TYPE);

        let mut node = TypeAst::empty(NodeKind::ResourceEntry);
        node.name = NameSlice::Source(name_tok.slice);
        node.primitive_kind = if type_id != ast::NO_TYPE {
            self.nodes[type_id as usize].primitive_kind
        } else {
            node.primitive_kind
        };

        let (has_props, _) = self.lexer.accept(TokenKind::OpenBrace);
        if has_props {
            loop {
                let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
                if closed || self.lexer.has_error() {
                    break;
                }
                let (_, key) = self.lexer.expect(TokenKind::Identifier);
                let (key, type_id, value) = self.parse_kv_pair(key);
                node.push_child(key, type_id, value);
            }
        } else {
            self.lexer.expect(TokenKind::Semicolon);
        }

        self.alloc_node(node)
    }

    fn parse_resources(&mut self) -> NodeId {
        let mut node = TypeAst::empty(NodeKind::Resources);
        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            let entry_id = self.parse_resource_entry();
            let name = self.nodes[entry_id as usize].source_name();
            node.push_child(name, entry_id, SourceSlice::EMPTY);
        }
        self.alloc_node(node)
    }

    /// `shader` blocks are named and keep their body; `shared` blocks have
    /// no name and are concatenated by the generator into one shared body.
    /// Both capture their braced body without lexing it.
    fn parse_shader_block(&mut self, is_shared: bool) -> NodeId {
        let name_tok = if is_shared {
            None
        } else {
            let (_, t) = self.lexer.expect(TokenKind::Identifier);
            Some(t)
        };

        self.lexer.expect(TokenKind::OpenBrace);
        let body = self.lexer.capture_brace_body();

        let mut node = TypeAst::empty(if is_shared {
            NodeKind::SharedContent
        } else {
            NodeKind::Shader
        });
        if let Some(t) = name_tok {
            node.name = NameSlice::Source(t.slice);
        }
        node.push_child(SourceSlice::EMPTY, ast::NO_TYPE, body);

        self.alloc_node(node)
    }

    /// `pass IDENT { kv_pair* }`.
    fn parse_pass(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let mut node = TypeAst::empty(NodeKind::Pass);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            let (_, first) = self.lexer.expect(TokenKind::Identifier);
            let (key, type_id, value) = self.parse_kv_pair(first);
            node.push_child(key, type_id, value);
        }

        self.alloc_node(node)
    }

    /// `scenario STRING { ('vertex'|'pixel') = STRING ; }*`.
    fn parse_shader_permutation(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::String);
        let mut node = TypeAst::empty(NodeKind::ShaderPermutation);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            let (_, key) = self.lexer.expect(TokenKind::Identifier);
            let (key, type_id, value) = self.parse_kv_pair(key);
            node.push_child(key, type_id, value);
        }

        self.alloc_node(node)
    }

    /// `parameters { IDENT = value ; }*` — the mutable per-instance
    /// override block. Each entry is pushed untyped, matching `parse_kv_pair`'s
    /// `IDENT = value ;` branch; the caller classifies Float3 vs Texture2D
    /// from the value's shape (`{x, y, z}` vs a bare path) rather than from
    /// a type token, since the DSL never spells one out here.
    fn parse_material_parameters(&mut self) -> NodeId {
        let mut node = TypeAst::empty(NodeKind::MaterialParameter);
        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }
            let (_, key) = self.lexer.expect(TokenKind::Identifier);
            let (key, type_id, value) = self.parse_kv_pair(key);
            node.push_child(key, type_id, value);
        }
        self.alloc_node(node)
    }

    /// `material STRING { flag | 'scenario' scenario | 'parameters' parameters }*`.
    fn parse_material(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::String);
        let mut node = TypeAst::empty(NodeKind::Material);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (closed, _) = self.lexer.accept(TokenKind::CloseBrace);
            if closed || self.lexer.has_error() {
                break;
            }

            let (_, first) = self.lexer.expect(TokenKind::Identifier);
            if self.text(first.slice) == "scenario" {
                let scenario_id = self.parse_shader_permutation();
                let name = self.nodes[scenario_id as usize].source_name();
                node.push_child(name, scenario_id, SourceSlice::EMPTY);
            } else if self.text(first.slice) == "parameters" {
                let params_id = self.parse_material_parameters();
                node.push_child(SourceSlice::EMPTY, params_id, SourceSlice::EMPTY);
            } else {
                let (key, type_id, value) = self.parse_kv_pair(first);
                node.push_child(key, type_id, value);
            }
        }

        self.alloc_node(node)
    }

    /// `lib IDENT { shader_block | shared_block | pass | properties | resources }*`.
    fn parse_library(&mut self) -> NodeId {
        let (_, name_tok) = self.lexer.expect(TokenKind::Identifier);
        let mut node = TypeAst::empty(NodeKind::Library);
        node.name = NameSlice::Source(name_tok.slice);

        self.lexer.expect(TokenKind::OpenBrace);
        loop {
            let (matched, token) = self.lexer.accept(TokenKind::Identifier);
            if !matched || self.lexer.has_error() {
                self.lexer.accept(TokenKind::CloseBrace);
                break;
            }

            let keyword = self.text(token.slice);
            let child = match keyword {
                "shader" => Some(self.parse_shader_block(false)),
                "shared" => Some(self.parse_shader_block(true)),
                "pass" => Some(self.parse_pass()),
                "properties" => Some(self.parse_properties()),
                "resources" => Some(self.parse_resources()),
                _ => None,
            };

            match child {
                Some(id) => {
                    let name = self.nodes[id as usize].source_name();
                    node.push_child(name, id, SourceSlice::EMPTY);
                }
                None => break,
            }
        }

        self.alloc_node(node)
    }
}
