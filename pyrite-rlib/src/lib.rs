//! The render-library authoring language front end: lexer, fixed-arena
//! parser, HLSL semantic table, and the code generator that turns a parsed
//! `lib` declaration into per-stage HLSL source, resource metadata, and a
//! reflection header.

pub mod ast;
pub mod generator;
pub mod lexer;
pub mod parser;
pub mod semantic;
pub mod token;

pub use ast::{NodeId, NodeKind, PrimitiveKind, TypeAst};
pub use generator::{GeneratedShader, Generator, GeneratorOutput, RenderPassInfo};
pub use lexer::Lexer;
pub use parser::Parser;
pub use token::{SourceSlice, Token, TokenKind};
