//! The shader-body preprocessor: a second lexing pass over a captured
//! `shader`/`shared` body
//! that rewrites `$Identifier` references, threads compile-time constants
//! and `#ifdef`/`#if` directives through, and tracks which semantics a
//! stage reads or writes so the caller can synthesize its input/output
//! structs. Reuses this crate's own `Lexer` rather than a second
//! hand-rolled scanner, the same way the generator reuses `ast`'s
//! primitive table instead of redeclaring it.

use std::collections::HashMap;

use crate::lexer::Lexer;
use crate::semantic::{self, ShaderStage};
use crate::token::TokenKind;

/// One semantic the preprocessor has substituted so far in the current
/// stage's generation. `suffix` is stable across the shared body and the
/// pass body for the same `semantic_name`: the same semantic seen again in
/// the same stage reuses the same numeric suffix and field.
#[derive(Debug, Clone)]
pub struct SemanticUse {
    pub suffix: u32,
    pub semantic_name: String,
    pub hlsl_scalar_type: String,
    pub is_output: bool,
}

/// Carries the running numeric-suffix assignment and the set of semantics
/// touched across however many bodies (shared + pass) make up one stage's
/// generated shader.
#[derive(Default)]
pub struct SemanticTracker {
    suffix_of: HashMap<String, u32>,
    next_suffix: u32,
    uses: Vec<SemanticUse>,
}

impl SemanticTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn uses(&self) -> &[SemanticUse] {
        &self.uses
    }

    fn resolve(&mut self, name: &str, stage: ShaderStage) -> SemanticUse {
        let key = name.to_ascii_lowercase();
        let is_output = semantic::is_stage_output(name, stage);
        if let Some(&suffix) = self.suffix_of.get(&key) {
            return self
                .uses
                .iter()
                .find(|u| u.suffix == suffix)
                .cloned()
                .unwrap_or(SemanticUse {
                    suffix,
                    semantic_name: name.to_string(),
                    hlsl_scalar_type: "float".to_string(),
                    is_output,
                });
        }

        let entry = semantic::lookup(name);
        let suffix = self.next_suffix;
        self.next_suffix += 1;
        self.suffix_of.insert(key, suffix);

        let use_ = SemanticUse {
            suffix,
            semantic_name: entry.map(|e| e.canonical_name.to_string()).unwrap_or_else(|| name.to_string()),
            hlsl_scalar_type: entry.map(|e| e.hlsl_scalar_type.to_string()).unwrap_or_else(|| "float".to_string()),
            is_output,
        };
        self.uses.push(use_.clone());
        use_
    }
}

/// Substitutes any `$Identifier` occurrence in a raw (not re-lexed)
/// directive condition with its compile-time constant value.
fn substitute_constants_in_text(text: &str, constants: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(text.len());
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let start = i + 1;
            let mut end = start;
            while end < bytes.len() && (bytes[end].is_ascii_alphanumeric() || bytes[end] == b'_') {
                end += 1;
            }
            let name = &text[start..end];
            match constants.get(name) {
                Some(value) => out.push_str(value),
                None => {
                    out.push('$');
                    out.push_str(name);
                }
            }
            i = end;
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

fn no_space_before(kind: TokenKind) -> bool {
    matches!(
        kind,
        TokenKind::Dot
            | TokenKind::OpenParen
            | TokenKind::OpenBrace
            | TokenKind::CloseBrace
            | TokenKind::Plus
            | TokenKind::Minus
            | TokenKind::Asterisk
            | TokenKind::Slash
            | TokenKind::Equals
            | TokenKind::Number
            | TokenKind::Comma
            | TokenKind::Semicolon
    )
}

fn push_with_spacing(line: &mut String, text: &str, kind: TokenKind, last_kind: &mut Option<TokenKind>) {
    let needs_space = match last_kind {
        None => false,
        Some(prev) => !no_space_before(*prev),
    };
    if needs_space && kind == TokenKind::Identifier {
        line.push(' ');
    }
    line.push_str(text);
    *last_kind = Some(kind);
}

/// Preprocesses one captured body (a `shared` body or a pass's stage
/// body) and appends the rewritten source to `output`. `tracker` persists
/// across multiple calls for the same stage so semantics line up.
pub fn preprocess_body(
    body: &str,
    stage: ShaderStage,
    constants: &HashMap<String, String>,
    tracker: &mut SemanticTracker,
    output: &mut String,
) {
    let mut lexer = Lexer::new(body);
    let mut current_line = String::new();
    let mut last_kind: Option<TokenKind> = None;

    loop {
        let token = lexer.next_token();
        match token.kind {
            TokenKind::EndOfStream => break,
            TokenKind::Dollar => {
                let ident = lexer.next_token();
                if ident.kind != TokenKind::Identifier {
                    continue;
                }
                let name = lexer.slice(ident.slice);
                if let Some(value) = constants.get(name) {
                    push_with_spacing(&mut current_line, value, TokenKind::Number, &mut last_kind);
                } else {
                    let use_ = tracker.resolve(name, stage);
                    let side = if use_.is_output { "output" } else { "input" };
                    let field = format!("{}.SystemValue_{}", side, use_.suffix);
                    push_with_spacing(&mut current_line, &field, TokenKind::Identifier, &mut last_kind);
                }
            }
            TokenKind::Sharp => {
                if !current_line.is_empty() {
                    output.push_str(current_line.trim_end());
                    output.push('\n');
                    current_line.clear();
                }
                let directive = lexer.capture_raw_until_newline();
                let text = lexer.slice(directive).trim();
                output.push_str(&render_directive(text, constants));
                output.push('\n');
                last_kind = None;
            }
            TokenKind::OpenBrace | TokenKind::CloseBrace | TokenKind::Semicolon => {
                let punct = lexer.slice(token.slice);
                current_line.push_str(punct);
                output.push_str(&current_line);
                output.push('\n');
                current_line.clear();
                last_kind = Some(token.kind);
            }
            _ => {
                let text = lexer.slice(token.slice);
                push_with_spacing(&mut current_line, text, token.kind, &mut last_kind);
            }
        }
    }

    if !current_line.is_empty() {
        output.push_str(current_line.trim_end());
        output.push('\n');
    }
}

/// Rewrites one `#directive` line. The proxy macro synthesized for
/// `#ifdef $flag` — a synthetic proxy macro `PROXY_N` emitted when the
/// flag evaluates true — is named after the flag itself rather
/// than a shared numeric counter, which sidesteps threading extra mutable
/// state through every call site while keeping proxy names stable and
/// collision-free per flag.
fn render_directive(text: &str, constants: &HashMap<String, String>) -> String {
    let mut parts = text.splitn(2, char::is_whitespace);
    let keyword = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim();

    match keyword {
        "include" => format!("#include {}", rest),
        "define" => format!("#define {}", substitute_constants_in_text(rest, constants)),
        "else" | "endif" => format!("#{}", keyword),
        "ifdef" | "ifndef" => {
            // A plain `#ifdef SOME_MACRO` with no `$`-prefixed flag passes
            // through unchanged; only `$flag` references get the proxy
            // treatment.
            if let Some(flag) = rest.strip_prefix('$') {
                match constants.get(flag) {
                    Some(value) => {
                        let truthy = value == "true" || value == "1";
                        if truthy {
                            format!("#define __proxy_{flag} 1\n#{kw} __proxy_{flag}", flag = flag, kw = keyword)
                        } else {
                            format!("#{} __proxy_{}", keyword, flag)
                        }
                    }
                    None => {
                        log::warn!("unknown $cflag `{}` in `#{} ${}`; leaving the directive as authored", flag, keyword, flag);
                        format!("#{} ${}", keyword, flag)
                    }
                }
            } else {
                format!("#{} {}", keyword, rest)
            }
        }
        "if" | "elif" => format!("#{} {}", keyword, substitute_constants_in_text(rest, constants)),
        _ => format!("#{} {}", keyword, rest),
    }
}
