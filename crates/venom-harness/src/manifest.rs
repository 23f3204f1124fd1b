//! `go.mod` parsing
//!
//! The tool declares the Go toolchain it needs in the `go` directive of its
//! module file. Parsing is lax: unknown directives and the contents of
//! `require`/`replace`/... blocks are skipped, but the file must still be
//! well-formed (balanced blocks, terminated strings) and carry exactly one
//! valid `go` directive.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Same shape the Go toolchain accepts: `1.21`, `1.22.0`, `1.23rc1`.
const GO_VERSION_PATTERN: &str = r"^([1-9][0-9]*)\.(0|[1-9][0-9]*)(\.(0|[1-9][0-9]*))?([a-z]+[0-9]+)?$";

fn go_version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(GO_VERSION_PATTERN).expect("GO_VERSION_PATTERN is a valid regex"))
}

/// Errors parsing a module file
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ManifestError {
    #[error("line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("line {line}: invalid go version '{version}': must match format 1.23.0")]
    InvalidGoVersion { line: usize, version: String },

    #[error("line {line}: repeated go statement")]
    RepeatedGo { line: usize },

    #[error("missing go directive")]
    MissingGoDirective,
}

/// Go toolchain version required to build a module.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolchainVersion(String);

impl ToolchainVersion {
    /// Validate and wrap a version string.
    pub fn parse(version: &str) -> Option<Self> {
        go_version_re()
            .is_match(version)
            .then(|| ToolchainVersion(version.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builder image for this toolchain, e.g. `golang:1.22.0`.
    pub fn builder_image(&self, prefix: &str) -> String {
        format!("{}:{}", prefix, self.0)
    }
}

impl std::fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parts of a module file the harness cares about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoModule {
    pub module_path: Option<String>,
    pub go_version: ToolchainVersion,
    /// `toolchain` directive, if any (informational)
    pub toolchain: Option<String>,
}

/// Parse a `go.mod` file.
pub fn parse_go_mod(contents: &str) -> Result<GoModule, ManifestError> {
    let mut module_path = None;
    let mut go_version: Option<ToolchainVersion> = None;
    let mut toolchain = None;
    let mut open_block: Option<(String, usize)> = None;

    for (index, raw) in contents.lines().enumerate() {
        let line = index + 1;
        let tokens = tokenize(raw, line)?;
        if tokens.is_empty() {
            continue;
        }

        if open_block.is_some() {
            if tokens.len() == 1 && tokens[0] == ")" {
                open_block = None;
            } else if tokens.iter().any(|t| t == "(") {
                return Err(syntax(line, "unexpected ( inside block"));
            }
            continue;
        }

        let verb = tokens[0].as_str();
        if verb == ")" {
            return Err(syntax(line, "unexpected )"));
        }
        if tokens.len() == 2 && tokens[1] == "(" {
            if verb == "module" || verb == "go" || verb == "toolchain" {
                return Err(syntax(line, &format!("{} does not take a block", verb)));
            }
            open_block = Some((verb.to_string(), line));
            continue;
        }

        match verb {
            "module" => {
                if tokens.len() != 2 {
                    return Err(syntax(line, "usage: module module/path"));
                }
                module_path = Some(unquote(&tokens[1]));
            }
            "go" => {
                if tokens.len() != 2 {
                    return Err(syntax(line, "usage: go 1.23"));
                }
                if go_version.is_some() {
                    return Err(ManifestError::RepeatedGo { line });
                }
                let version = ToolchainVersion::parse(&tokens[1]).ok_or_else(|| {
                    ManifestError::InvalidGoVersion {
                        line,
                        version: tokens[1].clone(),
                    }
                })?;
                go_version = Some(version);
            }
            "toolchain" => {
                if tokens.len() != 2 {
                    return Err(syntax(line, "usage: toolchain go1.23.0"));
                }
                toolchain = Some(tokens[1].clone());
            }
            // require, replace, exclude, retract, godebug, ... and anything
            // newer than this parser: skipped.
            _ => {}
        }
    }

    if let Some((verb, line)) = open_block {
        return Err(syntax(line, &format!("unterminated {} block", verb)));
    }

    Ok(GoModule {
        module_path,
        go_version: go_version.ok_or(ManifestError::MissingGoDirective)?,
        toolchain,
    })
}

fn syntax(line: usize, message: &str) -> ManifestError {
    ManifestError::Syntax {
        line,
        message: message.to_string(),
    }
}

/// Split a line into tokens, dropping `//` comments. Quoted strings
/// (`"..."` or `` `...` ``) are single tokens, quotes kept.
fn tokenize(raw: &str, line: usize) -> Result<Vec<String>, ManifestError> {
    let mut tokens = Vec::new();
    let mut chars = raw.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '/' {
            let mut lookahead = chars.clone();
            lookahead.next();
            if lookahead.peek() == Some(&'/') {
                break;
            }
        }
        if c == '(' || c == ')' {
            tokens.push(c.to_string());
            chars.next();
            continue;
        }
        if c == '"' || c == '`' {
            let quote = c;
            let mut token = String::from(quote);
            chars.next();
            let mut closed = false;
            while let Some(next) = chars.next() {
                token.push(next);
                if next == '\\' && quote == '"' {
                    if let Some(escaped) = chars.next() {
                        token.push(escaped);
                    }
                    continue;
                }
                if next == quote {
                    closed = true;
                    break;
                }
            }
            if !closed {
                return Err(syntax(line, "unterminated quoted string"));
            }
            tokens.push(token);
            continue;
        }

        let mut token = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_whitespace() || next == '(' || next == ')' || next == '"' || next == '`' {
                break;
            }
            if next == '/' {
                let mut lookahead = chars.clone();
                lookahead.next();
                if lookahead.peek() == Some(&'/') {
                    break;
                }
            }
            token.push(next);
            chars.next();
        }
        tokens.push(token);
    }

    Ok(tokens)
}

fn unquote(token: &str) -> String {
    token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('`').and_then(|t| t.strip_suffix('`')))
        .unwrap_or(token)
        .to_string()
}
