use rustc_hash::FxHashSet;

use super::keywords::ShaderKeywords;

/// Shared WGSL embedded at compile time so no include path is resolved at runtime.
pub const COMMON_WGSL: &str = include_str!("wgsl/common.wgsl");

/// Get embedded include content by name
pub fn get_shader_include(name: &str) -> Option<&'static str> {
    match name {
        "common.wgsl" | "wgsl/common.wgsl" => Some(COMMON_WGSL),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PreprocessError {
    #[error("line {line}: unknown include '{name}'")]
    MissingInclude { line: usize, name: String },
    #[error("line {line}: #{directive} without matching #ifdef")]
    Unbalanced { line: usize, directive: &'static str },
    #[error("{0} unterminated conditional block(s)")]
    Unterminated(usize),
    #[error("line {line}: malformed directive '{text}'")]
    Malformed { line: usize, text: String },
}

#[derive(Debug, Clone, Copy)]
struct Branch {
    /// Whether the enclosing block is emitting.
    parent_active: bool,
    /// Whether the current arm is emitting.
    active: bool,
    seen_else: bool,
}

/// WGSL preprocessor handling `#include`, `#define`, `#ifdef`, `#ifndef`,
/// `#else` and `#endif`.
///
/// WGSL has no conditional compilation, so keyword variants are resolved
/// here before the source reaches the backend.
pub struct ShaderPreprocessor {
    defines: FxHashSet<String>,
    included: FxHashSet<String>,
}

impl ShaderPreprocessor {
    pub fn new(keywords: ShaderKeywords) -> Self {
        Self {
            defines: keywords.defines().map(str::to_string).collect(),
            included: FxHashSet::default(),
        }
    }

    pub fn define(&mut self, name: &str) {
        self.defines.insert(name.to_string());
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.defines.contains(name)
    }

    /// Resolve all directives of `content`.
    pub fn process(&mut self, content: &str) -> Result<String, PreprocessError> {
        let mut result = String::with_capacity(content.len() + COMMON_WGSL.len());
        let mut stack: Vec<Branch> = Vec::new();

        for (index, line) in content.lines().enumerate() {
            let line_number = index + 1;
            let active = stack.last().map_or(true, |branch| branch.active);
            let trimmed = line.trim();

            if !trimmed.starts_with('#') {
                if active {
                    result.push_str(line);
                    result.push('\n');
                }
                continue;
            }

            let mut parts = trimmed.splitn(2, char::is_whitespace);
            let directive = parts.next().unwrap_or_default();
            let argument = parts.next().map(str::trim).unwrap_or_default();

            match directive {
                "#ifdef" | "#ifndef" => {
                    let name = Self::identifier(argument, line_number, trimmed)?;
                    let defined = self.is_defined(name);
                    let taken = if directive == "#ifdef" { defined } else { !defined };
                    stack.push(Branch {
                        parent_active: active,
                        active: active && taken,
                        seen_else: false,
                    });
                }
                "#else" => {
                    let branch = stack.last_mut().ok_or(PreprocessError::Unbalanced {
                        line: line_number,
                        directive: "else",
                    })?;
                    if branch.seen_else {
                        return Err(PreprocessError::Unbalanced {
                            line: line_number,
                            directive: "else",
                        });
                    }
                    branch.seen_else = true;
                    branch.active = branch.parent_active && !branch.active;
                }
                "#endif" => {
                    stack.pop().ok_or(PreprocessError::Unbalanced {
                        line: line_number,
                        directive: "endif",
                    })?;
                }
                "#define" if active => {
                    let name = Self::identifier(argument, line_number, trimmed)?;
                    self.define(name);
                }
                "#include" if active => {
                    let name = Self::parse_include_directive(argument).ok_or_else(|| {
                        PreprocessError::Malformed {
                            line: line_number,
                            text: trimmed.to_string(),
                        }
                    })?;
                    self.include(name, line_number, &mut result)?;
                }
                "#define" | "#include" => {}
                _ => {
                    return Err(PreprocessError::Malformed {
                        line: line_number,
                        text: trimmed.to_string(),
                    })
                }
            }
        }

        if !stack.is_empty() {
            return Err(PreprocessError::Unterminated(stack.len()));
        }

        Ok(result)
    }

    fn include(
        &mut self,
        name: &str,
        line: usize,
        result: &mut String,
    ) -> Result<(), PreprocessError> {
        // Each include is emitted once per program
        if !self.included.insert(name.to_string()) {
            return Ok(());
        }

        let content = get_shader_include(name).ok_or_else(|| PreprocessError::MissingInclude {
            line,
            name: name.to_string(),
        })?;
        let processed = self.process(content)?;

        result.push_str("// Begin include: ");
        result.push_str(name);
        result.push('\n');
        result.push_str(&processed);
        result.push_str("// End include: ");
        result.push_str(name);
        result.push('\n');
        Ok(())
    }

    /// Accepts both `"file.wgsl"` and `<file.wgsl>`
    fn parse_include_directive(argument: &str) -> Option<&str> {
        argument
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
            .or_else(|| {
                argument
                    .strip_prefix('<')
                    .and_then(|rest| rest.strip_suffix('>'))
            })
            .filter(|name| !name.is_empty())
    }

    fn identifier<'a>(
        argument: &'a str,
        line: usize,
        text: &str,
    ) -> Result<&'a str, PreprocessError> {
        let valid = !argument.is_empty()
            && argument
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
        if valid {
            Ok(argument)
        } else {
            Err(PreprocessError::Malformed {
                line,
                text: text.to_string(),
            })
        }
    }
}

/// Produce the final WGSL for one program variant.
pub fn preprocess_program(source: &str, keywords: ShaderKeywords) -> Result<String, PreprocessError> {
    ShaderPreprocessor::new(keywords).process(source)
}
