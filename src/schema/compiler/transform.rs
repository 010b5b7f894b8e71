//! 单文件转换：oxc 解析 → 擦除类型 → define 替换 → 生成 JS → 改写成 CommonJS

use std::path::Path;

use oxc_allocator::Allocator;
use oxc_codegen::Codegen;
use oxc_diagnostics::OxcDiagnostic;
use oxc_parser::Parser;
use oxc_semantic::SemanticBuilder;
use oxc_span::SourceType;
use oxc_transformer::{
    ReplaceGlobalDefines, ReplaceGlobalDefinesConfig, TransformOptions, Transformer,
};

use super::{cjs, BuildError};

/// 括号嵌套上限；oxc 的解析、转换和代码生成都是递归的
pub const MAX_NESTING: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transpiled {
    pub code: String,
    /// 代码里 require 的模块名，类型导入已被擦除
    pub specifiers: Vec<String>,
}

pub fn transpile(
    path: &Path,
    source: &str,
    defines: &[(String, String)],
) -> Result<Transpiled, BuildError> {
    check_nesting(path, source)?;

    let allocator = Allocator::default();
    let source_type = SourceType::from_path(path).unwrap_or_else(|_| SourceType::mjs());
    let parsed = Parser::new(&allocator, source, source_type).parse();
    if let Some(diagnostic) = parsed.errors.first() {
        return Err(diagnostic_error(path, source, diagnostic));
    }
    let mut program = parsed.program;

    let (symbols, scopes) = SemanticBuilder::new()
        .build(&program)
        .semantic
        .into_symbol_table_and_scope_tree();
    let transformed = Transformer::new(&allocator, path, &TransformOptions::default())
        .build_with_symbols_and_scopes(symbols, scopes, &mut program);
    if let Some(diagnostic) = transformed.errors.first() {
        return Err(diagnostic_error(path, source, diagnostic));
    }

    if !defines.is_empty() {
        let config = define_config(defines)?;
        ReplaceGlobalDefines::new(&allocator, config).build(
            transformed.symbols,
            transformed.scopes,
            &mut program,
        );
    }

    let emitted = Codegen::new().build(&program).code;
    if !source_type.is_module() {
        return Ok(Transpiled {
            code: emitted,
            specifiers: Vec::new(),
        });
    }
    cjs::to_commonjs(&emitted).map_err(|message| BuildError {
        file: path.to_path_buf(),
        line: 1,
        column: 1,
        message,
    })
}

pub fn define_config(defines: &[(String, String)]) -> Result<ReplaceGlobalDefinesConfig, BuildError> {
    ReplaceGlobalDefinesConfig::new(defines).map_err(|errors| BuildError {
        file: Path::new("<define>").to_path_buf(),
        line: 1,
        column: 1,
        message: errors
            .first()
            .map(|e| e.to_string())
            .unwrap_or_else(|| "invalid define".to_string()),
    })
}

fn diagnostic_error(path: &Path, source: &str, diagnostic: &OxcDiagnostic) -> BuildError {
    let offset = diagnostic
        .labels
        .as_ref()
        .and_then(|labels| labels.first())
        .map(|label| label.offset())
        .unwrap_or(0);
    let (line, column) = line_column(source, offset);
    BuildError {
        file: path.to_path_buf(),
        line,
        column,
        message: diagnostic.message.to_string(),
    }
}

/// 字节偏移 → 1 起始的行列
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let column = before
        .rsplit('\n')
        .next()
        .map(|tail| tail.chars().count())
        .unwrap_or(0)
        + 1;
    (line as u32, column as u32)
}

enum Frame {
    Bracket,
    Template,
}

/// 解析前先数一遍括号深度，过深的源码直接报错而不是撑爆栈
pub fn check_nesting(path: &Path, source: &str) -> Result<(), BuildError> {
    let bytes = source.as_bytes();
    let mut stack: Vec<Frame> = Vec::new();
    let mut i = 0;
    let mut in_template = false;

    while i < bytes.len() {
        if in_template {
            match bytes[i] {
                b'\\' => i += 1,
                b'`' => in_template = false,
                b'$' if bytes.get(i + 1) == Some(&b'{') => {
                    stack.push(Frame::Template);
                    in_template = false;
                    i += 1;
                }
                _ => {}
            }
            i += 1;
            continue;
        }

        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'/') => {
                while i < bytes.len() && bytes[i] != b'\n' {
                    i += 1;
                }
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i += 2;
                while i < bytes.len() && !(bytes[i] == b'*' && bytes.get(i + 1) == Some(&b'/')) {
                    i += 1;
                }
                i += 1;
            }
            quote @ (b'"' | b'\'') => {
                i += 1;
                while i < bytes.len() && bytes[i] != quote && bytes[i] != b'\n' {
                    if bytes[i] == b'\\' {
                        i += 1;
                    }
                    i += 1;
                }
            }
            b'`' => in_template = true,
            b'(' | b'[' | b'{' => {
                stack.push(Frame::Bracket);
                if stack.len() > MAX_NESTING {
                    let (line, column) = line_column(source, i);
                    return Err(BuildError {
                        file: path.to_path_buf(),
                        line,
                        column,
                        message: format!(
                            "Source is too deeply nested (more than {} levels)",
                            MAX_NESTING
                        ),
                    });
                }
            }
            b')' | b']' => {
                stack.pop();
            }
            b'}' => {
                if let Some(Frame::Template) = stack.pop() {
                    in_template = true;
                }
            }
            _ => {}
        }
        i += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defines() -> Vec<(String, String)> {
        vec![("import.meta.env".to_string(), "process.env".to_string())]
    }

    #[test]
    fn test_types_are_erased() {
        let out = transpile(
            Path::new("env.ts"),
            "import type { Z } from 'zod';\ninterface Opts { a: string }\nconst n: number = 1 as number;\nexport const v = n satisfies number;",
            &defines(),
        )
        .unwrap();
        assert!(!out.code.contains("interface"));
        assert!(!out.code.contains("satisfies"));
        assert!(out.specifiers.is_empty(), "{:?}", out.specifiers);
        assert!(out.code.contains("exports"));
    }

    #[test]
    fn test_import_meta_env_is_replaced() {
        let out = transpile(
            Path::new("env.ts"),
            "export const url = import.meta.env.API_URL;",
            &defines(),
        )
        .unwrap();
        assert!(out.code.contains("process.env.API_URL"), "{}", out.code);
        assert!(!out.code.contains("import.meta"));
    }

    #[test]
    fn test_syntax_error_location() {
        let err = transpile(Path::new("env.ts"), "const a = 1;\nconst = ;", &defines()).unwrap_err();
        assert_eq!(err.line, 2);
        assert!(!err.message.is_empty());
    }

    #[test]
    fn test_deep_nesting_is_rejected_before_parsing() {
        let source = format!("export const envs = {}1{};", "(".repeat(3000), ")".repeat(3000));
        let err = transpile(Path::new("env.ts"), &source, &defines()).unwrap_err();
        assert!(err.message.contains("too deeply nested"), "{}", err.message);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_nesting_ignores_strings_comments_and_templates() {
        let noise = "(".repeat(MAX_NESTING * 2);
        let source = format!(
            "// {noise}\n/* {noise} */\nconst a = '{noise}';\nconst b = `{noise} ${{ [1].length }}`;\n"
        );
        assert!(check_nesting(Path::new("env.ts"), &source).is_ok());

        let within = format!("{}0{}", "[".repeat(MAX_NESTING), "]".repeat(MAX_NESTING));
        assert!(check_nesting(Path::new("env.ts"), &within).is_ok());
    }

    #[test]
    fn test_line_column() {
        assert_eq!(line_column("ab\ncd", 0), (1, 1));
        assert_eq!(line_column("ab\ncd", 4), (2, 2));
        assert_eq!(line_column("ab", 99), (1, 3));
    }
}
