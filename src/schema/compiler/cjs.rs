//! ES 模块语法改写成 CommonJS。
//!
//! 导入变成 `require`，导出统一成 `exports` 上的 getter，
//! 所以导出保持实时绑定，循环导入时也能拿到后定义的值。

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    Declaration, ExportDefaultDeclarationKind, ImportDeclarationSpecifier, Statement,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType, Span};

use super::transform::Transpiled;

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

#[derive(Default)]
struct Writer {
    edits: Vec<Edit>,
    /// (导出名, 取值表达式)
    exports: Vec<(String, String)>,
    specifiers: Vec<String>,
    bindings: usize,
}

pub fn to_commonjs(code: &str) -> Result<Transpiled, String> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, code, SourceType::mjs()).parse();
    if let Some(diagnostic) = parsed.errors.first() {
        return Err(diagnostic.to_string());
    }

    let mut writer = Writer::default();
    for statement in &parsed.program.body {
        writer.statement(statement);
    }
    Ok(writer.finish(code))
}

impl Writer {
    fn statement(&mut self, statement: &Statement<'_>) {
        match statement {
            Statement::ImportDeclaration(decl) => {
                let source = decl.source.value.to_string();
                let text = match &decl.specifiers {
                    Some(specifiers) if !specifiers.is_empty() => {
                        let binding = self.require(&source);
                        let mut text = format!("var {} = require({});", binding, js_string(&source));
                        for specifier in specifiers {
                            let line = match specifier {
                                ImportDeclarationSpecifier::ImportSpecifier(s) => format!(
                                    " const {} = {}[{}];",
                                    s.local.name,
                                    binding,
                                    js_string(&s.imported.name())
                                ),
                                ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => format!(
                                    " const {local} = {b} && {b}.__esModule ? {b}.default : {b};",
                                    local = s.local.name,
                                    b = binding
                                ),
                                ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => {
                                    format!(" const {} = {};", s.local.name, binding)
                                }
                            };
                            text.push_str(&line);
                        }
                        text
                    }
                    _ => {
                        self.track(&source);
                        format!("require({});", js_string(&source))
                    }
                };
                self.replace(decl.span, text);
            }
            Statement::ExportNamedDeclaration(decl) => {
                if let Some(source) = &decl.source {
                    let source = source.value.to_string();
                    let binding = self.require(&source);
                    for specifier in &decl.specifiers {
                        self.exports.push((
                            specifier.exported.name().to_string(),
                            format!("{}[{}]", binding, js_string(&specifier.local.name())),
                        ));
                    }
                    self.replace(
                        decl.span,
                        format!("var {} = require({});", binding, js_string(&source)),
                    );
                } else if let Some(declaration) = &decl.declaration {
                    for name in declared_names(declaration) {
                        self.exports.push((name.clone(), name));
                    }
                    // 去掉 `export ` 前缀，声明本身原样保留
                    self.push(decl.span.start as usize, declaration.span().start as usize, String::new());
                } else {
                    for specifier in &decl.specifiers {
                        self.exports.push((
                            specifier.exported.name().to_string(),
                            specifier.local.name().to_string(),
                        ));
                    }
                    self.replace(decl.span, String::new());
                }
            }
            Statement::ExportDefaultDeclaration(decl) => {
                let named = match &decl.declaration {
                    ExportDefaultDeclarationKind::FunctionDeclaration(f) => {
                        f.id.as_ref().map(|id| id.name.to_string())
                    }
                    ExportDefaultDeclarationKind::ClassDeclaration(c) => {
                        c.id.as_ref().map(|id| id.name.to_string())
                    }
                    _ => None,
                };
                let inner = decl.declaration.span();
                match named {
                    Some(name) => {
                        self.exports.push(("default".to_string(), name));
                        self.push(decl.span.start as usize, inner.start as usize, String::new());
                    }
                    None => {
                        self.push(
                            decl.span.start as usize,
                            inner.start as usize,
                            "exports.default = ".to_string(),
                        );
                        self.push(inner.end as usize, inner.end as usize, ";".to_string());
                    }
                }
            }
            Statement::ExportAllDeclaration(decl) => {
                let source = decl.source.value.to_string();
                let binding = self.require(&source);
                let mut text = format!("var {} = require({});", binding, js_string(&source));
                match &decl.exported {
                    Some(name) => self.exports.push((name.name().to_string(), binding)),
                    None => text.push_str(&format!(
                        " Object.keys({b}).forEach(function (k) {{ if (k !== \"default\" && !Object.prototype.hasOwnProperty.call(exports, k)) Object.defineProperty(exports, k, {{ enumerable: true, get: function () {{ return {b}[k]; }} }}); }});",
                        b = binding
                    )),
                }
                self.replace(decl.span, text);
            }
            _ => {}
        }
    }

    fn track(&mut self, specifier: &str) {
        if !self.specifiers.iter().any(|s| s == specifier) {
            self.specifiers.push(specifier.to_string());
        }
    }

    fn require(&mut self, specifier: &str) -> String {
        self.track(specifier);
        let binding = format!("__import{}", self.bindings);
        self.bindings += 1;
        binding
    }

    fn replace(&mut self, span: Span, text: String) {
        self.push(span.start as usize, span.end as usize, text);
    }

    fn push(&mut self, start: usize, end: usize, text: String) {
        self.edits.push(Edit { start, end, text });
    }

    fn finish(mut self, code: &str) -> Transpiled {
        let mut out = String::with_capacity(code.len() + 256);
        out.push_str("\"use strict\";\nObject.defineProperty(exports, \"__esModule\", { value: true });\n");
        for (name, value) in &self.exports {
            out.push_str(&format!(
                "Object.defineProperty(exports, {}, {{ enumerable: true, get: function () {{ return {}; }} }});\n",
                js_string(name),
                value
            ));
        }

        self.edits.sort_by_key(|edit| (edit.start, edit.end));
        let mut cursor = 0;
        for edit in &self.edits {
            if edit.start < cursor {
                continue;
            }
            out.push_str(&code[cursor..edit.start]);
            out.push_str(&edit.text);
            cursor = edit.end;
        }
        out.push_str(&code[cursor..]);

        Transpiled {
            code: out,
            specifiers: self.specifiers,
        }
    }
}

fn declared_names(declaration: &Declaration<'_>) -> Vec<String> {
    match declaration {
        Declaration::VariableDeclaration(var) => var
            .declarations
            .iter()
            .flat_map(|declarator| declarator.id.get_binding_identifiers())
            .map(|id| id.name.to_string())
            .collect(),
        Declaration::FunctionDeclaration(f) => f.id.iter().map(|id| id.name.to_string()).collect(),
        Declaration::ClassDeclaration(c) => c.id.iter().map(|id| id.name.to_string()).collect(),
        _ => Vec::new(),
    }
}

fn js_string(value: &str) -> String {
    serde_json::Value::from(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_imports_become_requires() {
        let out = to_commonjs(
            "import { createEnv as make } from \"@t3-oss/env-core\";\nimport z from \"zod\";\nimport * as all from \"./all\";\nimport \"dotenv/config\";\n",
        )
        .unwrap();
        assert_eq!(
            out.specifiers,
            vec!["@t3-oss/env-core", "zod", "./all", "dotenv/config"]
        );
        assert!(out.code.contains("const make = __import0[\"createEnv\"];"));
        assert!(out.code.contains("__import1.__esModule ? __import1.default : __import1"));
        assert!(out.code.contains("const all = __import2;"));
        assert!(out.code.contains("require(\"dotenv/config\");"));
        assert!(!out.code.contains("import "));
    }

    #[test]
    fn test_exports_become_getters() {
        let out = to_commonjs(
            "export const envs = 1, { a, b: [c] } = {};\nexport function f() {}\nconst g = 2;\nexport { g as renamed };\nexport default 40 + 2;\n",
        )
        .unwrap();
        for name in ["envs", "a", "c", "f", "renamed"] {
            assert!(
                out.code.contains(&format!("Object.defineProperty(exports, \"{}\"", name)),
                "{} missing in {}",
                name,
                out.code
            );
        }
        assert!(out.code.contains("exports.default = 40 + 2"));
        assert!(!out.code.contains("export "));
    }

    #[test]
    fn test_re_exports() {
        let out = to_commonjs("export * from \"./a\";\nexport * as ns from \"./b\";\nexport { x } from \"./c\";\n")
            .unwrap();
        assert_eq!(out.specifiers, vec!["./a", "./b", "./c"]);
        assert!(out.code.contains("Object.keys(__import0)"));
        assert!(out.code.contains("return __import1;"));
        assert!(out.code.contains("return __import2[\"x\"];"));
    }
}
