//! 编译桥：用 oxc 把 schema 入口文件及其相对导入转换成内存中的 CommonJS 模块表。
//!
//! 只做解析、类型擦除、define 替换和模块解析，不执行任何用户代码。

pub mod cjs;
pub mod transform;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// 相对导入尝试的扩展名（按顺序）
const RESOLVE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "cts", "js", "mjs", "cjs"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Node,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    CommonJs,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceMap {
    None,
    External,
}

#[derive(Debug, Clone)]
pub struct BundleOptions {
    pub platform: Platform,
    pub format: Format,
    pub sourcemap: SourceMap,
    /// 保持为外部引用、由运行时拦截表提供的模块
    pub externals: Vec<String>,
    /// (点分路径, 替换表达式源码)
    pub defines: Vec<(String, String)>,
}

impl BundleOptions {
    pub fn node(externals: Vec<String>) -> Self {
        Self {
            platform: Platform::Node,
            format: Format::CommonJs,
            sourcemap: SourceMap::External,
            externals,
            defines: vec![("import.meta.env".to_string(), "process.env".to_string())],
        }
    }

    fn is_external(&self, specifier: &str) -> bool {
        self.externals.iter().any(|ext| {
            specifier == ext
                || specifier
                    .strip_prefix(ext.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    pub path: PathBuf,
    /// CommonJS 代码，运行时包在 `(exports, require, module, __filename, __dirname)` 里
    pub code: String,
    /// 相对导入 → `modules` 下标
    pub links: BTreeMap<String, usize>,
}

/// 打包结果；`modules[entry]` 为入口
#[derive(Debug, Clone)]
pub struct Bundle {
    pub entry: usize,
    pub modules: Vec<Module>,
    /// 未被打包的裸模块名（运行时由拦截表处理）
    pub externals: Vec<String>,
}

impl Bundle {
    pub fn entry_path(&self) -> &Path {
        &self.modules[self.entry].path
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildError {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl BuildError {
    fn at(file: &Path, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            file: file.to_path_buf(),
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: ERROR: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}

impl std::error::Error for BuildError {}

/// 编译阶段的接口，测试里可以替换
pub trait Compile {
    fn bundle(&self, entry: &Path) -> Result<Bundle, BuildError>;
}

pub struct Bundler {
    options: BundleOptions,
}

impl Bundler {
    /// define 配置在这里先校验一遍，坏的替换表达式不会拖到打包时才暴露
    pub fn new(options: BundleOptions) -> Result<Self, BuildError> {
        if !options.defines.is_empty() {
            transform::define_config(&options.defines)?;
        }
        Ok(Self { options })
    }

    fn load(&self, path: &Path) -> Result<(String, transform::Transpiled), BuildError> {
        let source = fs::read_to_string(path).map_err(|e| {
            BuildError::at(path, 1, 1, format!("Could not read file: {}", e))
        })?;
        let transpiled = transform::transpile(path, &source, &self.options.defines)?;
        Ok((source, transpiled))
    }
}

impl Compile for Bundler {
    fn bundle(&self, entry: &Path) -> Result<Bundle, BuildError> {
        let entry = canonical(entry);
        debug!(
            platform = ?self.options.platform,
            format = ?self.options.format,
            sourcemap = ?self.options.sourcemap,
            "打包入口 {}",
            entry.display()
        );
        let mut paths = vec![entry.clone()];
        let mut index: HashMap<PathBuf, usize> = HashMap::from([(entry, 0)]);
        let mut modules = Vec::new();
        let mut externals: Vec<String> = Vec::new();

        let mut i = 0;
        while i < paths.len() {
            let path = paths[i].clone();
            let (source, transpiled) = self.load(&path)?;
            let mut links = BTreeMap::new();

            for specifier in transpiled.specifiers {
                if is_relative(&specifier) {
                    let resolved = resolve_file(&path, &specifier).ok_or_else(|| {
                        let (line, column) = specifier_location(&source, &specifier);
                        BuildError::at(
                            &path,
                            line,
                            column,
                            format!("Could not resolve \"{}\"", specifier),
                        )
                    })?;
                    let next = paths.len();
                    let idx = *index.entry(resolved.clone()).or_insert_with(|| {
                        paths.push(resolved);
                        next
                    });
                    links.insert(specifier, idx);
                } else {
                    if !self.options.is_external(&specifier) {
                        debug!("裸模块 {} 不在外部列表中，交给运行时处理", specifier);
                    }
                    if !externals.contains(&specifier) {
                        externals.push(specifier);
                    }
                }
            }

            modules.push(Module {
                path,
                code: transpiled.code,
                links,
            });
            i += 1;
        }

        debug!("打包完成: {} 个模块, {} 个外部引用", modules.len(), externals.len());
        Ok(Bundle {
            entry: 0,
            modules,
            externals,
        })
    }
}

/// 在原始源码里找到模块名字面量的位置，找不到时指向文件开头
fn specifier_location(source: &str, specifier: &str) -> (u32, u32) {
    ['"', '\'']
        .iter()
        .find_map(|quote| source.find(&format!("{quote}{specifier}{quote}")))
        .map(|offset| transform::line_column(source, offset))
        .unwrap_or((1, 1))
}

pub fn is_relative(specifier: &str) -> bool {
    specifier.starts_with("./") || specifier.starts_with("../") || specifier.starts_with('/')
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

/// 相对导入的文件解析：原路径、追加扩展名、`.js` 写法指向 `.ts`、目录 index
pub fn resolve_file(importer: &Path, specifier: &str) -> Option<PathBuf> {
    let base = match importer.parent() {
        Some(dir) => dir.join(specifier),
        None => PathBuf::from(specifier),
    };

    if base.is_file() {
        return Some(canonical(&base));
    }

    let file_name = base.file_name()?.to_string_lossy().to_string();
    for ext in RESOLVE_EXTENSIONS {
        let candidate = base.with_file_name(format!("{}.{}", file_name, ext));
        if candidate.is_file() {
            return Some(canonical(&candidate));
        }
    }

    // `import "./env.js"` 在 TS 项目里指向 env.ts
    if let Some(stem) = file_name
        .strip_suffix(".js")
        .or_else(|| file_name.strip_suffix(".mjs"))
        .or_else(|| file_name.strip_suffix(".cjs"))
    {
        for ext in ["ts", "tsx", "mts", "cts"] {
            let candidate = base.with_file_name(format!("{}.{}", stem, ext));
            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
    }

    if base.is_dir() {
        for ext in RESOLVE_EXTENSIONS {
            let candidate = base.join(format!("index.{}", ext));
            if candidate.is_file() {
                return Some(canonical(&candidate));
            }
        }
    }

    None
}
