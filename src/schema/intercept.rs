//! 运行时模块拦截表：裸模块名 → 沙箱内提供的实现

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interceptor {
    /// 真实可执行的校验库（zod）
    ValidationLibrary,
    /// 记录参数而不做校验的 createEnv
    EnvFactory,
    /// node 的 process 模块
    Process,
}

impl Interceptor {
    /// 沙箱加载器里对应的路由名
    pub fn route(self) -> &'static str {
        match self {
            Interceptor::ValidationLibrary => "validation",
            Interceptor::EnvFactory => "env-factory",
            Interceptor::Process => "process",
        }
    }
}

#[derive(Debug, Clone)]
pub struct InterceptionTable {
    entries: Vec<(&'static str, Interceptor)>,
}

impl Default for InterceptionTable {
    fn default() -> Self {
        Self::standard()
    }
}

impl InterceptionTable {
    pub fn standard() -> Self {
        Self {
            entries: vec![
                ("zod", Interceptor::ValidationLibrary),
                ("@t3-oss/env-nextjs", Interceptor::EnvFactory),
                ("@t3-oss/env-core", Interceptor::EnvFactory),
                ("@t3-oss/env-nuxt", Interceptor::EnvFactory),
                ("process", Interceptor::Process),
            ],
        }
    }

    /// 去掉 `node:` 前缀
    pub fn normalize(specifier: &str) -> &str {
        specifier.strip_prefix("node:").unwrap_or(specifier)
    }

    /// `zod/v4` 这类子路径与包名同等处理
    pub fn resolve(&self, specifier: &str) -> Option<Interceptor> {
        let specifier = Self::normalize(specifier);
        self.entries.iter().find_map(|(name, interceptor)| {
            let matches = specifier == *name
                || specifier
                    .strip_prefix(name)
                    .is_some_and(|rest| rest.starts_with('/'));
            matches.then_some(*interceptor)
        })
    }

    /// 打包时保持外部引用的模块名
    pub fn external_specifiers(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, interceptor)| *interceptor != Interceptor::Process)
            .map(|(name, _)| name.to_string())
            .collect()
    }

    pub fn placeholder_warning(specifier: &str) -> String {
        format!("unresolved import \"{}\" replaced with an empty module", specifier)
    }
}
