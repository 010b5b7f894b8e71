//! 校验规则的纯数据表示。
//!
//! 沙箱中 `z.string().min(1)` 这类链式调用最终落成一个 [`Validator`]，
//! 它不持有任何脚本状态，可以跨线程传回，并且能直接对变量值求值。

use std::net::IpAddr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Validator {
    pub kind: ValidatorKind,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checks: Vec<Check>,
    #[serde(default)]
    pub optional: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub coerce: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// 带 transform 的规则只记录，不执行
    #[serde(default)]
    pub transformed: bool,
    /// preprocess 回调留在沙箱里，拿不到转换后的输入，整条规则不做校验
    #[serde(default)]
    pub preprocessed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ValidatorKind {
    String,
    Number,
    Boolean,
    Enum { values: Vec<String> },
    Literal { value: serde_json::Value },
    Date,
    Any,
    Unknown,
    Union { options: Vec<Validator> },
    Array { element: Box<Validator> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum Check {
    Min { value: f64, message: Option<String> },
    Max { value: f64, message: Option<String> },
    Length { value: f64, message: Option<String> },
    Url { message: Option<String> },
    Email { message: Option<String> },
    Uuid { message: Option<String> },
    Regex { pattern: String, flags: String, message: Option<String> },
    StartsWith { value: String, message: Option<String> },
    EndsWith { value: String, message: Option<String> },
    Includes { value: String, message: Option<String> },
    Int { message: Option<String> },
    Positive { message: Option<String> },
    Nonnegative { message: Option<String> },
    Negative { message: Option<String> },
    Finite { message: Option<String> },
    /// ISO 8601 时间戳；`offset` 为 false 时只接受 `Z`
    Datetime { offset: bool, message: Option<String> },
    /// `version` 为 `v4` / `v6`，缺省两者皆可
    Ip { version: Option<String>, message: Option<String> },
    /// 自定义 refine：回调留在沙箱里，这里只保留消息
    Refine { message: Option<String> },
}

/// 被校验的输入
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Input<'a> {
    Missing,
    Null,
    Str(&'a str),
    Number(f64),
    Bool(bool),
    Other(&'static str),
}

impl Input<'_> {
    fn type_name(&self) -> &'static str {
        match self {
            Input::Missing => "undefined",
            Input::Null => "null",
            Input::Str(_) => "string",
            Input::Number(n) if n.is_nan() => "nan",
            Input::Number(_) => "number",
            Input::Bool(_) => "boolean",
            Input::Other(name) => *name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorIssue {
    pub code: String,
    pub message: String,
}

impl ValidatorIssue {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

impl Validator {
    pub fn new(kind: ValidatorKind) -> Self {
        Self {
            kind,
            checks: Vec::new(),
            optional: false,
            nullable: false,
            coerce: false,
            default: None,
            description: None,
            transformed: false,
            preprocessed: false,
        }
    }

    pub fn with_check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    /// 缺省值是否可以接受（optional 或带 default）
    pub fn accepts_missing(&self) -> bool {
        self.optional
            || self.default.is_some()
            || matches!(self.kind, ValidatorKind::Any | ValidatorKind::Unknown)
    }

    pub fn type_label(&self) -> String {
        match &self.kind {
            ValidatorKind::String => "string".to_string(),
            ValidatorKind::Number => "number".to_string(),
            ValidatorKind::Boolean => "boolean".to_string(),
            ValidatorKind::Enum { values } => format!("enum({})", values.join(" | ")),
            ValidatorKind::Literal { value } => format!("literal({})", value),
            ValidatorKind::Date => "date".to_string(),
            ValidatorKind::Array { element } => format!("{}[]", element.type_label()),
            ValidatorKind::Any => "any".to_string(),
            ValidatorKind::Unknown => "unknown".to_string(),
            ValidatorKind::Union { options } => options
                .iter()
                .map(|o| o.type_label())
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// 校验 .env 中的值：None 表示变量不存在
    pub fn validate_env(&self, value: Option<&str>) -> Vec<ValidatorIssue> {
        match value {
            Some(v) => self.validate(Input::Str(v)),
            None => self.validate(Input::Missing),
        }
    }

    pub fn validate(&self, input: Input<'_>) -> Vec<ValidatorIssue> {
        if self.preprocessed {
            return Vec::new();
        }
        match input {
            Input::Missing if self.accepts_missing() => return Vec::new(),
            Input::Missing if !self.coerce => {
                return vec![ValidatorIssue::new("invalid_type", "Required")];
            }
            Input::Null if self.nullable => return Vec::new(),
            _ => {}
        }

        match &self.kind {
            ValidatorKind::Any | ValidatorKind::Unknown => Vec::new(),
            ValidatorKind::String => match self.coerce_string(input) {
                Some(s) => self.string_checks(&s),
                None => vec![self.type_mismatch("string", input)],
            },
            ValidatorKind::Number => match self.coerce_number(input) {
                Some(n) if n.is_nan() => vec![ValidatorIssue::new(
                    "invalid_type",
                    "Expected number, received nan",
                )],
                Some(n) => self.number_checks(n),
                None => vec![self.type_mismatch("number", input)],
            },
            ValidatorKind::Boolean => match (input, self.coerce) {
                (Input::Bool(_), _) | (_, true) => Vec::new(),
                _ => vec![self.type_mismatch("boolean", input)],
            },
            ValidatorKind::Enum { values } => match input {
                Input::Str(s) if values.iter().any(|v| v == s) => Vec::new(),
                Input::Str(s) => vec![ValidatorIssue::new(
                    "invalid_enum_value",
                    format!(
                        "Invalid enum value. Expected {}, received '{}'",
                        values
                            .iter()
                            .map(|v| format!("'{}'", v))
                            .collect::<Vec<_>>()
                            .join(" | "),
                        s
                    ),
                )],
                other => vec![self.type_mismatch("string", other)],
            },
            ValidatorKind::Literal { value } => {
                if literal_matches(value, input) {
                    Vec::new()
                } else {
                    vec![ValidatorIssue::new(
                        "invalid_literal",
                        format!("Invalid literal value, expected {}", value),
                    )]
                }
            }
            ValidatorKind::Union { options } => {
                if options.iter().any(|o| o.validate(input).is_empty()) {
                    Vec::new()
                } else {
                    vec![ValidatorIssue::new("invalid_union", "Invalid input")]
                }
            }
            ValidatorKind::Date => match (input, self.coerce) {
                (Input::Other("date"), _) => Vec::new(),
                (Input::Number(n), true) if n.is_finite() => Vec::new(),
                (Input::Str(s), true) if iso_date_regex().is_match(s.trim()) => Vec::new(),
                (_, true) => vec![ValidatorIssue::new("invalid_date", "Invalid date")],
                (other, false) => vec![self.type_mismatch("date", other)],
            },
            // 元素只在沙箱里校验；这里只区分是不是数组
            ValidatorKind::Array { .. } => match input {
                Input::Other("array") => Vec::new(),
                other => vec![self.type_mismatch("array", other)],
            },
        }
    }

    fn type_mismatch(&self, expected: &str, input: Input<'_>) -> ValidatorIssue {
        if input == Input::Missing {
            return ValidatorIssue::new("invalid_type", "Required");
        }
        ValidatorIssue::new(
            "invalid_type",
            format!("Expected {}, received {}", expected, input.type_name()),
        )
    }

    fn coerce_string(&self, input: Input<'_>) -> Option<String> {
        match input {
            Input::Str(s) => Some(s.to_string()),
            _ if !self.coerce => None,
            Input::Missing => Some("undefined".to_string()),
            Input::Null => Some("null".to_string()),
            Input::Number(n) => Some(format_number(n)),
            Input::Bool(b) => Some(b.to_string()),
            Input::Other(_) => Some("[object Object]".to_string()),
        }
    }

    fn coerce_number(&self, input: Input<'_>) -> Option<f64> {
        match input {
            Input::Number(n) => Some(n),
            _ if !self.coerce => None,
            Input::Str(s) => Some(parse_js_number(s)),
            Input::Bool(b) => Some(if b { 1.0 } else { 0.0 }),
            Input::Null => Some(0.0),
            Input::Missing | Input::Other(_) => Some(f64::NAN),
        }
    }

    fn string_checks(&self, s: &str) -> Vec<ValidatorIssue> {
        let len = s.chars().count() as f64;
        let mut issues = Vec::new();
        for check in &self.checks {
            let failed = match check {
                Check::Min { value, message } if len < *value => Some(issue_or(
                    "too_small",
                    message,
                    format!("String must contain at least {} character(s)", value),
                )),
                Check::Max { value, message } if len > *value => Some(issue_or(
                    "too_big",
                    message,
                    format!("String must contain at most {} character(s)", value),
                )),
                Check::Length { value, message } if len != *value => Some(issue_or(
                    if len < *value { "too_small" } else { "too_big" },
                    message,
                    format!("String must contain exactly {} character(s)", value),
                )),
                Check::Url { message } if url::Url::parse(s).is_err() => {
                    Some(issue_or("invalid_string", message, "Invalid url"))
                }
                Check::Email { message } if !email_regex().is_match(s) => {
                    Some(issue_or("invalid_string", message, "Invalid email"))
                }
                Check::Uuid { message } if uuid::Uuid::parse_str(s).is_err() => {
                    Some(issue_or("invalid_string", message, "Invalid uuid"))
                }
                Check::Regex {
                    pattern,
                    flags,
                    message,
                } => match compile_js_regex(pattern, flags) {
                    Some(re) if !re.is_match(s) => {
                        Some(issue_or("invalid_string", message, "Invalid"))
                    }
                    _ => None,
                },
                Check::StartsWith { value, message } if !s.starts_with(value.as_str()) => {
                    Some(issue_or(
                        "invalid_string",
                        message,
                        format!("Invalid input: must start with \"{}\"", value),
                    ))
                }
                Check::EndsWith { value, message } if !s.ends_with(value.as_str()) => Some(issue_or(
                    "invalid_string",
                    message,
                    format!("Invalid input: must end with \"{}\"", value),
                )),
                Check::Includes { value, message } if !s.contains(value.as_str()) => Some(issue_or(
                    "invalid_string",
                    message,
                    format!("Invalid input: must include \"{}\"", value),
                )),
                Check::Datetime { offset, message } if !datetime_matches(s, *offset) => {
                    Some(issue_or("invalid_string", message, "Invalid datetime"))
                }
                Check::Ip { version, message } if !ip_matches(s, version.as_deref()) => {
                    Some(issue_or("invalid_string", message, "Invalid ip"))
                }
                _ => None,
            };
            issues.extend(failed);
        }
        issues
    }

    fn number_checks(&self, n: f64) -> Vec<ValidatorIssue> {
        let mut issues = Vec::new();
        for check in &self.checks {
            let failed = match check {
                Check::Min { value, message } if n < *value => Some(issue_or(
                    "too_small",
                    message,
                    format!("Number must be greater than or equal to {}", value),
                )),
                Check::Max { value, message } if n > *value => Some(issue_or(
                    "too_big",
                    message,
                    format!("Number must be less than or equal to {}", value),
                )),
                Check::Int { message } if n.fract() != 0.0 => Some(issue_or(
                    "invalid_type",
                    message,
                    "Expected integer, received float",
                )),
                Check::Positive { message } if n <= 0.0 => {
                    Some(issue_or("too_small", message, "Number must be greater than 0"))
                }
                Check::Nonnegative { message } if n < 0.0 => Some(issue_or(
                    "too_small",
                    message,
                    "Number must be greater than or equal to 0",
                )),
                Check::Negative { message } if n >= 0.0 => {
                    Some(issue_or("too_big", message, "Number must be less than 0"))
                }
                Check::Finite { message } if !n.is_finite() => {
                    Some(issue_or("not_finite", message, "Number must be finite"))
                }
                _ => None,
            };
            issues.extend(failed);
        }
        issues
    }
}

fn issue_or(code: &str, custom: &Option<String>, fallback: impl Into<String>) -> ValidatorIssue {
    match custom {
        Some(message) => ValidatorIssue::new(code, message.clone()),
        None => ValidatorIssue::new(code, fallback),
    }
}

fn literal_matches(literal: &serde_json::Value, input: Input<'_>) -> bool {
    match (literal, input) {
        (serde_json::Value::String(l), Input::Str(s)) => l == s,
        (serde_json::Value::Bool(l), Input::Bool(b)) => *l == b,
        (serde_json::Value::Number(l), Input::Number(n)) => l.as_f64() == Some(n),
        (serde_json::Value::Null, Input::Null) => true,
        _ => false,
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+'-]+@[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern is valid")
    })
}

fn iso_date_regex() -> &'static Regex {
    static DATE: OnceLock<Regex> = OnceLock::new();
    DATE.get_or_init(|| {
        Regex::new(
            r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:?\d{2})?)?$",
        )
        .expect("date pattern is valid")
    })
}

fn datetime_matches(s: &str, offset: bool) -> bool {
    static UTC: OnceLock<Regex> = OnceLock::new();
    static OFFSET: OnceLock<Regex> = OnceLock::new();
    let re = if offset {
        OFFSET.get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}(:?\d{2})?)$")
                .expect("datetime pattern is valid")
        })
    } else {
        UTC.get_or_init(|| {
            Regex::new(r"^\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(\.\d+)?Z$")
                .expect("datetime pattern is valid")
        })
    };
    re.is_match(s)
}

fn ip_matches(s: &str, version: Option<&str>) -> bool {
    match (s.parse::<IpAddr>(), version) {
        (Ok(IpAddr::V4(_)), Some("v6")) | (Ok(IpAddr::V6(_)), Some("v4")) => false,
        (Ok(_), _) => true,
        (Err(_), _) => false,
    }
}

/// 把 JS 正则（源码 + flags）转换为 regex crate 的写法；不支持的语法返回 None
pub fn compile_js_regex(pattern: &str, flags: &str) -> Option<Regex> {
    let mut inline = String::new();
    for flag in flags.chars() {
        match flag {
            'i' | 'm' | 's' => inline.push(flag),
            _ => {}
        }
    }
    let source = if inline.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", inline, pattern)
    };
    Regex::new(&source).ok()
}

/// 与 JS Number(str) 一致的字符串转数字
pub fn parse_js_number(raw: &str) -> f64 {
    let s = raw.trim();
    if s.is_empty() {
        return 0.0;
    }
    let lower = s.to_ascii_lowercase();
    let radix = if lower.starts_with("0x") {
        Some(16)
    } else if lower.starts_with("0o") {
        Some(8)
    } else if lower.starts_with("0b") {
        Some(2)
    } else {
        None
    };
    if let Some(radix) = radix {
        return i64::from_str_radix(&s[2..], radix)
            .map(|n| n as f64)
            .unwrap_or(f64::NAN);
    }
    match s {
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ if s.contains(|c: char| c.is_ascii_alphabetic() && c != 'e' && c != 'E') => f64::NAN,
        _ => s.parse::<f64>().unwrap_or(f64::NAN),
    }
}

/// JS 风格的数字格式化：整数不带小数点
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}
