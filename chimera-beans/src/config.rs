use std::collections::HashMap;
use std::fs;
use std::path::Path;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ContainerError, ContainerResult};

/// 配置值类型
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Array(Vec<ConfigValue>),
    Object(HashMap<String, ConfigValue>),
}

impl ConfigValue {
    /// 转换为字符串
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    /// 转换为整数
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(i) => Some(*i),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为浮点数
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(f) => Some(*f),
            ConfigValue::Int(i) => Some(*i as f64),
            ConfigValue::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// 转换为布尔值
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(b) => Some(*b),
            ConfigValue::String(s) => match s.to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// 渲染为字符串（用于占位符替换）
    pub fn render(&self) -> String {
        match self {
            ConfigValue::String(s) => s.clone(),
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Float(f) => f.to_string(),
            ConfigValue::Bool(b) => b.to_string(),
            ConfigValue::Array(values) => values
                .iter()
                .map(ConfigValue::render)
                .collect::<Vec<_>>()
                .join(","),
            ConfigValue::Object(_) => String::from("{...}"),
        }
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        ConfigValue::String(value.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        ConfigValue::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        ConfigValue::Int(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        ConfigValue::Bool(value)
    }
}

/// 配置源 trait
pub trait PropertySource: Send + Sync {
    /// 获取配置源名称
    fn name(&self) -> &str;

    /// 获取配置值
    fn get(&self, key: &str) -> Option<ConfigValue>;

    /// 获取所有配置键
    fn keys(&self) -> Vec<String>;

    /// 配置源优先级（数字越大优先级越高）
    fn priority(&self) -> i32 {
        0
    }
}

/// Environment - 配置管理器
///
/// 按优先级依次查询各配置源，并负责 `${key:default}` 占位符的解析
pub struct Environment {
    /// 配置源列表（按优先级排序）
    sources: RwLock<Vec<Box<dyn PropertySource>>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("sources_count", &self.sources.read().len())
            .finish()
    }
}

impl Environment {
    /// 创建新的环境
    pub fn new() -> Self {
        Self {
            sources: RwLock::new(Vec::new()),
        }
    }

    /// 添加配置源
    pub fn add_property_source(&self, source: Box<dyn PropertySource>) {
        let mut sources = self.sources.write();
        sources.push(source);
        // 按优先级降序排序
        sources.sort_by(|a, b| b.priority().cmp(&a.priority()));
    }

    /// 获取配置值
    pub fn get(&self, key: &str) -> Option<ConfigValue> {
        let sources = self.sources.read();
        for source in sources.iter() {
            if let Some(value) = source.get(key) {
                tracing::trace!("Config '{}' found in source '{}'", key, source.name());
                return Some(value);
            }
        }
        tracing::trace!("Config '{}' not found in any source", key);
        None
    }

    /// 获取字符串配置
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(|v| v.render())
    }

    /// 获取布尔值配置（带默认值）
    pub fn get_bool_or(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    /// 获取整数配置
    pub fn get_i64(&self, key: &str) -> Option<i64> {
        self.get(key).and_then(|v| v.as_i64())
    }

    /// 解析值中的占位符
    ///
    /// 整个字符串恰好是一个占位符时保留配置值原本的类型，否则按字符串替换。
    pub fn resolve_value(&self, text: &str) -> ContainerResult<ConfigValue> {
        if let Some(inner) = text.strip_prefix("${").and_then(|t| t.strip_suffix('}')) {
            if !inner.contains("${") {
                return self.resolve_placeholder(inner);
            }
        }
        self.resolve_placeholders(text).map(ConfigValue::String)
    }

    /// 把文本中的所有 `${key}` / `${key:default}` 替换为配置值
    pub fn resolve_placeholders(&self, text: &str) -> ContainerResult<String> {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find("${") {
            result.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let end = after.find('}').ok_or_else(|| {
                ContainerError::InvalidConfiguration(format!("Unclosed placeholder in '{}'", text))
            })?;
            result.push_str(&self.resolve_placeholder(&after[..end])?.render());
            rest = &after[end + 1..];
        }

        result.push_str(rest);
        Ok(result)
    }

    fn resolve_placeholder(&self, placeholder: &str) -> ContainerResult<ConfigValue> {
        let (key, default) = match placeholder.split_once(':') {
            Some((key, default)) => (key.trim(), Some(default)),
            None => (placeholder.trim(), None),
        };

        match (self.get(key), default) {
            (Some(value), _) => Ok(value),
            (None, Some(default)) => Ok(ConfigValue::String(default.to_string())),
            (None, None) => Err(ContainerError::InvalidConfiguration(format!(
                "Could not resolve placeholder '{}'",
                key
            ))),
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

// ========== Property Sources ==========

/// 环境变量配置源
pub struct EnvironmentPropertySource {
    prefix: String,
    priority: i32,
}

impl EnvironmentPropertySource {
    /// 创建环境变量配置源
    ///
    /// # 参数
    /// * `prefix` - 环境变量前缀，例如 "APP_"
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            priority: 100, // 环境变量优先级较高
        }
    }

    /// 将环境变量名转换为配置键
    /// 例如: APP_DATABASE_URL -> database.url
    fn env_to_key(&self, env_key: &str) -> String {
        env_key
            .strip_prefix(&self.prefix)
            .unwrap_or(env_key)
            .to_lowercase()
            .replace('_', ".")
    }

    /// 将配置键转换为环境变量名
    /// 例如: database.url -> APP_DATABASE_URL
    fn key_to_env(&self, key: &str) -> String {
        format!(
            "{}{}",
            self.prefix,
            key.replace(['.', '-'], "_").to_uppercase()
        )
    }
}

impl PropertySource for EnvironmentPropertySource {
    fn name(&self) -> &str {
        "environment"
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        std::env::var(self.key_to_env(key)).ok().map(ConfigValue::String)
    }

    fn keys(&self) -> Vec<String> {
        std::env::vars()
            .filter(|(k, _)| k.starts_with(&self.prefix))
            .map(|(k, _)| self.env_to_key(&k))
            .collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// TOML 文件配置源
pub struct TomlPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl TomlPropertySource {
    /// 从文件加载 TOML 配置
    pub fn from_file(path: impl AsRef<Path>) -> ContainerResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ContainerError::InvalidConfiguration(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        Self::parse(&content, path.to_string_lossy().to_string())
    }

    /// 从字符串解析 TOML 配置
    pub fn parse(content: &str, name: impl Into<String>) -> ContainerResult<Self> {
        let value: toml::Value = toml::from_str(content)
            .map_err(|e| ContainerError::InvalidConfiguration(format!("Failed to parse TOML: {}", e)))?;

        let mut properties = HashMap::new();
        Self::flatten_toml(&value, String::new(), &mut properties);

        Ok(Self {
            name: name.into(),
            properties,
            priority: 0, // 文件配置优先级最低
        })
    }

    /// 展平 TOML 结构
    /// 例如: { database: { url: "xxx" } } -> { "database.url": "xxx" }
    fn flatten_toml(value: &toml::Value, prefix: String, result: &mut HashMap<String, ConfigValue>) {
        match value {
            toml::Value::Table(table) => {
                for (key, val) in table {
                    let new_prefix = if prefix.is_empty() {
                        key.clone()
                    } else {
                        format!("{}.{}", prefix, key)
                    };
                    Self::flatten_toml(val, new_prefix, result);
                }
            }
            other => {
                result.insert(prefix, Self::toml_value_to_config(other));
            }
        }
    }

    /// 转换 TOML 值为 ConfigValue
    fn toml_value_to_config(value: &toml::Value) -> ConfigValue {
        match value {
            toml::Value::String(s) => ConfigValue::String(s.clone()),
            toml::Value::Integer(i) => ConfigValue::Int(*i),
            toml::Value::Float(f) => ConfigValue::Float(*f),
            toml::Value::Boolean(b) => ConfigValue::Bool(*b),
            toml::Value::Array(arr) => {
                ConfigValue::Array(arr.iter().map(Self::toml_value_to_config).collect())
            }
            toml::Value::Table(table) => ConfigValue::Object(
                table
                    .iter()
                    .map(|(k, v)| (k.clone(), Self::toml_value_to_config(v)))
                    .collect(),
            ),
            toml::Value::Datetime(dt) => ConfigValue::String(dt.to_string()),
        }
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for TomlPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

/// 内存配置源（用于测试或运行时配置）
pub struct MapPropertySource {
    name: String,
    properties: HashMap<String, ConfigValue>,
    priority: i32,
}

impl MapPropertySource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            properties: HashMap::new(),
            priority: 50,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<ConfigValue>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

impl PropertySource for MapPropertySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &str) -> Option<ConfigValue> {
        self.properties.get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.properties.keys().cloned().collect()
    }

    fn priority(&self) -> i32 {
        self.priority
    }
}

// ========== Container Settings ==========

/// 容器行为开关
///
/// 可以从 TOML 的 `[chimera.beans]` 表反序列化，也可以从 [`Environment`]
/// 的 `chimera.beans.*` 键读取。
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ContainerSettings {
    /// 是否通过早期引用解决单例之间的循环依赖
    pub allow_circular_references: bool,

    /// 早期引用已被注入，但最终对象被再次包装时，是否容忍不一致
    pub allow_raw_injection_despite_wrapping: bool,

    /// 是否允许同名定义覆盖
    pub allow_definition_overriding: bool,
}

impl Default for ContainerSettings {
    fn default() -> Self {
        Self {
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            allow_definition_overriding: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    chimera: ChimeraSection,
}

#[derive(Debug, Default, Deserialize)]
struct ChimeraSection {
    #[serde(default)]
    beans: ContainerSettings,
}

impl ContainerSettings {
    pub const PREFIX: &'static str = "chimera.beans";

    /// 从 TOML 文本读取 `[chimera.beans]`
    pub fn from_toml(content: &str) -> ContainerResult<Self> {
        let document: SettingsDocument = toml::from_str(content)
            .map_err(|e| ContainerError::InvalidConfiguration(format!("Failed to parse TOML: {}", e)))?;
        Ok(document.chimera.beans)
    }

    /// 从 Environment 读取，缺失的键使用默认值
    pub fn from_environment(environment: &Environment) -> Self {
        let defaults = Self::default();
        let key = |name: &str| format!("{}.{}", Self::PREFIX, name);
        Self {
            allow_circular_references: environment
                .get_bool_or(&key("allow-circular-references"), defaults.allow_circular_references),
            allow_raw_injection_despite_wrapping: environment.get_bool_or(
                &key("allow-raw-injection-despite-wrapping"),
                defaults.allow_raw_injection_despite_wrapping,
            ),
            allow_definition_overriding: environment
                .get_bool_or(&key("allow-definition-overriding"), defaults.allow_definition_overriding),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn environment() -> Environment {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property("app.name", "chimera")
                .with_property("app.port", 8080i64),
        ));
        env
    }

    #[test]
    fn test_priority_order() {
        let env = environment();
        env.add_property_source(Box::new(
            MapPropertySource::new("override")
                .with_property("app.name", "override")
                .with_priority(200),
        ));
        assert_eq!(env.get_string("app.name").unwrap(), "override");
    }

    #[test]
    fn test_resolve_placeholders() {
        let env = environment();
        assert_eq!(
            env.resolve_placeholders("${app.name}:${app.port}").unwrap(),
            "chimera:8080"
        );
        assert_eq!(env.resolve_placeholders("${missing:fallback}").unwrap(), "fallback");
        assert!(env.resolve_placeholders("${missing}").is_err());
        assert!(env.resolve_placeholders("${app.name").is_err());
    }

    #[test]
    fn test_single_placeholder_keeps_type() {
        let env = environment();
        assert_eq!(env.resolve_value("${app.port}").unwrap(), ConfigValue::Int(8080));
        assert_eq!(
            env.resolve_value("port=${app.port}").unwrap(),
            ConfigValue::String("port=8080".into())
        );
    }

    #[test]
    fn test_toml_flatten() {
        let source = TomlPropertySource::parse(
            "[database]\nurl = \"postgres://localhost\"\npool = 4\n",
            "inline",
        )
        .unwrap();
        assert_eq!(source.get("database.url").unwrap().as_str(), Some("postgres://localhost"));
        assert_eq!(source.get("database.pool").unwrap().as_i64(), Some(4));
    }

    #[test]
    fn test_settings_from_toml() {
        let settings = ContainerSettings::from_toml(
            "[chimera.beans]\nallow-circular-references = false\n",
        )
        .unwrap();
        assert!(!settings.allow_circular_references);
        assert!(!settings.allow_raw_injection_despite_wrapping);

        assert_eq!(ContainerSettings::from_toml("").unwrap(), ContainerSettings::default());
    }

    #[test]
    fn test_settings_from_environment() {
        let env = Environment::new();
        env.add_property_source(Box::new(
            MapPropertySource::new("test")
                .with_property("chimera.beans.allow-raw-injection-despite-wrapping", true),
        ));
        let settings = ContainerSettings::from_environment(&env);
        assert!(settings.allow_circular_references);
        assert!(settings.allow_raw_injection_despite_wrapping);
    }
}
