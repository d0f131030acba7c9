//! AOP 配置

use chimera_beans::{Environment, MapPropertySource};
use serde::Deserialize;

use crate::error::{AopError, AopResult};

/// 自动代理行为开关
///
/// 可以从 TOML 的 `[chimera.aop]` 表反序列化，也可以从 [`Environment`] 的
/// `chimera.aop.*` 键读取。
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct AopSettings {
    /// 总是使用子类代理，即使目标实现了接口
    pub proxy_target_class: bool,

    /// 创建代理后冻结其配置
    pub freeze_proxies: bool,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    chimera: ChimeraSection,
}

#[derive(Debug, Default, Deserialize)]
struct ChimeraSection {
    #[serde(default)]
    aop: AopSettings,
}

impl AopSettings {
    pub const PREFIX: &'static str = "chimera.aop";

    pub fn with_proxy_target_class(mut self, proxy_target_class: bool) -> Self {
        self.proxy_target_class = proxy_target_class;
        self
    }

    pub fn with_freeze_proxies(mut self, freeze: bool) -> Self {
        self.freeze_proxies = freeze;
        self
    }

    /// 从 TOML 文本读取 `[chimera.aop]`
    pub fn from_toml(content: &str) -> AopResult<Self> {
        let document: SettingsDocument = toml::from_str(content)
            .map_err(|e| AopError::Other(anyhow::anyhow!("Failed to parse AOP settings: {}", e)))?;
        Ok(document.chimera.aop)
    }

    /// 从 Environment 读取，缺失的键使用默认值
    pub fn from_environment(environment: &Environment) -> Self {
        let key = |name: &str| format!("{}.{}", Self::PREFIX, name);
        Self {
            proxy_target_class: environment.get_bool_or(&key("proxy-target-class"), false),
            freeze_proxies: environment.get_bool_or(&key("freeze-proxies"), false),
        }
    }

    /// 转为属性源，便于合并到其他 Environment
    pub fn to_property_source(&self) -> MapPropertySource {
        let key = |name: &str| format!("{}.{}", Self::PREFIX, name);
        MapPropertySource::new("aopSettings")
            .with_property(key("proxy-target-class"), self.proxy_target_class)
            .with_property(key("freeze-proxies"), self.freeze_proxies)
    }
}
