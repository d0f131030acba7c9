//! 可延迟写入的注入槽
//!
//! 对象在属性填充之前就可能以早期引用的形式被其他对象持有，因此依赖不能通过
//! `&mut self` 写入。[`Autowired`] 是一个只允许写入一次的槽，由
//! [`Reflective::set_property`](crate::Reflective::set_property) 的实现负责填充。

use std::fmt;

use once_cell::sync::OnceCell;

use crate::reflect::{InjectionValue, ObjectRef};
use crate::ConfigValue;

/// 只写一次的注入槽
pub struct Autowired<T = ObjectRef> {
    cell: OnceCell<T>,
}

impl<T> Autowired<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// 写入依赖，重复写入返回错误
    pub fn inject(&self, value: T) -> anyhow::Result<()> {
        self.cell
            .set(value)
            .map_err(|_| anyhow::anyhow!("Dependency has already been injected"))
    }

    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }

    /// 获取依赖，未注入时返回错误
    pub fn require(&self, what: &str) -> anyhow::Result<&T> {
        self.cell
            .get()
            .ok_or_else(|| anyhow::anyhow!("Dependency '{}' has not been injected yet", what))
    }

    pub fn is_injected(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl Autowired<ObjectRef> {
    /// 从注入值中取出 bean 引用并写入
    pub fn inject_value(&self, name: &str, value: InjectionValue) -> anyhow::Result<()> {
        match value {
            InjectionValue::Bean(bean) => self.inject(bean),
            InjectionValue::Config(_) => {
                anyhow::bail!("Property '{}' expects a bean reference, got a config value", name)
            }
        }
    }
}

impl Autowired<ConfigValue> {
    /// 从注入值中取出配置值并写入
    pub fn inject_value(&self, name: &str, value: InjectionValue) -> anyhow::Result<()> {
        match value {
            InjectionValue::Config(config) => self.inject(config),
            InjectionValue::Bean(_) => {
                anyhow::bail!("Property '{}' expects a config value, got a bean reference", name)
            }
        }
    }
}

impl<T> Default for Autowired<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Autowired<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => f.debug_tuple("Autowired").field(value).finish(),
            None => f.write_str("Autowired(<pending>)"),
        }
    }
}
