//! 创建上下文
//!
//! 原型 Bean 无法通过早期引用打破循环，只能快速失败。判断"是否正在创建"所需的状态
//! 不放在线程局部变量里，而是作为 [`CreationContext`] 显式地沿着递归的 `get` 调用传递。

use std::any::Any;
use std::sync::Arc;

use crate::bean_factory::DefaultListableBeanFactory;
use crate::config::Environment;
use crate::error::{ContainerError, ContainerResult};
use crate::reflect::ObjectRef;

/// 一次顶层获取 Bean 调用的创建上下文
#[derive(Debug, Default)]
pub struct CreationContext {
    /// 正在创建的非单例 Bean
    prototypes_in_creation: Vec<String>,
    /// 当前创建路径（用于诊断）
    path: Vec<String>,
}

impl CreationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_prototype_in_creation(&self, name: &str) -> bool {
        self.prototypes_in_creation.iter().any(|n| n == name)
    }

    pub(crate) fn begin_prototype(&mut self, name: &str) {
        self.prototypes_in_creation.push(name.to_string());
    }

    pub(crate) fn end_prototype(&mut self, name: &str) {
        if let Some(pos) = self.prototypes_in_creation.iter().rposition(|n| n == name) {
            self.prototypes_in_creation.remove(pos);
        }
    }

    pub(crate) fn enter(&mut self, name: &str) {
        self.path.push(name.to_string());
    }

    pub(crate) fn leave(&mut self) {
        self.path.pop();
    }

    /// 从顶层请求到当前 Bean 的创建路径
    pub fn creation_path(&self) -> &[String] {
        &self.path
    }
}

/// 构造函数注入入口
///
/// 通过它获取的 Bean 会被登记为当前 Bean 的依赖。
pub struct BeanResolver<'a> {
    factory: &'a DefaultListableBeanFactory,
    ctx: &'a mut CreationContext,
    requesting: &'a str,
}

impl<'a> BeanResolver<'a> {
    pub(crate) fn new(
        factory: &'a DefaultListableBeanFactory,
        ctx: &'a mut CreationContext,
        requesting: &'a str,
    ) -> Self {
        Self {
            factory,
            ctx,
            requesting,
        }
    }

    /// 正在创建的 Bean 名称
    pub fn bean_name(&self) -> &str {
        self.requesting
    }

    /// 按名称获取依赖
    pub fn get(&mut self, name: &str) -> ContainerResult<ObjectRef> {
        let bean = self.factory.do_get_bean(name, self.ctx)?;
        self.factory.register_dependent_bean(name, self.requesting);
        Ok(bean)
    }

    /// 按名称获取依赖并转换为具体类型
    pub fn get_typed<T: Any + Send + Sync>(&mut self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.get(name)?;
        bean.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: bean.type_name().to_string(),
        })
    }

    /// 按类型名（类型或接口名称）获取唯一依赖
    pub fn get_by_type_name(&mut self, type_name: &str) -> ContainerResult<ObjectRef> {
        let name = self
            .factory
            .resolve_unique_bean_name(type_name)?
            .ok_or_else(|| ContainerError::BeanDefinitionNotFound(type_name.to_string()))?;
        self.get(&name)
    }

    pub fn environment(&self) -> &Environment {
        self.factory.environment()
    }

    /// 解析 `${key:default}` 占位符
    pub fn resolve_placeholders(&self, text: &str) -> ContainerResult<String> {
        self.factory.environment().resolve_placeholders(text)
    }

    pub fn factory(&self) -> &DefaultListableBeanFactory {
        self.factory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prototype_tracking_is_nested() {
        let mut ctx = CreationContext::new();
        ctx.begin_prototype("a");
        ctx.begin_prototype("b");
        assert!(ctx.is_prototype_in_creation("a"));
        ctx.end_prototype("b");
        assert!(!ctx.is_prototype_in_creation("b"));
        ctx.end_prototype("a");
        assert!(!ctx.is_prototype_in_creation("a"));
    }

    #[test]
    fn test_creation_path() {
        let mut ctx = CreationContext::new();
        ctx.enter("userService");
        ctx.enter("orderService");
        assert_eq!(ctx.creation_path(), &["userService".to_string(), "orderService".to_string()]);
        ctx.leave();
        assert_eq!(ctx.creation_path().len(), 1);
    }
}
