//! BeanPostProcessor - Bean 工厂扩展机制
//!
//! 提供在 Bean 生命周期不同阶段进行自定义处理的钩子

use crate::bean::BeanDefinition;
use crate::error::ContainerResult;
use crate::reflect::ObjectRef;

/// BeanPostProcessor trait
///
/// 在 Bean 创建的不同阶段提供钩子，允许替换或包装 Bean 实例。
/// 钩子按 [`order`](BeanPostProcessor::order) 升序调用：
///
/// 1. `post_process_before_instantiation`：返回 `Some` 时跳过常规实例化
/// 2. `get_early_bean_reference`：单例被循环依赖提前引用时调用
/// 3. `post_process_before_initialization`：init 回调之前
/// 4. `post_process_after_initialization`：init 回调之后
///
/// # 示例
///
/// ```ignore
/// struct LoggingBeanPostProcessor;
///
/// impl BeanPostProcessor for LoggingBeanPostProcessor {
///     fn post_process_after_initialization(
///         &self,
///         bean: ObjectRef,
///         bean_name: &str,
///     ) -> ContainerResult<ObjectRef> {
///         tracing::info!("After initialization: {}", bean_name);
///         Ok(bean)
///     }
/// }
/// ```
pub trait BeanPostProcessor: Send + Sync {
    /// 在实例化之前调用
    ///
    /// 返回 `Some` 时该对象直接作为 Bean（只会再经过 after-initialization 钩子），
    /// 不再执行实例化、属性填充和 init 回调。
    fn post_process_before_instantiation(
        &self,
        _definition: &BeanDefinition,
        _bean_name: &str,
    ) -> ContainerResult<Option<ObjectRef>> {
        Ok(None)
    }

    /// 获取早期引用
    ///
    /// 仅在单例尚未创建完成、却被其他 Bean 引用时调用。这里返回的对象会被依赖方持有，
    /// 之后对同一 Bean 调用 `post_process_after_initialization` 时不应再次包装。
    fn get_early_bean_reference(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
        Ok(bean)
    }

    /// 在 Bean 初始化回调（init）之前调用
    fn post_process_before_initialization(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
        // 默认实现：直接返回原始 Bean
        Ok(bean)
    }

    /// 在 Bean 初始化回调（init）之后调用
    ///
    /// # 典型用途
    /// - 创建 AOP 代理
    /// - 包装 Bean
    fn post_process_after_initialization(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
        // 默认实现：直接返回原始 Bean
        Ok(bean)
    }

    /// 获取处理器的名称（用于日志和调试）
    fn name(&self) -> &str {
        "BeanPostProcessor"
    }

    /// 获取处理器的优先级（数字越小优先级越高）
    fn order(&self) -> i32 {
        1000
    }
}
