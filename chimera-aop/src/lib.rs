//! Chimera AOP - 面向切面编程支持
//!
//! 提供类似 Spring 的代理式 AOP：
//! - 切点（类型/方法模式、正则、execution 表达式、运行时参数匹配）与 Advisor
//! - 多种通知类型（Before、After、Around、AfterReturning、AfterThrowing、引入）
//! - 通知适配器注册表，可扩展自定义通知类型
//! - 按方法缓存的拦截链，拦截器可以多次 proceed
//! - 接口代理和子类代理，运行时可通过 [`Advised`] 修改配置
//! - 通过 BeanPostProcessor 自动代理容器中的 Bean，循环依赖时依赖方拿到的也是最终代理

pub mod adapter;
pub mod advice;
pub mod advised;
pub mod advisor;
pub mod aspect;
pub mod auto_proxy;
pub mod chain;
pub mod config;
pub mod error;
pub mod invocation;
pub mod joinpoint;
pub mod matching;
pub mod pointcut;
pub mod proxy;
pub mod proxy_factory;
pub mod source;
pub mod target_source;

// 重新导出核心类型
pub use adapter::{global_adapter_registry, AdvisorAdapter, AdvisorAdapterRegistry, DefaultAdvisorAdapterRegistry};
pub use advice::{
    Advice, AdviceType, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, BeforeAdvice, IntroductionInterceptor,
    MethodInterceptor,
};
pub use advised::{Advised, AdvisedSupport};
pub use advisor::{Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor, IntroductionAdvisor, PointcutAdvisor};
pub use aspect::{Aspect, AspectRegistration, LoggingAspect, PerformanceAspect};
pub use auto_proxy::{AutoProxyCreator, TargetSourceCreator};
pub use chain::{AdvisorChainFactory, ChainEntry, DefaultAdvisorChainFactory};
pub use config::AopSettings;
pub use error::{AopError, AopResult};
pub use invocation::MethodInvocation;
pub use joinpoint::JoinPoint;
pub use pointcut::{DynamicPointcut, Pointcut, PointcutExpression, TypeFilter};
pub use proxy::{as_advised, is_aop_proxy, ProxyStrategy};
pub use proxy_factory::ProxyFactory;
pub use source::{
    AdvisorSource, BeanFactoryAdvisorSource, CompositeAdvisorSource, FnAdvisorSource, InventoryAdvisorSource,
    StaticAdvisorSource,
};
pub use target_source::{HotSwappableTargetSource, PrototypeTargetSource, SingletonTargetSource, TargetSource};

// 导出 inventory 供切面注册使用
pub use inventory;

/// 预导入模块
pub mod prelude {
    pub use crate::advice::*;
    pub use crate::advised::Advised;
    pub use crate::advisor::{Advisor, DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    pub use crate::aspect::{Aspect, AspectRegistration};
    pub use crate::auto_proxy::AutoProxyCreator;
    pub use crate::config::AopSettings;
    pub use crate::error::{AopError, AopResult};
    pub use crate::invocation::MethodInvocation;
    pub use crate::joinpoint::JoinPoint;
    pub use crate::pointcut::{DynamicPointcut, Pointcut, PointcutExpression};
    pub use crate::proxy::{as_advised, is_aop_proxy};
    pub use crate::proxy_factory::ProxyFactory;
}

/// 注册切面
///
/// ```ignore
/// chimera_aop::register_aspect!("auditAspect", || {
///     Arc::new(LoggingAspect::new(PointcutExpression::type_pattern("*Service")))
/// });
/// ```
#[macro_export]
macro_rules! register_aspect {
    ($name:expr, $creator:expr) => {
        $crate::inventory::submit! {
            $crate::AspectRegistration::new($name, $creator)
        }
    };
}
