//! 通知适配器注册表
//!
//! 拦截链中只有 [`MethodInterceptor`]，其他通知类型由适配器包装成拦截器。
//! 新的通知类型（[`Advice::Custom`]）通过注册 [`AdvisorAdapter`] 支持。

use std::sync::Arc;

use chimera_beans::Value;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::advice::{
    Advice, AfterAdvice, AfterReturningAdvice, AfterThrowingAdvice, AdviceType, BeforeAdvice, MethodInterceptor,
};
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;

/// 通知适配器 SPI
pub trait AdvisorAdapter: Send + Sync {
    /// 是否能处理该通知
    fn supports_advice(&self, advice: &Advice) -> bool;

    /// 把 Advisor 的通知包装为拦截器
    fn get_interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>>;
}

/// 适配器注册表 SPI
pub trait AdvisorAdapterRegistry: Send + Sync {
    /// 把单独的通知包装为作用于所有方法的 Advisor
    fn wrap(&self, advice: Advice) -> AopResult<Arc<dyn Advisor>>;

    /// 获取 Advisor 对应的拦截器（可能有多个）
    fn get_interceptors(&self, advisor: &dyn Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>>;

    /// 是否存在能处理该通知的适配器
    fn supports(&self, advice: &Advice) -> bool;

    /// 注册新的适配器
    fn register_advisor_adapter(&self, adapter: Arc<dyn AdvisorAdapter>);
}

/// 前置通知拦截器
pub struct BeforeAdviceInterceptor {
    advice: Arc<dyn BeforeAdvice>,
}

impl BeforeAdviceInterceptor {
    pub fn new(advice: Arc<dyn BeforeAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for BeforeAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        self.advice.before(&invocation.join_point())?;
        invocation.proceed()
    }
}

/// 返回后通知拦截器
pub struct AfterReturningAdviceInterceptor {
    advice: Arc<dyn AfterReturningAdvice>,
}

impl AfterReturningAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterReturningAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterReturningAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let result = invocation.proceed()?;
        self.advice.after_returning(&invocation.join_point(), &result)?;
        Ok(result)
    }
}

/// 异常通知拦截器
pub struct AfterThrowingAdviceInterceptor {
    advice: Arc<dyn AfterThrowingAdvice>,
}

impl AfterThrowingAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterThrowingAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterThrowingAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        match invocation.proceed() {
            Ok(result) => Ok(result),
            Err(error) => {
                self.advice.after_throwing(&invocation.join_point(), &error)?;
                Err(error)
            }
        }
    }
}

/// 后置（finally）通知拦截器
pub struct AfterAdviceInterceptor {
    advice: Arc<dyn AfterAdvice>,
}

impl AfterAdviceInterceptor {
    pub fn new(advice: Arc<dyn AfterAdvice>) -> Self {
        Self { advice }
    }
}

impl MethodInterceptor for AfterAdviceInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        let result = invocation.proceed();
        let after = self.advice.after(&invocation.join_point());
        match (result, after) {
            (Ok(value), Ok(())) => Ok(value),
            (Err(error), Ok(())) => Err(error),
            (Ok(_), Err(after_error)) => Err(after_error),
            (Err(error), Err(after_error)) => {
                tracing::warn!(
                    "After advice on {} failed while the method had already failed: {}",
                    invocation.method(),
                    after_error
                );
                Err(error)
            }
        }
    }
}

/// 前置通知适配器
#[derive(Debug, Default)]
pub struct BeforeAdviceAdapter;

impl AdvisorAdapter for BeforeAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::Before(_))
    }

    fn get_interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::Before(advice) => Ok(Arc::new(BeforeAdviceInterceptor::new(Arc::clone(advice)))),
            other => Err(AopError::UnknownAdviceType(other.advice_type().to_string())),
        }
    }
}

/// 返回后通知适配器
#[derive(Debug, Default)]
pub struct AfterReturningAdviceAdapter;

impl AdvisorAdapter for AfterReturningAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterReturning(_))
    }

    fn get_interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterReturning(advice) => Ok(Arc::new(AfterReturningAdviceInterceptor::new(Arc::clone(advice)))),
            other => Err(AopError::UnknownAdviceType(other.advice_type().to_string())),
        }
    }
}

/// 异常通知适配器
#[derive(Debug, Default)]
pub struct AfterThrowingAdviceAdapter;

impl AdvisorAdapter for AfterThrowingAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::AfterThrowing(_))
    }

    fn get_interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::AfterThrowing(advice) => Ok(Arc::new(AfterThrowingAdviceInterceptor::new(Arc::clone(advice)))),
            other => Err(AopError::UnknownAdviceType(other.advice_type().to_string())),
        }
    }
}

/// 后置通知适配器
#[derive(Debug, Default)]
pub struct AfterAdviceAdapter;

impl AdvisorAdapter for AfterAdviceAdapter {
    fn supports_advice(&self, advice: &Advice) -> bool {
        matches!(advice, Advice::After(_))
    }

    fn get_interceptor(&self, advisor: &dyn Advisor) -> AopResult<Arc<dyn MethodInterceptor>> {
        match advisor.advice() {
            Advice::After(advice) => Ok(Arc::new(AfterAdviceInterceptor::new(Arc::clone(advice)))),
            other => Err(AopError::UnknownAdviceType(other.advice_type().to_string())),
        }
    }
}

/// 默认适配器注册表
///
/// 环绕通知和引入本身就是拦截器，直接使用；其余类型交给适配器
pub struct DefaultAdvisorAdapterRegistry {
    adapters: RwLock<Vec<Arc<dyn AdvisorAdapter>>>,
}

impl DefaultAdvisorAdapterRegistry {
    /// 创建包含内置适配器的注册表
    pub fn new() -> Self {
        let adapters: Vec<Arc<dyn AdvisorAdapter>> = vec![
            Arc::new(BeforeAdviceAdapter),
            Arc::new(AfterReturningAdviceAdapter),
            Arc::new(AfterThrowingAdviceAdapter),
            Arc::new(AfterAdviceAdapter),
        ];
        Self {
            adapters: RwLock::new(adapters),
        }
    }
}

impl Default for DefaultAdvisorAdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AdvisorAdapterRegistry for DefaultAdvisorAdapterRegistry {
    fn wrap(&self, advice: Advice) -> AopResult<Arc<dyn Advisor>> {
        if !self.supports(&advice) {
            return Err(AopError::UnknownAdviceType(advice.advice_type().to_string()));
        }
        Ok(DefaultPointcutAdvisor::for_all(advice).shared())
    }

    fn get_interceptors(&self, advisor: &dyn Advisor) -> AopResult<Vec<Arc<dyn MethodInterceptor>>> {
        let advice = advisor.advice();
        let mut interceptors: Vec<Arc<dyn MethodInterceptor>> = Vec::new();

        match advice {
            Advice::Around(interceptor) => interceptors.push(Arc::clone(interceptor)),
            Advice::Introduction(interceptor) => {
                let interceptor: Arc<dyn MethodInterceptor> = Arc::clone(interceptor) as _;
                interceptors.push(interceptor);
            }
            _ => {}
        }

        for adapter in self.adapters.read().iter() {
            if adapter.supports_advice(advice) {
                interceptors.push(adapter.get_interceptor(advisor)?);
            }
        }

        if interceptors.is_empty() {
            return Err(AopError::UnknownAdviceType(advice.advice_type().to_string()));
        }
        Ok(interceptors)
    }

    fn supports(&self, advice: &Advice) -> bool {
        matches!(advice.advice_type(), AdviceType::Around | AdviceType::Introduction)
            || self.adapters.read().iter().any(|adapter| adapter.supports_advice(advice))
    }

    fn register_advisor_adapter(&self, adapter: Arc<dyn AdvisorAdapter>) {
        tracing::debug!("Registering advisor adapter");
        self.adapters.write().push(adapter);
    }
}

static GLOBAL_ADAPTER_REGISTRY: Lazy<Arc<DefaultAdvisorAdapterRegistry>> =
    Lazy::new(|| Arc::new(DefaultAdvisorAdapterRegistry::new()));

/// 获取全局适配器注册表
///
/// 代理配置默认使用它；需要隔离时可以为 [`AdvisedSupport`](crate::AdvisedSupport) 单独指定
pub fn global_adapter_registry() -> Arc<dyn AdvisorAdapterRegistry> {
    GLOBAL_ADAPTER_REGISTRY.clone()
}
