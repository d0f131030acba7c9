//! 切面（Aspect）定义
//!
//! 切面是横切关注点的模块化：一个切点加上一组可选的通知钩子。切面通过
//! [`advisors_for_aspect`] 转换为 Advisor 后参与代理。

use std::fmt;
use std::sync::Arc;

use chimera_beans::{ObjectRef, Value};

use crate::advice::{Advice, MethodInterceptor};
use crate::advisor::{Advisor, DefaultPointcutAdvisor};
use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;
use crate::{JoinPoint, PointcutExpression};

/// 切面 Trait
///
/// 实现此 trait 以定义切面逻辑，所有通知钩子都有默认实现
pub trait Aspect: Send + Sync {
    /// 切面名称
    fn name(&self) -> &str;

    /// 切点表达式
    fn pointcut(&self) -> &PointcutExpression;

    /// 优先级，越小越先执行
    fn order(&self) -> Option<i32> {
        None
    }

    /// 前置通知，返回错误时目标方法不会执行
    fn before(&self, _join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// 后置通知，无论成功失败都会执行
    fn after(&self, _join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// 返回后通知
    fn after_returning(&self, _join_point: &JoinPoint<'_>, _result: &Value) -> anyhow::Result<()> {
        Ok(())
    }

    /// 异常通知
    fn after_throwing(&self, _join_point: &JoinPoint<'_>, _error: &anyhow::Error) -> anyhow::Result<()> {
        Ok(())
    }

    /// 环绕通知
    fn around(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        invocation.proceed()
    }
}

/// 把切面的全部钩子组合成一个拦截器
///
/// 执行顺序：before → around（内部 proceed）→ after_returning / after_throwing → after
pub struct AspectInterceptor {
    aspect: Arc<dyn Aspect>,
}

impl AspectInterceptor {
    pub fn new(aspect: Arc<dyn Aspect>) -> Self {
        Self { aspect }
    }
}

impl MethodInterceptor for AspectInterceptor {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        self.aspect.before(&invocation.join_point())?;

        let outcome = match self.aspect.around(invocation) {
            Ok(result) => self
                .aspect
                .after_returning(&invocation.join_point(), &result)
                .map(|_| result),
            Err(error) => match self.aspect.after_throwing(&invocation.join_point(), &error) {
                Ok(()) => Err(error),
                Err(advice_error) => Err(advice_error),
            },
        };

        match (outcome, self.aspect.after(&invocation.join_point())) {
            (outcome, Ok(())) => outcome,
            (Ok(_), Err(after_error)) => Err(after_error),
            (Err(error), Err(after_error)) => {
                tracing::warn!(
                    "After advice of aspect '{}' failed while the method had already failed: {}",
                    self.aspect.name(),
                    after_error
                );
                Err(error)
            }
        }
    }
}

impl fmt::Debug for AspectInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AspectInterceptor")
            .field("aspect", &self.aspect.name())
            .finish()
    }
}

/// 把切面转换为 Advisor
pub fn advisors_for_aspect(aspect: Arc<dyn Aspect>) -> Vec<Arc<dyn Advisor>> {
    let advisor = DefaultPointcutAdvisor::new(
        aspect.pointcut().clone(),
        Advice::Around(Arc::new(AspectInterceptor::new(Arc::clone(&aspect)))),
    )
    .with_name(aspect.name());
    let advisor = match aspect.order() {
        Some(order) => advisor.with_order(order),
        None => advisor,
    };
    vec![advisor.shared()]
}

/// 把切面 Bean（类型为 `Arc<dyn Aspect>`）转换为 Advisor
pub fn advisors_for_aspect_bean(bean: &ObjectRef) -> AopResult<Vec<Arc<dyn Advisor>>> {
    let aspect = bean
        .downcast_ref::<Arc<dyn Aspect>>()
        .ok_or_else(|| AopError::NotAnAspect(bean.type_name().to_string()))?;
    Ok(advisors_for_aspect(Arc::clone(aspect)))
}

/// 切面注册器
///
/// 用于 inventory 在编译期收集切面，见 [`InventoryAdvisorSource`](crate::InventoryAdvisorSource)
pub struct AspectRegistration {
    /// 切面名称
    pub name: &'static str,

    /// 创建切面实例的函数
    pub creator: fn() -> Arc<dyn Aspect>,
}

impl AspectRegistration {
    pub const fn new(name: &'static str, creator: fn() -> Arc<dyn Aspect>) -> Self {
        Self { name, creator }
    }

    /// 创建切面实例
    pub fn create_instance(&self) -> Arc<dyn Aspect> {
        (self.creator)()
    }
}

inventory::collect!(AspectRegistration);

/// 获取所有注册的切面注册器
pub fn get_all_aspect_registrations() -> impl Iterator<Item = &'static AspectRegistration> {
    inventory::iter::<AspectRegistration>()
}

// ============================================================================
// 预定义的常用切面
// ============================================================================

/// 日志切面 - 记录方法调用
pub struct LoggingAspect {
    log_args: bool,
    pointcut: PointcutExpression,
    order: Option<i32>,
}

impl LoggingAspect {
    pub fn new(pointcut: PointcutExpression) -> Self {
        Self {
            log_args: false,
            pointcut,
            order: None,
        }
    }

    pub fn with_args(mut self) -> Self {
        self.log_args = true;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }
}

impl Aspect for LoggingAspect {
    fn name(&self) -> &str {
        "LoggingAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn before(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        if self.log_args {
            tracing::info!("Entering: {} with {} args", join_point.signature(), join_point.args.len());
        } else {
            tracing::info!("Entering: {}", join_point.signature());
        }
        Ok(())
    }

    fn after(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        let elapsed = join_point.timestamp.elapsed();
        tracing::info!("Exiting: {} (took {:?})", join_point.signature(), elapsed);
        Ok(())
    }

    fn after_throwing(&self, join_point: &JoinPoint<'_>, error: &anyhow::Error) -> anyhow::Result<()> {
        tracing::error!("Exception in {}: {}", join_point.signature(), error);
        Ok(())
    }
}

/// 性能监控切面
pub struct PerformanceAspect {
    threshold_ms: u128,
    pointcut: PointcutExpression,
}

impl PerformanceAspect {
    pub fn new(threshold_ms: u128, pointcut: PointcutExpression) -> Self {
        Self {
            threshold_ms,
            pointcut,
        }
    }
}

impl Aspect for PerformanceAspect {
    fn name(&self) -> &str {
        "PerformanceAspect"
    }

    fn pointcut(&self) -> &PointcutExpression {
        &self.pointcut
    }

    fn after(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        let elapsed = join_point.timestamp.elapsed().as_millis();
        if elapsed > self.threshold_ms {
            tracing::warn!(
                "Slow method detected: {} took {}ms (threshold: {}ms)",
                join_point.signature(),
                elapsed,
                self.threshold_ms
            );
        }
        Ok(())
    }
}
