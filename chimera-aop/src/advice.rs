//! 通知（Advice）定义
//!
//! 定义了在连接点执行的各种动作。环绕通知就是 [`MethodInterceptor`] 本身，其余通知类型
//! 由 [`AdvisorAdapterRegistry`](crate::AdvisorAdapterRegistry) 适配成拦截器。

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use chimera_beans::Value;

use crate::invocation::MethodInvocation;
use crate::JoinPoint;

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdviceType {
    /// 前置通知
    Before,
    /// 后置通知（无论成功还是失败都执行）
    After,
    /// 返回后通知（成功返回时执行）
    AfterReturning,
    /// 异常通知（返回错误时执行）
    AfterThrowing,
    /// 环绕通知（可以控制方法执行）
    Around,
    /// 引入（为代理增加新的接口）
    Introduction,
    /// 需要自定义适配器的通知
    Custom,
}

impl fmt::Display for AdviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdviceType::Before => "before",
            AdviceType::After => "after",
            AdviceType::AfterReturning => "after-returning",
            AdviceType::AfterThrowing => "after-throwing",
            AdviceType::Around => "around",
            AdviceType::Introduction => "introduction",
            AdviceType::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// 前置通知
///
/// 返回错误时目标方法不会执行，错误直接传给调用方
pub trait BeforeAdvice: Send + Sync {
    fn before(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()>;
}

/// 后置通知，在目标方法结束后调用（无论成功还是失败）
pub trait AfterAdvice: Send + Sync {
    fn after(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()>;
}

/// 返回后通知，在目标方法成功返回后调用
pub trait AfterReturningAdvice: Send + Sync {
    fn after_returning(&self, join_point: &JoinPoint<'_>, result: &Value) -> anyhow::Result<()>;
}

/// 异常通知
///
/// 只能观察错误；原始错误总会继续向上传播，除非通知本身失败，此时以通知的错误为准
pub trait AfterThrowingAdvice: Send + Sync {
    fn after_throwing(&self, join_point: &JoinPoint<'_>, error: &anyhow::Error) -> anyhow::Result<()>;
}

/// 方法拦截器（环绕通知）
///
/// 通过 [`MethodInvocation::proceed`] 继续执行拦截链，可以调用零次、一次或多次
pub trait MethodInterceptor: Send + Sync {
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value>;
}

/// 引入拦截器
///
/// 对引入接口上的方法直接给出实现，其他方法交给后续拦截器
pub trait IntroductionInterceptor: MethodInterceptor {
    /// 是否实现了指定名称的接口
    fn implements_interface(&self, interface: &str) -> bool;
}

impl<F> BeforeAdvice for F
where
    F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn before(&self, join_point: &JoinPoint<'_>) -> anyhow::Result<()> {
        self(join_point)
    }
}

impl<F> MethodInterceptor for F
where
    F: Fn(&mut MethodInvocation) -> anyhow::Result<Value> + Send + Sync,
{
    fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
        self(invocation)
    }
}

/// 一个通知单元
#[derive(Clone)]
pub enum Advice {
    Before(Arc<dyn BeforeAdvice>),
    After(Arc<dyn AfterAdvice>),
    AfterReturning(Arc<dyn AfterReturningAdvice>),
    AfterThrowing(Arc<dyn AfterThrowingAdvice>),
    Around(Arc<dyn MethodInterceptor>),
    Introduction(Arc<dyn IntroductionInterceptor>),
    /// 由注册的 [`AdvisorAdapter`](crate::AdvisorAdapter) 负责转换
    Custom(Arc<dyn Any + Send + Sync>),
}

impl Advice {
    /// 用闭包创建前置通知
    pub fn before<F>(f: F) -> Self
    where
        F: Fn(&JoinPoint<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Advice::Before(Arc::new(f))
    }

    /// 用闭包创建环绕通知
    pub fn around<F>(f: F) -> Self
    where
        F: Fn(&mut MethodInvocation) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Advice::Around(Arc::new(f))
    }

    pub fn after(advice: impl AfterAdvice + 'static) -> Self {
        Advice::After(Arc::new(advice))
    }

    pub fn after_returning(advice: impl AfterReturningAdvice + 'static) -> Self {
        Advice::AfterReturning(Arc::new(advice))
    }

    pub fn after_throwing(advice: impl AfterThrowingAdvice + 'static) -> Self {
        Advice::AfterThrowing(Arc::new(advice))
    }

    pub fn advice_type(&self) -> AdviceType {
        match self {
            Advice::Before(_) => AdviceType::Before,
            Advice::After(_) => AdviceType::After,
            Advice::AfterReturning(_) => AdviceType::AfterReturning,
            Advice::AfterThrowing(_) => AdviceType::AfterThrowing,
            Advice::Around(_) => AdviceType::Around,
            Advice::Introduction(_) => AdviceType::Introduction,
            Advice::Custom(_) => AdviceType::Custom,
        }
    }

    /// 是否为同一个通知对象
    pub fn ptr_eq(&self, other: &Advice) -> bool {
        fn addr<T: ?Sized>(arc: &Arc<T>) -> *const () {
            Arc::as_ptr(arc) as *const ()
        }

        let (a, b) = match (self, other) {
            (Advice::Before(a), Advice::Before(b)) => (addr(a), addr(b)),
            (Advice::After(a), Advice::After(b)) => (addr(a), addr(b)),
            (Advice::AfterReturning(a), Advice::AfterReturning(b)) => (addr(a), addr(b)),
            (Advice::AfterThrowing(a), Advice::AfterThrowing(b)) => (addr(a), addr(b)),
            (Advice::Around(a), Advice::Around(b)) => (addr(a), addr(b)),
            (Advice::Introduction(a), Advice::Introduction(b)) => (addr(a), addr(b)),
            (Advice::Custom(a), Advice::Custom(b)) => (addr(a), addr(b)),
            _ => return false,
        };
        a == b
    }
}

impl fmt::Debug for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Advice({})", self.advice_type())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Audit;

    impl AfterReturningAdvice for Audit {
        fn after_returning(&self, _join_point: &JoinPoint<'_>, _result: &Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_advice_type() {
        assert_eq!(Advice::before(|_| Ok(())).advice_type(), AdviceType::Before);
        assert_eq!(Advice::around(|inv| inv.proceed()).advice_type(), AdviceType::Around);
        assert_eq!(Advice::after_returning(Audit).advice_type(), AdviceType::AfterReturning);
        assert_eq!(AdviceType::AfterThrowing.to_string(), "after-throwing");
    }

    #[test]
    fn test_advice_identity() {
        let advice = Advice::before(|_| Ok(()));
        let same = advice.clone();
        let other = Advice::before(|_| Ok(()));

        assert!(advice.ptr_eq(&same));
        assert!(!advice.ptr_eq(&other));
        assert!(!advice.ptr_eq(&Advice::after_returning(Audit)));
    }
}
