//! Advisor：切点 + 通知
//!
//! 普通 Advisor 把一个 [`Pointcut`] 绑定到一个 [`Advice`]；引入 Advisor 只有类型过滤，
//! 并为代理增加新的接口。

use std::fmt;
use std::sync::Arc;

use chimera_beans::Interface;

use crate::advice::{Advice, IntroductionInterceptor};
use crate::error::{AopError, AopResult};
use crate::pointcut::{Pointcut, PointcutExpression, TypeFilter};

/// Advisor Trait
pub trait Advisor: Send + Sync {
    /// 通知
    fn advice(&self) -> &Advice;

    /// 显式优先级（越小越先执行），未声明时排在所有声明了优先级的 Advisor 之后
    fn order(&self) -> Option<i32> {
        None
    }

    /// 用于日志的描述
    fn name(&self) -> &str {
        "Advisor"
    }

    fn as_pointcut_advisor(&self) -> Option<&dyn PointcutAdvisor> {
        None
    }

    fn as_introduction_advisor(&self) -> Option<&dyn IntroductionAdvisor> {
        None
    }
}

/// 由切点驱动的 Advisor
pub trait PointcutAdvisor: Advisor {
    fn pointcut(&self) -> &Arc<dyn Pointcut>;
}

/// 引入 Advisor
pub trait IntroductionAdvisor: Advisor {
    /// 引入作用的类型
    fn type_filter(&self) -> &dyn TypeFilter;

    /// 引入的接口
    fn interfaces(&self) -> &[Arc<Interface>];
}

/// 两个 Advisor 是否为同一个对象
pub fn same_advisor(a: &Arc<dyn Advisor>, b: &Arc<dyn Advisor>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// 按优先级稳定排序：声明了优先级的按值升序，未声明的保持声明顺序排在最后
///
/// 注意这并不是纯粹的声明顺序：只要有一方声明了优先级，未声明的一方就排在它之后，
/// 哪怕它声明得更早。两者都未声明时保持声明顺序，优先级相同时也保持声明顺序。
pub fn sort_advisors(advisors: &mut [Arc<dyn Advisor>]) {
    advisors.sort_by_key(|advisor| advisor.order().unwrap_or(i32::MAX));
}

/// 默认的切点 Advisor
pub struct DefaultPointcutAdvisor {
    name: String,
    pointcut: Arc<dyn Pointcut>,
    advice: Advice,
    order: Option<i32>,
}

impl DefaultPointcutAdvisor {
    pub fn new(pointcut: impl Pointcut + 'static, advice: Advice) -> Self {
        Self::with_pointcut(Arc::new(pointcut), advice)
    }

    pub fn with_pointcut(pointcut: Arc<dyn Pointcut>, advice: Advice) -> Self {
        Self {
            name: format!("DefaultPointcutAdvisor({})", advice.advice_type()),
            pointcut,
            advice,
            order: None,
        }
    }

    /// 作用于所有方法
    pub fn for_all(advice: Advice) -> Self {
        Self::new(PointcutExpression::All, advice)
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 转为共享的 trait object
    pub fn shared(self) -> Arc<dyn Advisor> {
        Arc::new(self)
    }
}

impl Advisor for DefaultPointcutAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_pointcut_advisor(&self) -> Option<&dyn PointcutAdvisor> {
        Some(self)
    }
}

impl PointcutAdvisor for DefaultPointcutAdvisor {
    fn pointcut(&self) -> &Arc<dyn Pointcut> {
        &self.pointcut
    }
}

impl fmt::Debug for DefaultPointcutAdvisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultPointcutAdvisor")
            .field("name", &self.name)
            .field("advice", &self.advice)
            .field("order", &self.order)
            .finish()
    }
}

/// 默认的引入 Advisor
pub struct DefaultIntroductionAdvisor {
    name: String,
    advice: Advice,
    interfaces: Vec<Arc<Interface>>,
    type_filter: Arc<dyn TypeFilter>,
    order: Option<i32>,
}

impl DefaultIntroductionAdvisor {
    /// 创建引入 Advisor
    ///
    /// 至少要声明一个接口，且拦截器必须实现每个声明的接口
    pub fn new(
        interceptor: Arc<dyn IntroductionInterceptor>,
        interfaces: Vec<Interface>,
    ) -> AopResult<Self> {
        if interfaces.is_empty() {
            return Err(AopError::InvalidAdvisor(
                "Introduction advisor must declare at least one interface".to_string(),
            ));
        }
        if let Some(missing) = interfaces.iter().find(|i| !interceptor.implements_interface(i.name())) {
            return Err(AopError::InvalidAdvisor(format!(
                "Introduction interceptor does not implement interface '{}'",
                missing.name()
            )));
        }

        let names: Vec<&str> = interfaces.iter().map(|i| i.name()).collect();
        Ok(Self {
            name: format!("DefaultIntroductionAdvisor({})", names.join(", ")),
            advice: Advice::Introduction(interceptor),
            interfaces: interfaces.into_iter().map(Arc::new).collect(),
            type_filter: Arc::new(PointcutExpression::All),
            order: None,
        })
    }

    /// 限制引入作用的类型
    pub fn with_type_filter(mut self, filter: impl TypeFilter + 'static) -> Self {
        self.type_filter = Arc::new(filter);
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = Some(order);
        self
    }

    pub fn shared(self) -> Arc<dyn Advisor> {
        Arc::new(self)
    }
}

impl Advisor for DefaultIntroductionAdvisor {
    fn advice(&self) -> &Advice {
        &self.advice
    }

    fn order(&self) -> Option<i32> {
        self.order
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn as_introduction_advisor(&self) -> Option<&dyn IntroductionAdvisor> {
        Some(self)
    }
}

impl IntroductionAdvisor for DefaultIntroductionAdvisor {
    fn type_filter(&self) -> &dyn TypeFilter {
        self.type_filter.as_ref()
    }

    fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::MethodInterceptor;
    use crate::invocation::MethodInvocation;
    use chimera_beans::{value, Value};

    struct Auditable;

    impl MethodInterceptor for Auditable {
        fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
            if invocation.method().owner() == "Auditable" {
                return Ok(value(3usize));
            }
            invocation.proceed()
        }
    }

    impl IntroductionInterceptor for Auditable {
        fn implements_interface(&self, interface: &str) -> bool {
            interface == "Auditable"
        }
    }

    fn advisor(order: Option<i32>, name: &str) -> Arc<dyn Advisor> {
        let advisor = DefaultPointcutAdvisor::for_all(Advice::before(|_| Ok(()))).with_name(name);
        match order {
            Some(order) => advisor.with_order(order).shared(),
            None => advisor.shared(),
        }
    }

    #[test]
    fn test_sort_is_stable_and_unordered_last() {
        let mut advisors = vec![
            advisor(None, "first-unordered"),
            advisor(Some(2), "two"),
            advisor(Some(1), "one-a"),
            advisor(None, "second-unordered"),
            advisor(Some(1), "one-b"),
        ];
        sort_advisors(&mut advisors);

        let names: Vec<&str> = advisors.iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["one-a", "one-b", "two", "first-unordered", "second-unordered"]);
    }

    #[test]
    fn test_introduction_validation() {
        let interceptor: Arc<dyn IntroductionInterceptor> = Arc::new(Auditable);

        assert!(matches!(
            DefaultIntroductionAdvisor::new(interceptor.clone(), vec![]),
            Err(AopError::InvalidAdvisor(_))
        ));
        assert!(matches!(
            DefaultIntroductionAdvisor::new(interceptor.clone(), vec![Interface::new("Lockable")]),
            Err(AopError::InvalidAdvisor(_))
        ));

        let advisor = DefaultIntroductionAdvisor::new(
            interceptor,
            vec![Interface::new("Auditable").method("audit_count", &[])],
        )
        .unwrap()
        .shared();
        let introduction = advisor.as_introduction_advisor().unwrap();
        assert_eq!(introduction.interfaces()[0].name(), "Auditable");
        assert!(advisor.as_pointcut_advisor().is_none());
    }

    #[test]
    fn test_same_advisor() {
        let a = advisor(None, "a");
        let b = advisor(None, "a");
        assert!(same_advisor(&a, &a.clone()));
        assert!(!same_advisor(&a, &b));
    }
}
