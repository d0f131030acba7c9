//! 拦截链构建
//!
//! 把代理配置中的 Advisor 按顺序转换为某个方法的拦截链。动态切点对应的拦截器带上
//! 切点一起放入链中，在调用时根据实际参数决定是否执行。

use std::fmt;
use std::sync::Arc;

use chimera_beans::{Method, TypeDescriptor};

use crate::advice::MethodInterceptor;
use crate::advised::{Advised, AdvisedSupport};
use crate::error::AopResult;
use crate::matching::has_matching_introductions;
use crate::pointcut::Pointcut;

/// 拦截链中的一个节点
#[derive(Clone)]
pub enum ChainEntry {
    /// 无条件执行
    Interceptor(Arc<dyn MethodInterceptor>),
    /// 仅当切点的动态匹配通过时执行
    Conditional {
        interceptor: Arc<dyn MethodInterceptor>,
        pointcut: Arc<dyn Pointcut>,
    },
}

impl ChainEntry {
    pub fn interceptor(&self) -> &Arc<dyn MethodInterceptor> {
        match self {
            ChainEntry::Interceptor(interceptor) => interceptor,
            ChainEntry::Conditional { interceptor, .. } => interceptor,
        }
    }

    pub fn is_conditional(&self) -> bool {
        matches!(self, ChainEntry::Conditional { .. })
    }
}

impl fmt::Debug for ChainEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainEntry::Interceptor(_) => write!(f, "Interceptor"),
            ChainEntry::Conditional { .. } => write!(f, "Conditional"),
        }
    }
}

/// 拦截链工厂
pub trait AdvisorChainFactory: Send + Sync {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_type: &TypeDescriptor,
    ) -> AopResult<Vec<ChainEntry>>;
}

/// 默认拦截链工厂
#[derive(Debug, Default)]
pub struct DefaultAdvisorChainFactory;

impl AdvisorChainFactory for DefaultAdvisorChainFactory {
    fn interceptors_and_dynamic_advice(
        &self,
        config: &AdvisedSupport,
        method: &Method,
        target_type: &TypeDescriptor,
    ) -> AopResult<Vec<ChainEntry>> {
        let advisors = config.advisors();
        let registry = config.adapter_registry();
        let pre_filtered = config.is_pre_filtered();
        let has_introductions = has_matching_introductions(&advisors, target_type);

        let mut chain = Vec::with_capacity(advisors.len());
        for advisor in &advisors {
            if let Some(pointcut_advisor) = advisor.as_pointcut_advisor() {
                let pointcut = pointcut_advisor.pointcut();
                if !pre_filtered && !pointcut.matches_type(target_type) {
                    continue;
                }
                if !pointcut.matches_method_with_introductions(method, target_type, has_introductions) {
                    continue;
                }

                let interceptors = registry.get_interceptors(advisor.as_ref())?;
                if pointcut.is_runtime() {
                    chain.extend(interceptors.into_iter().map(|interceptor| ChainEntry::Conditional {
                        interceptor,
                        pointcut: Arc::clone(pointcut),
                    }));
                } else {
                    chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                }
            } else if let Some(introduction) = advisor.as_introduction_advisor() {
                if pre_filtered || introduction.type_filter().matches(target_type) {
                    let interceptors = registry.get_interceptors(advisor.as_ref())?;
                    chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
                }
            } else {
                let interceptors = registry.get_interceptors(advisor.as_ref())?;
                chain.extend(interceptors.into_iter().map(ChainEntry::Interceptor));
            }
        }

        tracing::trace!(
            "Built chain of {} entries for {} on {}",
            chain.len(),
            method,
            target_type.name()
        );
        Ok(chain)
    }
}
