//! 编程式创建代理
//!
//! ```ignore
//! let factory = ProxyFactory::new(ObjectRef::reflective(Arc::new(UserServiceImpl::new())))?;
//! factory.add_advice(Advice::before(|jp| {
//!     tracing::info!("calling {}", jp.signature());
//!     Ok(())
//! }))?;
//! let proxy = factory.get_proxy()?;
//! ```

use std::sync::Arc;

use chimera_beans::{Interface, ObjectRef};

use crate::advice::Advice;
use crate::advised::{Advised, AdvisedSupport};
use crate::advisor::Advisor;
use crate::error::AopResult;
use crate::proxy::ProxyStrategy;
use crate::target_source::{SingletonTargetSource, TargetSource};

/// 代理工厂
///
/// 每次 [`get_proxy`](ProxyFactory::get_proxy) 生成的代理共享同一份配置，
/// 之后对工厂或任一代理的修改对所有代理立即可见。
pub struct ProxyFactory {
    config: Arc<AdvisedSupport>,
}

impl ProxyFactory {
    /// 以单例目标源创建工厂，代理接口取自目标类型声明的全部接口
    pub fn new(target: ObjectRef) -> AopResult<Self> {
        let target_source = SingletonTargetSource::new(target)?;
        let interfaces = target_source.target_type().interfaces().to_vec();
        let factory = Self::with_target_source(Arc::new(target_source));
        for interface in interfaces {
            factory.config.add_interface(interface)?;
        }
        Ok(factory)
    }

    /// 使用任意目标源，代理接口需要自行添加
    pub fn with_target_source(target_source: Arc<dyn TargetSource>) -> Self {
        Self {
            config: Arc::new(AdvisedSupport::new().with_target_source(target_source)),
        }
    }

    pub fn add_advice(&self, advice: Advice) -> AopResult<()> {
        self.config.add_advice(advice)
    }

    pub fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.config.add_advisor(advisor)
    }

    pub fn add_interface(&self, interface: impl Into<Arc<Interface>>) -> AopResult<()> {
        self.config.add_interface(interface)
    }

    pub fn set_proxy_target_class(&self, proxy_target_class: bool) {
        self.config.set_proxy_target_class(proxy_target_class);
    }

    pub fn set_frozen(&self, frozen: bool) {
        self.config.set_frozen(frozen);
    }

    pub fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        self.config.set_target_source(target_source);
    }

    pub fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }

    /// 创建代理
    pub fn get_proxy(&self) -> AopResult<ObjectRef> {
        let strategy = ProxyStrategy::select(&self.config);
        tracing::debug!("Creating {:?} proxy with {} advisors", strategy, self.config.advisors().len());
        strategy.create_proxy(Arc::clone(&self.config))
    }
}
