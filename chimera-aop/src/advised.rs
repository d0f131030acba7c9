//! 代理配置（Advised）
//!
//! 每个代理持有一份 [`AdvisedSupport`]：Advisor 列表、代理接口列表、目标源、冻结标志，
//! 以及按方法缓存的拦截链。Advisor 列表的任何变更都会清空整个缓存。

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chimera_beans::{Interface, Method, TypeDescriptor};
use parking_lot::RwLock;

use crate::adapter::{global_adapter_registry, AdvisorAdapterRegistry};
use crate::advice::Advice;
use crate::advisor::{same_advisor, Advisor};
use crate::chain::{AdvisorChainFactory, ChainEntry, DefaultAdvisorChainFactory};
use crate::error::{AopError, AopResult};
use crate::target_source::TargetSource;

/// 代理配置契约
///
/// 每个代理都实现了它，调用方可以在运行时查看和修改 Advisor（冻结之前）
pub trait Advised: Send + Sync {
    /// 配置是否已冻结
    fn is_frozen(&self) -> bool;

    /// 是否使用子类代理
    fn is_proxy_target_class(&self) -> bool;

    /// Advisor 是否已经针对目标类型筛选过
    fn is_pre_filtered(&self) -> bool;

    /// 当前 Advisor 列表的快照
    fn advisors(&self) -> Vec<Arc<dyn Advisor>>;

    /// 追加 Advisor
    fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()>;

    /// 在指定位置插入 Advisor
    fn add_advisor_at(&self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()>;

    /// 移除 Advisor，返回是否找到
    fn remove_advisor(&self, advisor: &Arc<dyn Advisor>) -> AopResult<bool>;

    /// 移除指定位置的 Advisor
    fn remove_advisor_at(&self, index: usize) -> AopResult<Arc<dyn Advisor>>;

    fn index_of(&self, advisor: &Arc<dyn Advisor>) -> Option<usize>;

    /// 以作用于所有方法的 Advisor 形式追加通知
    fn add_advice(&self, advice: Advice) -> AopResult<()>;

    /// 代理实现的接口
    fn proxied_interfaces(&self) -> Vec<Arc<Interface>>;

    fn is_interface_proxied(&self, name: &str) -> bool;

    fn target_source(&self) -> Option<Arc<dyn TargetSource>>;

    fn set_target_source(&self, target_source: Arc<dyn TargetSource>);
}

/// 代理配置的默认实现
pub struct AdvisedSupport {
    advisors: RwLock<Vec<Arc<dyn Advisor>>>,
    interfaces: RwLock<Vec<Arc<Interface>>>,
    target_source: RwLock<Option<Arc<dyn TargetSource>>>,
    frozen: AtomicBool,
    proxy_target_class: AtomicBool,
    pre_filtered: AtomicBool,
    adapter_registry: Arc<dyn AdvisorAdapterRegistry>,
    chain_factory: Arc<dyn AdvisorChainFactory>,
    method_cache: RwLock<HashMap<Method, Arc<[ChainEntry]>>>,
    /// 每次配置变更递增，用于丢弃变更期间计算出的拦截链
    generation: AtomicU64,
}

impl AdvisedSupport {
    pub fn new() -> Self {
        Self {
            advisors: RwLock::new(Vec::new()),
            interfaces: RwLock::new(Vec::new()),
            target_source: RwLock::new(None),
            frozen: AtomicBool::new(false),
            proxy_target_class: AtomicBool::new(false),
            pre_filtered: AtomicBool::new(false),
            adapter_registry: global_adapter_registry(),
            chain_factory: Arc::new(DefaultAdvisorChainFactory),
            method_cache: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn with_target_source(self, target_source: Arc<dyn TargetSource>) -> Self {
        *self.target_source.write() = Some(target_source);
        self
    }

    pub fn with_adapter_registry(mut self, registry: Arc<dyn AdvisorAdapterRegistry>) -> Self {
        self.adapter_registry = registry;
        self
    }

    pub fn with_chain_factory(mut self, factory: Arc<dyn AdvisorChainFactory>) -> Self {
        self.chain_factory = factory;
        self
    }

    pub fn adapter_registry(&self) -> &Arc<dyn AdvisorAdapterRegistry> {
        &self.adapter_registry
    }

    /// 冻结后 Advisor 和接口列表不能再修改
    ///
    /// 持有 Advisor 写锁切换标志，进行中的修改要么在冻结前完成，要么看到冻结
    pub fn set_frozen(&self, frozen: bool) {
        let _advisors = self.advisors.write();
        self.frozen.store(frozen, Ordering::Release);
    }

    pub fn set_proxy_target_class(&self, proxy_target_class: bool) {
        self.proxy_target_class.store(proxy_target_class, Ordering::Release);
    }

    pub fn set_pre_filtered(&self, pre_filtered: bool) {
        self.pre_filtered.store(pre_filtered, Ordering::Release);
        self.advice_changed();
    }

    /// 增加代理接口
    pub fn add_interface(&self, interface: impl Into<Arc<Interface>>) -> AopResult<()> {
        let interface = interface.into();
        let advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        let mut interfaces = self.interfaces.write();
        if !interfaces.iter().any(|i| i.name() == interface.name()) {
            interfaces.push(interface);
        }
        drop(interfaces);
        drop(advisors);
        self.advice_changed();
        Ok(())
    }

    pub fn remove_interface(&self, name: &str) -> AopResult<bool> {
        let advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        let mut interfaces = self.interfaces.write();
        let before = interfaces.len();
        interfaces.retain(|i| i.name() != name);
        let removed = interfaces.len() != before;
        drop(interfaces);
        drop(advisors);
        if removed {
            self.advice_changed();
        }
        Ok(removed)
    }

    /// 获取方法的拦截链（带缓存）
    ///
    /// 缓存未命中时在锁外计算，并发计算结果相同；计算期间配置发生变化的结果不会写入缓存
    pub fn interceptors_for(&self, method: &Method, target_type: &TypeDescriptor) -> AopResult<Arc<[ChainEntry]>> {
        if let Some(chain) = self.method_cache.read().get(method) {
            return Ok(Arc::clone(chain));
        }

        let generation = self.generation.load(Ordering::Acquire);
        let chain: Arc<[ChainEntry]> = self
            .chain_factory
            .interceptors_and_dynamic_advice(self, method, target_type)?
            .into();

        let mut cache = self.method_cache.write();
        if self.generation.load(Ordering::Acquire) == generation {
            cache.entry(method.clone()).or_insert_with(|| Arc::clone(&chain));
        }
        Ok(chain)
    }

    /// 已缓存的拦截链数量
    pub fn cached_chain_count(&self) -> usize {
        self.method_cache.read().len()
    }

    /// 调用方需持有 Advisor 写锁
    fn ensure_not_frozen(&self) -> AopResult<()> {
        if self.is_frozen() {
            return Err(AopError::ConfigurationFrozen);
        }
        Ok(())
    }

    fn validate_advisor(&self, advisor: &dyn Advisor) -> AopResult<()> {
        if !self.adapter_registry.supports(advisor.advice()) {
            return Err(AopError::UnknownAdviceType(advisor.advice().advice_type().to_string()));
        }
        if let Some(introduction) = advisor.as_introduction_advisor() {
            if introduction.interfaces().is_empty() {
                return Err(AopError::InvalidAdvisor(format!(
                    "Introduction advisor '{}' declares no interfaces",
                    advisor.name()
                )));
            }
        }
        Ok(())
    }

    fn introduce_interfaces(&self, advisor: &dyn Advisor) {
        if let Some(introduction) = advisor.as_introduction_advisor() {
            let mut interfaces = self.interfaces.write();
            for interface in introduction.interfaces() {
                if !interfaces.iter().any(|i| i.name() == interface.name()) {
                    interfaces.push(Arc::clone(interface));
                }
            }
        }
    }

    fn withdraw_interfaces(&self, advisor: &dyn Advisor) {
        if let Some(introduction) = advisor.as_introduction_advisor() {
            let withdrawn: Vec<&str> = introduction.interfaces().iter().map(|i| i.name()).collect();
            self.interfaces.write().retain(|i| !withdrawn.contains(&i.name()));
        }
    }

    /// 配置变化：使所有缓存的拦截链失效
    fn advice_changed(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.method_cache.write().clear();
    }
}

impl Default for AdvisedSupport {
    fn default() -> Self {
        Self::new()
    }
}

impl Advised for AdvisedSupport {
    fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    fn is_proxy_target_class(&self) -> bool {
        self.proxy_target_class.load(Ordering::Acquire)
    }

    fn is_pre_filtered(&self) -> bool {
        self.pre_filtered.load(Ordering::Acquire)
    }

    fn advisors(&self) -> Vec<Arc<dyn Advisor>> {
        self.advisors.read().clone()
    }

    fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.validate_advisor(advisor.as_ref())?;

        let mut advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        tracing::debug!("Adding advisor {}", advisor.name());
        self.introduce_interfaces(advisor.as_ref());
        advisors.push(advisor);
        drop(advisors);
        self.advice_changed();
        Ok(())
    }

    fn add_advisor_at(&self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()> {
        self.validate_advisor(advisor.as_ref())?;

        let mut advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        if position > advisors.len() {
            return Err(AopError::IndexOutOfRange {
                index: position,
                len: advisors.len(),
            });
        }
        tracing::debug!("Adding advisor {} at position {}", advisor.name(), position);
        self.introduce_interfaces(advisor.as_ref());
        advisors.insert(position, advisor);
        drop(advisors);
        self.advice_changed();
        Ok(())
    }

    fn remove_advisor(&self, advisor: &Arc<dyn Advisor>) -> AopResult<bool> {
        let mut advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        let Some(index) = advisors.iter().position(|a| same_advisor(a, advisor)) else {
            return Ok(false);
        };
        let removed = advisors.remove(index);
        tracing::debug!("Removed advisor {} at position {}", removed.name(), index);
        self.withdraw_interfaces(removed.as_ref());
        drop(advisors);
        self.advice_changed();
        Ok(true)
    }

    fn remove_advisor_at(&self, index: usize) -> AopResult<Arc<dyn Advisor>> {
        let mut advisors = self.advisors.write();
        self.ensure_not_frozen()?;
        if index >= advisors.len() {
            return Err(AopError::IndexOutOfRange {
                index,
                len: advisors.len(),
            });
        }
        let removed = advisors.remove(index);
        tracing::debug!("Removed advisor {} at position {}", removed.name(), index);
        self.withdraw_interfaces(removed.as_ref());
        drop(advisors);
        self.advice_changed();
        Ok(removed)
    }

    fn index_of(&self, advisor: &Arc<dyn Advisor>) -> Option<usize> {
        self.advisors.read().iter().position(|a| same_advisor(a, advisor))
    }

    fn add_advice(&self, advice: Advice) -> AopResult<()> {
        let advisor = self.adapter_registry.wrap(advice)?;
        self.add_advisor(advisor)
    }

    fn proxied_interfaces(&self) -> Vec<Arc<Interface>> {
        self.interfaces.read().clone()
    }

    fn is_interface_proxied(&self, name: &str) -> bool {
        self.interfaces.read().iter().any(|i| i.name() == name)
    }

    fn target_source(&self) -> Option<Arc<dyn TargetSource>> {
        self.target_source.read().clone()
    }

    fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
        *self.target_source.write() = Some(target_source);
        self.advice_changed();
    }
}

impl fmt::Debug for AdvisedSupport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let advisors: Vec<String> = self.advisors.read().iter().map(|a| a.name().to_string()).collect();
        let interfaces: Vec<String> = self.interfaces.read().iter().map(|i| i.name().to_string()).collect();
        f.debug_struct("AdvisedSupport")
            .field("advisors", &advisors)
            .field("interfaces", &interfaces)
            .field("frozen", &self.is_frozen())
            .field("proxy_target_class", &self.is_proxy_target_class())
            .field("pre_filtered", &self.is_pre_filtered())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{IntroductionInterceptor, MethodInterceptor};
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    use crate::invocation::MethodInvocation;
    use crate::pointcut::PointcutExpression;
    use chimera_beans::Value;
    use std::any::Any;

    struct InventoryServiceImpl;

    fn inventory_service() -> Arc<TypeDescriptor> {
        TypeDescriptor::builder::<InventoryServiceImpl>("InventoryServiceImpl")
            .interface(Interface::new("InventoryService").method("reserve", &["String"]))
            .build()
    }

    fn around() -> Arc<dyn Advisor> {
        DefaultPointcutAdvisor::for_all(Advice::around(|inv| inv.proceed())).shared()
    }

    #[test]
    fn test_add_and_remove_invalidate_cache() {
        let ty = inventory_service();
        let method = ty.find_method("reserve").cloned().unwrap();
        let config = AdvisedSupport::new();

        assert_eq!(config.interceptors_for(&method, &ty).unwrap().len(), 0);
        assert_eq!(config.cached_chain_count(), 1);

        let advisor = around();
        config.add_advisor(Arc::clone(&advisor)).unwrap();
        assert_eq!(config.cached_chain_count(), 0);
        assert_eq!(config.interceptors_for(&method, &ty).unwrap().len(), 1);

        assert!(config.remove_advisor(&advisor).unwrap());
        assert!(!config.remove_advisor(&advisor).unwrap());
        assert_eq!(config.interceptors_for(&method, &ty).unwrap().len(), 0);
    }

    #[test]
    fn test_positions_and_index_of() {
        let config = AdvisedSupport::new();
        let first = around();
        let second = around();
        config.add_advisor(Arc::clone(&second)).unwrap();
        config.add_advisor_at(0, Arc::clone(&first)).unwrap();

        assert_eq!(config.index_of(&first), Some(0));
        assert_eq!(config.index_of(&second), Some(1));
        assert!(matches!(
            config.add_advisor_at(5, around()),
            Err(AopError::IndexOutOfRange { index: 5, len: 2 })
        ));
        assert!(matches!(
            config.remove_advisor_at(2),
            Err(AopError::IndexOutOfRange { index: 2, len: 2 })
        ));

        let removed = config.remove_advisor_at(0).unwrap();
        assert!(same_advisor(&removed, &first));
        assert_eq!(config.index_of(&second), Some(0));
    }

    #[test]
    fn test_frozen_rejects_mutation() {
        let config = AdvisedSupport::new();
        let advisor = around();
        config.add_advisor(Arc::clone(&advisor)).unwrap();
        config.set_frozen(true);

        assert!(matches!(config.add_advisor(around()), Err(AopError::ConfigurationFrozen)));
        assert!(matches!(config.remove_advisor(&advisor), Err(AopError::ConfigurationFrozen)));
        assert!(matches!(config.remove_advisor_at(0), Err(AopError::ConfigurationFrozen)));
        assert!(matches!(
            config.add_advice(Advice::before(|_| Ok(()))),
            Err(AopError::ConfigurationFrozen)
        ));
        assert!(matches!(
            config.add_interface(Interface::new("Extra")),
            Err(AopError::ConfigurationFrozen)
        ));
        assert_eq!(config.advisors().len(), 1);
    }

    #[test]
    fn test_concurrent_insert_and_remove_target_the_right_advisor() {
        let config = AdvisedSupport::new();
        let targets: Vec<Arc<dyn Advisor>> = (0..64).map(|_| around()).collect();
        for advisor in &targets {
            config.add_advisor(Arc::clone(advisor)).unwrap();
        }
        let inserted: Vec<Arc<dyn Advisor>> = (0..64).map(|_| around()).collect();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                for advisor in &inserted {
                    config.add_advisor_at(0, Arc::clone(advisor)).unwrap();
                }
            });
            scope.spawn(|| {
                for advisor in &targets {
                    assert!(config.remove_advisor(advisor).unwrap());
                }
            });
        });

        let remaining = config.advisors();
        assert_eq!(remaining.len(), inserted.len());
        for advisor in &inserted {
            assert!(remaining.iter().any(|a| same_advisor(a, advisor)));
        }
        for advisor in &targets {
            assert_eq!(config.index_of(advisor), None);
        }
    }

    #[test]
    fn test_no_mutation_lands_after_freeze() {
        for _ in 0..32 {
            let config = AdvisedSupport::new();
            let accepted = AtomicU64::new(0);

            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for _ in 0..64 {
                        if config.add_advisor(around()).is_ok() {
                            accepted.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                });
                scope.spawn(|| config.set_frozen(true));
            });

            // 冻结之后列表不再变化，成功的追加都已经落在列表里
            assert!(config.is_frozen());
            assert_eq!(config.advisors().len() as u64, accepted.load(Ordering::SeqCst));
            assert!(matches!(config.add_advisor(around()), Err(AopError::ConfigurationFrozen)));
        }
    }

    #[test]
    fn test_unsupported_advice_rejected_eagerly() {
        let config = AdvisedSupport::new();
        let custom = Advice::Custom(Arc::new(7u8) as Arc<dyn Any + Send + Sync>);
        assert!(matches!(config.add_advice(custom.clone()), Err(AopError::UnknownAdviceType(_))));
        assert!(matches!(
            config.add_advisor(DefaultPointcutAdvisor::new(PointcutExpression::All, custom).shared()),
            Err(AopError::UnknownAdviceType(_))
        ));
        assert!(config.advisors().is_empty());
    }

    struct Tagged;

    impl MethodInterceptor for Tagged {
        fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
            invocation.proceed()
        }
    }

    impl IntroductionInterceptor for Tagged {
        fn implements_interface(&self, interface: &str) -> bool {
            interface == "Tagged"
        }
    }

    #[test]
    fn test_introduction_adds_and_withdraws_interfaces() {
        let config = AdvisedSupport::new();
        config.add_interface(Interface::new("InventoryService")).unwrap();

        let introduction = DefaultIntroductionAdvisor::new(Arc::new(Tagged), vec![Interface::new("Tagged").method("tag", &[])])
            .unwrap()
            .shared();
        config.add_advisor(Arc::clone(&introduction)).unwrap();
        assert!(config.is_interface_proxied("Tagged"));
        assert_eq!(config.proxied_interfaces().len(), 2);

        config.remove_advisor(&introduction).unwrap();
        assert!(!config.is_interface_proxied("Tagged"));
        assert!(config.is_interface_proxied("InventoryService"));
    }
}
