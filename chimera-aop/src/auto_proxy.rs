//! 自动代理
//!
//! [`AutoProxyCreator`] 是一个 BeanPostProcessor，在 Bean 生命周期的三个位置接入：
//!
//! 1. 实例化之前：自定义目标源时直接返回代理，跳过常规实例化
//! 2. 早期引用：单例被循环依赖提前引用时，返回代理而不是原始对象
//! 3. 初始化之后：没有提前暴露过的 Bean 在这里被代理
//!
//! 是否需要代理的判定连同选出的 Advisor 按 (类型, 名称) 缓存，同一个 Bean 不会被判定两次，
//! 也不会被包装两次；原型 Bean 的后续实例直接复用缓存的 Advisor。

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chimera_beans::{
    BeanDefinition, BeanPostProcessor, ConfigurableBeanFactory, ContainerResult, DefaultListableBeanFactory,
    ObjectRef, TypeDescriptor,
};
use parking_lot::{Mutex, RwLock};

use crate::adapter::{global_adapter_registry, AdvisorAdapterRegistry};
use crate::advised::{Advised, AdvisedSupport};
use crate::advisor::Advisor;
use crate::config::AopSettings;
use crate::error::AopResult;
use crate::matching::{find_advisors_that_can_apply, uses_interface_proxy};
use crate::proxy::{is_aop_proxy, ProxyStrategy};
use crate::source::{AdvisorSource, BeanFactoryAdvisorSource, CompositeAdvisorSource, InventoryAdvisorSource};
use crate::target_source::{SingletonTargetSource, TargetSource};

/// 自定义目标源
///
/// 返回 `Some` 时该 Bean 不再常规实例化，而是直接以代理的形式交给容器
pub trait TargetSourceCreator: Send + Sync {
    fn get_target_source(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
    ) -> AopResult<Option<Arc<dyn TargetSource>>>;
}

impl<F> TargetSourceCreator for F
where
    F: Fn(&BeanDefinition, &str) -> AopResult<Option<Arc<dyn TargetSource>>> + Send + Sync,
{
    fn get_target_source(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
    ) -> AopResult<Option<Arc<dyn TargetSource>>> {
        self(definition, bean_name)
    }
}

type CacheKey = (TypeId, String);

/// 判定结果：`None` 表示不需要代理
type AdvisedEntry = Option<Arc<[Arc<dyn Advisor>]>>;

/// 自动代理创建器
pub struct AutoProxyCreator {
    advisor_source: Arc<dyn AdvisorSource>,
    settings: AopSettings,
    adapter_registry: Arc<dyn AdvisorAdapterRegistry>,
    skipped_beans: HashSet<String>,
    target_source_creators: Vec<Arc<dyn TargetSourceCreator>>,
    /// 已提前暴露的 Bean -> 暴露时的原始对象
    early_proxy_references: Mutex<HashMap<CacheKey, ObjectRef>>,
    /// 是否需要代理的判定结果，以及选出的 Advisor
    advised_beans: RwLock<HashMap<CacheKey, AdvisedEntry>>,
    /// 由自定义目标源创建的 Bean
    target_source_beans: RwLock<HashSet<String>>,
}

impl AutoProxyCreator {
    pub const ORDER: i32 = 2000;

    pub fn new(advisor_source: Arc<dyn AdvisorSource>) -> Self {
        Self {
            advisor_source,
            settings: AopSettings::default(),
            adapter_registry: global_adapter_registry(),
            skipped_beans: HashSet::new(),
            target_source_creators: Vec::new(),
            early_proxy_references: Mutex::new(HashMap::new()),
            advised_beans: RwLock::new(HashMap::new()),
            target_source_beans: RwLock::new(HashSet::new()),
        }
    }

    /// 为容器安装自动代理
    ///
    /// 候选 Advisor 来自容器中的 Advisor/切面 Bean 以及通过 inventory 注册的切面
    pub fn install(bean_factory: &Arc<DefaultListableBeanFactory>, settings: AopSettings) -> Arc<Self> {
        let source = CompositeAdvisorSource::new()
            .with_source(Arc::new(BeanFactoryAdvisorSource::new(bean_factory)))
            .with_source(Arc::new(InventoryAdvisorSource::new()));
        let creator = Arc::new(Self::new(Arc::new(source)).with_settings(settings));
        bean_factory.add_bean_post_processor(creator.clone());
        tracing::info!("Auto-proxy creator installed");
        creator
    }

    pub fn with_settings(mut self, settings: AopSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_adapter_registry(mut self, registry: Arc<dyn AdvisorAdapterRegistry>) -> Self {
        self.adapter_registry = registry;
        self
    }

    /// 指定名称的 Bean 永不代理
    pub fn skip_bean(mut self, bean_name: impl Into<String>) -> Self {
        self.skipped_beans.insert(bean_name.into());
        self
    }

    pub fn with_target_source_creator(mut self, creator: Arc<dyn TargetSourceCreator>) -> Self {
        self.target_source_creators.push(creator);
        self
    }

    pub fn settings(&self) -> &AopSettings {
        &self.settings
    }

    /// 获取作用于该类型的 Advisor（已排序）
    ///
    /// 只看当前代理方式下调用方能调到的方法
    pub fn eligible_advisors(&self, target_type: &TypeDescriptor) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let candidates = self.advisor_source.find_candidate_advisors()?;
        Ok(find_advisors_that_can_apply(
            &candidates,
            target_type,
            self.settings.proxy_target_class,
        ))
    }

    /// 该 Bean 是否已判定为需要代理
    pub fn is_advised(&self, bean: &ObjectRef, bean_name: &str) -> Option<bool> {
        self.advised_beans
            .read()
            .get(&Self::cache_key(bean, bean_name))
            .map(|entry| entry.is_some())
    }

    fn cache_key(bean: &ObjectRef, bean_name: &str) -> CacheKey {
        (bean.value_type_id(), bean_name.to_string())
    }

    fn is_infrastructure(&self, bean: &ObjectRef, bean_name: &str) -> bool {
        if self.skipped_beans.contains(bean_name) || is_aop_proxy(bean) {
            return true;
        }
        bean.type_descriptor()
            .map(|descriptor| descriptor.is_infrastructure())
            .unwrap_or(true)
    }

    fn wrap_if_necessary(&self, bean: ObjectRef, bean_name: &str, key: CacheKey) -> ContainerResult<ObjectRef> {
        if self.target_source_beans.read().contains(bean_name) {
            return Ok(bean);
        }

        let cached = self.advised_beans.read().get(&key).cloned();
        let advisors = match cached {
            Some(None) => return Ok(bean),
            Some(Some(advisors)) => advisors,
            None => match self.select_advisors(&bean, bean_name)? {
                Some(advisors) => {
                    self.advised_beans.write().insert(key, Some(Arc::clone(&advisors)));
                    advisors
                }
                None => {
                    self.advised_beans.write().insert(key, None);
                    return Ok(bean);
                }
            },
        };

        let target_source: Arc<dyn TargetSource> = Arc::new(SingletonTargetSource::new(bean)?);
        let proxy = self.create_proxy(bean_name, target_source, advisors.to_vec())?;
        Ok(proxy)
    }

    /// 第一次判定：`None` 表示不需要代理
    fn select_advisors(&self, bean: &ObjectRef, bean_name: &str) -> AopResult<AdvisedEntry> {
        if self.is_infrastructure(bean, bean_name) {
            tracing::trace!("Did not attempt to auto-proxy infrastructure bean '{}'", bean_name);
            return Ok(None);
        }
        let Some(descriptor) = bean.type_descriptor() else {
            return Ok(None);
        };
        let advisors = self.eligible_advisors(&descriptor)?;
        if advisors.is_empty() {
            return Ok(None);
        }
        Ok(Some(advisors.into()))
    }

    fn create_proxy(
        &self,
        bean_name: &str,
        target_source: Arc<dyn TargetSource>,
        advisors: Vec<Arc<dyn Advisor>>,
    ) -> AopResult<ObjectRef> {
        let target_type = target_source.target_type();
        let config = AdvisedSupport::new()
            .with_target_source(target_source)
            .with_adapter_registry(Arc::clone(&self.adapter_registry));
        // 没有接口的类型只能子类代理，引入的接口不改变这一点
        let interface_proxy = uses_interface_proxy(&target_type, self.settings.proxy_target_class);
        config.set_proxy_target_class(!interface_proxy);
        if interface_proxy {
            for interface in target_type.interfaces() {
                config.add_interface(Arc::clone(interface))?;
            }
        }

        let advisor_count = advisors.len();
        for advisor in advisors {
            config.add_advisor(advisor)?;
        }
        config.set_pre_filtered(true);
        if self.settings.freeze_proxies {
            config.set_frozen(true);
        }

        let strategy = ProxyStrategy::select(&config);
        let proxy = strategy.create_proxy(Arc::new(config))?;
        tracing::info!(
            "Created {:?} proxy for bean '{}' of type {} with {} advisors",
            strategy,
            bean_name,
            target_type.name(),
            advisor_count
        );
        Ok(proxy)
    }
}

impl BeanPostProcessor for AutoProxyCreator {
    fn post_process_before_instantiation(
        &self,
        definition: &BeanDefinition,
        bean_name: &str,
    ) -> ContainerResult<Option<ObjectRef>> {
        for creator in &self.target_source_creators {
            let Some(target_source) = creator.get_target_source(definition, bean_name)? else {
                continue;
            };

            tracing::debug!("Using custom target source for bean '{}'", bean_name);
            self.target_source_beans.write().insert(bean_name.to_string());
            let advisors = self.eligible_advisors(&target_source.target_type())?;
            let proxy = self.create_proxy(bean_name, target_source, advisors)?;
            return Ok(Some(proxy));
        }
        Ok(None)
    }

    fn get_early_bean_reference(&self, bean: ObjectRef, bean_name: &str) -> ContainerResult<ObjectRef> {
        let key = Self::cache_key(&bean, bean_name);
        self.early_proxy_references.lock().insert(key.clone(), bean.clone());
        self.wrap_if_necessary(bean, bean_name, key)
    }

    fn post_process_after_initialization(&self, bean: ObjectRef, bean_name: &str) -> ContainerResult<ObjectRef> {
        let key = Self::cache_key(&bean, bean_name);
        if let Some(early) = self.early_proxy_references.lock().remove(&key) {
            if early.ptr_eq(&bean) {
                // 早期引用已经决定了最终对象
                return Ok(bean);
            }
        }
        self.wrap_if_necessary(bean, bean_name, key)
    }

    fn name(&self) -> &str {
        "AutoProxyCreator"
    }

    fn order(&self) -> i32 {
        Self::ORDER
    }
}

/// 代理对象当前的 Advisor 数量，普通对象返回 `None`
pub fn advisor_count(bean: &ObjectRef) -> Option<usize> {
    crate::proxy::as_advised(bean).map(|advised| advised.advisors().len())
}
