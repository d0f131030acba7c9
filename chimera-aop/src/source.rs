//! 候选 Advisor 来源
//!
//! 自动代理通过 [`AdvisorSource`] 获取容器中的候选 Advisor，可以是静态列表、
//! 闭包、编译期 inventory 注册的切面、容器中的 Advisor/切面 Bean，或它们的组合。

use std::any::TypeId;
use std::sync::{Arc, Weak};

use chimera_beans::{
    BeanFactory, ConfigurableBeanFactory, ContainerError, DefaultListableBeanFactory, ListableBeanFactory,
};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

use crate::aspect::{advisors_for_aspect, advisors_for_aspect_bean, get_all_aspect_registrations, Aspect};
use crate::advisor::Advisor;
use crate::error::{AopError, AopResult};

/// 候选 Advisor 查找 SPI
pub trait AdvisorSource: Send + Sync {
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>>;
}

/// 固定的 Advisor 列表
#[derive(Default)]
pub struct StaticAdvisorSource {
    advisors: RwLock<Vec<Arc<dyn Advisor>>>,
}

impl StaticAdvisorSource {
    pub fn new(advisors: Vec<Arc<dyn Advisor>>) -> Self {
        Self {
            advisors: RwLock::new(advisors),
        }
    }

    pub fn add(&self, advisor: Arc<dyn Advisor>) {
        self.advisors.write().push(advisor);
    }
}

impl AdvisorSource for StaticAdvisorSource {
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        Ok(self.advisors.read().clone())
    }
}

/// 由闭包提供候选 Advisor
pub struct FnAdvisorSource<F> {
    f: F,
}

impl<F> FnAdvisorSource<F>
where
    F: Fn() -> AopResult<Vec<Arc<dyn Advisor>>> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> AdvisorSource for FnAdvisorSource<F>
where
    F: Fn() -> AopResult<Vec<Arc<dyn Advisor>>> + Send + Sync,
{
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        (self.f)()
    }
}

/// 通过 `inventory::submit!` 注册的切面
///
/// 切面只在第一次查找时实例化一次
#[derive(Default)]
pub struct InventoryAdvisorSource {
    advisors: OnceCell<Vec<Arc<dyn Advisor>>>,
}

impl InventoryAdvisorSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AdvisorSource for InventoryAdvisorSource {
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let advisors = self.advisors.get_or_init(|| {
            let mut advisors = Vec::new();
            for registration in get_all_aspect_registrations() {
                tracing::debug!("Auto-registering aspect: {}", registration.name);
                advisors.extend(advisors_for_aspect(registration.create_instance()));
            }
            tracing::info!("Loaded {} advisors from registered aspects", advisors.len());
            advisors
        });
        Ok(advisors.clone())
    }
}

/// 容器中的 Advisor Bean（类型为 `Arc<dyn Advisor>`）和切面 Bean（类型为 `Arc<dyn Aspect>`）
///
/// 只持有容器的弱引用。正在创建中的 Advisor Bean 会被跳过；创建失败的 Bean 也会被跳过，
/// 错误记录为当前单例创建的相关错误。
pub struct BeanFactoryAdvisorSource {
    bean_factory: Weak<DefaultListableBeanFactory>,
    /// 已经转换过的切面 Bean（按名称缓存）
    aspect_advisors: RwLock<Vec<(String, Vec<Arc<dyn Advisor>>)>>,
}

impl BeanFactoryAdvisorSource {
    pub fn new(bean_factory: &Arc<DefaultListableBeanFactory>) -> Self {
        Self {
            bean_factory: Arc::downgrade(bean_factory),
            aspect_advisors: RwLock::new(Vec::new()),
        }
    }

    fn advisor_beans(&self, factory: &DefaultListableBeanFactory) -> Vec<Arc<dyn Advisor>> {
        let names = factory.get_bean_names_for_type(TypeId::of::<Arc<dyn Advisor>>());
        let mut advisors = Vec::with_capacity(names.len());

        for name in names {
            if factory.is_currently_in_creation(&name) {
                tracing::trace!("Skipping currently created advisor '{}'", name);
                continue;
            }
            match factory.get_bean(&name) {
                Ok(bean) => match bean.downcast_ref::<Arc<dyn Advisor>>() {
                    Some(advisor) => advisors.push(Arc::clone(advisor)),
                    None => tracing::warn!("Bean '{}' was expected to be an advisor", name),
                },
                Err(e) if e.is_currently_in_creation() => {
                    tracing::trace!("Skipping advisor '{}' with dependency on currently created bean: {}", name, e);
                    factory.on_suppressed_error(e);
                }
                Err(e) => {
                    tracing::warn!("Failed to create advisor bean '{}': {}", name, e);
                    factory.on_suppressed_error(e);
                }
            }
        }
        advisors
    }

    fn aspect_beans(&self, factory: &DefaultListableBeanFactory) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let names = factory.get_bean_names_for_type(TypeId::of::<Arc<dyn Aspect>>());
        let mut advisors = Vec::new();

        for name in names {
            if let Some((_, cached)) = self.aspect_advisors.read().iter().find(|(n, _)| *n == name) {
                advisors.extend(cached.iter().cloned());
                continue;
            }
            if factory.is_currently_in_creation(&name) {
                tracing::trace!("Skipping currently created aspect '{}'", name);
                continue;
            }

            let bean = match factory.get_bean(&name) {
                Ok(bean) => bean,
                Err(e) => {
                    tracing::warn!("Failed to create aspect bean '{}': {}", name, e);
                    factory.on_suppressed_error(e);
                    continue;
                }
            };
            let converted = advisors_for_aspect_bean(&bean)?;
            tracing::debug!("Built {} advisors for aspect bean '{}'", converted.len(), name);
            advisors.extend(converted.iter().cloned());
            self.aspect_advisors.write().push((name, converted));
        }
        Ok(advisors)
    }
}

impl AdvisorSource for BeanFactoryAdvisorSource {
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let Some(factory) = self.bean_factory.upgrade() else {
            return Err(AopError::Container(ContainerError::InvalidConfiguration(
                "Bean factory has been dropped".to_string(),
            )));
        };

        let mut advisors = self.advisor_beans(&factory);
        advisors.extend(self.aspect_beans(&factory)?);
        Ok(advisors)
    }
}

/// 按顺序合并多个来源
#[derive(Default)]
pub struct CompositeAdvisorSource {
    sources: Vec<Arc<dyn AdvisorSource>>,
}

impl CompositeAdvisorSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, source: Arc<dyn AdvisorSource>) -> Self {
        self.sources.push(source);
        self
    }
}

impl AdvisorSource for CompositeAdvisorSource {
    fn find_candidate_advisors(&self) -> AopResult<Vec<Arc<dyn Advisor>>> {
        let mut advisors = Vec::new();
        for source in &self.sources {
            advisors.extend(source.find_candidate_advisors()?);
        }
        Ok(advisors)
    }
}
