//! AOP 代理
//!
//! 两种代理策略：
//! - 接口代理：只暴露代理配置中的接口（包括引入的接口）
//! - 子类代理：暴露目标类型的全部方法，外加引入的接口，属性写入转发给目标
//!
//! 两种代理都实现了 [`Reflective`]，方法调用经过拦截链后到达目标；同时实现了 [`Advised`]，
//! 调用方可以通过 [`as_advised`] 在运行时查看和修改代理配置。

use std::fmt;
use std::sync::Arc;

use chimera_beans::{
    Args, InjectionValue, Interface, Method, NoSuchMethodError, ObjectRef, Reflective, TypeDescriptor, Value,
};

use crate::advice::Advice;
use crate::advised::{Advised, AdvisedSupport};
use crate::advisor::Advisor;
use crate::error::{AopError, AopResult};
use crate::invocation::MethodInvocation;
use crate::target_source::TargetSource;

/// 代理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyStrategy {
    /// 实现接口的轻量包装
    Interface,
    /// 覆盖目标全部方法的"子类"
    Subclass,
}

impl ProxyStrategy {
    /// 根据配置选择策略：强制子类代理或没有任何接口时使用子类代理
    pub fn select(config: &AdvisedSupport) -> Self {
        if config.is_proxy_target_class() || config.proxied_interfaces().is_empty() {
            ProxyStrategy::Subclass
        } else {
            ProxyStrategy::Interface
        }
    }

    /// 创建代理对象
    pub fn create_proxy(self, config: Arc<AdvisedSupport>) -> AopResult<ObjectRef> {
        let target_source = config
            .target_source()
            .ok_or_else(|| AopError::NotProxyable("<no target source>".to_string()))?;
        let target_type = target_source.target_type();

        let proxy = match self {
            ProxyStrategy::Interface => {
                if config.proxied_interfaces().is_empty() {
                    return Err(AopError::NotProxyable(format!(
                        "{} (no interfaces to proxy)",
                        target_type.name()
                    )));
                }
                ObjectRef::reflective(Arc::new(InterfaceProxy { config, target_type }))
            }
            ProxyStrategy::Subclass => ObjectRef::reflective(Arc::new(SubclassProxy { config, target_type })),
        };
        Ok(proxy)
    }
}

/// 经过拦截链调用目标方法
fn invoke_advised(config: &AdvisedSupport, method: &Method, args: &Args) -> anyhow::Result<Value> {
    let target_source = config
        .target_source()
        .ok_or_else(|| anyhow::anyhow!("Proxy has no target source"))?;
    let target_type = target_source.target_type();
    let target = target_source.get_target()?;

    let chain = config.interceptors_for(method, &target_type)?;
    let result = if chain.is_empty() {
        target.invoke(method, args)
    } else {
        MethodInvocation::new(target.clone(), target_type, method.clone(), args.clone(), chain).proceed()
    };

    if !target_source.is_static() {
        if let Err(e) = target_source.release_target(&target) {
            tracing::warn!("Failed to release target after {}: {}", method, e);
        }
    }
    result
}

/// 接口代理
pub struct InterfaceProxy {
    config: Arc<AdvisedSupport>,
    target_type: Arc<TypeDescriptor>,
}

impl InterfaceProxy {
    pub fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }
}

impl Reflective for InterfaceProxy {
    fn type_descriptor(&self) -> Arc<TypeDescriptor> {
        let mut builder = TypeDescriptor::builder::<InterfaceProxy>(format!("Proxy<{}>", self.target_type.name()))
            .role(self.target_type.role());
        for interface in self.config.proxied_interfaces() {
            builder = builder.interface(interface);
        }
        builder.build()
    }

    fn invoke(&self, method: &Method, args: &Args) -> anyhow::Result<Value> {
        if !self.config.is_interface_proxied(method.owner()) {
            return Err(NoSuchMethodError::new(format!("Proxy<{}>", self.target_type.name()), method).into());
        }
        invoke_advised(&self.config, method, args)
    }
}

impl fmt::Debug for InterfaceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterfaceProxy")
            .field("target_type", &self.target_type.name())
            .field("config", &self.config)
            .finish()
    }
}

/// 子类代理
pub struct SubclassProxy {
    config: Arc<AdvisedSupport>,
    target_type: Arc<TypeDescriptor>,
}

impl SubclassProxy {
    pub fn config(&self) -> &Arc<AdvisedSupport> {
        &self.config
    }
}

impl Reflective for SubclassProxy {
    fn type_descriptor(&self) -> Arc<TypeDescriptor> {
        let target = &self.target_type;
        let mut builder = TypeDescriptor::builder::<SubclassProxy>(target.name()).role(target.role());
        for interface in target.interfaces() {
            builder = builder.interface(Arc::clone(interface));
        }
        for interface in self.config.proxied_interfaces() {
            if !target.implements(interface.name()) {
                builder = builder.interface(interface);
            }
        }
        for method in target.own_methods() {
            let params: Vec<&str> = method.param_types().collect();
            builder = builder.method(method.name(), &params);
        }
        for property in target.properties() {
            builder = match property.required_type() {
                Some(required) => builder.property_of_type(property.name(), required),
                None => builder.property(property.name()),
            };
        }
        builder.build()
    }

    fn invoke(&self, method: &Method, args: &Args) -> anyhow::Result<Value> {
        if !self.target_type.declares_method(method) && !self.config.is_interface_proxied(method.owner()) {
            return Err(NoSuchMethodError::new(self.target_type.name(), method).into());
        }
        invoke_advised(&self.config, method, args)
    }

    fn set_property(&self, name: &str, value: InjectionValue) -> anyhow::Result<()> {
        let target_source = self
            .config
            .target_source()
            .ok_or_else(|| anyhow::anyhow!("Proxy has no target source"))?;
        let target = target_source.get_target()?;
        match target.as_reflective() {
            Some(reflective) => reflective.set_property(name, value),
            None => anyhow::bail!("Property '{}' is not writable on type '{}'", name, self.target_type.name()),
        }
    }
}

impl fmt::Debug for SubclassProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubclassProxy")
            .field("target_type", &self.target_type.name())
            .field("config", &self.config)
            .finish()
    }
}

macro_rules! delegate_advised {
    ($proxy:ty) => {
        impl Advised for $proxy {
            fn is_frozen(&self) -> bool {
                self.config.is_frozen()
            }

            fn is_proxy_target_class(&self) -> bool {
                self.config.is_proxy_target_class()
            }

            fn is_pre_filtered(&self) -> bool {
                self.config.is_pre_filtered()
            }

            fn advisors(&self) -> Vec<Arc<dyn Advisor>> {
                self.config.advisors()
            }

            fn add_advisor(&self, advisor: Arc<dyn Advisor>) -> AopResult<()> {
                self.config.add_advisor(advisor)
            }

            fn add_advisor_at(&self, position: usize, advisor: Arc<dyn Advisor>) -> AopResult<()> {
                self.config.add_advisor_at(position, advisor)
            }

            fn remove_advisor(&self, advisor: &Arc<dyn Advisor>) -> AopResult<bool> {
                self.config.remove_advisor(advisor)
            }

            fn remove_advisor_at(&self, index: usize) -> AopResult<Arc<dyn Advisor>> {
                self.config.remove_advisor_at(index)
            }

            fn index_of(&self, advisor: &Arc<dyn Advisor>) -> Option<usize> {
                self.config.index_of(advisor)
            }

            fn add_advice(&self, advice: Advice) -> AopResult<()> {
                self.config.add_advice(advice)
            }

            fn proxied_interfaces(&self) -> Vec<Arc<Interface>> {
                self.config.proxied_interfaces()
            }

            fn is_interface_proxied(&self, name: &str) -> bool {
                self.config.is_interface_proxied(name)
            }

            fn target_source(&self) -> Option<Arc<dyn TargetSource>> {
                self.config.target_source()
            }

            fn set_target_source(&self, target_source: Arc<dyn TargetSource>) {
                self.config.set_target_source(target_source)
            }
        }
    };
}

delegate_advised!(InterfaceProxy);
delegate_advised!(SubclassProxy);

/// 获取代理对象的配置视图，普通对象返回 `None`
pub fn as_advised(object: &ObjectRef) -> Option<Arc<dyn Advised>> {
    if let Some(proxy) = object.downcast::<InterfaceProxy>() {
        return Some(proxy);
    }
    if let Some(proxy) = object.downcast::<SubclassProxy>() {
        return Some(proxy);
    }
    None
}

/// 是否为 AOP 代理
pub fn is_aop_proxy(object: &ObjectRef) -> bool {
    object.is::<InterfaceProxy>() || object.is::<SubclassProxy>()
}

/// 代理使用的策略，普通对象返回 `None`
pub fn proxy_strategy(object: &ObjectRef) -> Option<ProxyStrategy> {
    if object.is::<InterfaceProxy>() {
        Some(ProxyStrategy::Interface)
    } else if object.is::<SubclassProxy>() {
        Some(ProxyStrategy::Subclass)
    } else {
        None
    }
}
