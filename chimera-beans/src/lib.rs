// chimera-beans: Bean 容器核心
//
// 提供：
// - 单例注册表（三级缓存，支持单例之间的循环引用）
// - Bean 定义、父定义合并和作用域（单例、原型、自定义）
// - 显式依赖（depends_on）的环检测和创建失败后的清理
// - BeanPostProcessor 扩展点（AOP 自动代理在这里接入）

pub mod bean;
pub mod bean_factory;
pub mod bean_post_processor;
pub mod config;
pub mod creation;
pub mod error;
pub mod inject;
pub mod logging;
pub mod reflect;
pub mod scope;
pub mod singleton_registry;
pub mod utils;

// 重新导出常用类型
pub use bean::{AutowireMode, BeanDefinition, Instantiator, LifecycleCallback, PropertyValue};
pub use bean_factory::{
    BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
    DefaultListableBeanFactory, ListableBeanFactory,
};
pub use bean_post_processor::BeanPostProcessor;
pub use config::{
    ConfigValue, ContainerSettings, Environment, EnvironmentPropertySource, MapPropertySource,
    PropertySource, TomlPropertySource,
};
pub use creation::{BeanResolver, CreationContext};
pub use error::{ContainerError, ContainerResult};
pub use inject::Autowired;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use reflect::{
    value, Args, InjectionValue, Interface, Method, NoSuchMethodError, ObjectRef, PropertyDescriptor, Reflective,
    Role, TypeDescriptor, TypeDescriptorBuilder, Value,
};
pub use scope::{Scope, ScopeProvider, SimpleMapScope, ThreadScope};
pub use singleton_registry::{DefaultSingletonRegistry, Disposable, EarlyReferenceFactory};

/// Prelude 模块，包含常用的 traits 和类型
pub mod prelude {
    pub use crate::args;
    pub use crate::bean::{AutowireMode, BeanDefinition, PropertyValue};
    pub use crate::bean_factory::{
        BeanFactory, BeanFactoryExt, ConfigurableBeanFactory, ConfigurableListableBeanFactory,
        DefaultListableBeanFactory, ListableBeanFactory,
    };
    pub use crate::bean_post_processor::BeanPostProcessor;
    pub use crate::config::{ConfigValue, ContainerSettings, Environment, MapPropertySource, PropertySource};
    pub use crate::creation::BeanResolver;
    pub use crate::error::{ContainerError, ContainerResult};
    pub use crate::inject::Autowired;
    pub use crate::logging::{LogFormat, LogLevel, LoggingConfig};
    pub use crate::reflect::{
        value, Args, InjectionValue, Interface, Method, NoSuchMethodError, ObjectRef, Reflective, TypeDescriptor,
        Value,
    };
    pub use crate::scope::{Scope, ScopeProvider};
    pub use crate::utils;
    // Re-export anyhow for convenience
    pub use anyhow::{anyhow, Context};
}
