//! Bean Factory - 核心容器接口
//!
//! 单例的缓存和循环引用处理交给 [`DefaultSingletonRegistry`]，这里负责把 Bean 定义
//! 变成完整装配好的对象：合并父定义、显式依赖、实例化、早期引用、属性填充、
//! 初始化回调以及各阶段的后置处理器。

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::bean::{AutowireMode, BeanDefinition, PropertyValue};
use crate::bean_post_processor::BeanPostProcessor;
use crate::config::{ContainerSettings, Environment};
use crate::creation::{BeanResolver, CreationContext};
use crate::error::{ContainerError, ContainerResult};
use crate::reflect::{Args, InjectionValue, ObjectRef, TypeDescriptor};
use crate::scope::{Scope, ScopeProvider};
use crate::singleton_registry::DefaultSingletonRegistry;
use crate::utils::dependency::validate_dependency_graph;
use crate::utils::naming::short_type_name;

/// BeanFactory - 最基础的容器接口
///
/// 注意：此 trait 不包含泛型方法，因此可以作为 trait object 使用
pub trait BeanFactory: Send + Sync {
    /// 通过名称获取 Bean（可能是代理）
    fn get_bean(&self, name: &str) -> ContainerResult<ObjectRef>;

    /// 检查是否包含指定名称的 Bean
    fn contains_bean(&self, name: &str) -> bool;

    /// 指定名称的 Bean 是否为单例
    fn is_singleton(&self, name: &str) -> ContainerResult<bool>;

    /// 指定名称的 Bean 是否为原型
    fn is_prototype(&self, name: &str) -> ContainerResult<bool>;

    /// 解析 Bean 的类型描述，无法在不创建的情况下确定时返回 `None`
    fn get_type(&self, name: &str) -> ContainerResult<Option<Arc<TypeDescriptor>>>;
}

/// BeanFactoryExt - BeanFactory 的扩展 trait
///
/// 提供泛型方法，不能作为 trait object 使用
pub trait BeanFactoryExt: BeanFactory {
    /// 通过名称获取 Bean 并转换为期望的类型
    fn get_bean_typed<T: Any + Send + Sync>(&self, name: &str) -> ContainerResult<Arc<T>> {
        let bean = self.get_bean(name)?;
        bean.downcast::<T>().ok_or_else(|| ContainerError::TypeMismatch {
            name: name.to_string(),
            expected: std::any::type_name::<T>().to_string(),
            found: bean.type_name().to_string(),
        })
    }
}

impl<F: BeanFactory + ?Sized> BeanFactoryExt for F {}

/// ListableBeanFactory - 可列举的 Bean 工厂
pub trait ListableBeanFactory: BeanFactory {
    /// 获取所有 Bean 定义的名称（按注册顺序）
    fn get_bean_names(&self) -> Vec<String>;

    /// 获取指定 Rust 类型的所有 Bean 名称
    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String>;

    /// 获取类型名或接口名匹配的所有 Bean 名称
    fn get_bean_names_for_type_name(&self, type_name: &str) -> Vec<String>;

    /// 获取 Bean 定义的数量
    fn get_bean_definition_count(&self) -> usize;

    /// 检查是否包含指定的 Bean 定义
    fn contains_bean_definition(&self, name: &str) -> bool;
}

/// ConfigurableBeanFactory - 可配置的 Bean 工厂
pub trait ConfigurableBeanFactory: BeanFactory {
    /// 注册 Bean 定义
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()>;

    /// 移除 Bean 定义
    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()>;

    /// 获取原始 Bean 定义
    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition>;

    /// 获取与父定义合并后的 Bean 定义
    fn get_merged_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>>;

    /// 注册一个已经构建好的单例
    fn register_singleton(&self, name: &str, object: ObjectRef) -> ContainerResult<()>;

    /// 注册自定义作用域
    fn register_scope(&self, name: &str, provider: Arc<dyn ScopeProvider>);

    /// 添加 BeanPostProcessor
    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>);

    /// 获取所有 BeanPostProcessor
    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>>;

    /// 指定名称的单例是否正在创建
    fn is_currently_in_creation(&self, name: &str) -> bool;
}

/// ConfigurableListableBeanFactory - 可配置且可列举的 Bean 工厂
pub trait ConfigurableListableBeanFactory: ListableBeanFactory + ConfigurableBeanFactory {
    /// 预实例化所有非延迟的单例 Bean
    fn preinstantiate_singletons(&self) -> ContainerResult<()>;

    /// 冻结配置（不再允许修改 Bean 定义）
    fn freeze_configuration(&self);

    /// 检查配置是否已冻结
    fn is_configuration_frozen(&self) -> bool;

    /// 销毁所有单例 Bean（调用 destroy 回调）
    fn destroy_singletons(&self);

    /// 校验显式依赖图（缺失的依赖和环）
    fn validate_dependencies(&self) -> ContainerResult<()>;
}

/// DefaultListableBeanFactory - ConfigurableListableBeanFactory 的默认实现
pub struct DefaultListableBeanFactory {
    /// Bean 定义存储
    definitions: RwLock<HashMap<String, BeanDefinition>>,

    /// 定义的注册顺序
    definition_names: RwLock<Vec<String>>,

    /// 合并后的定义缓存
    merged_definitions: RwLock<HashMap<String, Arc<BeanDefinition>>>,

    /// 单例注册表
    registry: DefaultSingletonRegistry,

    /// 自定义作用域
    scopes: RwLock<HashMap<String, Arc<dyn ScopeProvider>>>,

    /// Bean 后置处理器列表（按优先级排序）
    bean_post_processors: RwLock<Vec<Arc<dyn BeanPostProcessor>>>,

    environment: Arc<Environment>,

    settings: ContainerSettings,

    /// 本地没有定义时查询的父工厂
    parent: Option<Arc<dyn BeanFactory>>,

    /// 配置是否已冻结
    configuration_frozen: AtomicBool,
}

impl DefaultListableBeanFactory {
    /// 创建新的 Bean 工厂
    pub fn new() -> Self {
        Self {
            definitions: RwLock::new(HashMap::new()),
            definition_names: RwLock::new(Vec::new()),
            merged_definitions: RwLock::new(HashMap::new()),
            registry: DefaultSingletonRegistry::new(),
            scopes: RwLock::new(HashMap::new()),
            bean_post_processors: RwLock::new(Vec::new()),
            environment: Arc::new(Environment::new()),
            settings: ContainerSettings::default(),
            parent: None,
            configuration_frozen: AtomicBool::new(false),
        }
    }

    /// 使用 Environment 创建，容器开关从 `chimera.beans.*` 读取
    pub fn from_environment(environment: Arc<Environment>) -> Self {
        let settings = ContainerSettings::from_environment(&environment);
        Self::new().with_environment(environment).with_settings(settings)
    }

    pub fn with_settings(mut self, settings: ContainerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_environment(mut self, environment: Arc<Environment>) -> Self {
        self.environment = environment;
        self
    }

    pub fn with_parent(mut self, parent: Arc<dyn BeanFactory>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn settings(&self) -> &ContainerSettings {
        &self.settings
    }

    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    pub fn parent_bean_factory(&self) -> Option<&Arc<dyn BeanFactory>> {
        self.parent.as_ref()
    }

    pub fn singleton_registry(&self) -> &DefaultSingletonRegistry {
        &self.registry
    }

    /// 记录 `dependent` 依赖 `name`
    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        self.registry.register_dependent_bean(name, dependent);
    }

    /// 记录一个与当前单例创建相关的错误，它会附加到最终的失败上
    pub fn on_suppressed_error(&self, error: ContainerError) {
        self.registry.on_suppressed_error(error);
    }

    /// 按 Rust 类型获取唯一 Bean，多个候选时使用 primary
    pub fn get_bean_by_type<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let type_name = std::any::type_name::<T>();
        let candidates = self.get_bean_names_for_type(TypeId::of::<T>());
        let name = self
            .select_candidate(type_name, candidates)?
            .ok_or_else(|| ContainerError::BeanDefinitionNotFound(type_name.to_string()))?;
        self.get_bean_typed::<T>(&name)
    }

    /// 按类型名查找唯一候选
    ///
    /// 没有候选时返回 `None`；多个候选时取唯一的 primary，否则报 `NoUniqueBean`。
    pub fn resolve_unique_bean_name(&self, type_name: &str) -> ContainerResult<Option<String>> {
        let candidates = self.get_bean_names_for_type_name(type_name);
        self.select_candidate(type_name, candidates)
    }

    fn select_candidate(&self, type_name: &str, candidates: Vec<String>) -> ContainerResult<Option<String>> {
        match candidates.len() {
            0 => Ok(None),
            1 => Ok(candidates.into_iter().next()),
            _ => {
                let primaries: Vec<&String> = candidates
                    .iter()
                    .filter(|name| {
                        self.get_merged_bean_definition(name)
                            .map(|d| d.is_primary())
                            .unwrap_or(false)
                    })
                    .collect();
                match primaries.as_slice() {
                    [primary] => Ok(Some((*primary).clone())),
                    _ => Err(ContainerError::NoUniqueBean {
                        type_name: type_name.to_string(),
                        candidates,
                    }),
                }
            }
        }
    }

    /// 获取 Bean 的核心流程，`ctx` 沿着递归调用传递
    pub(crate) fn do_get_bean(&self, name: &str, ctx: &mut CreationContext) -> ContainerResult<ObjectRef> {
        tracing::trace!("Requesting bean: '{}'", name);

        if let Some(shared) = self.registry.get_singleton(name, true)? {
            if self.registry.is_currently_in_creation(name) {
                tracing::trace!(
                    "Returning eagerly cached instance of singleton bean '{}' that is not fully initialized yet - a consequence of a circular reference",
                    name
                );
            }
            return Ok(shared);
        }

        if ctx.is_prototype_in_creation(name) {
            return Err(ContainerError::currently_in_creation(
                name,
                "Requested prototype bean is currently in creation: Is there an unresolvable circular reference?",
            ));
        }

        if !self.contains_bean_definition(name) {
            if let Some(parent) = &self.parent {
                tracing::trace!("Delegating lookup of '{}' to parent bean factory", name);
                return parent.get_bean(name);
            }
            tracing::debug!("Bean '{}' not found in container", name);
            return Err(ContainerError::BeanDefinitionNotFound(name.to_string()));
        }

        let definition = self.get_merged_bean_definition(name)?;
        if definition.is_abstract() {
            return Err(ContainerError::BeanIsAbstract(name.to_string()));
        }

        self.initialize_depends_on(name, &definition, ctx)?;

        match definition.scope() {
            Scope::Singleton => self.registry.get_or_create(name, || {
                let result = self.create_bean(name, &definition, ctx);
                if result.is_err() {
                    // 清理可能已经暴露出去的早期引用
                    self.registry.destroy_singleton(name);
                }
                result
            }),
            Scope::Prototype => {
                tracing::debug!("Creating new instance of prototype bean '{}'", name);
                ctx.begin_prototype(name);
                let result = self.create_bean(name, &definition, ctx);
                ctx.end_prototype(name);
                result
            }
            Scope::Custom(scope_name) => {
                let provider = self
                    .scopes
                    .read()
                    .get(scope_name)
                    .cloned()
                    .ok_or_else(|| ContainerError::ScopeNotActive(scope_name.clone()))?;

                let mut create = || -> ContainerResult<ObjectRef> {
                    ctx.begin_prototype(name);
                    let result = self.create_bean(name, &definition, ctx);
                    ctx.end_prototype(name);
                    result
                };
                provider.get(name, &mut create)
            }
        }
    }

    /// 先创建显式声明的依赖
    fn initialize_depends_on(
        &self,
        name: &str,
        definition: &BeanDefinition,
        ctx: &mut CreationContext,
    ) -> ContainerResult<()> {
        for dependency in definition.dependencies() {
            if self.registry.is_dependent(name, dependency) {
                let mut chain = vec![name.to_string()];
                match self.dependency_path(dependency, name, &mut HashSet::new()) {
                    Some(path) => chain.extend(path),
                    None => chain.extend([dependency.clone(), name.to_string()]),
                }
                return Err(ContainerError::CircularDependency {
                    name: name.to_string(),
                    chain,
                });
            }
            self.registry.register_dependent_bean(dependency, name);
            self.do_get_bean(dependency, ctx).map_err(|e| {
                ContainerError::creation_failure(
                    name,
                    anyhow::Error::new(e).context(format!("'{}' depends on bean '{}'", name, dependency)),
                )
            })?;
        }
        Ok(())
    }

    /// 沿着已登记的依赖关系，从 `from` 到 `to` 的路径
    fn dependency_path(&self, from: &str, to: &str, visited: &mut HashSet<String>) -> Option<Vec<String>> {
        if from == to {
            return Some(vec![to.to_string()]);
        }
        if !visited.insert(from.to_string()) {
            return None;
        }
        for next in self.registry.dependencies_for_bean(from) {
            if let Some(mut rest) = self.dependency_path(&next, to, visited) {
                rest.insert(0, from.to_string());
                return Some(rest);
            }
        }
        None
    }

    fn create_bean(
        &self,
        name: &str,
        definition: &BeanDefinition,
        ctx: &mut CreationContext,
    ) -> ContainerResult<ObjectRef> {
        tracing::trace!("Creating instance of bean '{}'", name);
        ctx.enter(name);
        let result = self.do_create_bean(name, definition, ctx);
        ctx.leave();
        if let Err(e) = &result {
            tracing::debug!("Creation of bean '{}' failed: {}", name, e);
        }
        result
    }

    /// 创建 Bean 实例并调用生命周期回调
    ///
    /// # 生命周期顺序
    /// 1. 实例化前的后置处理（可以直接返回替代对象）
    /// 2. 实例化（构造函数注入）
    /// 3. 登记早期引用工厂（仅单例）
    /// 4. 属性填充
    /// 5. post_process_before_initialization
    /// 6. init 方法 / init 回调
    /// 7. post_process_after_initialization
    /// 8. 早期引用一致性检查，登记销毁回调
    fn do_create_bean(
        &self,
        name: &str,
        definition: &BeanDefinition,
        ctx: &mut CreationContext,
    ) -> ContainerResult<ObjectRef> {
        if let Some(bean) = self.resolve_before_instantiation(name, definition)? {
            tracing::debug!("Bean '{}' supplied by a post processor before instantiation", name);
            return self.apply_bean_post_processors_after_initialization(bean, name);
        }

        let instantiator = definition
            .instantiator()
            .ok_or_else(|| ContainerError::BeanIsAbstract(name.to_string()))?;
        let raw = {
            let mut resolver = BeanResolver::new(self, ctx, name);
            instantiator(&mut resolver).map_err(|e| ContainerError::creation_failure(name, e))?
        };

        let early_singleton_exposure = definition.is_singleton()
            && self.settings.allow_circular_references
            && self.registry.is_currently_in_creation(name);
        if early_singleton_exposure {
            tracing::debug!(
                "Eagerly caching bean '{}' to allow for resolving potential circular references",
                name
            );
            let processors = self.get_bean_post_processors();
            let exposed = raw.clone();
            let bean_name = name.to_string();
            self.registry.register_early_factory(
                name,
                Arc::new(move || -> ContainerResult<ObjectRef> {
                    let mut bean = exposed.clone();
                    for processor in &processors {
                        bean = processor.get_early_bean_reference(bean, &bean_name)?;
                    }
                    Ok(bean)
                }),
            );
        }

        self.populate_bean(name, definition, &raw, ctx)?;
        let mut exposed = self.initialize_bean(name, definition, raw.clone())?;

        if early_singleton_exposure {
            if let Some(early) = self.registry.get_singleton(name, false)? {
                if exposed.ptr_eq(&raw) {
                    exposed = early;
                } else if !self.settings.allow_raw_injection_despite_wrapping
                    && self.registry.has_dependent_bean(name)
                {
                    let dependents = self.registry.dependent_beans(name);
                    return Err(ContainerError::currently_in_creation(
                        name,
                        format!(
                            "Bean has been injected into other beans [{}] in its raw version as part of a circular reference, but has eventually been wrapped. \
                             This means that said other beans do not use the final version of the bean.",
                            dependents.join(", ")
                        ),
                    ));
                }
            }
        }

        self.register_disposable_if_necessary(name, definition, &raw);
        Ok(exposed)
    }

    fn resolve_before_instantiation(
        &self,
        name: &str,
        definition: &BeanDefinition,
    ) -> ContainerResult<Option<ObjectRef>> {
        for processor in self.get_bean_post_processors() {
            if let Some(bean) = processor.post_process_before_instantiation(definition, name)? {
                return Ok(Some(bean));
            }
        }
        Ok(None)
    }

    /// 属性填充：先显式属性，再按自动装配模式补充
    fn populate_bean(
        &self,
        name: &str,
        definition: &BeanDefinition,
        bean: &ObjectRef,
        ctx: &mut CreationContext,
    ) -> ContainerResult<()> {
        let mode = definition.autowire_mode();
        if definition.properties().is_empty() && mode == AutowireMode::No {
            return Ok(());
        }

        let Some(reflective) = bean.as_reflective().cloned() else {
            if definition.properties().is_empty() {
                return Ok(());
            }
            return Err(ContainerError::creation_failure(
                name,
                anyhow::anyhow!("Bean type '{}' does not support property injection", bean.type_name()),
            ));
        };

        for (property, value) in definition.properties() {
            let injection = match value {
                PropertyValue::Ref(reference) => {
                    InjectionValue::Bean(self.resolve_reference(name, reference, ctx)?)
                }
                PropertyValue::Value(literal) => InjectionValue::Config(literal.clone()),
                PropertyValue::Placeholder(text) => InjectionValue::Config(
                    self.environment
                        .resolve_value(text)
                        .map_err(|e| ContainerError::creation_failure(name, e.into()))?,
                ),
            };
            reflective.set_property(property, injection).map_err(|e| {
                ContainerError::creation_failure(name, e.context(format!("Failed to set property '{}'", property)))
            })?;
        }

        if mode == AutowireMode::No {
            return Ok(());
        }

        let descriptor = reflective.type_descriptor();
        for property in descriptor.properties() {
            if definition.properties().iter().any(|(p, _)| p == property.name()) {
                continue;
            }

            let candidate = match mode {
                AutowireMode::ByName => self
                    .contains_bean(property.name())
                    .then(|| property.name().to_string()),
                AutowireMode::ByType => match property.required_type() {
                    Some(required) => self
                        .resolve_unique_bean_name(required)
                        .map_err(|e| ContainerError::creation_failure(name, e.into()))?,
                    None => None,
                },
                AutowireMode::No => None,
            };

            let Some(candidate) = candidate.filter(|c| c != name) else {
                continue;
            };
            tracing::trace!("Autowiring property '{}' of bean '{}' with bean '{}'", property.name(), name, candidate);
            let dependency = self.resolve_reference(name, &candidate, ctx)?;
            reflective
                .set_property(property.name(), InjectionValue::Bean(dependency))
                .map_err(|e| {
                    ContainerError::creation_failure(
                        name,
                        e.context(format!("Failed to autowire property '{}'", property.name())),
                    )
                })?;
        }

        Ok(())
    }

    fn resolve_reference(
        &self,
        name: &str,
        reference: &str,
        ctx: &mut CreationContext,
    ) -> ContainerResult<ObjectRef> {
        let bean = self.do_get_bean(reference, ctx).map_err(|e| {
            ContainerError::creation_failure(
                name,
                anyhow::Error::new(e).context(format!("Cannot resolve reference to bean '{}'", reference)),
            )
        })?;
        self.registry.register_dependent_bean(reference, name);
        Ok(bean)
    }

    fn initialize_bean(&self, name: &str, definition: &BeanDefinition, bean: ObjectRef) -> ContainerResult<ObjectRef> {
        let bean = self.apply_bean_post_processors_before_initialization(bean, name)?;

        if let Some(method) = definition.init_method_name() {
            tracing::trace!("Invoking init method '{}' on bean '{}'", method, name);
            bean.invoke_by_name(method, &Args::new()).map_err(|e| {
                ContainerError::creation_failure(name, e.context(format!("Invocation of init method '{}' failed", method)))
            })?;
        }
        if let Some(init) = definition.init_callback() {
            init(&bean).map_err(|e| ContainerError::creation_failure(name, e.context("Init callback failed")))?;
        }

        self.apply_bean_post_processors_after_initialization(bean, name)
    }

    /// 应用 post_process_before_initialization
    fn apply_bean_post_processors_before_initialization(
        &self,
        bean: ObjectRef,
        bean_name: &str,
    ) -> ContainerResult<ObjectRef> {
        let mut current_bean = bean;
        for processor in self.get_bean_post_processors() {
            current_bean = processor
                .post_process_before_initialization(current_bean, bean_name)
                .map_err(|e| ContainerError::creation_failure(bean_name, e.into()))?;
        }
        Ok(current_bean)
    }

    /// 应用 post_process_after_initialization
    fn apply_bean_post_processors_after_initialization(
        &self,
        bean: ObjectRef,
        bean_name: &str,
    ) -> ContainerResult<ObjectRef> {
        let mut current_bean = bean;
        for processor in self.get_bean_post_processors() {
            current_bean = processor
                .post_process_after_initialization(current_bean, bean_name)
                .map_err(|e| ContainerError::creation_failure(bean_name, e.into()))?;
        }
        Ok(current_bean)
    }

    fn register_disposable_if_necessary(&self, name: &str, definition: &BeanDefinition, bean: &ObjectRef) {
        if !definition.is_singleton() || !definition.has_destroy_hook() {
            return;
        }

        let bean = bean.clone();
        let bean_name = name.to_string();
        let destroy_method = definition.destroy_method_name().map(str::to_string);
        let destroy_callback = definition.destroy_callback().cloned();

        self.registry.register_disposable(
            name,
            Box::new(move || -> anyhow::Result<()> {
                if let Some(method) = &destroy_method {
                    tracing::trace!("Invoking destroy method '{}' on bean '{}'", method, bean_name);
                    bean.invoke_by_name(method, &Args::new())?;
                }
                if let Some(callback) = &destroy_callback {
                    callback(&bean)?;
                }
                Ok(())
            }),
        );
    }

    /// 合并父定义，`visiting` 用于检测父定义链中的环
    fn merge_definition(&self, name: &str, visiting: &mut Vec<String>) -> ContainerResult<Arc<BeanDefinition>> {
        if let Some(merged) = self.merged_definitions.read().get(name) {
            return Ok(Arc::clone(merged));
        }

        let definition = self.get_bean_definition(name)?;
        let merged = match definition.parent_name() {
            None => definition,
            Some(parent) => {
                if visiting.iter().any(|v| v == parent) {
                    return Err(ContainerError::InvalidConfiguration(format!(
                        "Parent definition cycle for bean '{}': {} -> {}",
                        name,
                        visiting.join(" -> "),
                        parent
                    )));
                }
                visiting.push(name.to_string());
                let parent_definition = self.merge_definition(parent, visiting)?;
                visiting.pop();
                definition.merge_with_parent(&parent_definition)
            }
        };

        let merged = Arc::new(merged);
        self.merged_definitions
            .write()
            .insert(name.to_string(), Arc::clone(&merged));
        Ok(merged)
    }

    fn ensure_not_frozen(&self) -> ContainerResult<()> {
        if self.configuration_frozen.load(Ordering::SeqCst) {
            return Err(ContainerError::ConfigurationFrozen);
        }
        Ok(())
    }

    /// 手动注册的单例（没有对应的定义）
    fn manual_singleton_names(&self) -> Vec<String> {
        let definitions = self.definitions.read();
        self.registry
            .singleton_names()
            .into_iter()
            .filter(|name| !definitions.contains_key(name))
            .collect()
    }
}

impl Default for DefaultListableBeanFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefaultListableBeanFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultListableBeanFactory")
            .field("definitions", &*self.definition_names.read())
            .field("singletons", &self.registry.singleton_names())
            .field("frozen", &self.configuration_frozen.load(Ordering::SeqCst))
            .finish()
    }
}

impl BeanFactory for DefaultListableBeanFactory {
    fn get_bean(&self, name: &str) -> ContainerResult<ObjectRef> {
        self.do_get_bean(name, &mut CreationContext::new())
    }

    fn contains_bean(&self, name: &str) -> bool {
        self.contains_bean_definition(name)
            || self.registry.contains_singleton(name)
            || self.parent.as_ref().is_some_and(|p| p.contains_bean(name))
    }

    fn is_singleton(&self, name: &str) -> ContainerResult<bool> {
        if self.contains_bean_definition(name) {
            return Ok(self.get_merged_bean_definition(name)?.is_singleton());
        }
        if self.registry.contains_singleton(name) {
            return Ok(true);
        }
        match &self.parent {
            Some(parent) => parent.is_singleton(name),
            None => Err(ContainerError::BeanDefinitionNotFound(name.to_string())),
        }
    }

    fn is_prototype(&self, name: &str) -> ContainerResult<bool> {
        if self.contains_bean_definition(name) {
            return Ok(self.get_merged_bean_definition(name)?.is_prototype());
        }
        if self.registry.contains_singleton(name) {
            return Ok(false);
        }
        match &self.parent {
            Some(parent) => parent.is_prototype(name),
            None => Err(ContainerError::BeanDefinitionNotFound(name.to_string())),
        }
    }

    fn get_type(&self, name: &str) -> ContainerResult<Option<Arc<TypeDescriptor>>> {
        if let Some(singleton) = self.registry.get_singleton(name, false)? {
            if let Some(descriptor) = singleton.type_descriptor() {
                return Ok(Some(descriptor));
            }
        }
        if self.contains_bean_definition(name) {
            return Ok(self.get_merged_bean_definition(name)?.type_descriptor().cloned());
        }
        match &self.parent {
            Some(parent) => parent.get_type(name),
            None if self.registry.contains_singleton(name) => Ok(None),
            None => Err(ContainerError::BeanDefinitionNotFound(name.to_string())),
        }
    }
}

impl ListableBeanFactory for DefaultListableBeanFactory {
    fn get_bean_names(&self) -> Vec<String> {
        self.definition_names.read().clone()
    }

    fn get_bean_names_for_type(&self, type_id: TypeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .get_bean_names()
            .into_iter()
            .filter(|name| {
                self.get_merged_bean_definition(name)
                    .map(|d| !d.is_abstract() && d.bean_type_id() == Some(type_id))
                    .unwrap_or(false)
            })
            .collect();

        for name in self.manual_singleton_names() {
            if let Ok(Some(singleton)) = self.registry.get_singleton(&name, false) {
                if singleton.value_type_id() == type_id {
                    names.push(name);
                }
            }
        }
        names
    }

    fn get_bean_names_for_type_name(&self, type_name: &str) -> Vec<String> {
        let matches_descriptor =
            |descriptor: Option<Arc<TypeDescriptor>>| descriptor.is_some_and(|d| d.is_assignable_to(type_name));

        let mut names: Vec<String> = self
            .get_bean_names()
            .into_iter()
            .filter(|name| {
                let Ok(definition) = self.get_merged_bean_definition(name) else {
                    return false;
                };
                if definition.is_abstract() {
                    return false;
                }
                if matches_descriptor(definition.type_descriptor().cloned()) {
                    return true;
                }
                if definition.bean_type_name().map(short_type_name) == Some(type_name) {
                    return true;
                }
                // 定义没有声明类型时，退回到已创建的单例
                matches!(
                    self.registry.get_singleton(name, false),
                    Ok(Some(singleton)) if matches_descriptor(singleton.type_descriptor())
                )
            })
            .collect();

        for name in self.manual_singleton_names() {
            if let Ok(Some(singleton)) = self.registry.get_singleton(&name, false) {
                if matches_descriptor(singleton.type_descriptor()) {
                    names.push(name);
                }
            }
        }
        names
    }

    fn get_bean_definition_count(&self) -> usize {
        self.definitions.read().len()
    }

    fn contains_bean_definition(&self, name: &str) -> bool {
        self.definitions.read().contains_key(name)
    }
}

impl ConfigurableBeanFactory for DefaultListableBeanFactory {
    fn register_bean_definition(&self, definition: BeanDefinition) -> ContainerResult<()> {
        self.ensure_not_frozen()?;
        let name = definition.name().to_string();

        tracing::trace!(
            "Attempting to register bean: name='{}', type='{:?}', scope={}",
            name,
            definition.bean_type_name(),
            definition.scope()
        );

        let overriding = self.contains_bean_definition(&name);
        if overriding && !self.settings.allow_definition_overriding {
            tracing::warn!("Bean '{}' already exists, registration failed", name);
            return Err(ContainerError::BeanAlreadyExists(name));
        }
        if !overriding && self.registry.contains_singleton(&name) {
            return Err(ContainerError::BeanAlreadyExists(name));
        }

        self.definitions.write().insert(name.clone(), definition);
        if overriding {
            tracing::info!("Overriding bean definition for bean '{}'", name);
            self.registry.destroy_singleton(&name);
        } else {
            self.definition_names.write().push(name.clone());
        }
        self.merged_definitions.write().clear();

        tracing::debug!("Bean definition registered successfully: '{}'", name);
        Ok(())
    }

    fn remove_bean_definition(&self, name: &str) -> ContainerResult<()> {
        self.ensure_not_frozen()?;

        self.definitions
            .write()
            .remove(name)
            .ok_or_else(|| ContainerError::BeanDefinitionNotFound(name.to_string()))?;
        self.definition_names.write().retain(|n| n != name);
        self.merged_definitions.write().clear();
        self.registry.destroy_singleton(name);

        tracing::debug!("Bean definition removed: '{}'", name);
        Ok(())
    }

    fn get_bean_definition(&self, name: &str) -> ContainerResult<BeanDefinition> {
        self.definitions
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ContainerError::BeanDefinitionNotFound(name.to_string()))
    }

    fn get_merged_bean_definition(&self, name: &str) -> ContainerResult<Arc<BeanDefinition>> {
        self.merge_definition(name, &mut Vec::new())
    }

    fn register_singleton(&self, name: &str, object: ObjectRef) -> ContainerResult<()> {
        if self.contains_bean_definition(name) {
            return Err(ContainerError::BeanAlreadyExists(name.to_string()));
        }
        self.registry.register_singleton(name, object)
    }

    fn register_scope(&self, name: &str, provider: Arc<dyn ScopeProvider>) {
        if name == Scope::SINGLETON || name == Scope::PROTOTYPE {
            tracing::warn!("Cannot replace built-in scope '{}'", name);
            return;
        }
        if self.scopes.write().insert(name.to_string(), provider).is_some() {
            tracing::debug!("Replacing scope '{}'", name);
        }
    }

    fn add_bean_post_processor(&self, processor: Arc<dyn BeanPostProcessor>) {
        tracing::debug!("Adding bean post processor '{}'", processor.name());
        let mut processors = self.bean_post_processors.write();
        processors.push(processor);

        // 按优先级排序（order 值越小优先级越高）
        processors.sort_by_key(|p| p.order());
    }

    fn get_bean_post_processors(&self) -> Vec<Arc<dyn BeanPostProcessor>> {
        self.bean_post_processors.read().clone()
    }

    fn is_currently_in_creation(&self, name: &str) -> bool {
        self.registry.is_currently_in_creation(name)
    }
}

impl ConfigurableListableBeanFactory for DefaultListableBeanFactory {
    fn preinstantiate_singletons(&self) -> ContainerResult<()> {
        let bean_names: Vec<String> = self
            .get_bean_names()
            .into_iter()
            .filter(|name| {
                self.get_merged_bean_definition(name)
                    .map(|d| !d.is_abstract() && d.is_singleton() && !d.is_lazy())
                    .unwrap_or(false)
            })
            .collect();

        tracing::info!("Pre-instantiating {} singleton bean(s)", bean_names.len());

        for name in bean_names {
            self.get_bean(&name).inspect_err(|e| {
                tracing::error!("Failed to pre-instantiate singleton '{}': {}", name, e);
            })?;
        }

        Ok(())
    }

    fn freeze_configuration(&self) {
        self.configuration_frozen.store(true, Ordering::SeqCst);
        tracing::debug!("Bean factory configuration frozen");
    }

    fn is_configuration_frozen(&self) -> bool {
        self.configuration_frozen.load(Ordering::SeqCst)
    }

    fn destroy_singletons(&self) {
        tracing::info!("Destroying singleton beans");
        self.registry.destroy_singletons();
        tracing::info!("Singleton beans destruction completed");
    }

    fn validate_dependencies(&self) -> ContainerResult<()> {
        let mut graph: HashMap<String, Vec<String>> = HashMap::new();
        for name in self.get_bean_names() {
            let definition = self.get_merged_bean_definition(&name)?;
            graph.insert(name, definition.dependencies().to_vec());
        }
        for name in self.manual_singleton_names() {
            graph.entry(name).or_default();
        }
        if let Some(parent) = &self.parent {
            let external: Vec<String> = graph
                .values()
                .flatten()
                .filter(|dep| !graph.contains_key(*dep) && parent.contains_bean(dep))
                .cloned()
                .collect();
            for name in external {
                graph.entry(name).or_default();
            }
        }

        validate_dependency_graph(&graph).map_err(|e| ContainerError::DependencyValidationFailed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigValue, MapPropertySource};
    use crate::inject::Autowired;
    use crate::reflect::{value, Interface, Method, NoSuchMethodError, Reflective, Value};
    use crate::scope::SimpleMapScope;
    use std::sync::atomic::AtomicUsize;

    /// 测试用的可注入对象
    struct Node {
        descriptor: Arc<TypeDescriptor>,
        peer: Autowired,
        label: Autowired<ConfigValue>,
        initialized: AtomicBool,
        destroyed: Option<Arc<parking_lot::Mutex<Vec<String>>>>,
        name: String,
    }

    impl Node {
        fn new(name: &str) -> Self {
            Self::with_interface(name, "Node")
        }

        fn with_interface(name: &str, interface: &str) -> Self {
            let descriptor = TypeDescriptor::builder::<Node>("Node")
                .interface(Interface::new(interface).method("peer_name", &[]))
                .method("init", &[])
                .method("close", &[])
                .property_of_type("peer", "Peer")
                .property("label")
                .build();
            Self {
                descriptor,
                peer: Autowired::new(),
                label: Autowired::new(),
                initialized: AtomicBool::new(false),
                destroyed: None,
                name: name.to_string(),
            }
        }
    }

    impl Reflective for Node {
        fn type_descriptor(&self) -> Arc<TypeDescriptor> {
            Arc::clone(&self.descriptor)
        }

        fn invoke(&self, method: &Method, _args: &crate::Args) -> anyhow::Result<Value> {
            match method.name() {
                "init" => {
                    self.initialized.store(true, Ordering::SeqCst);
                    Ok(value(()))
                }
                "close" => {
                    if let Some(log) = &self.destroyed {
                        log.lock().push(self.name.clone());
                    }
                    Ok(value(()))
                }
                "peer_name" => Ok(value(self.peer.require("peer")?.type_name().to_string())),
                _ => Err(NoSuchMethodError::new("Node", method).into()),
            }
        }

        fn set_property(&self, name: &str, value: InjectionValue) -> anyhow::Result<()> {
            match name {
                "peer" => self.peer.inject_value(name, value),
                "label" => self.label.inject_value(name, value),
                _ => anyhow::bail!("Unknown property '{}'", name),
            }
        }
    }

    fn node_definition(name: &str) -> BeanDefinition {
        let bean_name = name.to_string();
        BeanDefinition::reflective(name, move |_| Ok(Node::new(&bean_name)))
    }

    fn node(factory: &DefaultListableBeanFactory, name: &str) -> Arc<Node> {
        factory.get_bean_typed::<Node>(name).unwrap()
    }

    /// 把 Bean 包装为另一个对象的后置处理器
    struct WrappingPostProcessor {
        wrap_early: bool,
    }

    struct Wrapper(#[allow(dead_code)] ObjectRef);

    impl BeanPostProcessor for WrappingPostProcessor {
        fn get_early_bean_reference(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
            if self.wrap_early {
                Ok(ObjectRef::new(Arc::new(Wrapper(bean))))
            } else {
                Ok(bean)
            }
        }

        fn post_process_after_initialization(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
            Ok(ObjectRef::new(Arc::new(Wrapper(bean))))
        }
    }

    #[test]
    fn test_singleton_identity() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(node_definition("a")).unwrap();

        let first = factory.get_bean("a").unwrap();
        let second = factory.get_bean("a").unwrap();
        assert!(first.ptr_eq(&second));
        assert!(factory.is_singleton("a").unwrap());
    }

    #[test]
    fn test_prototype_creates_new_instances() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(node_definition("a").with_scope(Scope::Prototype))
            .unwrap();

        let first = factory.get_bean("a").unwrap();
        let second = factory.get_bean("a").unwrap();
        assert!(!first.ptr_eq(&second));
        assert!(factory.is_prototype("a").unwrap());
    }

    #[test]
    fn test_singleton_field_cycle_resolved() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(node_definition("a").with_property("peer", PropertyValue::reference("b")))
            .unwrap();
        factory
            .register_bean_definition(node_definition("b").with_property("peer", PropertyValue::reference("a")))
            .unwrap();

        let a = factory.get_bean("a").unwrap();
        let b = factory.get_bean("b").unwrap();
        let a_node = node(&factory, "a");
        let b_node = node(&factory, "b");

        assert!(b_node.peer.get().unwrap().ptr_eq(&a));
        assert!(a_node.peer.get().unwrap().ptr_eq(&b));
        assert_eq!(factory.singleton_registry().dependent_beans("a"), vec!["b".to_string()]);
    }

    #[test]
    fn test_prototype_cycle_fails_fast() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                node_definition("a")
                    .with_scope(Scope::Prototype)
                    .with_property("peer", PropertyValue::reference("b")),
            )
            .unwrap();
        factory
            .register_bean_definition(
                node_definition("b")
                    .with_scope(Scope::Prototype)
                    .with_property("peer", PropertyValue::reference("a")),
            )
            .unwrap();

        let err = factory.get_bean("a").unwrap_err();
        assert!(matches!(err, ContainerError::CurrentlyInCreation { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_constructor_cycle_fails() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(BeanDefinition::reflective("a", |r| {
                r.get("b")?;
                Ok(Node::new("a"))
            }))
            .unwrap();
        factory
            .register_bean_definition(BeanDefinition::reflective("b", |r| {
                r.get("a")?;
                Ok(Node::new("b"))
            }))
            .unwrap();

        let err = factory.get_bean("a").unwrap_err();
        assert!(err.is_currently_in_creation());
        // 失败后没有残留
        assert!(!factory.is_currently_in_creation("a"));
        assert!(!factory.singleton_registry().contains_singleton("b"));
    }

    #[test]
    fn test_circular_references_disabled() {
        let factory = DefaultListableBeanFactory::new().with_settings(ContainerSettings {
            allow_circular_references: false,
            ..ContainerSettings::default()
        });
        factory
            .register_bean_definition(node_definition("a").with_property("peer", PropertyValue::reference("b")))
            .unwrap();
        factory
            .register_bean_definition(node_definition("b").with_property("peer", PropertyValue::reference("a")))
            .unwrap();

        assert!(factory.get_bean("a").unwrap_err().is_currently_in_creation());
    }

    #[test]
    fn test_depends_on_cycle_detected() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(node_definition("a").depends_on("b")).unwrap();
        factory.register_bean_definition(node_definition("b").depends_on("c")).unwrap();
        factory.register_bean_definition(node_definition("c").depends_on("a")).unwrap();

        match factory.get_bean("a").unwrap_err() {
            ContainerError::CircularDependency { name, chain } => {
                assert_eq!(name, "c");
                assert_eq!(chain, vec!["c", "a", "b", "c"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(factory.validate_dependencies().is_err());
    }

    #[test]
    fn test_depends_on_creates_dependencies_first() {
        let factory = DefaultListableBeanFactory::new();
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for (name, deps) in [("app", vec!["db", "cache"]), ("db", vec![]), ("cache", vec!["db"])] {
            let order = Arc::clone(&order);
            let bean_name = name.to_string();
            factory
                .register_bean_definition(
                    BeanDefinition::of(name, move |_| {
                        order.lock().push(bean_name.clone());
                        Ok(bean_name.clone())
                    })
                    .with_dependencies(deps.into_iter().map(String::from).collect()),
                )
                .unwrap();
        }

        factory.validate_dependencies().unwrap();
        factory.get_bean("app").unwrap();
        assert_eq!(*order.lock(), vec!["db", "cache", "app"]);
    }

    #[test]
    fn test_validate_missing_dependency() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(node_definition("a").depends_on("ghost")).unwrap();
        assert!(matches!(
            factory.validate_dependencies(),
            Err(ContainerError::DependencyValidationFailed(_))
        ));
    }

    #[test]
    fn test_missing_definition() {
        let factory = DefaultListableBeanFactory::new();
        assert!(matches!(
            factory.get_bean("ghost"),
            Err(ContainerError::BeanDefinitionNotFound(ref name)) if name == "ghost"
        ));
    }

    #[test]
    fn test_custom_scope() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(node_definition("cart").with_scope("request"))
            .unwrap();

        assert!(matches!(
            factory.get_bean("cart"),
            Err(ContainerError::ScopeNotActive(ref scope)) if scope == "request"
        ));

        let scope = Arc::new(SimpleMapScope::new("request"));
        factory.register_scope("request", scope.clone());
        assert!(matches!(factory.get_bean("cart"), Err(ContainerError::ScopeNotActive(_))));

        scope.activate();
        let first = factory.get_bean("cart").unwrap();
        let second = factory.get_bean("cart").unwrap();
        assert!(first.ptr_eq(&second));

        scope.deactivate();
        scope.activate();
        assert!(!factory.get_bean("cart").unwrap().ptr_eq(&first));
    }

    #[test]
    fn test_failure_cleanup_allows_retry() {
        let factory = DefaultListableBeanFactory::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        factory
            .register_bean_definition(BeanDefinition::of("flaky", move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    anyhow::bail!("connection refused");
                }
                Ok(42u32)
            }))
            .unwrap();

        let err = factory.get_bean("flaky").unwrap_err();
        match &err {
            ContainerError::CreationFailure { name, source, .. } => {
                assert_eq!(name, "flaky");
                assert_eq!(source.to_string(), "connection refused");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!factory.is_currently_in_creation("flaky"));

        let value = factory.get_bean_typed::<u32>("flaky").unwrap();
        assert_eq!(*value, 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_properties_and_placeholders() {
        let environment = Arc::new(Environment::new());
        environment.add_property_source(Box::new(MapPropertySource::new("test").with_property("app.label", "primary")));
        let factory = DefaultListableBeanFactory::new().with_environment(environment);

        factory
            .register_bean_definition(node_definition("a").with_property("label", PropertyValue::placeholder("${app.label}")))
            .unwrap();
        factory
            .register_bean_definition(
                node_definition("b").with_property("label", PropertyValue::placeholder("${app.missing:fallback}")),
            )
            .unwrap();
        factory
            .register_bean_definition(node_definition("c").with_property("label", PropertyValue::placeholder("${app.missing}")))
            .unwrap();

        assert_eq!(node(&factory, "a").label.get(), Some(&ConfigValue::String("primary".into())));
        assert_eq!(node(&factory, "b").label.get(), Some(&ConfigValue::String("fallback".into())));
        assert!(factory.get_bean("c").is_err());
    }

    #[test]
    fn test_parent_definition_merge() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(
                BeanDefinition::template("base")
                    .with_scope(Scope::Prototype)
                    .with_property("label", PropertyValue::literal("inherited")),
            )
            .unwrap();
        factory
            .register_bean_definition(node_definition("child").with_parent("base"))
            .unwrap();

        assert!(matches!(factory.get_bean("base"), Err(ContainerError::BeanIsAbstract(_))));
        assert!(factory.is_prototype("child").unwrap());
        assert_eq!(
            node(&factory, "child").label.get(),
            Some(&ConfigValue::String("inherited".into()))
        );
    }

    #[test]
    fn test_autowire_by_type_with_primary() {
        let factory = DefaultListableBeanFactory::new();
        let peer_type = |name: &str| {
            let descriptor = Node::with_interface(name, "Peer").type_descriptor();
            node_definition(name).with_type(descriptor)
        };
        factory.register_bean_definition(peer_type("p1")).unwrap();
        factory.register_bean_definition(peer_type("p2")).unwrap();
        factory
            .register_bean_definition(node_definition("consumer").with_autowire(AutowireMode::ByType))
            .unwrap();

        match factory.get_bean("consumer").unwrap_err() {
            ContainerError::CreationFailure { source, .. } => {
                let inner = source.downcast_ref::<ContainerError>();
                assert!(matches!(inner, Some(ContainerError::NoUniqueBean { candidates, .. }) if candidates.len() == 2));
            }
            other => panic!("unexpected error: {other}"),
        }

        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(peer_type("p1")).unwrap();
        factory.register_bean_definition(peer_type("p2").with_primary(true)).unwrap();
        factory
            .register_bean_definition(node_definition("consumer").with_autowire(AutowireMode::ByType))
            .unwrap();

        let p2 = factory.get_bean("p2").unwrap();
        assert!(node(&factory, "consumer").peer.get().unwrap().ptr_eq(&p2));
    }

    #[test]
    fn test_autowire_by_name() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(node_definition("peer")).unwrap();
        factory
            .register_bean_definition(node_definition("consumer").with_autowire(AutowireMode::ByName))
            .unwrap();

        let peer = factory.get_bean("peer").unwrap();
        let consumer = node(&factory, "consumer");
        assert!(consumer.peer.get().unwrap().ptr_eq(&peer));
        assert!(consumer.label.get().is_none());
    }

    #[test]
    fn test_init_and_destroy_methods() {
        let factory = DefaultListableBeanFactory::new();
        let log = Arc::new(parking_lot::Mutex::new(Vec::new()));
        for name in ["repository", "service"] {
            let log = Arc::clone(&log);
            let bean_name = name.to_string();
            let mut definition = BeanDefinition::reflective(name, move |_| {
                let mut node = Node::new(&bean_name);
                node.destroyed = Some(Arc::clone(&log));
                Ok(node)
            })
            .with_init_method("init")
            .with_destroy_method("close");
            if name == "service" {
                definition = definition.with_property("peer", PropertyValue::reference("repository"));
            }
            factory.register_bean_definition(definition).unwrap();
        }

        factory.preinstantiate_singletons().unwrap();
        assert!(node(&factory, "repository").initialized.load(Ordering::SeqCst));

        factory.destroy_singletons();
        assert_eq!(*log.lock(), vec!["service", "repository"]);
    }

    #[test]
    fn test_init_method_failure() {
        let factory = DefaultListableBeanFactory::new();
        factory
            .register_bean_definition(node_definition("a").with_init_method("missing"))
            .unwrap();
        let err = factory.get_bean("a").unwrap_err();
        assert!(err.to_string().contains("Invocation of init method 'missing' failed"));
    }

    #[test]
    fn test_wrapped_after_early_exposure_fails() {
        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(WrappingPostProcessor { wrap_early: false }));
        factory
            .register_bean_definition(node_definition("a").with_property("peer", PropertyValue::reference("b")))
            .unwrap();
        factory
            .register_bean_definition(node_definition("b").with_property("peer", PropertyValue::reference("a")))
            .unwrap();

        let err = factory.get_bean("a").unwrap_err();
        assert!(matches!(err, ContainerError::CurrentlyInCreation { ref name, .. } if name == "a"));
        assert!(!factory.singleton_registry().contains_singleton("b"));
    }

    #[test]
    fn test_raw_injection_allowed_when_configured() {
        let factory = DefaultListableBeanFactory::new().with_settings(ContainerSettings {
            allow_raw_injection_despite_wrapping: true,
            ..ContainerSettings::default()
        });
        factory.add_bean_post_processor(Arc::new(WrappingPostProcessor { wrap_early: false }));
        factory
            .register_bean_definition(node_definition("a").with_property("peer", PropertyValue::reference("b")))
            .unwrap();
        factory
            .register_bean_definition(node_definition("b").with_property("peer", PropertyValue::reference("a")))
            .unwrap();

        let a = factory.get_bean("a").unwrap();
        assert!(a.is::<Wrapper>());
    }

    #[test]
    fn test_early_reference_becomes_final_object() {
        struct EarlyOnly;
        impl BeanPostProcessor for EarlyOnly {
            fn get_early_bean_reference(&self, bean: ObjectRef, _bean_name: &str) -> ContainerResult<ObjectRef> {
                Ok(ObjectRef::new(Arc::new(Wrapper(bean))))
            }
        }

        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(EarlyOnly));
        factory
            .register_bean_definition(node_definition("a").with_property("peer", PropertyValue::reference("b")))
            .unwrap();
        factory
            .register_bean_definition(node_definition("b").with_property("peer", PropertyValue::reference("a")))
            .unwrap();

        let a = factory.get_bean("a").unwrap();
        assert!(a.is::<Wrapper>());
        let b = factory.get_bean("b").unwrap();
        assert!(b.is::<Node>());
        let b_node = b.downcast::<Node>().unwrap();
        assert!(b_node.peer.get().unwrap().ptr_eq(&a));
    }

    #[test]
    fn test_before_instantiation_short_circuit() {
        struct Supplier;
        impl BeanPostProcessor for Supplier {
            fn post_process_before_instantiation(
                &self,
                _definition: &BeanDefinition,
                bean_name: &str,
            ) -> ContainerResult<Option<ObjectRef>> {
                Ok((bean_name == "supplied").then(|| ObjectRef::new(Arc::new(7u64))))
            }
        }

        let factory = DefaultListableBeanFactory::new();
        factory.add_bean_post_processor(Arc::new(Supplier));
        factory
            .register_bean_definition(BeanDefinition::of("supplied", |_| -> anyhow::Result<u64> {
                anyhow::bail!("should not be instantiated")
            }))
            .unwrap();

        assert_eq!(*factory.get_bean_typed::<u64>("supplied").unwrap(), 7);
    }

    #[test]
    fn test_registration_rules() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(node_definition("a")).unwrap();
        assert!(matches!(
            factory.register_bean_definition(node_definition("a")),
            Err(ContainerError::BeanAlreadyExists(_))
        ));

        factory.register_singleton("manual", ObjectRef::new(Arc::new(1u8))).unwrap();
        assert!(factory.contains_bean("manual"));
        assert_eq!(factory.get_bean_names_for_type(TypeId::of::<u8>()), vec!["manual".to_string()]);

        factory.freeze_configuration();
        assert!(matches!(
            factory.register_bean_definition(node_definition("b")),
            Err(ContainerError::ConfigurationFrozen)
        ));
        assert!(matches!(factory.remove_bean_definition("a"), Err(ContainerError::ConfigurationFrozen)));
    }

    #[test]
    fn test_definition_overriding() {
        let factory = DefaultListableBeanFactory::new().with_settings(ContainerSettings {
            allow_definition_overriding: true,
            ..ContainerSettings::default()
        });
        factory.register_bean_definition(BeanDefinition::of("value", |_| Ok(1u32))).unwrap();
        assert_eq!(*factory.get_bean_typed::<u32>("value").unwrap(), 1);

        factory.register_bean_definition(BeanDefinition::of("value", |_| Ok(2u32))).unwrap();
        assert_eq!(*factory.get_bean_typed::<u32>("value").unwrap(), 2);
        assert_eq!(factory.get_bean_names(), vec!["value".to_string()]);
    }

    #[test]
    fn test_parent_factory_lookup() {
        let parent = Arc::new(DefaultListableBeanFactory::new());
        parent.register_bean_definition(BeanDefinition::of("shared", |_| Ok(5u32))).unwrap();

        let child = DefaultListableBeanFactory::new().with_parent(parent.clone());
        assert!(child.contains_bean("shared"));
        assert!(child.get_bean("shared").unwrap().ptr_eq(&parent.get_bean("shared").unwrap()));
    }

    #[test]
    fn test_get_bean_by_type() {
        let factory = DefaultListableBeanFactory::new();
        factory.register_bean_definition(BeanDefinition::of("port", |_| Ok(8080u16))).unwrap();
        assert_eq!(*factory.get_bean_by_type::<u16>().unwrap(), 8080);
        assert!(factory.get_bean_by_type::<u32>().is_err());
        assert!(matches!(
            factory.get_bean_typed::<u32>("port"),
            Err(ContainerError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_concurrent_singleton_access() {
        let factory = DefaultListableBeanFactory::new();
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        factory
            .register_bean_definition(BeanDefinition::of("slow", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(std::time::Duration::from_millis(5));
                Ok(String::from("ready"))
            }))
            .unwrap();

        let factory = &factory;
        let beans: Vec<ObjectRef> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(move || factory.get_bean("slow").unwrap()))
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(beans.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }
}
