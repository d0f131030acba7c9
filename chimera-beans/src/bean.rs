//! Bean 定义 - 描述如何创建和管理 Bean

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigValue;
use crate::creation::BeanResolver;
use crate::reflect::{ObjectRef, Reflective, TypeDescriptor};
use crate::Scope;

/// 实例化函数，构造函数注入通过 [`BeanResolver`] 完成
pub type Instantiator =
    Arc<dyn Fn(&mut BeanResolver<'_>) -> anyhow::Result<ObjectRef> + Send + Sync>;

/// 生命周期回调类型
pub type LifecycleCallback = Arc<dyn Fn(&ObjectRef) -> anyhow::Result<()> + Send + Sync>;

static DEFAULT_SCOPE: Scope = Scope::Singleton;

/// 自动装配模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AutowireMode {
    /// 只注入显式配置的属性
    #[default]
    No,
    /// 按属性名查找同名 bean
    ByName,
    /// 按属性声明的类型查找唯一 bean
    ByType,
}

/// 属性值
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    /// 引用另一个 bean
    Ref(String),
    /// 字面量
    Value(ConfigValue),
    /// `${key:default}` 占位符，创建时从 Environment 解析
    Placeholder(String),
}

impl PropertyValue {
    pub fn reference(name: impl Into<String>) -> Self {
        PropertyValue::Ref(name.into())
    }

    pub fn literal(value: impl Into<ConfigValue>) -> Self {
        PropertyValue::Value(value.into())
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        PropertyValue::Placeholder(text.into())
    }
}

/// Bean 定义
///
/// 标量设置使用 `Option` 保存，用于区分"未设置"和"显式设置为默认值"，
/// 子定义与父定义合并时只覆盖显式设置的部分。
#[derive(Clone)]
pub struct BeanDefinition {
    name: String,
    parent: Option<String>,
    type_id: Option<TypeId>,
    type_name: Option<&'static str>,
    descriptor: Option<Arc<TypeDescriptor>>,
    instantiator: Option<Instantiator>,
    scope: Option<Scope>,
    lazy: Option<bool>,
    primary: Option<bool>,
    autowire: Option<AutowireMode>,
    init_method: Option<String>,
    destroy_method: Option<String>,
    init_callback: Option<LifecycleCallback>,
    destroy_callback: Option<LifecycleCallback>,
    depends_on: Vec<String>,
    properties: Vec<(String, PropertyValue)>,
}

impl BeanDefinition {
    fn empty(name: String) -> Self {
        Self {
            name,
            parent: None,
            type_id: None,
            type_name: None,
            descriptor: None,
            instantiator: None,
            scope: None,
            lazy: None,
            primary: None,
            autowire: None,
            init_method: None,
            destroy_method: None,
            init_callback: None,
            destroy_callback: None,
            depends_on: Vec::new(),
            properties: Vec::new(),
        }
    }

    /// 使用任意实例化函数创建 Bean 定义
    pub fn new<F>(name: impl Into<String>, instantiator: F) -> Self
    where
        F: Fn(&mut BeanResolver<'_>) -> anyhow::Result<ObjectRef> + Send + Sync + 'static,
    {
        let mut definition = Self::empty(name.into());
        definition.instantiator = Some(Arc::new(instantiator));
        definition
    }

    /// 普通对象：可以注入和缓存，但不支持动态调用，也不会被代理
    pub fn of<T, F>(name: impl Into<String>, constructor: F) -> Self
    where
        T: Any + Send + Sync,
        F: Fn(&mut BeanResolver<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let mut definition =
            Self::new(name, move |resolver| Ok(ObjectRef::new(Arc::new(constructor(resolver)?))));
        definition.type_id = Some(TypeId::of::<T>());
        definition.type_name = Some(std::any::type_name::<T>());
        definition.descriptor = Some(TypeDescriptor::plain::<T>());
        definition
    }

    /// 支持动态调用的对象，可以被属性注入和代理
    pub fn reflective<T, F>(name: impl Into<String>, constructor: F) -> Self
    where
        T: Reflective,
        F: Fn(&mut BeanResolver<'_>) -> anyhow::Result<T> + Send + Sync + 'static,
    {
        let mut definition = Self::new(name, move |resolver| {
            Ok(ObjectRef::reflective(Arc::new(constructor(resolver)?)))
        });
        definition.type_id = Some(TypeId::of::<T>());
        definition.type_name = Some(std::any::type_name::<T>());
        definition
    }

    /// 没有实例化函数的模板定义，只能作为父定义使用
    pub fn template(name: impl Into<String>) -> Self {
        Self::empty(name.into())
    }

    /// 声明父定义
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// 声明类型描述（用于按类型查找和代理判定）
    pub fn with_type(mut self, descriptor: Arc<TypeDescriptor>) -> Self {
        self.descriptor = Some(descriptor);
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: impl Into<Scope>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    /// 设置延迟初始化
    pub fn with_lazy(mut self, lazy: bool) -> Self {
        self.lazy = Some(lazy);
        self
    }

    /// 按类型装配出现多个候选时优先选择此 bean
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = Some(primary);
        self
    }

    pub fn with_autowire(mut self, mode: AutowireMode) -> Self {
        self.autowire = Some(mode);
        self
    }

    /// 添加显式依赖
    pub fn depends_on(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(name.into());
        self
    }

    /// 设置依赖列表
    pub fn with_dependencies(mut self, dependencies: Vec<String>) -> Self {
        self.depends_on = dependencies;
        self
    }

    /// 设置属性值，同名属性后者覆盖前者
    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        let name = name.into();
        match self.properties.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name, value)),
        }
        self
    }

    /// 按名称调用的初始化方法
    pub fn with_init_method(mut self, method: impl Into<String>) -> Self {
        self.init_method = Some(method.into());
        self
    }

    /// 按名称调用的销毁方法
    pub fn with_destroy_method(mut self, method: impl Into<String>) -> Self {
        self.destroy_method = Some(method.into());
        self
    }

    /// 设置初始化回调
    pub fn with_init<F>(mut self, init_fn: F) -> Self
    where
        F: Fn(&ObjectRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init_callback = Some(Arc::new(init_fn));
        self
    }

    /// 设置销毁回调
    pub fn with_destroy<F>(mut self, destroy_fn: F) -> Self
    where
        F: Fn(&ObjectRef) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.destroy_callback = Some(Arc::new(destroy_fn));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    pub fn scope(&self) -> &Scope {
        self.scope.as_ref().unwrap_or(&DEFAULT_SCOPE)
    }

    pub fn is_singleton(&self) -> bool {
        self.scope().is_singleton()
    }

    pub fn is_prototype(&self) -> bool {
        self.scope().is_prototype()
    }

    pub fn is_lazy(&self) -> bool {
        self.lazy.unwrap_or(false)
    }

    pub fn is_primary(&self) -> bool {
        self.primary.unwrap_or(false)
    }

    /// 没有实例化函数的定义不能被实例化
    pub fn is_abstract(&self) -> bool {
        self.instantiator.is_none()
    }

    pub fn autowire_mode(&self) -> AutowireMode {
        self.autowire.unwrap_or_default()
    }

    pub fn dependencies(&self) -> &[String] {
        &self.depends_on
    }

    pub fn properties(&self) -> &[(String, PropertyValue)] {
        &self.properties
    }

    pub fn init_method_name(&self) -> Option<&str> {
        self.init_method.as_deref()
    }

    pub fn destroy_method_name(&self) -> Option<&str> {
        self.destroy_method.as_deref()
    }

    pub(crate) fn instantiator(&self) -> Option<&Instantiator> {
        self.instantiator.as_ref()
    }

    pub(crate) fn init_callback(&self) -> Option<&LifecycleCallback> {
        self.init_callback.as_ref()
    }

    pub(crate) fn destroy_callback(&self) -> Option<&LifecycleCallback> {
        self.destroy_callback.as_ref()
    }

    pub fn has_destroy_hook(&self) -> bool {
        self.destroy_method.is_some() || self.destroy_callback.is_some()
    }

    pub fn type_descriptor(&self) -> Option<&Arc<TypeDescriptor>> {
        self.descriptor.as_ref()
    }

    /// 声明的 Rust 类型
    pub fn bean_type_id(&self) -> Option<TypeId> {
        self.type_id
            .or_else(|| self.descriptor.as_ref().map(|d| d.type_id()))
    }

    pub fn bean_type_name(&self) -> Option<&str> {
        self.descriptor
            .as_ref()
            .map(|d| d.name())
            .or(self.type_name)
    }

    /// 与父定义合并，得到一个独立、完整的定义
    ///
    /// 子定义显式设置的标量覆盖父定义；属性按名称合并；显式依赖按顺序拼接去重。
    pub fn merge_with_parent(&self, parent: &BeanDefinition) -> BeanDefinition {
        let mut merged = parent.clone();
        merged.name = self.name.clone();
        merged.parent = None;

        if self.instantiator.is_some() {
            merged.instantiator = self.instantiator.clone();
            merged.type_id = self.type_id;
            merged.type_name = self.type_name;
        }
        if self.descriptor.is_some() {
            merged.descriptor = self.descriptor.clone();
        }
        if self.scope.is_some() {
            merged.scope = self.scope.clone();
        }
        merged.lazy = self.lazy.or(merged.lazy);
        merged.primary = self.primary.or(merged.primary);
        merged.autowire = self.autowire.or(merged.autowire);
        if self.init_method.is_some() {
            merged.init_method = self.init_method.clone();
        }
        if self.destroy_method.is_some() {
            merged.destroy_method = self.destroy_method.clone();
        }
        if self.init_callback.is_some() {
            merged.init_callback = self.init_callback.clone();
        }
        if self.destroy_callback.is_some() {
            merged.destroy_callback = self.destroy_callback.clone();
        }

        for dependency in &self.depends_on {
            if !merged.depends_on.contains(dependency) {
                merged.depends_on.push(dependency.clone());
            }
        }
        for (name, value) in &self.properties {
            merged = merged.with_property(name.clone(), value.clone());
        }

        merged
    }
}

impl fmt::Debug for BeanDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanDefinition")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("scope", self.scope())
            .field("lazy", &self.is_lazy())
            .field("primary", &self.is_primary())
            .field("abstract", &self.is_abstract())
            .field("dependencies", &self.depends_on)
            .field("properties", &self.properties)
            .field("type_name", &self.bean_type_name())
            .finish()
    }
}
