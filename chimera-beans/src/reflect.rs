//! 反射契约
//!
//! Rust 没有运行时反射，容器和拦截器需要的"按方法名调用"能力由这里显式描述：
//! - [`TypeDescriptor`] 描述一个受管类型实现了哪些接口、有哪些方法和可写属性
//! - [`Reflective`] 是按 [`Method`] 动态分派的调用入口
//! - [`ObjectRef`] 是容器持有的对象句柄，同一块分配同时提供 `Any` 和 `Reflective` 两种视图

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use crate::config::ConfigValue;
use crate::utils::naming::short_type_name;

/// 动态类型的参数或返回值
pub type Value = Arc<dyn Any + Send + Sync>;

/// 把任意值包装为 [`Value`]
pub fn value<T: Any + Send + Sync>(v: T) -> Value {
    Arc::new(v)
}

/// 方法标识
///
/// 由声明它的契约（接口名或类型名）、方法名和参数类型名组成，可作为缓存键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Method {
    owner: Arc<str>,
    name: Arc<str>,
    params: Arc<[Arc<str>]>,
}

impl Method {
    pub fn new(owner: &str, name: &str, params: &[&str]) -> Self {
        Self {
            owner: Arc::from(owner),
            name: Arc::from(name),
            params: params.iter().map(|p| Arc::from(*p)).collect(),
        }
    }

    /// 声明该方法的契约名称
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn param_types(&self) -> impl Iterator<Item = &str> {
        self.params.iter().map(|p| p.as_ref())
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    /// 完整签名，例如 `UserService::find_user(u64)`
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self.param_types().collect();
        format!("{}::{}({})", self.owner, self.name, params.join(", "))
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// 接口契约：名称 + 有序的方法列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    name: String,
    methods: Vec<Method>,
}

impl Interface {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
        }
    }

    /// 声明一个方法
    pub fn method(mut self, name: &str, params: &[&str]) -> Self {
        self.methods.push(Method::new(&self.name, name, params));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    pub fn declares(&self, method: &Method) -> bool {
        self.methods.contains(method)
    }

    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods.iter().find(|m| m.name() == name)
    }
}

/// 类型角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// 普通应用对象
    #[default]
    Application,
    /// 框架基础设施（通知、切面、Advisor 等），不会被自动代理
    Infrastructure,
}

/// 可写属性
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyDescriptor {
    name: String,
    required_type: Option<String>,
}

impl PropertyDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 按类型自动装配时要求的类型名称
    pub fn required_type(&self) -> Option<&str> {
        self.required_type.as_deref()
    }
}

/// 受管类型的描述
#[derive(Debug)]
pub struct TypeDescriptor {
    name: String,
    type_id: TypeId,
    rust_type_name: &'static str,
    role: Role,
    interfaces: Vec<Arc<Interface>>,
    methods: Vec<Method>,
    properties: Vec<PropertyDescriptor>,
}

impl TypeDescriptor {
    /// 以给定的逻辑名称开始构建 `T` 的描述
    pub fn builder<T: Any>(name: impl Into<String>) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                name: name.into(),
                type_id: TypeId::of::<T>(),
                rust_type_name: std::any::type_name::<T>(),
                role: Role::Application,
                interfaces: Vec::new(),
                methods: Vec::new(),
                properties: Vec::new(),
            },
        }
    }

    /// 没有任何方法、接口和属性的描述，用于普通（非反射）对象
    pub fn plain<T: Any>() -> Arc<Self> {
        Self::builder::<T>(short_type_name(std::any::type_name::<T>())).build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn rust_type_name(&self) -> &'static str {
        self.rust_type_name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_infrastructure(&self) -> bool {
        self.role == Role::Infrastructure
    }

    pub fn interfaces(&self) -> &[Arc<Interface>] {
        &self.interfaces
    }

    pub fn has_interfaces(&self) -> bool {
        !self.interfaces.is_empty()
    }

    /// 类型自身声明的方法（不含接口方法）
    pub fn own_methods(&self) -> &[Method] {
        &self.methods
    }

    /// 所有可调用的方法：先接口方法，再类型自身的方法
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.interfaces
            .iter()
            .flat_map(|i| i.methods().iter())
            .chain(self.methods.iter())
    }

    pub fn find_method(&self, name: &str) -> Option<&Method> {
        self.methods().find(|m| m.name() == name)
    }

    pub fn declares_method(&self, method: &Method) -> bool {
        self.methods().any(|m| m == method)
    }

    pub fn implements(&self, interface: &str) -> bool {
        self.interfaces.iter().any(|i| i.name() == interface)
    }

    /// 类型名、完整 Rust 类型名或任一接口名与 `type_name` 相同
    pub fn is_assignable_to(&self, type_name: &str) -> bool {
        self.name == type_name || self.rust_type_name == type_name || self.implements(type_name)
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn find_property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }
}

/// [`TypeDescriptor`] 构建器
pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    pub fn role(mut self, role: Role) -> Self {
        self.descriptor.role = role;
        self
    }

    pub fn infrastructure(self) -> Self {
        self.role(Role::Infrastructure)
    }

    pub fn interface(mut self, interface: impl Into<Arc<Interface>>) -> Self {
        self.descriptor.interfaces.push(interface.into());
        self
    }

    /// 声明类型自身的方法（不属于任何接口）
    pub fn method(mut self, name: &str, params: &[&str]) -> Self {
        let method = Method::new(&self.descriptor.name, name, params);
        self.descriptor.methods.push(method);
        self
    }

    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.into(),
            required_type: None,
        });
        self
    }

    pub fn property_of_type(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.descriptor.properties.push(PropertyDescriptor {
            name: name.into(),
            required_type: Some(type_name.into()),
        });
        self
    }

    pub fn build(self) -> Arc<TypeDescriptor> {
        Arc::new(self.descriptor)
    }
}

/// 调用参数列表
#[derive(Clone, Default)]
pub struct Args(Vec<Value>);

impl Args {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn from_values(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn push<T: Any + Send + Sync>(&mut self, arg: T) {
        self.0.push(Arc::new(arg));
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按位置取出指定类型的参数
    pub fn get<T: Any>(&self, index: usize) -> anyhow::Result<&T> {
        let value = self
            .0
            .get(index)
            .ok_or_else(|| anyhow::anyhow!("Missing argument at position {}", index))?;
        value.downcast_ref::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "Argument at position {} is not of type '{}'",
                index,
                std::any::type_name::<T>()
            )
        })
    }

    pub fn value(&self, index: usize) -> Option<&Value> {
        self.0.get(index)
    }

    /// 替换指定位置的参数（拦截器可在 proceed 之前改写参数）
    pub fn set<T: Any + Send + Sync>(&mut self, index: usize, arg: T) -> anyhow::Result<()> {
        let slot = self
            .0
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("Missing argument at position {}", index))?;
        *slot = Arc::new(arg);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Value> {
        self.0.iter()
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("len", &self.0.len()).finish()
    }
}

/// 构建 [`Args`]
///
/// ```ignore
/// let args = args![42u64, "alice".to_string()];
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::Args::new()
    };
    ($($arg:expr),+ $(,)?) => {{
        let mut args = $crate::Args::new();
        $(args.push($arg);)+
        args
    }};
}

/// 方法不存在
#[derive(Debug, thiserror::Error)]
#[error("No such method '{method}' on type '{type_name}'")]
pub struct NoSuchMethodError {
    pub type_name: String,
    pub method: String,
}

impl NoSuchMethodError {
    pub fn new(type_name: impl Into<String>, method: &Method) -> Self {
        Self {
            type_name: type_name.into(),
            method: method.signature(),
        }
    }
}

/// 注入到属性中的值
#[derive(Debug, Clone)]
pub enum InjectionValue {
    /// 另一个受管对象
    Bean(ObjectRef),
    /// 配置值
    Config(ConfigValue),
}

impl InjectionValue {
    pub fn as_bean(&self) -> Option<&ObjectRef> {
        match self {
            InjectionValue::Bean(bean) => Some(bean),
            InjectionValue::Config(_) => None,
        }
    }

    pub fn as_config(&self) -> Option<&ConfigValue> {
        match self {
            InjectionValue::Config(value) => Some(value),
            InjectionValue::Bean(_) => None,
        }
    }
}

/// 支持按方法动态分派的对象
///
/// 代理和拦截链只能作用于实现了此 trait 的对象。
pub trait Reflective: Any + Send + Sync {
    /// 对象的类型描述
    fn type_descriptor(&self) -> Arc<TypeDescriptor>;

    /// 调用方法
    fn invoke(&self, method: &Method, args: &Args) -> anyhow::Result<Value>;

    /// 设置属性（依赖注入、属性赋值）
    ///
    /// 对象可能已经以早期引用的形式被其他对象持有，因此实现需要使用内部可变性，
    /// 参见 [`crate::Autowired`]。
    fn set_property(&self, name: &str, _value: InjectionValue) -> anyhow::Result<()> {
        anyhow::bail!(
            "Property '{}' is not writable on type '{}'",
            name,
            self.type_descriptor().name()
        )
    }
}

/// 容器持有的对象句柄
///
/// 对象的身份是其分配地址，见 [`ObjectRef::ptr_eq`]。
#[derive(Clone)]
pub struct ObjectRef {
    value: Arc<dyn Any + Send + Sync>,
    reflective: Option<Arc<dyn Reflective>>,
    type_name: &'static str,
}

impl ObjectRef {
    /// 包装普通对象（不支持动态调用，也不会被代理）
    pub fn new<T: Any + Send + Sync>(object: Arc<T>) -> Self {
        Self {
            value: object,
            reflective: None,
            type_name: std::any::type_name::<T>(),
        }
    }

    /// 包装支持动态调用的对象
    pub fn reflective<T: Reflective>(object: Arc<T>) -> Self {
        let reflective: Arc<dyn Reflective> = object.clone();
        Self {
            value: object,
            reflective: Some(reflective),
            type_name: std::any::type_name::<T>(),
        }
    }

    pub fn value(&self) -> &Arc<dyn Any + Send + Sync> {
        &self.value
    }

    pub fn as_reflective(&self) -> Option<&Arc<dyn Reflective>> {
        self.reflective.as_ref()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    pub fn downcast<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.value.clone().downcast::<T>().ok()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// 具体类型的 `TypeId`
    pub fn value_type_id(&self) -> TypeId {
        (*self.value).type_id()
    }

    /// 具体 Rust 类型名
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn type_descriptor(&self) -> Option<Arc<TypeDescriptor>> {
        self.reflective.as_ref().map(|r| r.type_descriptor())
    }

    /// 是否为同一个对象
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Arc::as_ptr(&self.value) as *const () == Arc::as_ptr(&other.value) as *const ()
    }

    /// 通过反射视图调用方法
    pub fn invoke(&self, method: &Method, args: &Args) -> anyhow::Result<Value> {
        match &self.reflective {
            Some(reflective) => reflective.invoke(method, args),
            None => Err(NoSuchMethodError::new(self.type_name, method).into()),
        }
    }

    /// 按方法名调用（取类型描述中第一个同名方法）
    pub fn invoke_by_name(&self, method_name: &str, args: &Args) -> anyhow::Result<Value> {
        let descriptor = self
            .type_descriptor()
            .ok_or_else(|| anyhow::anyhow!("Type '{}' does not support method invocation", self.type_name))?;
        let method = descriptor
            .find_method(method_name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("No such method '{}' on type '{}'", method_name, descriptor.name()))?;
        self.invoke(&method, args)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type_name", &self.type_name)
            .field("reflective", &self.reflective.is_some())
            .finish()
    }
}
