use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::{ContainerError, ContainerResult};
use crate::reflect::ObjectRef;

/// Bean 的作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum Scope {
    /// 单例模式 - 容器中只有一个实例
    #[default]
    Singleton,

    /// 原型模式 - 每次请求都创建新实例
    Prototype,

    /// 自定义作用域 - 实例的存放交给注册的 [`ScopeProvider`]
    Custom(String),
}

impl Scope {
    pub const SINGLETON: &'static str = "singleton";
    pub const PROTOTYPE: &'static str = "prototype";

    pub fn custom(name: impl Into<String>) -> Self {
        Scope::Custom(name.into())
    }

    pub fn is_singleton(&self) -> bool {
        matches!(self, Scope::Singleton)
    }

    pub fn is_prototype(&self) -> bool {
        matches!(self, Scope::Prototype)
    }

    pub fn name(&self) -> &str {
        match self {
            Scope::Singleton => Self::SINGLETON,
            Scope::Prototype => Self::PROTOTYPE,
            Scope::Custom(name) => name,
        }
    }
}

impl From<&str> for Scope {
    fn from(name: &str) -> Self {
        match name {
            Self::SINGLETON => Scope::Singleton,
            Self::PROTOTYPE => Scope::Prototype,
            other => Scope::Custom(other.to_string()),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 自定义作用域的存储 SPI
///
/// `get` 在作用域内没有实例时调用 `object_factory` 创建。工厂可能递归地请求同一作用域中的
/// 其他 bean，实现不能在调用工厂期间持有自己的锁。
pub trait ScopeProvider: Send + Sync {
    /// 返回作用域内的实例，不存在则创建
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> ContainerResult<ObjectRef>,
    ) -> ContainerResult<ObjectRef>;

    /// 从作用域中移除实例
    fn remove(&self, name: &str) -> Option<ObjectRef>;
}

static NEXT_THREAD_SCOPE_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// 当前线程的实例，按 ThreadScope 实例区分；线程退出时随之释放
    static THREAD_OBJECTS: RefCell<HashMap<u64, HashMap<String, ObjectRef>>> = RefCell::new(HashMap::new());
}

/// 线程作用域：每个 OS 线程各自持有一份实例
///
/// 实例存放在线程局部存储中，线程结束后自动释放
pub struct ThreadScope {
    id: u64,
}

impl ThreadScope {
    pub const NAME: &'static str = "thread";

    pub fn new() -> Self {
        Self {
            id: NEXT_THREAD_SCOPE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// 丢弃当前线程在该作用域中的全部实例，返回释放的数量
    pub fn clear_current_thread(&self) -> usize {
        let dropped = THREAD_OBJECTS.with(|objects| objects.borrow_mut().remove(&self.id));
        let count = dropped.map_or(0, |objects| objects.len());
        tracing::debug!("Thread scope released {} object(s) for current thread", count);
        count
    }

    /// 当前线程在该作用域中的实例数量
    pub fn current_thread_len(&self) -> usize {
        THREAD_OBJECTS.with(|objects| objects.borrow().get(&self.id).map_or(0, HashMap::len))
    }
}

impl Default for ThreadScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ThreadScope {
    fn drop(&mut self) {
        // 线程局部存储可能已在线程退出时销毁
        let _ = THREAD_OBJECTS.try_with(|objects| objects.borrow_mut().remove(&self.id));
    }
}

impl ScopeProvider for ThreadScope {
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> ContainerResult<ObjectRef>,
    ) -> ContainerResult<ObjectRef> {
        let existing = THREAD_OBJECTS.with(|objects| {
            objects.borrow().get(&self.id).and_then(|scoped| scoped.get(name).cloned())
        });
        if let Some(existing) = existing {
            return Ok(existing);
        }

        let created = object_factory()?;
        let stored = THREAD_OBJECTS.with(|objects| {
            let mut objects = objects.borrow_mut();
            // 工厂可能递归创建了同名实例，以先写入者为准
            objects
                .entry(self.id)
                .or_default()
                .entry(name.to_string())
                .or_insert(created)
                .clone()
        });
        tracing::trace!("Stored '{}' in thread scope", name);
        Ok(stored)
    }

    fn remove(&self, name: &str) -> Option<ObjectRef> {
        THREAD_OBJECTS.with(|objects| {
            let mut objects = objects.borrow_mut();
            let scoped = objects.get_mut(&self.id)?;
            let removed = scoped.remove(name);
            if scoped.is_empty() {
                objects.remove(&self.id);
            }
            removed
        })
    }
}

/// 简单的映射作用域，需要显式激活
///
/// 适合请求、会话一类由外部驱动生命周期的作用域：进入时 `activate`，结束时 `deactivate`
/// 清空全部实例。未激活时访问返回 [`ContainerError::ScopeNotActive`]。
pub struct SimpleMapScope {
    name: String,
    active: AtomicBool,
    objects: Mutex<HashMap<String, ObjectRef>>,
}

impl SimpleMapScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: AtomicBool::new(false),
            objects: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn activate(&self) {
        self.active.store(true, Ordering::SeqCst);
        tracing::debug!("Scope '{}' activated", self.name);
    }

    /// 结束作用域并丢弃其中的全部实例
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::SeqCst);
        let dropped = std::mem::take(&mut *self.objects.lock());
        tracing::debug!("Scope '{}' deactivated, {} object(s) released", self.name, dropped.len());
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

impl ScopeProvider for SimpleMapScope {
    fn get(
        &self,
        name: &str,
        object_factory: &mut dyn FnMut() -> ContainerResult<ObjectRef>,
    ) -> ContainerResult<ObjectRef> {
        if !self.is_active() {
            return Err(ContainerError::ScopeNotActive(self.name.clone()));
        }
        if let Some(existing) = self.objects.lock().get(name) {
            return Ok(existing.clone());
        }

        let created = object_factory()?;
        let mut objects = self.objects.lock();
        // 创建期间可能已被同名的并发请求写入，以先写入者为准
        let stored = objects.entry(name.to_string()).or_insert(created);
        Ok(stored.clone())
    }

    fn remove(&self, name: &str) -> Option<ObjectRef> {
        self.objects.lock().remove(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Weak};
    use std::thread;

    fn counter_factory(counter: &mut u32) -> impl FnMut() -> ContainerResult<ObjectRef> + '_ {
        move || {
            *counter += 1;
            Ok(ObjectRef::new(Arc::new(*counter)))
        }
    }

    #[test]
    fn test_scope_names() {
        assert_eq!(Scope::from("singleton"), Scope::Singleton);
        assert_eq!(Scope::from("prototype"), Scope::Prototype);
        assert_eq!(Scope::from("request"), Scope::custom("request"));
        assert_eq!(Scope::custom("thread").to_string(), "thread");
    }

    #[test]
    fn test_thread_scope_is_per_thread() {
        let scope = ThreadScope::new();
        let mut created = 0;

        let first = scope.get("session", &mut counter_factory(&mut created)).unwrap();
        let again = scope.get("session", &mut counter_factory(&mut created)).unwrap();
        assert!(first.ptr_eq(&again));

        let other = thread::scope(|s| {
            s.spawn(|| {
                let mut local = 0;
                let bean = scope.get("session", &mut counter_factory(&mut local)).unwrap();
                bean
            })
            .join()
            .unwrap()
        });
        assert!(!first.ptr_eq(&other));

        assert!(scope.remove("session").is_some());
        assert!(scope.remove("session").is_none());
    }

    #[test]
    fn test_thread_scope_releases_objects_of_finished_threads() {
        let scope = ThreadScope::new();

        let weak: Weak<u32> = thread::scope(|s| {
            s.spawn(|| {
                let mut weak = Weak::new();
                scope
                    .get("worker", &mut || {
                        let value = Arc::new(7u32);
                        weak = Arc::downgrade(&value);
                        Ok(ObjectRef::new(value))
                    })
                    .unwrap();
                assert_eq!(scope.current_thread_len(), 1);
                weak
            })
            .join()
            .unwrap()
        });

        assert!(weak.upgrade().is_none());
        assert_eq!(scope.current_thread_len(), 0);
    }

    #[test]
    fn test_thread_scope_clear_and_isolation() {
        let scope = ThreadScope::new();
        let other = ThreadScope::new();
        let mut created = 0;

        let first = scope.get("session", &mut counter_factory(&mut created)).unwrap();
        scope.get("cart", &mut counter_factory(&mut created)).unwrap();
        let elsewhere = other.get("session", &mut counter_factory(&mut created)).unwrap();
        assert!(!first.ptr_eq(&elsewhere));

        assert_eq!(scope.clear_current_thread(), 2);
        assert_eq!(scope.current_thread_len(), 0);
        assert_eq!(other.current_thread_len(), 1);

        let fresh = scope.get("session", &mut counter_factory(&mut created)).unwrap();
        assert!(!first.ptr_eq(&fresh));
    }

    #[test]
    fn test_simple_map_scope_requires_activation() {
        let scope = SimpleMapScope::new("request");
        let mut created = 0;

        let err = scope.get("cart", &mut counter_factory(&mut created)).unwrap_err();
        assert!(matches!(err, ContainerError::ScopeNotActive(ref name) if name == "request"));

        scope.activate();
        let cart = scope.get("cart", &mut counter_factory(&mut created)).unwrap();
        let same = scope.get("cart", &mut counter_factory(&mut created)).unwrap();
        assert!(cart.ptr_eq(&same));

        scope.deactivate();
        scope.activate();
        let fresh = scope.get("cart", &mut counter_factory(&mut created)).unwrap();
        assert!(!cart.ptr_eq(&fresh));
    }
}
