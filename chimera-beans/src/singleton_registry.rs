//! 单例注册表
//!
//! 每个名称对应一个条目，条目只会向前迁移：
//!
//! ```text
//! (不存在) -> Factory（三级：延迟构造回调）-> Early（二级：早期引用）-> Complete（一级：完成品）
//! ```
//!
//! 创建失败时条目被移除，回到"不存在"。所有迁移都在同一把可重入锁内完成：
//! 同一线程在创建过程中可以递归进入注册表，其他线程在创建结束前阻塞。

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use parking_lot::ReentrantMutex;

use crate::error::{ContainerError, ContainerResult};
use crate::reflect::ObjectRef;

/// 早期引用工厂（三级缓存中的回调）
pub type EarlyReferenceFactory = Arc<dyn Fn() -> ContainerResult<ObjectRef> + Send + Sync>;

/// 销毁回调
pub type Disposable = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// 单次创建过程中最多记录的相关错误数量
const SUPPRESSED_EXCEPTIONS_LIMIT: usize = 100;

enum SingletonEntry {
    Factory(EarlyReferenceFactory),
    Early(ObjectRef),
    Complete(ObjectRef),
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<String, SingletonEntry>,
    /// 完成品的注册顺序，销毁时逆序
    registration_order: Vec<String>,
    in_creation: HashSet<String>,
    in_creation_check_exclusions: HashSet<String>,
    /// bean -> 依赖它的 bean
    dependent_beans: HashMap<String, BTreeSet<String>>,
    /// bean -> 它依赖的 bean
    dependencies_for_bean: HashMap<String, BTreeSet<String>>,
    disposables: HashMap<String, Disposable>,
    suppressed: Option<Vec<ContainerError>>,
    destruction_in_progress: bool,
}

/// 默认单例注册表
pub struct DefaultSingletonRegistry {
    state: ReentrantMutex<RefCell<RegistryState>>,
}

impl DefaultSingletonRegistry {
    pub fn new() -> Self {
        Self {
            state: ReentrantMutex::new(RefCell::new(RegistryState::default())),
        }
    }

    /// 注册一个已经构建好的单例
    pub fn register_singleton(&self, name: &str, object: ObjectRef) -> ContainerResult<()> {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if let Some(SingletonEntry::Complete(_)) = state.entries.get(name) {
            return Err(ContainerError::BeanAlreadyExists(name.to_string()));
        }
        Self::add_complete(&mut state, name, object);
        tracing::debug!("Registered singleton '{}'", name);
        Ok(())
    }

    fn add_complete(state: &mut RegistryState, name: &str, object: ObjectRef) {
        state
            .entries
            .insert(name.to_string(), SingletonEntry::Complete(object));
        if !state.registration_order.iter().any(|n| n == name) {
            state.registration_order.push(name.to_string());
        }
    }

    /// 登记早期引用工厂（三级）
    ///
    /// 已经存在完成品时不做任何事。
    pub fn register_early_factory(&self, name: &str, factory: EarlyReferenceFactory) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if matches!(state.entries.get(name), Some(SingletonEntry::Complete(_))) {
            return;
        }
        state
            .entries
            .insert(name.to_string(), SingletonEntry::Factory(factory));
        tracing::trace!("Registered early reference factory for '{}'", name);
    }

    /// 查找单例
    ///
    /// 先查完成品；只有当 `name` 正在创建时才会查看早期引用。若只有三级工厂且
    /// `allow_early_reference` 为真，调用工厂并把结果提升为早期引用。
    pub fn get_singleton(
        &self,
        name: &str,
        allow_early_reference: bool,
    ) -> ContainerResult<Option<ObjectRef>> {
        let guard = self.state.lock();

        let factory = {
            let state = guard.borrow();
            match state.entries.get(name) {
                Some(SingletonEntry::Complete(object)) => return Ok(Some(object.clone())),
                _ if !state.in_creation.contains(name) => return Ok(None),
                Some(SingletonEntry::Early(object)) => return Ok(Some(object.clone())),
                Some(SingletonEntry::Factory(factory)) if allow_early_reference => Arc::clone(factory),
                _ => return Ok(None),
            }
        };

        // 工厂可能递归进入注册表，调用期间不能持有 RefCell 借用
        let early = factory()?;

        let mut state = guard.borrow_mut();
        match state.entries.get(name) {
            Some(SingletonEntry::Complete(object)) | Some(SingletonEntry::Early(object)) => {
                Ok(Some(object.clone()))
            }
            _ => {
                state
                    .entries
                    .insert(name.to_string(), SingletonEntry::Early(early.clone()));
                tracing::debug!("Eagerly exposed early reference for singleton '{}'", name);
                Ok(Some(early))
            }
        }
    }

    /// 返回完成品，不存在时在锁内调用 `factory` 创建
    ///
    /// 创建成功后条目变为完成品；失败时条目被移除，同一次创建中记录的相关错误
    /// 附加到最外层的失败上。
    pub fn get_or_create<F>(&self, name: &str, factory: F) -> ContainerResult<ObjectRef>
    where
        F: FnOnce() -> ContainerResult<ObjectRef>,
    {
        let guard = self.state.lock();

        let owns_suppressed = {
            let mut state = guard.borrow_mut();
            if let Some(SingletonEntry::Complete(object)) = state.entries.get(name) {
                return Ok(object.clone());
            }
            if state.destruction_in_progress {
                return Err(ContainerError::Other(anyhow::anyhow!(
                    "Singleton bean creation not allowed while singletons of this factory are in destruction (bean '{}')",
                    name
                )));
            }

            tracing::debug!("Creating shared instance of singleton bean '{}'", name);
            Self::before_creation(&mut state, name)?;

            let owns = state.suppressed.is_none();
            if owns {
                state.suppressed = Some(Vec::new());
            }
            owns
        };

        let result = factory();

        let mut state = guard.borrow_mut();
        if !state.in_creation_check_exclusions.contains(name) {
            state.in_creation.remove(name);
        }
        let suppressed = if owns_suppressed {
            state.suppressed.take().unwrap_or_default()
        } else {
            Vec::new()
        };

        match result {
            Ok(object) => {
                Self::add_complete(&mut state, name, object.clone());
                Ok(object)
            }
            Err(error) => {
                if !matches!(state.entries.get(name), Some(SingletonEntry::Complete(_))) {
                    state.entries.remove(name);
                }
                Err(error.with_suppressed(suppressed))
            }
        }
    }

    fn before_creation(state: &mut RegistryState, name: &str) -> ContainerResult<()> {
        if !state.in_creation_check_exclusions.contains(name) && !state.in_creation.insert(name.to_string()) {
            return Err(ContainerError::currently_in_creation(
                name,
                "Requested bean is currently in creation: Is there an unresolvable circular reference?",
            ));
        }
        Ok(())
    }

    /// 记录一个与当前创建过程相关、但不直接导致失败的错误
    pub fn on_suppressed_error(&self, error: ContainerError) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        match state.suppressed.as_mut() {
            Some(suppressed) if suppressed.len() < SUPPRESSED_EXCEPTIONS_LIMIT => {
                tracing::warn!("Recording suppressed error during singleton creation: {}", error);
                suppressed.push(error);
            }
            _ => tracing::debug!("Dropping suppressed error outside of creation: {}", error),
        }
    }

    pub fn is_currently_in_creation(&self, name: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state.in_creation.contains(name)
    }

    /// 把 `name` 排除出（或重新纳入）创建中检查
    pub fn set_currently_in_creation(&self, name: &str, in_creation: bool) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        if in_creation {
            state.in_creation_check_exclusions.remove(name);
        } else {
            state.in_creation_check_exclusions.insert(name.to_string());
        }
    }

    /// 是否存在完成品
    pub fn contains_singleton(&self, name: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        matches!(state.entries.get(name), Some(SingletonEntry::Complete(_)))
    }

    /// 已完成的单例名称（按注册顺序）
    pub fn singleton_names(&self) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .registration_order
            .iter()
            .filter(|name| matches!(state.entries.get(*name), Some(SingletonEntry::Complete(_))))
            .cloned()
            .collect()
    }

    pub fn singleton_count(&self) -> usize {
        self.singleton_names().len()
    }

    /// 记录 `dependent` 依赖 `name`
    pub fn register_dependent_bean(&self, name: &str, dependent: &str) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state
            .dependent_beans
            .entry(name.to_string())
            .or_default()
            .insert(dependent.to_string());
        state
            .dependencies_for_bean
            .entry(dependent.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// `dependent` 是否（直接或传递地）依赖 `name`
    pub fn is_dependent(&self, name: &str, dependent: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        let mut visited = HashSet::new();
        Self::is_dependent_inner(&state, name, dependent, &mut visited)
    }

    fn is_dependent_inner(
        state: &RegistryState,
        name: &str,
        dependent: &str,
        visited: &mut HashSet<String>,
    ) -> bool {
        if !visited.insert(name.to_string()) {
            return false;
        }
        let Some(dependents) = state.dependent_beans.get(name) else {
            return false;
        };
        if dependents.contains(dependent) {
            return true;
        }
        dependents
            .iter()
            .any(|transitive| Self::is_dependent_inner(state, transitive, dependent, visited))
    }

    /// 依赖 `name` 的 bean
    pub fn dependent_beans(&self, name: &str) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dependent_beans
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// `name` 依赖的 bean
    pub fn dependencies_for_bean(&self, name: &str) -> Vec<String> {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dependencies_for_bean
            .get(name)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_dependent_bean(&self, name: &str) -> bool {
        let guard = self.state.lock();
        let state = guard.borrow();
        state
            .dependent_beans
            .get(name)
            .is_some_and(|set| !set.is_empty())
    }

    /// 登记销毁回调
    pub fn register_disposable(&self, name: &str, disposable: Disposable) {
        let guard = self.state.lock();
        let mut state = guard.borrow_mut();
        state.disposables.insert(name.to_string(), disposable);
    }

    /// 移除单例的所有缓存条目并执行销毁
    ///
    /// 依赖它的 bean 先于它被销毁；销毁失败只记录日志。
    pub fn destroy_singleton(&self, name: &str) {
        let guard = self.state.lock();

        let (disposable, dependents) = {
            let mut state = guard.borrow_mut();
            state.entries.remove(name);
            state.registration_order.retain(|n| n != name);
            let disposable = state.disposables.remove(name);
            let dependents = state.dependent_beans.remove(name).unwrap_or_default();
            (disposable, dependents)
        };

        for dependent in dependents {
            tracing::debug!("Destroying dependent bean '{}' of '{}'", dependent, name);
            self.destroy_singleton(&dependent);
        }

        if let Some(disposable) = disposable {
            tracing::debug!("Invoking destroy callback of bean '{}'", name);
            if let Err(e) = disposable() {
                tracing::warn!("Destruction of bean with name '{}' threw an exception: {:#}", name, e);
            }
        }

        let mut state = guard.borrow_mut();
        for dependents in state.dependent_beans.values_mut() {
            dependents.remove(name);
        }
        state.dependent_beans.retain(|_, dependents| !dependents.is_empty());
        state.dependencies_for_bean.remove(name);
    }

    /// 销毁全部单例，按注册顺序逆序
    pub fn destroy_singletons(&self) {
        let guard = self.state.lock();

        let names: Vec<String> = {
            let mut state = guard.borrow_mut();
            state.destruction_in_progress = true;
            let mut names: Vec<String> = state.registration_order.clone();
            for name in state.disposables.keys() {
                if !names.contains(name) {
                    names.push(name.clone());
                }
            }
            names
        };

        tracing::info!("Destroying {} singleton(s)", names.len());
        for name in names.iter().rev() {
            self.destroy_singleton(name);
        }

        let mut state = guard.borrow_mut();
        state.entries.clear();
        state.registration_order.clear();
        state.dependent_beans.clear();
        state.dependencies_for_bean.clear();
        state.destruction_in_progress = false;
    }
}

impl Default for DefaultSingletonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefaultSingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultSingletonRegistry")
            .field("singletons", &self.singleton_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn object(value: u32) -> ObjectRef {
        ObjectRef::new(Arc::new(value))
    }

    #[test]
    fn test_get_or_create_caches() {
        let registry = DefaultSingletonRegistry::new();
        let created = AtomicUsize::new(0);
        let create = || {
            created.fetch_add(1, Ordering::SeqCst);
            Ok(object(1))
        };

        let a = registry.get_or_create("a", create).unwrap();
        let b = registry.get_or_create("a", || Ok(object(2))).unwrap();
        assert!(a.ptr_eq(&b));
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(registry.contains_singleton("a"));
        assert!(!registry.is_currently_in_creation("a"));
    }

    #[test]
    fn test_early_reference_promotion() {
        let registry = DefaultSingletonRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let raw = object(7);

        let result = registry
            .get_or_create("a", || {
                let counter = Arc::clone(&calls);
                let exposed = raw.clone();
                registry.register_early_factory(
                    "a",
                    Arc::new(move || {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(exposed.clone())
                    }),
                );

                // 不允许早期引用时不会调用工厂
                assert!(registry.get_singleton("a", false).unwrap().is_none());

                let first = registry.get_singleton("a", true).unwrap().unwrap();
                let second = registry.get_singleton("a", true).unwrap().unwrap();
                assert!(first.ptr_eq(&raw));
                assert!(second.ptr_eq(&raw));
                Ok(raw.clone())
            })
            .unwrap();

        assert!(result.ptr_eq(&raw));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_early_reference_invisible_outside_creation() {
        let registry = DefaultSingletonRegistry::new();
        registry.register_early_factory("a", Arc::new(|| Ok(object(1))));
        assert!(registry.get_singleton("a", true).unwrap().is_none());
    }

    #[test]
    fn test_reentrant_creation_fails() {
        let registry = DefaultSingletonRegistry::new();
        let err = registry
            .get_or_create("a", || registry.get_or_create("a", || Ok(object(1))))
            .unwrap_err();
        assert!(matches!(err, ContainerError::CurrentlyInCreation { ref name, .. } if name == "a"));
    }

    #[test]
    fn test_failure_resets_entry() {
        let registry = DefaultSingletonRegistry::new();
        let err = registry
            .get_or_create("a", || {
                registry.register_early_factory("a", Arc::new(|| Ok(object(1))));
                Err(ContainerError::creation_failure("a", anyhow::anyhow!("boom")))
            })
            .unwrap_err();
        assert!(err.to_string().contains("boom"));
        assert!(!registry.is_currently_in_creation("a"));
        assert!(registry.get_singleton("a", true).unwrap().is_none());

        // 可以重试
        let retried = registry.get_or_create("a", || Ok(object(2))).unwrap();
        assert_eq!(*retried.downcast::<u32>().unwrap(), 2);
    }

    #[test]
    fn test_suppressed_errors_attached_to_outermost_failure() {
        let registry = DefaultSingletonRegistry::new();
        let err = registry
            .get_or_create("outer", || {
                registry.on_suppressed_error(ContainerError::BeanDefinitionNotFound("x".into()));
                let _ = registry.get_or_create("inner", || Ok(object(1)))?;
                Err(ContainerError::creation_failure("outer", anyhow::anyhow!("boom")))
            })
            .unwrap_err();
        assert_eq!(err.suppressed().len(), 1);
    }

    #[test]
    fn test_dependents_destroyed_first() {
        let registry = DefaultSingletonRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["repository", "service"] {
            registry.register_singleton(name, object(0)).unwrap();
            let order = Arc::clone(&order);
            registry.register_disposable(
                name,
                Box::new(move || -> anyhow::Result<()> {
                    order.lock().push(name);
                    Ok(())
                }),
            );
        }
        registry.register_dependent_bean("repository", "service");
        registry.register_dependent_bean("service", "controller");
        assert!(registry.is_dependent("repository", "controller"));
        assert!(!registry.is_dependent("controller", "repository"));

        registry.destroy_singleton("repository");
        assert_eq!(*order.lock(), vec!["service", "repository"]);
        assert!(!registry.contains_singleton("service"));
    }

    #[test]
    fn test_destroy_singletons_reverse_order_and_failures_logged() {
        let registry = DefaultSingletonRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for name in ["first", "second", "third"] {
            registry.register_singleton(name, object(0)).unwrap();
            let order = Arc::clone(&order);
            registry.register_disposable(
                name,
                Box::new(move || -> anyhow::Result<()> {
                    order.lock().push(name);
                    if name == "second" {
                        anyhow::bail!("close failed");
                    }
                    Ok(())
                }),
            );
        }

        registry.destroy_singletons();
        assert_eq!(*order.lock(), vec!["third", "second", "first"]);
        assert_eq!(registry.singleton_count(), 0);
    }

    #[test]
    fn test_concurrent_get_or_create_single_instance() {
        let registry = DefaultSingletonRegistry::new();
        let created = AtomicUsize::new(0);

        let results: Vec<ObjectRef> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    s.spawn(|| {
                        registry
                            .get_or_create("shared", || {
                                created.fetch_add(1, Ordering::SeqCst);
                                std::thread::sleep(std::time::Duration::from_millis(5));
                                Ok(object(1))
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(results.windows(2).all(|w| w[0].ptr_eq(&w[1])));
    }
}
