//! 目标源（TargetSource）
//!
//! 代理每次调用时从目标源获取真正的目标对象。单例目标源总是返回同一个对象，
//! 原型目标源每次创建新对象，可热替换目标源允许在运行时更换目标。

use std::fmt;
use std::sync::Arc;

use chimera_beans::{BeanFactory, ObjectRef, TypeDescriptor};
use parking_lot::RwLock;

use crate::error::{AopError, AopResult};

/// 目标源 Trait
pub trait TargetSource: Send + Sync {
    /// 目标对象的类型描述
    fn target_type(&self) -> Arc<TypeDescriptor>;

    /// 每次调用是否都返回同一个对象
    fn is_static(&self) -> bool {
        false
    }

    /// 获取本次调用的目标对象
    fn get_target(&self) -> anyhow::Result<ObjectRef>;

    /// 调用结束后归还目标对象
    fn release_target(&self, _target: &ObjectRef) -> anyhow::Result<()> {
        Ok(())
    }
}

fn descriptor_of(target: &ObjectRef) -> AopResult<Arc<TypeDescriptor>> {
    target
        .type_descriptor()
        .ok_or_else(|| AopError::NotProxyable(target.type_name().to_string()))
}

/// 单例目标源
#[derive(Clone)]
pub struct SingletonTargetSource {
    target: ObjectRef,
    descriptor: Arc<TypeDescriptor>,
}

impl SingletonTargetSource {
    /// 目标必须支持动态调用
    pub fn new(target: ObjectRef) -> AopResult<Self> {
        let descriptor = descriptor_of(&target)?;
        Ok(Self { target, descriptor })
    }

    pub fn target(&self) -> &ObjectRef {
        &self.target
    }
}

impl TargetSource for SingletonTargetSource {
    fn target_type(&self) -> Arc<TypeDescriptor> {
        Arc::clone(&self.descriptor)
    }

    fn is_static(&self) -> bool {
        true
    }

    fn get_target(&self) -> anyhow::Result<ObjectRef> {
        Ok(self.target.clone())
    }
}

impl fmt::Debug for SingletonTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingletonTargetSource")
            .field("target", &self.descriptor.name())
            .finish()
    }
}

type TargetFactory = Arc<dyn Fn() -> anyhow::Result<ObjectRef> + Send + Sync>;

/// 原型目标源，每次调用创建新的目标对象
#[derive(Clone)]
pub struct PrototypeTargetSource {
    descriptor: Arc<TypeDescriptor>,
    factory: TargetFactory,
}

impl PrototypeTargetSource {
    pub fn new<F>(descriptor: Arc<TypeDescriptor>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<ObjectRef> + Send + Sync + 'static,
    {
        Self {
            descriptor,
            factory: Arc::new(factory),
        }
    }

    /// 每次调用从容器获取指定名称的 Bean（该 Bean 应为原型作用域）
    pub fn from_bean_factory(bean_factory: Arc<dyn BeanFactory>, bean_name: &str) -> AopResult<Self> {
        let descriptor = bean_factory
            .get_type(bean_name)?
            .ok_or_else(|| AopError::NotProxyable(bean_name.to_string()))?;
        let name = bean_name.to_string();
        Ok(Self::new(descriptor, move || -> anyhow::Result<ObjectRef> {
            Ok(bean_factory.get_bean(&name)?)
        }))
    }
}

impl TargetSource for PrototypeTargetSource {
    fn target_type(&self) -> Arc<TypeDescriptor> {
        Arc::clone(&self.descriptor)
    }

    fn get_target(&self) -> anyhow::Result<ObjectRef> {
        (self.factory)()
    }
}

impl fmt::Debug for PrototypeTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrototypeTargetSource")
            .field("target_type", &self.descriptor.name())
            .finish()
    }
}

/// 可热替换的目标源
pub struct HotSwappableTargetSource {
    target: RwLock<ObjectRef>,
    descriptor: Arc<TypeDescriptor>,
}

impl HotSwappableTargetSource {
    pub fn new(target: ObjectRef) -> AopResult<Self> {
        let descriptor = descriptor_of(&target)?;
        Ok(Self {
            target: RwLock::new(target),
            descriptor,
        })
    }

    /// 替换目标，返回旧目标
    ///
    /// 新目标必须与原目标类型相同
    pub fn swap(&self, new_target: ObjectRef) -> AopResult<ObjectRef> {
        let descriptor = descriptor_of(&new_target)?;
        if descriptor.type_id() != self.descriptor.type_id() {
            return Err(AopError::Other(anyhow::anyhow!(
                "Cannot swap target of type '{}' for '{}'",
                self.descriptor.name(),
                descriptor.name()
            )));
        }
        tracing::debug!("Hot swapping target of type {}", self.descriptor.name());
        Ok(std::mem::replace(&mut *self.target.write(), new_target))
    }
}

impl TargetSource for HotSwappableTargetSource {
    fn target_type(&self) -> Arc<TypeDescriptor> {
        Arc::clone(&self.descriptor)
    }

    fn get_target(&self) -> anyhow::Result<ObjectRef> {
        Ok(self.target.read().clone())
    }
}

impl fmt::Debug for HotSwappableTargetSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HotSwappableTargetSource")
            .field("target_type", &self.descriptor.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chimera_beans::{Args, Method, NoSuchMethodError, Reflective, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Session {
        id: usize,
        descriptor: Arc<TypeDescriptor>,
    }

    impl Reflective for Session {
        fn type_descriptor(&self) -> Arc<TypeDescriptor> {
            Arc::clone(&self.descriptor)
        }

        fn invoke(&self, method: &Method, _args: &Args) -> anyhow::Result<Value> {
            Err(NoSuchMethodError::new("Session", method).into())
        }
    }

    fn session_type() -> Arc<TypeDescriptor> {
        TypeDescriptor::builder::<Session>("Session").build()
    }

    fn session(id: usize) -> ObjectRef {
        ObjectRef::reflective(Arc::new(Session {
            id,
            descriptor: session_type(),
        }))
    }

    #[test]
    fn test_singleton_requires_reflective_target() {
        assert!(matches!(
            SingletonTargetSource::new(ObjectRef::new(Arc::new(1u8))),
            Err(AopError::NotProxyable(_))
        ));

        let target = session(1);
        let source = SingletonTargetSource::new(target.clone()).unwrap();
        assert!(source.is_static());
        assert!(source.get_target().unwrap().ptr_eq(&target));
    }

    #[test]
    fn test_prototype_creates_new_targets() {
        let next = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&next);
        let source = PrototypeTargetSource::new(session_type(), move || {
            Ok(session(counter.fetch_add(1, Ordering::SeqCst)))
        });

        let a = source.get_target().unwrap();
        let b = source.get_target().unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!(b.downcast_ref::<Session>().unwrap().id, 1);
        assert!(!source.is_static());
    }

    #[test]
    fn test_hot_swap() {
        let source = HotSwappableTargetSource::new(session(1)).unwrap();
        let old = source.swap(session(2)).unwrap();
        assert_eq!(old.downcast_ref::<Session>().unwrap().id, 1);
        assert_eq!(source.get_target().unwrap().downcast_ref::<Session>().unwrap().id, 2);

        struct Other;
        impl Reflective for Other {
            fn type_descriptor(&self) -> Arc<TypeDescriptor> {
                TypeDescriptor::builder::<Other>("Other").build()
            }
            fn invoke(&self, method: &Method, _args: &Args) -> anyhow::Result<Value> {
                Err(NoSuchMethodError::new("Other", method).into())
            }
        }
        assert!(source.swap(ObjectRef::reflective(Arc::new(Other))).is_err());
    }
}
