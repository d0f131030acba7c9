//! 方法调用（MethodInvocation）
//!
//! 每次代理调用创建一个，只属于当前调用栈。拦截链本身是共享的只读快照，
//! 游标等可变状态全部放在这里。

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chimera_beans::{Args, Method, ObjectRef, TypeDescriptor, Value};

use crate::chain::ChainEntry;
use crate::JoinPoint;

/// 一次方法调用
pub struct MethodInvocation {
    target: ObjectRef,
    target_type: Arc<TypeDescriptor>,
    method: Method,
    args: Args,
    chain: Arc<[ChainEntry]>,
    /// 下一个要执行的链节点
    index: usize,
    attributes: HashMap<String, Value>,
    started: Instant,
}

impl MethodInvocation {
    pub fn new(
        target: ObjectRef,
        target_type: Arc<TypeDescriptor>,
        method: Method,
        args: Args,
        chain: Arc<[ChainEntry]>,
    ) -> Self {
        Self {
            target,
            target_type,
            method,
            args,
            chain,
            index: 0,
            attributes: HashMap::new(),
            started: Instant::now(),
        }
    }

    /// 执行下一个拦截器；链已走完时调用目标方法
    ///
    /// 返回前会恢复游标，同一个拦截器可以多次调用 `proceed` 重新执行后续链
    pub fn proceed(&mut self) -> anyhow::Result<Value> {
        let Some(entry) = self.chain.get(self.index).cloned() else {
            return self.invoke_join_point();
        };

        self.index += 1;
        let result = match &entry {
            ChainEntry::Interceptor(interceptor) => interceptor.invoke(self),
            ChainEntry::Conditional { interceptor, pointcut } => {
                if pointcut.matches_runtime(&self.method, &self.target_type, &self.args) {
                    interceptor.invoke(self)
                } else {
                    self.proceed()
                }
            }
        };
        self.index -= 1;
        result
    }

    fn invoke_join_point(&self) -> anyhow::Result<Value> {
        tracing::trace!("Invoking join point {}", self.method);
        self.target.invoke(&self.method, &self.args)
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn args(&self) -> &Args {
        &self.args
    }

    /// 可变参数，拦截器可以在 `proceed` 之前改写
    pub fn args_mut(&mut self) -> &mut Args {
        &mut self.args
    }

    /// 当前目标对象（不是代理）
    pub fn target(&self) -> &ObjectRef {
        &self.target
    }

    pub fn target_type(&self) -> &TypeDescriptor {
        &self.target_type
    }

    pub fn join_point(&self) -> JoinPoint<'_> {
        JoinPoint {
            target_type: self.target_type.name(),
            method: &self.method,
            args: &self.args,
            timestamp: self.started,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// 设置调用级别的属性，供后续拦截器读取
    pub fn set_attribute(&mut self, key: impl Into<String>, value: Value) {
        self.attributes.insert(key.into(), value);
    }

    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    pub fn remove_attribute(&mut self, key: &str) -> Option<Value> {
        self.attributes.remove(key)
    }
}

impl fmt::Debug for MethodInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodInvocation")
            .field("target_type", &self.target_type.name())
            .field("method", &self.method.signature())
            .field("index", &self.index)
            .field("chain", &self.chain.len())
            .finish()
    }
}
