//! 连接点（JoinPoint）定义
//!
//! 连接点表示一次被拦截的方法调用，通知通过它读取调用上下文

use std::any::Any;
use std::fmt;
use std::time::Instant;

use chimera_beans::{Args, Method};

/// 连接点信息
///
/// 借用自正在进行的 [`MethodInvocation`](crate::MethodInvocation)，只在通知执行期间有效
#[derive(Clone, Copy)]
pub struct JoinPoint<'a> {
    /// 目标类型名称
    pub target_type: &'a str,

    /// 被调用的方法
    pub method: &'a Method,

    /// 实际参数
    pub args: &'a Args,

    /// 调用开始时间
    pub timestamp: Instant,
}

impl<'a> JoinPoint<'a> {
    pub fn new(target_type: &'a str, method: &'a Method, args: &'a Args) -> Self {
        Self {
            target_type,
            method,
            args,
            timestamp: Instant::now(),
        }
    }

    /// 获取完整的方法签名，例如 `UserService::find_user`
    pub fn signature(&self) -> String {
        format!("{}::{}", self.target_type, self.method.name())
    }

    pub fn method_name(&self) -> &'a str {
        self.method.name()
    }

    /// 按位置读取参数
    pub fn arg<T: Any>(&self, index: usize) -> Option<&'a T> {
        self.args.get::<T>(index).ok()
    }
}

impl fmt::Debug for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JoinPoint")
            .field("signature", &self.signature())
            .field("method", &self.method.signature())
            .field("args", &self.args.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl fmt::Display for JoinPoint<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}
