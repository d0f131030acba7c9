//! AOP 错误类型

use chimera_beans::ContainerError;
use thiserror::Error;

/// AOP 操作的结果类型
pub type AopResult<T> = std::result::Result<T, AopError>;

/// AOP 错误
#[derive(Debug, Error)]
pub enum AopError {
    /// 对象不是切面
    #[error("Object of type '{0}' is not an aspect")]
    NotAnAspect(String),

    /// Advisor 声明不合法（例如引入 Advisor 没有声明接口）
    #[error("Invalid advisor: {0}")]
    InvalidAdvisor(String),

    /// 没有适配器能处理的通知类型
    #[error("Advice of kind '{0}' is not supported by any registered adapter")]
    UnknownAdviceType(String),

    /// 切点表达式不合法
    #[error("Invalid pointcut expression '{expression}': {reason}")]
    InvalidPointcut { expression: String, reason: String },

    /// 配置已冻结
    #[error("Cannot modify advisors: proxy configuration is frozen")]
    ConfigurationFrozen,

    /// Advisor 位置越界
    #[error("Advisor index {index} is out of range (advisor count: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// 目标对象无法被代理
    #[error("Cannot create proxy for '{0}': target does not support method dispatch")]
    NotProxyable(String),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AopError {
    pub(crate) fn invalid_pointcut(expression: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPointcut {
            expression: expression.into(),
            reason: reason.into(),
        }
    }
}

impl From<AopError> for ContainerError {
    fn from(error: AopError) -> Self {
        match error {
            AopError::Container(inner) => inner,
            other => ContainerError::Other(anyhow::Error::new(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_error_round_trip_unwraps() {
        let original = ContainerError::BeanDefinitionNotFound("advisor".to_string());
        let converted: ContainerError = AopError::from(original).into();
        assert!(matches!(converted, ContainerError::BeanDefinitionNotFound(ref name) if name == "advisor"));
    }

    #[test]
    fn test_aop_error_is_downcastable_from_container_error() {
        let converted: ContainerError = AopError::ConfigurationFrozen.into();
        match converted {
            ContainerError::Other(inner) => {
                assert!(matches!(inner.downcast_ref::<AopError>(), Some(AopError::ConfigurationFrozen)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_index_out_of_range_message() {
        let error = AopError::IndexOutOfRange { index: 3, len: 1 };
        assert_eq!(error.to_string(), "Advisor index 3 is out of range (advisor count: 1)");
    }
}
