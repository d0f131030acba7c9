//! 容器错误类型
//!
//! 容器自身的失败使用 [`ContainerError`]；用户提供的回调（构造函数、init/destroy、
//! 目标方法）统一返回 `anyhow::Result`，在穿过容器边界时通过 downcast 还原。

use thiserror::Error;

/// 容器操作的结果类型
pub type ContainerResult<T> = std::result::Result<T, ContainerError>;

/// 容器错误
#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("No bean definition named '{0}'")]
    BeanDefinitionNotFound(String),

    #[error("Bean '{0}' already exists")]
    BeanAlreadyExists(String),

    /// `depends_on` 显式依赖形成的环
    #[error("Circular depends-on relationship for bean '{name}': {}", .chain.join(" -> "))]
    CircularDependency { name: String, chain: Vec<String> },

    #[error("Bean '{name}' is currently in creation: {message}")]
    CurrentlyInCreation { name: String, message: String },

    #[error("Error creating bean '{name}': {source}{}", suppressed_suffix(.suppressed))]
    CreationFailure {
        name: String,
        #[source]
        source: anyhow::Error,
        suppressed: Vec<ContainerError>,
    },

    #[error("No scope registered for scope name '{0}' or scope is not active")]
    ScopeNotActive(String),

    #[error("Bean definition '{0}' is abstract")]
    BeanIsAbstract(String),

    #[error("Bean '{name}' is expected to be of type '{expected}' but was actually of type '{found}'")]
    TypeMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("No qualifying bean of type '{type_name}': expected single matching bean but found {}: {}", .candidates.len(), .candidates.join(", "))]
    NoUniqueBean {
        type_name: String,
        candidates: Vec<String>,
    },

    #[error("Dependency validation failed: {0}")]
    DependencyValidationFailed(String),

    #[error("Bean factory configuration is frozen")]
    ConfigurationFrozen,

    #[error("Failed to initialize logging: {0}")]
    LoggingInitFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn suppressed_suffix(suppressed: &[ContainerError]) -> String {
    if suppressed.is_empty() {
        String::new()
    } else {
        format!(" ({} related cause(s) suppressed)", suppressed.len())
    }
}

impl ContainerError {
    pub(crate) fn currently_in_creation(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CurrentlyInCreation {
            name: name.into(),
            message: message.into(),
        }
    }

    /// 把创建过程中出现的任意错误包装为 [`ContainerError::CreationFailure`]
    ///
    /// 循环相关的错误（`CurrentlyInCreation`、`CircularDependency`）原样向上传播，
    /// 调用方可以直接匹配到根因。
    pub fn creation_failure(name: &str, error: anyhow::Error) -> Self {
        match error.downcast::<ContainerError>() {
            Ok(e @ ContainerError::CurrentlyInCreation { .. })
            | Ok(e @ ContainerError::CircularDependency { .. }) => e,
            Ok(e) => ContainerError::CreationFailure {
                name: name.to_string(),
                source: anyhow::Error::new(e),
                suppressed: Vec::new(),
            },
            Err(e) => ContainerError::CreationFailure {
                name: name.to_string(),
                source: e,
                suppressed: Vec::new(),
            },
        }
    }

    /// 附加在同一次创建过程中被记录下来的相关错误
    pub(crate) fn with_suppressed(mut self, related: Vec<ContainerError>) -> Self {
        if let ContainerError::CreationFailure { suppressed, .. } = &mut self {
            suppressed.extend(related);
        }
        self
    }

    /// 获取附加的相关错误
    pub fn suppressed(&self) -> &[ContainerError] {
        match self {
            ContainerError::CreationFailure { suppressed, .. } => suppressed,
            _ => &[],
        }
    }

    /// 沿着 source 链查找是否存在 `CurrentlyInCreation`
    pub fn is_currently_in_creation(&self) -> bool {
        self.find_in_chain(|e| matches!(e, ContainerError::CurrentlyInCreation { .. }))
    }

    fn find_in_chain(&self, predicate: impl Fn(&ContainerError) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        let mut current: Option<&(dyn std::error::Error + 'static)> = std::error::Error::source(self);
        while let Some(err) = current {
            if let Some(container_error) = err.downcast_ref::<ContainerError>() {
                if predicate(container_error) {
                    return true;
                }
            }
            current = err.source();
        }
        false
    }
}
