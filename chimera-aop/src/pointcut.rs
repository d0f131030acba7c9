//! 切点（Pointcut）表达式系统
//!
//! 切点由两部分组成：类型过滤（该切点是否可能作用于某个类型）和方法匹配（是否作用于
//! 该类型上的某个方法）。方法匹配分为静态和动态两种，动态匹配在每次调用时都会根据
//! 实际参数重新判断。

use std::fmt;
use std::sync::Arc;

use chimera_beans::utils::naming::short_type_name;
use chimera_beans::{Args, Method, TypeDescriptor};
use regex::Regex;

use crate::error::{AopError, AopResult};

/// 类型过滤器
pub trait TypeFilter: Send + Sync {
    fn matches(&self, target_type: &TypeDescriptor) -> bool;
}

impl<F> TypeFilter for F
where
    F: Fn(&TypeDescriptor) -> bool + Send + Sync,
{
    fn matches(&self, target_type: &TypeDescriptor) -> bool {
        self(target_type)
    }
}

/// 切点 Trait
pub trait Pointcut: Send + Sync {
    /// 类型过滤
    fn matches_type(&self, target_type: &TypeDescriptor) -> bool;

    /// 静态方法匹配
    fn matches_method(&self, method: &Method, target_type: &TypeDescriptor) -> bool;

    /// 目标上存在引入 Advisor 时的静态方法匹配
    fn matches_method_with_introductions(
        &self,
        method: &Method,
        target_type: &TypeDescriptor,
        _has_introductions: bool,
    ) -> bool {
        self.matches_method(method, target_type)
    }

    /// 是否需要在每次调用时根据参数重新匹配
    fn is_runtime(&self) -> bool {
        false
    }

    /// 动态匹配，仅在静态匹配通过且 `is_runtime()` 为真时调用
    fn matches_runtime(&self, _method: &Method, _target_type: &TypeDescriptor, _args: &Args) -> bool {
        true
    }
}

/// 自定义匹配函数
pub type MatchFn = Arc<dyn Fn(&TypeDescriptor, &Method) -> bool + Send + Sync>;

/// 切点表达式
///
/// 类型模式匹配类型名、Rust 类型名（去掉模块路径）或任一实现的接口名
#[derive(Clone)]
pub enum PointcutExpression {
    /// 匹配所有方法
    All,

    /// 匹配特定类型的所有方法
    /// 例如：TypePattern("UserService")
    TypePattern(String),

    /// 匹配特定方法名
    /// 例如：MethodPattern("get_user")
    MethodPattern(String),

    /// 匹配特定类型的特定方法
    /// 例如：execution(* UserService.get_user(..))
    Execution {
        type_pattern: String,
        method_pattern: String,
    },

    /// 使用正则表达式匹配类型
    TypeRegex(Regex),

    /// 使用正则表达式匹配方法
    MethodRegex(Regex),

    /// 自定义匹配函数
    Custom(MatchFn),

    /// 与运算（AND）
    And(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 或运算（OR）
    Or(Box<PointcutExpression>, Box<PointcutExpression>),

    /// 非运算（NOT）
    Not(Box<PointcutExpression>),
}

impl PointcutExpression {
    /// 匹配类型名或接口名
    pub fn type_pattern(pattern: impl Into<String>) -> Self {
        PointcutExpression::TypePattern(pattern.into())
    }

    /// 匹配方法名
    pub fn method_pattern(pattern: impl Into<String>) -> Self {
        PointcutExpression::MethodPattern(pattern.into())
    }

    pub fn type_regex(pattern: &str) -> AopResult<Self> {
        Regex::new(pattern)
            .map(PointcutExpression::TypeRegex)
            .map_err(|e| AopError::invalid_pointcut(pattern, e.to_string()))
    }

    pub fn method_regex(pattern: &str) -> AopResult<Self> {
        Regex::new(pattern)
            .map(PointcutExpression::MethodRegex)
            .map_err(|e| AopError::invalid_pointcut(pattern, e.to_string()))
    }

    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&TypeDescriptor, &Method) -> bool + Send + Sync + 'static,
    {
        PointcutExpression::Custom(Arc::new(f))
    }

    /// 解析 execution 表达式
    ///
    /// 格式：`返回类型 类型名.方法名(参数)`，例如 `* UserService.get_user(..)`。
    /// 返回类型和参数部分只做语法检查，不参与匹配。
    pub fn execution(expression: &str) -> AopResult<Self> {
        let body = expression.trim();
        let body = body
            .strip_prefix("execution(")
            .and_then(|rest| rest.strip_suffix(')'))
            .unwrap_or(body);

        let parts: Vec<&str> = body.split_whitespace().collect();
        let [_return_type, signature] = parts.as_slice() else {
            return Err(AopError::invalid_pointcut(
                expression,
                "expected '<return-type> <type>.<method>(<params>)'",
            ));
        };

        let Some(open) = signature.find('(') else {
            return Err(AopError::invalid_pointcut(expression, "missing parameter list"));
        };
        if !signature.ends_with(')') {
            return Err(AopError::invalid_pointcut(expression, "unclosed parameter list"));
        }

        let qualified = &signature[..open];
        match qualified.rsplit_once('.') {
            Some((type_pattern, method_pattern)) if !type_pattern.is_empty() && !method_pattern.is_empty() => {
                Ok(PointcutExpression::Execution {
                    type_pattern: type_pattern.to_string(),
                    method_pattern: method_pattern.to_string(),
                })
            }
            Some(_) => Err(AopError::invalid_pointcut(expression, "empty type or method pattern")),
            None if !qualified.is_empty() => Ok(PointcutExpression::MethodPattern(qualified.to_string())),
            None => Err(AopError::invalid_pointcut(expression, "missing method pattern")),
        }
    }

    /// 与运算
    pub fn and(self, other: PointcutExpression) -> Self {
        PointcutExpression::And(Box::new(self), Box::new(other))
    }

    /// 或运算
    pub fn or(self, other: PointcutExpression) -> Self {
        PointcutExpression::Or(Box::new(self), Box::new(other))
    }

    /// 非运算
    pub fn not(self) -> Self {
        PointcutExpression::Not(Box::new(self))
    }

    /// 检查方法调用是否匹配
    pub fn matches(&self, target_type: &TypeDescriptor, method: &Method) -> bool {
        match self {
            PointcutExpression::All => true,

            PointcutExpression::TypePattern(pattern) => Self::type_matches(pattern, target_type),

            PointcutExpression::MethodPattern(pattern) => Self::pattern_matches(pattern, method.name()),

            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => Self::type_matches(type_pattern, target_type) && Self::pattern_matches(method_pattern, method.name()),

            PointcutExpression::TypeRegex(regex) => Self::type_names(target_type).any(|name| regex.is_match(name)),

            PointcutExpression::MethodRegex(regex) => regex.is_match(method.name()),

            PointcutExpression::Custom(func) => func(target_type, method),

            PointcutExpression::And(left, right) => {
                left.matches(target_type, method) && right.matches(target_type, method)
            }

            PointcutExpression::Or(left, right) => {
                left.matches(target_type, method) || right.matches(target_type, method)
            }

            PointcutExpression::Not(expr) => !expr.matches(target_type, method),
        }
    }

    /// 仅根据类型判断
    ///
    /// 只涉及方法的表达式在类型层面无法判定，返回 `None`
    fn type_decision(&self, target_type: &TypeDescriptor) -> Option<bool> {
        match self {
            PointcutExpression::All => Some(true),
            PointcutExpression::TypePattern(pattern) => Some(Self::type_matches(pattern, target_type)),
            PointcutExpression::Execution { type_pattern, .. } => {
                // 类型不匹配时整个表达式一定不匹配，匹配时还要看方法
                (!Self::type_matches(type_pattern, target_type)).then_some(false)
            }
            PointcutExpression::TypeRegex(regex) => Some(Self::type_names(target_type).any(|name| regex.is_match(name))),
            PointcutExpression::MethodPattern(_)
            | PointcutExpression::MethodRegex(_)
            | PointcutExpression::Custom(_) => None,
            PointcutExpression::And(left, right) => {
                match (left.type_decision(target_type), right.type_decision(target_type)) {
                    (Some(false), _) | (_, Some(false)) => Some(false),
                    (Some(true), Some(true)) => Some(true),
                    _ => None,
                }
            }
            PointcutExpression::Or(left, right) => {
                match (left.type_decision(target_type), right.type_decision(target_type)) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (Some(false), Some(false)) => Some(false),
                    _ => None,
                }
            }
            PointcutExpression::Not(expr) => expr.type_decision(target_type).map(|matched| !matched),
        }
    }

    fn type_names(target_type: &TypeDescriptor) -> impl Iterator<Item = &str> {
        [target_type.name(), short_type_name(target_type.rust_type_name())]
            .into_iter()
            .chain(target_type.interfaces().iter().map(|i| i.name()))
    }

    fn type_matches(pattern: &str, target_type: &TypeDescriptor) -> bool {
        Self::type_names(target_type).any(|name| Self::pattern_matches(pattern, name))
    }

    /// 简单的模式匹配（支持 * 通配符）
    ///
    /// 支持的模式：
    /// - `*` - 匹配任意字符串
    /// - `User*` - 以 User 开头
    /// - `*Service` - 以 Service 结尾
    /// - `*Service*` - 包含 Service
    fn pattern_matches(pattern: &str, target: &str) -> bool {
        if pattern == "*" {
            return true;
        }

        if !pattern.contains('*') {
            return pattern == target;
        }

        let regex_pattern = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex_pattern = format!("^{}$", regex_pattern);

        if let Ok(regex) = Regex::new(&regex_pattern) {
            regex.is_match(target)
        } else {
            false
        }
    }
}

impl fmt::Debug for PointcutExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PointcutExpression::All => write!(f, "All"),
            PointcutExpression::TypePattern(p) => write!(f, "TypePattern({})", p),
            PointcutExpression::MethodPattern(p) => write!(f, "MethodPattern({})", p),
            PointcutExpression::Execution {
                type_pattern,
                method_pattern,
            } => {
                write!(f, "Execution({}.{})", type_pattern, method_pattern)
            }
            PointcutExpression::TypeRegex(r) => write!(f, "TypeRegex({})", r.as_str()),
            PointcutExpression::MethodRegex(r) => write!(f, "MethodRegex({})", r.as_str()),
            PointcutExpression::Custom(_) => write!(f, "Custom(...)"),
            PointcutExpression::And(l, r) => write!(f, "And({:?}, {:?})", l, r),
            PointcutExpression::Or(l, r) => write!(f, "Or({:?}, {:?})", l, r),
            PointcutExpression::Not(e) => write!(f, "Not({:?})", e),
        }
    }
}

impl TypeFilter for PointcutExpression {
    fn matches(&self, target_type: &TypeDescriptor) -> bool {
        self.type_decision(target_type).unwrap_or(true)
    }
}

impl Pointcut for PointcutExpression {
    fn matches_type(&self, target_type: &TypeDescriptor) -> bool {
        TypeFilter::matches(self, target_type)
    }

    fn matches_method(&self, method: &Method, target_type: &TypeDescriptor) -> bool {
        self.matches(target_type, method)
    }
}

/// 运行时参数判断
pub type ArgsPredicate = Arc<dyn Fn(&Method, &Args) -> bool + Send + Sync>;

/// 动态切点
///
/// 先用静态表达式做预筛选，通过后每次调用再根据实际参数判断
#[derive(Clone)]
pub struct DynamicPointcut {
    expression: PointcutExpression,
    predicate: ArgsPredicate,
}

impl DynamicPointcut {
    pub fn new<F>(expression: PointcutExpression, predicate: F) -> Self
    where
        F: Fn(&Method, &Args) -> bool + Send + Sync + 'static,
    {
        Self {
            expression,
            predicate: Arc::new(predicate),
        }
    }

    pub fn expression(&self) -> &PointcutExpression {
        &self.expression
    }
}

impl fmt::Debug for DynamicPointcut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicPointcut")
            .field("expression", &self.expression)
            .finish_non_exhaustive()
    }
}

impl Pointcut for DynamicPointcut {
    fn matches_type(&self, target_type: &TypeDescriptor) -> bool {
        self.expression.matches_type(target_type)
    }

    fn matches_method(&self, method: &Method, target_type: &TypeDescriptor) -> bool {
        self.expression.matches(target_type, method)
    }

    fn is_runtime(&self) -> bool {
        true
    }

    fn matches_runtime(&self, method: &Method, _target_type: &TypeDescriptor, args: &Args) -> bool {
        (self.predicate)(method, args)
    }
}
