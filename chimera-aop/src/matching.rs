//! Advisor 适用性判断
//!
//! 判断某个 Advisor 是否可能作用于某个类型：类型过滤通过，并且该类型的有效方法集中
//! 至少有一个方法静态匹配。有效方法集取决于代理方式：接口代理只暴露接口方法，
//! 子类代理（或类型没有接口时）暴露全部方法。如果有引入 Advisor 作用于该类型，
//! 引入接口的方法也算在有效方法集中。

use std::sync::Arc;

use chimera_beans::{Interface, Method, TypeDescriptor};

use crate::advisor::{sort_advisors, Advisor};

/// 作用于 `target_type` 的引入 Advisor 带来的接口
pub fn introduced_interfaces(advisors: &[Arc<dyn Advisor>], target_type: &TypeDescriptor) -> Vec<Arc<Interface>> {
    advisors
        .iter()
        .filter_map(|advisor| advisor.as_introduction_advisor())
        .filter(|introduction| introduction.type_filter().matches(target_type))
        .flat_map(|introduction| introduction.interfaces().iter().cloned())
        .collect()
}

/// 是否存在作用于 `target_type` 的引入 Advisor
pub fn has_matching_introductions(advisors: &[Arc<dyn Advisor>], target_type: &TypeDescriptor) -> bool {
    advisors
        .iter()
        .filter_map(|advisor| advisor.as_introduction_advisor())
        .any(|introduction| introduction.type_filter().matches(target_type))
}

/// 代理是否只暴露接口方法
pub fn uses_interface_proxy(target_type: &TypeDescriptor, proxy_target_class: bool) -> bool {
    !proxy_target_class && !target_type.interfaces().is_empty()
}

/// Advisor 是否可能作用于 `target_type`
///
/// `introduced` 为同一批候选中作用于该类型的引入接口
pub fn can_apply(
    advisor: &dyn Advisor,
    target_type: &TypeDescriptor,
    introduced: &[Arc<Interface>],
    proxy_target_class: bool,
) -> bool {
    if let Some(introduction) = advisor.as_introduction_advisor() {
        return introduction.type_filter().matches(target_type);
    }

    let Some(pointcut_advisor) = advisor.as_pointcut_advisor() else {
        // 没有切点的 Advisor 作用于所有类型
        return true;
    };

    let pointcut = pointcut_advisor.pointcut();
    if !pointcut.matches_type(target_type) {
        return false;
    }

    let has_introductions = !introduced.is_empty();
    let declared: Vec<&Method> = if uses_interface_proxy(target_type, proxy_target_class) {
        target_type.interfaces().iter().flat_map(|i| i.methods().iter()).collect()
    } else {
        target_type.methods().collect()
    };
    let introduced_methods = introduced.iter().flat_map(|i| i.methods().iter());
    let mut methods = declared.into_iter().chain(introduced_methods);
    methods.any(|method: &Method| pointcut.matches_method_with_introductions(method, target_type, has_introductions))
}

/// 从候选中筛选作用于 `target_type` 的 Advisor，并按优先级排序
pub fn find_advisors_that_can_apply(
    candidates: &[Arc<dyn Advisor>],
    target_type: &TypeDescriptor,
    proxy_target_class: bool,
) -> Vec<Arc<dyn Advisor>> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let introduced = introduced_interfaces(candidates, target_type);
    let mut eligible: Vec<Arc<dyn Advisor>> = candidates
        .iter()
        .filter(|advisor| can_apply(advisor.as_ref(), target_type, &introduced, proxy_target_class))
        .cloned()
        .collect();
    sort_advisors(&mut eligible);

    tracing::trace!(
        "{} of {} candidate advisors apply to {}",
        eligible.len(),
        candidates.len(),
        target_type.name()
    );
    eligible
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advice::{Advice, IntroductionInterceptor, MethodInterceptor};
    use crate::advisor::{DefaultIntroductionAdvisor, DefaultPointcutAdvisor};
    use crate::invocation::MethodInvocation;
    use crate::pointcut::PointcutExpression;
    use chimera_beans::{value, Value};

    struct OrderServiceImpl;

    fn order_service() -> Arc<TypeDescriptor> {
        TypeDescriptor::builder::<OrderServiceImpl>("OrderServiceImpl")
            .interface(Interface::new("OrderService").method("place_order", &["String"]))
            .build()
    }

    fn noop() -> Advice {
        Advice::before(|_| Ok(()))
    }

    struct Lockable;

    impl MethodInterceptor for Lockable {
        fn invoke(&self, invocation: &mut MethodInvocation) -> anyhow::Result<Value> {
            match invocation.method().name() {
                "is_locked" => Ok(value(false)),
                _ => invocation.proceed(),
            }
        }
    }

    impl IntroductionInterceptor for Lockable {
        fn implements_interface(&self, interface: &str) -> bool {
            interface == "Lockable"
        }
    }

    fn lockable() -> Arc<dyn Advisor> {
        DefaultIntroductionAdvisor::new(
            Arc::new(Lockable),
            vec![Interface::new("Lockable").method("is_locked", &[])],
        )
        .unwrap()
        .shared()
    }

    #[test]
    fn test_type_and_method_filters() {
        let ty = order_service();
        let on_orders = DefaultPointcutAdvisor::new(PointcutExpression::execution("* OrderService.place_*(..)").unwrap(), noop());
        let on_users = DefaultPointcutAdvisor::new(PointcutExpression::type_pattern("UserService"), noop());
        let no_method = DefaultPointcutAdvisor::new(PointcutExpression::method_pattern("cancel"), noop());

        assert!(can_apply(&on_orders, &ty, &[], false));
        assert!(!can_apply(&on_users, &ty, &[], false));
        assert!(!can_apply(&no_method, &ty, &[], false));
    }

    struct ReportServiceImpl;

    #[test]
    fn test_own_methods_only_visible_to_subclass_proxy() {
        let ty = TypeDescriptor::builder::<ReportServiceImpl>("ReportServiceImpl")
            .interface(Interface::new("ReportService").method("render", &[]))
            .method("rebuild_index", &[])
            .build();
        let on_internal = DefaultPointcutAdvisor::new(PointcutExpression::method_pattern("rebuild_index"), noop());
        let on_render = DefaultPointcutAdvisor::new(PointcutExpression::method_pattern("render"), noop());

        assert!(!can_apply(&on_internal, &ty, &[], false));
        assert!(can_apply(&on_internal, &ty, &[], true));
        assert!(can_apply(&on_render, &ty, &[], false));

        struct Plain;
        let plain = TypeDescriptor::builder::<Plain>("Plain").method("rebuild_index", &[]).build();
        assert!(can_apply(&on_internal, &plain, &[], false));
    }

    #[test]
    fn test_introduced_methods_count_as_effective() {
        let ty = order_service();
        let candidates = vec![
            DefaultPointcutAdvisor::new(PointcutExpression::method_pattern("is_locked"), noop()).shared(),
            lockable(),
        ];

        assert!(!can_apply(candidates[0].as_ref(), &ty, &[], false));
        assert!(has_matching_introductions(&candidates, &ty));

        let eligible = find_advisors_that_can_apply(&candidates, &ty, false);
        assert_eq!(eligible.len(), 2);
    }

    #[test]
    fn test_result_sorted_by_order() {
        let ty = order_service();
        let candidates = vec![
            DefaultPointcutAdvisor::for_all(noop()).with_name("unordered").shared(),
            DefaultPointcutAdvisor::for_all(noop()).with_name("second").with_order(2).shared(),
            DefaultPointcutAdvisor::for_all(noop()).with_name("first").with_order(1).shared(),
        ];
        let names: Vec<String> = find_advisors_that_can_apply(&candidates, &ty, false)
            .iter()
            .map(|a| a.name().to_string())
            .collect();
        assert_eq!(names, vec!["first", "second", "unordered"]);
    }
}
