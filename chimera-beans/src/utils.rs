//! Utility functions for the container

/// Naming convention utilities for bean names
pub mod naming {
    /// Strips the module path (and generic arguments) from a Rust type name.
    ///
    /// # Examples
    ///
    /// ```
    /// use chimera_beans::utils::naming::short_type_name;
    ///
    /// assert_eq!(short_type_name("my_app::service::UserService"), "UserService");
    /// assert_eq!(short_type_name("alloc::vec::Vec<u8>"), "Vec");
    /// ```
    pub fn short_type_name(full: &str) -> &str {
        let without_generics = full.split('<').next().unwrap_or(full);
        without_generics
            .rsplit("::")
            .next()
            .unwrap_or(without_generics)
    }
}

/// Dependency graph utilities
pub mod dependency {
    use std::collections::{HashMap, HashSet};

    /// Dependency graph analysis result
    #[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
    pub enum DependencyValidationError {
        /// Circular dependency detected
        #[error("Circular dependency detected: {}", .cycle.join(" -> "))]
        CircularDependency {
            /// The dependency chain forming the cycle
            cycle: Vec<String>,
        },

        /// Missing dependency detected
        #[error("Bean '{bean}' depends on '{missing}' which is not registered")]
        MissingDependency { bean: String, missing: String },
    }

    /// Validates a `depends_on` graph for cycles and unknown names.
    ///
    /// Beans are visited in sorted order so the reported problem is stable.
    pub fn validate_dependency_graph(
        dependencies: &HashMap<String, Vec<String>>,
    ) -> Result<(), DependencyValidationError> {
        let mut names: Vec<&String> = dependencies.keys().collect();
        names.sort();

        for bean_name in &names {
            for dep in &dependencies[*bean_name] {
                if !dependencies.contains_key(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        bean: (*bean_name).clone(),
                        missing: dep.clone(),
                    });
                }
            }
        }

        let mut visited = HashSet::new();
        let mut path = Vec::new();

        for bean_name in names {
            if !visited.contains(bean_name.as_str()) {
                if let Some(cycle) = detect_cycle_dfs(bean_name, dependencies, &mut visited, &mut path) {
                    return Err(DependencyValidationError::CircularDependency { cycle });
                }
            }
        }

        Ok(())
    }

    /// DFS-based cycle detection
    ///
    /// Returns the cycle (first node repeated at the end) if one is reachable from `node`
    fn detect_cycle_dfs(
        node: &str,
        graph: &HashMap<String, Vec<String>>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(node.to_string());
        path.push(node.to_string());

        for dep in graph.get(node).into_iter().flatten() {
            if let Some(start) = path.iter().position(|x| x == dep) {
                let mut cycle = path[start..].to_vec();
                cycle.push(dep.clone());
                return Some(cycle);
            }
            if !visited.contains(dep) {
                if let Some(cycle) = detect_cycle_dfs(dep, graph, visited, path) {
                    return Some(cycle);
                }
            }
        }

        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    mod naming_tests {
        use super::super::naming::*;

        #[test]
        fn test_short_type_name() {
            assert_eq!(short_type_name("UserService"), "UserService");
            assert_eq!(short_type_name("a::b::OrderService"), "OrderService");
            assert_eq!(short_type_name("std::sync::Arc<a::B>"), "Arc");
        }
    }

    mod dependency_tests {
        use super::super::dependency::*;
        use std::collections::HashMap;

        fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
            edges
                .iter()
                .map(|(name, deps)| (name.to_string(), deps.iter().map(|d| d.to_string()).collect()))
                .collect()
        }

        #[test]
        fn test_validate_missing_dependency() {
            let deps = graph(&[("serviceA", &["serviceB"])]);

            assert_eq!(
                validate_dependency_graph(&deps),
                Err(DependencyValidationError::MissingDependency {
                    bean: "serviceA".into(),
                    missing: "serviceB".into(),
                })
            );
        }

        #[test]
        fn test_validate_circular_dependency() {
            let deps = graph(&[
                ("serviceA", &["serviceB"]),
                ("serviceB", &["serviceC"]),
                ("serviceC", &["serviceA"]),
            ]);

            match validate_dependency_graph(&deps) {
                Err(DependencyValidationError::CircularDependency { cycle }) => {
                    assert_eq!(cycle, vec!["serviceA", "serviceB", "serviceC", "serviceA"]);
                }
                other => panic!("Expected CircularDependency error, got {:?}", other),
            }
        }

        #[test]
        fn test_validate_valid_graph() {
            let deps = graph(&[
                ("config", &[]),
                ("database", &["config"]),
                ("userService", &["database", "config"]),
            ]);

            assert!(validate_dependency_graph(&deps).is_ok());
        }

        #[test]
        fn test_validate_self_dependency() {
            let deps = graph(&[("serviceA", &["serviceA"])]);

            match validate_dependency_graph(&deps) {
                Err(DependencyValidationError::CircularDependency { cycle }) => {
                    assert_eq!(cycle.len(), 2);
                }
                other => panic!("Expected CircularDependency error, got {:?}", other),
            }
        }
    }
}
