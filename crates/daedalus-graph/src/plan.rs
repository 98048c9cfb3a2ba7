//! Per-endpoint resolution plans.

use crate::error::GraphError;
use crate::graph::{Graph, Lifetime};
use crate::key::TypeKey;
use std::collections::HashSet;

/// A frozen resolution plan for one endpoint.
///
/// The order is topological: every node appears after its dependencies, so
/// resources enter in dependency order and release in reverse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    /// Transitive dependency keys in construction order.
    pub order: Vec<TypeKey>,
    /// Whether any transitive node requires a request scope.
    pub scoped: bool,
}

impl Graph {
    /// Computes the resolution plan for the given root dependencies.
    ///
    /// # Errors
    ///
    /// Fails on a dependency cycle or a declared dependency with no
    /// registered node.
    pub fn plan(&self, roots: &[TypeKey]) -> Result<Plan, GraphError> {
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut visiting = Vec::new();
        for root in roots {
            self.visit(*root, None, &mut order, &mut visited, &mut visiting)?;
        }
        let scoped = order.iter().any(|key| {
            self.node(*key)
                .is_some_and(|n| n.is_resource() && n.lifetime() != Lifetime::Singleton)
        });
        Ok(Plan { order, scoped })
    }

    /// Returns `true` when the key transitively requires a request scope.
    #[must_use]
    pub fn requires_scope(&self, key: TypeKey) -> bool {
        self.plan(&[key]).map(|p| p.scoped).unwrap_or(false)
    }

    fn visit(
        &self,
        key: TypeKey,
        dependent: Option<TypeKey>,
        order: &mut Vec<TypeKey>,
        visited: &mut HashSet<TypeKey>,
        visiting: &mut Vec<TypeKey>,
    ) -> Result<(), GraphError> {
        if visited.contains(&key) {
            return Ok(());
        }
        if visiting.contains(&key) {
            let mut path: Vec<String> = visiting
                .iter()
                .skip_while(|k| **k != key)
                .map(|k| k.short_name().to_string())
                .collect();
            path.push(key.short_name().to_string());
            return Err(GraphError::CycleDetected { path });
        }
        let Some(node) = self.node(key) else {
            return Err(GraphError::UnknownDependency {
                dependent: dependent
                    .map(|k| k.short_name().to_string())
                    .unwrap_or_else(|| "<endpoint>".to_string()),
                dependency: key.short_name().to_string(),
            });
        };

        visiting.push(key);
        for dep in node.deps().to_vec() {
            self.visit(dep, Some(key), order, visited, visiting)?;
        }
        visiting.pop();

        visited.insert(key);
        order.push(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ReleaseFn;

    struct Settings;
    struct Pool;
    struct Engine;
    struct Conn;

    fn graph_with_chain() -> Graph {
        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Singleton, &[], |_| async { Ok(Settings) })
            .unwrap();
        graph
            .factory(Lifetime::Reused, &[TypeKey::of::<Settings>()], |_| async {
                Ok(Pool)
            })
            .unwrap();
        graph
            .factory(Lifetime::Reused, &[TypeKey::of::<Pool>()], |_| async {
                Ok(Engine)
            })
            .unwrap();
        graph
    }

    #[test]
    fn test_plan_orders_dependencies_first() {
        let graph = graph_with_chain();
        let plan = graph.plan(&[TypeKey::of::<Engine>()]).unwrap();

        assert_eq!(
            plan.order,
            vec![
                TypeKey::of::<Settings>(),
                TypeKey::of::<Pool>(),
                TypeKey::of::<Engine>()
            ]
        );
        assert!(!plan.scoped);
    }

    #[test]
    fn test_plan_detects_resource() {
        let mut graph = graph_with_chain();
        graph
            .resource(&[TypeKey::of::<Pool>()], |_| async {
                Ok((Conn, Box::pin(async {}) as ReleaseFn))
            })
            .unwrap();

        let plan = graph.plan(&[TypeKey::of::<Conn>()]).unwrap();
        assert!(plan.scoped);
        assert!(graph.requires_scope(TypeKey::of::<Conn>()));
        assert!(!graph.requires_scope(TypeKey::of::<Engine>()));
    }

    #[test]
    fn test_plan_rejects_cycle() {
        struct A;
        struct B;

        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Reused, &[TypeKey::of::<B>()], |_| async { Ok(A) })
            .unwrap();
        graph
            .factory(Lifetime::Reused, &[TypeKey::of::<A>()], |_| async { Ok(B) })
            .unwrap();

        let err = graph.plan(&[TypeKey::of::<A>()]).unwrap_err();
        match err {
            GraphError::CycleDetected { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.len() >= 3);
            }
            other => panic!("expected cycle, got {other}"),
        }
    }

    #[test]
    fn test_plan_rejects_unknown_dependency() {
        struct Lonely;

        let mut graph = Graph::new();
        graph
            .factory(Lifetime::Reused, &[TypeKey::of::<Engine>()], |_| async {
                Ok(Lonely)
            })
            .unwrap();

        let err = graph.plan(&[TypeKey::of::<Lonely>()]).unwrap_err();
        assert!(matches!(err, GraphError::UnknownDependency { .. }));
    }

    #[test]
    fn test_plan_is_deterministic() {
        let graph = graph_with_chain();
        let a = graph.plan(&[TypeKey::of::<Engine>()]).unwrap();
        let b = graph.plan(&[TypeKey::of::<Engine>()]).unwrap();
        assert_eq!(a, b);
    }
}
