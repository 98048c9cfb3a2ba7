//! The radix tree nodes.

use crate::method_map::MethodMap;
use crate::params::Params;

/// The kind of one path-template segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SegmentKind {
    /// A fixed segment ("users", "api").
    Static,
    /// A named placeholder ("{id}").
    Param(String),
    /// A trailing catch-all ("*rest").
    Wildcard(String),
}

fn parse_segments(path: &str) -> Vec<(String, SegmentKind)> {
    path.split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| {
            if let Some(name) = segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                (segment.to_string(), SegmentKind::Param(name.to_string()))
            } else if let Some(name) = segment.strip_prefix('*') {
                (segment.to_string(), SegmentKind::Wildcard(name.to_string()))
            } else {
                (segment.to_string(), SegmentKind::Static)
            }
        })
        .collect()
}

/// One node of the route tree.
///
/// Static children are kept sorted for binary search; at most one
/// placeholder child and one wildcard child exist per node. Looking up
/// the same template twice lands on the same node, which is what makes
/// subroute registration idempotent.
#[derive(Debug, Clone)]
pub struct Node<T> {
    segment: String,
    kind: SegmentKind,
    methods: Option<MethodMap<T>>,
    static_children: Vec<Node<T>>,
    param_child: Option<Box<Node<T>>>,
    wildcard_child: Option<Box<Node<T>>>,
}

impl<T> Default for Node<T> {
    fn default() -> Self {
        Self::root()
    }
}

impl<T> Node<T> {
    /// Creates the tree root.
    #[must_use]
    pub fn root() -> Self {
        Self {
            segment: String::new(),
            kind: SegmentKind::Static,
            methods: None,
            static_children: Vec::new(),
            param_child: None,
            wildcard_child: None,
        }
    }

    /// Returns the method map at a template path, creating nodes on the
    /// way. Repeated calls with the same template return the same map.
    pub fn methods_at(&mut self, path: &str) -> &mut MethodMap<T> {
        let segments = parse_segments(path);
        let node = self.descend(&segments);
        node.methods.get_or_insert_with(MethodMap::new)
    }

    fn descend(&mut self, segments: &[(String, SegmentKind)]) -> &mut Node<T> {
        let Some((segment, kind)) = segments.first() else {
            return self;
        };
        let rest = &segments[1..];

        match kind {
            SegmentKind::Static => {
                let position = match self
                    .static_children
                    .binary_search_by(|c| c.segment.as_str().cmp(segment.as_str()))
                {
                    Ok(found) => found,
                    Err(insert_at) => {
                        self.static_children.insert(
                            insert_at,
                            Node {
                                segment: segment.clone(),
                                kind: SegmentKind::Static,
                                methods: None,
                                static_children: Vec::new(),
                                param_child: None,
                                wildcard_child: None,
                            },
                        );
                        insert_at
                    }
                };
                self.static_children[position].descend(rest)
            }
            SegmentKind::Param(name) => {
                if self.param_child.is_none() {
                    self.param_child = Some(Box::new(Node {
                        segment: segment.clone(),
                        kind: SegmentKind::Param(name.clone()),
                        methods: None,
                        static_children: Vec::new(),
                        param_child: None,
                        wildcard_child: None,
                    }));
                }
                self.param_child
                    .as_mut()
                    .expect("param child just ensured")
                    .descend(rest)
            }
            SegmentKind::Wildcard(name) => {
                assert!(
                    rest.is_empty(),
                    "wildcard must be the last segment in a path template"
                );
                if self.wildcard_child.is_none() {
                    self.wildcard_child = Some(Box::new(Node {
                        segment: segment.clone(),
                        kind: SegmentKind::Wildcard(name.clone()),
                        methods: None,
                        static_children: Vec::new(),
                        param_child: None,
                        wildcard_child: None,
                    }));
                }
                self.wildcard_child
                    .as_mut()
                    .expect("wildcard child just ensured")
            }
        }
    }

    /// Matches a concrete path, capturing placeholder values.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<(&MethodMap<T>, Params)> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut params = Params::new();
        self.match_segments(&segments, &mut params)
            .map(|methods| (methods, params))
    }

    fn match_segments<'a>(
        &'a self,
        segments: &[&str],
        params: &mut Params,
    ) -> Option<&'a MethodMap<T>> {
        let Some((segment, rest)) = segments.split_first() else {
            return self.methods.as_ref();
        };

        // Fixed segments win over placeholders.
        if let Ok(found) = self
            .static_children
            .binary_search_by(|c| c.segment.as_str().cmp(segment))
        {
            if let Some(matched) = self.static_children[found].match_segments(rest, params) {
                return Some(matched);
            }
        }

        if let Some(child) = &self.param_child {
            if let SegmentKind::Param(name) = &child.kind {
                params.insert(name.clone(), (*segment).to_string());
                if let Some(matched) = child.match_segments(rest, params) {
                    return Some(matched);
                }
                params.pop();
            }
        }

        if let Some(child) = &self.wildcard_child {
            if let SegmentKind::Wildcard(name) = &child.kind {
                params.insert(name.clone(), segments.join("/"));
                return child.methods.as_ref();
            }
        }

        None
    }
}
