use crate::error::{ServerError, ServerResult};
use crate::handler::Handler;
use crate::http::{Method, ParamValue, Params};
use crate::middleware::{MiddlewareEntry, Position};
use std::collections::HashMap;

/// How one path segment matches, derived once from its syntax at
/// registration time: `:name` is dynamic, `...name` is catch-all,
/// anything else is a literal.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentKind {
    Static,
    Dynamic,
    CatchAll,
}

impl SegmentKind {
    pub fn of(segment: &str) -> SegmentKind {
        if segment.starts_with("...") {
            SegmentKind::CatchAll
        } else if segment.starts_with(':') {
            SegmentKind::Dynamic
        } else {
            SegmentKind::Static
        }
    }
}

/// One node of the route tree, keyed by the segment text as written in
/// the route definition. The tree is built once at startup and is
/// read-only while serving; concurrent resolutions share it freely.
pub struct TrieNode {
    segment: String,
    kind: SegmentKind,
    children: Vec<TrieNode>,
    controllers: HashMap<Method, Box<dyn Handler>>,
    upgrade: Option<Box<dyn Handler>>,
    middlewares: Vec<MiddlewareEntry>,
    has_controllers: bool,
}

impl std::fmt::Debug for TrieNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrieNode")
            .field("segment", &self.segment)
            .field("kind", &self.kind)
            .field("children", &self.children)
            .field("has_controllers", &self.has_controllers)
            .finish_non_exhaustive()
    }
}

impl TrieNode {
    pub(crate) fn root() -> TrieNode {
        TrieNode::new("")
    }

    fn new(segment: &str) -> TrieNode {
        TrieNode {
            segment: segment.to_string(),
            kind: SegmentKind::of(segment),
            children: Vec::new(),
            controllers: HashMap::new(),
            upgrade: None,
            middlewares: Vec::new(),
            has_controllers: false,
        }
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    pub fn kind(&self) -> SegmentKind {
        self.kind
    }

    pub fn has_controllers(&self) -> bool {
        self.has_controllers
    }

    pub fn has_method(&self, method: Method) -> bool {
        self.controllers.contains_key(&method)
    }

    pub fn middleware_names(&self) -> Vec<&str> {
        self.middlewares.iter().map(|m| m.name()).collect()
    }

    /// Parameter name without the `:` / `...` prefix.
    fn param_name(&self) -> &str {
        match self.kind {
            SegmentKind::Dynamic => &self.segment[1..],
            SegmentKind::CatchAll => &self.segment[3..],
            SegmentKind::Static => &self.segment,
        }
    }

    pub(crate) fn controller(&self, method: Method) -> Option<Box<dyn Handler>> {
        self.controllers.get(&method).cloned()
    }

    pub(crate) fn upgrade_handler(&self) -> Option<Box<dyn Handler>> {
        self.upgrade.clone()
    }

    /// Walks/creates nodes segment by segment. `has_controllers` is set
    /// only on the final node, never on intermediate ancestors, and is
    /// never cleared by a later registration of the same path.
    pub(crate) fn insert(
        &mut self,
        segments: &[&str],
        has_controllers: bool,
    ) -> ServerResult<&mut TrieNode> {
        let mut curr = self;
        for &segment in segments {
            curr = curr.child_entry(segment)?;
        }
        if has_controllers {
            curr.has_controllers = true;
        }
        Ok(curr)
    }

    // Finds the child with this exact literal, or creates it. Creating
    // a second dynamic or catch-all child under one parent would make
    // matching ambiguous, so it fails instead.
    fn child_entry(&mut self, segment: &str) -> ServerResult<&mut TrieNode> {
        if let Some(i) = self.children.iter().position(|c| c.segment == segment) {
            return Ok(&mut self.children[i]);
        }

        let kind = SegmentKind::of(segment);
        if kind != SegmentKind::Static {
            if let Some(existing) = self.children.iter().find(|c| c.kind == kind) {
                return Err(ServerError::RouteConflict(format!(
                    "segment \"{}\" conflicts with already registered \"{}\"",
                    segment, existing.segment
                )));
            }
        }

        self.children.push(TrieNode::new(segment));
        let last = self.children.len() - 1;
        Ok(&mut self.children[last])
    }

    /// Registers a controller for one method. Duplicate registration
    /// overwrites: last write wins, which keeps reloads idempotent.
    pub(crate) fn register_controller(&mut self, method: Method, handler: Box<dyn Handler>) {
        self.controllers.insert(method, handler);
        self.has_controllers = true;
    }

    pub(crate) fn register_upgrade(&mut self, handler: Box<dyn Handler>) {
        self.upgrade = Some(handler);
    }

    /// Splices a middleware entry into this node's local list according
    /// to its position directive. Directives can only reference entries
    /// already registered on this same node.
    pub(crate) fn add_middleware(
        &mut self,
        entry: MiddlewareEntry,
        position: Position,
    ) -> ServerResult<()> {
        if self.middlewares.iter().any(|m| m.name() == entry.name()) {
            return Err(ServerError::MiddlewareConflict(format!(
                "middleware \"{}\" already registered on this node",
                entry.name()
            )));
        }

        match position {
            Position::Append => self.middlewares.push(entry),
            Position::First => self.middlewares.insert(0, entry),
            Position::Before(name) => {
                let index = self
                    .middlewares
                    .iter()
                    .position(|m| m.name() == name)
                    .ok_or_else(|| {
                        ServerError::MiddlewareConflict(format!(
                            "cannot register \"{}\" before \"{}\": no such middleware on this node",
                            entry.name(),
                            name
                        ))
                    })?;
                self.middlewares.insert(index, entry);
            }
        }

        Ok(())
    }

    /// Resolves a request path against the tree. Returns the single
    /// best-matching node plus the parameters bound along the way, or
    /// `None` when nothing matches the full segment sequence. Whether
    /// the matched node supports the request method is the dispatcher's
    /// concern, not the resolver's.
    pub fn resolve<'a>(&'a self, segments: &[&str]) -> Option<Resolved<'a>> {
        let mut params = Params::new();
        let mut trail = Vec::new();

        if resolve_at(self, segments, 0, &mut params, &mut trail) {
            let node = trail.last().copied()?;
            Some(Resolved { node, params, trail })
        } else {
            None
        }
    }
}

// Depth-first search with backtracking. Priority at every level is
// static > dynamic > catch-all; a static prefix that dead-ends further
// down must not block a dynamic or catch-all sibling at an ancestor
// level. On success the frames that committed leave their nodes on
// `trail` (root first), and each frame binds its own parameter after
// its subtree succeeded, so failed branches never leave bindings
// behind.
fn resolve_at<'a>(
    node: &'a TrieNode,
    segments: &[&str],
    index: usize,
    params: &mut Params,
    trail: &mut Vec<&'a TrieNode>,
) -> bool {
    trail.push(node);

    if index == segments.len() {
        return true;
    }

    if let Some(child) = node.children.iter().find(|c| c.segment == segments[index]) {
        if resolve_at(child, segments, index + 1, params, trail) {
            return true;
        }
    }

    if let Some(child) = node.children.iter().find(|c| c.kind == SegmentKind::Dynamic) {
        if resolve_at(child, segments, index + 1, params, trail) {
            params.insert(
                child.param_name().to_string(),
                ParamValue::Single(segments[index].to_string()),
            );
            return true;
        }
    }

    if let Some(child) = node.children.iter().find(|c| c.kind == SegmentKind::CatchAll) {
        // variable-length consumption: try every split point, shortest
        // first, and keep the first one whose remainder matches
        for split in index..=segments.len() {
            if resolve_at(child, segments, split, params, trail) {
                params.insert(
                    child.param_name().to_string(),
                    ParamValue::Many(segments[index..split].iter().map(|s| s.to_string()).collect()),
                );
                return true;
            }
        }
    }

    trail.pop();
    false
}

/// The outcome of one successful resolution: the matched node, the
/// captured parameters, and the exact root-to-leaf decision path the
/// search committed to. Owned by a single request.
pub struct Resolved<'a> {
    pub node: &'a TrieNode,
    pub params: Params,
    trail: Vec<&'a TrieNode>,
}

impl<'a> Resolved<'a> {
    pub fn trail(&self) -> &[&'a TrieNode] {
        &self.trail
    }

    /// Assembles the ordered middleware list for this resolution by
    /// replaying the resolver's decision path. Ancestors contribute
    /// only bubbling entries; the leaf contributes all of its entries
    /// regardless of `bubble`. Local order is preserved and outer
    /// layers come before inner ones.
    pub fn middlewares(&self) -> Vec<&'a MiddlewareEntry> {
        let mut collected = Vec::new();
        let Some((leaf, ancestors)) = self.trail.split_last() else {
            return collected;
        };

        for node in ancestors {
            for entry in &node.middlewares {
                if entry.bubble() {
                    collected.push(entry);
                }
            }
        }
        collected.extend(leaf.middlewares.iter());

        collected
    }

    pub(crate) fn into_params(self) -> Params {
        self.params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Request, Response};
    use crate::middleware::{Middleware, MiddlewareResult, Next};

    fn noop_controller() -> Box<dyn Handler> {
        Box::new(|_req: Request| async { Ok(Response::text("ok")) })
    }

    fn noop_middleware() -> impl Middleware {
        |req: Request, next: Next| -> MiddlewareResult { Box::pin(next.proceed(req)) }
    }

    fn entry(name: &str, bubble: bool) -> MiddlewareEntry {
        MiddlewareEntry::new(name, bubble, noop_middleware())
    }

    fn tree(routes: &[&[&str]]) -> TrieNode {
        let mut root = TrieNode::root();
        for segments in routes {
            root.insert(segments, true).unwrap();
        }
        root
    }

    #[test]
    fn static_route_resolves_with_empty_params() {
        let root = tree(&[&["api", "users", "list"]]);
        let resolved = root.resolve(&["api", "users", "list"]).unwrap();
        assert_eq!(resolved.node.segment(), "list");
        assert!(resolved.params.is_empty());
    }

    #[test]
    fn dynamic_segment_binds_single_value() {
        let root = tree(&[&["a", ":id"]]);
        let resolved = root.resolve(&["a", "123"]).unwrap();
        assert_eq!(
            resolved.params.get("id"),
            Some(&ParamValue::Single("123".to_string()))
        );
    }

    #[test]
    fn catch_all_binds_consumed_slice() {
        let root = tree(&[&["a", "...rest"]]);
        let resolved = root.resolve(&["a", "1", "2", "3"]).unwrap();
        assert_eq!(
            resolved.params.get("rest"),
            Some(&ParamValue::Many(vec![
                "1".to_string(),
                "2".to_string(),
                "3".to_string()
            ]))
        );
    }

    #[test]
    fn static_child_wins_over_dynamic_sibling() {
        let root = tree(&[&["a", "b"], &["a", ":x"]]);
        let resolved = root.resolve(&["a", "b"]).unwrap();
        assert_eq!(resolved.node.kind(), SegmentKind::Static);
        assert!(resolved.params.is_empty());
    }

    #[test]
    fn dead_end_static_prefix_backtracks_to_dynamic() {
        // /a/b/c exists; /a/:x/d exists. Request a/b/d must not commit
        // to the static "b" and give up: it has to back out and bind
        // x = "b".
        let root = tree(&[&["a", "b", "c"], &["a", ":x", "d"]]);
        let resolved = root.resolve(&["a", "b", "d"]).unwrap();
        assert_eq!(resolved.node.segment(), "d");
        assert_eq!(
            resolved.params.get("x"),
            Some(&ParamValue::Single("b".to_string()))
        );
    }

    #[test]
    fn catch_all_with_static_tail_resolves_any_depth() {
        let root = tree(&[&["getId", "...ids", "details"]]);
        let resolved = root.resolve(&["getId", "1", "2", "3", "4", "details"]).unwrap();
        assert_eq!(resolved.node.segment(), "details");
        assert_eq!(
            resolved.params.get("ids"),
            Some(&ParamValue::Many(vec![
                "1".to_string(),
                "2".to_string(),
                "3".to_string(),
                "4".to_string()
            ]))
        );
    }

    #[test]
    fn unknown_path_does_not_resolve() {
        let root = tree(&[&["home"]]);
        assert!(root.resolve(&["nope"]).is_none());
        assert!(root.resolve(&["home", "deeper"]).is_none());
    }

    #[test]
    fn second_dynamic_child_is_a_build_error() {
        let mut root = tree(&[&["a", ":id"]]);
        let err = root.insert(&["a", ":slug"], true).unwrap_err();
        assert!(matches!(err, ServerError::RouteConflict(_)));
    }

    #[test]
    fn second_catch_all_child_is_a_build_error() {
        let mut root = tree(&[&["a", "...rest"]]);
        let err = root.insert(&["a", "...tail"], true).unwrap_err();
        assert!(matches!(err, ServerError::RouteConflict(_)));
    }

    #[test]
    fn has_controllers_is_set_only_on_the_leaf() {
        let root = tree(&[&["getId", ":id"]]);
        let parent = root.resolve(&["getId"]).unwrap();
        assert!(!parent.node.has_controllers());
        let leaf = root.resolve(&["getId", "anything"]).unwrap();
        assert!(leaf.node.has_controllers());
    }

    #[test]
    fn duplicate_controller_registration_overwrites() {
        let mut root = TrieNode::root();
        let node = root.insert(&["home"], true).unwrap();
        node.register_controller(Method::GET, noop_controller());
        node.register_controller(Method::GET, noop_controller());
        assert!(node.has_method(Method::GET));
        assert_eq!(node.controllers.len(), 1);
    }

    #[test]
    fn run_before_splices_ahead_of_named_entry() {
        let mut root = TrieNode::root();
        root.add_middleware(entry("m1", false), Position::Append).unwrap();
        root.add_middleware(entry("m3", false), Position::Append).unwrap();
        root.add_middleware(entry("m2", false), Position::Before("m3".to_string()))
            .unwrap();
        root.add_middleware(entry("m0", false), Position::First).unwrap();
        assert_eq!(root.middleware_names(), vec!["m0", "m1", "m2", "m3"]);
    }

    #[test]
    fn run_before_unknown_target_is_fatal() {
        let mut root = TrieNode::root();
        let err = root
            .add_middleware(entry("m2", false), Position::Before("m1".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServerError::MiddlewareConflict(_)));
    }

    #[test]
    fn duplicate_middleware_name_is_fatal() {
        let mut root = TrieNode::root();
        root.add_middleware(entry("m1", false), Position::Append).unwrap();
        let err = root.add_middleware(entry("m1", true), Position::Append).unwrap_err();
        assert!(matches!(err, ServerError::MiddlewareConflict(_)));
    }

    #[test]
    fn collector_bubbles_ancestors_and_takes_leaf_whole() {
        let mut root = TrieNode::root();
        root.insert(&["a", "b"], true).unwrap();
        root.add_middleware(entry("R", true), Position::Append).unwrap();
        root.insert(&["a"], false)
            .unwrap()
            .add_middleware(entry("A", false), Position::Append)
            .unwrap();
        root.insert(&["a", "b"], false)
            .unwrap()
            .add_middleware(entry("B", false), Position::Append)
            .unwrap();

        // a is intermediate for /a/b: its non-bubbling A is skipped
        let deep = root.resolve(&["a", "b"]).unwrap();
        let names: Vec<&str> = deep.middlewares().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["R", "B"]);

        // a is the leaf for /a: A runs regardless of bubble
        let shallow = root.resolve(&["a"]).unwrap();
        let names: Vec<&str> = shallow.middlewares().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["R", "A"]);
    }

    #[test]
    fn collector_follows_the_resolver_trail_through_a_catch_all() {
        let mut root = TrieNode::root();
        root.insert(&["files", "...path"], true).unwrap();
        root.insert(&["files"], false)
            .unwrap()
            .add_middleware(entry("F", true), Position::Append)
            .unwrap();
        root.insert(&["files", "...path"], false)
            .unwrap()
            .add_middleware(entry("P", false), Position::Append)
            .unwrap();

        let resolved = root.resolve(&["files", "a", "b", "c"]).unwrap();
        // the catch-all node appears once on the trail no matter how
        // many segments it consumed
        assert_eq!(resolved.trail().len(), 3);
        let names: Vec<&str> = resolved.middlewares().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["F", "P"]);
    }

    #[test]
    fn resolving_the_root_itself_takes_all_root_middleware() {
        let mut root = TrieNode::root();
        root.add_middleware(entry("R", false), Position::Append).unwrap();
        let resolved = root.resolve(&[]).unwrap();
        let names: Vec<&str> = resolved.middlewares().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["R"]);
    }
}
