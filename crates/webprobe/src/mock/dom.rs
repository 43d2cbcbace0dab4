//! In-memory DOM driver.
//!
//! [`FakeDom`] implements [`BrowserDriver`] over a plain node tree. Page
//! behaviour is scripted with handlers that run on click, resize and
//! navigation. Handlers can change the tree right away or schedule changes
//! for later through [`Effects::defer`]. Scheduled changes are applied
//! lazily: every driver call first applies whatever has come due on the
//! shared [`Clock`], so a [`FakeClock`](crate::FakeClock) advanced by the
//! retry loop's sleeps is enough to make the page "render".

use super::selector::SelectorList;
use crate::clock::Clock;
use crate::driver::{BrowserDriver, ElementHandle, Size};
use crate::result::{WebprobeError, WebprobeResult};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

const HANDLE_PREFIX: &str = "fake-";

/// Shortest delay for a scheduled change; keeps follow-up changes strictly
/// after the change that scheduled them
const MIN_DELAY: Duration = Duration::from_millis(1);

/// Default window size of a fresh page
pub const DEFAULT_WINDOW: Size = Size::new(1280, 720);

/// Index of a node in a [`DomTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    fn handle(self) -> ElementHandle {
        ElementHandle::new(format!("{HANDLE_PREFIX}{}", self.0))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Description of a node to insert
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    size: Size,
}

impl NodeSpec {
    /// Element with the given tag
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into().to_ascii_lowercase(),
            ..Self::default()
        }
    }

    /// Set the `id` attribute
    #[must_use]
    pub fn id(self, id: impl Into<String>) -> Self {
        self.attr("id", id)
    }

    /// Set the `class` attribute (space-separated)
    #[must_use]
    pub fn class(self, classes: impl Into<String>) -> Self {
        self.attr("class", classes)
    }

    /// Set an attribute
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.attrs.insert(name.into(), value.into());
        self
    }

    /// Set the node's own text
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Set the rendered size
    #[must_use]
    pub const fn size(mut self, width: u32, height: u32) -> Self {
        self.size = Size::new(width, height);
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    tag: String,
    attrs: BTreeMap<String, String>,
    text: String,
    size: Size,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
    attached: bool,
}

/// Node tree behind a [`FakeDom`].
///
/// Nodes are never reused: removing a subtree detaches it, and handles to
/// detached nodes read as stale.
#[derive(Debug, Clone)]
pub struct DomTree {
    nodes: Vec<Node>,
}

impl Default for DomTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DomTree {
    /// Tree holding only an empty `body`
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: vec![Node {
                tag: "body".to_string(),
                attrs: BTreeMap::new(),
                text: String::new(),
                size: DEFAULT_WINDOW,
                parent: None,
                children: Vec::new(),
                attached: true,
            }],
        }
    }

    /// The `body` node
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a new last child under `parent`
    pub fn append(&mut self, parent: NodeId, spec: NodeSpec) -> NodeId {
        let id = NodeId(self.nodes.len());
        let attached = self.is_attached(parent);
        self.nodes.push(Node {
            tag: spec.tag,
            attrs: spec.attrs,
            text: spec.text,
            size: spec.size,
            parent: Some(parent),
            children: Vec::new(),
            attached,
        });
        if let Some(p) = self.nodes.get_mut(parent.0) {
            p.children.push(id);
        }
        id
    }

    /// Detach `node` and its subtree. The root cannot be removed.
    pub fn remove(&mut self, node: NodeId) {
        if node == self.root() {
            return;
        }
        if let Some(parent) = self.parent(node) {
            if let Some(p) = self.nodes.get_mut(parent.0) {
                p.children.retain(|&c| c != node);
            }
        }
        let mut stack = vec![node];
        while let Some(n) = stack.pop() {
            if let Some(entry) = self.nodes.get_mut(n.0) {
                entry.attached = false;
                stack.extend(entry.children.iter().copied());
            }
        }
    }

    /// Replace `node` with a fresh node built from `spec`, at the same
    /// position. Handles to the old node go stale.
    pub fn replace(&mut self, node: NodeId, spec: NodeSpec) -> Option<NodeId> {
        let parent = self.parent(node)?;
        let position = self.nodes.get(parent.0)?.children.iter().position(|&c| c == node)?;
        self.remove(node);
        let fresh = self.append(parent, spec);
        if let Some(p) = self.nodes.get_mut(parent.0) {
            let _ = p.children.pop();
            p.children.insert(position, fresh);
        }
        Some(fresh)
    }

    /// Whether `node` is still part of the document
    #[must_use]
    pub fn is_attached(&self, node: NodeId) -> bool {
        self.nodes.get(node.0).is_some_and(|n| n.attached)
    }

    /// Parent of `node`
    #[must_use]
    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.get(node.0).and_then(|n| n.parent)
    }

    /// Tag name, lowercase
    #[must_use]
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        self.nodes.get(node.0).map(|n| n.tag.as_str())
    }

    /// Attribute value
    #[must_use]
    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        self.nodes
            .get(node.0)
            .and_then(|n| n.attrs.get(name))
            .map(String::as_str)
    }

    /// Set an attribute
    pub fn set_attr(&mut self, node: NodeId, name: impl Into<String>, value: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            let _ = n.attrs.insert(name.into(), value.into());
        }
    }

    /// Remove an attribute
    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            let _ = n.attrs.remove(name);
        }
    }

    /// Set the node's own text
    pub fn set_text(&mut self, node: NodeId, text: impl Into<String>) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.text = text.into();
        }
    }

    /// Set the rendered size
    pub fn set_size(&mut self, node: NodeId, size: Size) {
        if let Some(n) = self.nodes.get_mut(node.0) {
            n.size = size;
        }
    }

    /// Rendered size
    #[must_use]
    pub fn size(&self, node: NodeId) -> Option<Size> {
        self.nodes.get(node.0).map(|n| n.size)
    }

    /// Rendered text: own text followed by the rendered text of each child
    #[must_use]
    pub fn text(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        if let Some(n) = self.nodes.get(node.0) {
            out.push_str(&n.text);
            for &child in &n.children {
                self.collect_text(child, out);
            }
        }
    }

    /// First attached node whose `id` attribute is `id`
    #[must_use]
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root())
            .into_iter()
            .find(|&n| self.attr(n, "id") == Some(id))
    }

    /// Rewrite the text of the node with `id`; returns false if absent
    pub fn update_text(&mut self, id: &str, f: impl FnOnce(&str) -> String) -> bool {
        let Some(node) = self.find_by_id(id) else {
            return false;
        };
        let next = f(&self.text(node));
        self.set_text(node, next);
        true
    }

    /// Attached descendants of `node` in document order, excluding `node`
    #[must_use]
    pub fn descendants(&self, node: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self
            .nodes
            .get(node.0)
            .map(|n| n.children.iter().rev().copied().collect())
            .unwrap_or_default();
        while let Some(n) = stack.pop() {
            out.push(n);
            if let Some(entry) = self.nodes.get(n.0) {
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }
}

type Action = Box<dyn FnOnce(&mut Effects<'_>) + Send>;
type ClickHandler = Box<dyn FnMut(&mut Effects<'_>, NodeId) + Send>;
type ResizeHandler = Box<dyn FnMut(&mut Effects<'_>) + Send>;
type NavigateHandler = Box<dyn FnMut(&mut Effects<'_>, &str) -> WebprobeResult<()> + Send>;

struct Scheduled {
    due: Duration,
    seq: u64,
    action: Action,
}

/// Mutable page state that handlers and scheduled changes may touch
struct World {
    tree: DomTree,
    window: Size,
    url: Option<String>,
    scheduled: Vec<Scheduled>,
    next_seq: u64,
}

impl World {
    fn schedule(&mut self, due: Duration, action: Action) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.scheduled.push(Scheduled { due, seq, action });
    }

    /// Run every scheduled change due at or before `now`, earliest first
    fn settle(&mut self, now: Duration) {
        loop {
            let next = self
                .scheduled
                .iter()
                .enumerate()
                .filter(|(_, s)| s.due <= now)
                .min_by_key(|(_, s)| (s.due, s.seq))
                .map(|(i, _)| i);
            let Some(index) = next else { break };
            let Scheduled { due, action, .. } = self.scheduled.swap_remove(index);
            action(&mut Effects { world: self, now: due });
        }
    }
}

/// What a handler or a scheduled change can do to the page
pub struct Effects<'a> {
    world: &'a mut World,
    now: Duration,
}

impl Effects<'_> {
    /// The node tree
    pub fn tree(&mut self) -> &mut DomTree {
        &mut self.world.tree
    }

    /// Time on the page clock when this change runs
    #[must_use]
    pub const fn now(&self) -> Duration {
        self.now
    }

    /// Current window size
    #[must_use]
    pub const fn window(&self) -> Size {
        self.world.window
    }

    /// Run `action` once `delay` has passed on the page clock
    pub fn defer<F>(&mut self, delay: Duration, action: F)
    where
        F: FnOnce(&mut Effects<'_>) + Send + 'static,
    {
        let due = self.now + delay.max(MIN_DELAY);
        self.world.schedule(due, Box::new(action));
    }
}

impl fmt::Debug for Effects<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effects")
            .field("now", &self.now)
            .field("window", &self.world.window)
            .finish_non_exhaustive()
    }
}

struct State {
    world: World,
    clicks: HashMap<NodeId, Vec<ClickHandler>>,
    resizes: Vec<ResizeHandler>,
    navigations: Vec<NavigateHandler>,
    stale_reads: usize,
    disconnected: bool,
    history: Vec<String>,
}

/// In-memory [`BrowserDriver`] for unit tests.
///
/// ```ignore
/// let clock = Arc::new(FakeClock::new());
/// let dom = FakeDom::new(clock.clone());
/// let button = dom.mutate(|tree| tree.append(tree.root(), NodeSpec::new("button")));
/// dom.on_click(button, |fx, _| {
///     fx.defer(Duration::from_millis(120), |fx| {
///         fx.tree().update_text("counter-value", |_| "1".into());
///     });
/// });
/// ```
pub struct FakeDom {
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl FakeDom {
    /// Empty page on the given clock
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(State {
                world: World {
                    tree: DomTree::new(),
                    window: DEFAULT_WINDOW,
                    url: None,
                    scheduled: Vec::new(),
                    next_seq: 0,
                },
                clicks: HashMap::new(),
                resizes: Vec::new(),
                navigations: Vec::new(),
                stale_reads: 0,
                disconnected: false,
                history: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock, apply due changes, fail if disconnected, and record the call
    fn enter(&self, call: String) -> WebprobeResult<MutexGuard<'_, State>> {
        let mut state = self.lock();
        state.world.settle(self.clock.now());
        if state.disconnected {
            return Err(WebprobeError::driver(format!(
                "session terminated (during {call})"
            )));
        }
        state.history.push(call);
        Ok(state)
    }

    /// Edit the tree directly, after applying due changes
    pub fn mutate<R>(&self, f: impl FnOnce(&mut DomTree) -> R) -> R {
        let mut state = self.lock();
        state.world.settle(self.clock.now());
        f(&mut state.world.tree)
    }

    /// Schedule a change `delay` from now
    pub fn defer<F>(&self, delay: Duration, action: F)
    where
        F: FnOnce(&mut Effects<'_>) + Send + 'static,
    {
        let now = self.clock.now();
        let mut state = self.lock();
        state.world.settle(now);
        Effects {
            world: &mut state.world,
            now,
        }
        .defer(delay, action);
    }

    /// Run `handler` when `node` or one of its descendants is clicked.
    /// The handler receives the clicked node.
    pub fn on_click<F>(&self, node: NodeId, handler: F)
    where
        F: FnMut(&mut Effects<'_>, NodeId) + Send + 'static,
    {
        self.lock()
            .clicks
            .entry(node)
            .or_default()
            .push(Box::new(handler));
    }

    /// Run `handler` after every window resize
    pub fn on_resize<F>(&self, handler: F)
    where
        F: FnMut(&mut Effects<'_>) + Send + 'static,
    {
        self.lock().resizes.push(Box::new(handler));
    }

    /// Run `handler` on navigation; an error fails the navigation
    pub fn on_navigate<F>(&self, handler: F)
    where
        F: FnMut(&mut Effects<'_>, &str) -> WebprobeResult<()> + Send + 'static,
    {
        self.lock().navigations.push(Box::new(handler));
    }

    /// Make the next `count` element reads fail as stale
    pub fn inject_stale_reads(&self, count: usize) {
        self.lock().stale_reads = count;
    }

    /// Simulate a dead session: every call fails with a driver error
    pub fn disconnect(&self) {
        self.lock().disconnected = true;
    }

    /// Undo [`FakeDom::disconnect`]
    pub fn reconnect(&self) {
        self.lock().disconnected = false;
    }

    /// Calls received so far, as `method:argument` strings
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.lock().history.clone()
    }

    /// Whether a call to `method` was recorded
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_count(method) > 0
    }

    /// Number of recorded calls to `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        let prefix = format!("{method}:");
        self.lock()
            .history
            .iter()
            .filter(|c| c.starts_with(&prefix) || c.as_str() == method)
            .count()
    }

    /// Forget recorded calls
    pub fn clear_history(&self) {
        self.lock().history.clear();
    }

    /// Last URL navigated to
    #[must_use]
    pub fn current_url(&self) -> Option<String> {
        self.lock().world.url.clone()
    }

    /// Number of scheduled changes not yet applied
    #[must_use]
    pub fn pending_changes(&self) -> usize {
        let mut state = self.lock();
        state.world.settle(self.clock.now());
        state.world.scheduled.len()
    }
}

impl fmt::Debug for FakeDom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("FakeDom")
            .field("nodes", &state.world.tree.nodes.len())
            .field("window", &state.world.window)
            .field("scheduled", &state.world.scheduled.len())
            .finish_non_exhaustive()
    }
}

/// Resolve a handle to an attached node
fn resolve(tree: &DomTree, handle: &ElementHandle) -> WebprobeResult<NodeId> {
    let index = handle
        .id()
        .strip_prefix(HANDLE_PREFIX)
        .and_then(|n| n.parse::<usize>().ok())
        .ok_or_else(|| WebprobeError::driver(format!("unknown element handle {handle}")))?;
    let node = NodeId(index);
    if tree.is_attached(node) {
        Ok(node)
    } else {
        Err(WebprobeError::stale(format!(
            "element {handle} is no longer attached to the document"
        )))
    }
}

/// Resolve a handle for a read, honouring injected stale faults
fn resolve_for_read(state: &mut State, handle: &ElementHandle) -> WebprobeResult<NodeId> {
    if state.stale_reads > 0 {
        state.stale_reads -= 1;
        return Err(WebprobeError::stale(format!(
            "element {handle} was detached during inspection"
        )));
    }
    resolve(&state.world.tree, handle)
}

impl BrowserDriver for FakeDom {
    fn query(
        &self,
        selector: &str,
        scope: Option<&ElementHandle>,
    ) -> WebprobeResult<Vec<ElementHandle>> {
        let state = self.enter(format!("query:{selector}"))?;
        let list = SelectorList::parse(selector)?;
        let tree = &state.world.tree;
        let from = match scope {
            Some(handle) => resolve(tree, handle)?,
            None => tree.root(),
        };
        Ok(tree
            .descendants(from)
            .into_iter()
            .filter(|&n| list.matches(tree, n))
            .map(NodeId::handle)
            .collect())
    }

    fn read_text(&self, handle: &ElementHandle) -> WebprobeResult<String> {
        let mut state = self.enter(format!("read_text:{handle}"))?;
        let node = resolve_for_read(&mut state, handle)?;
        Ok(state.world.tree.text(node))
    }

    fn read_attribute(
        &self,
        handle: &ElementHandle,
        name: &str,
    ) -> WebprobeResult<Option<String>> {
        let mut state = self.enter(format!("read_attribute:{handle}@{name}"))?;
        let node = resolve_for_read(&mut state, handle)?;
        Ok(state.world.tree.attr(node, name).map(str::to_string))
    }

    fn read_size(&self, handle: &ElementHandle) -> WebprobeResult<Size> {
        let mut state = self.enter(format!("read_size:{handle}"))?;
        let node = resolve_for_read(&mut state, handle)?;
        Ok(state.world.tree.size(node).unwrap_or_default())
    }

    fn perform_click(&self, handle: &ElementHandle) -> WebprobeResult<()> {
        let now = self.clock.now();
        let mut guard = self.enter(format!("click:{handle}"))?;
        let state = &mut *guard;
        let target = resolve(&state.world.tree, handle)?;

        let mut path = vec![target];
        let mut cursor = state.world.tree.parent(target);
        while let Some(node) = cursor {
            path.push(node);
            cursor = state.world.tree.parent(node);
        }

        for node in path {
            if let Some(handlers) = state.clicks.get_mut(&node) {
                for handler in handlers.iter_mut() {
                    handler(
                        &mut Effects {
                            world: &mut state.world,
                            now,
                        },
                        target,
                    );
                }
            }
        }
        Ok(())
    }

    fn navigate(&self, url: &str) -> WebprobeResult<()> {
        let now = self.clock.now();
        let mut guard = self.enter(format!("navigate:{url}"))?;
        let state = &mut *guard;
        for handler in &mut state.navigations {
            handler(
                &mut Effects {
                    world: &mut state.world,
                    now,
                },
                url,
            )
            .map_err(|e| match e {
                WebprobeError::Navigation { .. } => e,
                other => WebprobeError::Navigation {
                    url: url.to_string(),
                    message: other.to_string(),
                },
            })?;
        }
        state.world.url = Some(url.to_string());
        Ok(())
    }

    fn window_size(&self) -> WebprobeResult<Size> {
        Ok(self.enter("window_size".to_string())?.world.window)
    }

    fn set_window_size(&self, size: Size) -> WebprobeResult<()> {
        let now = self.clock.now();
        let mut guard = self.enter(format!("set_window_size:{size}"))?;
        let state = &mut *guard;
        state.world.window = size;
        let root = state.world.tree.root();
        state.world.tree.set_size(root, size);
        for handler in &mut state.resizes {
            handler(&mut Effects {
                world: &mut state.world,
                now,
            });
        }
        Ok(())
    }
}
