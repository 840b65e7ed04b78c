//! Drawing registry - named shape/annotation sets plus per-agent annotations
//!
//! One registry per viewer session, shared as `Arc<DrawingRegistry>` between
//! the receive thread (single writer) and the render thread (reader).
//! Locking is local: the set tables are locked only for membership changes
//! and listing, each `BufferedSet` guards its own swap.

use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::buffered_set::BufferedSet;
use super::types::{AgentAnnotation, AgentRef, Annotation, Shape};

/// Decides the initial visibility of a newly created set from its name
#[derive(Debug, Clone, Default)]
pub struct NameFilter {
    prefixes: Vec<String>,
}

impl NameFilter {
    /// Visible when the name starts with any prefix; no prefixes = everything visible
    pub fn from_prefixes<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// Parse a comma separated prefix list (`DRAW_FILTER` style)
    pub fn parse(list: &str) -> Self {
        Self::from_prefixes(list.split(',').map(str::trim))
    }

    pub fn matches(&self, name: &str) -> bool {
        self.prefixes.is_empty() || self.prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }
}

/// Name and visibility of one set, as shown in a set list
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SetInfo {
    pub name: String,
    pub visible: bool,
}

/// Snapshot handed to set-list listeners
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct SetListChange {
    pub shape_sets: Vec<SetInfo>,
    pub annotation_sets: Vec<SetInfo>,
}

pub type SetListListener = Box<dyn Fn(&SetListChange) + Send + Sync>;

/// Sets of one item kind, in creation order plus a name index
struct SetTable<T> {
    ordered: Vec<Arc<BufferedSet<T>>>,
    by_name: HashMap<String, Arc<BufferedSet<T>>>,
}

impl<T: Clone> SetTable<T> {
    fn new() -> Self {
        Self { ordered: Vec::new(), by_name: HashMap::new() }
    }

    fn infos(&self) -> Vec<SetInfo> {
        self.ordered
            .iter()
            .map(|s| SetInfo { name: s.name().to_string(), visible: s.is_visible() })
            .collect()
    }
}

/// Look up a set, creating it on first sight. Returns (set, created).
fn get_or_create<T: Clone>(
    table: &RwLock<SetTable<T>>,
    name: &str,
    filter: &NameFilter,
) -> (Arc<BufferedSet<T>>, bool) {
    if let Some(set) = table.read().by_name.get(name) {
        return (set.clone(), false);
    }

    let mut table = table.write();
    // another writer may have won the race between the two locks
    if let Some(set) = table.by_name.get(name) {
        return (set.clone(), false);
    }
    let set = Arc::new(BufferedSet::with_visibility(name, filter.matches(name)));
    table.by_name.insert(name.to_string(), set.clone());
    table.ordered.push(set.clone());
    (set, true)
}

fn swap_matching<T: Clone>(table: &RwLock<SetTable<T>>, prefix: &str) -> usize {
    let table = table.read();
    let mut swapped = 0;
    for set in table.ordered.iter().filter(|s| s.name().starts_with(prefix)) {
        set.swap();
        swapped += 1;
    }
    swapped
}

fn visible_sets<T: Clone>(table: &RwLock<SetTable<T>>) -> Vec<Arc<BufferedSet<T>>> {
    table.read().ordered.iter().filter(|s| s.is_visible()).cloned().collect()
}

/// Owner of every drawing set of a viewer session
pub struct DrawingRegistry {
    shape_sets: RwLock<SetTable<Shape>>,
    annotation_sets: RwLock<SetTable<Annotation>>,
    /// One slot per agent, written directly (no buffering)
    agent_annotations: RwLock<HashMap<AgentRef, AgentAnnotation>>,
    /// Initial visibility for new sets
    filter: RwLock<NameFilter>,
    /// Raised on set creation / clear-all, consumed by `update`
    changed: AtomicBool,
    /// Global drawings toggle
    visible: AtomicBool,
    listeners: Mutex<Vec<Arc<dyn Fn(&SetListChange) + Send + Sync>>>,
}

impl Default for DrawingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DrawingRegistry {
    pub fn new() -> Self {
        Self::with_filter(NameFilter::default())
    }

    pub fn with_filter(filter: NameFilter) -> Self {
        Self {
            shape_sets: RwLock::new(SetTable::new()),
            annotation_sets: RwLock::new(SetTable::new()),
            agent_annotations: RwLock::new(HashMap::new()),
            filter: RwLock::new(filter),
            changed: AtomicBool::new(false),
            visible: AtomicBool::new(true),
            listeners: Mutex::new(Vec::new()),
        }
    }

    // ------------------------------------------------------------------------
    // Writer side (receive thread)
    // ------------------------------------------------------------------------

    /// Add a shape to the back buffer of its set, creating the set if needed
    pub fn put_shape(&self, shape: Shape) {
        let (set, created) = get_or_create(&self.shape_sets, shape.set_name(), &self.filter.read());
        if created {
            debug!(set = set.name(), "New shape set");
            self.changed.store(true, Ordering::Release);
        }
        set.put(shape);
    }

    /// Add an annotation to the back buffer of its set, creating the set if needed
    pub fn put_annotation(&self, annotation: Annotation) {
        let (set, created) = get_or_create(&self.annotation_sets, &annotation.set, &self.filter.read());
        if created {
            debug!(set = set.name(), "New annotation set");
            self.changed.store(true, Ordering::Release);
        }
        set.put(annotation);
    }

    /// Publish every shape and annotation set whose name starts with `prefix`.
    ///
    /// An empty prefix matches every set. Returns how many sets were swapped.
    pub fn swap_buffers(&self, prefix: &str) -> usize {
        swap_matching(&self.shape_sets, prefix) + swap_matching(&self.annotation_sets, prefix)
    }

    pub fn set_agent_annotation(&self, annotation: AgentAnnotation) {
        self.agent_annotations.write().insert(annotation.agent, annotation);
    }

    pub fn clear_agent_annotation(&self, agent: AgentRef) -> Option<AgentAnnotation> {
        self.agent_annotations.write().remove(&agent)
    }

    /// Drop every shape and annotation set (e.g. on reconnect).
    ///
    /// Agent annotation slots are not part of any set and are kept.
    pub fn clear_all(&self) {
        {
            let mut shapes = self.shape_sets.write();
            shapes.ordered.clear();
            shapes.by_name.clear();
        }
        {
            let mut annotations = self.annotation_sets.write();
            annotations.ordered.clear();
            annotations.by_name.clear();
        }
        debug!("All drawing sets cleared");
        self.changed.store(true, Ordering::Release);
    }

    // ------------------------------------------------------------------------
    // Reader side (render / UI thread)
    // ------------------------------------------------------------------------

    /// Visible shape sets in creation order; empty while drawings are toggled off
    pub fn visible_shape_sets(&self) -> Vec<Arc<BufferedSet<Shape>>> {
        if !self.is_visible() {
            return Vec::new();
        }
        visible_sets(&self.shape_sets)
    }

    /// Visible annotation sets in creation order; empty while drawings are toggled off
    pub fn visible_annotation_sets(&self) -> Vec<Arc<BufferedSet<Annotation>>> {
        if !self.is_visible() {
            return Vec::new();
        }
        visible_sets(&self.annotation_sets)
    }

    pub fn shape_set(&self, name: &str) -> Option<Arc<BufferedSet<Shape>>> {
        self.shape_sets.read().by_name.get(name).cloned()
    }

    pub fn annotation_set(&self, name: &str) -> Option<Arc<BufferedSet<Annotation>>> {
        self.annotation_sets.read().by_name.get(name).cloned()
    }

    pub fn shape_set_count(&self) -> usize {
        self.shape_sets.read().ordered.len()
    }

    pub fn annotation_set_count(&self) -> usize {
        self.annotation_sets.read().ordered.len()
    }

    pub fn agent_annotation(&self, agent: AgentRef) -> Option<AgentAnnotation> {
        self.agent_annotations.read().get(&agent).cloned()
    }

    /// Snapshot of every agent annotation slot that is currently set
    pub fn agent_annotations(&self) -> Vec<AgentAnnotation> {
        self.agent_annotations.read().values().cloned().collect()
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::Relaxed)
    }

    /// Flip the global drawings toggle; returns the new state
    pub fn toggle_visible(&self) -> bool {
        !self.visible.fetch_xor(true, Ordering::Relaxed)
    }

    /// Set visibility of every known set from a name predicate
    pub fn set_visibility_where(&self, pred: impl Fn(&str) -> bool) {
        for set in &self.shape_sets.read().ordered {
            set.set_visible(pred(set.name()));
        }
        for set in &self.annotation_sets.read().ordered {
            set.set_visible(pred(set.name()));
        }
    }

    /// Replace the filter used for sets created from now on
    pub fn set_filter(&self, filter: NameFilter) {
        *self.filter.write() = filter;
    }

    pub fn set_list(&self) -> SetListChange {
        SetListChange {
            shape_sets: self.shape_sets.read().infos(),
            annotation_sets: self.annotation_sets.read().infos(),
        }
    }

    // ------------------------------------------------------------------------
    // Set-list change notification (polled once per update tick)
    // ------------------------------------------------------------------------

    pub fn subscribe(&self, listener: SetListListener) {
        self.listeners.lock().push(Arc::from(listener));
    }

    /// Consume the changed flag
    pub fn take_set_list_changed(&self) -> bool {
        self.changed.swap(false, Ordering::AcqRel)
    }

    /// Called once per tick on the UI/render thread: notifies listeners if
    /// the set list changed since the previous tick.
    ///
    /// Listeners run without any registry lock held and may call back into
    /// the registry (including `subscribe`).
    pub fn update(&self) -> Option<SetListChange> {
        if !self.take_set_list_changed() {
            return None;
        }
        let change = self.set_list();
        let listeners = self.listeners.lock().clone();
        for listener in &listeners {
            listener(&change);
        }
        Some(change)
    }
}
