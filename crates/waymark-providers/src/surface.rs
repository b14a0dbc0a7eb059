use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use waymark_core::contracts::{LocalTransform, NodeHandle, RenderSurface};
use waymark_core::route::MarkerKind;

/// Everything the surface knows about one live node.
#[derive(Debug, Clone)]
pub struct NodeRecord {
    pub parent: Option<NodeHandle>,
    pub transform: LocalTransform,
    pub kind: MarkerKind,
    pub visible: bool,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    nodes: HashMap<NodeHandle, NodeRecord>,
    detach_log: Vec<NodeHandle>,
}

/// Render surface that records attach/detach/visibility calls so tests can
/// assert on the scene graph the session builds.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    inner: Arc<Mutex<Inner>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().expect("surface lock").nodes.len()
    }

    pub fn live_count_of(&self, kind: MarkerKind) -> usize {
        self.inner
            .lock()
            .expect("surface lock")
            .nodes
            .values()
            .filter(|n| n.kind == kind)
            .count()
    }

    pub fn visible_count_of(&self, kind: MarkerKind) -> usize {
        self.inner
            .lock()
            .expect("surface lock")
            .nodes
            .values()
            .filter(|n| n.kind == kind && n.visible)
            .count()
    }

    pub fn node(&self, handle: NodeHandle) -> Option<NodeRecord> {
        self.inner
            .lock()
            .expect("surface lock")
            .nodes
            .get(&handle)
            .cloned()
    }

    pub fn is_visible(&self, handle: NodeHandle) -> Option<bool> {
        self.node(handle).map(|n| n.visible)
    }

    pub fn children_of(&self, parent: NodeHandle) -> Vec<NodeHandle> {
        let inner = self.inner.lock().expect("surface lock");
        let mut children: Vec<NodeHandle> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(parent))
            .map(|(h, _)| *h)
            .collect();
        children.sort_by_key(|h| h.0);
        children
    }

    pub fn detach_count(&self) -> usize {
        self.inner.lock().expect("surface lock").detach_log.len()
    }
}

impl RenderSurface for RecordingSurface {
    fn attach_node(
        &mut self,
        parent: Option<NodeHandle>,
        transform: LocalTransform,
        kind: MarkerKind,
    ) -> NodeHandle {
        let mut inner = self.inner.lock().expect("surface lock");
        inner.next_id += 1;
        let handle = NodeHandle(inner.next_id);
        inner.nodes.insert(
            handle,
            NodeRecord {
                parent,
                transform,
                kind,
                visible: true,
            },
        );
        handle
    }

    fn detach(&mut self, handle: NodeHandle) {
        let mut inner = self.inner.lock().expect("surface lock");
        // Children of a detached node go with it, as a scene graph would.
        let orphans: Vec<NodeHandle> = inner
            .nodes
            .iter()
            .filter(|(_, n)| n.parent == Some(handle))
            .map(|(h, _)| *h)
            .collect();
        for orphan in orphans {
            inner.nodes.remove(&orphan);
            inner.detach_log.push(orphan);
        }
        inner.nodes.remove(&handle);
        inner.detach_log.push(handle);
    }

    fn set_visible(&mut self, handle: NodeHandle, visible: bool) {
        let mut inner = self.inner.lock().expect("surface lock");
        if let Some(node) = inner.nodes.get_mut(&handle) {
            node.visible = visible;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Vector3;

    #[test]
    fn detach_removes_subtree() {
        let mut surface = RecordingSurface::new();
        let anchor = surface.attach_node(
            None,
            LocalTransform::at(Vector3::zeros()),
            MarkerKind::Anchor,
        );
        let child = surface.attach_node(
            Some(anchor),
            LocalTransform::at(Vector3::new(0.0, 2.0, 0.0)),
            MarkerKind::AnchorPreviewArrow,
        );
        assert_eq!(surface.live_count(), 2);
        assert_eq!(surface.children_of(anchor), vec![child]);

        surface.detach(anchor);
        assert_eq!(surface.live_count(), 0);
        assert_eq!(surface.detach_count(), 2);
    }

    #[test]
    fn visibility_is_tracked_per_node() {
        let mut surface = RecordingSurface::new();
        let node = surface.attach_node(
            None,
            LocalTransform::at(Vector3::zeros()),
            MarkerKind::AnchorSearchArrow,
        );
        assert_eq!(surface.is_visible(node), Some(true));
        surface.set_visible(node, false);
        assert_eq!(surface.is_visible(node), Some(false));
    }
}
