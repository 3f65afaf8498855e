//! Standard simulation events.

// DRIVER EVENTS //
pub mod driver {
    use serde::Serialize;

    /// Starts one simulation tick. The driver re-emits it to itself while ticks remain.
    #[derive(Clone, Serialize)]
    pub struct SimulationTick {
    }
}

// WATCH EVENTS //
pub mod watch {
    use std::fmt::{Display, Formatter};
    use serde::Serialize;
    use crate::node::NodeSnapshot;
    use crate::pod::PodSnapshot;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
    pub enum EventKind {
        Added,
        Modified,
        Deleted,
    }

    impl Display for EventKind {
        fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
            match self {
                EventKind::Added => write!(f, "added"),
                EventKind::Modified => write!(f, "modified"),
                EventKind::Deleted => write!(f, "deleted"),
            }
        }
    }

    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub enum WatchObject {
        Pod(PodSnapshot),
        Node(NodeSnapshot),
    }

    /// State change delivered to the subscribers of the `pods` and `nodes` topics.
    #[derive(Clone, Debug, PartialEq, Serialize)]
    pub struct WatchEvent {
        pub kind: EventKind,
        pub object: WatchObject,
    }

    impl WatchEvent {
        pub fn pod(kind: EventKind, pod: PodSnapshot) -> Self {
            Self { kind, object: WatchObject::Pod(pod) }
        }

        pub fn node(kind: EventKind, node: NodeSnapshot) -> Self {
            Self { kind, object: WatchObject::Node(node) }
        }

        pub fn as_pod(&self) -> Option<&PodSnapshot> {
            match &self.object {
                WatchObject::Pod(pod) => Some(pod),
                WatchObject::Node(_) => None,
            }
        }

        pub fn as_node(&self) -> Option<&NodeSnapshot> {
            match &self.object {
                WatchObject::Node(node) => Some(node),
                WatchObject::Pod(_) => None,
            }
        }
    }
}
