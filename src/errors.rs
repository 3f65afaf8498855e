//! Error types of the simulator.

use thiserror::Error;

/// Rejections raised while admitting a new pod into the cluster. The pod never enters the store.
#[derive(Debug, Error, PartialEq)]
pub enum AdmissionError {
    #[error("pod {id}: invalid cpu limit {value}")]
    InvalidCpuLimit { id: String, value: f64 },
    #[error("pod {id}: memory limit must be positive")]
    InvalidMemLimit { id: String },
    #[error("duplicate pod {0}")]
    Duplicate(String),
    #[error("no pod algorithm {0}")]
    UnknownAlgorithm(String),
    #[error("no core scheduler {0}")]
    UnknownCoreScheduler(String),
    #[error("error parsing initial state of pod {id}: {message}")]
    InvalidState { id: String, message: String },
    #[error("duplicate node {0}")]
    DuplicateNode(String),
    #[error("node {0} must have at least one cpu core and some memory")]
    InvalidNode(String),
}

/// Failures returned to the placement collaborator by `bind`.
#[derive(Debug, Error, PartialEq)]
pub enum BindError {
    #[error("no node {0}")]
    UnknownNode(String),
    #[error("no pod {0}")]
    UnknownPod(String),
    #[error("pod {pod} already bound to {node}")]
    AlreadyBound { pod: String, node: String },
    #[error("pod {0} is not pending")]
    NotPending(String),
}

/// Request denials of a service pod. Not fatal, the dispatching controller decides what to do.
#[derive(Debug, Error, PartialEq)]
pub enum ServiceError {
    #[error("cannot provide service")]
    Denial,
    #[error("pod is currently initializing, cannot provide service")]
    Initializing,
}

#[derive(Debug, Error, PartialEq)]
pub enum BusError {
    #[error("no topic {0}")]
    UnknownTopic(String),
    #[error("event bus is shut down")]
    Shutdown,
}

#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("no object {0}")]
    NotFound(String),
    #[error("object {0} already exists")]
    AlreadyExists(String),
    #[error("node {name} still runs {pods} pods")]
    NodeNotEmpty { name: String, pods: usize },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("can't read file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("can't parse YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid value for '{field}': {message}")]
    Invalid { field: &'static str, message: String },
}

/// Failures while assembling or driving a simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Bus(#[from] BusError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
