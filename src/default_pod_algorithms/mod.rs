pub mod batch_pod;
pub mod service_pod;
