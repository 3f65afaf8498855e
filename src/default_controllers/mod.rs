pub mod replication_controller;
pub mod service_controller;
