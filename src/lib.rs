pub mod api_server;
pub mod controller;
pub mod core_scheduler;
pub mod default_controllers;
pub mod default_core_schedulers;
pub mod default_placement_algorithms;
pub mod default_pod_algorithms;
pub mod deployment;
pub mod driver;
pub mod errors;
pub mod event_bus;
pub mod events;
pub mod metrics_aggregator;
pub mod node;
pub mod pending;
pub mod percentile;
pub mod placement_algorithm;
pub mod placement_worker;
pub mod pod;
pub mod pod_algorithm;
pub mod registry;
pub mod ring_average;
pub mod simulation;
pub mod simulation_config;
pub mod simulation_metrics;
pub mod store;
