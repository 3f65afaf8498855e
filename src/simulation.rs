use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use dslab_core::simulation::Simulation;
use log::{info, warn};
use sugars::{rc, refcell};
use crate::api_server::ApiServer;
use crate::controller::{Controller, ControllerTiming};
use crate::driver::{Driver, ShutdownSignal};
use crate::errors::{AdmissionError, SimulationError, StoreError};
use crate::default_core_schedulers::fair_scheduler::FAIR_SCHEDULER;
use crate::node::{NodeSnapshot, NodeSpec, SharedNode};
use crate::placement_algorithm::PlacementAlgorithm;
use crate::placement_worker::PlacementWorker;
use crate::pod::{PodSnapshot, PodSpec};
use crate::registry::Registry;
use crate::simulation_config::SimulationConfig;
use crate::simulation_metrics::{ClusterTickReport, MetricsLogger};

pub struct ClusterSimulation {
    api: Arc<ApiServer>,
    driver: Rc<RefCell<Driver>>,
    placement: Option<PlacementWorker>,
    shutdown: ShutdownSignal,

    sim: Simulation,
    sim_config: Rc<SimulationConfig>,

    last_node_id: u64,
}

impl ClusterSimulation {
    /// Creates a simulation with specified config. Nodes and workloads of the config are added
    /// right away, the first tick runs on the first step.
    pub fn new(mut sim: Simulation, sim_config: SimulationConfig, registry: Registry,
               metrics_logger: Box<dyn MetricsLogger>) -> Result<Self, SimulationError> {
        sim_config.validate()?;
        let sim_config = rc!(sim_config);
        let api = Arc::new(ApiServer::new(registry, sim_config.metrics_windows, sim_config.subscriber_buffer)?);
        let shutdown = ShutdownSignal::new();

        let driver = rc!(refcell!(Driver::new(
            api.clone(),
            sim.create_context("driver"),
            sim_config.total_ticks,
            sim_config.tick_duration,
            Duration::from_millis(sim_config.placement_timeout_ms),
            metrics_logger,
            shutdown.clone(),
        )));
        sim.add_handler("driver", driver.clone());
        driver.borrow_mut().start();

        let mut sim = Self {
            api,
            driver,
            placement: None,
            shutdown,
            sim,
            sim_config,
            last_node_id: 0,
        };

        for node_config in sim.sim_config.nodes.clone() {
            for _ in 0..node_config.count {
                sim.last_node_id += 1;
                let name = format!("node_{}", sim.last_node_id);
                sim.add_node_spec(NodeSpec::new(name, node_config.cpu, node_config.memory,
                                                node_config.core_scheduler.clone()))?;
            }
        }

        for workload in sim.sim_config.workloads.clone() {
            for spec in workload.pod_specs() {
                sim.submit_pod(spec)?;
            }
        }

        Ok(sim)
    }

    /// Starts the placement collaborator on its own thread. Only the first call has an effect.
    pub fn start_placement(&mut self, algorithm: Box<dyn PlacementAlgorithm>) -> Result<(), SimulationError> {
        if self.placement.is_some() {
            warn!("Placement collaborator already running");
            return Ok(());
        }
        self.placement = Some(PlacementWorker::spawn(self.api.clone(), algorithm)?);
        info!("Placement collaborator started");
        Ok(())
    }

    pub fn api(&self) -> Arc<ApiServer> {
        self.api.clone()
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.sim_config
    }

    /// Add new node to the cluster with the default core scheduler, return its name.
    pub fn add_node(&mut self, cpu_cores: u32, memory: u64) -> Result<String, AdmissionError> {
        self.last_node_id += 1;
        let spec = NodeSpec::new(format!("node_{}", self.last_node_id), cpu_cores, memory, FAIR_SCHEDULER);
        let name = spec.name.clone();
        self.add_node_spec(spec)?;
        Ok(name)
    }

    pub fn add_node_spec(&mut self, spec: NodeSpec) -> Result<(), AdmissionError> {
        self.api.add_node(spec)
    }

    pub fn remove_node(&self, name: &str) -> Result<(), StoreError> {
        self.api.remove_node(name)
    }

    pub fn node(&self, name: &str) -> Option<SharedNode> {
        self.api.node(name)
    }

    pub fn node_snapshot(&self, name: &str) -> Option<NodeSnapshot> {
        self.api.node_snapshot(name)
    }

    pub fn submit_pod(&self, spec: PodSpec) -> Result<(), AdmissionError> {
        self.api.create_pod(spec)
    }

    /// Deletes a pod with the configured default grace period.
    pub fn remove_pod(&self, id: &str) -> Result<(), StoreError> {
        self.api.delete_pod(id, self.sim_config.default_grace_ticks)
    }

    pub fn pod(&self, id: &str) -> Option<PodSnapshot> {
        self.api.pod_snapshot(id)
    }

    pub fn register_before_update(&mut self, controller: Box<dyn Controller>) {
        self.driver.borrow_mut().register_before_update(controller);
    }

    pub fn register_after_update(&mut self, controller: Box<dyn Controller>) {
        self.driver.borrow_mut().register_after_update(controller);
    }

    pub fn delete_controller(&mut self, name: &str) -> bool {
        self.driver.borrow_mut().delete_controller(name)
    }

    pub fn deploy_at(&mut self, controller: Box<dyn Controller>, tick: u64, timing: ControllerTiming) {
        self.driver.borrow_mut().deploy_at(controller, tick, timing);
    }

    /// Runs at most `tick_count` ticks. Returns `false` once no tick is left.
    pub fn run_ticks(&mut self, tick_count: u64) -> bool {
        self.sim.steps(tick_count)
    }

    /// Runs until the configured number of ticks is done or shutdown was requested.
    pub fn run(&mut self) {
        self.sim.step_until_no_events();
    }

    /// Number of ticks done so far.
    pub fn current_tick(&self) -> u64 {
        self.driver.borrow().current_tick()
    }

    /// Returns the current simulation time.
    pub fn current_time(&self) -> f64 {
        self.sim.time()
    }

    pub fn last_report(&self) -> Option<ClusterTickReport> {
        self.driver.borrow().last_report().cloned()
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Stops ticking, the event bus and the placement collaborator.
    pub fn shutdown(&mut self) {
        self.shutdown.trigger();
        self.api.shutdown();
        if let Some(mut worker) = self.placement.take() {
            worker.join();
        }
    }

    pub fn finish_simulation(&mut self, path: &str) -> Result<(), std::io::Error> {
        self.shutdown();
        self.driver.borrow_mut().metrics_logger().save_log(path)
    }
}

impl Drop for ClusterSimulation {
    fn drop(&mut self) {
        self.shutdown();
    }
}
