//! Outer tick loop of the simulation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use dslab_core::{cast, Event, EventHandler, SimulationContext};
use log::{debug, info, warn};
use crate::api_server::ApiServer;
use crate::controller::{Controller, ControllerTiming};
use crate::events::driver::SimulationTick;
use crate::simulation_metrics::{ClusterTickReport, MetricsLogger, NodeReport};

/// Cloneable flag stopping the simulation. The tick in progress always completes.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

struct DeferredController {
    tick: u64,
    timing: ControllerTiming,
    controller: Box<dyn Controller>,
}

pub struct Driver {
    api: Arc<ApiServer>,
    before_update: Vec<Box<dyn Controller>>,
    after_update: Vec<Box<dyn Controller>>,
    deferred: Vec<DeferredController>,

    tick: u64,
    total_ticks: u64,
    tick_duration: f64,
    placement_timeout: Duration,
    shutdown: ShutdownSignal,

    metrics_logger: Box<dyn MetricsLogger>,
    last_report: Option<ClusterTickReport>,

    ctx: SimulationContext,
}

impl Driver {
    pub fn new(api: Arc<ApiServer>, ctx: SimulationContext, total_ticks: u64, tick_duration: f64,
               placement_timeout: Duration, metrics_logger: Box<dyn MetricsLogger>,
               shutdown: ShutdownSignal) -> Self {
        Self {
            api,
            before_update: Vec::new(),
            after_update: Vec::new(),
            deferred: Vec::new(),
            tick: 0,
            total_ticks,
            tick_duration,
            placement_timeout,
            shutdown,
            metrics_logger,
            last_report: None,
            ctx,
        }
    }

    /// Schedules the first tick.
    pub fn start(&mut self) {
        if self.total_ticks > 0 {
            self.ctx.emit_self_now(SimulationTick {});
        }
    }

    /// Number of ticks done so far.
    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn last_report(&self) -> Option<&ClusterTickReport> {
        self.last_report.as_ref()
    }

    pub fn metrics_logger(&mut self) -> &mut dyn MetricsLogger {
        self.metrics_logger.as_mut()
    }

    pub fn register_before_update(&mut self, controller: Box<dyn Controller>) {
        debug!("Registered before-update controller {}", controller.name());
        self.before_update.push(controller);
    }

    pub fn register_after_update(&mut self, controller: Box<dyn Controller>) {
        debug!("Registered after-update controller {}", controller.name());
        self.after_update.push(controller);
    }

    /// Removes every controller with this name, registered or deferred. Returns whether any
    /// was found.
    pub fn delete_controller(&mut self, name: &str) -> bool {
        let before = self.before_update.len() + self.after_update.len() + self.deferred.len();
        self.before_update.retain(|controller| controller.name() != name);
        self.after_update.retain(|controller| controller.name() != name);
        self.deferred.retain(|deferred| deferred.controller.name() != name);
        before != self.before_update.len() + self.after_update.len() + self.deferred.len()
    }

    /// Registers the controller when tick `tick` starts. Ignored if that tick already started.
    pub fn deploy_at(&mut self, controller: Box<dyn Controller>, tick: u64, timing: ControllerTiming) {
        if tick < self.tick {
            warn!("Controller {} not deployed, tick {} already passed", controller.name(), tick);
            return;
        }
        self.deferred.push(DeferredController { tick, timing, controller });
    }

    fn activate_deferred(&mut self) {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.deferred)
            .into_iter()
            .partition(|deferred| deferred.tick <= self.tick);
        self.deferred = waiting;
        for deferred in due {
            match deferred.timing {
                ControllerTiming::BeforeUpdate => self.register_before_update(deferred.controller),
                ControllerTiming::AfterUpdate => self.register_after_update(deferred.controller),
            }
        }
    }

    /// One simulation step: controllers, bounded wait for placement, node ticks, reporting.
    pub fn run_tick(&mut self) {
        info!("Tick {} started at {}", self.tick, self.ctx.time());
        self.activate_deferred();
        self.api.retry_unplaced();

        for controller in self.before_update.iter_mut() {
            debug!("Running before-update controller {}", controller.name());
            controller.tick(&self.api);
        }

        let unplaced = self.api.pending().wait_timeout(self.placement_timeout);
        if !unplaced.is_empty() {
            warn!("{} pods still wait for placement: {:?}", unplaced.len(), unplaced);
        }

        let mut nodes = Vec::new();
        for node in self.api.list_nodes() {
            let (name, tick, pod_count) = {
                let mut node = node.lock();
                let tick = node.tick();
                (node.name.clone(), tick, node.pod_count())
            };
            self.api.apply_node_tick(&name, &tick);
            nodes.push(NodeReport { name, metrics: tick.metrics, period: tick.period, pod_count });
        }
        let report = ClusterTickReport {
            tick: self.tick,
            time: self.ctx.time(),
            nodes,
            unplaced_pods: unplaced.len(),
        };
        let period = self.metrics_logger.snapshot_period();
        if period > 0 && self.tick % period == 0 {
            self.metrics_logger.log_metrics(&report);
        }
        self.last_report = Some(report);

        for controller in self.after_update.iter_mut() {
            debug!("Running after-update controller {}", controller.name());
            controller.tick(&self.api);
        }
        self.tick += 1;
    }
}

impl EventHandler for Driver {
    fn on(&mut self, event: Event) {
        cast!(match event.data {
            SimulationTick {} => {
                self.run_tick();
                if self.tick < self.total_ticks && !self.shutdown.is_triggered() {
                    self.ctx.emit_self(SimulationTick {}, self.tick_duration);
                } else {
                    info!("Simulation stopped after {} ticks", self.tick);
                }
            }
        })
    }
}
