use dslab_core::Simulation;
use log::error;
use cluster_sim::default_placement_algorithms::mrp_algorithm::MrpAlgorithm;
use cluster_sim::errors::SimulationError;
use cluster_sim::registry::Registry;
use cluster_sim::simulation::ClusterSimulation;
use cluster_sim::simulation_config::SimulationConfig;
use cluster_sim::simulation_metrics::FileMetricsLogger;

fn run(config_path: &str, results_path: &str) -> Result<(), SimulationError> {
    let sim = Simulation::new(42);
    let sim_config = SimulationConfig::from_file(config_path)?;
    let mut cluster_sim = ClusterSimulation::new(sim, sim_config, Registry::default(),
                                                 Box::new(FileMetricsLogger::new(60)))?;
    cluster_sim.start_placement(Box::new(MrpAlgorithm::new()))?;
    cluster_sim.run();
    if let Err(err) = cluster_sim.finish_simulation(results_path) {
        error!("Can't save results to {}: {}", results_path, err);
    }
    Ok(())
}

fn main() {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.yaml".to_string());
    let results_path = args.next().unwrap_or_else(|| "results.json".to_string());
    if let Err(err) = run(&config_path, &results_path) {
        error!("Simulation failed: {}", err);
        std::process::exit(1);
    }
}
