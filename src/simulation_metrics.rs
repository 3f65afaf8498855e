use std::fs::File;
use std::io::{BufWriter, Error, Write};
use serde::Serialize;
use crate::metrics_aggregator::{PeriodMetrics, TickMetrics, WindowedMetric, DEFAULT_WINDOWS};

/// Metrics of one node after one tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct NodeReport {
    pub name: String,
    pub metrics: TickMetrics,
    pub period: PeriodMetrics,
    pub pod_count: usize,
}

/// Everything measured during one driver tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClusterTickReport {
    pub tick: u64,
    pub time: f64,
    pub nodes: Vec<NodeReport>,
    /// Pods still waiting for a node when the nodes were ticked.
    pub unplaced_pods: usize,
}

impl ClusterTickReport {
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|node| node.name == name)
    }
}

pub trait MetricsLogger {
    /// Reports are logged every `snapshot_period` ticks, never when it is 0.
    fn snapshot_period(&self) -> u64;
    fn log_metrics(&mut self, report: &ClusterTickReport);
    fn save_log(&mut self, path: &str) -> Result<(), std::io::Error>;
}

pub struct EmptyMetricsLogger {}

impl MetricsLogger for EmptyMetricsLogger {
    fn snapshot_period(&self) -> u64 {
        0
    }

    fn log_metrics(&mut self, _report: &ClusterTickReport) {}

    fn save_log(&mut self, _path: &str) -> Result<(), Error> {
        Ok(())
    }
}

/// Prints a tab separated table of the node metrics.
pub struct StdoutMetricsLogger {
    snapshot_period: u64,
    windows: [usize; 3],
}

impl StdoutMetricsLogger {
    pub fn new(snapshot_period: u64) -> Self {
        Self::with_windows(snapshot_period, DEFAULT_WINDOWS)
    }

    pub fn with_windows(snapshot_period: u64, windows: [usize; 3]) -> Self {
        Self {
            snapshot_period,
            windows,
        }
    }

    fn header(&self) -> String {
        let mut columns = vec!["Node".to_string()];
        for quantity in ["CPU", "Mem", "Load"] {
            columns.push(quantity.to_string());
            columns.push(format!("{}ALL", quantity));
            for window in self.windows {
                columns.push(format!("{}{}", quantity, window));
            }
        }
        columns.join("\t")
    }
}

fn format_metric(metric: &WindowedMetric) -> String {
    format!("{:.2}\t{:.2}\t{:.2}\t{:.2}\t{:.2}", metric.last_tick, metric.average,
            metric.short_window, metric.medium_window, metric.long_window)
}

impl MetricsLogger for StdoutMetricsLogger {
    fn snapshot_period(&self) -> u64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, report: &ClusterTickReport) {
        println!("Tick: {}, time: {}, unplaced pods: {}", report.tick, report.time, report.unplaced_pods);
        println!("{}", self.header());
        for node in report.nodes.iter() {
            println!("{}\t{}\t{}\t{}", node.name, format_metric(&node.period.cpu),
                     format_metric(&node.period.mem), format_metric(&node.period.load));
        }
    }

    fn save_log(&mut self, _path: &str) -> Result<(), Error> {
        Ok(())
    }
}

/// Keeps every report and saves them as JSON.
pub struct FileMetricsLogger {
    snapshot_period: u64,
    metrics_history: Vec<ClusterTickReport>,
}

impl FileMetricsLogger {
    pub fn new(snapshot_period: u64) -> Self {
        Self {
            snapshot_period,
            metrics_history: Vec::default(),
        }
    }

    pub fn history(&self) -> &[ClusterTickReport] {
        &self.metrics_history
    }
}

impl MetricsLogger for FileMetricsLogger {
    fn snapshot_period(&self) -> u64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, report: &ClusterTickReport) {
        self.metrics_history.push(report.clone());
    }

    fn save_log(&mut self, path: &str) -> Result<(), Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.metrics_history)?;
        writer.flush()
    }
}

#[derive(Serialize)]
struct CsvRow {
    tick: u64,
    time: f64,
    node: String,
    pods: usize,
    cpu: f64,
    cpu_average: f64,
    cpu_short: f64,
    cpu_medium: f64,
    cpu_long: f64,
    mem: f64,
    mem_average: f64,
    mem_short: f64,
    mem_medium: f64,
    mem_long: f64,
    load: f64,
    load_average: f64,
    load_short: f64,
    load_medium: f64,
    load_long: f64,
}

impl CsvRow {
    fn new(report: &ClusterTickReport, node: &NodeReport) -> Self {
        let period = &node.period;
        Self {
            tick: report.tick,
            time: report.time,
            node: node.name.clone(),
            pods: node.pod_count,
            cpu: period.cpu.last_tick,
            cpu_average: period.cpu.average,
            cpu_short: period.cpu.short_window,
            cpu_medium: period.cpu.medium_window,
            cpu_long: period.cpu.long_window,
            mem: period.mem.last_tick,
            mem_average: period.mem.average,
            mem_short: period.mem.short_window,
            mem_medium: period.mem.medium_window,
            mem_long: period.mem.long_window,
            load: period.load.last_tick,
            load_average: period.load.average,
            load_short: period.load.short_window,
            load_medium: period.load.medium_window,
            load_long: period.load.long_window,
        }
    }
}

/// Keeps one row per node and tick and saves them as CSV.
pub struct CsvMetricsLogger {
    snapshot_period: u64,
    rows: Vec<CsvRow>,
}

impl CsvMetricsLogger {
    pub fn new(snapshot_period: u64) -> Self {
        Self {
            snapshot_period,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

impl MetricsLogger for CsvMetricsLogger {
    fn snapshot_period(&self) -> u64 {
        self.snapshot_period
    }

    fn log_metrics(&mut self, report: &ClusterTickReport) {
        for node in report.nodes.iter() {
            self.rows.push(CsvRow::new(report, node));
        }
    }

    fn save_log(&mut self, path: &str) -> Result<(), Error> {
        let mut writer = csv::Writer::from_path(path)?;
        for row in self.rows.iter() {
            writer.serialize(row)?;
        }
        writer.flush()
    }
}
