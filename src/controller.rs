//! Units of cluster logic invoked by the driver around the node ticks.

use crate::api_server::ApiServer;

/// When a controller runs within a tick.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ControllerTiming {
    /// Before placement and the node ticks.
    BeforeUpdate,
    /// After the node ticks, e.g. reporting.
    AfterUpdate,
}

pub trait Controller: Send {
    /// Unique name, used to delete the controller.
    fn name(&self) -> &str;

    fn tick(&mut self, api: &ApiServer);
}
