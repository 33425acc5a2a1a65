pub mod input_deck;
pub mod log;
pub mod restart;
pub mod topology;
pub mod trajectory;

pub use input_deck::{DeckFeatures, InputDeckRecord, Namelist, WeightScheduleEntry};
pub use log::{LogRecord, ThermoAggregates};
pub use restart::RestartRecord;
pub use topology::TopologyRecord;
pub use trajectory::{RemdInfo, TrajectoryRecord};

use serde::Serialize;

/// Container format of a coordinate-bearing file (restart or trajectory).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CoordFormat {
    Ascii,
    NetCdf,
}

impl CoordFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoordFormat::Ascii => "Formatted ASCII",
            CoordFormat::NetCdf => "NetCDF",
        }
    }
}
