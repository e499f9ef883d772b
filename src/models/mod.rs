// Domain models: imported player/server data and live telemetry.

mod player;
mod server;
mod telemetry;

pub use player::{
    AddressObservation, GeoInfo, Identity, ImportRecord, RawRecord, Session, UserInfo,
    WorldPlaytime,
};
pub use server::{ServerImportBatch, ServerSample};
pub use telemetry::{Sample, WindowSummary};
