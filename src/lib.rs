// Library for tests to access modules

pub mod aggregator;
pub mod clock;
pub mod config;
pub mod dedup;
pub mod error;
pub mod geolocation;
pub mod models;
pub mod orchestrator;
pub mod pipeline;
pub mod refiner;
pub mod sampler;
pub mod source;
pub mod storage;
