//! # zkwire-sim
//!
//! A software ZKTeco terminal. It speaks the same TCP/UDP protocol as the
//! hardware, keeps its users, templates and attendance log in memory, and
//! is meant for exercising clients without a device on the bench.
//!
//! ```no_run
//! use zkwire_sim::{Simulator, SimulatorConfig};
//!
//! #[tokio::main]
//! async fn main() -> zkwire_sim::Result<()> {
//!     let simulator = Simulator::bind(SimulatorConfig::default()).await?;
//!     simulator.run().await
//! }
//! ```

pub mod bundle;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod request;
pub mod server;
pub mod store;

pub use config::{DeviceProfile, SimulatorConfig};
pub use dispatcher::{Dispatch, SessionDispatcher, SimContext};
pub use error::{Error, Result};
pub use request::Request;
pub use server::Simulator;
pub use store::{DeviceStore, SharedStore};
