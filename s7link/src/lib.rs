//! Bindings to the snap7 partner endpoint.
//!
//! A [`Partner`] is a peer that exchanges data blocks with a remote peer
//! through the snap7 driver. The driver is either the native shared library
//! ([`driver::loader`] opens it once per process) or any other
//! [`driver::Driver`] implementation, such as the in-process
//! [`driver::mock::MockDriver`].
//!
//! ```no_run
//! use s7link::{Parameter, Partner};
//!
//! # fn main() -> s7link::Result<()> {
//! let partner = Partner::new(true)?;
//! partner.set_param(Parameter::PingTimeout, 800)?;
//! partner.start_to("192.168.0.10", "192.168.0.20", 0x1002, 0x1002)?;
//! partner.b_send(1, b"hello")?;
//! partner.destroy()?;
//! # Ok(())
//! # }
//! ```

pub mod codes;
pub mod config;
pub mod driver;
pub mod error;
pub mod params;
pub mod partner;
pub mod translator;

pub use config::{ParamOverrides, PartnerConfig, Settings};
pub use driver::loader::{load_library, set_library_location};
pub use error::{Direction, Error, Result};
pub use params::{Access, Parameter, Width};
pub use partner::{
    Partner, PartnerStats, PartnerStatus, PartnerTimes, ReceivedBlock, RecvCompletion,
    SendCompletion,
};
pub use translator::{ErrorTranslator, Outcome, Role, Status};
