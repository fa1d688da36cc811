//! Configuration types for the IVF index and its encodings.
//!
//! - `IvfConfig`: shape, metric, id storage, placement, training knobs
//! - `PqParams`: product quantizer code layout and lookup options
//! - `validate`: ordered constraint checks against a `DeviceCapability`

pub mod constants;
mod index;
mod metric;
pub mod validate;

pub use self::index::{IvfConfig, PqParams};
pub use self::metric::{IdStorage, LookupPrecision, MemorySpace, MetricType};
pub use self::validate::{verify_ivf, verify_pq};
