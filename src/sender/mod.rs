pub mod guard;
pub mod outcome;
pub mod transport;

pub use guard::DeliveryGuard;
pub use outcome::{DeliveryOutcome, classify};
pub use transport::{
    DeliveryStats, HttpTransport, PushRequest, PushResponse, StatsSnapshot, Transport,
    TransportConfig, TransportFault,
};
