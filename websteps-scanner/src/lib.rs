pub mod error;
pub mod headers;
pub mod measurer;
pub mod plan;
pub mod result;

pub use error::ScanError;
pub use headers::Headers;
pub use measurer::{DirectMeasurer, Measurer, next_id};
pub use plan::{DnsLookupPlan, EndpointPlan};
pub use result::{
    DnsLookupMeasurement, DnsLookupType, DnsResolverInfo, EndpointMeasurement, NetworkType,
};
