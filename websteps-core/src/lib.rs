pub mod address;
pub mod archival;
pub mod cache;
pub mod caching;
pub mod crawl;
pub mod deque;
pub mod diagnostics;
pub mod error;
pub mod model;
pub mod plan;
pub mod redirect;
pub mod report;
pub mod step;
pub mod thelper;

pub use address::{AddressFlags, UrlAddress};
pub use cache::{CacheConfig, CachingForever, CachingPolicy, ProbeCache, ReasonableCaching};
pub use caching::{CacheLookup, CachingMeasurer};
pub use crawl::{MeasureOptions, measure_url};
pub use deque::UrlRedirectDeque;
pub use diagnostics::{CollectingSink, DiagnosticSink, TracingSink};
pub use error::{CoreError, PlanningError};
pub use model::UrlMeasurement;
pub use redirect::{DefaultRedirectPolicy, RedirectPolicy};
pub use step::SingleStepMeasurement;
pub use thelper::{ThClient, ThHandler, ThRequest, ThResponse};
