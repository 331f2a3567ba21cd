mod result;
mod trip;

pub use result::{LoadResult, LoadStatus, RunStatistics};
pub use trip::{PaymentType, RateCode, TripFileDescriptor, TripType};
