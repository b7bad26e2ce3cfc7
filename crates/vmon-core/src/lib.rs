#![forbid(unsafe_code)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]

//! Request/response data model and JSON wire format for the sampling
//! pipeline: parsing requests, the per-domain stats snapshot, and
//! building/writing response records.

/// Error types for request parsing.
pub mod error;
/// Request parsing and the stats bitmask.
pub mod request;
/// Response record construction and line-framed output.
pub mod response;
/// Per-domain stats snapshot data model.
pub mod vminfo;

pub use error::RequestError;
pub use request::{parse_request, SampleRequest, StatsMask, MAX_REQUEST_TOKENS, MAX_REQ_ID_LEN};
pub use response::{bulk_response, error_record, success_record, Collector};
pub use vminfo::{BalloonInfo, BlockStats, IfaceStats, PCpuInfo, StateInfo, VCpuInfo, VCpuStats, VmInfo};
