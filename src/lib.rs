pub mod cache;
pub mod client;
pub mod declarations;
pub mod error;
pub mod export;
pub mod gazetteer;
pub mod normalize;
pub mod pipeline;
pub mod query;
pub mod state_fips;
pub mod types;

pub use cache::{Clock, ManualClock, SystemClock, TtlCache};
pub use client::{ClientConfig, DisasterClient};
pub use error::{ExportError, NormalizeError, SourceError};
pub use export::{export_file_name, from_csv, to_csv};
pub use gazetteer::GeoReference;
pub use normalize::{normalize, normalize_record, normalize_report};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineStatus};
pub use query::{RecordFilter, declarations_in, filter, regions, select};
pub use types::{NormalizedRecord, Program, RawDeclaration, ZipCodes};
