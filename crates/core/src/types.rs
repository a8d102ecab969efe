/// Zero-based MPI rank of a simulator process.
pub type Rank = u32;

/// All submission timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Log timestamps carry no zone information.
pub type LogTime = chrono::NaiveDateTime;
