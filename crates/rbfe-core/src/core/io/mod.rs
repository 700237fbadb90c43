//! Persistence of production samples.
//!
//! Every replica produces one [`SampleRecord`](store::SampleRecord) per cycle.
//! Records are appended to a [`SampleStore`](store::SampleStore) and never
//! modified afterwards; the estimator reads them back in bulk. Logs written by
//! earlier ATM runs (one whitespace-separated file per replica) can be
//! imported with [`replica_log`].

pub mod replica_log;
pub mod store;
