// src/lib.rs

//! loaddag: a dependency-aware, priority-scheduled job loader.
//!
//! The loader drives the parallel initialization of long-lived resources
//! (tables, views, dictionaries) in a larger system. Clients build
//! [`LoadJob`]s with dependency references, bundle them into a
//! [`LoadTask`], and schedule the task; a bounded pool of worker threads
//! executes ready jobs highest effective priority first. Waiters can block
//! on individual jobs, and [`AsyncLoader::prioritize`] hoists a job (and
//! transitively its dependencies) to the head of the queue.
//!
//! Failures and cancellations propagate through the successor closure: a
//! job whose dependency failed is canceled with an error that preserves the
//! root-cause message.
//!
//! ```
//! use std::sync::Arc;
//! use loaddag::{AsyncLoader, Gauge, LoadJob};
//!
//! let loader = Arc::new(AsyncLoader::new(Gauge::new(), Gauge::new(), 2, false));
//!
//! let schema = LoadJob::new("load-schema", vec![], |_| Ok(()));
//! let table = LoadJob::new("load-table", vec![schema.clone()], |job| {
//!     // Runs only after load-schema finished OK.
//!     let _ = job.priority();
//!     Ok(())
//! });
//!
//! let task = loader.make_task(vec![schema, table.clone()]);
//! task.schedule()?;
//! loader.start();
//! table.wait()?;
//! loader.stop();
//! # Ok::<(), loaddag::LoadError>(())
//! ```

pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod logging;
pub mod metrics;

pub use crate::config::LoaderConfig;
pub use crate::dag::{JobFunc, LoadJob, LoadStatus, LoadTask};
pub use crate::engine::AsyncLoader;
pub use crate::errors::{ConfigError, LoadError};
pub use crate::metrics::Gauge;
