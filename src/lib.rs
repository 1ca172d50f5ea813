//! # CleanShift
//!
//! Find large folders and development caches, clean them, or shift them to
//! another drive and leave a directory link behind.
//!
//! ## Usage
//!
//! ### Command Line
//!
//! ```bash
//! # List folders of at least 500 MB under the home directory
//! cleanshift analyze ~ --min-size 500MB
//!
//! # Preview how much temp files and browser caches would free
//! cleanshift clean --temp-files --browser-cache --dry-run
//!
//! # Move a cache to another drive and link it back
//! cleanshift move --source ~/.gradle --target-drive /mnt/data
//! cleanshift restore ~/.gradle
//! ```
//!
//! ### As a Library
//!
//! ```no_run
//! use cleanshift::{CleanShift, CleanShiftConfig, Housekeeper};
//! use std::path::Path;
//!
//! let service = CleanShift::from_config(&CleanShiftConfig::default());
//! let reports = service.scan(Path::new("."), 100 * 1024 * 1024)?;
//! for report in &reports {
//!     println!("{} {} {}", report.path.display(), report.formatted_size(), report.folder_type);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

// Re-export core functionality
pub use cleanshift_core::*;
