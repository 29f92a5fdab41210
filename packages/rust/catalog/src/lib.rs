//! Topic catalog handling for lessonforge.
//!
//! - [`extract`] turns catalog text into [`TopicRecord`]s
//! - [`partition`] orders records by complexity and splits them into batches
//! - [`batch_file`] reads and writes the pipe-delimited batch files
//!
//! [`TopicRecord`]: lessonforge_shared::TopicRecord

pub mod batch_file;
pub mod extract;
pub mod partition;

pub use batch_file::{
    batch_file_name, batch_id_from_path, format_batch_line, list_batch_files, parse_batch_line,
    write_batch_files,
};
pub use extract::{
    CatalogLine, FilenameCollision, check_unique_filenames, classify_line, create_filename,
    extract_file, extract_topics, find_collisions,
};
pub use partition::{batch_sizes, order_by_complexity, partition};
