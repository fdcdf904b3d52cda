//! URL handling: list files and filename derivation.

mod list;
mod path;

pub use list::{parse_url_list, read_url_list};
pub use path::last_path_segment;
