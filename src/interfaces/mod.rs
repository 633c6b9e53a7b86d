pub mod format;
pub mod site;
pub mod transport;

pub use format::{BuildReport, FormatWriter};
pub use site::SiteAdapter;
pub use transport::{HttpReply, Transport};
