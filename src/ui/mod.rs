pub mod progress;

pub use self::progress::{Ui, get_multi};
