pub mod stream;

pub use stream::{StreamController, StreamHandle, StreamSettings};
