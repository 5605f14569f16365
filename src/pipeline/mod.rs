pub mod pipeline;
pub mod stream;
