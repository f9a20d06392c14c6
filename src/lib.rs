pub mod buffer;
pub mod delimiter;
pub mod error;
pub mod fdstream;
pub mod memory;
pub mod pipe;
pub mod stream;

mod waiter;

// Re-export the stream surface for convenience
pub use buffer::ByteBuffer;
pub use delimiter::Delimiter;
pub use error::StreamError;
pub use fdstream::{FdReadStream, FdStream, FdWriteStream};
pub use memory::{MemoryStream, StreamConfig};
pub use pipe::{pipe, PipeOptions};
pub use stream::{ReadStream, WriteStream};
