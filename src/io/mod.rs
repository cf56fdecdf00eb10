mod block_cache;
mod blocking;
mod range_reader;
mod s3_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use blocking::BlockingReader;
pub use range_reader::RangeReader;
pub use s3_reader::{create_s3_client, S3RangeReader};

pub(crate) use range_reader::check_range;
