pub mod block_buffer;
pub mod sample_converter;
