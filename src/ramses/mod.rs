pub mod assembler;
pub mod decoder;
pub mod frame;
pub mod lookups;

pub use assembler::FrameAssembler;
pub use decoder::decode;
pub use frame::Frame;
