pub mod encoder;
pub mod face_reference;
pub mod inference;
pub mod media;
pub mod pipeline;
pub mod processors;
pub mod shared;
