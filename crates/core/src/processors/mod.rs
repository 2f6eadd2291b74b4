pub mod face_enhancer_processor;
pub mod face_swapper_processor;
pub mod frame_processor;
pub mod infrastructure;
pub mod processor_error;
pub mod registry;
