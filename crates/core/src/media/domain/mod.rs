pub mod frame_sequence;
pub mod time_index;
