pub mod face_matcher;
pub mod face_reference_tracker;
