pub mod frame_executor;
